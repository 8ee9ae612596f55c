use mongodb::bson::{Binary, DateTime, Document, doc, spec::BinarySubtype};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::{
    ArchivedStandingEntity, LeaderboardArchiveEntity, QuestionEntity, QuizEntity,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoQuizDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    title: String,
    questions: Vec<QuestionEntity>,
}

impl From<MongoQuizDocument> for QuizEntity {
    fn from(value: MongoQuizDocument) -> Self {
        Self {
            id: value.id,
            title: value.title,
            questions: value.questions,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoLeaderboardDocument {
    #[serde(rename = "_id")]
    session_id: Uuid,
    join_code: String,
    quiz_id: Uuid,
    quiz_title: String,
    host_id: String,
    end_reason: String,
    questions_played: i64,
    created_at: DateTime,
    ended_at: DateTime,
    standings: Vec<MongoStandingDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MongoStandingDocument {
    rank: i64,
    participant_id: Uuid,
    name: String,
    score: i64,
}

impl From<LeaderboardArchiveEntity> for MongoLeaderboardDocument {
    fn from(value: LeaderboardArchiveEntity) -> Self {
        Self {
            session_id: value.session_id,
            join_code: value.join_code,
            quiz_id: value.quiz_id,
            quiz_title: value.quiz_title,
            host_id: value.host_id,
            end_reason: value.end_reason,
            questions_played: saturating_i64(value.questions_played as u64),
            created_at: DateTime::from_system_time(value.created_at),
            ended_at: DateTime::from_system_time(value.ended_at),
            standings: value.standings.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<ArchivedStandingEntity> for MongoStandingDocument {
    fn from(value: ArchivedStandingEntity) -> Self {
        Self {
            rank: saturating_i64(value.rank as u64),
            participant_id: value.participant_id,
            name: value.name,
            score: saturating_i64(value.score),
        }
    }
}

impl MongoLeaderboardDocument {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn uuid_as_binary(id: Uuid) -> Binary {
    Binary {
        subtype: BinarySubtype::Uuid,
        bytes: id.into_bytes().to_vec(),
    }
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": uuid_as_binary(id)}
}
