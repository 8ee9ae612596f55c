use std::sync::Arc;

use futures::future::BoxFuture;
use mongodb::{Client, Collection, Database, bson::doc, options::IndexOptions};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{MongoLeaderboardDocument, MongoQuizDocument, doc_id},
};
use crate::dao::{
    models::{LeaderboardArchiveEntity, QuizEntity},
    quiz_store::QuizStore,
    storage::StorageResult,
};

const QUIZ_COLLECTION_NAME: &str = "quizzes";
const LEADERBOARD_COLLECTION_NAME: &str = "leaderboards";

/// MongoDB-backed [`QuizStore`].
#[derive(Clone)]
pub struct MongoQuizStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    // Kept so the driver's connection pool lives as long as the database handle.
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoQuizStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let collection = self.leaderboard_collection().await;
        let index = mongodb::IndexModel::builder()
            .keys(doc! {"quiz_id": 1, "ended_at": -1})
            .options(
                IndexOptions::builder()
                    .name(Some("leaderboard_quiz_idx".to_owned()))
                    .build(),
            )
            .build();

        collection
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: LEADERBOARD_COLLECTION_NAME,
                index: "quiz_id,ended_at",
                source,
            })?;

        Ok(())
    }

    async fn quiz_collection(&self) -> Collection<MongoQuizDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoQuizDocument>(QUIZ_COLLECTION_NAME)
    }

    async fn leaderboard_collection(&self) -> Collection<MongoLeaderboardDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoLeaderboardDocument>(LEADERBOARD_COLLECTION_NAME)
    }

    async fn find_quiz(&self, id: Uuid) -> MongoResult<Option<QuizEntity>> {
        let collection = self.quiz_collection().await;
        let document = collection
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadQuiz { id, source })?;
        Ok(document.map(Into::into))
    }

    async fn archive_leaderboard(&self, archive: LeaderboardArchiveEntity) -> MongoResult<()> {
        let document: MongoLeaderboardDocument = archive.into();
        let session_id = document.session_id();
        let collection = self.leaderboard_collection().await;
        collection
            .replace_one(doc_id(session_id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::ArchiveLeaderboard { session_id, source })?;
        debug!(%session_id, "leaderboard archived");
        Ok(())
    }
}

impl QuizStore for MongoQuizStore {
    fn find_quiz(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<QuizEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_quiz(id).await.map_err(Into::into) })
    }

    fn archive_leaderboard(
        &self,
        archive: LeaderboardArchiveEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.archive_leaderboard(archive).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
