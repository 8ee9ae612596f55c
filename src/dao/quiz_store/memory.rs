use std::{path::Path, sync::Arc};

use dashmap::DashMap;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    models::{LeaderboardArchiveEntity, QuizEntity},
    quiz_store::QuizStore,
    storage::{StorageError, StorageResult},
};

/// Process-local [`QuizStore`] used when no database is configured and in tests.
#[derive(Clone, Default)]
pub struct InMemoryQuizStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    quizzes: DashMap<Uuid, QuizEntity>,
    archives: DashMap<Uuid, LeaderboardArchiveEntity>,
}

impl InMemoryQuizStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-filled with the given quizzes.
    pub fn with_quizzes(quizzes: impl IntoIterator<Item = QuizEntity>) -> Self {
        let store = Self::new();
        for quiz in quizzes {
            store.inner.quizzes.insert(quiz.id, quiz);
        }
        store
    }

    /// Load a JSON array of quizzes from `path`.
    pub fn load_catalog(path: &Path) -> StorageResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|err| {
            StorageError::unavailable(format!("failed to read `{}`", path.display()), err)
        })?;
        let quizzes: Vec<QuizEntity> = serde_json::from_str(&content)
            .map_err(|err| StorageError::Corrupt(format!("{}: {err}", path.display())))?;
        Ok(Self::with_quizzes(quizzes))
    }

    /// Number of known quizzes.
    pub fn quiz_count(&self) -> usize {
        self.inner.quizzes.len()
    }

    /// Archived leaderboard of a session, if one was written.
    pub fn archive(&self, session_id: &Uuid) -> Option<LeaderboardArchiveEntity> {
        self.inner
            .archives
            .get(session_id)
            .map(|entry| entry.value().clone())
    }
}

impl QuizStore for InMemoryQuizStore {
    fn find_quiz(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<QuizEntity>>> {
        let quiz = self.inner.quizzes.get(&id).map(|entry| entry.value().clone());
        Box::pin(async move { Ok(quiz) })
    }

    fn archive_leaderboard(
        &self,
        archive: LeaderboardArchiveEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.archives.insert(archive.session_id, archive);
        Box::pin(async { Ok(()) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
