pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{LeaderboardArchiveEntity, QuizEntity};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use uuid::Uuid;

pub use memory::InMemoryQuizStore;

/// Abstraction over the persistence layer for quiz definitions and final leaderboards.
pub trait QuizStore: Send + Sync {
    /// Load a quiz definition by id.
    fn find_quiz(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<QuizEntity>>>;
    /// Persist the final standings of an ended session.
    fn archive_leaderboard(
        &self,
        archive: LeaderboardArchiveEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Check that the backend answers.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the backend connection.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
