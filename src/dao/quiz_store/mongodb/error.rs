use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Failures of the MongoDB quiz store.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// Required environment variable is unset.
    #[error("environment variable `{var}` is not set")]
    MissingEnvVar {
        /// Variable name.
        var: &'static str,
    },
    /// Connection URI could not be parsed.
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        /// Offending URI.
        uri: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Client construction failed.
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The database never answered the initial ping.
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        /// Attempts made.
        attempts: u32,
        /// Last driver error.
        #[source]
        source: MongoError,
    },
    /// Periodic ping failed.
    #[error("MongoDB ping health check failed")]
    HealthPing {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Index creation failed.
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        /// Collection name.
        collection: &'static str,
        /// Index name.
        index: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Reading a quiz failed.
    #[error("failed to load quiz `{id}`")]
    LoadQuiz {
        /// Quiz id.
        id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Writing a leaderboard archive failed.
    #[error("failed to archive leaderboard of session `{session_id}`")]
    ArchiveLeaderboard {
        /// Session id.
        session_id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
}
