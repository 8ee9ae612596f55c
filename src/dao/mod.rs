/// Database model definitions.
pub mod models;
/// Quiz definition lookup and leaderboard archiving.
pub mod quiz_store;
/// Storage abstraction layer for database operations.
pub mod storage;
