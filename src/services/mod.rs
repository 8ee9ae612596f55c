/// Live fan-out of session events to attached sockets.
pub mod broadcast;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Read-only session projections for the public REST routes.
pub mod public_service;
/// Point computation for answers.
pub mod scoring;
/// Session lifecycle: creation, attachment, host commands, answers and timers.
pub mod session_service;
/// Quiz store connection supervisor with back-off and degraded mode.
pub mod storage_supervisor;
/// WebSocket connection and message handling service.
pub mod websocket_service;
