/// Direct challenges between two online users.
pub mod challenge_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Resolution of the identity a client claims.
pub mod identity;
/// Turns matchmaker events into proposals, sessions and requeues.
pub mod match_dispatch;
/// Queue of players waiting for an opponent.
pub mod matchmaking;
/// Direct messages between users.
pub mod messaging;
/// Lobby presence announcements.
pub mod presence;
/// Background sweep of orphaned sessions and unstored results.
pub mod session_reaper;
/// Per-session task running the game loop.
pub mod session_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Keeps the storage backend connected and drives degraded mode.
pub mod storage_supervisor;
/// Connection registry and named delivery groups.
pub mod transport;
/// WebSocket connection and message handling service.
pub mod websocket_service;
