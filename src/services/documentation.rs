use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Pong Arena Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::lobby_stream,
        crate::routes::websocket::ws_handler,
        crate::routes::sessions::list_sessions,
        crate::routes::sessions::get_session,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::HealthStatus,
            crate::dto::session::SessionSummary,
            crate::dto::ws::ClientMessage,
            crate::dto::ws::ServerMessage,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::PresenceChangedEvent,
            crate::dto::sse::MatchStartedEvent,
            crate::dto::sse::MatchFinishedEvent,
            crate::dto::sse::QueueSizeEvent,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "players", description = "WebSocket protocol spoken by game clients"),
        (name = "sessions", description = "Inspection of live sessions"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_is_documented() {
        let doc = ApiDoc::openapi();
        for path in ["/healthcheck", "/sse/lobby", "/ws", "/sessions", "/sessions/{id}"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
