use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::session::SessionSummary, error::AppError, services::session_service, state::SharedState,
};

#[utoipa::path(
    get,
    path = "/sessions",
    tag = "sessions",
    responses((status = 200, description = "Sessions currently held in memory", body = [SessionSummary]))
)]
/// List running sessions, plus finished ones whose result is not stored yet.
pub async fn list_sessions(State(state): State<SharedState>) -> Json<Vec<SessionSummary>> {
    Json(session_service::list_sessions(&state).await)
}

#[utoipa::path(
    get,
    path = "/sessions/{id}",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session found", body = SessionSummary),
        (status = 404, description = "No such session in memory")
    )
)]
/// Fetch one session held in memory.
pub async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSummary>, AppError> {
    let summary = session_service::session_summary(&state, id).await?;
    Ok(Json(summary))
}

/// Configure the session inspection routes.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/sessions", get(list_sessions))
        .route("/sessions/{id}", get(get_session))
}
