use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::{
    dto::{
        game::FinalScore,
        sse::{
            MatchFinishedEvent, MatchStartedEvent, PresenceChangedEvent, QueueSizeEvent,
            SystemStatus,
        },
    },
    engine::GameResult,
    services::session_service::SessionSetup,
    state::{AppState, SharedState, UserId},
};

const EVENT_PRESENCE_CHANGED: &str = "presence.changed";
const EVENT_MATCH_STARTED: &str = "match.started";
const EVENT_MATCH_FINISHED: &str = "match.finished";
const EVENT_QUEUE_SIZE: &str = "queue.size";
const EVENT_SYSTEM_STATUS: &str = "system.status";

pub fn broadcast_presence_changed(state: &SharedState, user_id: UserId, username: &str, online: bool) {
    let payload = PresenceChangedEvent {
        user_id,
        username: username.to_string(),
        online,
        online_count: state.players().len(),
    };
    send_lobby_event(state, EVENT_PRESENCE_CHANGED, &payload);
}

pub fn broadcast_match_started(state: &SharedState, session_id: Uuid, setup: &SessionSetup) {
    let payload = MatchStartedEvent {
        session_id,
        mode: setup.mode,
        difficulty: setup.difficulty,
        player1_id: setup.seats.left,
        player2_id: setup.seats.right,
    };
    send_lobby_event(state, EVENT_MATCH_STARTED, &payload);
}

pub fn broadcast_match_finished(
    state: &SharedState,
    session_id: Uuid,
    result: &GameResult,
    winner_id: Option<UserId>,
) {
    let payload = MatchFinishedEvent {
        session_id,
        winner: result.winner,
        winner_id,
        reason: result.reason,
        final_score: FinalScore::from(result),
    };
    send_lobby_event(state, EVENT_MATCH_FINISHED, &payload);
}

pub fn broadcast_queue_size(state: &SharedState, size: usize) {
    send_lobby_event(state, EVENT_QUEUE_SIZE, &QueueSizeEvent { size });
}

/// Broadcast the degraded flag after the storage supervisor flipped it.
pub fn broadcast_system_status(state: &AppState, degraded: bool) {
    send_lobby_event(state, EVENT_SYSTEM_STATUS, &SystemStatus { degraded });
}

fn send_lobby_event(state: &AppState, event: &str, payload: &impl Serialize) {
    if let Err(err) = state.lobby_sse().publish(event, payload) {
        warn!(event, error = %err, "failed to serialize lobby SSE payload");
    }
}
