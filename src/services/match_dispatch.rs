//! Turns matchmaker events into client notifications and sessions.

use std::sync::Weak;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    dto::ws::{ErrorCode, QueueState, ServerMessage},
    error::ServiceError,
    services::{
        matchmaking::{MatchProposal, MatchmakingEvent, QueueEntry},
        session_service::{self, SessionSetup},
        sse_events,
    },
    state::{AppState, SharedState},
};

/// Consume matchmaker events until the matchmaker or the application goes away.
pub async fn run(state: Weak<AppState>, mut events: mpsc::UnboundedReceiver<MatchmakingEvent>) {
    while let Some(event) = events.recv().await {
        let Some(state) = state.upgrade() else {
            break;
        };
        handle_event(&state, event).await;
    }
    debug!("match dispatcher stopped");
}

async fn handle_event(state: &SharedState, event: MatchmakingEvent) {
    match event {
        MatchmakingEvent::Proposed(proposal) => propose(state, &proposal).await,
        MatchmakingEvent::Confirmed(proposal) => confirm(state, proposal).await,
        MatchmakingEvent::Cancelled {
            proposal,
            requeue,
            demoted,
        } => cancel(state, &proposal, requeue, demoted).await,
    }
}

async fn propose(state: &SharedState, proposal: &MatchProposal) {
    // Someone may have been seated by a challenge or rejoin since they queued.
    let mut seated = Vec::new();
    for entry in proposal.entries() {
        if state.sessions().session_for_user(entry.user_id).await.is_some() {
            seated.push(entry.user_id);
        }
    }
    if !seated.is_empty() {
        info!(match_id = %proposal.id, ?seated, "proposed user already in a game; withdrawing");
        for user_id in seated {
            state.matchmaker().leave(user_id).await;
        }
        return;
    }

    let expires_in_ms = state.config().matchmaking.confirm_timeout.as_millis() as u64;
    info!(
        match_id = %proposal.id,
        first = proposal.first.user_id,
        second = proposal.second.user_id,
        "match proposed"
    );
    for entry in proposal.entries() {
        let Some(opponent) = proposal.opponent_of(entry.user_id) else {
            continue;
        };
        let message = ServerMessage::MatchFound {
            match_id: proposal.id,
            opponent_id: opponent.user_id,
            opponent_username: opponent.username.clone(),
            expires_in_ms,
        };
        if state.transport().send(entry.connection_id, &message).is_err() {
            // Gone before hearing about it: withdraw so the opponent goes back in line.
            debug!(user_id = entry.user_id, "proposed user already disconnected");
            state.matchmaker().leave(entry.user_id).await;
        }
    }
    sse_events::broadcast_queue_size(state, state.matchmaker().len().await);
}

async fn confirm(state: &SharedState, proposal: MatchProposal) {
    let setup = SessionSetup::multiplayer(proposal.first.user_id, proposal.second.user_id);
    match session_service::start_session(state, setup).await {
        Ok(outcome) => info!(
            match_id = %proposal.id,
            session_id = %outcome.handle().id,
            "match confirmed"
        ),
        Err(err) => {
            warn!(match_id = %proposal.id, error = %err, "failed to start confirmed match");
            let (code, message) = match err {
                ServiceError::Busy(_) => (ErrorCode::AlreadyInGame, "a player is already in a game"),
                _ => (ErrorCode::ServiceUnavailable, "could not start the match"),
            };
            let message = ServerMessage::error(code, message);
            for entry in proposal.entries() {
                state.transport().notify(entry.connection_id, &message);
            }
        }
    }
}

async fn cancel(
    state: &SharedState,
    proposal: &MatchProposal,
    requeue: Vec<QueueEntry>,
    demoted: Vec<QueueEntry>,
) {
    let head = still_waiting(state, requeue).await;
    let tail = still_waiting(state, demoted).await;

    info!(
        match_id = %proposal.id,
        requeued = head.len(),
        demoted = tail.len(),
        "match proposal cancelled"
    );
    let requeued: Vec<_> = head
        .iter()
        .chain(&tail)
        .map(|entry| entry.user_id)
        .collect();
    state.matchmaker().requeue(head, tail);
    for entry in proposal.entries() {
        let status = if requeued.contains(&entry.user_id) {
            QueueState::Requeued
        } else {
            QueueState::Left
        };
        let Some(connection_id) = state.players().connection_of(entry.user_id) else {
            continue;
        };
        state.transport().notify(
            connection_id,
            &ServerMessage::QueueStatus {
                status,
                position: None,
            },
        );
    }
    sse_events::broadcast_queue_size(state, state.matchmaker().len().await);
}

/// Follow a reconnect to the user's current socket; skip anyone gone or playing.
async fn still_waiting(state: &SharedState, entries: Vec<QueueEntry>) -> Vec<QueueEntry> {
    let mut waiting = Vec::with_capacity(entries.len());
    for mut entry in entries {
        let Some(connection_id) = state.players().connection_of(entry.user_id) else {
            continue;
        };
        if state.sessions().session_for_user(entry.user_id).await.is_some() {
            continue;
        }
        entry.connection_id = connection_id;
        waiting.push(entry);
    }
    waiting
}

#[cfg(test)]
mod tests {
    use tokio::time::Duration;

    use serde_json::Value;

    use super::*;
    use crate::{
        config::AppConfig,
        engine::Difficulty,
        test_support::{TestClient, connect, disconnect, is_type, state_with_store},
    };

    fn queue_frame(value: &Value) -> bool {
        is_type(value, "match_found") || is_type(value, "queue_status")
    }

    async fn enqueue(state: &SharedState, client: &TestClient) {
        state
            .matchmaker()
            .enqueue(QueueEntry::new(
                client.identity.user_id,
                client.identity.username.clone(),
                client.connection_id,
            ))
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn both_ready_players_land_in_one_session() {
        let (state, _store) = state_with_store(AppConfig::default()).await;
        let mut alice = connect(&state, 1, "alice");
        let mut bob = connect(&state, 2, "bob");

        enqueue(&state, &alice).await;
        enqueue(&state, &bob).await;

        let found = alice.wait_for_type("match_found").await;
        assert_eq!(found["opponent_username"], "bob");
        assert_eq!(found["expires_in_ms"], 5_000);
        bob.wait_for_type("match_found").await;

        state.matchmaker().ready(1);
        state.matchmaker().ready(2);

        let start = alice.wait_for_type("game_start").await;
        assert_eq!(start["side"], "left");
        assert_eq!(start["player2_id"], 2);
        let start = bob.wait_for_type("game_start").await;
        assert_eq!(start["side"], "right");

        let alice_session = state.sessions().session_for_user(1).await.unwrap();
        let bob_session = state.sessions().session_for_user(2).await.unwrap();
        assert_eq!(alice_session.id, bob_session.id);
    }

    #[tokio::test(start_paused = true)]
    async fn unconfirmed_proposal_requeues_both_players() {
        let (state, _store) = state_with_store(AppConfig::default()).await;
        let mut alice = connect(&state, 1, "alice");
        let mut bob = connect(&state, 2, "bob");

        enqueue(&state, &alice).await;
        enqueue(&state, &bob).await;
        alice.wait_for_type("match_found").await;
        state.matchmaker().ready(1);

        tokio::time::sleep(Duration::from_secs(6)).await;

        let status = alice.wait_for_type("queue_status").await;
        assert_eq!(status["status"], "requeued");
        let status = bob.wait_for_type("queue_status").await;
        assert_eq!(status["status"], "requeued");
        assert!(state.sessions().session_for_user(1).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnected_players_are_not_requeued() {
        let (state, _store) = state_with_store(AppConfig::default()).await;
        let mut alice = connect(&state, 1, "alice");
        let bob = connect(&state, 2, "bob");

        enqueue(&state, &alice).await;
        enqueue(&state, &bob).await;
        alice.wait_for_type("match_found").await;
        disconnect(&state, &bob);

        tokio::time::sleep(Duration::from_secs(6)).await;

        let status = alice.wait_for_type("queue_status").await;
        assert_eq!(status["status"], "requeued");
        assert_eq!(state.matchmaker().len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn queue_moves_on_past_a_silent_player() {
        let (state, _store) = state_with_store(AppConfig::default()).await;
        let mut alice = connect(&state, 1, "alice");
        let mut bob = connect(&state, 2, "bob");
        let mut carol = connect(&state, 3, "carol");

        enqueue(&state, &alice).await;
        enqueue(&state, &bob).await;
        enqueue(&state, &carol).await;
        bob.wait_for_type("match_found").await;
        state.matchmaker().ready(2);

        tokio::time::sleep(Duration::from_secs(6)).await;

        let found = carol.wait_for_type("match_found").await;
        assert_eq!(found["opponent_username"], "bob");
        let status = alice.wait_for_type("queue_status").await;
        assert_eq!(status["status"], "requeued");
        assert_eq!(state.matchmaker().len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn seated_player_is_withdrawn_before_match_found() {
        let (state, _store) = state_with_store(AppConfig::default()).await;
        let mut alice = connect(&state, 1, "alice");
        let mut bob = connect(&state, 2, "bob");

        enqueue(&state, &alice).await;
        // Seated by a challenge while still queued.
        session_service::start_session(&state, SessionSetup::single_player(1, Difficulty::Easy))
            .await
            .unwrap();
        enqueue(&state, &bob).await;

        let frame = bob.wait_for(queue_frame).await;
        assert_eq!(frame["type"], "queue_status");
        assert_eq!(frame["status"], "requeued");
        let frame = alice.wait_for(queue_frame).await;
        assert_eq!(frame["type"], "queue_status");
        assert_eq!(frame["status"], "left");
        assert_eq!(state.matchmaker().len().await, 1);
    }
}
