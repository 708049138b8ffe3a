//! Periodic cleanup of sessions that lost every participant, died without finishing, or
//! still hold a result the store refused.

use std::time::Instant;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::{
    services::session_service::{self, SessionCommand},
    state::SharedState,
};

/// What one sweep did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReapSummary {
    pub abandoned: usize,
    pub dead: usize,
    pub persisted: usize,
}

/// Sweep the session registry at the configured interval, forever.
pub async fn run(state: SharedState) {
    let mut interval = tokio::time::interval(state.config().sessions.reaper_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        let summary = sweep_once(&state).await;
        if summary != ReapSummary::default() {
            info!(
                abandoned = summary.abandoned,
                dead = summary.dead,
                persisted = summary.persisted,
                "session reaper pass"
            );
        }
    }
}

pub async fn sweep_once(state: &SharedState) -> ReapSummary {
    let orphan_grace = state.config().sessions.orphan_grace;
    let players = state.players();
    let report = state
        .sessions()
        .sweep(Instant::now(), orphan_grace, |user| players.is_connected(user))
        .await;

    let mut summary = ReapSummary {
        dead: report.dead.len(),
        ..ReapSummary::default()
    };
    for id in &report.dead {
        warn!(session_id = %id, "session task ended without a result; evicted");
    }
    for handle in report.orphaned {
        warn!(session_id = %handle.id, "no participant connected; abandoning session");
        if handle.send(SessionCommand::Abandon) {
            summary.abandoned += 1;
        }
    }
    for result in report.unpersisted {
        match session_service::store_result(state, &result).await {
            Ok(_) => {
                state.sessions().evict(result.session_id).await;
                summary.persisted += 1;
            }
            Err(err) if !err.is_transient() => {
                warn!(session_id = %result.session_id, error = %err, "result rejected by storage; dropped");
                state.sessions().evict(result.session_id).await;
            }
            Err(err) => {
                debug!(session_id = %result.session_id, error = %err, "result still not stored");
            }
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::game_store::{GameStore, memory::MemoryGameStore},
        engine::Difficulty,
        services::session_service::{SessionSetup, start_session},
        state::AppState,
        test_support::{connect, disconnect, playing, state_with_store, wait_until},
    };

    #[tokio::test(start_paused = true)]
    async fn orphaned_session_is_abandoned() {
        let mut config = AppConfig::default();
        config.sessions.abandon_grace = Duration::from_secs(600);
        config.sessions.orphan_grace = Duration::ZERO;
        let (state, store) = state_with_store(config).await;
        let mut alice = connect(&state, 1, "alice");
        let outcome = start_session(&state, SessionSetup::single_player(1, Difficulty::Easy))
            .await
            .unwrap();
        let session_id = outcome.handle().id;
        alice.wait_for(playing).await;

        // Connection gone without the session hearing about it.
        disconnect(&state, &alice);
        let summary = sweep_once(&state).await;
        assert_eq!(summary.abandoned, 1);

        wait_until(|| {
            let state = state.clone();
            async move { state.sessions().get(session_id).await.is_none() }
        })
        .await;
        let stored = store.find_session(session_id).await.unwrap().unwrap();
        assert!(stored.result.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn connected_sessions_are_left_alone() {
        let mut config = AppConfig::default();
        config.sessions.orphan_grace = Duration::ZERO;
        let (state, _store) = state_with_store(config).await;
        let mut alice = connect(&state, 1, "alice");
        start_session(&state, SessionSetup::single_player(1, Difficulty::Easy))
            .await
            .unwrap();
        alice.wait_for(playing).await;

        assert_eq!(sweep_once(&state).await, ReapSummary::default());
        assert_eq!(state.sessions().len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_results_are_retried_once_storage_is_back() {
        let state = AppState::new(AppConfig::default());
        let mut alice = connect(&state, 1, "alice");
        let outcome = start_session(&state, SessionSetup::single_player(1, Difficulty::Easy))
            .await
            .unwrap();
        let session_id = outcome.handle().id;
        alice.wait_for(playing).await;
        outcome.handle().send(SessionCommand::Leave { user_id: 1 });

        wait_until(|| {
            let state = state.clone();
            async move {
                state
                    .sessions()
                    .list()
                    .await
                    .iter()
                    .any(|info| info.id == session_id && info.pending_persistence)
            }
        })
        .await;

        let store = MemoryGameStore::new();
        state.install_game_store(Arc::new(store.clone())).await;
        let summary = sweep_once(&state).await;

        assert_eq!(summary.persisted, 1);
        assert_eq!(state.sessions().len().await, 0);
        assert!(store.find_session(session_id).await.unwrap().is_some());
    }
}
