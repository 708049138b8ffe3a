pub mod challenges;
pub mod players;
pub mod sessions;
mod sse;
pub mod state_machine;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig,
    dao::game_store::GameStore,
    services::{
        identity::{self, IdentityProvider},
        match_dispatch,
        matchmaking::MatchmakerHandle,
        sse_events,
        transport::{ChannelTransport, Transport},
    },
};

pub use self::challenges::ChallengeBook;
pub use self::players::PlayerRegistry;
pub use self::sessions::SessionRegistry;
pub use self::sse::SseHub;

/// Numeric account id, issued by the identity provider.
pub type UserId = u64;

pub type SharedState = Arc<AppState>;

/// Capacity of the lobby SSE broadcast channel.
const LOBBY_SSE_CAPACITY: usize = 64;

/// Central application state: connections, queues, running sessions and the storage handle.
pub struct AppState {
    config: AppConfig,
    game_store: RwLock<Option<Arc<dyn GameStore>>>,
    degraded: watch::Sender<bool>,
    identity: Arc<dyn IdentityProvider>,
    transport: ChannelTransport,
    players: PlayerRegistry,
    sessions: SessionRegistry,
    matchmaker: MatchmakerHandle,
    challenges: ChallengeBook,
    lobby_sse: SseHub,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// Spawns the matchmaker actor and its dispatcher, so this must run inside a Tokio
    /// runtime. The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let identity = identity::from_settings(&config.identity);
        Self::with_identity(config, identity)
    }

    /// Same as [`AppState::new`] with an explicit identity provider.
    pub fn with_identity(config: AppConfig, identity: Arc<dyn IdentityProvider>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let (matchmaker, events) = MatchmakerHandle::spawn(config.matchmaking.confirm_timeout);
        let state = Arc::new(Self {
            config,
            game_store: RwLock::new(None),
            degraded: degraded_tx,
            identity,
            transport: ChannelTransport::new(),
            players: PlayerRegistry::new(),
            sessions: SessionRegistry::new(),
            matchmaker,
            challenges: ChallengeBook::new(),
            lobby_sse: SseHub::new("lobby", LOBBY_SSE_CAPACITY),
        });
        tokio::spawn(match_dispatch::run(Arc::downgrade(&state), events));
        state
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain a handle to the current game store, if one is installed.
    pub async fn game_store(&self) -> Option<Arc<dyn GameStore>> {
        let guard = self.game_store.read().await;
        guard.as_ref().cloned()
    }

    /// Install a new game store implementation and leave degraded mode.
    pub async fn install_game_store(&self, store: Arc<dyn GameStore>) {
        {
            let mut guard = self.game_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Replace the game store without touching the degraded flag.
    pub async fn set_game_store(&self, store: Arc<dyn GameStore>) {
        let mut guard = self.game_store.write().await;
        *guard = Some(store);
    }

    /// Remove the current game store and enter degraded mode.
    pub async fn clear_game_store(&self) {
        {
            let mut guard = self.game_store.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Update the degraded flag, notifying watchers and lobby subscribers on change.
    pub async fn update_degraded(&self, value: bool) {
        let changed = self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
        if changed {
            sse_events::broadcast_system_status(self, value);
        }
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    pub fn identity(&self) -> &dyn IdentityProvider {
        self.identity.as_ref()
    }

    /// Outbound message routing.
    pub fn transport(&self) -> &dyn Transport {
        &self.transport
    }

    /// Writer channels of live sockets, for registering and dropping connections.
    pub fn connections(&self) -> &ChannelTransport {
        &self.transport
    }

    pub fn players(&self) -> &PlayerRegistry {
        &self.players
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn matchmaker(&self) -> &MatchmakerHandle {
        &self.matchmaker
    }

    pub fn challenges(&self) -> &ChallengeBook {
        &self.challenges
    }

    /// Broadcast hub used for the lobby SSE stream.
    pub fn lobby_sse(&self) -> &SseHub {
        &self.lobby_sse
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::game_store::memory::MemoryGameStore;

    #[tokio::test]
    async fn starts_degraded_until_a_store_is_installed() {
        let state = AppState::new(AppConfig::default());
        let mut watcher = state.degraded_watcher();
        assert!(state.is_degraded().await);

        state.install_game_store(Arc::new(MemoryGameStore::new())).await;

        assert!(!state.is_degraded().await);
        assert!(watcher.has_changed().unwrap());
        assert!(!*watcher.borrow_and_update());
    }

    #[tokio::test]
    async fn clearing_the_store_flips_back_to_degraded() {
        let state = AppState::new(AppConfig::default());
        state.install_game_store(Arc::new(MemoryGameStore::new())).await;

        state.clear_game_store().await;

        assert!(state.is_degraded().await);
        assert!(state.game_store().await.is_none());
    }

    #[tokio::test]
    async fn repeated_updates_do_not_notify() {
        let state = AppState::new(AppConfig::default());
        let mut watcher = state.degraded_watcher();
        watcher.borrow_and_update();

        state.update_degraded(true).await;

        assert!(!watcher.has_changed().unwrap());
    }
}
