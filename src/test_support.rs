//! Helpers shared by the async service tests.

use std::{future::Future, sync::Arc, time::Duration};

use axum::extract::ws::Message;
use serde_json::Value;
use tokio::{sync::mpsc, time::sleep};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::game_store::memory::MemoryGameStore,
    services::{identity::Identity, transport::ConnectionId},
    state::{AppState, SharedState, UserId},
};

/// A registered connection with its outbound frames.
pub struct TestClient {
    pub identity: Identity,
    pub connection_id: ConnectionId,
    pub rx: mpsc::UnboundedReceiver<Message>,
}

impl TestClient {
    /// Read frames until one matches `predicate`.
    pub async fn wait_for<F>(&mut self, mut predicate: F) -> Value
    where
        F: FnMut(&Value) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(120), async {
            loop {
                let Some(Message::Text(text)) = self.rx.recv().await else {
                    panic!("connection closed before the expected message");
                };
                let value: Value = serde_json::from_str(text.as_str()).unwrap();
                if predicate(&value) {
                    return value;
                }
            }
        })
        .await
        .expect("expected message not received")
    }

    /// Wait for the next frame of type `kind`.
    pub async fn wait_for_type(&mut self, kind: &str) -> Value {
        self.wait_for(|value| is_type(value, kind)).await
    }

    /// Drop every frame received so far.
    pub fn drain(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }
}

pub fn is_type(value: &Value, kind: &str) -> bool {
    value["type"] == kind
}

/// A `game_state` frame showing a running rally.
pub fn playing(value: &Value) -> bool {
    is_type(value, "game_state") && value["state"]["status"] == "playing"
}

/// State with an in-memory store installed.
pub async fn state_with_store(config: AppConfig) -> (SharedState, MemoryGameStore) {
    let state = AppState::new(config);
    let store = MemoryGameStore::new();
    state.install_game_store(Arc::new(store.clone())).await;
    (state, store)
}

/// Register a connection for `user_id` directly in the registries.
pub fn connect(state: &SharedState, user_id: UserId, username: &str) -> TestClient {
    let identity = Identity {
        user_id,
        username: username.into(),
    };
    let (tx, rx) = mpsc::unbounded_channel();
    let connection_id = Uuid::new_v4();
    state.connections().register(connection_id, tx);
    state.players().register(&identity, connection_id).unwrap();
    TestClient {
        identity,
        connection_id,
        rx,
    }
}

pub fn disconnect(state: &SharedState, client: &TestClient) {
    state
        .players()
        .unregister(client.identity.user_id, client.connection_id);
    state.connections().unregister(client.connection_id);
}

/// Poll `condition` until it holds.
pub async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..1_000 {
        if condition().await {
            return;
        }
        sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not reached");
}
