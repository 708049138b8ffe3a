//! Process-local store, used when no database is configured and in tests.

use std::{sync::Arc, time::SystemTime};

use dashmap::DashMap;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    game_store::GameStore,
    models::{SessionEntity, SessionResultEntity, StoredStatus},
    storage::{StorageError, StorageResult},
};

#[derive(Clone, Default)]
pub struct MemoryGameStore {
    sessions: Arc<DashMap<Uuid, SessionEntity>>,
}

impl MemoryGameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl GameStore for MemoryGameStore {
    fn create_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<Uuid>> {
        let sessions = self.sessions.clone();
        Box::pin(async move {
            let id = session.id;
            sessions.entry(id).or_insert(session);
            Ok(id)
        })
    }

    fn update_status(
        &self,
        id: Uuid,
        status: StoredStatus,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let sessions = self.sessions.clone();
        Box::pin(async move {
            let mut session = sessions.get_mut(&id).ok_or(StorageError::NotFound(id))?;
            if session.status != StoredStatus::Finished {
                session.status = status;
                session.updated_at = SystemTime::now();
            }
            Ok(())
        })
    }

    fn record_result(
        &self,
        result: SessionResultEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let sessions = self.sessions.clone();
        Box::pin(async move {
            let mut session = sessions
                .entry(result.session_id)
                .or_insert_with(|| {
                    let mut session = result.to_session();
                    session.result = None;
                    session
                });
            if session.result.is_some() {
                return Ok(false);
            }
            session.status = StoredStatus::Finished;
            session.updated_at = result.finished_at;
            session.result = Some(result);
            Ok(true)
        })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let sessions = self.sessions.clone();
        Box::pin(async move { Ok(sessions.get(&id).map(|entry| entry.clone())) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{engine::GameMode, state::state_machine::FinishReason};

    fn session(id: Uuid) -> SessionEntity {
        let now = SystemTime::now();
        SessionEntity {
            id,
            mode: GameMode::Multiplayer,
            difficulty: None,
            player1_id: 1,
            player2_id: Some(2),
            status: StoredStatus::Waiting,
            created_at: now,
            updated_at: now,
            result: None,
        }
    }

    fn result(id: Uuid, winner: u64, left: u32, right: u32) -> SessionResultEntity {
        SessionResultEntity {
            session_id: id,
            mode: GameMode::Multiplayer,
            player1_id: 1,
            player2_id: Some(2),
            winner_id: Some(winner),
            score_left: left,
            score_right: right,
            reason: FinishReason::Victory,
            finished_at: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn result_is_written_once() {
        let store = MemoryGameStore::new();
        let id = Uuid::new_v4();
        store.create_session(session(id)).await.unwrap();

        assert!(store.record_result(result(id, 1, 10, 4)).await.unwrap());
        assert!(!store.record_result(result(id, 2, 3, 10)).await.unwrap());

        let stored = store.find_session(id).await.unwrap().unwrap();
        assert_eq!(stored.status, StoredStatus::Finished);
        let outcome = stored.result.unwrap();
        assert_eq!(outcome.winner_id, Some(1));
        assert_eq!((outcome.score_left, outcome.score_right), (10, 4));
    }

    #[tokio::test]
    async fn result_without_prior_session_creates_it() {
        let store = MemoryGameStore::new();
        let id = Uuid::new_v4();

        assert!(store.record_result(result(id, 2, 1, 10)).await.unwrap());

        let stored = store.find_session(id).await.unwrap().unwrap();
        assert_eq!(stored.player2_id, Some(2));
        assert!(stored.result.is_some());
    }

    #[tokio::test]
    async fn finished_sessions_do_not_regress() {
        let store = MemoryGameStore::new();
        let id = Uuid::new_v4();
        store.create_session(session(id)).await.unwrap();
        store.record_result(result(id, 1, 10, 0)).await.unwrap();

        store.update_status(id, StoredStatus::Playing).await.unwrap();

        let stored = store.find_session(id).await.unwrap().unwrap();
        assert_eq!(stored.status, StoredStatus::Finished);
    }

    #[tokio::test]
    async fn creating_twice_keeps_the_first_record() {
        let store = MemoryGameStore::new();
        let id = Uuid::new_v4();
        store.create_session(session(id)).await.unwrap();
        store.update_status(id, StoredStatus::Playing).await.unwrap();

        store.create_session(session(id)).await.unwrap();

        let stored = store.find_session(id).await.unwrap().unwrap();
        assert_eq!(stored.status, StoredStatus::Playing);
        assert_eq!(store.len(), 1);
    }
}
