//! Index of running and recently finished sessions.
//!
//! All bookkeeping sits behind one async mutex so that "look up the pair, check the users,
//! insert" is a single step; two concurrent confirmations for the same pair can never both
//! create a session.

use std::{
    collections::HashMap,
    time::{Duration, Instant, SystemTime},
};

use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;

use crate::{
    dao::models::SessionResultEntity,
    engine::{Difficulty, GameMode, Side},
    services::session_service::SessionCommand,
    state::state_machine::GameStatus,
};

use super::UserId;

/// Who sits where. The right seat is empty when the AI plays it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seats {
    pub left: UserId,
    pub right: Option<UserId>,
}

impl Seats {
    pub fn pair(left: UserId, right: UserId) -> Self {
        Self {
            left,
            right: Some(right),
        }
    }

    pub fn solo(user: UserId) -> Self {
        Self {
            left: user,
            right: None,
        }
    }

    pub fn side_of(&self, user: UserId) -> Option<Side> {
        if self.left == user {
            Some(Side::Left)
        } else if self.right == Some(user) {
            Some(Side::Right)
        } else {
            None
        }
    }

    pub fn user_at(&self, side: Side) -> Option<UserId> {
        match side {
            Side::Left => Some(self.left),
            Side::Right => self.right,
        }
    }

    pub fn users(&self) -> impl Iterator<Item = UserId> + '_ {
        std::iter::once(self.left).chain(self.right)
    }

    fn key(&self) -> PairKey {
        PairKey::new(self.left, self.right.unwrap_or(self.left))
    }
}

/// Order-independent key of a user pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PairKey(UserId, UserId);

impl PairKey {
    pub fn new(a: UserId, b: UserId) -> Self {
        Self(a.min(b), a.max(b))
    }
}

/// Cheap, cloneable reference to a session task.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: Uuid,
    pub mode: GameMode,
    pub difficulty: Option<Difficulty>,
    pub seats: Seats,
    pub commands: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    /// Forward a command to the session task. Returns `false` when the task is gone.
    pub fn send(&self, command: SessionCommand) -> bool {
        self.commands.send(command).is_ok()
    }
}

/// Read-only view for listings.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: Uuid,
    pub mode: GameMode,
    pub difficulty: Option<Difficulty>,
    pub seats: Seats,
    pub status: GameStatus,
    pub created_at: SystemTime,
    pub pending_persistence: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionRegistryError {
    #[error("user {0} is already playing")]
    UserBusy(UserId),
}

/// Whether [`SessionRegistry::get_or_create`] spawned a new session.
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Created(SessionHandle),
    Existing(SessionHandle),
}

impl CreateOutcome {
    pub fn handle(&self) -> &SessionHandle {
        match self {
            CreateOutcome::Created(handle) | CreateOutcome::Existing(handle) => handle,
        }
    }
}

/// Work found by [`SessionRegistry::sweep`].
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Running sessions with nobody connected for longer than the grace period.
    pub orphaned: Vec<SessionHandle>,
    /// Sessions whose task is gone without finalizing; already removed.
    pub dead: Vec<Uuid>,
    /// Finished sessions still waiting for their result to be stored.
    pub unpersisted: Vec<SessionResultEntity>,
}

struct SessionEntry {
    handle: SessionHandle,
    status: GameStatus,
    created_at: SystemTime,
    /// Players are released from the indexes as soon as the match ends.
    released: bool,
    orphan_since: Option<Instant>,
    pending_result: Option<SessionResultEntity>,
}

#[derive(Default)]
struct Registry {
    sessions: HashMap<Uuid, SessionEntry>,
    by_user: HashMap<UserId, Uuid>,
    by_pair: HashMap<PairKey, Uuid>,
}

impl Registry {
    fn release(&mut self, id: Uuid) {
        let Some(entry) = self.sessions.get_mut(&id) else {
            return;
        };
        if entry.released {
            return;
        }
        entry.released = true;
        let seats = entry.handle.seats;
        for user in seats.users() {
            if self.by_user.get(&user) == Some(&id) {
                self.by_user.remove(&user);
            }
        }
        if self.by_pair.get(&seats.key()) == Some(&id) {
            self.by_pair.remove(&seats.key());
        }
    }
}

#[derive(Default)]
pub struct SessionRegistry {
    inner: Mutex<Registry>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the running session of this pair, or create one with `spawn`.
    ///
    /// `spawn` receives the new session id and returns the command channel of the task it
    /// started. It runs under the registry lock and must not await. Fails when a seated user
    /// is already playing in a different session.
    pub async fn get_or_create<F>(
        &self,
        seats: Seats,
        mode: GameMode,
        difficulty: Option<Difficulty>,
        spawn: F,
    ) -> Result<CreateOutcome, SessionRegistryError>
    where
        F: FnOnce(Uuid) -> mpsc::UnboundedSender<SessionCommand>,
    {
        let mut registry = self.inner.lock().await;
        if let Some(existing) = registry
            .by_pair
            .get(&seats.key())
            .and_then(|id| registry.sessions.get(id))
        {
            return Ok(CreateOutcome::Existing(existing.handle.clone()));
        }
        if let Some(busy) = seats.users().find(|user| registry.by_user.contains_key(user)) {
            return Err(SessionRegistryError::UserBusy(busy));
        }

        let id = Uuid::new_v4();
        let handle = SessionHandle {
            id,
            mode,
            difficulty,
            seats,
            commands: spawn(id),
        };
        for user in seats.users() {
            registry.by_user.insert(user, id);
        }
        registry.by_pair.insert(seats.key(), id);
        registry.sessions.insert(
            id,
            SessionEntry {
                handle: handle.clone(),
                status: GameStatus::Waiting,
                created_at: SystemTime::now(),
                released: false,
                orphan_since: None,
                pending_result: None,
            },
        );
        Ok(CreateOutcome::Created(handle))
    }

    /// The running session `user` is seated in.
    pub async fn session_for_user(&self, user: UserId) -> Option<SessionHandle> {
        let registry = self.inner.lock().await;
        let id = registry.by_user.get(&user)?;
        registry.sessions.get(id).map(|entry| entry.handle.clone())
    }

    pub async fn get(&self, id: Uuid) -> Option<SessionHandle> {
        let registry = self.inner.lock().await;
        registry.sessions.get(&id).map(|entry| entry.handle.clone())
    }

    pub async fn set_status(&self, id: Uuid, status: GameStatus) {
        let mut registry = self.inner.lock().await;
        if let Some(entry) = registry.sessions.get_mut(&id) {
            entry.status = status;
        }
    }

    /// Free the players of a finished session so they can queue again. The entry stays
    /// until [`SessionRegistry::evict`].
    pub async fn release_players(&self, id: Uuid) {
        self.inner.lock().await.release(id);
    }

    /// Keep the session around until `result` is stored.
    pub async fn mark_unpersisted(&self, id: Uuid, result: SessionResultEntity) {
        let mut registry = self.inner.lock().await;
        registry.release(id);
        if let Some(entry) = registry.sessions.get_mut(&id) {
            entry.pending_result = Some(result);
        }
    }

    /// Drop the session entirely.
    pub async fn evict(&self, id: Uuid) -> bool {
        let mut registry = self.inner.lock().await;
        registry.release(id);
        registry.sessions.remove(&id).is_some()
    }

    pub async fn list(&self) -> Vec<SessionInfo> {
        let registry = self.inner.lock().await;
        let mut sessions: Vec<_> = registry
            .sessions
            .values()
            .map(|entry| SessionInfo {
                id: entry.handle.id,
                mode: entry.handle.mode,
                difficulty: entry.handle.difficulty,
                seats: entry.handle.seats,
                status: entry.status,
                created_at: entry.created_at,
                pending_persistence: entry.pending_result.is_some(),
            })
            .collect();
        sessions.sort_by_key(|info| info.created_at);
        sessions
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.sessions.len()
    }

    /// Find sessions needing the reaper's attention.
    ///
    /// A running session is orphaned once none of its seated users has been connected for
    /// `orphan_grace`. Sessions whose command channel is closed without a final result are
    /// dropped on the spot.
    pub async fn sweep<F>(&self, now: Instant, orphan_grace: Duration, is_connected: F) -> SweepReport
    where
        F: Fn(UserId) -> bool,
    {
        let mut registry = self.inner.lock().await;
        let mut report = SweepReport::default();

        for entry in registry.sessions.values_mut() {
            if entry.released {
                if let Some(result) = &entry.pending_result {
                    report.unpersisted.push(result.clone());
                }
                continue;
            }
            if entry.handle.commands.is_closed() {
                report.dead.push(entry.handle.id);
                continue;
            }
            if entry.handle.seats.users().any(&is_connected) {
                entry.orphan_since = None;
                continue;
            }
            let since = *entry.orphan_since.get_or_insert(now);
            if now.duration_since(since) >= orphan_grace {
                report.orphaned.push(entry.handle.clone());
            }
        }

        for id in &report.dead {
            registry.release(*id);
            registry.sessions.remove(id);
        }
        report
    }
}
