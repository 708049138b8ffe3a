//! FIFO matchmaking queue, run as a single actor task.
//!
//! The actor owns the queue and the pending proposals, so enqueue, leave, readiness and
//! expiry are totally ordered without any lock. It pairs the two oldest entries, asks both to
//! confirm, and reports the outcome as [`MatchmakingEvent`]s; session creation and
//! notifications are left to the consumer of those events.

use std::{
    collections::{HashMap, HashSet},
    time::{Duration, Instant},
};

use indexmap::IndexMap;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{services::transport::ConnectionId, state::UserId};

/// Proposals a user may let time out before the queue drops them.
pub const MAX_MISSED_CONFIRMS: u32 = 2;

/// A user waiting for an opponent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub user_id: UserId,
    pub username: String,
    pub connection_id: ConnectionId,
    pub enqueued_at: Instant,
    /// Consecutive proposals this user let expire without sending `ready`.
    pub missed_confirms: u32,
}

impl QueueEntry {
    pub fn new(user_id: UserId, username: impl Into<String>, connection_id: ConnectionId) -> Self {
        Self {
            user_id,
            username: username.into(),
            connection_id,
            enqueued_at: Instant::now(),
            missed_confirms: 0,
        }
    }
}

/// Two users proposed to each other. `first` waited longer and takes the left seat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchProposal {
    pub id: Uuid,
    pub first: QueueEntry,
    pub second: QueueEntry,
}

impl MatchProposal {
    pub fn entries(&self) -> [&QueueEntry; 2] {
        [&self.first, &self.second]
    }

    pub fn opponent_of(&self, user: UserId) -> Option<&QueueEntry> {
        if self.first.user_id == user {
            Some(&self.second)
        } else if self.second.user_id == user {
            Some(&self.first)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchmakingEvent {
    /// Both users must now send `ready`.
    Proposed(MatchProposal),
    /// Both confirmed; a session should be created for the pair.
    Confirmed(MatchProposal),
    /// The proposal fell through. `requeue` lists the users that did nothing wrong and
    /// should go back to the head of the queue; `demoted` lists users who let the proposal
    /// expire and go to the tail. Either only applies while the user is still connected.
    Cancelled {
        proposal: MatchProposal,
        requeue: Vec<QueueEntry>,
        demoted: Vec<QueueEntry>,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatchmakingError {
    #[error("user {0} is already queued")]
    AlreadyQueued(UserId),
    #[error("user {0} already has a pending match")]
    AlreadyMatched(UserId),
    #[error("matchmaker is shut down")]
    Closed,
}

enum Command {
    Enqueue {
        entry: QueueEntry,
        reply: oneshot::Sender<Result<usize, MatchmakingError>>,
    },
    Requeue {
        head: Vec<QueueEntry>,
        tail: Vec<QueueEntry>,
    },
    Leave {
        user_id: UserId,
        reply: oneshot::Sender<bool>,
    },
    Ready {
        user_id: UserId,
    },
    Expire {
        proposal_id: Uuid,
    },
    Len {
        reply: oneshot::Sender<usize>,
    },
}

/// Cloneable front end of the matchmaking actor.
#[derive(Clone)]
pub struct MatchmakerHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl MatchmakerHandle {
    /// Start the actor. Proposals not confirmed within `confirm_timeout` are cancelled.
    pub fn spawn(confirm_timeout: Duration) -> (Self, mpsc::UnboundedReceiver<MatchmakingEvent>) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let actor = Matchmaker {
            queue: IndexMap::new(),
            pending: HashMap::new(),
            pending_by_user: HashMap::new(),
            confirm_timeout,
            events: events_tx,
            timers: commands_tx.downgrade(),
        };
        tokio::spawn(actor.run(commands_rx));
        (
            Self {
                commands: commands_tx,
            },
            events_rx,
        )
    }

    /// Append a user to the queue, returning their 1-based position.
    pub async fn enqueue(&self, entry: QueueEntry) -> Result<usize, MatchmakingError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Enqueue { entry, reply })
            .map_err(|_| MatchmakingError::Closed)?;
        response.await.map_err(|_| MatchmakingError::Closed)?
    }

    /// Put `head` back at the front of the queue and `tail` at the back, each keeping
    /// its relative order.
    pub fn requeue(&self, head: Vec<QueueEntry>, tail: Vec<QueueEntry>) {
        if self.commands.send(Command::Requeue { head, tail }).is_err() {
            warn!("matchmaker is shut down; requeue dropped");
        }
    }

    /// Remove a user from the queue or from their pending proposal. Returns whether they
    /// were in either.
    pub async fn leave(&self, user_id: UserId) -> bool {
        let (reply, response) = oneshot::channel();
        if self.commands.send(Command::Leave { user_id, reply }).is_err() {
            return false;
        }
        response.await.unwrap_or(false)
    }

    pub fn ready(&self, user_id: UserId) {
        if self.commands.send(Command::Ready { user_id }).is_err() {
            warn!(user_id, "matchmaker is shut down; ready dropped");
        }
    }

    /// Number of users waiting in the queue, not counting pending proposals.
    pub async fn len(&self) -> usize {
        let (reply, response) = oneshot::channel();
        if self.commands.send(Command::Len { reply }).is_err() {
            return 0;
        }
        response.await.unwrap_or(0)
    }
}

struct PendingMatch {
    proposal: MatchProposal,
    confirmed: HashSet<UserId>,
}

struct Matchmaker {
    queue: IndexMap<UserId, QueueEntry>,
    pending: HashMap<Uuid, PendingMatch>,
    pending_by_user: HashMap<UserId, Uuid>,
    confirm_timeout: Duration,
    events: mpsc::UnboundedSender<MatchmakingEvent>,
    timers: mpsc::WeakUnboundedSender<Command>,
}

impl Matchmaker {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = commands.recv().await {
            match command {
                Command::Enqueue { entry, reply } => {
                    let _ = reply.send(self.enqueue(entry));
                    self.try_pair();
                }
                Command::Requeue { head, tail } => {
                    self.requeue(head, tail);
                    self.try_pair();
                }
                Command::Leave { user_id, reply } => {
                    let _ = reply.send(self.leave(user_id));
                    self.try_pair();
                }
                Command::Ready { user_id } => self.ready(user_id),
                Command::Expire { proposal_id } => {
                    self.expire(proposal_id);
                    self.try_pair();
                }
                Command::Len { reply } => {
                    let _ = reply.send(self.queue.len());
                }
            }
        }
        debug!("matchmaker stopped");
    }

    fn enqueue(&mut self, entry: QueueEntry) -> Result<usize, MatchmakingError> {
        let user_id = entry.user_id;
        if self.pending_by_user.contains_key(&user_id) {
            return Err(MatchmakingError::AlreadyMatched(user_id));
        }
        if self.queue.contains_key(&user_id) {
            return Err(MatchmakingError::AlreadyQueued(user_id));
        }
        self.queue.insert(user_id, entry);
        info!(user_id, queue_len = self.queue.len(), "user joined matchmaking queue");
        Ok(self.queue.len())
    }

    fn requeue(&mut self, head: Vec<QueueEntry>, tail: Vec<QueueEntry>) {
        for entry in head.into_iter().rev() {
            if self.pending_by_user.contains_key(&entry.user_id) {
                continue;
            }
            self.queue.shift_remove(&entry.user_id);
            self.queue.shift_insert(0, entry.user_id, entry);
        }
        for entry in tail {
            if self.pending_by_user.contains_key(&entry.user_id) {
                continue;
            }
            self.queue.shift_remove(&entry.user_id);
            self.queue.insert(entry.user_id, entry);
        }
    }

    fn leave(&mut self, user_id: UserId) -> bool {
        if self.queue.shift_remove(&user_id).is_some() {
            info!(user_id, "user left matchmaking queue");
            return true;
        }
        let Some(proposal_id) = self.pending_by_user.get(&user_id).copied() else {
            return false;
        };
        if let Some(pending) = self.take_pending(proposal_id) {
            let requeue = pending
                .proposal
                .opponent_of(user_id)
                .cloned()
                .into_iter()
                .collect();
            info!(user_id, %proposal_id, "user withdrew from pending match");
            self.emit(MatchmakingEvent::Cancelled {
                proposal: pending.proposal,
                requeue,
                demoted: Vec::new(),
            });
        }
        true
    }

    fn ready(&mut self, user_id: UserId) {
        let Some(proposal_id) = self.pending_by_user.get(&user_id).copied() else {
            debug!(user_id, "ready without a pending match");
            return;
        };
        let Some(pending) = self.pending.get_mut(&proposal_id) else {
            return;
        };
        pending.confirmed.insert(user_id);
        if pending.confirmed.len() < 2 {
            return;
        }
        if let Some(pending) = self.take_pending(proposal_id) {
            info!(%proposal_id, "match confirmed by both players");
            self.emit(MatchmakingEvent::Confirmed(pending.proposal));
        }
    }

    fn expire(&mut self, proposal_id: Uuid) {
        let Some(pending) = self.take_pending(proposal_id) else {
            return;
        };
        info!(%proposal_id, "match confirmation timed out");
        let mut requeue = Vec::new();
        let mut demoted = Vec::new();
        for entry in pending.proposal.entries() {
            let mut entry = entry.clone();
            if pending.confirmed.contains(&entry.user_id) {
                entry.missed_confirms = 0;
                requeue.push(entry);
                continue;
            }
            entry.missed_confirms += 1;
            if entry.missed_confirms >= MAX_MISSED_CONFIRMS {
                info!(user_id = entry.user_id, "user dropped from queue after unanswered matches");
            } else {
                demoted.push(entry);
            }
        }
        self.emit(MatchmakingEvent::Cancelled {
            proposal: pending.proposal,
            requeue,
            demoted,
        });
    }

    fn try_pair(&mut self) {
        while self.queue.len() >= 2 {
            let (Some((_, first)), Some((_, second))) =
                (self.queue.shift_remove_index(0), self.queue.shift_remove_index(0))
            else {
                break;
            };
            let proposal = MatchProposal {
                id: Uuid::new_v4(),
                first,
                second,
            };
            for entry in proposal.entries() {
                self.pending_by_user.insert(entry.user_id, proposal.id);
            }
            self.pending.insert(
                proposal.id,
                PendingMatch {
                    proposal: proposal.clone(),
                    confirmed: HashSet::new(),
                },
            );
            self.arm_timer(proposal.id);
            info!(
                proposal_id = %proposal.id,
                first = proposal.first.user_id,
                second = proposal.second.user_id,
                "match proposed"
            );
            self.emit(MatchmakingEvent::Proposed(proposal));
        }
    }

    fn take_pending(&mut self, proposal_id: Uuid) -> Option<PendingMatch> {
        let pending = self.pending.remove(&proposal_id)?;
        for entry in pending.proposal.entries() {
            self.pending_by_user.remove(&entry.user_id);
        }
        Some(pending)
    }

    fn arm_timer(&self, proposal_id: Uuid) {
        let timers = self.timers.clone();
        let timeout = self.confirm_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(commands) = timers.upgrade() {
                let _ = commands.send(Command::Expire { proposal_id });
            }
        });
    }

    fn emit(&self, event: MatchmakingEvent) {
        if self.events.send(event).is_err() {
            debug!("matchmaking event dropped: no consumer");
        }
    }
}
