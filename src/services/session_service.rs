//! Session runners: one task per match, owning its [`GameSession`].
//!
//! The task is the only writer of the simulation. Everything else reaches it through
//! [`SessionCommand`]s sent on the handle kept in the session registry, and the task reports
//! back through the transport (per-tick state, results) and the registry (status, eviction).

use std::{collections::HashMap, time::SystemTime};

use tokio::{
    sync::mpsc,
    time::{Duration, Instant, MissedTickBehavior, sleep},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    dao::models::{SessionEntity, SessionResultEntity, StoredStatus},
    dto::{
        game::{BallPrediction, FinalScore, GameStateSnapshot},
        session::SessionSummary,
        ws::ServerMessage,
    },
    engine::{Difficulty, GameMode, GameResult, GameSession, PaddleInput, Side, TickOutcome},
    error::ServiceError,
    services::{
        identity::Identity,
        sse_events,
        transport::{ConnectionId, game_group},
    },
    state::{
        SharedState, UserId,
        sessions::{CreateOutcome, Seats},
        state_machine::{FinishReason, GameStatus},
    },
};

const PERSIST_INITIAL_DELAY: Duration = Duration::from_millis(200);
const PERSIST_MAX_DELAY: Duration = Duration::from_secs(5);

/// Messages accepted by a session task.
#[derive(Debug, Clone)]
pub enum SessionCommand {
    /// Paddle command from a seated user. `side` is what the client claimed.
    Input {
        user_id: UserId,
        side: Option<Side>,
        input: PaddleInput,
    },
    /// The user's connection dropped.
    Disconnected { user_id: UserId },
    /// The user is back on a new connection and needs a resync.
    Rejoined {
        user_id: UserId,
        connection_id: ConnectionId,
    },
    /// The user walked away on purpose.
    Leave { user_id: UserId },
    /// Reclaim the session without a winner.
    Abandon,
}

/// What to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSetup {
    pub seats: Seats,
    pub mode: GameMode,
    pub difficulty: Option<Difficulty>,
}

impl SessionSetup {
    pub fn multiplayer(left: UserId, right: UserId) -> Self {
        Self {
            seats: Seats::pair(left, right),
            mode: GameMode::Multiplayer,
            difficulty: None,
        }
    }

    pub fn single_player(user: UserId, difficulty: Difficulty) -> Self {
        Self {
            seats: Seats::solo(user),
            mode: GameMode::SinglePlayer,
            difficulty: Some(difficulty),
        }
    }
}

/// Start a session for `setup`, or return the one already running for the same players.
pub async fn start_session(
    state: &SharedState,
    setup: SessionSetup,
) -> Result<CreateOutcome, ServiceError> {
    let runner_state = state.clone();
    let outcome = state
        .sessions()
        .get_or_create(setup.seats, setup.mode, setup.difficulty, move |id| {
            let (commands_tx, commands_rx) = mpsc::unbounded_channel();
            tokio::spawn(run_session(runner_state, id, setup, commands_rx));
            commands_tx
        })
        .await?;

    match &outcome {
        CreateOutcome::Created(handle) => info!(
            session_id = %handle.id,
            mode = ?setup.mode,
            left = setup.seats.left,
            right = ?setup.seats.right,
            "session created"
        ),
        CreateOutcome::Existing(handle) => {
            debug!(session_id = %handle.id, "session already running for this pair")
        }
    }
    Ok(outcome)
}

/// Point the user's running session at their new connection. Returns `false` when the user
/// is not seated anywhere.
pub async fn rejoin(state: &SharedState, identity: &Identity, connection_id: ConnectionId) -> bool {
    match state.sessions().session_for_user(identity.user_id).await {
        Some(handle) => handle.send(SessionCommand::Rejoined {
            user_id: identity.user_id,
            connection_id,
        }),
        None => false,
    }
}

/// Summaries of every session the registry still holds.
pub async fn list_sessions(state: &SharedState) -> Vec<SessionSummary> {
    state
        .sessions()
        .list()
        .await
        .into_iter()
        .map(SessionSummary::from)
        .collect()
}

/// Summary of one session still held in memory.
pub async fn session_summary(state: &SharedState, id: Uuid) -> Result<SessionSummary, ServiceError> {
    state
        .sessions()
        .list()
        .await
        .into_iter()
        .find(|info| info.id == id)
        .map(SessionSummary::from)
        .ok_or_else(|| ServiceError::NotFound(format!("session {id}")))
}

/// Store a final result, retrying transient failures with exponential backoff.
///
/// Returns whether this call wrote the result (`false` if it was already stored). A failure
/// the store will keep refusing is returned after the first attempt.
pub async fn persist_result(
    state: &SharedState,
    result: &SessionResultEntity,
) -> Result<bool, ServiceError> {
    let attempts = state.config().sessions.persist_attempts.max(1);
    let mut delay = PERSIST_INITIAL_DELAY;
    let mut attempt = 1;
    loop {
        match store_result(state, result).await {
            Ok(written) => return Ok(written),
            Err(err) if !err.is_transient() => {
                error!(
                    session_id = %result.session_id,
                    attempt,
                    error = %err,
                    "session result rejected by storage; not retrying"
                );
                return Err(err);
            }
            Err(err) if attempt >= attempts => return Err(err),
            Err(err) => {
                warn!(
                    session_id = %result.session_id,
                    attempt,
                    error = %err,
                    "failed to store session result; retrying"
                );
            }
        }
        sleep(delay).await;
        delay = (delay * 2).min(PERSIST_MAX_DELAY);
        attempt += 1;
    }
}

/// One attempt at storing a result.
pub async fn store_result(
    state: &SharedState,
    result: &SessionResultEntity,
) -> Result<bool, ServiceError> {
    let store = state.game_store().await.ok_or(ServiceError::Degraded)?;
    Ok(store.record_result(result.clone()).await?)
}

async fn run_session(
    state: SharedState,
    id: Uuid,
    setup: SessionSetup,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
) {
    let mut runner = SessionRunner::new(state, id, setup);
    runner.announce();
    let result = runner.play(&mut commands).await;
    runner.finalize(result).await;
}

struct SessionRunner {
    state: SharedState,
    id: Uuid,
    setup: SessionSetup,
    game: GameSession,
    group: String,
    /// Deadline after which a vacant seat loses the match.
    vacancies: HashMap<Side, Instant>,
    grace: Duration,
    journal: mpsc::UnboundedSender<StoredStatus>,
}

impl SessionRunner {
    fn new(state: SharedState, id: Uuid, setup: SessionSetup) -> Self {
        let config = state.config();
        let game = GameSession::new(&config.game, setup.mode, setup.difficulty);
        let grace = match setup.mode {
            GameMode::SinglePlayer => config.sessions.abandon_grace,
            GameMode::Multiplayer => config.sessions.forfeit_grace,
        };
        let now = SystemTime::now();
        let journal = spawn_journal(
            state.clone(),
            SessionEntity {
                id,
                mode: setup.mode,
                difficulty: game.difficulty(),
                player1_id: setup.seats.left,
                player2_id: setup.seats.right,
                status: StoredStatus::Waiting,
                created_at: now,
                updated_at: now,
                result: None,
            },
        );
        Self {
            state,
            id,
            setup,
            game,
            group: game_group(id),
            vacancies: HashMap::new(),
            grace,
            journal,
        }
    }

    /// Put the seated players' connections in the game group and tell each one its side.
    fn announce(&self) {
        let transport = self.state.transport();
        for side in Side::BOTH {
            let Some(user_id) = self.setup.seats.user_at(side) else {
                continue;
            };
            let Some(connection) = self.state.players().connection_of(user_id) else {
                continue;
            };
            transport.join_group(connection, &self.group);
            let message = ServerMessage::GameStart {
                session_id: self.id,
                player1_id: self.setup.seats.left,
                player2_id: self.setup.seats.right,
                side,
                mode: self.setup.mode,
                difficulty: self.game.difficulty(),
            };
            if let Err(err) = transport.send(connection, &message) {
                debug!(session_id = %self.id, user_id, error = %err, "game_start not delivered");
            }
        }
        sse_events::broadcast_match_started(&self.state, self.id, &self.setup);
    }

    async fn play(&mut self, commands: &mut mpsc::UnboundedReceiver<SessionCommand>) -> GameResult {
        if let Err(err) = self.game.start_countdown() {
            warn!(session_id = %self.id, error = %err, "countdown refused");
        }
        self.status_changed().await;
        self.broadcast_state();

        let absent: Vec<UserId> = self
            .setup
            .seats
            .users()
            .filter(|user| !self.state.players().is_connected(*user))
            .collect();
        for user_id in absent {
            if let Some(result) = self.handle(SessionCommand::Disconnected { user_id }) {
                return result;
            }
        }

        let tick = self.state.config().game.tick_interval();
        let dt = tick.as_secs_f64();
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Some(result) = self.expire_vacancies() {
                        return result;
                    }
                    match self.game.tick(dt) {
                        TickOutcome::Idle => {}
                        TickOutcome::Countdown(_) | TickOutcome::Advanced => self.broadcast_state(),
                        TickOutcome::Scored(side) => {
                            debug!(
                                session_id = %self.id,
                                scorer = side.as_str(),
                                left = self.game.left.score,
                                right = self.game.right.score,
                                "point scored"
                            );
                            self.broadcast_state();
                        }
                        TickOutcome::Started => {
                            self.status_changed().await;
                            self.broadcast_state();
                        }
                        TickOutcome::Finished(result) => {
                            self.broadcast_state();
                            return result;
                        }
                    }
                }
                command = commands.recv() => {
                    let Some(command) = command else {
                        return self.conclude(FinishReason::Abandoned, None);
                    };
                    if let Some(result) = self.handle(command) {
                        return result;
                    }
                }
            }
        }
    }

    fn handle(&mut self, command: SessionCommand) -> Option<GameResult> {
        match command {
            SessionCommand::Input {
                user_id,
                side,
                input,
            } => {
                let seat = self.seat_of(user_id)?;
                if side.is_some_and(|claimed| claimed != seat) {
                    debug!(session_id = %self.id, user_id, ?side, "input for a side the user does not hold");
                    return None;
                }
                if let Err(rejected) = self.game.apply_input(seat, input) {
                    debug!(session_id = %self.id, user_id, reason = %rejected, "input dropped");
                }
                None
            }
            SessionCommand::Disconnected { user_id } => {
                let seat = self.seat_of(user_id)?;
                if self.grace.is_zero() {
                    info!(session_id = %self.id, user_id, "player left mid-match");
                    return Some(self.vacate(seat));
                }
                let deadline = Instant::now() + self.grace;
                self.vacancies.insert(seat, deadline);
                self.game.suspend();
                info!(
                    session_id = %self.id,
                    user_id,
                    grace_ms = self.grace.as_millis() as u64,
                    "player disconnected; session suspended"
                );
                self.broadcast_state();
                None
            }
            SessionCommand::Rejoined {
                user_id,
                connection_id,
            } => {
                let seat = self.seat_of(user_id)?;
                if self.vacancies.remove(&seat).is_some() {
                    info!(session_id = %self.id, user_id, "player rejoined");
                }
                if self.vacancies.is_empty() {
                    self.game.resume();
                }
                self.resync(seat, connection_id);
                None
            }
            SessionCommand::Leave { user_id } => {
                let seat = self.seat_of(user_id)?;
                info!(session_id = %self.id, user_id, "player left the game");
                Some(self.vacate(seat))
            }
            SessionCommand::Abandon => {
                info!(session_id = %self.id, "session reclaimed");
                Some(self.conclude(FinishReason::Abandoned, None))
            }
        }
    }

    fn seat_of(&self, user_id: UserId) -> Option<Side> {
        let seat = self.setup.seats.side_of(user_id);
        if seat.is_none() {
            debug!(session_id = %self.id, user_id, "command from a user without a seat");
        }
        seat
    }

    /// `seat` is gone for good: desertion in multiplayer, abandonment against the AI.
    fn vacate(&mut self, seat: Side) -> GameResult {
        match self.setup.mode {
            GameMode::Multiplayer => self.conclude(FinishReason::Desertion, Some(seat)),
            GameMode::SinglePlayer => self.conclude(FinishReason::Abandoned, None),
        }
    }

    fn conclude(&mut self, reason: FinishReason, deserter: Option<Side>) -> GameResult {
        let outcome = match (reason, deserter) {
            (FinishReason::Desertion, Some(side)) => self.game.forfeit(side),
            _ => self.game.abandon(),
        };
        outcome.or_else(|| self.game.result()).unwrap_or(GameResult {
            winner: None,
            reason,
            score_left: self.game.left.score,
            score_right: self.game.right.score,
        })
    }

    fn expire_vacancies(&mut self) -> Option<GameResult> {
        let now = Instant::now();
        let expired = self
            .vacancies
            .iter()
            .find(|(_, deadline)| **deadline <= now)
            .map(|(side, _)| *side)?;
        info!(session_id = %self.id, side = expired.as_str(), "reconnection grace expired");
        Some(self.vacate(expired))
    }

    fn resync(&self, seat: Side, connection_id: ConnectionId) {
        let transport = self.state.transport();
        transport.join_group(connection_id, &self.group);
        let message = ServerMessage::Resync {
            session_id: self.id,
            side: seat,
            state: GameStateSnapshot::from(&self.game),
            prediction: BallPrediction::from(&self.game),
        };
        if let Err(err) = transport.send(connection_id, &message) {
            debug!(session_id = %self.id, error = %err, "resync not delivered");
        }
    }

    fn broadcast_state(&self) {
        let message = ServerMessage::GameState {
            state: GameStateSnapshot::from(&self.game),
        };
        self.state.transport().broadcast(&self.group, &message);
    }

    async fn status_changed(&self) {
        let status = self.game.status();
        self.state.sessions().set_status(self.id, status).await;
        self.journal(status);
    }

    fn journal(&self, status: GameStatus) {
        if self.journal.send(status.into()).is_err() {
            warn!(session_id = %self.id, ?status, "session journal closed; status not stored");
        }
    }

    /// Announce the result, free the players and store the outcome.
    async fn finalize(self, result: GameResult) {
        let winner_id = result
            .winner
            .and_then(|side| self.setup.seats.user_at(side));
        let transport = self.state.transport();
        transport.broadcast(
            &self.group,
            &ServerMessage::GameFinished {
                winner: result.winner,
                winner_id,
                reason: result.reason,
                final_score: FinalScore::from(&result),
            },
        );
        transport.dissolve_group(&self.group);

        let sessions = self.state.sessions();
        let finished = GameStatus::Finished(result.reason);
        sessions.set_status(self.id, finished).await;
        self.journal(finished);
        sessions.release_players(self.id).await;
        sse_events::broadcast_match_finished(&self.state, self.id, &result, winner_id);
        info!(
            session_id = %self.id,
            reason = ?result.reason,
            winner = result.winner.map(Side::as_str),
            score_left = result.score_left,
            score_right = result.score_right,
            "session finished"
        );

        let record = SessionResultEntity {
            session_id: self.id,
            mode: self.setup.mode,
            player1_id: self.setup.seats.left,
            player2_id: self.setup.seats.right,
            winner_id,
            score_left: result.score_left,
            score_right: result.score_right,
            reason: result.reason,
            finished_at: SystemTime::now(),
        };
        match persist_result(&self.state, &record).await {
            Ok(_) => {
                sessions.evict(self.id).await;
            }
            Err(err) if !err.is_transient() => {
                sessions.evict(self.id).await;
            }
            Err(err) => {
                warn!(
                    session_id = %self.id,
                    error = %err,
                    "session result not stored; keeping it for the reaper"
                );
                sessions.mark_unpersisted(self.id, record).await;
            }
        }
    }
}

/// Write the session record and its status changes in order, off the tick path.
fn spawn_journal(state: SharedState, entity: SessionEntity) -> mpsc::UnboundedSender<StoredStatus> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let id = entity.id;
        let Some(store) = state.game_store().await else {
            debug!(session_id = %id, "no storage backend; session record skipped");
            return;
        };
        if let Err(err) = store.create_session(entity).await {
            warn!(session_id = %id, error = %err, "failed to store session record");
            return;
        }
        while let Some(status) = rx.recv().await {
            if let Err(err) = store.update_status(id, status).await {
                warn!(session_id = %id, error = %err, "failed to store session status");
            }
        }
    });
    tx
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };

    use futures::future::BoxFuture;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            game_store::{GameStore, memory::MemoryGameStore},
            storage::{StorageError, StorageResult},
        },
        state::AppState,
        test_support::{connect, disconnect, is_type, playing, state_with_store, wait_until},
    };

    #[tokio::test(start_paused = true)]
    async fn desertion_hands_the_win_to_the_remaining_player() {
        let (state, store) = state_with_store(AppConfig::default()).await;
        let mut alice = connect(&state, 1, "alice");
        let mut bob = connect(&state, 2, "bob");

        let outcome = start_session(&state, SessionSetup::multiplayer(1, 2))
            .await
            .unwrap();
        let session_id = outcome.handle().id;

        let start = alice.wait_for_type("game_start").await;
        assert_eq!(start["side"], "left");
        let start = bob.wait_for_type("game_start").await;
        assert_eq!(start["side"], "right");
        alice.wait_for(playing).await;

        disconnect(&state, &alice);
        outcome.handle().send(SessionCommand::Disconnected { user_id: 1 });

        let finished = bob.wait_for_type("game_finished").await;
        assert_eq!(finished["winner"], "right");
        assert_eq!(finished["winner_id"], 2);
        assert_eq!(finished["reason"], "desertion");

        wait_until(|| {
            let state = state.clone();
            async move { state.sessions().get(session_id).await.is_none() }
        })
        .await;
        let stored = store.find_session(session_id).await.unwrap().unwrap();
        let result = stored.result.unwrap();
        assert_eq!(result.winner_id, Some(2));
        assert_eq!(result.reason, FinishReason::Desertion);
        assert!(state.sessions().session_for_user(2).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn inputs_only_move_the_senders_own_paddle() {
        let (state, _store) = state_with_store(AppConfig::default()).await;
        let mut alice = connect(&state, 1, "alice");
        let _bob = connect(&state, 2, "bob");
        let outcome = start_session(&state, SessionSetup::multiplayer(1, 2))
            .await
            .unwrap();
        alice.wait_for(playing).await;

        let handle = outcome.handle();
        handle.send(SessionCommand::Input {
            user_id: 1,
            side: Some(Side::Right),
            input: PaddleInput {
                direction: 1,
                timestamp: 1.0,
                force_stop: false,
            },
        });
        handle.send(SessionCommand::Input {
            user_id: 1,
            side: None,
            input: PaddleInput {
                direction: 1,
                timestamp: 2.0,
                force_stop: false,
            },
        });

        let frame = alice
            .wait_for(|v| is_type(v, "game_state") && v["state"]["paddles"]["left"]["y"] == 260.0)
            .await;
        assert_eq!(frame["state"]["paddles"]["right"]["y"], 250.0);
    }

    #[tokio::test(start_paused = true)]
    async fn single_player_survives_a_short_disconnect() {
        let (state, _store) = state_with_store(AppConfig::default()).await;
        let mut alice = connect(&state, 1, "alice");
        let outcome = start_session(&state, SessionSetup::single_player(1, Difficulty::Easy))
            .await
            .unwrap();
        alice.wait_for(playing).await;

        disconnect(&state, &alice);
        outcome.handle().send(SessionCommand::Disconnected { user_id: 1 });
        sleep(Duration::from_secs(3)).await;

        let mut alice = connect(&state, 1, "alice");
        assert!(rejoin(&state, &alice.identity, alice.connection_id).await);

        let resync = alice.wait_for_type("resync").await;
        assert_eq!(resync["side"], "left");
        assert_eq!(resync["state"]["status"], "playing");
        assert_eq!(resync["prediction"]["path"].as_array().unwrap().len(), 10);
        let frame = alice.wait_for_type("game_state").await;
        assert_eq!(frame["state"]["paused"], false);
    }

    #[tokio::test(start_paused = true)]
    async fn single_player_is_abandoned_after_the_grace_period() {
        let (state, store) = state_with_store(AppConfig::default()).await;
        let mut alice = connect(&state, 1, "alice");
        let outcome = start_session(&state, SessionSetup::single_player(1, Difficulty::Hard))
            .await
            .unwrap();
        let session_id = outcome.handle().id;
        alice.wait_for(playing).await;

        disconnect(&state, &alice);
        outcome.handle().send(SessionCommand::Disconnected { user_id: 1 });

        wait_until(|| {
            let state = state.clone();
            async move { state.sessions().get(session_id).await.is_none() }
        })
        .await;
        let result = store
            .find_session(session_id)
            .await
            .unwrap()
            .unwrap()
            .result
            .unwrap();
        assert_eq!(result.reason, FinishReason::Abandoned);
        assert_eq!(result.winner_id, None);
    }

    #[tokio::test(start_paused = true)]
    async fn starting_twice_for_the_same_pair_reuses_the_session() {
        let (state, _store) = state_with_store(AppConfig::default()).await;
        let _alice = connect(&state, 1, "alice");
        let _bob = connect(&state, 2, "bob");

        let first = start_session(&state, SessionSetup::multiplayer(1, 2))
            .await
            .unwrap();
        let second = start_session(&state, SessionSetup::multiplayer(2, 1))
            .await
            .unwrap();

        assert!(matches!(first, CreateOutcome::Created(_)));
        assert!(matches!(second, CreateOutcome::Existing(_)));
        assert_eq!(first.handle().id, second.handle().id);
        assert_eq!(state.sessions().len().await, 1);

        let listed = list_sessions(&state).await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].player1_id, 1);
        assert_eq!(listed[0].player2_id, Some(2));
        let found = session_summary(&state, first.handle().id).await.unwrap();
        assert_eq!(found.id, first.handle().id);
        assert!(matches!(
            session_summary(&state, Uuid::new_v4()).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    /// Fails the first `failures` result writes, with `NotFound` when `permanent` is set.
    struct FlakyStore {
        inner: MemoryGameStore,
        failures: Arc<AtomicU32>,
        attempts: Arc<AtomicU32>,
        permanent: bool,
    }

    impl FlakyStore {
        fn failing(inner: MemoryGameStore, failures: u32) -> Self {
            Self {
                inner,
                failures: Arc::new(AtomicU32::new(failures)),
                attempts: Arc::new(AtomicU32::new(0)),
                permanent: false,
            }
        }
    }

    impl GameStore for FlakyStore {
        fn create_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<Uuid>> {
            self.inner.create_session(session)
        }

        fn update_status(
            &self,
            id: Uuid,
            status: StoredStatus,
        ) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.update_status(id, status)
        }

        fn record_result(
            &self,
            result: SessionResultEntity,
        ) -> BoxFuture<'static, StorageResult<bool>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                let id = result.session_id;
                let err = if self.permanent {
                    StorageError::NotFound(id)
                } else {
                    StorageError::Conflict(id)
                };
                return Box::pin(async move { Err(err) });
            }
            self.inner.record_result(result)
        }

        fn find_session(
            &self,
            id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
            self.inner.find_session(id)
        }

        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.health_check()
        }

        fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.try_reconnect()
        }
    }

    fn result_record() -> SessionResultEntity {
        SessionResultEntity {
            session_id: Uuid::new_v4(),
            mode: GameMode::Multiplayer,
            player1_id: 1,
            player2_id: Some(2),
            winner_id: Some(1),
            score_left: 10,
            score_right: 7,
            reason: FinishReason::Victory,
            finished_at: SystemTime::now(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn persistence_retries_transient_failures() {
        let state = AppState::new(AppConfig::default());
        let inner = MemoryGameStore::new();
        state
            .install_game_store(Arc::new(FlakyStore::failing(inner.clone(), 2)))
            .await;
        let record = result_record();

        assert!(persist_result(&state, &record).await.unwrap());
        assert!(!persist_result(&state, &record).await.unwrap());
        assert!(
            inner
                .find_session(record.session_id)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn persistence_gives_up_after_configured_attempts() {
        let state = AppState::new(AppConfig::default());
        let store = FlakyStore::failing(MemoryGameStore::new(), u32::MAX);
        let attempts = store.attempts.clone();
        state.install_game_store(Arc::new(store)).await;

        let err = persist_result(&state, &result_record()).await.unwrap_err();

        assert!(matches!(err, ServiceError::Unavailable(_)));
        assert_eq!(
            attempts.load(Ordering::SeqCst),
            state.config().sessions.persist_attempts
        );
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_storage_errors_are_not_retried() {
        let state = AppState::new(AppConfig::default());
        let store = FlakyStore {
            permanent: true,
            ..FlakyStore::failing(MemoryGameStore::new(), u32::MAX)
        };
        let attempts = store.attempts.clone();
        state.install_game_store(Arc::new(store)).await;

        let err = persist_result(&state, &result_record()).await.unwrap_err();

        assert!(!err.is_transient());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn journal_records_the_finish_when_the_result_is_deferred() {
        let state = AppState::new(AppConfig::default());
        let inner = MemoryGameStore::new();
        state
            .install_game_store(Arc::new(FlakyStore::failing(inner.clone(), u32::MAX)))
            .await;
        let mut alice = connect(&state, 1, "alice");
        let outcome = start_session(&state, SessionSetup::single_player(1, Difficulty::Easy))
            .await
            .unwrap();
        let session_id = outcome.handle().id;
        alice.wait_for(playing).await;

        outcome.handle().send(SessionCommand::Leave { user_id: 1 });

        wait_until(|| {
            let inner = inner.clone();
            async move {
                inner
                    .find_session(session_id)
                    .await
                    .unwrap()
                    .is_some_and(|session| session.status == StoredStatus::Finished)
            }
        })
        .await;
        let stored = inner.find_session(session_id).await.unwrap().unwrap();
        assert!(stored.result.is_none());
    }

    #[tokio::test]
    async fn persistence_without_a_store_reports_degraded() {
        let state = AppState::new(AppConfig::default());

        let err = store_result(&state, &result_record()).await.unwrap_err();

        assert!(matches!(err, ServiceError::Degraded));
    }
}
