use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Lifecycle status of a single match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameStatus {
    /// Seats are not filled yet (second player or AI not assigned).
    Waiting,
    /// 3-2-1-GO sequence; physics is suspended.
    Countdown,
    /// The authoritative tick loop is running.
    Playing,
    /// Terminal state, with the reason the match ended.
    Finished(FinishReason),
}

impl GameStatus {
    /// Whether the match reached its terminal state.
    pub fn is_finished(self) -> bool {
        matches!(self, GameStatus::Finished(_))
    }

    /// Wire name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            GameStatus::Waiting => "waiting",
            GameStatus::Countdown => "countdown",
            GameStatus::Playing => "playing",
            GameStatus::Finished(_) => "finished",
        }
    }
}

/// Indicates why a match transitioned to [`GameStatus::Finished`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// A side reached the winning score.
    Victory,
    /// A player left mid-match; the opponent wins.
    Desertion,
    /// Single-player match dropped, or an orphaned session reclaimed. No winner.
    Abandoned,
}

/// Events that can be applied to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEvent {
    /// Every seat is filled; begin the countdown.
    PlayersReady,
    /// The countdown reached GO.
    CountdownElapsed,
    /// End the match.
    Finish(FinishReason),
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The status the state machine was in when the invalid event was received.
    pub from: GameStatus,
    /// The event that cannot be applied from this status.
    pub event: GameEvent,
}

/// Snapshot of the current state machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub status: GameStatus,
    /// Increments on each applied transition.
    pub version: usize,
}

/// Monotonic match lifecycle: `waiting -> countdown -> playing -> finished`, where
/// `finished` is reachable from every other status and never left.
#[derive(Debug, Clone)]
pub struct GameStateMachine {
    status: GameStatus,
    version: usize,
}

impl Default for GameStateMachine {
    fn default() -> Self {
        Self {
            status: GameStatus::Waiting,
            version: 0,
        }
    }
}

impl GameStateMachine {
    /// Create a new state machine initialised in the waiting state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current status.
    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            status: self.status,
            version: self.version,
        }
    }

    /// Apply `event`, returning the new status.
    pub fn apply(&mut self, event: GameEvent) -> Result<GameStatus, InvalidTransition> {
        let next = self.compute_transition(event)?;
        self.status = next;
        self.version += 1;
        Ok(next)
    }

    fn compute_transition(&self, event: GameEvent) -> Result<GameStatus, InvalidTransition> {
        let next = match (self.status, event) {
            (GameStatus::Waiting, GameEvent::PlayersReady) => GameStatus::Countdown,
            (GameStatus::Countdown, GameEvent::CountdownElapsed) => GameStatus::Playing,
            (from, GameEvent::Finish(reason)) if !from.is_finished() => {
                GameStatus::Finished(reason)
            }
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_is_waiting() {
        let sm = GameStateMachine::new();
        assert_eq!(sm.status(), GameStatus::Waiting);
        assert_eq!(sm.snapshot().version, 0);
    }

    #[test]
    fn full_happy_path_through_match() {
        let mut sm = GameStateMachine::new();

        assert_eq!(
            sm.apply(GameEvent::PlayersReady).unwrap(),
            GameStatus::Countdown
        );
        assert_eq!(
            sm.apply(GameEvent::CountdownElapsed).unwrap(),
            GameStatus::Playing
        );
        assert_eq!(
            sm.apply(GameEvent::Finish(FinishReason::Victory)).unwrap(),
            GameStatus::Finished(FinishReason::Victory)
        );
        assert_eq!(sm.snapshot().version, 3);
    }

    #[test]
    fn finish_is_reachable_from_every_live_status() {
        let mut waiting = GameStateMachine::new();
        assert!(waiting.apply(GameEvent::Finish(FinishReason::Abandoned)).is_ok());

        let mut countdown = GameStateMachine::new();
        countdown.apply(GameEvent::PlayersReady).unwrap();
        assert_eq!(
            countdown
                .apply(GameEvent::Finish(FinishReason::Desertion))
                .unwrap(),
            GameStatus::Finished(FinishReason::Desertion)
        );
    }

    #[test]
    fn finished_is_terminal() {
        let mut sm = GameStateMachine::new();
        sm.apply(GameEvent::Finish(FinishReason::Desertion)).unwrap();

        for event in [
            GameEvent::PlayersReady,
            GameEvent::CountdownElapsed,
            GameEvent::Finish(FinishReason::Victory),
        ] {
            let err = sm.apply(event).unwrap_err();
            assert_eq!(err.from, GameStatus::Finished(FinishReason::Desertion));
            assert_eq!(err.event, event);
        }
        assert_eq!(sm.snapshot().version, 1);
    }

    #[test]
    fn skipping_countdown_is_rejected() {
        let mut sm = GameStateMachine::new();
        let err = sm.apply(GameEvent::CountdownElapsed).unwrap_err();
        assert_eq!(err.from, GameStatus::Waiting);
        assert_eq!(sm.status(), GameStatus::Waiting);
    }
}
