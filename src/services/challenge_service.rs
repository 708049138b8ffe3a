//! Direct challenges: one user invites another by username, the target accepts or
//! rejects, and unanswered invitations expire.

use std::{sync::Arc, time::Instant};

use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dto::ws::ServerMessage,
    error::ServiceError,
    services::{
        identity::Identity,
        session_service::{self, SessionSetup},
    },
    state::{
        SharedState, UserId,
        challenges::{Challenge, ChallengeError},
        sessions::CreateOutcome,
    },
};

#[derive(Debug, Error)]
pub enum ChallengeServiceError {
    #[error("user `{0}` is not online")]
    UserNotFound(String),
    #[error("no pending challenge from user {0}")]
    NotFound(UserId),
    #[error(transparent)]
    Conflict(#[from] ChallengeError),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Invite `to_username` to a match. The invitation lapses after the configured ttl.
pub async fn issue(
    state: &SharedState,
    from: &Identity,
    to_username: &str,
) -> Result<Uuid, ChallengeServiceError> {
    let target = state
        .players()
        .find_by_username(to_username)
        .ok_or_else(|| ChallengeServiceError::UserNotFound(to_username.to_string()))?;
    for user in [from.user_id, target.user_id] {
        if state.sessions().session_for_user(user).await.is_some() {
            return Err(ServiceError::Busy(format!("user {user} is in a game")).into());
        }
    }

    let challenge = Challenge {
        id: Uuid::new_v4(),
        from: from.user_id,
        from_username: from.username.clone(),
        to: target.user_id,
        to_username: target.username.clone(),
        issued_at: Instant::now(),
    };
    let id = challenge.id;
    state.challenges().issue(challenge)?;

    state.transport().notify(
        target.connection_id,
        &ServerMessage::ChallengeReceived {
            from_user_id: from.user_id,
            from_username: from.username.clone(),
        },
    );
    info!(from = from.user_id, to = target.user_id, challenge_id = %id, "challenge issued");

    let weak = Arc::downgrade(state);
    let ttl = state.config().matchmaking.challenge_ttl;
    let (challenger, target_id) = (from.user_id, target.user_id);
    tokio::spawn(async move {
        sleep(ttl).await;
        let Some(state) = weak.upgrade() else {
            return;
        };
        if let Some(expired) = state.challenges().expire(challenger, target_id, id) {
            debug!(challenge_id = %id, "challenge expired");
            notify_expired(&state, expired.from, &expired.to_username);
        }
    });
    Ok(id)
}

/// Accept the challenge `from_user_id` sent to `me` and start the match.
pub async fn accept(
    state: &SharedState,
    me: &Identity,
    from_user_id: UserId,
) -> Result<CreateOutcome, ChallengeServiceError> {
    let challenge = state
        .challenges()
        .take(from_user_id, me.user_id)
        .ok_or(ChallengeServiceError::NotFound(from_user_id))?;
    if !state.players().is_connected(challenge.from) {
        return Err(ChallengeServiceError::UserNotFound(challenge.from_username));
    }

    for user in [challenge.from, me.user_id] {
        state.matchmaker().leave(user).await;
    }
    let outcome =
        session_service::start_session(state, SessionSetup::multiplayer(challenge.from, me.user_id))
            .await?;
    info!(
        challenge_id = %challenge.id,
        session_id = %outcome.handle().id,
        "challenge accepted"
    );
    Ok(outcome)
}

/// Decline the challenge `from_user_id` sent to `me`.
pub fn reject(
    state: &SharedState,
    me: &Identity,
    from_user_id: UserId,
) -> Result<(), ChallengeServiceError> {
    let challenge = state
        .challenges()
        .take(from_user_id, me.user_id)
        .ok_or(ChallengeServiceError::NotFound(from_user_id))?;
    if let Some(connection) = state.players().connection_of(challenge.from) {
        state.transport().notify(
            connection,
            &ServerMessage::ChallengeRejected {
                by_user_id: me.user_id,
                by_username: me.username.clone(),
            },
        );
    }
    debug!(challenge_id = %challenge.id, "challenge rejected");
    Ok(())
}

/// Withdraw every challenge involving a user who went offline.
pub fn drop_user(state: &SharedState, identity: &Identity) {
    for challenge in state.challenges().drop_user(identity.user_id) {
        let other = if challenge.from == identity.user_id {
            challenge.to
        } else {
            challenge.from
        };
        notify_expired(state, other, &identity.username);
    }
}

fn notify_expired(state: &SharedState, recipient: UserId, username: &str) {
    if let Some(connection) = state.players().connection_of(recipient) {
        state.transport().notify(
            connection,
            &ServerMessage::ChallengeExpired {
                username: username.to_string(),
            },
        );
    }
}
