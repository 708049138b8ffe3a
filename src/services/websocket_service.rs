use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{ClientMessage, ErrorCode, QueueState, ServerMessage},
    engine::{PaddleInput, Side},
    error::ServiceError,
    services::{
        challenge_service::{self, ChallengeServiceError},
        identity::Identity,
        matchmaking::{MatchmakingError, QueueEntry},
        messaging::{self, MessagingError},
        presence,
        session_service::{self, SessionCommand, SessionSetup},
        sse_events,
        transport::{ConnectionId, OutboundSender},
    },
    state::{SharedState, UserId, players::RegistrationError},
};

const IDENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Internal error type for inbound message handling.
///
/// Distinct from `ServiceError`, which is used for HTTP responses. Only failures the client
/// can act on are reported back as `error` frames.
#[derive(Debug, Error)]
enum ConnectionError {
    /// Writer channel closed - connection should be terminated immediately.
    #[error("connection closed")]
    ConnectionClosed,
    /// A user id in the message doesn't match the connection's identity.
    #[error("message claims user {got}, connection belongs to {expected}")]
    IdentityMismatch { expected: UserId, got: UserId },
    /// A username in the message doesn't match the connection's identity.
    #[error("message addressed to `{got}`, connection belongs to `{expected}`")]
    UsernameMismatch { expected: String, got: String },
    /// Game command from a user without a running session.
    #[error("not in a running game")]
    NotInGame,
    #[error("unsupported message type")]
    UnknownMessage,
    #[error(transparent)]
    Matchmaking(#[from] MatchmakingError),
    #[error(transparent)]
    Challenge(#[from] ChallengeServiceError),
    #[error(transparent)]
    Messaging(#[from] MessagingError),
    /// Error from session or persistence operations.
    #[error("service error: {0}")]
    Service(#[from] ServiceError),
}

impl ConnectionError {
    /// Code sent to the client, if the failure is worth reporting.
    fn wire_code(&self) -> Option<ErrorCode> {
        let code = match self {
            ConnectionError::ConnectionClosed => return None,
            ConnectionError::IdentityMismatch { .. } | ConnectionError::UsernameMismatch { .. } => {
                ErrorCode::IdentityMismatch
            }
            ConnectionError::NotInGame => ErrorCode::NotInGame,
            ConnectionError::UnknownMessage => ErrorCode::InvalidMessage,
            ConnectionError::Matchmaking(MatchmakingError::Closed) => ErrorCode::ServiceUnavailable,
            ConnectionError::Matchmaking(_) => ErrorCode::AlreadyQueued,
            ConnectionError::Challenge(ChallengeServiceError::UserNotFound(_))
            | ConnectionError::Messaging(MessagingError::UserNotFound(_)) => ErrorCode::UserNotFound,
            ConnectionError::Messaging(MessagingError::SelfMessage(_)) => ErrorCode::InvalidMessage,
            ConnectionError::Challenge(ChallengeServiceError::NotFound(_)) => {
                ErrorCode::ChallengeNotFound
            }
            ConnectionError::Challenge(ChallengeServiceError::Conflict(_)) => {
                ErrorCode::ChallengeConflict
            }
            ConnectionError::Challenge(ChallengeServiceError::Service(err))
            | ConnectionError::Service(err) => service_code(err),
        };
        Some(code)
    }
}

fn service_code(err: &ServiceError) -> ErrorCode {
    match err {
        ServiceError::Busy(_) => ErrorCode::AlreadyInGame,
        ServiceError::InvalidState(_) => ErrorCode::InvalidMessage,
        ServiceError::NotFound(_) => ErrorCode::NotInGame,
        _ => ErrorCode::ServiceUnavailable,
    }
}

/// An identified socket.
#[derive(Debug, Clone)]
pub(crate) struct ConnectionContext {
    pub identity: Identity,
    pub connection_id: ConnectionId,
}

/// What a dropped connection left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DisconnectKind {
    /// Seated in a running session; the session decides between grace and forfeit.
    MidMatch,
    /// Waiting in the matchmaking queue or on a proposal.
    Queue,
    /// Only present in the lobby.
    Lobby,
}

/// Handle the full lifecycle for an individual player WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let initial_message = match tokio::time::timeout(IDENT_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => {
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Ok(_))) => {
            reject(&outbound_tx, ErrorCode::IdentificationRequired, "expected identify");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(error = %err, "websocket receive error");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(None) | Err(_) => {
            warn!("websocket identification timed out");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let token = match ClientMessage::from_json_str(&initial_message) {
        Ok(ClientMessage::Identify { token }) => token,
        Ok(other) => {
            warn!(kind = other.kind(), "first message was not identification");
            reject(&outbound_tx, ErrorCode::IdentificationRequired, "expected identify");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Err(err) => {
            warn!(error = %err, "failed to parse or validate identification");
            reject(&outbound_tx, ErrorCode::IdentificationRequired, "expected identify");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let identity = match state.identity().resolve(&token).await {
        Ok(identity) => identity,
        Err(err) => {
            warn!(error = %err, "identification failed");
            reject(&outbound_tx, ErrorCode::IdentificationFailed, err.to_string());
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let ctx = match register_connection(&state, identity, outbound_tx.clone()) {
        Ok(ctx) => ctx,
        Err(err) => {
            warn!(error = %err, "connection refused");
            let code = match err {
                RegistrationError::AlreadyConnected(_) => ErrorCode::AlreadyConnected,
                RegistrationError::UsernameTaken(_) => ErrorCode::IdentificationFailed,
            };
            reject(&outbound_tx, code, err.to_string());
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };
    info!(
        user_id = ctx.identity.user_id,
        username = %ctx.identity.username,
        connection_id = %ctx.connection_id,
        "player connected"
    );

    if announce(&state, &ctx).await.is_err() {
        info!(user_id = ctx.identity.user_id, "connection closed during handshake, terminating");
        disconnect(&state, &ctx).await;
        finalize(writer_task, outbound_tx).await;
        return;
    }

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let result = match ClientMessage::from_json_str(&text) {
                    Ok(message) => dispatch(&state, &ctx, message).await,
                    Err(err) => {
                        debug!(user_id = ctx.identity.user_id, error = %err, "dropping invalid message");
                        send(
                            &state,
                            &ctx,
                            &ServerMessage::error(ErrorCode::InvalidMessage, err.to_string()),
                        )
                    }
                };
                if let Err(err) = result {
                    if matches!(err, ConnectionError::ConnectionClosed) {
                        info!(user_id = ctx.identity.user_id, "connection closed while handling message, terminating");
                        break;
                    }
                    debug!(user_id = ctx.identity.user_id, error = %err, "message refused");
                    if let Some(code) = err.wire_code() {
                        let refusal = ServerMessage::error(code, err.to_string());
                        if send(&state, &ctx, &refusal).is_err() {
                            break;
                        }
                    }
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(user_id = ctx.identity.user_id, "player closed the connection");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(user_id = ctx.identity.user_id, error = %err, "websocket error");
                break;
            }
        }
    }

    disconnect(&state, &ctx).await;
    finalize(writer_task, outbound_tx).await;
}

/// Claim the user's connection slot and attach the writer channel to the transport.
pub(crate) fn register_connection(
    state: &SharedState,
    identity: Identity,
    outbound_tx: OutboundSender,
) -> Result<ConnectionContext, RegistrationError> {
    let connection_id = Uuid::new_v4();
    state.players().register(&identity, connection_id)?;
    state.connections().register(connection_id, outbound_tx);
    Ok(ConnectionContext {
        identity,
        connection_id,
    })
}

/// Greet an identified connection: presence, then a resync if a match is still running.
async fn announce(state: &SharedState, ctx: &ConnectionContext) -> Result<(), ConnectionError> {
    send(
        state,
        ctx,
        &ServerMessage::Identified {
            user_id: ctx.identity.user_id,
            username: ctx.identity.username.clone(),
        },
    )?;
    presence::on_connect(state, &ctx.identity, ctx.connection_id)
        .map_err(|_| ConnectionError::ConnectionClosed)?;
    if session_service::rejoin(state, &ctx.identity, ctx.connection_id).await {
        info!(user_id = ctx.identity.user_id, "reconnected into a running session");
    }
    Ok(())
}

/// Route one decoded message.
async fn dispatch(
    state: &SharedState,
    ctx: &ConnectionContext,
    message: ClientMessage,
) -> Result<(), ConnectionError> {
    let user_id = ctx.identity.user_id;
    match message {
        ClientMessage::Identify { .. } => {
            warn!(user_id, "ignoring duplicate identification message");
            Ok(())
        }
        ClientMessage::JoinQueue => {
            if state.sessions().session_for_user(user_id).await.is_some() {
                return Err(ServiceError::Busy(format!("user {user_id} is in a game")).into());
            }
            let entry = QueueEntry::new(user_id, ctx.identity.username.clone(), ctx.connection_id);
            let position = state.matchmaker().enqueue(entry).await?;
            info!(user_id, position, "joined queue");
            sse_events::broadcast_queue_size(state, state.matchmaker().len().await);
            send(
                state,
                ctx,
                &ServerMessage::QueueStatus {
                    status: QueueState::Queued,
                    position: Some(position),
                },
            )
        }
        ClientMessage::LeaveQueue => {
            if state.matchmaker().leave(user_id).await {
                info!(user_id, "left queue");
                sse_events::broadcast_queue_size(state, state.matchmaker().len().await);
            }
            send(
                state,
                ctx,
                &ServerMessage::QueueStatus {
                    status: QueueState::Left,
                    position: None,
                },
            )
        }
        ClientMessage::Ready => {
            state.matchmaker().ready(user_id);
            Ok(())
        }
        ClientMessage::StartSinglePlayer { difficulty } => {
            if state.matchmaker().leave(user_id).await {
                sse_events::broadcast_queue_size(state, state.matchmaker().len().await);
            }
            session_service::start_session(state, SessionSetup::single_player(user_id, difficulty))
                .await?;
            Ok(())
        }
        ClientMessage::PaddleMove {
            side,
            direction,
            timestamp,
            player_id,
            ..
        } => forward_input(
            state,
            ctx,
            player_id,
            side,
            PaddleInput {
                direction,
                timestamp,
                force_stop: false,
            },
        )
        .await,
        ClientMessage::ForceStop {
            side,
            timestamp,
            player_id,
        } => forward_input(
            state,
            ctx,
            player_id,
            side,
            PaddleInput {
                direction: 0,
                timestamp,
                force_stop: true,
            },
        )
        .await,
        ClientMessage::Challenge {
            from_user_id,
            to_username,
        } => {
            ensure_user(ctx, from_user_id)?;
            challenge_service::issue(state, &ctx.identity, &to_username).await?;
            Ok(())
        }
        ClientMessage::Accept {
            from_user_id,
            to_username,
        } => {
            ensure_username(ctx, &to_username)?;
            challenge_service::accept(state, &ctx.identity, from_user_id).await?;
            Ok(())
        }
        ClientMessage::Reject {
            from_user_id,
            to_username,
        } => {
            ensure_username(ctx, &to_username)?;
            challenge_service::reject(state, &ctx.identity, from_user_id)?;
            Ok(())
        }
        ClientMessage::Rejoin => {
            if session_service::rejoin(state, &ctx.identity, ctx.connection_id).await {
                Ok(())
            } else {
                Err(ConnectionError::NotInGame)
            }
        }
        ClientMessage::LeaveGame => {
            let handle = state
                .sessions()
                .session_for_user(user_id)
                .await
                .ok_or(ConnectionError::NotInGame)?;
            handle.send(SessionCommand::Leave { user_id });
            Ok(())
        }
        ClientMessage::DirectMessage {
            to_username,
            content,
        } => {
            messaging::send_direct(
                state,
                &ctx.identity,
                ctx.connection_id,
                &to_username,
                &content,
            )?;
            Ok(())
        }
        ClientMessage::Ping => send(state, ctx, &ServerMessage::Pong),
        ClientMessage::Unknown => Err(ConnectionError::UnknownMessage),
    }
}

async fn forward_input(
    state: &SharedState,
    ctx: &ConnectionContext,
    player_id: Option<UserId>,
    side: Option<Side>,
    input: PaddleInput,
) -> Result<(), ConnectionError> {
    let user_id = ctx.identity.user_id;
    if let Some(claimed) = player_id {
        ensure_user(ctx, claimed)?;
    }
    let handle = state
        .sessions()
        .session_for_user(user_id)
        .await
        .ok_or(ConnectionError::NotInGame)?;
    handle.send(SessionCommand::Input {
        user_id,
        side,
        input,
    });
    Ok(())
}

fn ensure_user(ctx: &ConnectionContext, claimed: UserId) -> Result<(), ConnectionError> {
    if claimed == ctx.identity.user_id {
        Ok(())
    } else {
        Err(ConnectionError::IdentityMismatch {
            expected: ctx.identity.user_id,
            got: claimed,
        })
    }
}

fn ensure_username(ctx: &ConnectionContext, claimed: &str) -> Result<(), ConnectionError> {
    if claimed.eq_ignore_ascii_case(&ctx.identity.username) {
        Ok(())
    } else {
        Err(ConnectionError::UsernameMismatch {
            expected: ctx.identity.username.clone(),
            got: claimed.to_string(),
        })
    }
}

/// Release everything the connection held and tell whoever needs to know.
pub(crate) async fn disconnect(state: &SharedState, ctx: &ConnectionContext) -> DisconnectKind {
    let user_id = ctx.identity.user_id;
    state.players().unregister(user_id, ctx.connection_id);
    state.connections().unregister(ctx.connection_id);

    let kind = if let Some(handle) = state.sessions().session_for_user(user_id).await {
        handle.send(SessionCommand::Disconnected { user_id });
        DisconnectKind::MidMatch
    } else if state.matchmaker().leave(user_id).await {
        sse_events::broadcast_queue_size(state, state.matchmaker().len().await);
        DisconnectKind::Queue
    } else {
        DisconnectKind::Lobby
    };

    challenge_service::drop_user(state, &ctx.identity);
    presence::on_disconnect(state, &ctx.identity);
    info!(user_id, ?kind, "player disconnected");
    kind
}

fn send(
    state: &SharedState,
    ctx: &ConnectionContext,
    message: &ServerMessage,
) -> Result<(), ConnectionError> {
    state
        .transport()
        .send(ctx.connection_id, message)
        .map_err(|_| ConnectionError::ConnectionClosed)
}

/// Push an error frame and a close frame to a socket that never got registered.
fn reject(tx: &OutboundSender, code: ErrorCode, message: impl Into<String>) {
    match serde_json::to_string(&ServerMessage::error(code, message)) {
        Ok(payload) => {
            let _ = tx.send(Message::Text(payload.into()));
        }
        Err(err) => warn!(error = %err, "failed to serialize error frame"),
    }
    let _ = tx.send(Message::Close(None));
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}

#[cfg(test)]
mod tests {
    use tokio::time::{Duration, sleep};

    use super::*;
    use crate::{
        config::AppConfig,
        engine::Difficulty,
        test_support::{TestClient, is_type, playing, state_with_store},
    };

    async fn join(state: &SharedState, user_id: UserId, username: &str) -> (ConnectionContext, TestClient) {
        let (tx, rx) = mpsc::unbounded_channel();
        let identity = Identity {
            user_id,
            username: username.into(),
        };
        let ctx = register_connection(state, identity.clone(), tx).unwrap();
        announce(state, &ctx).await.unwrap();
        let client = TestClient {
            identity,
            connection_id: ctx.connection_id,
            rx,
        };
        (ctx, client)
    }

    async fn dispatch_json(state: &SharedState, ctx: &ConnectionContext, raw: &str) -> Result<(), ConnectionError> {
        dispatch(state, ctx, ClientMessage::from_json_str(raw).unwrap()).await
    }

    #[tokio::test]
    async fn second_connection_for_a_user_is_refused() {
        let (state, _store) = state_with_store(AppConfig::default()).await;
        let (first, mut client) = join(&state, 1, "alice").await;
        client.wait_for_type("identified").await;

        let (tx, _rx) = mpsc::unbounded_channel();
        let refused = register_connection(
            &state,
            Identity {
                user_id: 1,
                username: "alice".into(),
            },
            tx,
        );

        assert_eq!(refused.unwrap_err(), RegistrationError::AlreadyConnected(1));
        assert_eq!(state.players().connection_of(1), Some(first.connection_id));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_mid_match_forfeits_to_the_opponent() {
        let (state, _store) = state_with_store(AppConfig::default()).await;
        let (alice_ctx, mut alice) = join(&state, 1, "alice").await;
        let (_bob_ctx, mut bob) = join(&state, 2, "bob").await;
        session_service::start_session(&state, SessionSetup::multiplayer(1, 2))
            .await
            .unwrap();
        alice.wait_for(playing).await;

        let kind = disconnect(&state, &alice_ctx).await;

        assert_eq!(kind, DisconnectKind::MidMatch);
        let mut finished = None;
        let mut offline = None;
        while finished.is_none() || offline.is_none() {
            let frame = bob
                .wait_for(|v| {
                    is_type(v, "game_finished") || (is_type(v, "presence") && v["online"] == false)
                })
                .await;
            if is_type(&frame, "game_finished") {
                finished = Some(frame);
            } else {
                offline = Some(frame);
            }
        }
        let finished = finished.unwrap();
        assert_eq!(finished["reason"], "desertion");
        assert_eq!(finished["winner_id"], 2);
        assert_eq!(offline.unwrap()["user_id"], 1);
    }

    #[tokio::test]
    async fn dropping_while_queued_leaves_the_queue() {
        let (state, _store) = state_with_store(AppConfig::default()).await;
        let (ctx, mut client) = join(&state, 1, "alice").await;
        dispatch_json(&state, &ctx, r#"{"type":"join_queue"}"#)
            .await
            .unwrap();
        let status = client.wait_for_type("queue_status").await;
        assert_eq!(status["status"], "queued");
        assert_eq!(status["position"], 1);

        let kind = disconnect(&state, &ctx).await;

        assert_eq!(kind, DisconnectKind::Queue);
        assert_eq!(state.matchmaker().len().await, 0);
        assert!(!state.players().is_connected(1));
    }

    #[tokio::test]
    async fn lobby_disconnect_only_updates_presence() {
        let (state, _store) = state_with_store(AppConfig::default()).await;
        let (ctx, _client) = join(&state, 1, "alice").await;

        assert_eq!(disconnect(&state, &ctx).await, DisconnectKind::Lobby);
        assert!(state.players().is_empty());
    }

    #[tokio::test]
    async fn duplicate_enqueue_is_reported() {
        let (state, _store) = state_with_store(AppConfig::default()).await;
        let (ctx, _client) = join(&state, 1, "alice").await;
        dispatch_json(&state, &ctx, r#"{"type":"join_queue"}"#)
            .await
            .unwrap();

        let err = dispatch_json(&state, &ctx, r#"{"type":"join_queue"}"#)
            .await
            .unwrap_err();

        assert_eq!(err.wire_code(), Some(ErrorCode::AlreadyQueued));
    }

    #[tokio::test(start_paused = true)]
    async fn players_in_a_game_cannot_queue() {
        let (state, _store) = state_with_store(AppConfig::default()).await;
        let (ctx, mut client) = join(&state, 1, "alice").await;
        dispatch_json(&state, &ctx, r#"{"type":"start_single_player","difficulty":"easy"}"#)
            .await
            .unwrap();
        let start = client.wait_for_type("game_start").await;
        assert_eq!(start["mode"], "single_player");
        assert_eq!(start["difficulty"], "easy");

        let err = dispatch_json(&state, &ctx, r#"{"type":"join_queue"}"#)
            .await
            .unwrap_err();

        assert_eq!(err.wire_code(), Some(ErrorCode::AlreadyInGame));
    }

    #[tokio::test]
    async fn inputs_claiming_another_player_are_refused() {
        let (state, _store) = state_with_store(AppConfig::default()).await;
        let (ctx, _client) = join(&state, 1, "alice").await;

        let err = dispatch_json(
            &state,
            &ctx,
            r#"{"type":"paddle_move","direction":1,"timestamp":1.0,"player_id":2}"#,
        )
        .await
        .unwrap_err();
        assert_eq!(err.wire_code(), Some(ErrorCode::IdentityMismatch));

        let err = dispatch_json(&state, &ctx, r#"{"type":"paddle_move","direction":1,"timestamp":1.0}"#)
            .await
            .unwrap_err();
        assert_eq!(err.wire_code(), Some(ErrorCode::NotInGame));
    }

    #[tokio::test(start_paused = true)]
    async fn challenge_round_trip_over_messages() {
        let (state, _store) = state_with_store(AppConfig::default()).await;
        let (alice_ctx, mut alice) = join(&state, 1, "alice").await;
        let (bob_ctx, mut bob) = join(&state, 2, "bob").await;

        dispatch_json(
            &state,
            &alice_ctx,
            r#"{"type":"challenge","from_user_id":1,"to_username":"bob"}"#,
        )
        .await
        .unwrap();
        bob.wait_for_type("challenge_received").await;

        let err = dispatch_json(
            &state,
            &bob_ctx,
            r#"{"type":"accept","from_user_id":1,"to_username":"carol"}"#,
        )
        .await
        .unwrap_err();
        assert_eq!(err.wire_code(), Some(ErrorCode::IdentityMismatch));

        dispatch_json(
            &state,
            &bob_ctx,
            r#"{"type":"accept","from_user_id":1,"to_username":"bob"}"#,
        )
        .await
        .unwrap();
        alice.wait_for_type("game_start").await;
        bob.wait_for_type("game_start").await;
    }

    #[tokio::test(start_paused = true)]
    async fn reconnecting_player_is_resynced() {
        let mut config = AppConfig::default();
        config.sessions.abandon_grace = Duration::from_secs(30);
        let (state, _store) = state_with_store(config).await;
        let (ctx, mut client) = join(&state, 1, "alice").await;
        session_service::start_session(&state, SessionSetup::single_player(1, Difficulty::Medium))
            .await
            .unwrap();
        client.wait_for(playing).await;

        disconnect(&state, &ctx).await;
        sleep(Duration::from_secs(2)).await;
        let (_ctx, mut client) = join(&state, 1, "alice").await;

        let resync = client.wait_for_type("resync").await;
        assert_eq!(resync["side"], "left");
    }

    #[tokio::test]
    async fn ping_and_unknown_messages() {
        let (state, _store) = state_with_store(AppConfig::default()).await;
        let (ctx, mut client) = join(&state, 1, "alice").await;

        dispatch_json(&state, &ctx, r#"{"type":"ping"}"#).await.unwrap();
        client.wait_for_type("pong").await;

        let err = dispatch_json(&state, &ctx, r#"{"type":"teleport"}"#)
            .await
            .unwrap_err();
        assert_eq!(err.wire_code(), Some(ErrorCode::InvalidMessage));
    }
}
