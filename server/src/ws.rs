use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::admission::ConnectionRegistry;
use crate::error::ProtocolError;
use crate::game_loop::{GameCommand, JoinReply};
use crate::protocol::{decode_client_msg, encode_server_msg, ClientMsg, PlayerId, ServerMsg};
use crate::state::AdminCommand;

/// Malformed frames tolerated before the connection is dropped.
pub const MAX_PARSE_ERRORS: u32 = 5;

/// Shared app state passed to each WebSocket handler
#[derive(Clone)]
pub struct AppState {
    pub game_tx: mpsc::Sender<GameCommand>,
    pub registry: Arc<ConnectionRegistry>,
}

/// Handshake metadata from the upgrade request's query string.
#[derive(Debug, Default, Deserialize)]
pub struct Handshake {
    pub admin: Option<String>,
    pub player_icon: Option<String>,
}

impl Handshake {
    /// Any `admin` value other than empty, `0` or `false` grants admin.
    ///
    /// Stricter than plain string truthiness, where `?admin=false` would
    /// still count as set. This flag is the only thing guarding the admin
    /// commands.
    pub fn is_admin(&self) -> bool {
        match self.admin.as_deref() {
            None | Some("") | Some("0") | Some("false") => false,
            Some(_) => true,
        }
    }
}

/// HTTP handler for WebSocket upgrade
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(handshake): Query<Handshake>,
    State(app_state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, handshake, app_state))
}

type WsSink = SplitSink<WebSocket, Message>;

async fn send_msg(sink: &mut WsSink, msg: &ServerMsg) -> bool {
    match encode_server_msg(msg) {
        Ok(json) => sink.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::error!("Failed to encode {:?}: {}", msg, e);
            true
        }
    }
}

/// Sends `Disconnect` for an admitted session however its task ends.
struct SessionGuard {
    id: PlayerId,
    game_tx: mpsc::Sender<GameCommand>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let cmd = GameCommand::Disconnect { id: self.id };
        if let Err(mpsc::error::TrySendError::Full(cmd)) = self.game_tx.try_send(cmd) {
            let game_tx = self.game_tx.clone();
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move {
                    let _ = game_tx.send(cmd).await;
                });
            }
        }
    }
}

fn to_command(id: PlayerId, msg: ClientMsg) -> GameCommand {
    let command = match msg {
        ClientMsg::PlayerMove(direction) => return GameCommand::Move { id, direction },
        ClientMsg::AdminStartFruitGame(interval_ms) => AdminCommand::StartFruitGame { interval_ms },
        ClientMsg::AdminStopFruitGame => AdminCommand::StopFruitGame,
        ClientMsg::AdminStartCrazyMode => AdminCommand::StartCrazyMode,
        ClientMsg::AdminStopCrazyMode => AdminCommand::StopCrazyMode,
        ClientMsg::AdminClearScores => AdminCommand::ClearScores,
        ClientMsg::AdminConcurrentConnections(max) => AdminCommand::SetMaxConnections(max),
    };
    GameCommand::Admin { id, command }
}

async fn handle_socket(socket: WebSocket, handshake: Handshake, app_state: AppState) {
    let _connection = app_state.registry.register();
    let admin = handshake.is_admin();
    let (mut sink, mut stream) = socket.split();

    let (resp_tx, resp_rx) = oneshot::channel();
    if app_state
        .game_tx
        .send(GameCommand::Connect {
            admin,
            icon: handshake.player_icon,
            response: resp_tx,
        })
        .await
        .is_err()
    {
        tracing::error!("Failed to send Connect command");
        return;
    }

    // The receiver starts right after the snapshot was taken.
    let (my_id, bootstrap, mut broadcast_rx) = match resp_rx.await {
        Ok(JoinReply::Admitted {
            id,
            bootstrap,
            updates,
        }) => (id, bootstrap, updates),
        Ok(JoinReply::Rejected) => {
            let _ = send_msg(&mut sink, &ServerMsg::ShowMaxConcurrentConnectionsMessage).await;
            let _ = sink.send(Message::Close(None)).await;
            return;
        }
        Err(_) => {
            tracing::error!("Failed to receive join outcome");
            return;
        }
    };

    let _session = SessionGuard {
        id: my_id,
        game_tx: app_state.game_tx.clone(),
    };
    tracing::info!("Player {} connected", my_id);

    if !send_msg(&mut sink, &ServerMsg::HideMaxConcurrentConnectionsMessage).await
        || !send_msg(&mut sink, &ServerMsg::Bootstrap(bootstrap)).await
    {
        return;
    }

    let mut parse_errors = 0u32;

    loop {
        tokio::select! {
            // Client -> Server
            msg = stream.next() => {
                let decoded = match msg {
                    Some(Ok(Message::Text(text))) => decode_client_msg(text.as_str()),
                    Some(Ok(Message::Binary(_))) => Err(ProtocolError::UnexpectedBinary),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!("Player {} transport error: {}", my_id, e);
                        break;
                    }
                    Some(Ok(_)) => continue, // ping/pong
                };

                match decoded {
                    Ok(client_msg) => {
                        if client_msg.is_admin() && !admin {
                            tracing::warn!("Player {} sent {:?} without admin handshake", my_id, client_msg);
                            continue;
                        }
                        if app_state.game_tx.send(to_command(my_id, client_msg)).await.is_err() {
                            break;
                        }
                    }
                    Err(e @ ProtocolError::Oversized(..)) => {
                        tracing::warn!("Player {} dropped: {}", my_id, e);
                        break;
                    }
                    Err(e) => {
                        parse_errors += 1;
                        tracing::warn!("Player {} sent a bad frame ({}/{}): {}", my_id, parse_errors, MAX_PARSE_ERRORS, e);
                        if parse_errors >= MAX_PARSE_ERRORS {
                            break;
                        }
                    }
                }
            }

            // Server -> Client (broadcast)
            result = broadcast_rx.recv() => {
                match result {
                    Ok(broadcast) => {
                        if !broadcast.audience.includes(my_id) {
                            continue;
                        }
                        if !send_msg(&mut sink, &broadcast.msg).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        // Dropped deltas leave the client out of sync.
                        tracing::warn!("Player {} lagged by {} messages, resyncing", my_id, n);
                        if app_state.game_tx.send(GameCommand::Resync { id: my_id }).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    let _ = sink.send(Message::Close(None)).await;
    tracing::info!("Player {} disconnected", my_id);
}
