//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{MatchCommand, MatchHandle, PlayerInput};
use crate::matchmaking::service::{default_display_name, QueueOutcome};
use crate::util::rate_limit::PlayerRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

const OUTBOX_CAPACITY: usize = 128;

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Stable player id; reconnecting with the same id resumes the match
    pub player_id: Uuid,
    pub name: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let user_id = query.player_id;
    let display_name = query
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| default_display_name(user_id));

    info!(user_id = %user_id, "WebSocket upgrade");
    ws.on_upgrade(move |socket| handle_socket(socket, user_id, display_name, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, user_id: Uuid, display_name: String, state: AppState) {
    info!(user_id = %user_id, "New WebSocket connection");

    let (ws_sink, mut ws_stream) = socket.split();
    let (outbox, outbox_rx) = mpsc::channel::<ServerMsg>(OUTBOX_CAPACITY);
    let writer = tokio::spawn(write_loop(user_id, ws_sink, outbox_rx));

    // Send welcome message
    let welcome = ServerMsg::Welcome {
        user_id,
        server_time: unix_millis(),
    };
    if outbox.send(welcome).await.is_err() {
        error!(user_id = %user_id, "Failed to send welcome");
        return;
    }

    // Register with matchmaking to receive match assignments
    let mut assignments = state.matchmaking.register_player(user_id, display_name);
    let rate_limiter = PlayerRateLimiter::new();
    let mut forwarder: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            frame = ws_stream.next() => {
                let Some(frame) = frame else { break };
                match frame {
                    Ok(Message::Text(text)) => {
                        if !rate_limiter.check_input() {
                            warn!(user_id = %user_id, "Rate limited input message");
                            continue;
                        }
                        match serde_json::from_str::<ClientMsg>(&text) {
                            Ok(msg) => handle_client_msg(&state, user_id, msg, &outbox).await,
                            Err(e) => {
                                warn!(user_id = %user_id, error = %e, "Failed to parse client message");
                                let _ = outbox
                                    .send(ServerMsg::error("bad_message", e.to_string()))
                                    .await;
                            }
                        }
                    }
                    Ok(Message::Binary(_)) => {
                        warn!(user_id = %user_id, "Received binary message, ignoring");
                    }
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                        debug!(user_id = %user_id, "Received control frame");
                    }
                    Ok(Message::Close(_)) => {
                        info!(user_id = %user_id, "Client initiated close");
                        break;
                    }
                    Err(e) => {
                        error!(user_id = %user_id, error = %e, "WebSocket error");
                        break;
                    }
                }
            }
            Some(handle) = assignments.recv() => {
                if let Some(previous) = forwarder.take() {
                    previous.abort();
                }
                forwarder = Some(attach(user_id, handle, outbox.clone()).await);
            }
        }
    }

    // Cleanup on disconnect; the agent stays in its match
    state.matchmaking.unregister_player(user_id).await;
    if let Some(forwarder) = forwarder {
        forwarder.abort();
    }
    writer.abort();

    info!(user_id = %user_id, "WebSocket connection closed");
}

async fn handle_client_msg(
    state: &AppState,
    user_id: Uuid,
    msg: ClientMsg,
    outbox: &mpsc::Sender<ServerMsg>,
) {
    let reply = match msg {
        ClientMsg::JoinQueue => match state.matchmaking.join_queue(user_id).await {
            Ok(QueueOutcome::Queued {
                position,
                queue_size,
            }) => Some(ServerMsg::Queued {
                position,
                queue_size,
            }),
            // MatchJoined follows through the assignment channel
            Ok(QueueOutcome::Joined { .. }) => None,
            Err(e) => Some(ServerMsg::error(e.code(), e.to_string())),
        },
        ClientMsg::Ping { t } => Some(ServerMsg::Pong { t }),
        ClientMsg::LeaveMatch => {
            state.matchmaking.leave(user_id).await;
            None
        }
        msg @ ClientMsg::Move { .. } => {
            let input = PlayerInput {
                user_id,
                msg,
                received_at: unix_millis(),
            };
            if let Err(e) = state.matchmaking.route_input(input).await {
                debug!(user_id = %user_id, error = %e, "Dropped move");
            }
            None
        }
    };

    if let Some(reply) = reply {
        let _ = outbox.send(reply).await;
    }
}

/// Subscribe to a match and forward its messages until it ends
async fn attach(user_id: Uuid, handle: MatchHandle, outbox: mpsc::Sender<ServerMsg>) -> JoinHandle<()> {
    let mut match_rx = handle.subscribe();
    let status = handle.status();

    let _ = outbox
        .send(ServerMsg::MatchJoined {
            match_id: handle.id,
            kind: status.kind,
            grid_size: status.grid_size,
            players: status.players,
        })
        .await;

    // Subscribed first, so the briefing this triggers is not missed
    if handle.send(MatchCommand::Reconnect { user_id }).await.is_err() {
        warn!(user_id = %user_id, match_id = %handle.id, "Match closed before attach");
    }

    let match_id = handle.id;
    tokio::spawn(async move {
        loop {
            match match_rx.recv().await {
                Ok(msg) => {
                    if msg.recipient().is_some_and(|to| to != user_id) {
                        continue;
                    }
                    let ended = matches!(msg, ServerMsg::MatchEnd { .. });
                    if outbox.send(msg).await.is_err() || ended {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(
                        user_id = %user_id,
                        lagged_count = n,
                        "Client lagged, skipping {} messages", n
                    );
                    // Continue - don't disconnect for lag
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(user_id = %user_id, match_id = %match_id, "Match channel closed");
                    break;
                }
            }
        }
    })
}

/// Writer task: outbox -> WebSocket
async fn write_loop(
    user_id: Uuid,
    mut sink: SplitSink<WebSocket, Message>,
    mut outbox: mpsc::Receiver<ServerMsg>,
) {
    while let Some(msg) = outbox.recv().await {
        if let Err(e) = send_msg(&mut sink, &msg).await {
            debug!(user_id = %user_id, error = %e, "WebSocket send failed");
            break;
        }
    }
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
