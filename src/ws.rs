//! Protocol Handler: terminates the live connection.
//!
//! An authenticated HTTP request is upgraded, the connection registers with
//! the hub, then two independent loops run: the read loop decodes inbound
//! frames into Chat Service calls, the write loop drains the hub-fed
//! outbound queue. Either loop ending aborts the other and deregisters the
//! connection; nothing leaks.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::context::AppContext;
use crate::error::AppResult;
use crate::frames::{ClientFrame, ServerFrame};
use crate::hub::ConnectionId;
use crate::routes::extractors::AuthenticatedUser;
use crate::service::SendMessageInput;
use crate::utils::log_safe_id;

/// GET /ws
pub async fn ws_handler(
    State(ctx): State<Arc<AppContext>>,
    user: AuthenticatedUser,
    ws: WebSocketUpgrade,
) -> Response {
    let user_id = user.0;
    ws.on_upgrade(move |socket| handle_socket(ctx, user_id, socket))
}

async fn handle_socket(ctx: Arc<AppContext>, user_id: Uuid, socket: WebSocket) {
    let conn_id: ConnectionId = Uuid::new_v4();
    let user_hash = log_safe_id(&user_id.to_string(), &ctx.config.logging.hash_salt);

    let (outbound_tx, outbound_rx) = mpsc::channel(ctx.config.chat.outbound_queue_size);
    if !ctx.hub.register(user_id, conn_id, outbound_tx).await {
        tracing::warn!(user_hash = %user_hash, "Hub rejected registration, dropping socket");
        return;
    }

    tracing::info!(user_hash = %user_hash, conn_id = %conn_id, "WebSocket session opened");

    let (ws_tx, ws_rx) = socket.split();
    // Per-frame service errors go back on this side channel; the hub queue
    // stays reserved for broadcasts so its close still means force-disconnect.
    let (local_tx, local_rx) = mpsc::channel(16);

    let ping_interval = Duration::from_secs(ctx.config.chat.heartbeat_interval_secs);
    let mut write_task = tokio::spawn(write_loop(ws_tx, outbound_rx, local_rx, ping_interval));
    let mut read_task = tokio::spawn(read_loop(ws_rx, ctx.clone(), user_id, conn_id, local_tx));

    tokio::select! {
        _ = &mut write_task => read_task.abort(),
        _ = &mut read_task => write_task.abort(),
    }

    ctx.hub.unregister(conn_id).await;
    tracing::info!(user_hash = %user_hash, conn_id = %conn_id, "WebSocket session closed");
}

async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, WsMessage>,
    mut outbound: mpsc::Receiver<ServerFrame>,
    mut local: mpsc::Receiver<ServerFrame>,
    ping_interval: Duration,
) {
    let mut ping = tokio::time::interval(ping_interval);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                // None: the hub dropped us (overflow, shutdown, unregister).
                let Some(frame) = frame else { break };
                if let Err(e) = send_frame(&mut ws_tx, &frame).await {
                    e.log();
                    break;
                }
            }
            frame = local.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = send_frame(&mut ws_tx, &frame).await {
                    e.log();
                    break;
                }
            }
            _ = ping.tick() => {
                if ws_tx.send(WsMessage::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    let _ = ws_tx.send(WsMessage::Close(None)).await;
}

async fn send_frame(
    ws_tx: &mut SplitSink<WebSocket, WsMessage>,
    frame: &ServerFrame,
) -> AppResult<()> {
    let text = serde_json::to_string(frame)?;
    ws_tx.send(WsMessage::Text(text)).await?;
    Ok(())
}

async fn read_loop(
    mut ws_rx: SplitStream<WebSocket>,
    ctx: Arc<AppContext>,
    user_id: Uuid,
    conn_id: ConnectionId,
    local_tx: mpsc::Sender<ServerFrame>,
) {
    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(WsMessage::Text(text)) => {
                let frame = match serde_json::from_str::<ClientFrame>(&text) {
                    Ok(frame) => frame,
                    Err(e) => {
                        // Malformed frame: close this connection, nobody
                        // else is affected.
                        tracing::debug!(error = %e, conn_id = %conn_id, "Undecodable frame");
                        break;
                    }
                };

                if let Err(e) = dispatch_frame(&ctx, user_id, frame).await {
                    e.log();
                    let reply = ServerFrame::Error {
                        code: e.error_code().to_string(),
                        message: e.user_message(),
                    };
                    if local_tx.send(reply).await.is_err() {
                        break;
                    }
                }
            }
            Ok(WsMessage::Pong(_)) => {
                ctx.hub.pong(conn_id).await;
            }
            Ok(WsMessage::Ping(_)) => {
                // axum replies to pings itself.
            }
            Ok(WsMessage::Close(_)) => break,
            Ok(WsMessage::Binary(_)) => {
                tracing::debug!(conn_id = %conn_id, "Binary frame on a text protocol");
                break;
            }
            Err(e) => {
                tracing::debug!(error = %e, conn_id = %conn_id, "WebSocket read error");
                break;
            }
        }
    }
}

async fn dispatch_frame(
    ctx: &AppContext,
    user_id: Uuid,
    frame: ClientFrame,
) -> crate::error::AppResult<()> {
    match frame {
        ClientFrame::MessageSend {
            dialog_id,
            body,
            reply_to_id,
            forward_from_id,
        } => {
            ctx.service
                .send_message(
                    user_id,
                    SendMessageInput {
                        dialog_id,
                        body,
                        reply_to_id,
                        forward_from_id,
                    },
                )
                .await?;
        }
        ClientFrame::ReactionToggle { message_id, emoji } => {
            ctx.service
                .toggle_reaction(user_id, message_id, &emoji)
                .await?;
        }
        ClientFrame::ReadMark { dialog_id } => {
            ctx.service.mark_all_read(user_id, dialog_id).await?;
        }
        ClientFrame::TypingStart { dialog_id } => {
            ctx.service.set_typing(user_id, dialog_id).await?;
        }
    }
    Ok(())
}
