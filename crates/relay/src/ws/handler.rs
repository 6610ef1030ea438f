use super::protocol as ws_protocol;
use crate::dispatch::RelayDispatcher;
use crate::error::ErrorCode;
use crate::metrics;
use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use pairsync_common::protocol::events::{ConnectionId, ServerEvent};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const HEARTBEAT_INTERVAL_MS: u64 = 25_000;
pub const HEARTBEAT_TIMEOUT_MS: u64 = 20_000;
pub const MAX_FRAME_BYTES: usize = 262_144;

pub fn router(dispatcher: RelayDispatcher) -> Router {
    Router::new().route("/ws", get(ws_upgrade)).with_state(dispatcher)
}

pub async fn ws_upgrade(
    State(dispatcher): State<RelayDispatcher>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.max_frame_size(MAX_FRAME_BYTES)
        .max_message_size(MAX_FRAME_BYTES)
        .on_upgrade(move |socket| handle_socket(dispatcher, socket))
}

fn frame_size_exceeded_reason() -> String {
    format!("websocket frame exceeds maximum size of {MAX_FRAME_BYTES} bytes")
}

fn is_frame_size_violation(error: &axum::Error) -> bool {
    let message = error.to_string().to_ascii_lowercase();
    message.contains("message too long")
        || message.contains("frame too long")
        || message.contains("too large")
        || message.contains("too big")
        || message.contains("size limit")
}

async fn close_frame_too_large(socket: &mut WebSocket) {
    let _ = ws_protocol::send_event(socket, &ErrorCode::FrameTooLarge.to_event()).await;
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::SIZE,
            reason: frame_size_exceeded_reason().into(),
        })))
        .await;
}

async fn handle_socket(dispatcher: RelayDispatcher, mut socket: WebSocket) {
    let connection = ConnectionId::new();
    let (outbound_sender, mut outbound_receiver) = mpsc::unbounded_channel::<ServerEvent>();
    dispatcher.rooms().register(connection, outbound_sender).await;
    metrics::connection_opened();
    info!(connection = %connection, "client connected");

    let greeting = ServerEvent::Connected { connection_id: connection };
    if ws_protocol::send_event(&mut socket, &greeting).await.is_ok() {
        serve_connection(&dispatcher, connection, &mut socket, &mut outbound_receiver).await;
    }

    dispatcher.disconnect(connection).await;
    metrics::connection_closed();
    info!(connection = %connection, "client disconnected");
}

async fn serve_connection(
    dispatcher: &RelayDispatcher,
    connection: ConnectionId,
    socket: &mut WebSocket,
    outbound_receiver: &mut mpsc::UnboundedReceiver<ServerEvent>,
) {
    // Server pings every HEARTBEAT_INTERVAL_MS; a peer that has not answered
    // for an interval plus HEARTBEAT_TIMEOUT_MS is dropped.
    let heartbeat_period = Duration::from_millis(HEARTBEAT_INTERVAL_MS);
    let mut heartbeat_interval = tokio::time::interval(heartbeat_period);
    heartbeat_interval.reset(); // skip immediate first tick
    let mut last_pong = Instant::now();
    let heartbeat_deadline = heartbeat_period + Duration::from_millis(HEARTBEAT_TIMEOUT_MS);

    loop {
        tokio::select! {
            _ = heartbeat_interval.tick() => {
                if last_pong.elapsed() > heartbeat_deadline {
                    warn!(connection = %connection, "heartbeat timeout, disconnecting");
                    break;
                }
                if socket.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
            maybe_outbound = outbound_receiver.recv() => {
                match maybe_outbound {
                    Some(outbound) => {
                        if ws_protocol::send_event(socket, &outbound).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            maybe_message = socket.recv() => {
                let Some(message) = maybe_message else {
                    break;
                };

                match message {
                    Ok(Message::Text(raw_message)) => {
                        if raw_message.len() > MAX_FRAME_BYTES {
                            close_frame_too_large(socket).await;
                            break;
                        }

                        let inbound = match ws_protocol::decode_event(raw_message.as_str()) {
                            Ok(event) => event,
                            Err(error) => {
                                debug!(connection = %connection, error = %error, "undecodable frame");
                                let reply = ErrorCode::InvalidMessage
                                    .to_event_with_message(format!("invalid frame: {error}"));
                                if ws_protocol::send_event(socket, &reply).await.is_err() {
                                    break;
                                }
                                continue;
                            }
                        };

                        debug!(connection = %connection, event = inbound.name(), "client event");
                        dispatcher.dispatch(connection, inbound).await;
                    }
                    Ok(Message::Binary(_)) => {
                        if ws_protocol::send_event(socket, &ErrorCode::InvalidMessage.to_event())
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Ok(Message::Ping(payload)) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Pong(_)) => {
                        last_pong = Instant::now();
                    }
                    Ok(Message::Close(_)) => break,
                    Err(error) => {
                        if is_frame_size_violation(&error) {
                            close_frame_too_large(socket).await;
                        } else {
                            debug!(connection = %connection, error = %error, "websocket read failed");
                        }
                        break;
                    }
                }
            }
        }
    }
}
