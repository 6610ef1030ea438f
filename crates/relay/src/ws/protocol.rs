use axum::extract::ws::{Message, WebSocket};
use pairsync_common::protocol::events::{ClientEvent, ServerEvent};

pub fn decode_event(raw: &str) -> Result<ClientEvent, serde_json::Error> {
    serde_json::from_str::<ClientEvent>(raw)
}

pub fn encode_event(event: &ServerEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}

pub async fn send_event(socket: &mut WebSocket, event: &ServerEvent) -> Result<(), ()> {
    let encoded = encode_event(event).map_err(|_| ())?;
    socket.send(Message::Text(encoded.into())).await.map_err(|_| ())
}
