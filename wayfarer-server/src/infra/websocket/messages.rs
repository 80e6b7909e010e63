use anyhow::Result;
use axum::extract::ws::{Message, Utf8Bytes};
use wayfarer_core::{InboundRequest, OutboundMessage};

/// Convert an outbound core message to a text frame.
pub fn outbound_to_websocket(msg: &OutboundMessage) -> Result<Message> {
    let json = serde_json::to_string(msg)?;
    Ok(Message::Text(Utf8Bytes::from(json)))
}

/// Decode one inbound request from a text or binary frame.
///
/// Control frames yield `Ok(None)`.
pub fn websocket_to_request(msg: &Message) -> Result<Option<InboundRequest>> {
    match msg {
        Message::Text(text) => Ok(Some(serde_json::from_str(text.as_str())?)),
        Message::Binary(bin) => Ok(Some(serde_json::from_slice(bin.as_ref())?)),
        _ => Ok(None),
    }
}
