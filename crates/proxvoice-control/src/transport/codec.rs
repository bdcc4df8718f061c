//! Decode-once codec for the policy socket.
//!
//! - Text and Binary frames => `PolicyInbound` (or a structured error)
//! - Ping/Pong are lifecycle only; Close ends the session

use axum::extract::ws::Message;

use proxvoice_core::protocol::socket::{decode_inbound, InboundError, InboundFrame, PolicyInbound};

#[derive(Debug)]
pub enum Inbound {
    Request(PolicyInbound),
    Invalid(InboundError),
    Control,
    Close,
}

pub fn decode(msg: &Message) -> Inbound {
    let frame = match msg {
        Message::Text(s) => InboundFrame::Text(s),
        Message::Binary(b) => InboundFrame::Binary(b),
        Message::Ping(_) | Message::Pong(_) => return Inbound::Control,
        Message::Close(_) => return Inbound::Close,
    };
    match decode_inbound(frame) {
        Ok(req) => Inbound::Request(req),
        Err(e) => Inbound::Invalid(e),
    }
}
