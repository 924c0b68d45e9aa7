//! WebSocket message classification.
//!
//! Text and binary frames become codec input; ping/pong/close are surfaced
//! for lifecycle management only and never reach the protocol core.

use axum::extract::ws::Message;

use voltmesh_core::protocol::wire::RawFrame;

#[derive(Debug)]
pub enum Inbound {
    Frame(RawFrame),
    Ping(Vec<u8>),
    Pong,
    Close,
}

pub fn classify(msg: Message) -> Inbound {
    match msg {
        Message::Text(s) => Inbound::Frame(RawFrame::Text(s)),
        Message::Binary(b) => Inbound::Frame(RawFrame::Binary(b.into())),
        Message::Ping(v) => Inbound::Ping(v),
        Message::Pong(_) => Inbound::Pong,
        Message::Close(_) => Inbound::Close,
    }
}

/// Frame length for cheap checks before any decode work.
pub fn frame_len(msg: &Message) -> usize {
    match msg {
        Message::Text(s) => s.as_bytes().len(),
        Message::Binary(b) => b.len(),
        Message::Ping(v) => v.len(),
        Message::Pong(v) => v.len(),
        Message::Close(_) => 0,
    }
}
