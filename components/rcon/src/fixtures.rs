//! Golden datagram builders for tests and tooling. Everything here goes
//! through the real codec, so the vectors track the wire format by
//! construction.

use crate::frame::{ClientFrame, PartHeader, ServerFrame};
use bytes::Bytes;

/// Default password used by golden vectors.
pub const DEFAULT_PASSWORD: &str = "secret";

pub fn login_request(password: &str) -> Vec<u8> {
    ClientFrame::Login { password: password.into() }.encode()
}

pub fn login_response(accepted: bool) -> Vec<u8> {
    ServerFrame::Login { accepted }.encode()
}

pub fn command_request(seq: u8, command: &str) -> Vec<u8> {
    ClientFrame::Command { seq, command: command.into() }.encode()
}

/// A keepalive is just a command with an empty body.
pub fn heartbeat(seq: u8) -> Vec<u8> {
    command_request(seq, "")
}

pub fn command_reply(seq: u8, text: &str) -> Vec<u8> {
    ServerFrame::Reply { seq, part: None, payload: Bytes::copy_from_slice(text.as_bytes()) }.encode()
}

pub fn command_reply_part(seq: u8, total: u8, index: u8, text: &str) -> Vec<u8> {
    ServerFrame::Reply {
        seq,
        part: Some(PartHeader { total, index }),
        payload: Bytes::copy_from_slice(text.as_bytes()),
    }
    .encode()
}

pub fn server_message(seq: u8, text: &str) -> Vec<u8> {
    ServerFrame::Message { seq, message: Bytes::copy_from_slice(text.as_bytes()) }.encode()
}

pub fn message_ack(seq: u8) -> Vec<u8> {
    ClientFrame::MessageAck { seq }.encode()
}

/// Applies a mutation to an encoded datagram, for corruption tests.
pub fn mutated(mut datagram: Vec<u8>, overrides: impl FnOnce(&mut [u8])) -> Vec<u8> {
    overrides(&mut datagram);
    datagram
}
