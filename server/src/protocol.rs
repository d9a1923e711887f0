//! Wire protocol: the shared message types plus frame encoding and
//! validation at the transport boundary.

use crate::error::ProtocolError;

pub use fruit_arena_shared::protocol::*;

/// Largest inbound text frame accepted, in bytes.
pub const MAX_MESSAGE_SIZE: usize = 1024;

/// Decode one inbound text frame.
pub fn decode_client_msg(text: &str) -> Result<ClientMsg, ProtocolError> {
    if text.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::Oversized(text.len(), MAX_MESSAGE_SIZE));
    }
    Ok(serde_json::from_str(text)?)
}

pub fn encode_server_msg(msg: &ServerMsg) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(msg)?)
}
