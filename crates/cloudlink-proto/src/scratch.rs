//! The Scratch cloud-variable JSON protocol.

use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A Scratch cloud-variable packet; the same shape travels both directions.
///
/// `project_id` doubles as the room key: every Scratch client is subscribed
/// to exactly one room, the project it handshakes into.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScratchPacket {
    #[serde(default)]
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<Value>,
    #[serde(default, rename = "user", skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_name: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl ScratchPacket {
    /// Parse a text frame, requiring a non-empty `method`.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let packet: ScratchPacket = serde_json::from_str(text)?;
        if packet.method.is_empty() {
            return Err(ParseError::MissingMethod);
        }
        Ok(packet)
    }

    /// Serialize for the wire.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
