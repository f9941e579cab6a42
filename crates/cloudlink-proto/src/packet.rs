//! The CL3/CL4 "UPL" JSON packet.

use crate::error::ParseError;
use crate::id::ClientId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A CL3/CL4 packet, client-to-server or server-to-client.
///
/// Only `cmd` is required; everything else is optional and omitted (not
/// null) when absent. Unknown extra keys on input are tolerated and dropped.
/// Fields that are version-specific (`data` for the v0.1.5 nesting, `code`
/// and `code_id` for statuscodes, `mode` for userlist events) simply stay
/// empty for packets that do not use them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UplPacket {
    #[serde(default)]
    pub cmd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<Value>,
    /// Payload slot used by the CL3 v0.1.5 `direct` nesting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub val: Option<Value>,
    /// Recipient id(s) for pmsg/pvar.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Target room(s) from the client, or room context on server emissions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rooms: Option<Value>,
    /// Opaque correlation value echoed verbatim on replies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listener: Option<Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_id: Option<u16>,
    /// Userlist event mode: "set", "add", or "remove".
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mode: String,
    /// Sender identity on server emissions: a username for older dialects,
    /// a [`UserObject`] for v0.2.0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl UplPacket {
    /// Parse a text frame, requiring a non-empty `cmd`.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let packet: UplPacket = serde_json::from_str(text)?;
        if packet.cmd.is_empty() {
            return Err(ParseError::MissingCommand);
        }
        Ok(packet)
    }

    /// Whether the packet carries a non-empty listener value.
    pub fn has_listener(&self) -> bool {
        match &self.listener {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }

    /// Serialize for the wire.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// The `{id, username?, uuid}` triple identifying a client on the wire.
///
/// `username` is omitted until the client has set a name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserObject {
    pub id: ClientId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<Value>,
    pub uuid: Uuid,
}
