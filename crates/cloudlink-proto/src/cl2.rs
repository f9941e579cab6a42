//! The CL2 line-delimited legacy protocol.
//!
//! Inbound frames are ASCII text beginning with `<%`, parsed against an
//! ordered set of regex patterns, most specific first. The order matters:
//! an unordered set would let `global_stream` swallow `private_stream`
//! frames. The trailing `Data` field consumes the rest of the buffer and
//! may itself contain newlines.
//!
//! Server replies to CL2 clients are JSON: a flat `{type, data, id?}` shape
//! for clients that have not completed the `sh` handshake, or the same
//! payload wrapped in a `{type: "sf", ...}` "special feature" envelope for
//! clients that have.

use crate::error::ParseError;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// A CL2 command tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cl2Command {
    /// `sh`: handshake, unlocking the special-feature envelope.
    Sh,
    /// `rf`: refresh, requesting the current userlist.
    Rf,
    /// `rt`: legacy tag with no server-side behavior.
    Rt,
    /// `sn`: set username.
    Sn,
    /// `ds`: disconnect notice.
    Ds,
    /// `gs`: global stream update.
    Gs,
    /// `ps`: private stream message.
    Ps,
    /// `l_g`: linked global variable/data frame.
    LinkedGlobal,
    /// `l_p`: linked private variable/data frame.
    LinkedPrivate,
}

impl Cl2Command {
    /// The wire tag for this command.
    pub fn tag(self) -> &'static str {
        match self {
            Cl2Command::Sh => "sh",
            Cl2Command::Rf => "rf",
            Cl2Command::Rt => "rt",
            Cl2Command::Sn => "sn",
            Cl2Command::Ds => "ds",
            Cl2Command::Gs => "gs",
            Cl2Command::Ps => "ps",
            Cl2Command::LinkedGlobal => "l_g",
            Cl2Command::LinkedPrivate => "l_p",
        }
    }
}

/// A parsed CL2 frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cl2Packet {
    pub command: Cl2Command,
    /// Linked-frame mode: 0 for data, 1/2 for variable updates.
    pub mode: Option<u8>,
    pub sender: String,
    pub recipient: String,
    pub var_name: String,
    pub data: String,
}

impl Cl2Packet {
    fn new(command: Cl2Command) -> Self {
        Self {
            command,
            mode: None,
            sender: String::new(),
            recipient: String::new(),
            var_name: String::new(),
            data: String::new(),
        }
    }
}

/// Which pattern matched, controlling group-to-field mapping.
#[derive(Debug, Clone, Copy)]
enum Shape {
    LinkedPrivateVars,
    LinkedGlobalVars,
    LinkedPrivateData,
    LinkedGlobalData,
    PrivateStream,
    GlobalStream,
    SetUsername,
    Disconnect,
    SimpleCmd,
}

/// Ordered pattern table, most specific first.
static PATTERNS: LazyLock<Vec<(Shape, Regex)>> = LazyLock::new(|| {
    // These are compile-time constant literals that always compile.
    let table: &[(Shape, &str)] = &[
        (
            Shape::LinkedPrivateVars,
            r"^<%l_p>\n(?P<Mode>[12])\n(?P<Sender>.*?)\n(?P<Recipient>.*?)\n(?P<VarName>.*?)\n(?s:(?P<Data>.*))$",
        ),
        (
            Shape::LinkedGlobalVars,
            r"^<%l_g>\n(?P<Mode>[12])\n(?P<Sender>.*?)\n(?P<VarName>.*?)\n(?s:(?P<Data>.*))$",
        ),
        (
            Shape::LinkedPrivateData,
            r"^<%l_p>\n(?P<Mode>0)\n(?P<Sender>.*?)\n(?P<Recipient>.*?)\n(?s:(?P<Data>.*))$",
        ),
        (
            Shape::LinkedGlobalData,
            r"^<%l_g>\n(?P<Mode>0)\n(?P<Sender>.*?)\n(?s:(?P<Data>.*))$",
        ),
        (
            Shape::PrivateStream,
            r"^<%ps>\n(?P<Sender>.*?)\n(?P<Recipient>.*?)\n(?s:(?P<Data>.*))$",
        ),
        (
            Shape::GlobalStream,
            r"^<%gs>\n(?P<Sender>.*?)\n(?s:(?P<Data>.*))$",
        ),
        (Shape::SetUsername, r"^<%sn>\n(?P<Sender>.*)$"),
        (Shape::Disconnect, r"^<%ds>\n(?P<Sender>.*)$"),
        (Shape::SimpleCmd, r"^<%(?P<Cmd>rf|sh|rt)>\n?(?P<Sender>.*)$"),
    ];
    table
        .iter()
        .map(|(shape, pattern)| (*shape, Regex::new(pattern).expect("static CL2 pattern")))
        .collect()
});

/// Parse a CL2 text frame.
///
/// The `<%` prefix check short-circuits the common not-CL2 case before any
/// regex runs.
pub fn parse(text: &str) -> Result<Cl2Packet, ParseError> {
    if !text.starts_with("<%") {
        return Err(ParseError::MalformedCl2);
    }

    for (shape, pattern) in PATTERNS.iter() {
        let Some(captures) = pattern.captures(text) else {
            continue;
        };
        let group = |name: &str| {
            captures
                .name(name)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default()
        };
        let mode = captures
            .name("Mode")
            .and_then(|m| m.as_str().parse::<u8>().ok());

        let mut packet = match shape {
            Shape::LinkedPrivateVars | Shape::LinkedPrivateData => {
                Cl2Packet::new(Cl2Command::LinkedPrivate)
            }
            Shape::LinkedGlobalVars | Shape::LinkedGlobalData => {
                Cl2Packet::new(Cl2Command::LinkedGlobal)
            }
            Shape::PrivateStream => Cl2Packet::new(Cl2Command::Ps),
            Shape::GlobalStream => Cl2Packet::new(Cl2Command::Gs),
            Shape::SetUsername => Cl2Packet::new(Cl2Command::Sn),
            Shape::Disconnect => Cl2Packet::new(Cl2Command::Ds),
            Shape::SimpleCmd => Cl2Packet::new(match &*group("Cmd") {
                "sh" => Cl2Command::Sh,
                "rf" => Cl2Command::Rf,
                _ => Cl2Command::Rt,
            }),
        };
        packet.mode = mode;
        packet.sender = group("Sender");
        packet.recipient = group("Recipient");
        packet.var_name = group("VarName");
        packet.data = group("Data");
        return Ok(packet);
    }

    Err(ParseError::MalformedCl2)
}

// ============================================================================
// Server replies
// ============================================================================

/// Flat reply shape, sent to clients that have not completed the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cl2Flat {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Inner payload of the special-feature envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cl2Payload {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: String,
}

/// `{type: "sf", ...}` envelope for post-handshake clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cl2Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Cl2Payload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// An outbound CL2 frame, flat or enveloped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Cl2Frame {
    Flat(Cl2Flat),
    Envelope(Cl2Envelope),
}

impl Cl2Frame {
    fn flat(kind: &str, data: String, id: Option<String>) -> Self {
        Cl2Frame::Flat(Cl2Flat {
            kind: kind.to_string(),
            data,
            id,
        })
    }

    fn envelope(kind: &str, data: String, id: Option<String>) -> Self {
        Cl2Frame::Envelope(Cl2Envelope {
            kind: "sf".to_string(),
            data: Cl2Payload {
                kind: kind.to_string(),
                data,
            },
            id,
        })
    }

    /// A global stream update, in the recipient's format.
    pub fn global_stream(data: &str, special: bool) -> Self {
        if special {
            Self::envelope("gs", data.to_string(), None)
        } else {
            Self::flat("gs", data.to_string(), None)
        }
    }

    /// A private stream message, in the recipient's format.
    pub fn private_stream(data: &str, recipient: &str, special: bool) -> Self {
        if special {
            Self::envelope("ps", data.to_string(), Some(recipient.to_string()))
        } else {
            Self::flat("ps", data.to_string(), Some(recipient.to_string()))
        }
    }

    /// The userlist reply: names joined and terminated with `;`.
    /// Always flat, regardless of handshake status.
    pub fn userlist(names: &[String]) -> Self {
        Self::flat("ul", format!("{};", names.join(";")), None)
    }

    /// The server version reply sent after `sh`. The handshake has just
    /// completed, so this is always enveloped.
    pub fn version(version: &str) -> Self {
        Self::envelope("vers", version.to_string(), None)
    }

    /// Serialize for the wire.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_commands() {
        let packet = parse("<%sh>\nluke").unwrap();
        assert_eq!(packet.command, Cl2Command::Sh);
        assert_eq!(packet.sender, "luke");

        let packet = parse("<%rf>").unwrap();
        assert_eq!(packet.command, Cl2Command::Rf);
        assert_eq!(packet.sender, "");
    }

    #[test]
    fn parses_set_username_and_disconnect() {
        let packet = parse("<%sn>\nyoda").unwrap();
        assert_eq!(packet.command, Cl2Command::Sn);
        assert_eq!(packet.sender, "yoda");

        let packet = parse("<%ds>\nyoda").unwrap();
        assert_eq!(packet.command, Cl2Command::Ds);
    }

    #[test]
    fn parses_global_stream_with_newlines_in_data() {
        let packet = parse("<%gs>\nluke\nline one\nline two").unwrap();
        assert_eq!(packet.command, Cl2Command::Gs);
        assert_eq!(packet.sender, "luke");
        assert_eq!(packet.data, "line one\nline two");
    }

    #[test]
    fn parses_private_stream() {
        let packet = parse("<%ps>\nluke\nyoda\nhello").unwrap();
        assert_eq!(packet.command, Cl2Command::Ps);
        assert_eq!(packet.sender, "luke");
        assert_eq!(packet.recipient, "yoda");
        assert_eq!(packet.data, "hello");
    }

    #[test]
    fn parses_linked_variable_frames() {
        let packet = parse("<%l_p>\n1\nluke\nyoda\nscore\n42").unwrap();
        assert_eq!(packet.command, Cl2Command::LinkedPrivate);
        assert_eq!(packet.mode, Some(1));
        assert_eq!(packet.recipient, "yoda");
        assert_eq!(packet.var_name, "score");
        assert_eq!(packet.data, "42");

        let packet = parse("<%l_g>\n2\nluke\nscore\n42").unwrap();
        assert_eq!(packet.command, Cl2Command::LinkedGlobal);
        assert_eq!(packet.mode, Some(2));
        assert_eq!(packet.var_name, "score");
    }

    #[test]
    fn parses_linked_data_frames() {
        let packet = parse("<%l_p>\n0\nluke\nyoda\npayload").unwrap();
        assert_eq!(packet.command, Cl2Command::LinkedPrivate);
        assert_eq!(packet.mode, Some(0));
        assert_eq!(packet.recipient, "yoda");
        assert_eq!(packet.data, "payload");

        // The two-field l_g form: sender and data only.
        let packet = parse("<%l_g>\n0\nluke\npayload").unwrap();
        assert_eq!(packet.command, Cl2Command::LinkedGlobal);
        assert_eq!(packet.mode, Some(0));
        assert_eq!(packet.sender, "luke");
        assert_eq!(packet.data, "payload");
        assert_eq!(packet.recipient, "");
    }

    #[test]
    fn rejects_non_cl2_frames() {
        assert!(parse(r#"{"cmd":"gmsg"}"#).is_err());
        assert!(parse("<%nope>\nx").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn flat_and_enveloped_replies() {
        let flat = Cl2Frame::global_stream("hi", false);
        assert_eq!(flat.to_json(), r#"{"type":"gs","data":"hi"}"#);

        let wrapped = Cl2Frame::global_stream("hi", true);
        assert_eq!(
            wrapped.to_json(),
            r#"{"type":"sf","data":{"type":"gs","data":"hi"}}"#
        );

        let private = Cl2Frame::private_stream("hello", "yoda", false);
        assert_eq!(
            private.to_json(),
            r#"{"type":"ps","data":"hello","id":"yoda"}"#
        );
    }

    #[test]
    fn userlist_reply_is_semicolon_terminated() {
        let frame = Cl2Frame::userlist(&["luke".to_string(), "yoda".to_string()]);
        assert_eq!(frame.to_json(), r#"{"type":"ul","data":"luke;yoda;"}"#);
    }
}
