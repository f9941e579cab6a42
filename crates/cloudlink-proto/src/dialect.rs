//! Protocol and dialect classification.
//!
//! A client's protocol is fixed on its first frame; its CL3/CL4 dialect is a
//! monotone lattice that may only move upward as later packets reveal newer
//! features. Inference never downgrades: a v0.2.0 client that sends a plain
//! `gmsg` (which on its own looks like v0.1.5) stays at v0.2.0.

use crate::packet::UplPacket;
use crate::value::is_type_declaration;
use std::fmt;

/// The wire protocol a connection speaks, bound once at detection time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    /// No frame seen yet.
    #[default]
    Undetermined,
    /// Line-delimited legacy protocol.
    Cl2,
    /// JSON command protocol (dialect resolved separately).
    Cl3or4,
    /// Scratch cloud-variable protocol.
    Scratch,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Protocol::Undetermined => "undetermined",
            Protocol::Cl2 => "CL2",
            Protocol::Cl3or4 => "CL3/CL4",
            Protocol::Scratch => "scratch",
        })
    }
}

/// The exact CL3/CL4 wire flavor a client speaks.
///
/// Ordered: later variants are strictly newer, and
/// [`upgrade`](Dialect::max) semantics rely on that ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Dialect {
    /// No CL3/CL4 packet classified yet.
    #[default]
    Undetermined,
    /// CL3 v0.1.5 (or older): `direct`/`data` nesting, no motd, no statuscodes.
    Cl3_0_1_5,
    /// CL3 v0.1.7: `direct`/`val` nesting, statuscodes.
    Cl3_0_1_7,
    /// CL4 v0.1.8: top-level commands, `link`, listeners.
    Cl4_0_1_8,
    /// CL4 v0.1.9: `handshake` command.
    Cl4_0_1_9,
    /// CL4 v0.2.0: structured handshake, UserObject userlists, origins.
    Cl4_0_2_0,
}

impl Dialect {
    /// The server version string spoofed to match what a client of this
    /// dialect expects to hear back.
    pub fn spoofed_version(self) -> &'static str {
        match self {
            Dialect::Cl3_0_1_5 | Dialect::Undetermined => "0.1.5",
            Dialect::Cl3_0_1_7 => "0.1.7",
            Dialect::Cl4_0_1_8 => "0.1.8",
            Dialect::Cl4_0_1_9 => "0.1.9",
            Dialect::Cl4_0_2_0 => "0.2.0",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Dialect::Undetermined => "undetermined",
            Dialect::Cl3_0_1_5 => "CL3 v0.1.5",
            Dialect::Cl3_0_1_7 => "CL3 v0.1.7",
            Dialect::Cl4_0_1_8 => "CL4 v0.1.8",
            Dialect::Cl4_0_1_9 => "CL4 v0.1.9",
            Dialect::Cl4_0_2_0 => "CL4 v0.2.0",
        })
    }
}

/// Classify a CL3/CL4 packet by its version quirks.
///
/// The caller feeds every inbound packet through this and takes the max with
/// the client's current dialect.
pub fn infer_dialect(packet: &UplPacket) -> Dialect {
    if packet.cmd == "handshake" {
        // v0.2.0 handshakes carry a {language, version} object in val.
        let structured = packet
            .val
            .as_ref()
            .and_then(|v| v.as_object())
            .is_some_and(|map| map.contains_key("language") && map.contains_key("version"));
        if structured {
            Dialect::Cl4_0_2_0
        } else {
            Dialect::Cl4_0_1_9
        }
    } else if packet.cmd == "link" || packet.has_listener() {
        Dialect::Cl4_0_1_8
    } else if packet.cmd == "direct" && packet.val.as_ref().is_some_and(is_type_declaration) {
        Dialect::Cl3_0_1_7
    } else {
        Dialect::Cl3_0_1_5
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn packet(raw: serde_json::Value) -> UplPacket {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn structured_handshake_is_0_2_0() {
        let p = packet(json!({"cmd": "handshake", "val": {"language": "js", "version": "1.0"}}));
        assert_eq!(infer_dialect(&p), Dialect::Cl4_0_2_0);
    }

    #[test]
    fn bare_handshake_is_0_1_9() {
        assert_eq!(
            infer_dialect(&packet(json!({"cmd": "handshake"}))),
            Dialect::Cl4_0_1_9
        );
        assert_eq!(
            infer_dialect(&packet(json!({"cmd": "handshake", "val": "hi"}))),
            Dialect::Cl4_0_1_9
        );
    }

    #[test]
    fn link_or_listener_is_at_least_0_1_8() {
        assert_eq!(
            infer_dialect(&packet(json!({"cmd": "link", "val": "room"}))),
            Dialect::Cl4_0_1_8
        );
        assert_eq!(
            infer_dialect(&packet(json!({"cmd": "gmsg", "val": "x", "listener": "tag"}))),
            Dialect::Cl4_0_1_8
        );
    }

    #[test]
    fn direct_type_declaration_is_0_1_7() {
        let p = packet(json!({"cmd": "direct", "val": {"cmd": "type", "val": "py"}}));
        assert_eq!(infer_dialect(&p), Dialect::Cl3_0_1_7);
    }

    #[test]
    fn everything_else_is_0_1_5() {
        assert_eq!(
            infer_dialect(&packet(json!({"cmd": "gmsg", "val": "hi"}))),
            Dialect::Cl3_0_1_5
        );
        assert_eq!(
            infer_dialect(&packet(json!({"cmd": "setid", "val": "alice"}))),
            Dialect::Cl3_0_1_5
        );
    }

    #[test]
    fn empty_listener_does_not_promote() {
        let p = packet(json!({"cmd": "gmsg", "val": "hi", "listener": ""}));
        assert_eq!(infer_dialect(&p), Dialect::Cl3_0_1_5);
    }

    #[test]
    fn dialect_ordering_is_monotone() {
        assert!(Dialect::Cl3_0_1_5 < Dialect::Cl3_0_1_7);
        assert!(Dialect::Cl3_0_1_7 < Dialect::Cl4_0_1_8);
        assert!(Dialect::Cl4_0_1_8 < Dialect::Cl4_0_1_9);
        assert!(Dialect::Cl4_0_1_9 < Dialect::Cl4_0_2_0);
    }

    #[test]
    fn spoofed_versions() {
        assert_eq!(Dialect::Cl3_0_1_5.spoofed_version(), "0.1.5");
        assert_eq!(Dialect::Cl4_0_2_0.spoofed_version(), "0.2.0");
    }
}
