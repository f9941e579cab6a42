//! First-frame protocol detection.
//!
//! A connection's protocol is decided by its first text frame, tried in
//! order: CL3/CL4 (a JSON object with a non-empty `cmd`), Scratch (a JSON
//! object with a non-empty `method`), then CL2 (a `<%` frame matching the
//! regex set). The JSON discriminators are disjoint, so only CL2-last
//! ordering matters, keeping JSON that happens to start with `<` out of the
//! CL2 parser.
//!
//! The winning parse is returned whole so the caller can replay it as the
//! connection's first command without re-parsing.

use crate::cl2::{self, Cl2Packet};
use crate::dialect::Protocol;
use crate::packet::UplPacket;
use crate::scratch::ScratchPacket;

/// The fully parsed first packet of a connection.
#[derive(Debug, Clone)]
pub enum FirstPacket {
    Upl(UplPacket),
    Scratch(ScratchPacket),
    Cl2(Cl2Packet),
}

impl FirstPacket {
    /// The protocol this packet binds the connection to.
    pub fn protocol(&self) -> Protocol {
        match self {
            FirstPacket::Upl(_) => Protocol::Cl3or4,
            FirstPacket::Scratch(_) => Protocol::Scratch,
            FirstPacket::Cl2(_) => Protocol::Cl2,
        }
    }
}

/// Classify and parse a first frame. `None` means no protocol matched and
/// the session must be terminated.
pub fn detect(text: &str) -> Option<FirstPacket> {
    if let Ok(packet) = UplPacket::parse(text) {
        return Some(FirstPacket::Upl(packet));
    }
    if let Ok(packet) = ScratchPacket::parse(text) {
        return Some(FirstPacket::Scratch(packet));
    }
    if let Ok(packet) = cl2::parse(text) {
        return Some(FirstPacket::Cl2(packet));
    }
    None
}
