//! # cloudlink-proto
//!
//! Wire formats and protocol detection for the CloudLink protocol family.
//!
//! A single WebSocket endpoint serves three distinct textual protocols:
//!
//! - **CL2**: a line-delimited, semi-structured legacy protocol
//!   (`<%gs>\n...` frames), parsed with an ordered regex set.
//! - **CL3/CL4**: the JSON "UPL" command protocol, spanning five historical
//!   dialects from v0.1.5 through v0.2.0, inferred per client from packet
//!   quirks.
//! - **Scratch**: the JSON cloud-variable protocol used by the Scratch
//!   platform (`{"method": ...}` frames).
//!
//! This crate owns the packet types, the per-frame parsers, the first-frame
//! protocol detector, and the dialect inference lattice. It performs no I/O;
//! the hub feeds it text frames and ships back whatever it returns.

pub mod cl2;
pub mod detect;
pub mod dialect;
pub mod error;
pub mod id;
pub mod packet;
pub mod scratch;
pub mod value;

pub use cl2::{Cl2Command, Cl2Frame, Cl2Packet};
pub use detect::{detect, FirstPacket};
pub use dialect::{infer_dialect, Dialect, Protocol};
pub use error::ParseError;
pub use id::ClientId;
pub use packet::{UplPacket, UserObject};
pub use scratch::ScratchPacket;
