//! cloudlinkd - a multi-protocol CloudLink WebSocket hub.
//!
//! One endpoint, three wire protocols: the legacy line-delimited CL2, the
//! JSON CL3/CL4 command protocol across five dialects, and the Scratch
//! cloud-variable protocol. A connection's protocol is detected from its
//! first frame; clients are grouped into named rooms carrying shared state
//! (a global message slot and keyed global variables) that is broadcast on
//! update and replayed to newcomers.

pub mod config;
pub mod handlers;
pub mod network;
pub mod state;
