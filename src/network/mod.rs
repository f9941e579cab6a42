//! Network layer: the gateway accept loop and per-connection sessions.

mod gateway;
mod session;

pub use gateway::Gateway;
