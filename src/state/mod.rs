//! Hub state: clients, rooms, identifiers, fan-out.

mod client;
mod hub;
mod room;
mod uid;

pub use client::{Client, ClientState, Outgoing};
pub use hub::{Hub, SERVER_VERSION};
pub use room::{Room, DEFAULT_ROOM};
pub use uid::SnowflakeGenerator;
