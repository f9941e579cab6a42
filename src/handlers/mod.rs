//! Protocol command handlers.
//!
//! The session loop parses each inbound frame with the connection's bound
//! protocol and hands the typed packet here. Handlers mutate hub state and
//! enqueue outbound packets on writer queues; they never touch the socket.

pub mod cl2;
pub mod cl3or4;
pub mod scratch;
mod status;

pub use status::Status;

use crate::state::{Client, Hub};
use cloudlink_proto::{self as proto, FirstPacket, ParseError, Protocol, ScratchPacket, UplPacket};
use std::sync::Arc;

/// Dispatch the first packet of a connection: binds the protocol and
/// replays the packet through the winning handler.
pub async fn dispatch_first(hub: &Arc<Hub>, client: &Arc<Client>, first: FirstPacket) {
    client.bind_protocol(first.protocol()).await;
    match first {
        FirstPacket::Upl(packet) => cl3or4::handle(hub, client, packet).await,
        FirstPacket::Scratch(packet) => scratch::handle(hub, client, packet).await,
        FirstPacket::Cl2(packet) => {
            // CL2 clients are reachable by username before the `sh`
            // handshake, so they subscribe to the default room as soon as
            // the protocol is detected.
            client.join_room(&hub.default_room).await;
            cl2::handle(hub, client, packet).await;
        }
    }
}

/// Parse and dispatch a frame for a connection with a bound protocol.
pub async fn dispatch(
    hub: &Arc<Hub>,
    client: &Arc<Client>,
    protocol: Protocol,
    text: &str,
) -> Result<(), ParseError> {
    match protocol {
        Protocol::Cl3or4 => cl3or4::handle(hub, client, UplPacket::parse(text)?).await,
        Protocol::Scratch => scratch::handle(hub, client, ScratchPacket::parse(text)?).await,
        Protocol::Cl2 => cl2::handle(hub, client, proto::cl2::parse(text)?).await,
        Protocol::Undetermined => unreachable!("dispatch before protocol binding"),
    }
    Ok(())
}
