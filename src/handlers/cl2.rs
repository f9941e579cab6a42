//! The CL2 command engine.
//!
//! CL2 clients all live in the default room. Replies are JSON, flat for
//! clients that have not completed the `sh` handshake and wrapped in the
//! `sf` envelope for those that have; the recipient's handshake status, not
//! the sender's, picks the shape.

use crate::state::{Client, Hub, Outgoing, Room, SERVER_VERSION};
use cloudlink_proto::{value, Cl2Command, Cl2Frame, Cl2Packet, Protocol};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Handle one CL2 packet.
pub async fn handle(hub: &Arc<Hub>, client: &Arc<Client>, packet: Cl2Packet) {
    let room = &hub.default_room;
    match packet.command {
        Cl2Command::Sh => handle_handshake(hub, client).await,
        Cl2Command::Rf => {
            let names = room_usernames(room).await;
            client.send(Outgoing::Cl2(Cl2Frame::userlist(&names)));
        }
        Cl2Command::Sn => handle_set_username(hub, client, room, &packet.sender).await,
        Cl2Command::Gs => handle_global_stream(room, &packet.data).await,
        Cl2Command::Ps => handle_private_stream(room, &packet.recipient, &packet.data).await,
        // The transport will close on its own; nothing to do here.
        Cl2Command::Ds => {}
        Cl2Command::LinkedGlobal | Cl2Command::LinkedPrivate => {
            // Recognized but inert; linked frames require a handshake and
            // are accepted silently.
            if client.state.read().await.handshake {
                debug!(client = %client.id, command = %packet.command.tag(), "linked frame accepted");
            }
        }
        Cl2Command::Rt => {
            debug!(client = %client.id, "rt frame ignored");
        }
    }
}

async fn handle_handshake(hub: &Arc<Hub>, client: &Arc<Client>) {
    if client.state.read().await.handshake {
        return;
    }
    client.update_handshake(true).await;
    client.join_room(&hub.default_room).await;
    client.send(Outgoing::Cl2(Cl2Frame::version(SERVER_VERSION)));
}

async fn handle_set_username(hub: &Arc<Hub>, client: &Arc<Client>, room: &Room, sender: &str) {
    if client.state.read().await.name_set {
        return;
    }
    client.set_name(Value::String(sender.to_string())).await;

    // Every CL2 client in the room sees the refreshed list; the frame is
    // encoded once and multicast as bytes.
    let frame = Cl2Frame::userlist(&room_usernames(room).await);
    let encoded = frame.to_json().into_bytes();
    let targets = cl2_members(room).await;
    hub.multicast(&targets, Outgoing::Bytes(encoded), &[]);
}

async fn handle_global_stream(room: &Room, data: &str) {
    room.set_gmsg(Value::String(data.to_string())).await;
    for member in room.clients().await {
        let state = member.state.read().await;
        if state.protocol != Protocol::Cl2 {
            continue;
        }
        let special = state.handshake;
        drop(state);
        member.send(Outgoing::Cl2(Cl2Frame::global_stream(data, special)));
    }
}

async fn handle_private_stream(room: &Room, recipient: &str, data: &str) {
    let Some(target) = room.find_client_by_username(recipient).await else {
        debug!(recipient = %recipient, "private stream target not found");
        return;
    };
    let special = target.state.read().await.handshake;
    target.send(Outgoing::Cl2(Cl2Frame::private_stream(
        data, recipient, special,
    )));
}

/// Canonical usernames of every named client in the room.
async fn room_usernames(room: &Room) -> Vec<String> {
    let mut names = Vec::new();
    for member in room.clients().await {
        let state = member.state.read().await;
        if let (true, Some(name)) = (state.name_set, &state.name) {
            names.push(value::canonical(name));
        }
    }
    names
}

/// Members of the room bound to the CL2 protocol.
async fn cl2_members(room: &Room) -> Vec<Arc<Client>> {
    let mut members = Vec::new();
    for member in room.clients().await {
        if member.state.read().await.protocol == Protocol::Cl2 {
            members.push(member);
        }
    }
    members
}
