//! The Scratch cloud-variable engine.
//!
//! A Scratch client handshakes into the room keyed by its project id and
//! stays in exactly that one room. Variable operations update the room's
//! gvar state and broadcast the same method back to the room.

use crate::state::{Client, Hub, Outgoing};
use cloudlink_proto::{value, ScratchPacket};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Handle one Scratch packet.
pub async fn handle(hub: &Arc<Hub>, client: &Arc<Client>, packet: ScratchPacket) {
    match packet.method.as_str() {
        "handshake" => handle_handshake(hub, client, &packet).await,
        "set" | "create" => handle_set(hub, client, &packet).await,
        "rename" => handle_rename(hub, client, &packet).await,
        "delete" => handle_delete(hub, client, &packet).await,
        other => {
            debug!(client = %client.id, method = %other, "unknown scratch method ignored");
        }
    }
}

async fn handle_handshake(hub: &Arc<Hub>, client: &Arc<Client>, packet: &ScratchPacket) {
    let Some(project_id) = packet.project_id.as_ref().filter(|id| value::is_scalar(id)) else {
        warn!(client = %client.id, "scratch handshake with invalid project id datatype");
        return;
    };

    if let Some(user) = &packet.user {
        if !client.state.read().await.name_set {
            client.set_name(Value::String(user.clone())).await;
        }
    }
    client.update_handshake(true).await;

    // Exactly one room per Scratch client: a re-handshake moves projects.
    for room in client.all_rooms().await {
        client.leave_room(hub, &room).await;
    }
    let room = hub.create_room(&value::canonical(project_id));
    client.join_room(&room).await;

    // Replay existing variables to the newcomer.
    for (name, val) in room.gvars().await {
        client.send(Outgoing::Scratch(ScratchPacket {
            method: "set".into(),
            name: Some(Value::String(name)),
            value: Some(val),
            ..Default::default()
        }));
    }
}

async fn handle_set(hub: &Arc<Hub>, client: &Arc<Client>, packet: &ScratchPacket) {
    let Some(name) = &packet.name else {
        warn!(client = %client.id, method = %packet.method, "scratch update missing name");
        return;
    };
    let stored = packet.value.clone().unwrap_or(Value::Null);

    // A Scratch client only ever has one room, the project.
    for room in client.all_rooms().await {
        room.set_gvar(value::canonical(name), stored.clone()).await;
        hub.broadcast_to_room(
            &room,
            Outgoing::Scratch(ScratchPacket {
                method: packet.method.clone(),
                name: Some(name.clone()),
                value: Some(stored.clone()),
                ..Default::default()
            }),
            &[],
        )
        .await;
    }
}

async fn handle_rename(hub: &Arc<Hub>, client: &Arc<Client>, packet: &ScratchPacket) {
    let (Some(name), Some(new_name)) = (&packet.name, &packet.new_name) else {
        warn!(client = %client.id, "scratch rename missing name or new_name");
        return;
    };
    for room in client.all_rooms().await {
        if !room
            .rename_gvar(&value::canonical(name), value::canonical(new_name))
            .await
        {
            debug!(client = %client.id, variable = %name, "rename of unknown variable skipped");
            continue;
        }
        hub.broadcast_to_room(
            &room,
            Outgoing::Scratch(ScratchPacket {
                method: "rename".into(),
                name: Some(name.clone()),
                new_name: Some(new_name.clone()),
                ..Default::default()
            }),
            &[],
        )
        .await;
    }
}

async fn handle_delete(hub: &Arc<Hub>, client: &Arc<Client>, packet: &ScratchPacket) {
    let Some(name) = &packet.name else {
        warn!(client = %client.id, "scratch delete missing name");
        return;
    };
    for room in client.all_rooms().await {
        room.delete_gvar(&value::canonical(name)).await;
        hub.broadcast_to_room(
            &room,
            Outgoing::Scratch(ScratchPacket {
                method: "delete".into(),
                name: Some(name.clone()),
                ..Default::default()
            }),
            &[],
        )
        .await;
    }
}
