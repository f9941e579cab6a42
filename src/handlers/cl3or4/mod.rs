//! The CL3/CL4 command engine.
//!
//! Every inbound packet first feeds the dialect lattice (upgrades only),
//! then CL3 v0.1.7 `direct` wrappers are unwrapped, then the command is
//! dispatched. Semantic failures reply with status codes; nothing here
//! tears down the session.

mod replies;

pub use replies::broadcast_userlist_event;

use crate::handlers::Status;
use crate::state::{Client, Hub, Outgoing, Room, DEFAULT_ROOM};
use cloudlink_proto::{infer_dialect, value, Dialect, UplPacket};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use replies::{
    send_compat_burst, send_initial_state, send_room_state, send_statuscode, send_userlist,
};

/// Handle one CL3/CL4 packet.
pub async fn handle(hub: &Arc<Hub>, client: &Arc<Client>, mut packet: UplPacket) {
    client.upgrade_dialect(infer_dialect(&packet)).await;

    // De-nest the v0.1.7 `direct` wrapper: {cmd:"direct", val:{cmd, val}}
    // re-dispatches as the inner command.
    if packet.cmd == "direct" && client.state.read().await.dialect == Dialect::Cl3_0_1_7 {
        let inner = packet.val.as_ref().and_then(|v| v.as_object()).and_then(|map| {
            map.get("cmd")
                .and_then(Value::as_str)
                .map(|cmd| (cmd.to_string(), map.get("val").cloned()))
        });
        if let Some((cmd, val)) = inner {
            debug!(client = %client.id, cmd = %cmd, "de-nesting direct command");
            packet.cmd = cmd;
            packet.val = val;
        }
    }

    let cmd = packet.cmd.clone();
    match cmd.as_str() {
        // `type` is the v0.1.7 spelling, surfaced by de-nesting.
        "handshake" | "type" => handle_handshake(hub, client, &packet).await,
        "gmsg" => handle_gmsg(client, &packet).await,
        "gvar" => handle_gvar(client, &packet).await,
        "pmsg" => handle_pmsg(hub, client, &packet).await,
        "pvar" => handle_pvar(hub, client, &packet).await,
        "setid" => handle_setid(hub, client, &packet).await,
        "link" => handle_link(hub, client, &packet).await,
        "unlink" => handle_unlink(hub, client, &packet).await,
        "direct" => handle_direct(client, &packet).await,
        "echo" => client.send(Outgoing::Upl(packet)),
        other => {
            warn!(client = %client.id, cmd = %other, "invalid command");
            send_statuscode(
                client,
                Status::InvalidCommand,
                None,
                None,
                packet.listener.clone(),
            )
            .await;
        }
    }
}

async fn handle_handshake(hub: &Arc<Hub>, client: &Arc<Client>, packet: &UplPacket) {
    let listener = packet.listener.clone();
    if client.state.read().await.handshake {
        send_statuscode(
            client,
            Status::Ok,
            Some("Handshake already complete"),
            None,
            listener,
        )
        .await;
        return;
    }
    client.update_handshake(true).await;
    client.join_room(&hub.default_room).await;
    send_initial_state(hub, client).await;
    send_statuscode(client, Status::Ok, None, None, listener).await;
}

async fn handle_gmsg(client: &Arc<Client>, packet: &UplPacket) {
    let listener = packet.listener.clone();
    let Some(val) = &packet.val else {
        send_statuscode(
            client,
            Status::Syntax,
            Some("Message missing required val key"),
            None,
            listener,
        )
        .await;
        return;
    };
    for room in target_rooms(client, &packet.rooms).await {
        room.set_gmsg(val.clone()).await;
        replies::broadcast_gmsg(&room, client, val).await;
    }
}

async fn handle_gvar(client: &Arc<Client>, packet: &UplPacket) {
    let listener = packet.listener.clone();
    let (Some(name), Some(val)) = (&packet.name, &packet.val) else {
        send_statuscode(
            client,
            Status::Syntax,
            Some("Message missing required val or name key"),
            None,
            listener,
        )
        .await;
        return;
    };
    let Some(name_str) = name.as_str() else {
        send_statuscode(
            client,
            Status::Datatype,
            Some("Variable name must be a string"),
            None,
            listener,
        )
        .await;
        return;
    };
    for room in target_rooms(client, &packet.rooms).await {
        room.set_gvar(name_str.to_string(), val.clone()).await;
        replies::broadcast_gvar(&room, client, name, val).await;
    }
}

async fn handle_pmsg(hub: &Arc<Hub>, client: &Arc<Client>, packet: &UplPacket) {
    let listener = packet.listener.clone();
    if !client.state.read().await.name_set {
        send_statuscode(client, Status::IdRequired, None, None, listener).await;
        return;
    }
    let (Some(val), Some(id)) = (&packet.val, &packet.id) else {
        send_statuscode(
            client,
            Status::Syntax,
            Some("Message missing required val or id key"),
            None,
            listener,
        )
        .await;
        return;
    };
    let Some(targets) = value::scalar_or_list(id) else {
        send_statuscode(
            client,
            Status::Syntax,
            Some("ID must be a single recipient or an array"),
            None,
            listener,
        )
        .await;
        return;
    };

    let mut delivered = false;
    for target_id in &targets {
        if let Some(target) = hub.find_client(target_id).await {
            replies::unicast_pmsg(client, &target, val).await;
            delivered = true;
        }
    }
    if !delivered {
        debug!(client = %client.id, targets = ?targets, "pmsg targets not found");
        send_statuscode(
            client,
            Status::NotFound,
            Some("Target ID(s) not found"),
            None,
            listener,
        )
        .await;
    }
}

async fn handle_pvar(hub: &Arc<Hub>, client: &Arc<Client>, packet: &UplPacket) {
    let listener = packet.listener.clone();
    if !client.state.read().await.name_set {
        send_statuscode(client, Status::IdRequired, None, None, listener).await;
        return;
    }
    let (Some(name), Some(val), Some(id)) = (&packet.name, &packet.val, &packet.id) else {
        send_statuscode(
            client,
            Status::Syntax,
            Some("Message missing required val, name, or id key"),
            None,
            listener,
        )
        .await;
        return;
    };
    if !name.is_string() {
        send_statuscode(
            client,
            Status::Datatype,
            Some("Variable name must be a string"),
            None,
            listener,
        )
        .await;
        return;
    }
    let Some(targets) = value::scalar_or_list(id) else {
        send_statuscode(
            client,
            Status::Syntax,
            Some("ID must be a single recipient or an array"),
            None,
            listener,
        )
        .await;
        return;
    };

    let mut delivered = false;
    for target_id in &targets {
        if let Some(target) = hub.find_client(target_id).await {
            replies::unicast_pvar(client, &target, name, val).await;
            delivered = true;
        }
    }
    if !delivered {
        debug!(client = %client.id, targets = ?targets, "pvar targets not found");
        send_statuscode(
            client,
            Status::NotFound,
            Some("Target ID(s) not found"),
            None,
            listener,
        )
        .await;
    }
}

async fn handle_setid(hub: &Arc<Hub>, client: &Arc<Client>, packet: &UplPacket) {
    let listener = packet.listener.clone();
    if client.state.read().await.name_set {
        let user = serde_json::to_value(client.user_object().await).ok();
        send_statuscode(client, Status::IdAlreadySet, None, user, listener).await;
        return;
    }
    let Some(name) = packet.val.clone().filter(value::is_scalar) else {
        send_statuscode(
            client,
            Status::Datatype,
            Some("Username must be a string, integer, float, or boolean"),
            None,
            listener,
        )
        .await;
        return;
    };
    if hub.is_username_taken(&name, client.id).await {
        send_statuscode(
            client,
            Status::IdTaken,
            Some("Username is already taken"),
            None,
            listener,
        )
        .await;
        return;
    }

    // Pre-v0.1.7 clients have no handshake command; their first setid
    // doubles as one.
    let state = client.state.read().await;
    let implicit_handshake = state.dialect < Dialect::Cl3_0_1_7 && !state.handshake;
    drop(state);
    if implicit_handshake {
        client.update_handshake(true).await;
        client.join_room(&hub.default_room).await;
        send_compat_burst(hub, client).await;
    }

    client.set_name(name).await;

    for room in client.all_rooms().await {
        broadcast_userlist_event(&room, client, "add").await;
        send_userlist(client, &room).await;
    }
    let user = serde_json::to_value(client.user_object().await).ok();
    send_statuscode(client, Status::Ok, None, user, listener).await;
}

async fn handle_link(hub: &Arc<Hub>, client: &Arc<Client>, packet: &UplPacket) {
    let listener = packet.listener.clone();
    if !client.state.read().await.name_set {
        send_statuscode(client, Status::IdRequired, None, None, listener).await;
        return;
    }
    let rooms = packet.val.as_ref().and_then(value::scalar_or_list);
    let Some(rooms) = rooms else {
        send_statuscode(
            client,
            Status::Syntax,
            Some("Val must be a single room name/ID or an array"),
            None,
            listener,
        )
        .await;
        return;
    };

    for entry in rooms {
        if !value::is_scalar(&entry) {
            // Stop at the first invalid element; earlier subscriptions stand.
            let detail = format!("Room name '{entry}' is not a valid type");
            send_statuscode(client, Status::Datatype, Some(detail.as_str()), None, listener)
                .await;
            return;
        }
        let key = value::canonical(&entry);
        let room = hub.create_room(&key);
        let already_joined = client.state.read().await.rooms.contains_key(&key);
        if !already_joined {
            client.join_room(&room).await;
            send_room_state(client, &room).await;
        }
    }
    send_statuscode(client, Status::Ok, None, None, listener).await;
}

async fn handle_unlink(hub: &Arc<Hub>, client: &Arc<Client>, packet: &UplPacket) {
    let listener = packet.listener.clone();
    if !client.state.read().await.name_set {
        send_statuscode(client, Status::IdRequired, None, None, listener).await;
        return;
    }

    // nil / empty string means "unlink from everything but default".
    let targets: Vec<Arc<Room>> = match &packet.val {
        None => client.all_rooms().await,
        Some(Value::String(s)) if s.is_empty() => client.all_rooms().await,
        Some(other) => {
            let Some(names) = value::scalar_or_list(other) else {
                send_statuscode(
                    client,
                    Status::Syntax,
                    Some("Val must be nil, empty string, a single room name/ID, or an array"),
                    None,
                    listener,
                )
                .await;
                return;
            };
            let subscribed = client.state.read().await.rooms.clone();
            names
                .iter()
                .filter_map(|name| subscribed.get(&value::canonical(name)).cloned())
                .collect()
        }
    };

    let requested_any = !targets.is_empty();
    let mut unlinked_any = false;
    for room in &targets {
        if room.is_default() {
            continue;
        }
        client.leave_room(hub, room).await;
        broadcast_userlist_event(room, client, "remove").await;
        unlinked_any = true;
    }

    // A mass unlink must leave the client somewhere.
    if requested_any && !client.state.read().await.rooms.contains_key(DEFAULT_ROOM) {
        client.join_room(&hub.default_room).await;
        send_room_state(client, &hub.default_room).await;
    }

    if unlinked_any {
        send_statuscode(client, Status::Ok, None, None, listener).await;
    } else {
        send_statuscode(
            client,
            Status::NotFound,
            Some("Specified room(s) not found or already unlinked"),
            None,
            listener,
        )
        .await;
    }
}

/// `direct` for clients that are not speaking the v0.1.7 nesting: a
/// best-effort no-op, acknowledged only when a listener asks for a reply.
async fn handle_direct(client: &Arc<Client>, packet: &UplPacket) {
    debug!(client = %client.id, val = ?packet.val, "direct command ignored");
    if packet.has_listener() {
        send_statuscode(client, Status::Ok, None, None, packet.listener.clone()).await;
    }
}

/// Resolve the rooms a gmsg/gvar applies to: absent means every subscribed
/// room, a list filters to subscribed entries (unknown names are skipped),
/// a scalar targets that one room if subscribed.
async fn target_rooms(client: &Client, rooms: &Option<Value>) -> Vec<Arc<Room>> {
    let subscribed = client.state.read().await.rooms.clone();
    match rooms {
        None => subscribed.into_values().collect(),
        Some(Value::Array(entries)) => entries
            .iter()
            .filter_map(|entry| subscribed.get(&value::canonical(entry)).cloned())
            .collect(),
        Some(scalar) => subscribed
            .get(&value::canonical(scalar))
            .cloned()
            .into_iter()
            .collect(),
    }
}
