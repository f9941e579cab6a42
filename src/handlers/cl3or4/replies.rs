//! CL3/CL4 reply construction, with every dialect quirk in one place.
//!
//! Five dialects share the command set but disagree on wire shapes: where
//! the server version nests, whether a MOTD exists at all, what a userlist
//! looks like, and what `origin` carries. Handlers call these helpers and
//! stay shape-agnostic.

use crate::handlers::Status;
use crate::state::{Client, Hub, Outgoing, Room};
use cloudlink_proto::{Dialect, Protocol, UplPacket};
use serde_json::{json, Value};
use std::sync::Arc;

/// Send a `statuscode` reply. Dialects below CL3 v0.1.7 predate status
/// codes and receive nothing.
pub async fn send_statuscode(
    client: &Client,
    status: Status,
    details: Option<&str>,
    val: Option<Value>,
    listener: Option<Value>,
) {
    if client.state.read().await.dialect < Dialect::Cl3_0_1_7 {
        return;
    }
    client.send(Outgoing::Upl(UplPacket {
        cmd: "statuscode".into(),
        code: status.code().into(),
        code_id: Some(status.code_id()),
        details: details.map(|d| Value::String(d.to_string())),
        val,
        listener,
        ..Default::default()
    }));
}

/// Send the server version, spoofed to the client's dialect and nested the
/// way that dialect expects.
pub async fn send_server_version(client: &Client) {
    let dialect = client.state.read().await.dialect;
    let version = dialect.spoofed_version();
    let packet = match dialect {
        Dialect::Cl3_0_1_5 | Dialect::Undetermined => UplPacket {
            cmd: "direct".into(),
            data: Some(json!({"cmd": "vers", "data": version})),
            ..Default::default()
        },
        Dialect::Cl3_0_1_7 => UplPacket {
            cmd: "direct".into(),
            val: Some(json!({"cmd": "vers", "val": version})),
            ..Default::default()
        },
        _ => UplPacket {
            cmd: "server_version".into(),
            val: Some(Value::String(version.to_string())),
            ..Default::default()
        },
    };
    client.send(Outgoing::Upl(packet));
}

/// Send the MOTD if enabled. CL3 v0.1.5 never receives one; v0.1.7 nests
/// it under `direct`.
pub async fn send_motd(hub: &Hub, client: &Client) {
    if !hub.config.enable_motd {
        return;
    }
    let dialect = client.state.read().await.dialect;
    if dialect <= Dialect::Cl3_0_1_5 {
        return;
    }
    let motd = hub.motd_text();
    let packet = match dialect {
        Dialect::Cl3_0_1_7 => UplPacket {
            cmd: "direct".into(),
            val: Some(json!({"cmd": "motd", "val": motd})),
            ..Default::default()
        },
        _ => UplPacket {
            cmd: "motd".into(),
            val: Some(Value::String(motd)),
            ..Default::default()
        },
    };
    client.send(Outgoing::Upl(packet));
}

/// Send the client's own UserObject; only v0.2.0 clients understand it.
pub async fn send_client_object(client: &Client) {
    if client.state.read().await.dialect < Dialect::Cl4_0_2_0 {
        return;
    }
    let user = client.user_object().await;
    client.send(Outgoing::Upl(UplPacket {
        cmd: "client_obj".into(),
        val: serde_json::to_value(user).ok(),
        ..Default::default()
    }));
}

/// Send the client its own IP address, when configured.
pub async fn send_client_ip(hub: &Hub, client: &Client) {
    if !hub.config.serve_ip_addresses {
        return;
    }
    client.send(Outgoing::Upl(UplPacket {
        cmd: "client_ip".into(),
        val: Some(Value::String(client.addr.ip().to_string())),
        ..Default::default()
    }));
}

/// Send the userlist in the client's dialect format.
pub async fn send_userlist(client: &Client, room: &Room) {
    let dialect = client.state.read().await.dialect;
    let mut packet = UplPacket {
        cmd: "ulist".into(),
        rooms: Some(Value::String(room.name().to_string())),
        ..Default::default()
    };
    if dialect >= Dialect::Cl4_0_2_0 {
        packet.mode = "set".into();
        packet.val = serde_json::to_value(room.user_objects().await).ok();
    } else if dialect >= Dialect::Cl4_0_1_8 {
        packet.val = Some(Value::Array(
            room.userlist_names()
                .await
                .into_iter()
                .map(Value::String)
                .collect(),
        ));
    } else {
        packet.val = Some(Value::String(room.userlist_string().await));
    }
    client.send(Outgoing::Upl(packet));
}

/// Replay a room's state to one client: gmsg, userlist, then every gvar.
pub async fn send_room_state(client: &Client, room: &Room) {
    client.send(Outgoing::Upl(UplPacket {
        cmd: "gmsg".into(),
        val: Some(room.gmsg().await),
        rooms: Some(Value::String(room.name().to_string())),
        ..Default::default()
    }));
    send_userlist(client, room).await;
    for (name, val) in room.gvars().await {
        client.send(Outgoing::Upl(UplPacket {
            cmd: "gvar".into(),
            name: Some(Value::String(name)),
            val: Some(val),
            rooms: Some(Value::String(room.name().to_string())),
            ..Default::default()
        }));
    }
}

/// The initial burst after a handshake: client_ip (if configured), server
/// version, MOTD, client object, then the state of every subscribed room.
pub async fn send_initial_state(hub: &Hub, client: &Client) {
    send_client_ip(hub, client).await;
    send_server_version(client).await;
    send_motd(hub, client).await;
    send_client_object(client).await;
    for room in client.all_rooms().await {
        send_room_state(client, &room).await;
    }
}

/// The reduced burst for pre-v0.1.7 clients that handshake implicitly via
/// `setid`: version and MOTD only.
pub async fn send_compat_burst(hub: &Hub, client: &Client) {
    send_server_version(client).await;
    send_motd(hub, client).await;
}

/// Announce a userlist change to a room after `updated` was added or
/// removed. v0.2.0 clients get a differential `{mode: "add"|"remove"}`
/// event; older dialects get the full list re-sent. The subject client is
/// excluded, as are unnamed clients and other protocols.
pub async fn broadcast_userlist_event(room: &Room, updated: &Client, mode: &str) {
    let event_val = serde_json::to_value(updated.user_object().await).ok();
    for member in room.clients().await {
        if member.id == updated.id {
            continue;
        }
        let state = member.state.read().await;
        if state.protocol != Protocol::Cl3or4 || !state.name_set {
            continue;
        }
        let dialect = state.dialect;
        drop(state);

        if dialect >= Dialect::Cl4_0_2_0 {
            member.send(Outgoing::Upl(UplPacket {
                cmd: "ulist".into(),
                mode: mode.to_string(),
                val: event_val.clone(),
                rooms: Some(Value::String(room.name().to_string())),
                ..Default::default()
            }));
        } else {
            send_userlist(&member, room).await;
        }
    }
}

/// Broadcast a global message to every CL3/CL4 client in a room, shaping
/// `rooms` and `origin` per recipient dialect.
pub async fn broadcast_gmsg(room: &Room, sender: &Arc<Client>, val: &Value) {
    broadcast_global(room, sender, "gmsg", None, val).await;
}

/// Broadcast a global variable update, as [`broadcast_gmsg`] plus `name`.
pub async fn broadcast_gvar(room: &Room, sender: &Arc<Client>, name: &Value, val: &Value) {
    broadcast_global(room, sender, "gvar", Some(name.clone()), val).await;
}

async fn broadcast_global(
    room: &Room,
    sender: &Arc<Client>,
    cmd: &str,
    name: Option<Value>,
    val: &Value,
) {
    let origin_user = serde_json::to_value(sender.user_object().await).ok();
    let origin_name = sender.state.read().await.name.clone();

    for member in room.clients().await {
        let state = member.state.read().await;
        if state.protocol != Protocol::Cl3or4 {
            continue;
        }
        let dialect = state.dialect;
        drop(state);

        let mut packet = UplPacket {
            cmd: cmd.to_string(),
            name: name.clone(),
            val: Some(val.clone()),
            ..Default::default()
        };
        if dialect >= Dialect::Cl4_0_1_8 {
            packet.rooms = Some(Value::String(room.name().to_string()));
        }
        packet.origin = match dialect {
            Dialect::Cl4_0_1_8 | Dialect::Cl4_0_1_9 => origin_name.clone(),
            Dialect::Cl4_0_2_0 => origin_user.clone(),
            _ => None,
        };
        member.send(Outgoing::Upl(packet));
    }
}

/// Unicast a private message, with `origin` in the recipient's form.
pub async fn unicast_pmsg(sender: &Arc<Client>, target: &Arc<Client>, val: &Value) {
    unicast_private(sender, target, "pmsg", None, val).await;
}

/// Unicast a private variable update, as [`unicast_pmsg`] plus `name`.
pub async fn unicast_pvar(
    sender: &Arc<Client>,
    target: &Arc<Client>,
    name: &Value,
    val: &Value,
) {
    unicast_private(sender, target, "pvar", Some(name.clone()), val).await;
}

async fn unicast_private(
    sender: &Arc<Client>,
    target: &Arc<Client>,
    cmd: &str,
    name: Option<Value>,
    val: &Value,
) {
    let state = target.state.read().await;
    if state.protocol != Protocol::Cl3or4 {
        return;
    }
    let dialect = state.dialect;
    drop(state);

    let origin = match dialect {
        Dialect::Cl3_0_1_7 | Dialect::Cl4_0_1_8 | Dialect::Cl4_0_1_9 => {
            sender.state.read().await.name.clone()
        }
        Dialect::Cl4_0_2_0 => serde_json::to_value(sender.user_object().await).ok(),
        _ => None,
    };

    target.send(Outgoing::Upl(UplPacket {
        cmd: cmd.to_string(),
        name,
        val: Some(val.clone()),
        origin,
        ..Default::default()
    }));
}
