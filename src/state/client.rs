//! Per-connection client state.
//!
//! A [`Client`] is created when a WebSocket connection opens and destroyed
//! when it closes. The record itself is shared (`Arc`) between the session
//! task, the hub registry, and every room the client joins; the mutable
//! parts live behind a single `RwLock`, following the
//! hub → room → client lock order. The writer queue is the only way
//! anything reaches the socket: the session task drains it and owns the
//! write half exclusively.

use crate::state::{Hub, Room};
use cloudlink_proto::{Cl2Frame, ClientId, Dialect, Protocol, ScratchPacket, UplPacket, UserObject};
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, Notify, RwLock};
use tracing::{debug, info};

/// One item on a client's writer queue. The session's writer accepts typed
/// packets (serialized at write time), pre-encoded buffers, and raw strings;
/// each becomes exactly one text frame.
#[derive(Debug, Clone)]
pub enum Outgoing {
    Upl(UplPacket),
    Scratch(ScratchPacket),
    Cl2(Cl2Frame),
    Bytes(Vec<u8>),
    Text(String),
}

impl Outgoing {
    /// Encode into the text frame body.
    pub fn encode(self) -> String {
        match self {
            Outgoing::Upl(packet) => packet.to_json(),
            Outgoing::Scratch(packet) => packet.to_json(),
            Outgoing::Cl2(frame) => frame.to_json(),
            Outgoing::Bytes(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Outgoing::Text(text) => text,
        }
    }
}

/// Mutable client state, guarded by the client lock.
#[derive(Debug, Default)]
pub struct ClientState {
    /// Username; may be a string, integer, float, or boolean.
    pub name: Option<Value>,
    /// Flips true exactly once; `name` never changes afterwards.
    pub name_set: bool,
    /// Post-handshake status; monotonic to true.
    pub handshake: bool,
    /// Bound protocol; flips from undetermined exactly once.
    pub protocol: Protocol,
    /// Inferred CL3/CL4 dialect; never decreases.
    pub dialect: Dialect,
    /// Rooms this client is subscribed to, keyed by room name.
    pub rooms: HashMap<String, Arc<Room>>,
}

/// A connected client.
pub struct Client {
    pub id: ClientId,
    pub uuid: uuid::Uuid,
    pub addr: SocketAddr,
    sender: mpsc::UnboundedSender<Outgoing>,
    exit: Notify,
    pub state: RwLock<ClientState>,
}

impl Client {
    pub(crate) fn new(
        id: ClientId,
        uuid: uuid::Uuid,
        addr: SocketAddr,
        sender: mpsc::UnboundedSender<Outgoing>,
    ) -> Self {
        Self {
            id,
            uuid,
            addr,
            sender,
            exit: Notify::new(),
            state: RwLock::new(ClientState::default()),
        }
    }

    /// Enqueue an outbound packet. Delivery is in enqueue order; a failure
    /// means the session is gone, and the packet is dropped with a log line.
    pub fn send(&self, packet: Outgoing) {
        if self.sender.send(packet).is_err() {
            debug!(client = %self.id, "dropping packet for closed session");
        }
    }

    /// Signal the session loop to exit.
    pub fn close(&self) {
        self.exit.notify_one();
    }

    /// Wait for the exit signal.
    pub async fn closed(&self) {
        self.exit.notified().await;
    }

    /// The wire identity triple, with `username` present iff a name is set.
    pub async fn user_object(&self) -> UserObject {
        let state = self.state.read().await;
        UserObject {
            id: self.id,
            username: if state.name_set {
                state.name.clone()
            } else {
                None
            },
            uuid: self.uuid,
        }
    }

    /// Bind the connection's protocol. Only called once, by the detector.
    pub async fn bind_protocol(&self, protocol: Protocol) {
        let mut state = self.state.write().await;
        if state.protocol == Protocol::Undetermined {
            state.protocol = protocol;
            info!(client = %self.id, %protocol, "protocol detected");
        }
    }

    /// Set the username. The caller has already validated the type and
    /// checked `name_set`; this flips the flag.
    pub async fn set_name(&self, name: Value) {
        let mut state = self.state.write().await;
        info!(client = %self.id, username = %name, "username set");
        state.name = Some(name);
        state.name_set = true;
    }

    /// Mark the handshake complete. Monotonic: never flips back.
    pub async fn update_handshake(&self, handshake: bool) {
        if handshake {
            self.state.write().await.handshake = true;
        }
    }

    /// Upgrade the dialect; a no-op unless `new` is strictly newer.
    pub async fn upgrade_dialect(&self, new: Dialect) {
        let mut state = self.state.write().await;
        if new > state.dialect {
            if state.dialect == Dialect::Undetermined {
                info!(client = %self.id, dialect = %new, "dialect detected");
            } else {
                info!(client = %self.id, dialect = %new, "dialect upgraded");
            }
            state.dialect = new;
        }
    }

    /// Subscribe to a room. Updates both sides of the membership edge,
    /// room first (lock order: room → client).
    pub async fn join_room(self: &Arc<Self>, room: &Arc<Room>) {
        room.insert(Arc::clone(self)).await;
        let mut state = self.state.write().await;
        if state
            .rooms
            .insert(room.name().to_string(), Arc::clone(room))
            .is_none()
        {
            info!(client = %self.id, room = %room.name(), "joined room");
        }
    }

    /// Leave a room, destroying it if this was the last member (the default
    /// room is never destroyed).
    pub async fn leave_room(self: &Arc<Self>, hub: &Hub, room: &Arc<Room>) {
        room.remove(self.id).await;
        if self
            .state
            .write()
            .await
            .rooms
            .remove(room.name())
            .is_some()
        {
            info!(client = %self.id, room = %room.name(), "left room");
        }
        hub.reap_room(room).await;
    }

    /// Snapshot of every room this client is subscribed to.
    pub async fn all_rooms(&self) -> Vec<Arc<Room>> {
        self.state.read().await.rooms.values().cloned().collect()
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("uuid", &self.uuid)
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}
