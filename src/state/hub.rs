//! The hub: central registry of clients and rooms, plus fan-out.
//!
//! # Lock order (deadlock prevention)
//!
//! 1. Hub map shard lock (held during `DashMap` get/insert/remove)
//! 2. Room lock
//! 3. Client lock
//!
//! Never acquire in the opposite order. Iteration over the hub maps always
//! collects handles into a `Vec` first and releases the shard lock before
//! awaiting a room or client lock.

use crate::config::HubConfig;
use crate::state::{Client, Outgoing, Room, SnowflakeGenerator, DEFAULT_ROOM};
use cloudlink_proto::{value, ClientId};
use dashmap::DashMap;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// The version string reported to CL4 clients that do not need a spoofed
/// dialect version, and embedded in the default MOTD.
pub const SERVER_VERSION: &str = "1.2.0";

/// Central shared state: owns the client and room registries.
pub struct Hub {
    clients: DashMap<ClientId, Arc<Client>>,
    rooms: DashMap<String, Arc<Room>>,
    /// Pinned handle to the room named "default".
    pub default_room: Arc<Room>,
    ids: SnowflakeGenerator,
    pub config: HubConfig,
}

impl Hub {
    /// Create a hub with its default room in place.
    pub fn new(config: HubConfig) -> Arc<Self> {
        let rooms = DashMap::new();
        let default_room = Arc::new(Room::new(DEFAULT_ROOM));
        rooms.insert(DEFAULT_ROOM.to_string(), Arc::clone(&default_room));

        Arc::new(Self {
            clients: DashMap::new(),
            rooms,
            default_room,
            ids: SnowflakeGenerator::new(1),
            config,
        })
    }

    /// The MOTD text: the configured message, or a stock banner.
    pub fn motd_text(&self) -> String {
        if self.config.motd_message.is_empty() {
            format!("CloudLink Bridge Server v{SERVER_VERSION}")
        } else {
            self.config.motd_message.clone()
        }
    }

    // ========================================================================
    // Client registry
    // ========================================================================

    /// Allocate and register a client for a new connection.
    pub fn create_client(
        &self,
        addr: SocketAddr,
        sender: mpsc::UnboundedSender<Outgoing>,
    ) -> Arc<Client> {
        let client = Arc::new(Client::new(self.ids.next(), Uuid::new_v4(), addr, sender));
        self.clients.insert(client.id, Arc::clone(&client));
        info!(client = %client.id, uuid = %client.uuid, "connection created");
        client
    }

    /// Deregister a client: removes it from every room (reaping rooms that
    /// become empty) and from the registry.
    pub async fn destroy_client(&self, client: &Arc<Client>) {
        for room in client.all_rooms().await {
            client.leave_room(self, &room).await;
        }
        self.clients.remove(&client.id);
        info!(client = %client.id, uuid = %client.uuid, "connection destroyed");
    }

    /// Look a client up by snowflake id, then by username, then by UUID.
    pub async fn find_client(&self, query: &Value) -> Option<Arc<Client>> {
        let canonical = value::canonical(query);

        // Snowflake id, whether sent as a number or its string form.
        if let Ok(id) = canonical.parse::<u64>() {
            if let Some(client) = self.clients.get(&ClientId(id)) {
                return Some(Arc::clone(&client));
            }
        }

        let snapshot: Vec<Arc<Client>> =
            self.clients.iter().map(|c| Arc::clone(&c)).collect();

        for client in &snapshot {
            let state = client.state.read().await;
            if state.name_set
                && state
                    .name
                    .as_ref()
                    .is_some_and(|name| value::canonical(name) == canonical)
            {
                return Some(Arc::clone(client));
            }
        }

        if let Ok(uuid) = canonical.parse::<Uuid>() {
            return snapshot.into_iter().find(|c| c.uuid == uuid);
        }
        None
    }

    /// Whether any other live client already holds this name (canonical
    /// string comparison, so `"5"` and `5` collide).
    pub async fn is_username_taken(&self, name: &Value, exclude: ClientId) -> bool {
        let wanted = value::canonical(name);
        let snapshot: Vec<Arc<Client>> =
            self.clients.iter().map(|c| Arc::clone(&c)).collect();
        for client in snapshot {
            if client.id == exclude {
                continue;
            }
            let state = client.state.read().await;
            if state.name_set
                && state
                    .name
                    .as_ref()
                    .is_some_and(|name| value::canonical(name) == wanted)
            {
                return true;
            }
        }
        false
    }

    /// Signal every session to exit; used during graceful shutdown.
    pub fn shutdown_all(&self) {
        for entry in self.clients.iter() {
            entry.value().close();
        }
    }

    // ========================================================================
    // Room registry
    // ========================================================================

    /// Get or create a room. Idempotent; creating "default" returns the
    /// pinned default room.
    pub fn create_room(&self, name: &str) -> Arc<Room> {
        if let Some(room) = self.rooms.get(name) {
            return Arc::clone(&room);
        }
        let room = self
            .rooms
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(room = %name, "room created");
                Arc::new(Room::new(name))
            });
        Arc::clone(&room)
    }

    pub fn get_room(&self, name: &str) -> Option<Arc<Room>> {
        self.rooms.get(name).map(|r| Arc::clone(&r))
    }

    pub fn all_rooms(&self) -> Vec<Arc<Room>> {
        self.rooms.iter().map(|r| Arc::clone(&r)).collect()
    }

    /// Remove a room from the registry. Destroying "default" is forbidden
    /// and ignored.
    pub fn destroy_room(&self, name: &str) {
        if name == DEFAULT_ROOM {
            return;
        }
        if self.rooms.remove(name).is_some() {
            debug!(room = %name, "room destroyed");
        }
    }

    /// Destroy a room that has just become empty. The emptiness check runs
    /// under the room lock, which is released before touching the hub map.
    pub async fn reap_room(&self, room: &Arc<Room>) {
        if room.is_default() {
            return;
        }
        if room.is_empty().await {
            self.destroy_room(room.name());
        }
    }

    // ========================================================================
    // Fan-out
    // ========================================================================

    /// Enqueue a packet on one client's writer queue.
    pub fn unicast(&self, client: &Client, packet: Outgoing) {
        client.send(packet);
    }

    /// Enqueue a packet on each client's queue, skipping exclusions.
    pub fn multicast(&self, clients: &[Arc<Client>], packet: Outgoing, exclusions: &[ClientId]) {
        for client in clients {
            if exclusions.contains(&client.id) {
                continue;
            }
            client.send(packet.clone());
        }
    }

    /// Broadcast to a room's current membership (snapshot taken under the
    /// room lock, released before enqueuing).
    pub async fn broadcast_to_room(
        &self,
        room: &Room,
        packet: Outgoing,
        exclusions: &[ClientId],
    ) {
        let members = room.clients().await;
        self.multicast(&members, packet, exclusions);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_hub() -> Arc<Hub> {
        Hub::new(HubConfig::default())
    }

    fn attach_client(hub: &Hub) -> (Arc<Client>, mpsc::UnboundedReceiver<Outgoing>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = hub.create_client("127.0.0.1:0".parse().unwrap(), tx);
        (client, rx)
    }

    #[tokio::test]
    async fn default_room_always_exists() {
        let hub = test_hub();
        assert!(hub.get_room(DEFAULT_ROOM).is_some());

        hub.destroy_room(DEFAULT_ROOM);
        assert!(hub.get_room(DEFAULT_ROOM).is_some());
    }

    #[tokio::test]
    async fn create_room_is_idempotent() {
        let hub = test_hub();
        let first = hub.create_room("lobby");
        let second = hub.create_room("lobby");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn empty_rooms_are_reaped_on_leave() {
        let hub = test_hub();
        let (client, _rx) = attach_client(&hub);

        let room = hub.create_room("lobby");
        client.join_room(&room).await;
        assert!(hub.get_room("lobby").is_some());

        client.leave_room(&hub, &room).await;
        assert!(hub.get_room("lobby").is_none());
    }

    #[tokio::test]
    async fn membership_edges_stay_in_sync() {
        let hub = test_hub();
        let (client, _rx) = attach_client(&hub);
        let room = hub.create_room("lobby");

        client.join_room(&room).await;
        assert!(client.state.read().await.rooms.contains_key("lobby"));
        assert_eq!(room.clients().await.len(), 1);

        hub.destroy_client(&client).await;
        assert!(client.state.read().await.rooms.is_empty());
        assert!(hub.get_room("lobby").is_none());
    }

    #[tokio::test]
    async fn find_client_by_id_name_and_uuid() {
        let hub = test_hub();
        let (client, _rx) = attach_client(&hub);
        client.set_name(json!("alice")).await;

        let by_id = hub.find_client(&json!(client.id.0)).await.unwrap();
        assert_eq!(by_id.id, client.id);

        let by_id_string = hub
            .find_client(&json!(client.id.to_string()))
            .await
            .unwrap();
        assert_eq!(by_id_string.id, client.id);

        let by_name = hub.find_client(&json!("alice")).await.unwrap();
        assert_eq!(by_name.id, client.id);

        let by_uuid = hub
            .find_client(&json!(client.uuid.to_string()))
            .await
            .unwrap();
        assert_eq!(by_uuid.id, client.id);

        assert!(hub.find_client(&json!("nobody")).await.is_none());
    }

    #[tokio::test]
    async fn username_uniqueness_is_canonical() {
        let hub = test_hub();
        let (alice, _rx_a) = attach_client(&hub);
        alice.set_name(json!("5")).await;
        let (bob, _rx_b) = attach_client(&hub);

        assert!(hub.is_username_taken(&json!(5), bob.id).await);
        assert!(!hub.is_username_taken(&json!(5), alice.id).await);
        assert!(!hub.is_username_taken(&json!("six"), bob.id).await);
    }

    #[tokio::test]
    async fn multicast_skips_exclusions() {
        let hub = test_hub();
        let (a, mut rx_a) = attach_client(&hub);
        let (b, mut rx_b) = attach_client(&hub);

        let room = hub.create_room("lobby");
        a.join_room(&room).await;
        b.join_room(&room).await;

        hub.broadcast_to_room(&room, Outgoing::Text("hi".into()), &[a.id])
            .await;
        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap().encode(), "hi");
    }
}
