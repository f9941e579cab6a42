//! Rooms: named client groups with shared broadcast state.
//!
//! A room carries a global message slot and a keyed map of global
//! variables, both replayed to newcomers. The room's lock covers its
//! member map and both state slots; broadcast paths snapshot the members
//! under the lock and enqueue after releasing it.

use crate::state::Client;
use cloudlink_proto::{value, ClientId, UserObject};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// The room every client lands in on handshake; it exists for the life of
/// the hub and is never destroyed.
pub const DEFAULT_ROOM: &str = "default";

struct RoomState {
    clients: HashMap<ClientId, Arc<Client>>,
    gmsg: Value,
    gvars: HashMap<String, Value>,
}

/// A named client group. Only the hub creates and destroys rooms; clients
/// join and leave through [`Client::join_room`] / [`Client::leave_room`].
pub struct Room {
    name: String,
    state: Mutex<RoomState>,
}

impl Room {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(RoomState {
                clients: HashMap::new(),
                gmsg: Value::String(String::new()),
                gvars: HashMap::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_ROOM
    }

    pub(crate) async fn insert(&self, client: Arc<Client>) {
        self.state.lock().await.clients.insert(client.id, client);
    }

    pub(crate) async fn remove(&self, id: ClientId) {
        self.state.lock().await.clients.remove(&id);
    }

    pub(crate) async fn is_empty(&self) -> bool {
        self.state.lock().await.clients.is_empty()
    }

    /// Snapshot of the current members.
    pub async fn clients(&self) -> Vec<Arc<Client>> {
        self.state.lock().await.clients.values().cloned().collect()
    }

    /// Current global message value.
    pub async fn gmsg(&self) -> Value {
        self.state.lock().await.gmsg.clone()
    }

    pub async fn set_gmsg(&self, val: Value) {
        self.state.lock().await.gmsg = val;
    }

    /// Snapshot of all global variables.
    pub async fn gvars(&self) -> Vec<(String, Value)> {
        self.state
            .lock()
            .await
            .gvars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub async fn set_gvar(&self, name: String, val: Value) {
        self.state.lock().await.gvars.insert(name, val);
    }

    pub async fn delete_gvar(&self, name: &str) {
        self.state.lock().await.gvars.remove(name);
    }

    /// Move a variable's value to a new name. Returns false if the old
    /// name did not exist.
    pub async fn rename_gvar(&self, old: &str, new: String) -> bool {
        let mut state = self.state.lock().await;
        match state.gvars.remove(old) {
            Some(val) => {
                state.gvars.insert(new, val);
                true
            }
            None => false,
        }
    }

    /// Userlist in the CL3 string form: canonical names, each terminated
    /// with `;`. Unnamed clients are skipped.
    pub async fn userlist_string(&self) -> String {
        let mut out = String::new();
        for client in self.clients().await {
            let state = client.state.read().await;
            if let (true, Some(name)) = (state.name_set, &state.name) {
                out.push_str(&value::canonical(name));
                out.push(';');
            }
        }
        out
    }

    /// Userlist as a list of JSON-quoted name strings (CL4 v0.1.8/v0.1.9).
    pub async fn userlist_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for client in self.clients().await {
            let state = client.state.read().await;
            if let (true, Some(name)) = (state.name_set, &state.name) {
                names.push(name.to_string());
            }
        }
        names
    }

    /// Userlist as UserObjects (CL4 v0.2.0).
    pub async fn user_objects(&self) -> Vec<UserObject> {
        let mut users = Vec::new();
        for client in self.clients().await {
            if client.state.read().await.name_set {
                users.push(client.user_object().await);
            }
        }
        users
    }

    /// Find a member whose username canonically equals `username`.
    pub async fn find_client_by_username(&self, username: &str) -> Option<Arc<Client>> {
        for client in self.clients().await {
            let state = client.state.read().await;
            if state.name_set
                && state
                    .name
                    .as_ref()
                    .is_some_and(|name| value::canonical(name) == username)
            {
                drop(state);
                return Some(client);
            }
        }
        None
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room").field("name", &self.name).finish()
    }
}
