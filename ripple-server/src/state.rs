use std::sync::{Mutex, MutexGuard};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::info;

use ripple_core::{Contact, Message, MessageStatus};

/// Server state: connected clients plus the in-memory message and contact
/// stores behind the REST surface.
///
/// This is the "database" of the mock backend. Nothing survives a restart;
/// `seed_contacts` initializes and the stores reset with the process.
pub struct ServerState {
    /// Expected bearer/WebSocket credential. None disables the check.
    auth_token: Option<String>,
    /// connection id -> outbound frame channel
    clients: DashMap<String, mpsc::UnboundedSender<String>>,
    messages: Mutex<Vec<Message>>,
    contacts: Mutex<Vec<Contact>>,
}

impl ServerState {
    pub fn new(auth_token: Option<String>) -> Self {
        Self {
            auth_token: auth_token.filter(|t| !t.is_empty()),
            clients: DashMap::new(),
            messages: Mutex::new(Vec::new()),
            contacts: Mutex::new(Vec::new()),
        }
    }

    fn messages_guard(&self) -> MutexGuard<'_, Vec<Message>> {
        match self.messages.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn contacts_guard(&self) -> MutexGuard<'_, Vec<Contact>> {
        match self.contacts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // ── Authentication ──────────────────────────────────────────────────

    /// Whether `token` is acceptable. When no credential is configured every
    /// caller is accepted (local demo mode).
    pub fn verify_token(&self, token: Option<&str>) -> bool {
        match &self.auth_token {
            None => true,
            Some(expected) => token == Some(expected.as_str()),
        }
    }

    pub fn requires_auth(&self) -> bool {
        self.auth_token.is_some()
    }

    // ── Clients ─────────────────────────────────────────────────────────

    /// Register a new client connection
    pub fn add_client(&self, conn_id: String, tx: mpsc::UnboundedSender<String>) {
        self.clients.insert(conn_id, tx);
    }

    pub fn remove_client(&self, conn_id: &str) {
        self.clients.remove(conn_id);
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Broadcast a frame to all clients except the excluded connection.
    /// Returns the number of clients reached.
    pub fn broadcast(&self, frame: &str, exclude_conn_id: Option<&str>) -> usize {
        let mut reached = 0;
        for entry in self.clients.iter() {
            if Some(entry.key().as_str()) != exclude_conn_id
                && entry.value().send(frame.to_string()).is_ok()
            {
                reached += 1;
            }
        }
        reached
    }

    /// Send a frame to one specific connection.
    pub fn send_to(&self, conn_id: &str, frame: &str) -> bool {
        self.clients
            .get(conn_id)
            .map(|tx| tx.send(frame.to_string()).is_ok())
            .unwrap_or(false)
    }

    // ── Messages ────────────────────────────────────────────────────────

    /// Store a submitted message and acknowledge it as `sent`.
    /// Duplicate ids return the already-stored copy unchanged.
    pub fn store_message(&self, mut msg: Message) -> Message {
        let mut messages = self.messages_guard();
        if let Some(existing) = messages.iter().find(|m| m.id == msg.id) {
            return existing.clone();
        }
        msg.status = MessageStatus::Sent;
        messages.push(msg.clone());
        info!(message_id = %msg.id, "stored message");
        msg
    }

    /// Set or replace `user_id`'s reaction. False when the id is unknown.
    pub fn apply_reaction(&self, message_id: &str, emoji: &str, user_id: &str) -> bool {
        let mut messages = self.messages_guard();
        match messages.iter_mut().find(|m| m.id == message_id) {
            Some(msg) => {
                msg.apply_reaction(emoji, user_id);
                true
            }
            None => false,
        }
    }

    /// Tombstone a message, keeping its position. False when unknown.
    pub fn delete_message(&self, message_id: &str) -> bool {
        let mut messages = self.messages_guard();
        match messages.iter_mut().find(|m| m.id == message_id) {
            Some(msg) => {
                msg.tombstone();
                true
            }
            None => false,
        }
    }

    pub fn message(&self, id: &str) -> Option<Message> {
        self.messages_guard().iter().find(|m| m.id == id).cloned()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages_guard().clone()
    }

    // ── Contacts ────────────────────────────────────────────────────────

    pub fn seed_contacts(&self, contacts: Vec<Contact>) {
        *self.contacts_guard() = contacts;
    }

    pub fn contacts(&self) -> Vec<Contact> {
        self.contacts_guard().clone()
    }

    pub fn set_blocked(&self, contact_id: &str) -> bool {
        let mut contacts = self.contacts_guard();
        match contacts.iter_mut().find(|c| c.id == contact_id) {
            Some(contact) => {
                contact.is_blocked = true;
                true
            }
            None => false,
        }
    }

    pub fn set_archived(&self, contact_id: &str, archived: bool) -> bool {
        let mut contacts = self.contacts_guard();
        match contacts.iter_mut().find(|c| c.id == contact_id) {
            Some(contact) => {
                contact.is_archived = archived;
                true
            }
            None => false,
        }
    }

    /// Mark the conversation with a contact read: its messages advance to
    /// `read` (monotonic, never regressing) and its unread count resets.
    pub fn mark_read(&self, contact_id: &str) -> bool {
        let mut contacts = self.contacts_guard();
        let Some(contact) = contacts.iter_mut().find(|c| c.id == contact_id) else {
            return false;
        };
        contact.unread_count = 0;

        let mut messages = self.messages_guard();
        for msg in messages.iter_mut() {
            if msg.sender_id == contact_id && msg.status.can_advance_to(MessageStatus::Read) {
                msg.status = MessageStatus::Read;
            }
        }
        true
    }
}
