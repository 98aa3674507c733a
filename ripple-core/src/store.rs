//! In-memory chat store.
//!
//! One mutex guards the whole interior, so every operation below is a single
//! critical section: UI calls, inbound transport events, and progression
//! timers may race to mutate the same message or contact, and each of them
//! performs one read-modify-write under the monotonicity and idempotence
//! rules. Interleavings therefore converge to the same terminal state.
//!
//! The store owns its lifecycle: `seed_contacts` initializes, `reset` clears
//! everything, which keeps tests independent of each other.

use std::sync::{Mutex, MutexGuard};

use crate::error::EngineError;
use crate::models::{Contact, Message, MessageStatus, SELF_ID};

#[derive(Default)]
struct StoreInner {
    messages: Vec<Message>,
    contacts: Vec<Contact>,
    archived: Vec<Contact>,
    active_contact: Option<String>,
}

impl StoreInner {
    /// Recompute the last-message projection for a contact, wherever it lives.
    fn project(&mut self, contact_id: &str, msg: &Message) {
        let found = self
            .contacts
            .iter_mut()
            .chain(self.archived.iter_mut())
            .find(|c| c.id == contact_id);
        if let Some(contact) = found {
            contact.last_message = Some(msg.preview_text());
            contact.last_message_time = Some(msg.timestamp);
            contact.last_message_status = Some(msg.status);
        }
    }
}

#[derive(Default)]
pub struct ChatStore {
    inner: Mutex<StoreInner>,
}

impl ChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        // A poisoned lock means some thread panicked mid-mutation; recover
        // the data rather than propagating the poison to every caller.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Replace the contact list, e.g. from the initial contacts fetch.
    /// The first contact becomes the active one when none is selected.
    pub fn seed_contacts(&self, contacts: Vec<Contact>) {
        let mut inner = self.lock();
        if inner.active_contact.is_none() {
            inner.active_contact = contacts.first().map(|c| c.id.clone());
        }
        inner.contacts = contacts;
    }

    /// Clear all state. Intended for tests and widget teardown.
    pub fn reset(&self) {
        let mut inner = self.lock();
        *inner = StoreInner::default();
    }

    // ── Messages ────────────────────────────────────────────────────────

    /// Append a locally created outgoing message and reproject its contact.
    pub fn append_outgoing(&self, msg: &Message) {
        let mut inner = self.lock();
        inner.messages.push(msg.clone());
        inner.project(&msg.receiver_id, msg);
    }

    /// Record an inbound message from the transport.
    ///
    /// Returns false (and mutates nothing) when the id is already known.
    /// The sender's unread count bumps unless that sender is the active
    /// contact, in which case the message lands already read.
    pub fn record_incoming(&self, mut msg: Message) -> bool {
        let mut inner = self.lock();
        if inner.messages.iter().any(|m| m.id == msg.id) {
            return false;
        }

        let sender_id = msg.sender_id.clone();
        let is_active = inner.active_contact.as_deref() == Some(sender_id.as_str());
        msg.status = if is_active {
            MessageStatus::Read
        } else {
            MessageStatus::Delivered
        };

        inner.project(&sender_id, &msg);
        inner.messages.push(msg);

        if !is_active {
            // Reborrow so the two field borrows below come from one &mut.
            let inner = &mut *inner;
            let found = inner
                .contacts
                .iter_mut()
                .chain(inner.archived.iter_mut())
                .find(|c| c.id == sender_id);
            if let Some(contact) = found {
                contact.unread_count += 1;
            }
        }
        true
    }

    /// Apply a status transition under the monotonicity guard.
    ///
    /// Returns Ok(true) when applied, Ok(false) when the guard rejected a
    /// regression (or a repeat of the current status).
    pub fn apply_status(&self, id: &str, status: MessageStatus) -> Result<bool, EngineError> {
        let mut inner = self.lock();
        let msg = inner
            .messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| EngineError::UnknownMessage(id.to_string()))?;

        if msg.status == status || !msg.status.can_advance_to(status) {
            return Ok(false);
        }
        msg.status = status;
        Ok(true)
    }

    /// Set or replace `user_id`'s reaction on a message.
    pub fn react(&self, id: &str, emoji: &str, user_id: &str) -> Result<(), EngineError> {
        let mut inner = self.lock();
        let msg = inner
            .messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| EngineError::UnknownMessage(id.to_string()))?;
        msg.apply_reaction(emoji, user_id);
        Ok(())
    }

    /// Tombstone a message: flag it deleted and swap in the placeholder,
    /// keeping id and ordinal position.
    pub fn tombstone(&self, id: &str) -> Result<(), EngineError> {
        let mut inner = self.lock();
        let msg = inner
            .messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| EngineError::UnknownMessage(id.to_string()))?;
        msg.tombstone();
        Ok(())
    }

    pub fn message(&self, id: &str) -> Option<Message> {
        self.lock().messages.iter().find(|m| m.id == id).cloned()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock().messages.clone()
    }

    /// Messages exchanged with one contact, in log order.
    pub fn conversation(&self, contact_id: &str) -> Vec<Message> {
        self.lock()
            .messages
            .iter()
            .filter(|m| {
                (m.sender_id == contact_id && m.receiver_id == SELF_ID)
                    || (m.sender_id == SELF_ID && m.receiver_id == contact_id)
            })
            .cloned()
            .collect()
    }

    // ── Contacts ────────────────────────────────────────────────────────

    pub fn contacts(&self) -> Vec<Contact> {
        self.lock().contacts.clone()
    }

    pub fn archived_contacts(&self) -> Vec<Contact> {
        self.lock().archived.clone()
    }

    pub fn contact(&self, id: &str) -> Option<Contact> {
        let inner = self.lock();
        inner
            .contacts
            .iter()
            .chain(inner.archived.iter())
            .find(|c| c.id == id)
            .cloned()
    }

    pub fn active_contact(&self) -> Option<Contact> {
        let inner = self.lock();
        let id = inner.active_contact.as_deref()?;
        inner.contacts.iter().find(|c| c.id == id).cloned()
    }

    /// Make a contact the active one.
    ///
    /// Inbound messages from that contact advance to `read` (never
    /// regressing one that already got there) and its unread count resets.
    pub fn select_contact(&self, id: &str) -> Result<Contact, EngineError> {
        let mut inner = self.lock();
        let contact = inner
            .contacts
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| EngineError::UnknownContact(id.to_string()))?;
        contact.unread_count = 0;
        let contact = contact.clone();
        inner.active_contact = Some(contact.id.clone());

        for msg in inner.messages.iter_mut() {
            if msg.sender_id == id
                && msg.receiver_id == SELF_ID
                && msg.status.can_advance_to(MessageStatus::Read)
            {
                msg.status = MessageStatus::Read;
            }
        }
        Ok(contact)
    }

    /// Move a contact from the active set to the archive.
    ///
    /// The two collections are disjoint; if the archived contact was the
    /// active one, selection falls back to the first remaining contact.
    pub fn archive(&self, id: &str) -> Result<(), EngineError> {
        let mut inner = self.lock();
        let pos = inner
            .contacts
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| EngineError::UnknownContact(id.to_string()))?;
        let mut contact = inner.contacts.remove(pos);
        contact.is_archived = true;
        inner.archived.push(contact);

        if inner.active_contact.as_deref() == Some(id) {
            inner.active_contact = inner.contacts.first().map(|c| c.id.clone());
        }
        Ok(())
    }

    /// Move a contact from the archive back to the active set.
    pub fn unarchive(&self, id: &str) -> Result<(), EngineError> {
        let mut inner = self.lock();
        let pos = inner
            .archived
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| EngineError::UnknownContact(id.to_string()))?;
        let mut contact = inner.archived.remove(pos);
        contact.is_archived = false;
        inner.contacts.push(contact);
        Ok(())
    }

    pub fn set_blocked(&self, id: &str, blocked: bool) -> Result<(), EngineError> {
        let mut inner = self.lock();
        let inner = &mut *inner;
        let contact = inner
            .contacts
            .iter_mut()
            .chain(inner.archived.iter_mut())
            .find(|c| c.id == id)
            .ok_or_else(|| EngineError::UnknownContact(id.to_string()))?;
        contact.is_blocked = blocked;
        Ok(())
    }
}
