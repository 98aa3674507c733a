//! The message delivery engine.
//!
//! Owns the message lifecycle state machine, applies optimistic local
//! updates, and reconciles them against asynchronous acknowledgements. Every
//! mutation goes through the store's single critical section; every network
//! interaction runs on a spawned task so no operation blocks its caller.

pub mod scheduler;

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::api::Persistence;
use crate::error::{ApiError, EngineError};
use crate::models::input::{ForwardMessageInput, ReactInput, SendMessageInput, ValidateExt};
use crate::models::{Contact, Message, MessageStatus};
use crate::store::ChatStore;

use scheduler::ProgressionTimers;

pub struct DeliveryEngine {
    store: Arc<ChatStore>,
    persistence: Arc<dyn Persistence>,
    timers: Arc<ProgressionTimers>,
}

impl DeliveryEngine {
    pub fn new(persistence: Arc<dyn Persistence>) -> Self {
        Self {
            store: Arc::new(ChatStore::new()),
            persistence,
            timers: Arc::new(ProgressionTimers::new()),
        }
    }

    /// Read access to the underlying store (snapshots for rendering).
    pub fn store(&self) -> &Arc<ChatStore> {
        &self.store
    }

    /// Fetch the contact list from the backend and seed the store with it.
    pub async fn load_contacts(&self) -> Result<usize, EngineError> {
        let contacts = self.persistence.fetch_contacts().await?;
        let count = contacts.len();
        self.store.seed_contacts(contacts);
        Ok(count)
    }

    // ── Sending ─────────────────────────────────────────────────────────

    /// Send a message to the active contact.
    ///
    /// Returns `Ok(None)` without touching any state when there is nothing
    /// to send (empty content and no attachments) or no contact is selected.
    /// Otherwise the message is appended optimistically in `sending` and
    /// submission continues on a background task: success advances it to
    /// `sent` and schedules the simulated `delivered`/`read` progression,
    /// failure parks it in terminal `failed` until an explicit [`resend`].
    ///
    /// [`resend`]: DeliveryEngine::resend
    pub fn send(&self, input: SendMessageInput) -> Result<Option<Message>, EngineError> {
        input.validate_input()?;

        let Some(active) = self.store.active_contact() else {
            debug!("send ignored: no active contact");
            return Ok(None);
        };
        if input.content.trim().is_empty() && input.attachments.is_empty() {
            debug!("send ignored: empty content and no attachments");
            return Ok(None);
        }

        let content = if input.content.is_empty() {
            None
        } else {
            Some(input.content)
        };
        let msg = Message::outgoing(&active.id, content, input.kind, input.reply_to, input.attachments);
        self.store.append_outgoing(&msg);
        self.submit(msg.clone(), None);
        Ok(Some(msg))
    }

    /// Retry a failed message as a brand-new send: fresh id and timestamp,
    /// original content, kind, reply snapshot, and attachments.
    ///
    /// Returns `Ok(None)` when the message is not in the `failed` state.
    pub fn resend(&self, message_id: &str) -> Result<Option<Message>, EngineError> {
        let original = self
            .store
            .message(message_id)
            .ok_or_else(|| EngineError::UnknownMessage(message_id.to_string()))?;
        if original.status != MessageStatus::Failed {
            return Ok(None);
        }

        let msg = Message::outgoing(
            &original.receiver_id,
            original.content.clone(),
            original.kind,
            original.reply_to.clone(),
            original.attachments.clone(),
        );
        self.store.append_outgoing(&msg);
        self.submit(msg.clone(), None);
        Ok(Some(msg))
    }

    /// Submit a message to the backend and drive its status from the result.
    /// `forwarded_from` selects the forward endpoint over the plain one.
    fn submit(&self, message: Message, forwarded_from: Option<String>) {
        let store = self.store.clone();
        let api = self.persistence.clone();
        let timers = self.timers.clone();

        tokio::spawn(async move {
            let result = match &forwarded_from {
                Some(original_id) => {
                    api.forward_message(original_id, &message.receiver_id, &message).await
                }
                None => api.store_message(&message).await,
            };

            match result {
                Ok(()) => {
                    match store.apply_status(&message.id, MessageStatus::Sent) {
                        // Deleted or already reconciled past `sent`; either
                        // way the progression is pointless or already running.
                        Ok(false) | Err(_) => return,
                        Ok(true) => {}
                    }
                    timers.schedule_progression(store, &message.id);
                }
                Err(e) => {
                    warn!(message_id = %message.id, error = %e, "message submission failed");
                    let _ = store.apply_status(&message.id, MessageStatus::Failed);
                }
            }
        });
    }

    // ── Inbound reconciliation ──────────────────────────────────────────

    /// Record a message that arrived over the transport.
    ///
    /// Returns false for duplicates (already-known id).
    pub fn receive(&self, message: Message) -> bool {
        self.store.record_incoming(message)
    }

    /// Apply a status update pushed by the backend.
    ///
    /// The newer event wins: the store's guard drops anything equal-or-older
    /// than the current status, and once the message reaches a terminal
    /// state its locally scheduled transitions are cancelled.
    pub fn apply_status_update(
        &self,
        message_id: &str,
        status: MessageStatus,
    ) -> Result<bool, EngineError> {
        let applied = self.store.apply_status(message_id, status)?;
        if applied && status.is_terminal() {
            self.timers.cancel(message_id);
        }
        Ok(applied)
    }

    // ── Message operations ──────────────────────────────────────────────

    /// Set or replace a reaction. Repeating the identical call is a no-op.
    pub fn react(&self, input: ReactInput) -> Result<(), EngineError> {
        input.validate_input()?;
        self.store.react(&input.message_id, &input.emoji, &input.user_id)?;

        let api = self.persistence.clone();
        let (id, emoji) = (input.message_id, input.emoji);
        self.side_channel("react", async move { api.store_reaction(&id, &emoji).await });
        Ok(())
    }

    /// Tombstone a message and stop any pending progression for it.
    pub fn delete(&self, message_id: &str) -> Result<(), EngineError> {
        self.store.tombstone(message_id)?;
        self.timers.cancel(message_id);

        let api = self.persistence.clone();
        let id = message_id.to_string();
        self.side_channel("delete", async move { api.delete_message(&id).await });
        Ok(())
    }

    /// Forward a message to each target contact.
    ///
    /// Every copy gets a fresh id and timestamp, is flagged as forwarded,
    /// and goes through the same submit-and-progress path as a normal send.
    /// Unknown targets are skipped with a warning.
    pub fn forward(&self, input: ForwardMessageInput) -> Result<Vec<Message>, EngineError> {
        input.validate_input()?;
        let source = self
            .store
            .message(&input.message_id)
            .ok_or_else(|| EngineError::UnknownMessage(input.message_id.clone()))?;

        let mut forwarded = Vec::new();
        for target in &input.contact_ids {
            if self.store.contact(target).is_none() {
                warn!(contact_id = %target, "forward target unknown, skipping");
                continue;
            }
            let msg = Message::forwarded(&source, target);
            self.store.append_outgoing(&msg);
            self.submit(msg.clone(), Some(source.id.clone()));
            forwarded.push(msg);
        }
        Ok(forwarded)
    }

    // ── Contact operations ──────────────────────────────────────────────

    /// Make a contact active, marking its conversation read and resetting
    /// its unread count.
    pub fn select_contact(&self, contact_id: &str) -> Result<Contact, EngineError> {
        let contact = self.store.select_contact(contact_id)?;

        let api = self.persistence.clone();
        let id = contact_id.to_string();
        self.side_channel("mark_read", async move { api.mark_read(&id).await });
        Ok(contact)
    }

    pub fn block(&self, contact_id: &str) -> Result<(), EngineError> {
        self.store.set_blocked(contact_id, true)?;

        let api = self.persistence.clone();
        let id = contact_id.to_string();
        self.side_channel("block", async move { api.block_contact(&id).await });
        Ok(())
    }

    pub fn archive(&self, contact_id: &str) -> Result<(), EngineError> {
        self.store.archive(contact_id)?;

        let api = self.persistence.clone();
        let id = contact_id.to_string();
        self.side_channel("archive", async move { api.archive_contact(&id).await });
        Ok(())
    }

    pub fn unarchive(&self, contact_id: &str) -> Result<(), EngineError> {
        self.store.unarchive(contact_id)?;

        let api = self.persistence.clone();
        let id = contact_id.to_string();
        self.side_channel("unarchive", async move { api.unarchive_contact(&id).await });
        Ok(())
    }

    /// Run a side-channel API call in the background. Failures are logged
    /// and the optimistic local state stands; there is no rollback.
    fn side_channel<F>(&self, operation: &'static str, fut: F)
    where
        F: Future<Output = Result<(), ApiError>> + Send + 'static,
    {
        tokio::spawn(async move {
            if let Err(e) = fut.await {
                warn!(operation, error = %e, "side-channel request failed");
            }
        });
    }
}
