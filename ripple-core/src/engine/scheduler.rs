//! Cancellable status-progression timers.
//!
//! After a successful submit the engine schedules the simulated `delivered`
//! and `read` acknowledgements. A production backend would push these over
//! the transport instead; the timers exist to mimic that, so they must lose
//! to any real update that arrives first. Two mechanisms guarantee that:
//! every firing funnels through the store's monotonicity guard (a stale
//! timer can never regress state), and the engine cancels the handles
//! outright when a message is deleted or reaches a terminal status.
//!
//! Tests drive these with `tokio::time::pause`, so nothing here depends on
//! wall-clock sleeping.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::models::MessageStatus;
use crate::store::ChatStore;

/// Delay before a submitted message is considered delivered by the peer.
pub const DELIVERED_DELAY: Duration = Duration::from_secs(1);
/// Delay before a submitted message is considered read by the peer.
pub const READ_DELAY: Duration = Duration::from_secs(2);

#[derive(Default)]
pub struct ProgressionTimers {
    pending: Mutex<HashMap<String, Vec<JoinHandle<()>>>>,
}

impl ProgressionTimers {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<JoinHandle<()>>>> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Schedule the `delivered` and `read` transitions for a message.
    pub fn schedule_progression(&self, store: Arc<ChatStore>, message_id: &str) {
        self.schedule(store.clone(), message_id, MessageStatus::Delivered, DELIVERED_DELAY);
        self.schedule(store, message_id, MessageStatus::Read, READ_DELAY);
    }

    fn schedule(
        &self,
        store: Arc<ChatStore>,
        message_id: &str,
        status: MessageStatus,
        delay: Duration,
    ) {
        let id = message_id.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match store.apply_status(&id, status) {
                Ok(true) => {
                    debug!(message_id = %id, ?status, "scheduled status transition applied")
                }
                // Superseded by a real update, or the message is gone.
                Ok(false) | Err(_) => {}
            }
        });
        self.lock().entry(message_id.to_string()).or_default().push(handle);
    }

    /// Abort every pending transition for one message.
    pub fn cancel(&self, message_id: &str) {
        if let Some(handles) = self.lock().remove(message_id) {
            for handle in handles {
                handle.abort();
            }
        }
    }

    /// Abort everything, e.g. on engine teardown.
    pub fn cancel_all(&self) {
        for (_, handles) in self.lock().drain() {
            for handle in handles {
                handle.abort();
            }
        }
    }
}

impl Drop for ProgressionTimers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
