//! Delivery engine integration tests.
//!
//! The Persistence Collaborator is replaced with an in-memory double and the
//! tests run on a paused tokio clock, so the scheduled `delivered`/`read`
//! progression can be asserted deterministically without real sleeping.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use ripple_core::api::Persistence;
use ripple_core::error::ApiError;
use ripple_core::models::input::{ForwardMessageInput, ReactInput, SendMessageInput};
use ripple_core::models::{Contact, Message, MessageKind, DELETED_PLACEHOLDER};
use ripple_core::{DeliveryEngine, MessageStatus, SELF_ID};

#[derive(Default)]
struct MockPersistence {
    fail_sends: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl MockPersistence {
    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Persistence for MockPersistence {
    async fn store_message(&self, message: &Message) -> Result<(), ApiError> {
        self.record(format!("store_message:{}", message.id));
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ApiError::Rejected("backend down".to_string()));
        }
        Ok(())
    }

    async fn store_reaction(&self, message_id: &str, emoji: &str) -> Result<(), ApiError> {
        self.record(format!("react:{message_id}:{emoji}"));
        Ok(())
    }

    async fn delete_message(&self, message_id: &str) -> Result<(), ApiError> {
        self.record(format!("delete:{message_id}"));
        Ok(())
    }

    async fn forward_message(
        &self,
        original_message_id: &str,
        contact_id: &str,
        _message: &Message,
    ) -> Result<(), ApiError> {
        self.record(format!("forward:{original_message_id}:{contact_id}"));
        Ok(())
    }

    async fn block_contact(&self, contact_id: &str) -> Result<(), ApiError> {
        self.record(format!("block:{contact_id}"));
        Ok(())
    }

    async fn archive_contact(&self, contact_id: &str) -> Result<(), ApiError> {
        self.record(format!("archive:{contact_id}"));
        Ok(())
    }

    async fn unarchive_contact(&self, contact_id: &str) -> Result<(), ApiError> {
        self.record(format!("unarchive:{contact_id}"));
        Ok(())
    }

    async fn mark_read(&self, contact_id: &str) -> Result<(), ApiError> {
        self.record(format!("mark_read:{contact_id}"));
        Ok(())
    }

    async fn fetch_contacts(&self) -> Result<Vec<Contact>, ApiError> {
        Ok(vec![Contact::new("a", "Alice"), Contact::new("b", "Bob")])
    }
}

fn engine_with_contacts() -> (DeliveryEngine, Arc<MockPersistence>) {
    let api = Arc::new(MockPersistence::default());
    let engine = DeliveryEngine::new(api.clone());
    engine
        .store()
        .seed_contacts(vec![Contact::new("a", "Alice"), Contact::new("b", "Bob")]);
    (engine, api)
}

fn incoming_from(sender: &str, content: &str) -> Message {
    let mut msg = Message::outgoing(SELF_ID, Some(content.into()), MessageKind::Text, None, vec![]);
    msg.sender_id = sender.to_string();
    msg
}

/// Let spawned submit tasks run to completion on the current-thread runtime.
async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn send_is_optimistic_and_reaches_read_without_skipping() {
    let (engine, _api) = engine_with_contacts();

    let msg = engine
        .send(SendMessageInput::text("hi"))
        .unwrap()
        .expect("message should be created");

    // Visible immediately, before any network round trip.
    let log = engine.store().messages();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].status, MessageStatus::Sending);

    settle().await;
    assert_eq!(engine.store().message(&msg.id).unwrap().status, MessageStatus::Sent);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(
        engine.store().message(&msg.id).unwrap().status,
        MessageStatus::Delivered
    );

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(engine.store().message(&msg.id).unwrap().status, MessageStatus::Read);

    // Projection onto the active contact.
    let alice = engine.store().contact("a").unwrap();
    assert_eq!(alice.last_message.as_deref(), Some("hi"));
}

#[tokio::test(start_paused = true)]
async fn empty_send_is_a_noop() {
    let (engine, api) = engine_with_contacts();

    assert!(engine.send(SendMessageInput::text("")).unwrap().is_none());
    assert!(engine.send(SendMessageInput::text("   ")).unwrap().is_none());
    assert!(engine.store().messages().is_empty());

    // No contact selected at all: also a no-op.
    engine.store().reset();
    assert!(engine.send(SendMessageInput::text("hello")).unwrap().is_none());
    assert!(engine.store().messages().is_empty());

    settle().await;
    assert!(api.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn attachments_allow_empty_content() {
    let (engine, _api) = engine_with_contacts();

    let input = SendMessageInput {
        content: String::new(),
        kind: MessageKind::Media,
        reply_to: None,
        attachments: vec!["blob:photo".to_string()],
    };
    let msg = engine.send(input).unwrap().expect("media send should go through");
    assert_eq!(msg.content, None);

    // Empty content projects the kind placeholder.
    let alice = engine.store().contact("a").unwrap();
    assert_eq!(alice.last_message.as_deref(), Some("Media message"));
}

#[tokio::test(start_paused = true)]
async fn failed_submission_is_terminal_until_resend() {
    let (engine, api) = engine_with_contacts();
    api.fail_sends.store(true, std::sync::atomic::Ordering::SeqCst);

    let msg = engine.send(SendMessageInput::text("hi")).unwrap().unwrap();
    settle().await;
    assert_eq!(engine.store().message(&msg.id).unwrap().status, MessageStatus::Failed);

    // Time passing must not resurrect it: no progression was scheduled.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(engine.store().message(&msg.id).unwrap().status, MessageStatus::Failed);

    // Resend is a new send with a fresh id; the failed original stays put.
    api.fail_sends.store(false, std::sync::atomic::Ordering::SeqCst);
    let retry = engine.resend(&msg.id).unwrap().expect("failed message should resend");
    assert_ne!(retry.id, msg.id);
    assert_eq!(retry.content, msg.content);

    settle().await;
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(engine.store().message(&retry.id).unwrap().status, MessageStatus::Read);
    assert_eq!(engine.store().message(&msg.id).unwrap().status, MessageStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn resend_of_non_failed_message_is_a_noop() {
    let (engine, _api) = engine_with_contacts();
    let msg = engine.send(SendMessageInput::text("hi")).unwrap().unwrap();
    settle().await;

    assert!(engine.resend(&msg.id).unwrap().is_none());
    assert_eq!(engine.store().messages().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn real_read_receipt_supersedes_scheduled_progression() {
    let (engine, _api) = engine_with_contacts();
    let msg = engine.send(SendMessageInput::text("hi")).unwrap().unwrap();
    settle().await;
    assert_eq!(engine.store().message(&msg.id).unwrap().status, MessageStatus::Sent);

    // A read receipt arrives over the transport before the timers fire.
    assert!(engine.apply_status_update(&msg.id, MessageStatus::Read).unwrap());

    // Stale timers must not overwrite or regress the newer state.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(engine.store().message(&msg.id).unwrap().status, MessageStatus::Read);

    // Regressions are rejected outright.
    assert!(!engine.apply_status_update(&msg.id, MessageStatus::Delivered).unwrap());
}

#[tokio::test(start_paused = true)]
async fn status_updates_resolve_to_the_maximum() {
    let (engine, _api) = engine_with_contacts();
    let msg = engine.send(SendMessageInput::text("hi")).unwrap().unwrap();
    settle().await;

    for status in [
        MessageStatus::Delivered,
        MessageStatus::Sent,
        MessageStatus::Read,
        MessageStatus::Sent,
        MessageStatus::Delivered,
    ] {
        let _ = engine.apply_status_update(&msg.id, status).unwrap();
    }
    assert_eq!(engine.store().message(&msg.id).unwrap().status, MessageStatus::Read);
}

#[tokio::test(start_paused = true)]
async fn react_twice_keeps_one_reaction_per_user() {
    let (engine, api) = engine_with_contacts();
    let msg = engine.send(SendMessageInput::text("hi")).unwrap().unwrap();

    let react = |emoji: &str| ReactInput {
        message_id: msg.id.clone(),
        emoji: emoji.to_string(),
        user_id: SELF_ID.to_string(),
    };
    engine.react(react("👍")).unwrap();
    engine.react(react("❤️")).unwrap();

    let stored = engine.store().message(&msg.id).unwrap();
    assert_eq!(stored.reactions.len(), 1);
    assert_eq!(stored.reactions[0].emoji, "❤️");
    assert_eq!(stored.reactions[0].user_id, SELF_ID);

    settle().await;
    let calls = api.calls();
    assert!(calls.iter().any(|c| c == &format!("react:{}:👍", msg.id)));
    assert!(calls.iter().any(|c| c == &format!("react:{}:❤️", msg.id)));
}

#[tokio::test(start_paused = true)]
async fn delete_then_forward_carries_the_placeholder() {
    let (engine, _api) = engine_with_contacts();
    let msg = engine.send(SendMessageInput::text("secret")).unwrap().unwrap();
    settle().await;

    engine.delete(&msg.id).unwrap();
    let deleted = engine.store().message(&msg.id).unwrap();
    assert!(deleted.is_deleted);

    let forwarded = engine
        .forward(ForwardMessageInput {
            message_id: msg.id.clone(),
            contact_ids: vec!["b".to_string()],
        })
        .unwrap();
    assert_eq!(forwarded.len(), 1);
    assert_eq!(forwarded[0].content.as_deref(), Some(DELETED_PLACEHOLDER));
    assert_eq!(forwarded[0].receiver_id, "b");
    assert!(forwarded[0].is_forwarded);
    assert_ne!(forwarded[0].id, msg.id);
}

#[tokio::test(start_paused = true)]
async fn forwarded_messages_progress_like_normal_sends() {
    let (engine, api) = engine_with_contacts();
    let msg = engine.send(SendMessageInput::text("share me")).unwrap().unwrap();
    settle().await;

    let forwarded = engine
        .forward(ForwardMessageInput {
            message_id: msg.id.clone(),
            contact_ids: vec!["b".to_string(), "ghost".to_string()],
        })
        .unwrap();
    // Unknown targets are skipped.
    assert_eq!(forwarded.len(), 1);

    settle().await;
    assert_eq!(
        engine.store().message(&forwarded[0].id).unwrap().status,
        MessageStatus::Sent
    );
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(
        engine.store().message(&forwarded[0].id).unwrap().status,
        MessageStatus::Delivered
    );

    // Target contact's projection follows the forwarded copy.
    let bob = engine.store().contact("b").unwrap();
    assert_eq!(bob.last_message.as_deref(), Some("share me"));

    assert!(api
        .calls()
        .iter()
        .any(|c| c == &format!("forward:{}:b", msg.id)));
}

#[tokio::test(start_paused = true)]
async fn delete_cancels_scheduled_progression() {
    let (engine, _api) = engine_with_contacts();
    let msg = engine.send(SendMessageInput::text("hi")).unwrap().unwrap();
    settle().await;
    assert_eq!(engine.store().message(&msg.id).unwrap().status, MessageStatus::Sent);

    engine.delete(&msg.id).unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    // The tombstone keeps whatever status it had when deleted.
    let deleted = engine.store().message(&msg.id).unwrap();
    assert!(deleted.is_deleted);
    assert_eq!(deleted.status, MessageStatus::Sent);
}

#[tokio::test(start_paused = true)]
async fn receive_tracks_unread_and_projection() {
    let (engine, _api) = engine_with_contacts();

    // "a" is active (first seeded contact); "b" is in the background.
    assert!(engine.receive(incoming_from("b", "ping")));
    assert!(engine.receive(incoming_from("b", "ping again")));
    assert!(engine.receive(incoming_from("a", "hello")));

    let contacts = engine.store().contacts();
    let alice = contacts.iter().find(|c| c.id == "a").unwrap();
    let bob = contacts.iter().find(|c| c.id == "b").unwrap();
    assert_eq!(alice.unread_count, 0);
    assert_eq!(bob.unread_count, 2);
    assert_eq!(bob.last_message.as_deref(), Some("ping again"));
}

#[tokio::test(start_paused = true)]
async fn select_contact_resets_unread_and_marks_read() {
    let (engine, api) = engine_with_contacts();
    engine.receive(incoming_from("b", "one"));
    engine.receive(incoming_from("b", "two"));

    let selected = engine.select_contact("b").unwrap();
    assert_eq!(selected.unread_count, 0);
    for msg in engine.store().conversation("b") {
        assert_eq!(msg.status, MessageStatus::Read);
    }

    settle().await;
    assert!(api.calls().iter().any(|c| c == "mark_read:b"));
}

#[tokio::test(start_paused = true)]
async fn archive_and_unarchive_round_trip() {
    let (engine, api) = engine_with_contacts();

    engine.archive("a").unwrap();
    assert!(engine.store().contacts().iter().all(|c| c.id != "a"));
    assert_eq!(engine.store().archived_contacts().len(), 1);
    // Active selection fell back to the remaining contact.
    assert_eq!(engine.store().active_contact().unwrap().id, "b");

    engine.unarchive("a").unwrap();
    assert!(engine.store().archived_contacts().is_empty());
    let restored = engine.store().contact("a").unwrap();
    assert!(!restored.is_archived);

    settle().await;
    let calls = api.calls();
    assert!(calls.iter().any(|c| c == "archive:a"));
    assert!(calls.iter().any(|c| c == "unarchive:a"));
}

#[tokio::test(start_paused = true)]
async fn block_flags_contact_and_notifies_backend() {
    let (engine, api) = engine_with_contacts();

    engine.block("b").unwrap();
    assert!(engine.store().contact("b").unwrap().is_blocked);

    settle().await;
    assert!(api.calls().iter().any(|c| c == "block:b"));
}

#[tokio::test(start_paused = true)]
async fn load_contacts_seeds_the_store() {
    let api = Arc::new(MockPersistence::default());
    let engine = DeliveryEngine::new(api);

    let count = engine.load_contacts().await.unwrap();
    assert_eq!(count, 2);
    assert_eq!(engine.store().contacts().len(), 2);
    // First fetched contact becomes active.
    assert_eq!(engine.store().active_contact().unwrap().id, "a");
}
