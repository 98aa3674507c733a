//! Persistence Collaborator client.
//!
//! The engine talks to the backend through the [`Persistence`] trait so tests
//! can substitute an in-memory double. [`HttpPersistence`] is the real
//! implementation: a thin reqwest wrapper over the REST surface, every call
//! carrying the bearer credential.
//!
//! All of these calls are fire-and-forget from the engine's perspective:
//! local optimistic state is authoritative, and a failure is either logged
//! (side channels) or folded into the message's `failed` status (sends).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiError;
use crate::models::{Contact, Message};

#[async_trait]
pub trait Persistence: Send + Sync {
    async fn store_message(&self, message: &Message) -> Result<(), ApiError>;
    async fn store_reaction(&self, message_id: &str, emoji: &str) -> Result<(), ApiError>;
    async fn delete_message(&self, message_id: &str) -> Result<(), ApiError>;
    async fn forward_message(
        &self,
        original_message_id: &str,
        contact_id: &str,
        message: &Message,
    ) -> Result<(), ApiError>;
    async fn block_contact(&self, contact_id: &str) -> Result<(), ApiError>;
    async fn archive_contact(&self, contact_id: &str) -> Result<(), ApiError>;
    async fn unarchive_contact(&self, contact_id: &str) -> Result<(), ApiError>;
    async fn mark_read(&self, contact_id: &str) -> Result<(), ApiError>;
    async fn fetch_contacts(&self) -> Result<Vec<Contact>, ApiError>;
}

/// Acknowledgement envelope used by the mock backend.
#[derive(Debug, Deserialize)]
struct ApiAck {
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContactsResponse {
    contacts: Vec<Contact>,
}

pub struct HttpPersistence {
    client: reqwest::Client,
    base_url: String,
    auth_token: String,
}

impl HttpPersistence {
    pub fn new(base_url: &str, auth_token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: auth_token.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(&self, response: reqwest::Response) -> Result<(), ApiError> {
        let ack: ApiAck = response.error_for_status()?.json().await?;
        if ack.success {
            Ok(())
        } else {
            Err(ApiError::Rejected(
                ack.error.unwrap_or_else(|| "unspecified error".to_string()),
            ))
        }
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.auth_token)
            .json(&body)
            .send()
            .await?;
        self.check(response).await
    }

    async fn post_empty(&self, path: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.auth_token)
            .send()
            .await?;
        self.check(response).await
    }
}

#[async_trait]
impl Persistence for HttpPersistence {
    async fn store_message(&self, message: &Message) -> Result<(), ApiError> {
        self.post("/messages", json!({ "message": message })).await
    }

    async fn store_reaction(&self, message_id: &str, emoji: &str) -> Result<(), ApiError> {
        self.post(
            "/messages/react",
            json!({ "message_id": message_id, "reaction": emoji }),
        )
        .await
    }

    async fn delete_message(&self, message_id: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .delete(self.url(&format!("/messages/{message_id}")))
            .bearer_auth(&self.auth_token)
            .send()
            .await?;
        self.check(response).await
    }

    async fn forward_message(
        &self,
        original_message_id: &str,
        contact_id: &str,
        message: &Message,
    ) -> Result<(), ApiError> {
        self.post(
            "/messages/forward",
            json!({
                "original_message_id": original_message_id,
                "contact_id": contact_id,
                "message": message,
            }),
        )
        .await
    }

    async fn block_contact(&self, contact_id: &str) -> Result<(), ApiError> {
        self.post_empty(&format!("/contacts/{contact_id}/block")).await
    }

    async fn archive_contact(&self, contact_id: &str) -> Result<(), ApiError> {
        self.post_empty(&format!("/contacts/{contact_id}/archive")).await
    }

    async fn unarchive_contact(&self, contact_id: &str) -> Result<(), ApiError> {
        self.post_empty(&format!("/contacts/{contact_id}/unarchive")).await
    }

    async fn mark_read(&self, contact_id: &str) -> Result<(), ApiError> {
        self.post_empty(&format!("/contacts/{contact_id}/read")).await
    }

    async fn fetch_contacts(&self) -> Result<Vec<Contact>, ApiError> {
        let response = self
            .client
            .get(self.url("/contacts"))
            .bearer_auth(&self.auth_token)
            .send()
            .await?
            .error_for_status()?;
        let body: ContactsResponse = response.json().await?;
        Ok(body.contacts)
    }
}
