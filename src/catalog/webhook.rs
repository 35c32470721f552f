//! Identity provider lifecycle events.
//!
//! Payloads are expected to be verified before they reach [`WebhookHandler`].
//! Events go through the same mutations as every other caller, so they
//! revalidate exactly what those mutations do.

use serde::Deserialize;

use super::CatalogError;
use super::repository::SubscriptionTier;
use super::subscriptions::SubscriptionService;
use super::users::UserService;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserPayload {
    pub id: Option<String>,
}

/// A user lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    UserCreated(UserPayload),
    UserDeleted(UserPayload),
    /// Any event type not handled here, by name.
    Other(String),
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl LifecycleEvent {
    /// Decode an event from a verified `{"type": "...", "data": {...}}` body.
    pub fn from_json(body: &str) -> Result<Self, CatalogError> {
        let invalid = |e: serde_json::Error| CatalogError::InvalidEvent(e.to_string());
        let raw: RawEvent = serde_json::from_str(body).map_err(invalid)?;

        match raw.kind.as_str() {
            "user.created" => Ok(LifecycleEvent::UserCreated(
                serde_json::from_value(raw.data).map_err(invalid)?,
            )),
            "user.deleted" => Ok(LifecycleEvent::UserDeleted(
                serde_json::from_value(raw.data).map_err(invalid)?,
            )),
            _ => Ok(LifecycleEvent::Other(raw.kind)),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            LifecycleEvent::UserCreated(_) => "user.created",
            LifecycleEvent::UserDeleted(_) => "user.deleted",
            LifecycleEvent::Other(kind) => kind,
        }
    }
}

#[derive(Clone)]
pub struct WebhookHandler {
    subscriptions: SubscriptionService,
    users: UserService,
}

impl WebhookHandler {
    pub fn new(subscriptions: SubscriptionService, users: UserService) -> Self {
        WebhookHandler {
            subscriptions,
            users,
        }
    }

    /// New users get a free subscription. Deleted users lose all their data.
    /// Events without a user id are ignored.
    pub async fn handle_event(&self, event: LifecycleEvent) -> Result<(), CatalogError> {
        let name = event.name().to_string();
        tracing::info!("Webhook event received: type={}", name);

        match event {
            LifecycleEvent::UserCreated(UserPayload { id: Some(id) }) => {
                self.subscriptions
                    .create_user_subscription(&id, SubscriptionTier::Free)
                    .await?;
            }
            LifecycleEvent::UserDeleted(UserPayload { id: Some(id) }) => {
                self.users.delete_user(&id).await?;
            }
            LifecycleEvent::UserCreated(_) | LifecycleEvent::UserDeleted(_) => {
                tracing::debug!("Ignoring webhook event without user id: type={}", name);
            }
            LifecycleEvent::Other(_) => {}
        }

        Ok(())
    }
}
