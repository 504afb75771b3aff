use std::time::Duration;

use async_trait::async_trait;
use jobguard_application::{AdmissionQueue, AdmissionRequest};
use jobguard_core::AppResult;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;
use uuid::Uuid;

/// Hidden period used when `now + visibility_timeout` is not representable.
const MAX_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(86_400 * 365 * 30);

#[derive(Debug, Clone)]
struct StoredMessage {
    message_id: String,
    payload: String,
    name: Option<String>,
    receipt_handle: Option<String>,
    visible_at: Instant,
}

/// In-memory admission queue with visibility-timeout redelivery.
#[derive(Debug)]
pub struct InMemoryAdmissionQueue {
    visibility_timeout: Duration,
    messages: Mutex<Vec<StoredMessage>>,
}

impl InMemoryAdmissionQueue {
    /// Creates an empty queue; received messages reappear after `visibility_timeout`.
    #[must_use]
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            visibility_timeout,
            messages: Mutex::new(Vec::new()),
        }
    }

    /// Appends one request and returns its message id.
    pub async fn enqueue(&self, payload: impl Into<String>, name: Option<String>) -> String {
        let message_id = Uuid::new_v4().to_string();
        self.messages.lock().await.push(StoredMessage {
            message_id: message_id.clone(),
            payload: payload.into(),
            name,
            receipt_handle: None,
            visible_at: Instant::now(),
        });
        message_id
    }

    /// Returns the number of undeleted messages, visible or not.
    pub async fn len(&self) -> usize {
        self.messages.lock().await.len()
    }

    /// Returns whether every message has been deleted.
    pub async fn is_empty(&self) -> bool {
        self.messages.lock().await.is_empty()
    }
}

#[async_trait]
impl AdmissionQueue for InMemoryAdmissionQueue {
    async fn receive_one(&self) -> AppResult<Option<AdmissionRequest>> {
        let now = Instant::now();
        let mut messages = self.messages.lock().await;

        let Some(message) = messages
            .iter_mut()
            .find(|message| message.visible_at <= now)
        else {
            return Ok(None);
        };

        let receipt_handle = Uuid::new_v4().to_string();
        message.receipt_handle = Some(receipt_handle.clone());
        message.visible_at = now
            .checked_add(self.visibility_timeout)
            .unwrap_or(now + MAX_VISIBILITY_TIMEOUT);

        Ok(Some(AdmissionRequest {
            message_id: message.message_id.clone(),
            payload: message.payload.clone(),
            name: message.name.clone(),
            receipt_handle,
        }))
    }

    async fn delete(&self, request: &AdmissionRequest) -> AppResult<()> {
        let mut messages = self.messages.lock().await;
        let before = messages.len();
        messages.retain(|message| {
            message.receipt_handle.as_deref() != Some(request.receipt_handle.as_str())
        });

        if messages.len() == before {
            warn!(
                message_id = %request.message_id,
                "receipt handle no longer current, message left for redelivery"
            );
        }

        Ok(())
    }
}
