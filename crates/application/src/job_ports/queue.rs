use async_trait::async_trait;
use jobguard_core::AppResult;

/// One delivery of a request to start the protected job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionRequest {
    /// Stable message identifier across redeliveries.
    pub message_id: String,
    /// Opaque job input.
    pub payload: String,
    /// Optional launch idempotency name.
    pub name: Option<String>,
    /// Per-delivery handle used to acknowledge the message.
    pub receipt_handle: String,
}

/// Port over the at-least-once admission queue bound to one job.
#[async_trait]
pub trait AdmissionQueue: Send + Sync {
    /// Receives at most one visible message without blocking.
    async fn receive_one(&self) -> AppResult<Option<AdmissionRequest>>;

    /// Removes one received message by its receipt handle.
    async fn delete(&self, request: &AdmissionRequest) -> AppResult<()>;
}
