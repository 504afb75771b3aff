use serde::{Deserialize, Serialize};

/// Health response payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Gate evaluation request payload.
#[derive(Debug, Deserialize)]
pub struct EvaluateGateRequest {
    pub job_id: String,
    pub current_identity: String,
}
