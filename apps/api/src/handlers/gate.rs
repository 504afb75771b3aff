use axum::Json;
use axum::extract::State;
use jobguard_domain::{GateDecision, InstanceId, JobId};

use crate::dto::EvaluateGateRequest;
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn evaluate_gate_handler(
    State(state): State<AppState>,
    Json(payload): Json<EvaluateGateRequest>,
) -> ApiResult<Json<GateDecision>> {
    let job_id = JobId::new(payload.job_id)?;
    let current = InstanceId::new(payload.current_identity)?;

    let decision = state.gate_service.evaluate(&job_id, &current).await?;

    Ok(Json(decision))
}
