use axum::Json;
use axum::extract::State;
use jobguard_application::AdmissionOutcome;

use crate::error::ApiResult;
use crate::state::AppState;

pub async fn run_admission_cycle_handler(
    State(state): State<AppState>,
) -> ApiResult<Json<AdmissionOutcome>> {
    let outcome = state.admitter.run_cycle().await?;

    Ok(Json(outcome))
}
