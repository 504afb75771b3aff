use axum::Json;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::error::ErrorResponse;
use crate::state::AppState;

pub async fn require_shared_secret(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    match presented {
        Some(token) if secrets_match(token, &state.shared_secret) => next.run(request).await,
        _ => {
            warn!(path = %request.uri().path(), "rejected request without valid shared secret");
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new("valid shared secret required")),
            )
                .into_response()
        }
    }
}

fn secrets_match(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}
