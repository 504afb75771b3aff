use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use jobguard_core::AppError;
use serde::Serialize;

/// API error payload.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    message: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// HTTP API error wrapper around core application errors.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(value: AppError) -> Self {
        Self(value)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0 {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::DirectoryUnavailable(_)
            | AppError::QueueUnavailable(_)
            | AppError::LauncherUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::EmptyDirectoryResponse(_) => StatusCode::BAD_GATEWAY,
            AppError::SelfNotFound { .. } | AppError::LaunchRejected(_) => StatusCode::CONFLICT,
            AppError::InvariantViolation(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let payload = Json(ErrorResponse::new(self.0.to_string()));

        (status, payload).into_response()
    }
}

/// Standard API result type.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use jobguard_core::AppError;

    use super::ApiError;

    #[test]
    fn transient_failures_map_to_service_unavailable() {
        let response =
            ApiError(AppError::DirectoryUnavailable("throttled".to_owned())).into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn structural_failures_keep_distinct_statuses() {
        let missing_list =
            ApiError(AppError::EmptyDirectoryResponse("no list".to_owned())).into_response();
        let self_not_found = ApiError(AppError::SelfNotFound {
            job_id: "sync".to_owned(),
            identity: "exec-a".to_owned(),
        })
        .into_response();
        let invariant =
            ApiError(AppError::InvariantViolation("mismatch".to_owned())).into_response();

        assert_eq!(missing_list.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(self_not_found.status(), StatusCode::CONFLICT);
        assert_eq!(invariant.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
