use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{handlers, middleware};

pub fn build_router(app_state: AppState) -> Router {
    let internal_routes = Router::new()
        .route(
            "/api/gate/evaluate",
            post(handlers::gate::evaluate_gate_handler),
        )
        .route(
            "/api/admission/cycle",
            post(handlers::admission::run_admission_cycle_handler),
        )
        .route_layer(from_fn_with_state(
            app_state.clone(),
            middleware::require_shared_secret,
        ));

    Router::new()
        .route("/health", get(handlers::health::health_handler))
        .merge(internal_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
