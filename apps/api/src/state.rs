use std::sync::Arc;

use jobguard_application::{OldestWinsGateService, QueueGatedAdmitter};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub gate_service: OldestWinsGateService,
    pub admitter: QueueGatedAdmitter,
    pub shared_secret: Arc<str>,
}
