pub mod health;
pub mod metrics_handler;
pub mod query;
pub mod services;

use crate::{backend::Backend, catalog::ServiceCatalog, config::ProcessorConfig, safety::SafetyPolicy};
use std::sync::Arc;

/// Shared state for the authenticated API routes.
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<Backend>,
    pub catalog: Arc<dyn ServiceCatalog>,
    pub policy: Arc<SafetyPolicy>,
    pub processor: ProcessorConfig,
}
