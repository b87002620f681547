use std::sync::Arc;

use crate::services::GiftPipeline;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<GiftPipeline>,
}

impl AppState {
    pub fn new(pipeline: GiftPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}
