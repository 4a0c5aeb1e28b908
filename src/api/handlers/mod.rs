pub mod job;
pub mod submit;

use std::sync::Arc;

use crate::services::{JobManager, QueryService};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub query_service: Arc<QueryService>,
}

impl AppState {
    pub fn new(query_service: Arc<QueryService>) -> Self {
        Self { query_service }
    }

    pub fn jobs(&self) -> &Arc<JobManager> {
        self.query_service.jobs()
    }
}
