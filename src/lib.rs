pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;

use std::sync::Arc;

use crate::services::attempt_service::AttemptService;
use crate::services::grading_service::MatchPolicy;
use crate::store::{AttemptStore, TestCatalog};

#[derive(Clone)]
pub struct AppState {
    pub attempt_service: AttemptService,
}

impl AppState {
    pub fn new(
        catalog: Arc<dyn TestCatalog>,
        store: Arc<dyn AttemptStore>,
        match_policy: MatchPolicy,
    ) -> Self {
        Self {
            attempt_service: AttemptService::new(catalog, store, match_policy),
        }
    }
}
