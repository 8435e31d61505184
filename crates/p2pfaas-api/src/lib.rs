//! p2pfaas-api: HTTP surface of a scheduler node.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET, POST | `/function/{function}` | Schedule a function call from a client |
//! | POST | `/peer/function/{function}` | Receive a job forwarded by a peer |
//! | GET | `/monitoring/load` | Current load, as response headers |
//! | GET, POST | `/configuration` | Read / update the admission limits |
//! | GET, POST | `/configuration/scheduler` | Read / replace the active policy |

pub mod configuration;
pub mod function;
pub mod monitoring;
pub mod peer;
pub mod reply;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::routing::{get, post};

use p2pfaas_core::DynamicConfig;
use p2pfaas_scheduler::SchedulerService;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub scheduler: Arc<SchedulerService>,
    /// Last accepted admission limits, as persisted.
    pub dynamic: Arc<Mutex<DynamicConfig>>,
    pub dynamic_config_path: PathBuf,
    pub scheduler_config_path: PathBuf,
}

impl ApiState {
    pub fn new(
        scheduler: Arc<SchedulerService>,
        dynamic: DynamicConfig,
        dynamic_config_path: PathBuf,
        scheduler_config_path: PathBuf,
    ) -> Self {
        Self {
            scheduler,
            dynamic: Arc::new(Mutex::new(dynamic)),
            dynamic_config_path,
            scheduler_config_path,
        }
    }

    pub(crate) fn dynamic(&self) -> DynamicConfig {
        *self.dynamic.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route(
            "/function/{function}",
            get(function::execute_function).post(function::execute_function),
        )
        .route("/peer/function/{function}", post(peer::execute_from_peer))
        .route("/monitoring/load", get(monitoring::load))
        .route(
            "/configuration",
            get(configuration::get_configuration).post(configuration::set_configuration),
        )
        .route(
            "/configuration/scheduler",
            get(configuration::get_scheduler).post(configuration::set_scheduler),
        )
        .with_state(state)
}
