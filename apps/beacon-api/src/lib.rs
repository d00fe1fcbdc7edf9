pub mod auth;
pub mod broadcast;
pub mod config;
pub mod db;
pub mod error;
pub mod queue;
pub mod routes;

use std::sync::Arc;

use broadcast::manager::BroadcastManager;
use config::Config;
use db::kv::KeyValueStore;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub kv: Arc<dyn KeyValueStore>,
    pub manager: Arc<BroadcastManager>,
}
