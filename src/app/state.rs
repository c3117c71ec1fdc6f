//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::store::GroceryStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub groceries: GroceryStore,
}

impl AppState {
    pub fn new(config: Config, groceries: GroceryStore) -> Self {
        Self {
            config: Arc::new(config),
            groceries,
        }
    }
}
