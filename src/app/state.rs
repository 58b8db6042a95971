//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::catalog::Catalog;
use crate::game::SessionHandle;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub catalog: Arc<Catalog>,
    pub session: SessionHandle,
}

impl AppState {
    pub fn new(config: Config, catalog: Arc<Catalog>, session: SessionHandle) -> Self {
        Self {
            config: Arc::new(config),
            catalog,
            session,
        }
    }
}
