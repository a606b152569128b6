use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::hub::HubHandle;
use crate::service::ChatService;

/// Shared dependencies handed to the request surface and protocol handler.
#[derive(Clone)]
pub struct AppContext {
    pub service: Arc<ChatService>,
    pub hub: HubHandle,
    pub pool: PgPool,
    pub config: Arc<Config>,
}

impl AppContext {
    pub fn new(
        service: Arc<ChatService>,
        hub: HubHandle,
        pool: PgPool,
        config: Arc<Config>,
    ) -> Self {
        Self {
            service,
            hub,
            pool,
            config,
        }
    }
}
