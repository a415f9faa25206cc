use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::{DbPool, OrmConn},
    presence::PresenceHub,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub config: Arc<AppConfig>,
    pub presence: PresenceHub,
}

impl AppState {
    pub fn new(pool: DbPool, orm: OrmConn, config: AppConfig) -> Self {
        Self {
            pool,
            orm,
            config: Arc::new(config),
            presence: PresenceHub::default(),
        }
    }
}
