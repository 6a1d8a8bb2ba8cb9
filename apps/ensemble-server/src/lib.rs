pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod models;
pub mod routes;

use std::sync::Arc;

use config::Config;
use db::profiles::ProfileStore;
use gateway::channel::Channel;
use gateway::registry::SessionRegistry;
use identity::IdentityResolver;

/// Shared application state available to the gateway and route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub identity: IdentityResolver,
    pub profiles: Arc<dyn ProfileStore>,
    pub channel: Arc<Channel>,
    pub sessions: Arc<SessionRegistry>,
}

impl AppState {
    pub fn new(config: Config, profiles: Arc<dyn ProfileStore>) -> Self {
        Self {
            identity: IdentityResolver::new(config.salt.clone()),
            config: Arc::new(config),
            profiles,
            channel: Arc::new(Channel::default()),
            sessions: Arc::new(SessionRegistry::new()),
        }
    }
}
