use agentforge_agents::{AgentService, HttpTransport, RequestBuilder, Route};
use agentforge_common::Result;
use agentforge_config::AppConfig;
use agentforge_db::AgentStore;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared state handed to every request handler.
pub struct AppState {
    pub config: AppConfig,
    pub agents: AgentService,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: AppConfig, agents: AgentService) -> Self {
        Self { config, agents }
    }

    /// Open the configured database and wire the HTTP transport, reading
    /// provider credentials from the process environment.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let store = Arc::new(AgentStore::open(&config.database.path)?);
        let builder = RequestBuilder::from_config(&config.upstream, |key| std::env::var(key).ok());

        for route in [Route::Together, Route::OpenAi] {
            let profile = builder.profile(route);
            if profile.has_credential() {
                info!("{} credential loaded from {}", route.provider_name(), profile.key_env);
            } else {
                warn!(
                    "{} is not set; requests routed to {} will fail",
                    profile.key_env,
                    route.provider_name()
                );
            }
        }

        let agents = AgentService::new(store, builder, Arc::new(HttpTransport::new()));
        Ok(Self::new(config, agents))
    }
}
