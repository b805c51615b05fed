use agentforge_common::{Error, Result};
use agentforge_config::AppConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::router::build_router;
use crate::state::AppState;

/// Binds the configured address and serves the API until Ctrl-C.
pub struct GatewayServer {
    config: AppConfig,
}

impl GatewayServer {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.config.gateway.host, self.config.gateway.port)
    }

    pub async fn run(self) -> Result<()> {
        let addr = self.bind_addr();
        let state = Arc::new(AppState::from_config(self.config)?);
        let app = build_router(state);

        let listener = TcpListener::bind(&addr).await?;
        let local: SocketAddr = listener.local_addr()?;
        info!("agentforge gateway listening on http://{}", local);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Agent(format!("server error: {e}")))?;

        info!("gateway shut down");
        Ok(())
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_addr_uses_gateway_section() {
        let mut config = AppConfig::default();
        config.gateway.host = "0.0.0.0".to_string();
        config.gateway.port = 9001;
        assert_eq!(GatewayServer::new(config).bind_addr(), "0.0.0.0:9001");
    }
}
