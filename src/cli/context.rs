use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use action_primitives::ActionExecutor;
use anyhow::{Context, Result};
use cdp_adapter::BrowserConnection;
use perceiver_structural::StateObserver;

use crate::config::PilotConfig;

pub struct CliContext {
    config: Arc<PilotConfig>,
    config_path: Option<PathBuf>,
}

impl CliContext {
    pub fn new(config: PilotConfig, config_path: Option<PathBuf>) -> Self {
        Self {
            config: Arc::new(config),
            config_path,
        }
    }

    pub fn config(&self) -> &PilotConfig {
        self.config.as_ref()
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// A connection manager for the configured endpoint, not yet connected.
    pub fn connection(&self) -> Arc<BrowserConnection> {
        Arc::new(BrowserConnection::chromium(self.config.connection.clone()))
    }

    /// Connect to the configured endpoint.
    pub async fn connect(&self) -> Result<Arc<BrowserConnection>> {
        let connection = self.connection();
        connection
            .connect(None)
            .await
            .with_context(|| {
                format!(
                    "Failed to connect to {}; start the browser with --remote-debugging-port",
                    self.config.connection.endpoint
                )
            })?;
        Ok(connection)
    }

    pub fn executor(&self, connection: &Arc<BrowserConnection>) -> Arc<ActionExecutor> {
        Arc::new(ActionExecutor::for_connection(
            connection.clone(),
            self.config.executor.clone(),
        ))
    }

    pub fn observer(&self, connection: &Arc<BrowserConnection>) -> Arc<StateObserver> {
        Arc::new(StateObserver::for_host(
            connection.clone(),
            self.config.observer.clone(),
        ))
    }
}
