use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tokio::fs;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::PilotConfig;

pub fn init_logging(level: &str, debug: bool, json: bool) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
    Ok(())
}

pub struct LoadedConfig {
    pub config: PilotConfig,
    /// `None` when no file was found and defaults are in use.
    pub path: Option<PathBuf>,
}

/// Files tried when `--config` is not given, in priority order.
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("config/tabpilot.yaml")];
    if let Some(mut dir) = dirs::config_dir() {
        dir.push("tabpilot");
        dir.push("config.yaml");
        paths.push(dir);
    }
    paths
}

pub async fn load_config(config_path: Option<&PathBuf>) -> Result<LoadedConfig> {
    let path = match config_path {
        Some(path) => {
            if !path.exists() {
                bail!("Config file not found: {}", path.display());
            }
            Some(path.clone())
        }
        None => default_config_paths().into_iter().find(|path| path.exists()),
    };

    match path {
        Some(path) => {
            let config = read_config(&path).await?;
            Ok(LoadedConfig {
                config,
                path: Some(path),
            })
        }
        None => Ok(LoadedConfig {
            config: PilotConfig::default(),
            path: None,
        }),
    }
}

async fn read_config(path: &Path) -> Result<PilotConfig> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    PilotConfig::from_yaml_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}
