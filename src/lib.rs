//! Tabpilot command-line front end.
//!
//! Exposes the configuration model and CLI modules for integration testing.

pub mod cli;
pub mod config;

pub use config::{LlmSection, LoggingConfig, PilotConfig};
