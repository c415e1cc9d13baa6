use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
    Yaml,
}

/// Print `value` in the machine formats, or run `human` for the default format.
pub fn emit<T, F>(format: OutputFormat, value: &T, human: F) -> Result<()>
where
    T: Serialize,
    F: FnOnce(),
{
    match format {
        OutputFormat::Human => human(),
        OutputFormat::Json => {
            let text = serde_json::to_string_pretty(value).context("Failed to encode JSON")?;
            println!("{text}");
        }
        OutputFormat::Yaml => {
            let text = serde_yaml::to_string(value).context("Failed to encode YAML")?;
            print!("{text}");
        }
    }
    Ok(())
}
