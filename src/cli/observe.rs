use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use perceiver_structural::Observation;
use serde::Serialize;

use super::context::CliContext;
use super::output::{emit, OutputFormat};

#[derive(Args, Clone, Debug)]
pub struct ObserveArgs {
    /// Wait up to this many milliseconds for the page to look loaded first
    #[arg(long, value_name = "MS")]
    pub wait_loaded: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ObserveReport {
    #[serde(flatten)]
    observation: Observation,
    looks_loaded: bool,
}

pub async fn cmd_observe(args: ObserveArgs, ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let connection = ctx.connect().await?;
    let observer = ctx.observer(&connection);

    let result = async {
        if let Some(ms) = args.wait_loaded {
            let loaded = observer
                .wait_for_page_loaded(Duration::from_millis(ms))
                .await
                .context("Failed while waiting for the page to load")?;
            if !loaded {
                tracing::warn!(timeout_ms = ms, "page still loading; capturing anyway");
            }
        }
        let observation = observer.capture().await.context("Failed to capture the page")?;
        let looks_loaded = observer.looks_loaded(&observation);
        Ok::<_, anyhow::Error>(ObserveReport {
            observation,
            looks_loaded,
        })
    }
    .await;
    connection.disconnect().await;
    let report = result?;

    emit(output, &report, || print_observation(&report))
}

fn print_observation(report: &ObserveReport) {
    let observation = &report.observation;
    println!("URL:      {}", observation.url);
    println!("Title:    {}", observation.title);
    println!(
        "Load:     {}{}",
        observation.load_phase.as_str(),
        if report.looks_loaded { " (looks loaded)" } else { "" }
    );
    println!(
        "Elements: {} visible, {} chars of text",
        observation.visible_element_count, observation.text_length
    );
    println!("Hash:     {}", observation.content_hash);
    if observation.has_loading_indicator {
        println!("A loading indicator is visible.");
    }
    if observation.has_modal_overlay {
        println!("A modal overlay is open.");
    }
}
