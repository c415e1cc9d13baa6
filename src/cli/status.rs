use anyhow::Result;
use cdp_adapter::{AdapterMetricsSnapshot, ConnectionStatus, PageEntry};
use clap::Args;
use serde::Serialize;

use super::context::CliContext;
use super::output::{emit, OutputFormat};

#[derive(Args, Clone, Debug)]
pub struct StatusArgs {
    /// List open pages as well
    #[arg(long)]
    pub pages: bool,
}

#[derive(Serialize)]
struct StatusReport {
    status: ConnectionStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pages: Vec<PageEntry>,
    metrics: AdapterMetricsSnapshot,
}

pub async fn cmd_status(args: StatusArgs, ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let connection = ctx.connection();
    let connect_result = connection.connect(None).await;

    let report = StatusReport {
        status: connection.status(),
        pages: if args.pages {
            connection.list_pages()
        } else {
            Vec::new()
        },
        metrics: cdp_adapter::metrics::snapshot(),
    };
    connection.disconnect().await;

    emit(output, &report, || print_status(&report))?;
    connect_result.map_err(|err| {
        anyhow::Error::new(err).context(format!(
            "Browser not reachable at {}",
            ctx.config().connection.endpoint
        ))
    })
}

fn print_status(report: &StatusReport) {
    let status = &report.status;
    let state = serde_json::to_value(status.state)
        .ok()
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_else(|| format!("{:?}", status.state));
    println!("State:    {state}");
    println!(
        "Endpoint: {}",
        status.endpoint.as_deref().unwrap_or("(none)")
    );
    if let Some(url) = &status.current_url {
        println!("Page:     {url}");
    }
    if let Some(error) = &status.last_error {
        println!("Error:    {error}");
    }
    for page in &report.pages {
        let marker = if status.current_target.as_deref() == Some(page.target_id.as_str()) {
            "*"
        } else {
            " "
        };
        println!(" {marker} {} {} ({})", page.target_id, page.url, page.title);
    }
    println!(
        "Commands: {} sent, {} failed",
        report.metrics.commands, report.metrics.command_failures
    );
}
