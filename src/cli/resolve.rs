use action_locator::{locate_expression, looks_like_css, resolve, CandidateStrategy};
use anyhow::{bail, Result};
use clap::Args;
use serde::Serialize;

use super::output::{emit, OutputFormat};

#[derive(Args, Clone, Debug)]
pub struct ResolveArgs {
    /// Target description, e.g. "Sign in", "#login" or "搜索"
    pub target: String,

    /// Print the page-side locate expression for each candidate
    #[arg(long)]
    pub script: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResolveReport {
    target: String,
    looks_like_css: bool,
    candidates: Vec<CandidateRow>,
}

#[derive(Serialize)]
struct CandidateRow {
    #[serde(flatten)]
    candidate: CandidateStrategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    script: Option<String>,
}

pub fn cmd_resolve(args: ResolveArgs, output: OutputFormat) -> Result<()> {
    let report = build_report(&args)?;
    emit(output, &report, || {
        println!(
            "{} candidate(s) for {:?}{}",
            report.candidates.len(),
            report.target,
            if report.looks_like_css { " (CSS first)" } else { "" }
        );
        for (index, row) in report.candidates.iter().enumerate() {
            println!(
                "{:>2}. {:<12} {}",
                index + 1,
                row.candidate.kind.name(),
                row.candidate.expression
            );
            if let Some(script) = &row.script {
                println!("      {script}");
            }
        }
    })
}

fn build_report(args: &ResolveArgs) -> Result<ResolveReport> {
    let target = args.target.trim();
    if target.is_empty() {
        bail!("target description is empty");
    }
    let candidates = resolve(target)
        .into_iter()
        .map(|candidate| CandidateRow {
            script: args.script.then(|| locate_expression(&candidate)),
            candidate,
        })
        .collect();
    Ok(ResolveReport {
        target: target.to_string(),
        looks_like_css: looks_like_css(target),
        candidates,
    })
}
