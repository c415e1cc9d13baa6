use anyhow::Result;

use super::commands::Commands;
use super::context::CliContext;
use super::env::CliArgs;
use super::{cmd_observe, cmd_resolve, cmd_run, cmd_status};

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Run(args) => cmd_run(args, ctx, cli.output).await,
        Commands::Status(args) => cmd_status(args, ctx, cli.output).await,
        Commands::Resolve(args) => cmd_resolve(args, cli.output),
        Commands::Observe(args) => cmd_observe(args, ctx, cli.output).await,
    }
}
