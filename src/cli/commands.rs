use clap::Subcommand;

use super::observe::ObserveArgs;
use super::resolve::ResolveArgs;
use super::run::RunArgs;
use super::status::StatusArgs;

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Carry out a natural-language instruction in the connected browser
    Run(RunArgs),

    /// Connect to the browser and report the connection state
    Status(StatusArgs),

    /// Show the candidate strategies for a target description (offline)
    Resolve(ResolveArgs),

    /// Capture one observation of the current page
    Observe(ObserveArgs),
}
