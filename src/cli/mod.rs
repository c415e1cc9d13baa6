pub mod app;
pub mod commands;
pub mod context;
pub mod dispatch;
pub mod env;
pub mod observe;
pub mod output;
pub mod resolve;
pub mod run;
pub mod runtime;
pub mod status;

pub use observe::{cmd_observe, ObserveArgs};
pub use resolve::{cmd_resolve, ResolveArgs};
pub use run::{cmd_run, RunArgs};
pub use status::{cmd_status, StatusArgs};
