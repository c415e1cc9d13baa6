//! Action executor - runs browser actions with a uniform result contract
//!
//! This crate turns an [`Action`] into work on the current page:
//! - navigate, click, type, hover, select, press, wait, screenshot, waitForSelector and runCode
//! - selector cascade through [`action_locator`] candidates with per-candidate timeouts
//! - retries with linear backoff, best-effort effect verification
//! - an [`OperationEvent`] stream for recorders and the decision loop

pub mod driver;
pub mod errors;
pub mod executor;
mod primitives;
pub mod types;

pub use driver::{CdpPageDriver, CodeOutput, ElementProbe, PageDriver, SelectedOption};
pub use errors::ActionError;
pub use executor::ActionExecutor;
pub use primitives::{screenshot_path, ExecCtx, PointerOp, PrimitiveOutcome};
pub use types::*;
