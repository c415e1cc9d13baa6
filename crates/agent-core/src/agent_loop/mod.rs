//! Decision loop (observe-think-act) execution.
//!
//! ```text
//! while !done && iterations < max:
//!     observation = observe()
//!     decision   = provider.decide(instruction, observation, history)
//!     result     = execute(decision)
//! ```
//!
//! - [`DecisionLoopConfig`]: limits and timings
//! - [`DecisionLoop`]: the state machine
//! - [`LoopStatus`] / [`LoopOutcome`]: the status stream and the final report

pub mod config;
pub mod controller;
pub mod ports;
pub mod prompt;
pub mod types;

pub use config::DecisionLoopConfig;
pub use controller::DecisionLoop;
pub use ports::{ActionRunner, PageObserver};
pub use prompt::{format_system_prompt, format_user_message};
pub use types::{LoopOutcome, LoopPhase, LoopStatus};
