//! Selector resolution for loose target descriptions
//!
//! A target such as `"Submit"`, `"#login-btn"` or `"Email address"` is turned into an
//! ordered list of [`CandidateStrategy`] values:
//! - CSS selector (only when the target looks like one, always first)
//! - Visible text
//! - Test-id attributes
//! - Accessible role and name
//! - Placeholder
//! - Label
//!
//! Resolution is pure; the [`script`] module renders each candidate into a page-side
//! finder that the executor evaluates.

pub mod resolver;
pub mod script;
pub mod types;

pub use resolver::{looks_like_css, resolve, strip_quotes};
pub use script::{element_script, finder_source, locate_expression, probe_script};
pub use types::{CandidateStrategy, StrategyKind};
