//! cssbuild common library
//!
//! Configuration, error types, output-mode selection, fixture syntax helpers
//! and the structural CSS comparator used by the end-to-end harness.

pub mod config;
pub mod css;
pub mod error;
pub mod mode;
pub mod syntax;

pub use config::{HarnessConfig, SandboxMode, TimeoutConfig};
pub use css::{compare_css, includes_css, CssReport, RuleMatch, Stylesheet};
pub use error::{Error, Result};
pub use mode::OutputMode;

/// Harness version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
