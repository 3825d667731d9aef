//! End-to-end harness for CSS build-tool integrations
//!
//! Drives a bundler project the way a user would: edit source fixtures, run a
//! one-shot build or a long-running watcher, wait for the generated
//! stylesheet to appear or change, and check that it includes the expected
//! rules.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  SuiteRunner                                                │
//! │    ├── run_all / run_tagged / run_named                     │
//! │    └── per scenario: setup -> run -> teardown               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Integration (one per scenario)                             │
//! │    ├── Sandbox        copied or in-place project            │
//! │    ├── Fixtures       input writes, output reads, restore   │
//! │    ├── ProcessRunner  run() / run_background() -> handle    │
//! │    └── OutputWaiter   creation and change waits             │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod assertions;
pub mod cli;
pub mod error;
pub mod fixture;
pub mod integration;
pub mod process;
pub mod runner;
pub mod sandbox;
pub mod scenarios;
pub mod waiter;

pub use assertions::{assert_css, assert_includes_css};
pub use error::{E2eError, E2eResult};
pub use fixture::Fixtures;
pub use integration::Integration;
pub use process::{CompletionResult, ProcessHandle, ProcessRunner};
pub use runner::{ScenarioResult, SuiteResult, SuiteRunner};
pub use sandbox::Sandbox;
pub use scenarios::Scenario;
pub use waiter::{OutputSnapshot, OutputWaiter};
