//! Preserve E2E Test Harness
//!
//! This crate drives the deposit service end to end:
//! - Runs named scenarios from declarative YAML suites on parallel workers
//! - Controls Playwright through generated scripts and a JSON report line
//! - Wraps each UI screen in a page object built from accessible locators
//! - Checks API, object storage and METS state behind every UI action
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    E2E Test Runner (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    ├── check_health()          GET /health until ready      │
//! │    ├── plan(suites, filter) -> [Job]                        │
//! │    ├── worker N: ScenarioContext { api, s3, driver }        │
//! │    │     ├── scenario.run(ctx, params)  under timeout       │
//! │    │     └── ctx.teardown()             always              │
//! │    └── write_results() -> test-results.json                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Suite (YAML)                                               │
//! │    ├── name, description, workers, tags                     │
//! │    └── scenarios: [SuiteEntry]                              │
//! │          └── scenario, name?, tags, timeout_secs?, params   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Page objects  ->  Script  ->  Driver (Playwright | record) │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod load;
pub mod locator;
pub mod pages;
pub mod playwright;
pub mod runner;
pub mod scenario;
pub mod scenarios;
pub mod suite;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{E2eError, E2eResult};
pub use locator::Locator;
pub use playwright::{Driver, PlaywrightDriver, Script};
pub use runner::{RunnerConfig, TestRunner};
pub use scenario::{Scenario, ScenarioContext};
pub use suite::Suite;
