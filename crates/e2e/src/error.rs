//! Error types for E2E testing

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Playwright not found. Install with: npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Suite file parse error: {0}")]
    SuiteParse(String),

    #[error("Step failed: {step} - {reason}")]
    StepFailed { step: String, reason: String },

    /// A page action's terminal signal never appeared
    #[error("Step {step} ({action}) timed out waiting for {target}")]
    LocatorTimeout {
        step: usize,
        action: String,
        target: String,
    },

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Scenario {name} exceeded its {seconds}s budget")]
    ScenarioTimeout { name: String, seconds: u64 },

    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),

    #[error("Invalid scenario parameter {name}: {reason}")]
    InvalidParam { name: String, reason: String },

    #[error(transparent)]
    Harness(#[from] preserve_common::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type E2eResult<T> = Result<T, E2eError>;
