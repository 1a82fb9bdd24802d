//! Declarative YAML suite files

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{E2eError, E2eResult};

/// A suite of scenarios parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suite {
    /// Unique name for this suite
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Worker count; falls back to the harness configuration
    #[serde(default)]
    pub workers: Option<usize>,

    /// Tags applied to every entry
    #[serde(default)]
    pub tags: Vec<String>,

    /// Scenarios to run
    pub scenarios: Vec<SuiteEntry>,
}

/// One scenario invocation within a suite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteEntry {
    /// Registered scenario name, e.g. `deposit-lock`
    pub scenario: String,

    /// Display name; defaults to the scenario name
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Overrides the configured per-scenario timeout
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub params: Params,
}

impl SuiteEntry {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.scenario)
    }
}

/// Free-form scenario parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, serde_yaml::Value>);

impl Params {
    /// Non-negative integer parameter, or `default` when absent
    pub fn u64_or(&self, name: &str, default: u64) -> E2eResult<u64> {
        match self.0.get(name) {
            None => Ok(default),
            Some(value) => value.as_u64().ok_or_else(|| E2eError::InvalidParam {
                name: name.to_string(),
                reason: format!("expected a non-negative integer, got {:?}", value),
            }),
        }
    }

    pub fn str_or<'a>(&'a self, name: &str, default: &'a str) -> E2eResult<&'a str> {
        match self.0.get(name) {
            None => Ok(default),
            Some(value) => value.as_str().ok_or_else(|| E2eError::InvalidParam {
                name: name.to_string(),
                reason: format!("expected a string, got {:?}", value),
            }),
        }
    }
}

impl Suite {
    /// Parse a suite from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let suite: Suite = serde_yaml::from_str(yaml)?;
        if suite.scenarios.is_empty() {
            return Err(E2eError::SuiteParse(format!("suite '{}' has no scenarios", suite.name)));
        }
        if suite.workers == Some(0) {
            return Err(E2eError::SuiteParse(format!("suite '{}' needs at least one worker", suite.name)));
        }
        Ok(suite)
    }

    /// Parse a suite from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::SuiteParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all suites from a directory, in path order
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut suites = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            suites.push(Self::from_file(entry.path())?);
        }

        Ok(suites)
    }

    /// Tags of an entry, including the suite-wide ones
    pub fn entry_tags<'a>(&'a self, entry: &'a SuiteEntry) -> impl Iterator<Item = &'a str> {
        self.tags.iter().chain(entry.tags.iter()).map(String::as_str)
    }
}
