//! Harness configuration
//!
//! Configuration is read from an optional TOML file and then overridden from
//! the environment, so CI can inject endpoints and credentials without a file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::poll::PollPolicy;

/// Top-level harness configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Browser-facing UI settings
    pub ui: UiConfig,

    /// Presentation, Storage and IIIF endpoints
    pub api: ApiConfig,

    /// Client-credential settings for the identity provider
    pub auth: AuthConfig,

    /// Object storage backing the deposits
    pub s3: S3Config,

    /// Default poll policies
    pub polling: PollingConfig,

    /// Scenario timeouts and parallelism
    pub scenarios: ScenarioConfig,
}

/// UI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Base URL of the deposit UI
    pub base_url: String,

    /// Playwright storage state holding an authenticated session
    pub storage_state: Option<PathBuf>,

    /// Browser engine (chromium, firefox, webkit)
    pub browser: String,

    pub headless: bool,

    /// How long a page action waits for its terminal signal
    pub action_timeout_ms: u64,

    /// Where failure screenshots are written
    pub screenshot_dir: PathBuf,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            storage_state: None,
            browser: "chromium".to_string(),
            headless: true,
            action_timeout_ms: 30_000,
            screenshot_dir: PathBuf::from("test-results/screenshots"),
        }
    }
}

/// API endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Presentation/Repository API base URL
    pub base_url: String,

    /// Storage API base URL
    pub storage_url: String,

    /// IIIF presentation base URL
    pub iiif_url: String,

    /// Repository container under which tests create their resources
    pub test_root: String,

    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:7000".to_string(),
            storage_url: "http://127.0.0.1:7100".to_string(),
            iiif_url: "http://127.0.0.1:7200/presentation".to_string(),
            test_root: "playwright-testing".to_string(),
            request_timeout_secs: 60,
        }
    }
}

/// A client id/secret pair
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Identity provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Token authority, without the tenant segment
    pub authority: String,

    pub tenant_id: String,

    /// Scope requested for API tokens
    pub scope: String,

    /// Identity used by scenarios
    pub primary: ClientCredentials,

    /// Second identity, used only by lock contention scenarios
    pub secondary: Option<ClientCredentials>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            authority: "https://login.microsoftonline.com".to_string(),
            tenant_id: String::new(),
            scope: String::new(),
            primary: ClientCredentials::default(),
            secondary: None,
        }
    }
}

impl AuthConfig {
    /// Token endpoint for the client-credentials grant
    pub fn token_endpoint(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority.trim_end_matches('/'),
            self.tenant_id
        )
    }
}

/// Object storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    pub region: String,

    /// Custom endpoint (MinIO, LocalStack)
    pub endpoint: Option<String>,

    /// Explicit credentials; ambient credentials are used when unset
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,

    /// Use in-memory buckets instead of S3 (dry runs)
    pub in_memory: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: "eu-west-1".to_string(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            in_memory: false,
        }
    }
}

/// Default poll policies
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_ms: u64,
    pub timeout_ms: u64,

    /// Timeout for import jobs and pipeline runs
    pub import_timeout_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 2_000,
            timeout_ms: 60_000,
            import_timeout_ms: 600_000,
        }
    }
}

impl PollingConfig {
    /// Policy for short waits (METS regeneration, lock state, IIIF)
    pub fn policy(&self) -> Result<PollPolicy> {
        PollPolicy::from_millis(self.interval_ms, self.timeout_ms)
    }

    /// Policy for import jobs
    pub fn import_policy(&self) -> Result<PollPolicy> {
        PollPolicy::from_millis(self.interval_ms, self.import_timeout_ms)
    }
}

/// Scenario execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub timeout_secs: u64,

    /// Timeout for scenarios that wait on imports or large uploads
    pub long_timeout_secs: u64,

    /// Number of parallel workers
    pub workers: usize,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            long_timeout_secs: 1_800,
            workers: 1,
        }
    }
}

impl ScenarioConfig {
    pub fn timeout(&self, long_running: bool) -> Duration {
        if long_running {
            Duration::from_secs(self.long_timeout_secs)
        } else {
            Duration::from_secs(self.timeout_secs)
        }
    }
}

impl HarnessConfig {
    /// Load configuration from an optional TOML file, apply environment
    /// overrides and validate the result.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                info!("Loading harness config from {}", path.display());
                Self::from_file(path)?
            }
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Override fields from `PRESERVE_*`, `S3_*` and `AWS_*` variables
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        let set = |target: &mut String, key: &str| {
            if let Some(value) = var(key) {
                debug!("Config override from {}", key);
                *target = value;
            }
        };

        set(&mut self.ui.base_url, "PRESERVE_UI_URL");
        set(&mut self.api.base_url, "PRESERVE_API_URL");
        set(&mut self.api.storage_url, "PRESERVE_STORAGE_API_URL");
        set(&mut self.api.iiif_url, "PRESERVE_IIIF_URL");
        set(&mut self.api.test_root, "PRESERVE_TEST_ROOT");
        set(&mut self.auth.authority, "PRESERVE_AUTHORITY");
        set(&mut self.auth.tenant_id, "PRESERVE_TENANT_ID");
        set(&mut self.auth.scope, "PRESERVE_SCOPE");
        set(&mut self.auth.primary.client_id, "PRESERVE_CLIENT_ID");
        set(&mut self.auth.primary.client_secret, "PRESERVE_CLIENT_SECRET");
        set(&mut self.s3.region, "S3_REGION");

        if let (Some(client_id), Some(client_secret)) = (
            var("PRESERVE_SECONDARY_CLIENT_ID"),
            var("PRESERVE_SECONDARY_CLIENT_SECRET"),
        ) {
            self.auth.secondary = Some(ClientCredentials {
                client_id,
                client_secret,
            });
        }
        if let Some(path) = var("PRESERVE_STORAGE_STATE") {
            self.ui.storage_state = Some(PathBuf::from(path));
        }
        if let Some(endpoint) = var("S3_ENDPOINT") {
            self.s3.endpoint = Some(endpoint);
        }
        if let Some(key) = var("AWS_ACCESS_KEY_ID") {
            self.s3.access_key_id = Some(key);
        }
        if let Some(secret) = var("AWS_SECRET_ACCESS_KEY") {
            self.s3.secret_access_key = Some(secret);
        }
    }

    /// Check cross-field invariants.
    ///
    /// Poll timeouts must be strictly shorter than the scenario timeout that
    /// encloses them so a failure is attributed to the poll, not the scenario.
    pub fn validate(&self) -> Result<()> {
        let policy = self.polling.policy()?;
        let import_policy = self.polling.import_policy()?;

        if self.scenarios.workers == 0 {
            return Err(Error::InvalidConfig("workers must be at least 1".to_string()));
        }
        if policy.timeout() >= self.scenarios.timeout(false) {
            return Err(Error::InvalidConfig(format!(
                "poll timeout {:?} must be shorter than scenario timeout {:?}",
                policy.timeout(),
                self.scenarios.timeout(false)
            )));
        }
        if import_policy.timeout() >= self.scenarios.timeout(true) {
            return Err(Error::InvalidConfig(format!(
                "import poll timeout {:?} must be shorter than long scenario timeout {:?}",
                import_policy.timeout(),
                self.scenarios.timeout(true)
            )));
        }
        for (name, url) in [
            ("ui.base_url", &self.ui.base_url),
            ("api.base_url", &self.api.base_url),
            ("api.storage_url", &self.api.storage_url),
        ] {
            if url.trim().is_empty() {
                return Err(Error::InvalidConfig(format!("{} must be set", name)));
            }
        }
        Ok(())
    }
}
