//! Scenario abstraction and per-worker context

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use preserve_common::api::ApiContext;
use preserve_common::config::HarnessConfig;
use preserve_common::poll::PollPolicy;
use preserve_common::storage::S3Transfer;
use preserve_common::Error;

use crate::error::{E2eError, E2eResult};
use crate::playwright::Driver;
use crate::suite::Params;

/// A named end-to-end flow
#[async_trait]
pub trait Scenario: Send + Sync {
    fn name(&self) -> &'static str;

    fn tags(&self) -> &'static [&'static str] {
        &[]
    }

    /// Whether the extended scenario timeout applies
    fn long_running(&self) -> bool {
        false
    }

    async fn run(&self, ctx: &ScenarioContext, params: &Params) -> E2eResult<()>;
}

/// Something a scenario created and must remove
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    /// Deposit short id
    Deposit(String),
    /// Repository path
    Container(String),
}

/// Everything a scenario may touch, built once per worker.
///
/// Workers never share a context: each has its own token providers, its
/// own driver and its own teardown registry.
pub struct ScenarioContext {
    pub config: HarnessConfig,
    pub api: ApiContext,
    secondary: Option<ApiContext>,
    pub s3: S3Transfer,
    pub driver: Arc<dyn Driver>,
    teardown: Mutex<Vec<Resource>>,
    metrics: Mutex<BTreeMap<String, Value>>,
}

impl ScenarioContext {
    pub fn new(config: HarnessConfig, driver: Arc<dyn Driver>) -> E2eResult<Self> {
        let api = ApiContext::new(&config)?;
        let secondary = match &config.auth.secondary {
            Some(credentials) => Some(ApiContext::for_identity(&config, credentials.clone())?),
            None => None,
        };
        let s3 = S3Transfer::from_config(&config.s3);
        Ok(Self::from_parts(config, api, secondary, s3, driver))
    }

    pub fn from_parts(
        config: HarnessConfig,
        api: ApiContext,
        secondary: Option<ApiContext>,
        s3: S3Transfer,
        driver: Arc<dyn Driver>,
    ) -> Self {
        Self {
            config,
            api,
            secondary,
            s3,
            driver,
            teardown: Mutex::new(Vec::new()),
            metrics: Mutex::new(BTreeMap::new()),
        }
    }

    /// API context of the second identity, for lock contention
    pub fn secondary(&self) -> E2eResult<&ApiContext> {
        self.secondary.as_ref().ok_or_else(|| {
            Error::InvalidConfig("a secondary client identity is required (auth.secondary)".to_string()).into()
        })
    }

    pub fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    pub fn poll_policy(&self) -> E2eResult<PollPolicy> {
        Ok(self.config.polling.policy()?)
    }

    pub fn import_policy(&self) -> E2eResult<PollPolicy> {
        Ok(self.config.polling.import_policy()?)
    }

    /// Create the shared test root container if it does not exist yet
    pub async fn ensure_test_root(&self) -> E2eResult<String> {
        let root = self.config.api.test_root.clone();
        if self.api.try_get_container(&root).await?.is_none() {
            match self.api.create_container(&root, &root).await {
                Ok(_) | Err(Error::Conflict(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(root)
    }

    pub fn register_deposit(&self, id: &str) {
        debug!("Registered deposit {} for teardown", id);
        self.teardown.lock().push(Resource::Deposit(id.to_string()));
    }

    pub fn register_container(&self, path: &str) {
        debug!("Registered container {} for teardown", path);
        self.teardown.lock().push(Resource::Container(path.to_string()));
    }

    /// Drop a container the scenario already removed itself
    pub fn forget_container(&self, path: &str) {
        self.teardown
            .lock()
            .retain(|r| !matches!(r, Resource::Container(p) if p == path));
    }

    pub fn registered(&self) -> Vec<Resource> {
        self.teardown.lock().clone()
    }

    /// Record a value to report with the scenario result
    pub fn record<T: Serialize>(&self, key: &str, value: &T) -> E2eResult<()> {
        self.metrics.lock().insert(key.to_string(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn take_metrics(&self) -> BTreeMap<String, Value> {
        std::mem::take(&mut *self.metrics.lock())
    }

    /// Remove every registered resource, newest first.
    ///
    /// Resources that are already gone are skipped; other failures are
    /// logged and teardown continues with the next resource.
    pub async fn teardown(&self) -> usize {
        let resources: Vec<Resource> = std::mem::take(&mut *self.teardown.lock());
        let mut failures = 0;

        for resource in resources.into_iter().rev() {
            let result = match &resource {
                Resource::Deposit(id) => self.api.delete_deposit(id).await,
                Resource::Container(path) => self.api.delete_container(path).await,
            };
            match result {
                Ok(()) | Err(Error::NotFound(_)) => {}
                Err(e) => {
                    failures += 1;
                    warn!("Teardown of {:?} failed: {}", resource, e);
                }
            }
        }

        if failures == 0 {
            debug!("Teardown complete");
        } else {
            info!("Teardown finished with {} failure(s)", failures);
        }
        failures
    }
}

/// Fail with an assertion error naming expected and actual values
pub fn expect_eq<T: PartialEq + std::fmt::Debug>(what: &str, expected: T, actual: T) -> E2eResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(E2eError::AssertionFailed(format!(
            "{}: expected {:?}, got {:?}",
            what, expected, actual
        )))
    }
}
