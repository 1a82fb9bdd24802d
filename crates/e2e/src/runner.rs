//! Main test runner that schedules suites across workers

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use preserve_common::api::ApiContext;
use preserve_common::config::HarnessConfig;

use crate::error::{E2eError, E2eResult};
use crate::playwright::{Driver, PlaywrightConfig, PlaywrightDriver};
use crate::scenario::{Scenario, ScenarioContext};
use crate::scenarios;
use crate::suite::{Suite, SuiteEntry};

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub scenario: String,
    pub suite: String,
    pub worker: usize,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
    /// Resources teardown failed to remove
    #[serde(default)]
    pub teardown_failures: usize,
    #[serde(default)]
    pub metrics: BTreeMap<String, Value>,
}

/// Result of running all selected scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

/// Selects which suite entries run
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub tag: Option<String>,
    pub name: Option<String>,
}

/// Builds each worker's browser driver
pub type DriverFactory = Arc<dyn Fn() -> E2eResult<Arc<dyn Driver>> + Send + Sync>;

/// Configuration for the test runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub harness: HarnessConfig,
    pub suites_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Overrides suite and harness worker counts
    pub workers: Option<usize>,
    /// Poll `GET /health` before scheduling anything
    pub health_check: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            harness: HarnessConfig::default(),
            suites_dir: PathBuf::from("suites"),
            output_dir: PathBuf::from("test-results"),
            workers: None,
            health_check: true,
        }
    }
}

struct Job {
    index: usize,
    suite: String,
    entry: SuiteEntry,
    scenario: Arc<dyn Scenario>,
}

/// Main E2E test runner
pub struct TestRunner {
    config: RunnerConfig,
    registry: Vec<Arc<dyn Scenario>>,
    driver_factory: DriverFactory,
}

impl TestRunner {
    /// Create a test runner with the built-in scenarios and Playwright
    pub fn with_config(config: RunnerConfig) -> Self {
        let playwright = PlaywrightConfig::from(&config.harness.ui);
        let driver_factory: DriverFactory = Arc::new(move || {
            let driver: Arc<dyn Driver> = Arc::new(PlaywrightDriver::new(playwright.clone())?);
            Ok(driver)
        });
        Self {
            config,
            registry: scenarios::builtin(),
            driver_factory,
        }
    }

    /// Replace the scenario registry
    pub fn with_scenarios(mut self, registry: Vec<Arc<dyn Scenario>>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_driver_factory(mut self, factory: DriverFactory) -> Self {
        self.driver_factory = factory;
        self
    }

    /// Run all suites in the suites directory
    pub async fn run_all(&self) -> E2eResult<TestSuiteResult> {
        let suites = Suite::load_all(&self.config.suites_dir)?;
        self.run_suites(&suites, &Filter::default()).await
    }

    /// Run entries matching a tag
    pub async fn run_tagged(&self, tag: &str) -> E2eResult<TestSuiteResult> {
        let suites = Suite::load_all(&self.config.suites_dir)?;
        let filter = Filter {
            tag: Some(tag.to_string()),
            ..Default::default()
        };
        self.run_suites(&suites, &filter).await
    }

    /// Run a specific entry by name
    pub async fn run_test(&self, name: &str) -> E2eResult<TestSuiteResult> {
        let suites = Suite::load_all(&self.config.suites_dir)?;
        let filter = Filter {
            name: Some(name.to_string()),
            ..Default::default()
        };
        let result = self.run_suites(&suites, &filter).await?;
        if result.total == 0 {
            return Err(E2eError::UnknownScenario(name.to_string()));
        }
        Ok(result)
    }

    /// Wait for the API to report healthy
    pub async fn check_health(&self) -> E2eResult<()> {
        let harness = &self.config.harness;
        let api = ApiContext::new(harness)?;
        info!("Waiting for {} to become healthy", harness.api.base_url);
        api.wait_until_healthy(&harness.polling.policy()?).await?;
        Ok(())
    }

    /// Resolve suite entries against the registry, applying the filter.
    ///
    /// Returns the jobs to run and how many entries were filtered out.
    fn plan(&self, suites: &[Suite], filter: &Filter) -> E2eResult<(Vec<Job>, usize)> {
        let mut jobs = Vec::new();
        let mut skipped = 0;

        for suite in suites {
            for entry in &suite.scenarios {
                let scenario = scenarios::find(&self.registry, &entry.scenario)?;
                self.check_entry_timeout(suite, entry, scenario.long_running())?;
                let tag_match = filter.tag.as_deref().map_or(true, |tag| {
                    suite.entry_tags(entry).any(|t| t == tag) || scenario.tags().contains(&tag)
                });
                let name_match = filter
                    .name
                    .as_deref()
                    .map_or(true, |name| entry.display_name() == name || entry.scenario == name);

                if tag_match && name_match {
                    jobs.push(Job {
                        index: jobs.len(),
                        suite: suite.name.clone(),
                        entry: entry.clone(),
                        scenario,
                    });
                } else {
                    skipped += 1;
                }
            }
        }
        Ok((jobs, skipped))
    }

    /// An entry's timeout override must still exceed the poll timeout its
    /// scenario waits under
    fn check_entry_timeout(&self, suite: &Suite, entry: &SuiteEntry, long_running: bool) -> E2eResult<()> {
        let Some(secs) = entry.timeout_secs else {
            return Ok(());
        };
        let polling = &self.config.harness.polling;
        let (key, poll_ms) = if long_running {
            ("polling.import_timeout_ms", polling.import_timeout_ms)
        } else {
            ("polling.timeout_ms", polling.timeout_ms)
        };
        if Duration::from_secs(secs) <= Duration::from_millis(poll_ms) {
            return Err(E2eError::SuiteParse(format!(
                "{}/{}: timeout_secs {} must exceed {} ({} ms)",
                suite.name,
                entry.display_name(),
                secs,
                key,
                poll_ms
            )));
        }
        Ok(())
    }

    fn worker_count(&self, suites: &[Suite], jobs: usize) -> usize {
        let requested = self
            .config
            .workers
            .or_else(|| suites.iter().filter_map(|s| s.workers).max())
            .unwrap_or(self.config.harness.scenarios.workers);
        requested.clamp(1, jobs.max(1))
    }

    /// Run a set of suites
    pub async fn run_suites(&self, suites: &[Suite], filter: &Filter) -> E2eResult<TestSuiteResult> {
        let start = Instant::now();
        self.config.harness.validate()?;

        let (jobs, skipped) = self.plan(suites, filter)?;
        let total = jobs.len();
        let workers = if total == 0 { 0 } else { self.worker_count(suites, total) };

        if self.config.health_check && total > 0 {
            self.check_health().await?;
        }

        info!("Running {} scenario(s) on {} worker(s)...", total, workers);

        let queue = Arc::new(Mutex::new(VecDeque::from(jobs)));
        let mut set = JoinSet::new();
        for worker in 0..workers {
            let driver = (self.driver_factory)()?;
            let ctx = ScenarioContext::new(self.config.harness.clone(), driver)?;
            let queue = Arc::clone(&queue);
            set.spawn(run_worker(worker, ctx, queue));
        }

        let mut results: Vec<(usize, TestResult)> = Vec::with_capacity(total);
        while let Some(joined) = set.join_next().await {
            results.extend(joined?);
        }
        results.sort_by_key(|(index, _)| *index);
        let results: Vec<TestResult> = results.into_iter().map(|(_, r)| r).collect();

        let passed = results.iter().filter(|r| r.success).count();
        let failed = results.len() - passed;
        let duration_ms = start.elapsed().as_millis() as u64;

        info!("");
        info!(
            "Test Results: {} passed, {} failed, {} skipped ({} ms)",
            passed, failed, skipped, duration_ms
        );

        Ok(TestSuiteResult {
            total,
            passed,
            failed,
            skipped,
            duration_ms,
            results,
        })
    }

    /// Write test results to JSON file
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

/// Drain the shared queue with one context; scenarios on a worker run one
/// at a time, in queue order
async fn run_worker(
    worker: usize,
    ctx: ScenarioContext,
    queue: Arc<Mutex<VecDeque<Job>>>,
) -> Vec<(usize, TestResult)> {
    let mut results = Vec::new();
    loop {
        let next = queue.lock().pop_front();
        let Some(job) = next else { break };
        let result = run_job(worker, &ctx, &job).await;
        results.push((job.index, result));
    }
    debug!("Worker {} finished", worker);
    results
}

async fn run_job(worker: usize, ctx: &ScenarioContext, job: &Job) -> TestResult {
    let name = job.entry.display_name().to_string();
    let budget = job
        .entry
        .timeout_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| ctx.config.scenarios.timeout(job.scenario.long_running()));

    debug!("[worker {}] running {} (budget {:?})", worker, name, budget);
    let start = Instant::now();
    let outcome = match tokio::time::timeout(budget, job.scenario.run(ctx, &job.entry.params)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(E2eError::ScenarioTimeout {
            name: name.clone(),
            seconds: budget.as_secs(),
        }),
    };

    // Teardown runs whatever the outcome, including after a timeout
    let teardown_failures = ctx.teardown().await;
    if teardown_failures > 0 {
        warn!("{} left {} resource(s) behind", name, teardown_failures);
    }
    let duration_ms = start.elapsed().as_millis() as u64;

    let error = match outcome {
        Ok(()) => {
            info!("✓ {} ({} ms)", name, duration_ms);
            None
        }
        Err(e) => {
            error!("✗ {} - {}", name, e);
            Some(e.to_string())
        }
    };

    TestResult {
        name,
        scenario: job.scenario.name().to_string(),
        suite: job.suite.clone(),
        worker,
        success: error.is_none(),
        duration_ms,
        error,
        teardown_failures,
        metrics: ctx.take_metrics(),
    }
}
