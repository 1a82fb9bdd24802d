//! Polling helpers for eventually-consistent backend state
//!
//! The system under test has no push channel for job completion, so every
//! wait in the harness is a blocking poll: observe, compare, sleep, repeat
//! until a match or the policy timeout.

use async_trait::async_trait;
use regex::Regex;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Fixed-interval retry policy with an overall timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    interval: Duration,
    timeout: Duration,
}

impl PollPolicy {
    /// Create a policy. Fails if `interval` is zero or exceeds `timeout`.
    pub fn new(interval: Duration, timeout: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(Error::InvalidConfig("poll interval must be positive".to_string()));
        }
        if timeout < interval {
            return Err(Error::InvalidConfig(format!(
                "poll timeout {:?} is shorter than interval {:?}",
                timeout, interval
            )));
        }
        Ok(Self { interval, timeout })
    }

    pub fn from_millis(interval_ms: u64, timeout_ms: u64) -> Result<Self> {
        Self::new(
            Duration::from_millis(interval_ms),
            Duration::from_millis(timeout_ms),
        )
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Matches an observed status value
#[derive(Debug, Clone)]
pub enum StatusMatcher {
    /// Whole-value equality
    Exact(String),
    /// Regular expression anchored to the whole value
    Pattern(Regex),
}

impl StatusMatcher {
    pub fn exact(status: impl Into<String>) -> Self {
        StatusMatcher::Exact(status.into())
    }

    /// Compile a pattern. `completed.*` accepts `completedWithErrors`.
    pub fn pattern(pattern: &str) -> Result<Self> {
        let anchored = format!("^(?:{})$", pattern);
        Regex::new(&anchored)
            .map(StatusMatcher::Pattern)
            .map_err(|e| Error::InvalidConfig(format!("bad status pattern '{}': {}", pattern, e)))
    }

    pub fn matches(&self, status: &str) -> bool {
        match self {
            StatusMatcher::Exact(expected) => expected == status,
            StatusMatcher::Pattern(re) => re.is_match(status),
        }
    }
}

impl fmt::Display for StatusMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusMatcher::Exact(s) => write!(f, "'{}'", s),
            StatusMatcher::Pattern(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

/// One observation of a polled resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// The resource does not exist yet
    Missing,
    Status(String),
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observation::Missing => write!(f, "<missing>"),
            Observation::Status(s) => write!(f, "{}", s),
        }
    }
}

/// Something whose status can be observed repeatedly
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Human readable name, used in timeout errors
    fn describe(&self) -> String;

    async fn observe(&self) -> Result<Observation>;
}

/// Result of a single attempt in [`poll_until`]
#[derive(Debug)]
pub enum Attempt<T> {
    Ready(T),
    /// Not done yet; carries the observed value for diagnostics
    Pending(String),
}

/// Successful completion of [`wait_for_status`]
#[derive(Debug, Clone)]
pub struct PollOutcome {
    pub status: String,
    pub attempts: usize,
    pub elapsed: Duration,
}

/// Call `attempt` until it reports ready or the policy times out.
///
/// Transient errors (see [`Error::is_transient`]) are recorded as the
/// last observation and polling continues; any other error aborts at once.
pub async fn poll_until<T, F, Fut>(what: &str, policy: &PollPolicy, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Attempt<T>>>,
{
    let start = Instant::now();
    let mut attempts = 0usize;
    let mut last_observed = String::from("<none>");

    loop {
        attempts += 1;
        match attempt().await {
            Ok(Attempt::Ready(value)) => {
                debug!("{} ready after {} attempt(s) in {:?}", what, attempts, start.elapsed());
                return Ok(value);
            }
            Ok(Attempt::Pending(observed)) => {
                debug!("{} not ready (attempt {}): {}", what, attempts, observed);
                last_observed = observed;
            }
            Err(e) if e.is_transient() => {
                warn!("{} transient error (attempt {}): {}", what, attempts, e);
                last_observed = format!("error: {}", e);
            }
            Err(e) => return Err(e),
        }

        let elapsed = start.elapsed();
        if elapsed >= policy.timeout() {
            return Err(Error::Timeout {
                what: what.to_string(),
                elapsed_ms: elapsed.as_millis() as u64,
                last_observed,
            });
        }
        sleep(policy.interval().min(policy.timeout() - elapsed)).await;
    }
}

/// Poll `source` until its status satisfies `matcher`.
pub async fn wait_for_status(
    source: &dyn StatusSource,
    matcher: &StatusMatcher,
    policy: &PollPolicy,
) -> Result<PollOutcome> {
    let what = format!("{} to match {}", source.describe(), matcher);
    let start = Instant::now();
    let mut attempts = 0usize;

    let status = poll_until(&what, policy, || {
        attempts += 1;
        async move {
            match source.observe().await? {
                Observation::Status(status) if matcher.matches(&status) => Ok(Attempt::Ready(status)),
                other => Ok(Attempt::Pending(other.to_string())),
            }
        }
    })
    .await?;

    Ok(PollOutcome {
        status,
        attempts,
        elapsed: start.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_rejects_zero_interval() {
        assert!(PollPolicy::from_millis(0, 1000).is_err());
    }

    #[test]
    fn test_policy_rejects_timeout_below_interval() {
        assert!(PollPolicy::from_millis(2000, 1000).is_err());
        assert!(PollPolicy::from_millis(1000, 1000).is_ok());
    }

    #[test]
    fn test_pattern_vs_exact() {
        let exact = StatusMatcher::exact("completed");
        let pattern = StatusMatcher::pattern("completed.*").unwrap();

        assert!(!exact.matches("completedWithErrors"));
        assert!(pattern.matches("completedWithErrors"));
        assert!(pattern.matches("completed"));
        assert!(exact.matches("completed"));
    }

    #[test]
    fn test_pattern_is_anchored() {
        let pattern = StatusMatcher::pattern("completed").unwrap();
        assert!(!pattern.matches("notcompleted"));
        assert!(!pattern.matches("completedWithErrors"));
    }

    #[test]
    fn test_bad_pattern() {
        assert!(matches!(
            StatusMatcher::pattern("completed("),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_aborts_immediately() {
        let policy = PollPolicy::from_millis(1000, 60_000).unwrap();
        let start = Instant::now();
        let mut calls = 0;

        let result: Result<()> = poll_until("job", &policy, || {
            calls += 1;
            async { Err(Error::Auth("revoked".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(Error::Auth(_))));
        assert_eq!(calls, 1);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_keeps_polling() {
        let policy = PollPolicy::from_millis(1000, 60_000).unwrap();
        let mut calls = 0;

        let value = poll_until("job", &policy, || {
            calls += 1;
            let n = calls;
            async move {
                if n < 3 {
                    Err(Error::NotFound("job".to_string()))
                } else {
                    Ok(Attempt::Ready(n))
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_reports_last_observation() {
        let policy = PollPolicy::from_millis(1000, 5000).unwrap();

        let err = poll_until::<(), _, _>("deposit lock", &policy, || async {
            Ok(Attempt::Pending("locked".to_string()))
        })
        .await
        .unwrap_err();

        match err {
            Error::Timeout { what, last_observed, elapsed_ms } => {
                assert_eq!(what, "deposit lock");
                assert_eq!(last_observed, "locked");
                assert!((5000..6000).contains(&elapsed_ms), "elapsed {}", elapsed_ms);
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
