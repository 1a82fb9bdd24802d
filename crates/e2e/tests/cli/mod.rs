//! Command-line arguments of the e2e test binary

#![allow(dead_code)]

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "preserve-e2e")]
#[command(about = "E2E and load-test runner for the preservation platform")]
pub struct Args {
    /// Actually run against the configured services
    #[arg(long, env = "PRESERVE_E2E")]
    pub run: bool,

    /// Harness configuration file (TOML)
    #[arg(short, long, env = "PRESERVE_E2E_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path to suite directory
    #[arg(short, long, default_value = "crates/e2e/suites")]
    pub suites: PathBuf,

    /// Run a single suite file instead of the whole directory
    #[arg(long)]
    pub suite: Option<PathBuf>,

    /// Run only entries matching this tag
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Run only a specific entry by name
    #[arg(short, long)]
    pub name: Option<String>,

    /// Number of parallel workers
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Skip the API health gate
    #[arg(long)]
    pub skip_health_check: bool,

    /// Log as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Output directory for results
    #[arg(short, long, default_value = "test-results")]
    pub output: PathBuf,

    /// Test-name filters and libtest flags that `cargo test` forwards to
    /// every test binary; accepted and ignored
    #[arg(hide = true, trailing_var_arg = true, allow_hyphen_values = true, num_args = 0..)]
    pub libtest: Vec<String>,
}
