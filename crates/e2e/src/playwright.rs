//! Playwright browser automation
//!
//! Page objects describe what to do as a [`Script`]; a [`Driver`] decides how
//! to run it. [`PlaywrightDriver`] renders the script to a Node program and
//! runs it against a fresh browser context, so no page state is carried
//! between scripts.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;
use tokio::process::Command as TokioCommand;
use tracing::{debug, error, info};

use preserve_common::config::UiConfig;

use crate::error::{E2eError, E2eResult};
use crate::locator::{js_string, Locator};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn parse(name: &str) -> Self {
        match name {
            "firefox" => Browser::Firefox,
            "webkit" => Browser::Webkit,
            _ => Browser::Chromium,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

/// A single browser interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    /// Navigate to a path relative to the UI base URL
    Goto { path: String },
    Click { target: Locator },
    Fill { target: Locator, value: String },
    Check { target: Locator },
    SetInputFiles { target: Locator, files: Vec<PathBuf> },
    /// Accept the next confirmation dialog
    AcceptDialog,
    ExpectVisible { target: Locator },
    ExpectHidden { target: Locator },
    ExpectText { target: Locator, text: String },
    /// Capture the element's inner text under `key`
    ReadText { target: Locator, key: String },
    /// Capture the inner text of every match under `key`, as a JSON array
    ReadAllText { target: Locator, key: String },
    ReadAttribute { target: Locator, name: String, key: String },
    Screenshot { name: String },
}

impl Interaction {
    /// Short action name used in logs and errors
    pub fn action(&self) -> &'static str {
        match self {
            Interaction::Goto { .. } => "goto",
            Interaction::Click { .. } => "click",
            Interaction::Fill { .. } => "fill",
            Interaction::Check { .. } => "check",
            Interaction::SetInputFiles { .. } => "set_input_files",
            Interaction::AcceptDialog => "accept_dialog",
            Interaction::ExpectVisible { .. } => "expect_visible",
            Interaction::ExpectHidden { .. } => "expect_hidden",
            Interaction::ExpectText { .. } => "expect_text",
            Interaction::ReadText { .. } => "read_text",
            Interaction::ReadAllText { .. } => "read_all_text",
            Interaction::ReadAttribute { .. } => "read_attribute",
            Interaction::Screenshot { .. } => "screenshot",
        }
    }

    /// What the interaction waits on
    pub fn target(&self) -> String {
        match self {
            Interaction::Goto { path } => path.clone(),
            Interaction::AcceptDialog => "dialog".to_string(),
            Interaction::Screenshot { name } => name.clone(),
            Interaction::ExpectText { target, text } => format!("{} with text \"{}\"", target, text),
            Interaction::Click { target }
            | Interaction::Fill { target, .. }
            | Interaction::Check { target }
            | Interaction::SetInputFiles { target, .. }
            | Interaction::ExpectVisible { target }
            | Interaction::ExpectHidden { target }
            | Interaction::ReadText { target, .. }
            | Interaction::ReadAllText { target, .. }
            | Interaction::ReadAttribute { target, .. } => target.to_string(),
        }
    }
}

impl fmt::Display for Interaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.action(), self.target())
    }
}

/// An ordered sequence of interactions run in one browser session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    pub steps: Vec<Interaction>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, step: Interaction) -> Self {
        self.steps.push(step);
        self
    }

    pub fn goto(self, path: impl Into<String>) -> Self {
        self.push(Interaction::Goto { path: path.into() })
    }

    pub fn click(self, target: Locator) -> Self {
        self.push(Interaction::Click { target })
    }

    pub fn fill(self, target: Locator, value: impl Into<String>) -> Self {
        self.push(Interaction::Fill {
            target,
            value: value.into(),
        })
    }

    pub fn check(self, target: Locator) -> Self {
        self.push(Interaction::Check { target })
    }

    pub fn set_input_files(self, target: Locator, files: Vec<PathBuf>) -> Self {
        self.push(Interaction::SetInputFiles { target, files })
    }

    pub fn accept_dialog(self) -> Self {
        self.push(Interaction::AcceptDialog)
    }

    pub fn expect_visible(self, target: Locator) -> Self {
        self.push(Interaction::ExpectVisible { target })
    }

    pub fn expect_hidden(self, target: Locator) -> Self {
        self.push(Interaction::ExpectHidden { target })
    }

    pub fn expect_text(self, target: Locator, text: impl Into<String>) -> Self {
        self.push(Interaction::ExpectText {
            target,
            text: text.into(),
        })
    }

    pub fn read_text(self, target: Locator, key: impl Into<String>) -> Self {
        self.push(Interaction::ReadText { target, key: key.into() })
    }

    pub fn read_all_text(self, target: Locator, key: impl Into<String>) -> Self {
        self.push(Interaction::ReadAllText { target, key: key.into() })
    }

    pub fn read_attribute(self, target: Locator, name: impl Into<String>, key: impl Into<String>) -> Self {
        self.push(Interaction::ReadAttribute {
            target,
            name: name.into(),
            key: key.into(),
        })
    }

    pub fn screenshot(self, name: impl Into<String>) -> Self {
        self.push(Interaction::Screenshot { name: name.into() })
    }

    /// The error for a failure at `step`
    pub fn failure(&self, step: usize, timed_out: bool, reason: String) -> E2eError {
        let (action, target) = match self.steps.get(step) {
            Some(interaction) => (interaction.action().to_string(), interaction.target()),
            None => ("script".to_string(), "unknown step".to_string()),
        };
        if timed_out {
            E2eError::LocatorTimeout { step, action, target }
        } else {
            E2eError::StepFailed {
                step: format!("{} {}:{}", step, action, target),
                reason,
            }
        }
    }
}

/// Values captured by a script's read steps
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptOutput {
    #[serde(default)]
    pub values: BTreeMap<String, String>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl ScriptOutput {
    pub fn get(&self, key: &str) -> E2eResult<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| E2eError::Playwright(format!("script did not capture '{}'", key)))
    }

    /// A value captured by a `read_all_text` step
    pub fn list(&self, key: &str) -> E2eResult<Vec<String>> {
        Ok(serde_json::from_str(self.get(key)?)?)
    }
}

/// Runs scripts against a browser
#[async_trait]
pub trait Driver: Send + Sync {
    async fn run(&self, script: &Script) -> E2eResult<ScriptOutput>;
}

/// Report printed by the generated Node program as its last stdout line
#[derive(Debug, Deserialize)]
struct ScriptReport {
    success: bool,
    #[serde(default)]
    values: BTreeMap<String, String>,
    #[serde(default)]
    step: usize,
    #[serde(default)]
    timeout: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    screenshot: Option<String>,
}

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub base_url: String,
    pub screenshot_dir: PathBuf,
    pub storage_state: Option<PathBuf>,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub browser: Browser,
    pub headless: bool,
    pub action_timeout_ms: u64,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self::from(&UiConfig::default())
    }
}

impl From<&UiConfig> for PlaywrightConfig {
    fn from(ui: &UiConfig) -> Self {
        Self {
            base_url: ui.base_url.clone(),
            screenshot_dir: absolute(&ui.screenshot_dir),
            storage_state: ui.storage_state.as_deref().map(absolute),
            viewport_width: 1280,
            viewport_height: 720,
            browser: Browser::parse(&ui.browser),
            headless: ui.headless,
            action_timeout_ms: ui.action_timeout_ms,
        }
    }
}

/// Resolve against the harness's working directory; scripts run from a
/// temporary directory
fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Drives a real browser through the Playwright Node package
pub struct PlaywrightDriver {
    config: PlaywrightConfig,
}

impl PlaywrightDriver {
    /// Create a driver, verifying Playwright is installed
    pub fn new(mut config: PlaywrightConfig) -> E2eResult<Self> {
        Self::check_playwright_installed()?;
        config.screenshot_dir = absolute(&config.screenshot_dir);
        config.storage_state = config.storage_state.as_deref().map(absolute);
        std::fs::create_dir_all(&config.screenshot_dir)?;
        Ok(Self { config })
    }

    fn check_playwright_installed() -> E2eResult<()> {
        let output = Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match output {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    /// Build the Node program for a script
    pub fn build_script(&self, script: &Script, run_id: &str) -> String {
        let mut context_options = vec![
            format!("baseURL: {}", js_string(&self.config.base_url)),
            format!(
                "viewport: {{ width: {}, height: {} }}",
                self.config.viewport_width, self.config.viewport_height
            ),
        ];
        if let Some(state) = &self.config.storage_state {
            context_options.push(format!("storageState: {}", js_string(&state.to_string_lossy())));
        }
        let failure_shot = self.config.screenshot_dir.join(format!("failure-{}.png", run_id));

        let mut out = String::new();

        // Header
        out.push_str(&format!(
            r#"
const {{ chromium, firefox, webkit }} = require('playwright');

(async () => {{
  const browser = await {browser}.launch({{ headless: {headless} }});
  const context = await browser.newContext({{ {context_options} }});
  const page = await context.newPage();
  page.setDefaultTimeout({timeout});
  const values = {{}};
  let step = 0;

  try {{
"#,
            browser = self.config.browser.as_str(),
            headless = self.config.headless,
            context_options = context_options.join(", "),
            timeout = self.config.action_timeout_ms,
        ));

        for (i, interaction) in script.steps.iter().enumerate() {
            out.push_str(&format!("\n    // Step {}: {}\n", i, interaction));
            out.push_str(&format!("    step = {};\n", i));
            out.push_str(&self.step_to_js(interaction));
            out.push('\n');
        }

        // Footer
        out.push_str(&format!(
            r#"
    console.log(JSON.stringify({{ success: true, values }}));
  }} catch (error) {{
    let screenshot = null;
    try {{
      await page.screenshot({{ path: {shot}, fullPage: true }});
      screenshot = {shot};
    }} catch (_) {{}}
    console.log(JSON.stringify({{
      success: false,
      step,
      timeout: error.name === 'TimeoutError',
      error: error.message,
      screenshot,
    }}));
    process.exitCode = 1;
  }} finally {{
    await browser.close();
  }}
}})();
"#,
            shot = js_string(&failure_shot.to_string_lossy()),
        ));

        out
    }

    /// Convert an interaction to JavaScript
    fn step_to_js(&self, interaction: &Interaction) -> String {
        match interaction {
            Interaction::Goto { path } => format!("    await page.goto({});", js_string(path)),
            Interaction::Click { target } => format!("    await {}.click();", target.to_js()),
            Interaction::Fill { target, value } => {
                format!("    await {}.fill({});", target.to_js(), js_string(value))
            }
            Interaction::Check { target } => format!("    await {}.check();", target.to_js()),
            Interaction::SetInputFiles { target, files } => {
                let files: Vec<String> = files
                    .iter()
                    .map(|f| js_string(&absolute(f).to_string_lossy()))
                    .collect();
                format!("    await {}.setInputFiles([{}]);", target.to_js(), files.join(", "))
            }
            Interaction::AcceptDialog => "    page.once('dialog', (dialog) => dialog.accept());".to_string(),
            Interaction::ExpectVisible { target } => {
                format!("    await {}.waitFor({{ state: 'visible' }});", target.to_js())
            }
            Interaction::ExpectHidden { target } => {
                format!("    await {}.waitFor({{ state: 'hidden' }});", target.to_js())
            }
            Interaction::ExpectText { target, text } => format!(
                "    await {}.filter({{ hasText: {} }}).first().waitFor({{ state: 'visible' }});",
                target.to_js(),
                js_string(text)
            ),
            Interaction::ReadText { target, key } => {
                format!("    values[{}] = (await {}.innerText()).trim();", js_string(key), target.to_js())
            }
            Interaction::ReadAllText { target, key } => format!(
                "    values[{}] = JSON.stringify((await {}.allInnerTexts()).map((t) => t.trim()));",
                js_string(key),
                target.to_js()
            ),
            Interaction::ReadAttribute { target, name, key } => format!(
                "    values[{}] = (await {}.getAttribute({})) ?? '';",
                js_string(key),
                target.to_js(),
                js_string(name)
            ),
            Interaction::Screenshot { name } => {
                let path = self.config.screenshot_dir.join(format!("{}.png", name));
                format!(
                    "    await page.screenshot({{ path: {}, fullPage: true }});",
                    js_string(&path.to_string_lossy())
                )
            }
        }
    }

    fn parse_report(script: &Script, stdout: &str, stderr: &str) -> E2eResult<ScriptOutput> {
        let line = stdout
            .lines()
            .rev()
            .find(|l| l.trim_start().starts_with('{'))
            .ok_or_else(|| E2eError::Playwright(format!("Script produced no report:\nstderr: {}", stderr)))?;
        let report: ScriptReport = serde_json::from_str(line)?;

        if report.success {
            return Ok(ScriptOutput {
                values: report.values,
                duration_ms: 0,
            });
        }
        if let Some(shot) = &report.screenshot {
            error!("Failure screenshot: {}", shot);
        }
        Err(script.failure(
            report.step,
            report.timeout,
            report.error.unwrap_or_else(|| "unknown error".to_string()),
        ))
    }
}

#[async_trait]
impl Driver for PlaywrightDriver {
    async fn run(&self, script: &Script) -> E2eResult<ScriptOutput> {
        let start = Instant::now();
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let program = self.build_script(script, &run_id);

        // Write script to temp file
        let temp_dir = tempfile::tempdir()?;
        let script_path = temp_dir.path().join("script.js");
        tokio::fs::write(&script_path, program).await?;

        debug!("Running Playwright script: {} ({} steps)", script_path.display(), script.steps.len());

        let output = TokioCommand::new("node")
            .arg(&script_path)
            .current_dir(temp_dir.path())
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut result = Self::parse_report(script, &stdout, &stderr)?;
        result.duration_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }
}

/// Scripted reply of a [`RecordingDriver`]
#[derive(Debug, Clone)]
pub enum Reply {
    Values(BTreeMap<String, String>),
    /// The interaction at `step` never became actionable
    Timeout { step: usize },
}

/// Computes a reply from the script itself; `None` defers to the queue
pub type Responder = Box<dyn Fn(&Script) -> Option<Reply> + Send + Sync>;

/// Driver that records scripts instead of running a browser.
///
/// A responder, when set, answers first. Otherwise queued replies are
/// consumed in order; once they run out every script succeeds without
/// captured values.
#[derive(Default)]
pub struct RecordingDriver {
    scripts: Mutex<Vec<Script>>,
    replies: Mutex<VecDeque<Reply>>,
    responder: Mutex<Option<Responder>>,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, reply: Reply) {
        self.replies.lock().push_back(reply);
    }

    /// Queue a reply capturing a single value
    pub fn reply_value(&self, key: &str, value: &str) {
        self.reply(Reply::Values(BTreeMap::from([(key.to_string(), value.to_string())])));
    }

    pub fn respond_with(&self, responder: impl Fn(&Script) -> Option<Reply> + Send + Sync + 'static) {
        *self.responder.lock() = Some(Box::new(responder));
    }

    pub fn scripts(&self) -> Vec<Script> {
        self.scripts.lock().clone()
    }
}

#[async_trait]
impl Driver for RecordingDriver {
    async fn run(&self, script: &Script) -> E2eResult<ScriptOutput> {
        self.scripts.lock().push(script.clone());
        let computed = self.responder.lock().as_ref().and_then(|respond| respond(script));
        let reply = computed.or_else(|| self.replies.lock().pop_front());
        info!("Recorded script with {} steps", script.steps.len());
        match reply {
            None => Ok(ScriptOutput::default()),
            Some(Reply::Values(values)) => Ok(ScriptOutput { values, duration_ms: 0 }),
            Some(Reply::Timeout { step }) => Err(script.failure(step, true, "Timeout exceeded".to_string())),
        }
    }
}
