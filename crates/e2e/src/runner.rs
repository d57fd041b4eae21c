//! Scenario runner that orchestrates the dev server, browser sessions and
//! token store checks

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use cachecheck_common::StorageKind;

use crate::credentials::{CredentialProvider, Credentials, EnvCredentials};
use crate::error::{E2eError, E2eResult};
use crate::playwright::{PlaywrightConfig, PlaywrightHandle};
use crate::server::{ServerConfig, ServerHandle};
use crate::session::{BrowserLauncher, BrowserSession, DriverCommand};
use crate::spec::{LoginForm, ScenarioSpec, TestStep, WaitState};

/// Outcome of one executed step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub screenshot_path: Option<PathBuf>,
}

/// Outcome of one scenario, after any retry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub success: bool,
    pub attempts: u32,
    pub duration_ms: u64,
    /// Steps of the last attempt
    pub steps: Vec<StepResult>,
    pub error: Option<String>,
}

/// Result of running a set of scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Scenarios that needed a second attempt
    pub retried: usize,
    pub duration_ms: u64,
    pub results: Vec<ScenarioResult>,
}

impl From<ScenarioResult> for SuiteResult {
    fn from(result: ScenarioResult) -> Self {
        Self {
            total: 1,
            passed: usize::from(result.success),
            failed: usize::from(!result.success),
            retried: usize::from(result.attempts > 1),
            duration_ms: result.duration_ms,
            results: vec![result],
        }
    }
}

/// Configuration for the scenario runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Dev server to spawn; `None` when the app is already served at `base_url`
    pub server: Option<ServerConfig>,
    pub base_url: String,
    pub playwright: PlaywrightConfig,
    pub scenarios_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Fixed test account; `None` reads the environment
    pub credentials: Option<Credentials>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            server: Some(ServerConfig::default()),
            base_url: "http://localhost:4200".to_string(),
            playwright: PlaywrightConfig::default(),
            scenarios_dir: PathBuf::from("crates/e2e/scenarios"),
            output_dir: PathBuf::from("test-results"),
            credentials: None,
        }
    }
}

/// Everything a step needs besides the session
struct ScenarioContext<'a> {
    scenario: &'a str,
    base_url: &'a str,
    storage: StorageKind,
    credentials: &'a dyn CredentialProvider,
    screenshot_dir: &'a Path,
}

impl ScenarioContext<'_> {
    fn resolve_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!(
                "{}/{}",
                self.base_url.trim_end_matches('/'),
                url.trim_start_matches('/')
            )
        }
    }
}

/// Main scenario runner
pub struct ScenarioRunner {
    launcher: Box<dyn BrowserLauncher>,
    credentials: Box<dyn CredentialProvider>,
    server_config: Option<ServerConfig>,
    server: Option<ServerHandle>,
    base_url: String,
    scenarios_dir: PathBuf,
    output_dir: PathBuf,
}

impl ScenarioRunner {
    /// Create a runner driving Playwright
    pub fn new(config: RunnerConfig) -> E2eResult<Self> {
        let launcher = PlaywrightHandle::new(config.playwright.clone())?;
        Ok(Self::with_launcher(config, Box::new(launcher)))
    }

    /// Create a runner on top of any browser launcher
    pub fn with_launcher(config: RunnerConfig, launcher: Box<dyn BrowserLauncher>) -> Self {
        let credentials: Box<dyn CredentialProvider> = match config.credentials {
            Some(creds) => Box::new(creds),
            None => Box::new(EnvCredentials),
        };
        Self {
            launcher,
            credentials,
            server_config: config.server,
            server: None,
            base_url: config.base_url,
            scenarios_dir: config.scenarios_dir,
            output_dir: config.output_dir,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Start the dev server, if one is configured
    pub async fn start_server(&mut self) -> E2eResult<()> {
        if self.server.is_some() {
            return Ok(()); // Already running
        }
        let Some(config) = self.server_config.clone() else {
            return Ok(());
        };

        let server = ServerHandle::spawn(config).await?;
        self.base_url = server.base_url().to_string();
        self.server = Some(server);
        Ok(())
    }

    /// Stop the dev server
    pub fn stop_server(&mut self) -> E2eResult<()> {
        if let Some(mut server) = self.server.take() {
            server.stop()?;
        }
        Ok(())
    }

    /// Run all scenarios in the scenarios directory
    pub async fn run_all(&mut self) -> E2eResult<SuiteResult> {
        let specs = ScenarioSpec::load_all(&self.scenarios_dir)?;
        self.run_specs(&specs).await
    }

    /// Run scenarios carrying a tag
    pub async fn run_tagged(&mut self, tag: &str) -> E2eResult<SuiteResult> {
        let specs = ScenarioSpec::load_all(&self.scenarios_dir)?;
        let filtered: Vec<ScenarioSpec> = ScenarioSpec::filter_by_tag(&specs, tag)
            .into_iter()
            .cloned()
            .collect();
        self.run_specs(&filtered).await
    }

    /// Run a specific scenario by name
    pub async fn run_test(&mut self, name: &str) -> E2eResult<ScenarioResult> {
        let specs = ScenarioSpec::load_all(&self.scenarios_dir)?;
        let spec = specs
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| E2eError::SpecParse(format!("Scenario not found: {}", name)))?;

        self.start_server().await?;
        Ok(self.run_spec(&spec).await)
    }

    /// Run a list of scenarios
    pub async fn run_specs(&mut self, specs: &[ScenarioSpec]) -> E2eResult<SuiteResult> {
        let start = Instant::now();
        let mut results = Vec::with_capacity(specs.len());

        self.start_server().await?;

        info!("Running {} scenario(s)...", specs.len());

        for spec in specs {
            let result = self.run_spec(spec).await;
            if result.success {
                info!(
                    "✓ {} ({} ms, {} attempt(s))",
                    result.name, result.duration_ms, result.attempts
                );
            } else {
                error!(
                    "✗ {} - {}",
                    result.name,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
            results.push(result);
        }

        let passed = results.iter().filter(|r| r.success).count();
        let retried = results.iter().filter(|r| r.attempts > 1).count();
        let duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Scenario results: {} passed, {} failed, {} retried ({} ms)",
            passed,
            results.len() - passed,
            retried,
            duration_ms
        );

        Ok(SuiteResult {
            total: specs.len(),
            passed,
            failed: results.len() - passed,
            retried,
            duration_ms,
            results,
        })
    }

    /// Run one scenario, re-running it once on failure when allowed
    pub async fn run_spec(&self, spec: &ScenarioSpec) -> ScenarioResult {
        let start = Instant::now();
        let max_attempts = if spec.retry { 2 } else { 1 };
        let mut attempts = 0;

        loop {
            attempts += 1;
            debug!("Running scenario {} (attempt {})", spec.name, attempts);

            let (steps, failure) = self.run_attempt(spec).await;

            if failure.is_none() || attempts >= max_attempts {
                return ScenarioResult {
                    name: spec.name.clone(),
                    success: failure.is_none(),
                    attempts,
                    duration_ms: start.elapsed().as_millis() as u64,
                    steps,
                    error: failure,
                };
            }

            warn!(
                "Scenario {} failed ({}); retrying",
                spec.name,
                failure.as_deref().unwrap_or("unknown error")
            );
        }
    }

    /// One attempt in a fresh browser context. The context is always closed.
    async fn run_attempt(&self, spec: &ScenarioSpec) -> (Vec<StepResult>, Option<String>) {
        let session = match self.launcher.launch(&spec.viewport).await {
            Ok(session) => session,
            Err(e) => return (Vec::new(), Some(e.to_string())),
        };

        let ctx = ScenarioContext {
            scenario: &spec.name,
            base_url: &self.base_url,
            storage: spec.storage,
            credentials: self.credentials.as_ref(),
            screenshot_dir: self.launcher.screenshot_dir(),
        };

        let mut results = Vec::new();
        let mut failure = None;

        for step in &spec.steps {
            let result = run_step(session.as_ref(), &ctx, step).await;
            let failed = !result.success;
            if failed {
                failure = Some(format!(
                    "{}: {}",
                    result.name,
                    result.error.as_deref().unwrap_or("unknown error")
                ));
            }
            results.push(result);
            if failed {
                break; // Stop on first failure
            }
        }

        if let Err(e) = session.close().await {
            warn!("Failed to close browser context: {}", e);
        }

        (results, failure)
    }

    /// Write suite results to `test-results.json`
    pub fn write_results(&self, results: &SuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;

        let path = self.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

impl Drop for ScenarioRunner {
    fn drop(&mut self) {
        let _ = self.stop_server();
    }
}

async fn run_step(
    session: &dyn BrowserSession,
    ctx: &ScenarioContext<'_>,
    step: &TestStep,
) -> StepResult {
    let start = Instant::now();
    let name = step.name();
    debug!("Executing step: {}", name);

    let outcome = match step {
        TestStep::Popup {
            trigger,
            steps,
            close_timeout_ms,
        } => run_popup(session, ctx, trigger, steps, *close_timeout_ms).await,
        _ => execute_step(session, ctx, step).await,
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    match outcome {
        Ok(screenshot_path) => StepResult {
            name,
            success: true,
            duration_ms,
            error: None,
            screenshot_path,
        },
        Err(e) => StepResult {
            name,
            success: false,
            duration_ms,
            error: Some(e.to_string()),
            screenshot_path: None,
        },
    }
}

async fn run_popup(
    session: &dyn BrowserSession,
    ctx: &ScenarioContext<'_>,
    trigger: &str,
    steps: &[TestStep],
    close_timeout_ms: u64,
) -> E2eResult<Option<PathBuf>> {
    session
        .send(DriverCommand::ClickExpectPopup {
            selector: trigger.to_string(),
            timeout_ms: None,
        })
        .await?;

    for step in steps {
        execute_step(session, ctx, step)
            .await
            .map_err(|e| E2eError::StepFailed {
                step: step.name(),
                reason: e.to_string(),
            })?;
    }

    session
        .send(DriverCommand::WaitForClose {
            timeout_ms: Some(close_timeout_ms),
        })
        .await?;
    Ok(None)
}

/// Execute a non-popup step. Returns the screenshot path for screenshot steps.
async fn execute_step(
    session: &dyn BrowserSession,
    ctx: &ScenarioContext<'_>,
    step: &TestStep,
) -> E2eResult<Option<PathBuf>> {
    match step {
        TestStep::Navigate {
            url,
            wait_for_selector,
        } => {
            session
                .send(DriverCommand::Goto {
                    url: ctx.resolve_url(url),
                })
                .await?;
            if let Some(selector) = wait_for_selector {
                session
                    .send(DriverCommand::WaitFor {
                        selector: selector.clone(),
                        state: WaitState::Visible,
                        timeout_ms: None,
                    })
                    .await?;
            }
        }

        TestStep::Click {
            selector,
            timeout_ms,
        } => {
            session
                .send(DriverCommand::Click {
                    selector: selector.clone(),
                    timeout_ms: *timeout_ms,
                })
                .await?;
        }

        TestStep::Fill { selector, value } => {
            session
                .send(DriverCommand::Fill {
                    selector: selector.clone(),
                    value: value.clone(),
                })
                .await?;
        }

        TestStep::Wait {
            selector,
            timeout_ms,
            state,
        } => {
            session
                .send(DriverCommand::WaitFor {
                    selector: selector.clone(),
                    state: *state,
                    timeout_ms: Some(*timeout_ms),
                })
                .await?;
        }

        TestStep::Sleep { ms } => {
            tokio::time::sleep(Duration::from_millis(*ms)).await;
        }

        TestStep::AssertCount { selector, count } => {
            let value = session
                .send(DriverCommand::Count {
                    selector: selector.clone(),
                })
                .await?;
            let actual = value.as_u64().ok_or_else(|| {
                E2eError::Playwright(format!("count returned a non-number: {}", value))
            })?;
            if actual != *count as u64 {
                return Err(E2eError::AssertionFailed(format!(
                    "expected {} element(s) matching {}, found {}",
                    count, selector, actual
                )));
            }
        }

        TestStep::EnterCredentials { form } => {
            let default_form;
            let form = match form {
                Some(form) => form,
                None => {
                    default_form = LoginForm::default();
                    &default_form
                }
            };
            enter_credentials(session, ctx.credentials, form).await?;
        }

        TestStep::Screenshot { name, full_page } => {
            let path = ctx
                .screenshot_dir
                .join(format!("{}-{}.png", ctx.scenario, name));
            session
                .send(DriverCommand::Screenshot {
                    path: path.to_string_lossy().to_string(),
                    full_page: *full_page,
                })
                .await?;
            return Ok(Some(path));
        }

        TestStep::VerifyTokenStore { storage, expect } => {
            let kind = storage.unwrap_or(ctx.storage);
            cachecheck_common::verify_token_store(
                session,
                kind,
                session.default_timeout(),
                expect,
            )
            .await?;
        }

        TestStep::Log { message } => {
            info!("[{}] {}", ctx.scenario, message);
        }

        TestStep::Popup { .. } => {
            return Err(E2eError::SpecParse(
                "popup steps cannot be nested".to_string(),
            ));
        }
    }

    Ok(None)
}

async fn enter_credentials(
    session: &dyn BrowserSession,
    provider: &dyn CredentialProvider,
    form: &LoginForm,
) -> E2eResult<()> {
    let creds = provider.credentials()?;
    debug!("Signing in as {}", creds.username);

    session
        .send(DriverCommand::Fill {
            selector: form.username_input.clone(),
            value: creds.username,
        })
        .await?;
    session
        .send(DriverCommand::Click {
            selector: form.next_button.clone(),
            timeout_ms: None,
        })
        .await?;
    session
        .send(DriverCommand::Fill {
            selector: form.password_input.clone(),
            value: creds.password,
        })
        .await?;
    session
        .send(DriverCommand::Click {
            selector: form.submit_button.clone(),
            timeout_ms: None,
        })
        .await?;

    if let Some(selector) = &form.stay_signed_in_button {
        let prompt = session
            .send(DriverCommand::WaitFor {
                selector: selector.clone(),
                state: WaitState::Visible,
                timeout_ms: Some(form.stay_signed_in_timeout_ms),
            })
            .await;
        match prompt {
            Ok(_) => {
                session
                    .send(DriverCommand::Click {
                        selector: selector.clone(),
                        timeout_ms: None,
                    })
                    .await?;
            }
            Err(e) => debug!("No stay-signed-in prompt: {}", e),
        }
    }

    Ok(())
}
