//! Playwright browser automation
//!
//! Each session is a Node process running [`DRIVER_SCRIPT`]: it launches one
//! browser context and answers newline-delimited JSON commands on stdin with
//! one JSON reply per line on stdout. Keeping the process alive for the whole
//! scenario keeps the page, and therefore its storage, alive between steps.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use cachecheck_common::{CheckError, StorageKind, StorageSource};

use crate::error::{E2eError, E2eResult};
use crate::session::{BrowserLauncher, BrowserSession, DriverCommand};
use crate::spec::Viewport;

/// Extra time granted on top of a command's own timeout before the driver is
/// considered unresponsive.
const REPLY_GRACE: Duration = Duration::from_secs(2);

/// Node-side driver. Configuration arrives as JSON in `argv[2]`.
pub const DRIVER_SCRIPT: &str = r#"
const readline = require('readline');
const playwright = require('playwright');

const config = JSON.parse(process.argv[2]);
const reply = (msg) => process.stdout.write(JSON.stringify(msg) + '\n');

(async () => {
  const browser = await playwright[config.browser].launch({ headless: config.headless });
  const context = await browser.newContext({
    viewport: { width: config.viewport_width, height: config.viewport_height }
  });
  context.setDefaultTimeout(config.default_timeout_ms);
  const pages = [await context.newPage()];
  const current = () => pages[pages.length - 1];

  async function handle(cmd) {
    const page = current();
    switch (cmd.op) {
      case 'goto':
        await page.goto(cmd.url);
        return null;
      case 'click':
        await page.click(cmd.selector, { timeout: cmd.timeout_ms });
        return null;
      case 'fill':
        await page.fill(cmd.selector, cmd.value);
        return null;
      case 'wait_for':
        await page.waitForSelector(cmd.selector, { state: cmd.state, timeout: cmd.timeout_ms });
        return null;
      case 'count':
        return await page.locator(cmd.selector).count();
      case 'screenshot':
        await page.screenshot({ path: cmd.path, fullPage: cmd.full_page });
        return null;
      case 'storage':
        return await page.evaluate((name) => Object.entries(window[name]), cmd.kind);
      case 'click_expect_popup': {
        const [popup] = await Promise.all([
          page.waitForEvent('popup', { timeout: cmd.timeout_ms }),
          page.click(cmd.selector, { timeout: cmd.timeout_ms }),
        ]);
        await popup.waitForLoadState();
        pages.push(popup);
        return null;
      }
      case 'wait_for_close': {
        if (pages.length < 2) throw new Error('no popup is open');
        const popup = pages.pop();
        if (!popup.isClosed()) await popup.waitForEvent('close', { timeout: cmd.timeout_ms });
        return null;
      }
      case 'close':
        return null;
      default:
        throw new Error('unknown op: ' + cmd.op);
    }
  }

  reply({ ready: true });
  const rl = readline.createInterface({ input: process.stdin });
  for await (const line of rl) {
    if (!line.trim()) continue;
    let cmd;
    try {
      cmd = JSON.parse(line);
    } catch (error) {
      reply({ id: null, ok: false, error: 'malformed command: ' + error.message });
      continue;
    }
    try {
      const result = await handle(cmd);
      reply({ id: cmd.id, ok: true, result: result === undefined ? null : result });
    } catch (error) {
      reply({ id: cmd.id, ok: false, error: error.message });
    }
    if (cmd.op === 'close') break;
  }
  await context.close();
  await browser.close();
})().catch((error) => {
  console.error(error.stack || String(error));
  process.exit(1);
});
"#;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl std::str::FromStr for Browser {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" | "safari" => Ok(Browser::Webkit),
            other => Err(format!("unknown browser: {}", other)),
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub browser: Browser,
    pub headless: bool,
    /// Page default operation timeout; storage capture inherits it
    pub default_timeout: Duration,
    /// How long a driver may take to launch the browser
    pub launch_timeout: Duration,
    pub screenshot_dir: PathBuf,
    /// `node_modules` directory that contains `playwright`
    pub node_path: Option<PathBuf>,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            default_timeout: Duration::from_secs(5),
            launch_timeout: Duration::from_secs(30),
            screenshot_dir: PathBuf::from("test-results/screenshots"),
            node_path: None,
        }
    }
}

/// Wire form of the driver configuration
#[derive(Serialize)]
struct DriverConfig<'a> {
    browser: &'a str,
    headless: bool,
    viewport_width: u32,
    viewport_height: u32,
    default_timeout_ms: u64,
}

#[derive(Serialize)]
struct Envelope<'a> {
    id: u64,
    #[serde(flatten)]
    command: &'a DriverCommand,
}

#[derive(Debug, Deserialize)]
struct DriverReply {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    result: serde_json::Value,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    ready: bool,
}

/// Launches Playwright-driven browser sessions
pub struct PlaywrightHandle {
    config: PlaywrightConfig,
}

impl PlaywrightHandle {
    /// Create a new Playwright handle
    pub fn new(config: PlaywrightConfig) -> E2eResult<Self> {
        Self::check_playwright_installed()?;
        std::fs::create_dir_all(&config.screenshot_dir)?;
        Ok(Self { config })
    }

    /// Check if Playwright is installed
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

    pub fn config(&self) -> &PlaywrightConfig {
        &self.config
    }

    /// Start a driver process with a fresh browser context
    pub async fn launch_session(&self, viewport: &Viewport) -> E2eResult<PlaywrightSession> {
        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("driver.js");
        std::fs::write(&script_path, DRIVER_SCRIPT)?;

        let driver_config = serde_json::to_string(&DriverConfig {
            browser: self.config.browser.as_str(),
            headless: self.config.headless,
            viewport_width: viewport.width,
            viewport_height: viewport.height,
            default_timeout_ms: self.config.default_timeout.as_millis() as u64,
        })?;

        let mut cmd = TokioCommand::new("node");
        cmd.arg(&script_path)
            .arg(driver_config)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(node_path) = &self.config.node_path {
            cmd.env("NODE_PATH", node_path);
        }

        debug!("Starting Playwright driver: {}", script_path.display());
        let mut child = cmd
            .spawn()
            .map_err(|e| E2eError::Playwright(format!("failed to spawn node: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::Playwright("driver stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Playwright("driver stdout not captured".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("[driver] {}", line);
                }
            });
        }

        let mut stdout = BufReader::new(stdout).lines();
        tokio::time::timeout(self.config.launch_timeout, wait_ready(&mut stdout))
            .await
            .map_err(|_| {
                E2eError::Timeout("Playwright driver to launch the browser".to_string())
            })??;

        info!("Launched {} context", self.config.browser.as_str());
        Ok(PlaywrightSession {
            child: Mutex::new(child),
            io: Mutex::new(DriverIo {
                stdin,
                stdout,
                next_id: 0,
            }),
            default_timeout: self.config.default_timeout,
            _script_dir: script_dir,
        })
    }
}

#[async_trait]
impl BrowserLauncher for PlaywrightHandle {
    async fn launch(&self, viewport: &Viewport) -> E2eResult<Box<dyn BrowserSession>> {
        let session = self.launch_session(viewport).await?;
        Ok(Box::new(session))
    }

    fn screenshot_dir(&self) -> &Path {
        &self.config.screenshot_dir
    }
}

async fn wait_ready(stdout: &mut Lines<BufReader<ChildStdout>>) -> E2eResult<()> {
    loop {
        match stdout.next_line().await? {
            Some(line) => match serde_json::from_str::<DriverReply>(&line) {
                Ok(reply) if reply.ready => return Ok(()),
                _ => debug!("[driver] {}", line),
            },
            None => {
                return Err(E2eError::Playwright(
                    "driver exited before the browser was ready (RUST_LOG=debug shows its output)"
                        .to_string(),
                ))
            }
        }
    }
}

struct DriverIo {
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
}

impl DriverIo {
    async fn read_reply(&mut self, id: u64) -> E2eResult<DriverReply> {
        loop {
            let line = self
                .stdout
                .next_line()
                .await?
                .ok_or_else(|| E2eError::Playwright("driver exited".to_string()))?;
            match serde_json::from_str::<DriverReply>(&line) {
                Ok(reply) if reply.id == Some(id) => return Ok(reply),
                // Late reply to a command that already timed out
                Ok(reply) => debug!("Discarding driver reply {:?}", reply.id),
                Err(_) => debug!("[driver] {}", line),
            }
        }
    }
}

/// One browser context driven through a Node process
pub struct PlaywrightSession {
    child: Mutex<Child>,
    io: Mutex<DriverIo>,
    default_timeout: Duration,
    _script_dir: tempfile::TempDir,
}

#[async_trait]
impl BrowserSession for PlaywrightSession {
    async fn send(&self, command: DriverCommand) -> E2eResult<serde_json::Value> {
        let op = command.op();
        let wait = command.timeout().unwrap_or(self.default_timeout) + REPLY_GRACE;

        let mut io = self.io.lock().await;
        io.next_id += 1;
        let id = io.next_id;

        let mut line = serde_json::to_string(&Envelope {
            id,
            command: &command,
        })?;
        line.push('\n');
        io.stdin.write_all(line.as_bytes()).await?;
        io.stdin.flush().await?;

        let reply = tokio::time::timeout(wait, io.read_reply(id))
            .await
            .map_err(|_| E2eError::Timeout(format!("driver reply to '{}'", op)))??;

        if reply.ok {
            Ok(reply.result)
        } else {
            Err(E2eError::Driver {
                op: op.to_string(),
                message: reply.error.unwrap_or_else(|| "unknown error".to_string()),
            })
        }
    }

    async fn close(&self) -> E2eResult<()> {
        if let Err(e) = self.send(DriverCommand::Close).await {
            warn!("Driver did not acknowledge close: {}", e);
        }

        let mut child = self.child.lock().await;
        match tokio::time::timeout(Duration::from_secs(5), child.wait()).await {
            Ok(status) => {
                debug!("Driver exited: {:?}", status?);
            }
            Err(_) => {
                warn!("Driver still running after close, killing it");
                child.kill().await?;
            }
        }
        Ok(())
    }

    fn default_timeout(&self) -> Duration {
        self.default_timeout
    }
}

#[async_trait]
impl StorageSource for PlaywrightSession {
    async fn read_storage(
        &self,
        kind: StorageKind,
    ) -> cachecheck_common::Result<Vec<(String, String)>> {
        let result = self
            .send(DriverCommand::Storage {
                kind: kind.as_str().to_string(),
            })
            .await
            .map_err(|e| CheckError::storage_unavailable(kind, e.to_string()))?;

        serde_json::from_value(result).map_err(|e| {
            CheckError::storage_unavailable(kind, format!("malformed storage reply: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_flattens_command() {
        let cmd = DriverCommand::Storage {
            kind: StorageKind::Session.as_str().to_string(),
        };
        let line = serde_json::to_string(&Envelope { id: 7, command: &cmd }).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"id": 7, "op": "storage", "kind": "sessionStorage"})
        );
    }

    #[test]
    fn test_reply_parsing() {
        let ready: DriverReply = serde_json::from_str(r#"{"ready": true}"#).unwrap();
        assert!(ready.ready);
        assert_eq!(ready.id, None);

        let failed: DriverReply =
            serde_json::from_str(r#"{"id": 3, "ok": false, "error": "Timeout 5000ms exceeded"}"#)
                .unwrap();
        assert_eq!(failed.id, Some(3));
        assert!(!failed.ok);
        assert_eq!(failed.error.as_deref(), Some("Timeout 5000ms exceeded"));
    }

    #[test]
    fn test_storage_reply_shape() {
        let result = serde_json::json!([["msal.account.keys", "[]"], ["k", "v"]]);
        let entries: Vec<(String, String)> = serde_json::from_value(result).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, "msal.account.keys");
    }

    #[test]
    fn test_browser_parse() {
        assert_eq!("Firefox".parse::<Browser>().unwrap(), Browser::Firefox);
        assert!("lynx".parse::<Browser>().is_err());
    }
}
