//! Server management - spawning and health checking the sample app's dev server

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};

/// Placeholder in `ServerConfig::args` replaced with the chosen port
pub const PORT_PLACEHOLDER: &str = "{port}";

/// Handle to a running dev server process
pub struct ServerHandle {
    child: Child,
    pub base_url: String,
    pub port: u16,
}

impl ServerHandle {
    /// Spawn the dev server and wait until it answers on `health_path`
    pub async fn spawn(config: ServerConfig) -> E2eResult<Self> {
        let port = match config.port {
            Some(port) => port,
            None => find_free_port()?,
        };
        let base_url = format!("http://localhost:{}", port);

        info!("Spawning {} on port {}", config.program, port);

        let mut cmd = Command::new(&config.program);
        cmd.args(config.resolved_args(port));

        if let Some(dir) = &config.working_dir {
            cmd.current_dir(dir);
        }
        if let Some(var) = &config.port_env {
            cmd.env(var, port.to_string());
        }
        cmd.envs(&config.env);

        // The dev server's output is noise for the scenarios
        cmd.stdout(Stdio::null()).stderr(Stdio::null());

        let child = cmd.spawn().map_err(|e| {
            E2eError::ServerStartup(format!("Failed to spawn {}: {}", config.program, e))
        })?;

        let mut handle = ServerHandle {
            child,
            base_url: base_url.clone(),
            port,
        };

        if let Err(e) = handle
            .wait_for_healthy(&config.health_path, config.startup_timeout)
            .await
        {
            let _ = handle.stop();
            return Err(e);
        }

        info!("Server is healthy at {}", base_url);
        Ok(handle)
    }

    /// Wait for the server to respond successfully
    async fn wait_for_healthy(&mut self, path: &str, timeout_duration: Duration) -> E2eResult<()> {
        let health_url = format!("{}{}", self.base_url, path);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;

        let start = std::time::Instant::now();
        let mut attempts = 0;

        while start.elapsed() < timeout_duration {
            attempts += 1;

            if let Some(status) = self.child.try_wait()? {
                return Err(E2eError::ServerStartup(format!(
                    "dev server exited early with {}",
                    status
                )));
            }

            match client.get(&health_url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    return Ok(());
                }
                Ok(resp) => {
                    warn!("Health check returned {}", resp.status());
                }
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting for server to start...");
                    }
                    // Connection refused is expected while the bundle compiles
                    if !e.is_connect() {
                        warn!("Health check error: {}", e);
                    }
                }
            }

            sleep(Duration::from_millis(250)).await;
        }

        Err(E2eError::ServerHealthCheck(attempts))
    }

    /// Get the base URL for this server
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Stop the server
    pub fn stop(&mut self) -> E2eResult<()> {
        if matches!(self.child.try_wait(), Ok(Some(_))) {
            return Ok(());
        }
        info!("Stopping server (pid: {})", self.child.id());

        // Try graceful shutdown first
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(self.child.id() as i32);
            if kill(pid, Signal::SIGTERM).is_ok() {
                std::thread::sleep(Duration::from_millis(500));
            }
        }

        // Force kill if still running
        let _ = self.child.kill();
        let _ = self.child.wait();
        debug!("Server stopped");

        Ok(())
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Configuration for spawning the sample app
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Program to run, e.g. `npm`
    pub program: String,

    /// Arguments; `{port}` is replaced with the chosen port
    pub args: Vec<String>,

    /// Sample app directory
    pub working_dir: Option<PathBuf>,

    /// Port to listen on (None = find free port)
    pub port: Option<u16>,

    /// Environment variable that also receives the port
    pub port_env: Option<String>,

    /// Path polled until it answers 2xx
    pub health_path: String,

    /// Timeout for server startup
    pub startup_timeout: Duration,

    /// Extra environment for the dev server
    pub env: HashMap<String, String>,
}

impl ServerConfig {
    pub fn resolved_args(&self, port: u16) -> Vec<String> {
        let port = port.to_string();
        self.args
            .iter()
            .map(|arg| arg.replace(PORT_PLACEHOLDER, &port))
            .collect()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            program: "npm".to_string(),
            args: vec![
                "start".to_string(),
                "--".to_string(),
                "--port".to_string(),
                PORT_PLACEHOLDER.to_string(),
            ],
            working_dir: None,
            port: None,
            port_env: Some("PORT".to_string()),
            health_path: "/".to_string(),
            // Angular dev builds are slow on a cold cache
            startup_timeout: Duration::from_secs(120),
            env: HashMap::new(),
        }
    }
}

/// Find a free port to use
pub fn find_free_port() -> std::io::Result<u16> {
    use std::net::TcpListener;

    Ok(TcpListener::bind("127.0.0.1:0")?.local_addr()?.port())
}
