//! cachecheck browser scenario harness
//!
//! Drives the MSAL sample app through sign-in flows in a real browser and
//! checks the token store it leaves behind:
//! - Spawns the sample app's dev server as a subprocess
//! - Controls Playwright through a long-lived JSON-lines driver process
//! - Parses declarative YAML scenarios
//! - Verifies `localStorage`/`sessionStorage` with `cachecheck-common`
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  ScenarioRunner (Rust)                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  start_server() -> ServerHandle                             │
//! │  launcher.launch(viewport) -> Box<dyn BrowserSession>       │
//! │  run_spec(spec) -> ScenarioResult   (retried at most once)  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ScenarioSpec (YAML)                                        │
//! │    ├── name, description, tags, storage, retry              │
//! │    └── steps: [TestStep]                                    │
//! │          ├── navigate / click / fill / wait / sleep         │
//! │          ├── assert_count { selector, count }               │
//! │          ├── enter_credentials { form? }                    │
//! │          ├── popup { trigger, steps }                       │
//! │          ├── screenshot { name }                            │
//! │          ├── verify_token_store { storage?, expect }        │
//! │          └── log { message }                                │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod credentials;
pub mod error;
pub mod playwright;
pub mod runner;
pub mod server;
pub mod session;
pub mod spec;

pub use credentials::{CredentialProvider, Credentials, EnvCredentials};
pub use error::{E2eError, E2eResult};
pub use runner::{RunnerConfig, ScenarioResult, ScenarioRunner, SuiteResult};
pub use session::{BrowserLauncher, BrowserSession, DriverCommand};
pub use spec::{ScenarioSpec, TestStep};
