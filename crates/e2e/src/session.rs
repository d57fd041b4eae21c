//! Browser session seam
//!
//! A [`BrowserSession`] is one isolated browser context with a page stack
//! (the main page plus any open popups). Every interaction is a
//! [`DriverCommand`] answered with a JSON value. Sessions double as the
//! [`StorageSource`] the token checker captures snapshots from.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use cachecheck_common::StorageSource;

use crate::error::E2eResult;
use crate::spec::{Viewport, WaitState};

/// One command for the page automation driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DriverCommand {
    Goto {
        url: String,
    },
    Click {
        selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    Fill {
        selector: String,
        value: String,
    },
    WaitFor {
        selector: String,
        state: WaitState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    /// Number of elements matching a selector
    Count {
        selector: String,
    },
    Screenshot {
        path: String,
        full_page: bool,
    },
    /// Every key/value pair of `window[kind]`
    Storage {
        kind: String,
    },
    /// Click and make the popup it opens the current page
    ClickExpectPopup {
        selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    /// Wait for the current popup to close and return to its opener
    WaitForClose {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    Close,
}

impl DriverCommand {
    pub fn op(&self) -> &'static str {
        match self {
            DriverCommand::Goto { .. } => "goto",
            DriverCommand::Click { .. } => "click",
            DriverCommand::Fill { .. } => "fill",
            DriverCommand::WaitFor { .. } => "wait_for",
            DriverCommand::Count { .. } => "count",
            DriverCommand::Screenshot { .. } => "screenshot",
            DriverCommand::Storage { .. } => "storage",
            DriverCommand::ClickExpectPopup { .. } => "click_expect_popup",
            DriverCommand::WaitForClose { .. } => "wait_for_close",
            DriverCommand::Close => "close",
        }
    }

    /// Explicit timeout carried by the command, if any
    pub fn timeout(&self) -> Option<Duration> {
        match self {
            DriverCommand::Click { timeout_ms, .. }
            | DriverCommand::WaitFor { timeout_ms, .. }
            | DriverCommand::ClickExpectPopup { timeout_ms, .. }
            | DriverCommand::WaitForClose { timeout_ms } => timeout_ms.map(Duration::from_millis),
            _ => None,
        }
    }
}

/// A live, isolated browser context
#[async_trait]
pub trait BrowserSession: StorageSource {
    /// Run one command against the current page
    async fn send(&self, command: DriverCommand) -> E2eResult<serde_json::Value>;

    /// Tear the context down. Storage reads fail afterwards.
    async fn close(&self) -> E2eResult<()>;

    /// Default operation timeout of the page
    fn default_timeout(&self) -> Duration;
}

/// Creates a fresh browser context per scenario attempt
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, viewport: &Viewport) -> E2eResult<Box<dyn BrowserSession>>;

    /// Where screenshot steps write their PNGs
    fn screenshot_dir(&self) -> &Path;
}
