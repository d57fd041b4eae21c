//! Declarative YAML scenario specification

use serde::{Deserialize, Serialize};
use std::path::Path;

use cachecheck_common::{StorageKind, TokenStoreExpectation};

use crate::error::{E2eError, E2eResult};

/// A complete scenario parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSpec {
    /// Unique name for this scenario
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering scenarios
    #[serde(default)]
    pub tags: Vec<String>,

    /// Storage medium the sample app is configured to cache tokens in
    #[serde(default)]
    pub storage: StorageKind,

    /// Re-run once on failure
    #[serde(default = "default_retry")]
    pub retry: bool,

    /// Viewport size for the browser
    #[serde(default = "default_viewport")]
    pub viewport: Viewport,

    /// Steps to execute in order
    pub steps: Vec<TestStep>,
}

fn default_retry() -> bool {
    true
}

fn default_viewport() -> Viewport {
    Viewport { width: 1280, height: 720 }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        default_viewport()
    }
}

/// A single step in a scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TestStep {
    /// Navigate to a URL (relative to base)
    Navigate {
        url: String,
        #[serde(default)]
        wait_for_selector: Option<String>,
    },

    /// Click an element
    Click {
        selector: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Fill an input field
    Fill {
        selector: String,
        value: String,
    },

    /// Wait for an element to reach a state
    Wait {
        selector: String,
        #[serde(default = "default_wait_timeout")]
        timeout_ms: u64,
        #[serde(default)]
        state: WaitState,
    },

    /// Wait for a fixed amount of time (use sparingly)
    Sleep {
        ms: u64,
    },

    /// Assert how many elements match a selector
    AssertCount {
        selector: String,
        count: usize,
    },

    /// Sign in on the identity provider's page with the configured account
    EnterCredentials {
        #[serde(default)]
        form: Option<LoginForm>,
    },

    /// Click `trigger`, run `steps` inside the popup it opens, then wait for
    /// the popup to close
    Popup {
        trigger: String,
        steps: Vec<TestStep>,
        #[serde(default = "default_popup_close_timeout")]
        close_timeout_ms: u64,
    },

    /// Take a screenshot
    Screenshot {
        name: String,
        #[serde(default)]
        full_page: bool,
    },

    /// Capture a storage medium and check its token inventory
    VerifyTokenStore {
        /// Defaults to the scenario's storage medium
        #[serde(default)]
        storage: Option<StorageKind>,
        #[serde(default)]
        expect: TokenStoreExpectation,
    },

    /// Log a message (for debugging)
    Log {
        message: String,
    },
}

fn default_wait_timeout() -> u64 {
    5000 // 5 seconds default
}

fn default_popup_close_timeout() -> u64 {
    10_000
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    #[default]
    Visible,
    Hidden,
    Attached,
    Detached,
}

/// Selectors of the identity provider's sign-in form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub username_input: String,
    pub next_button: String,
    pub password_input: String,
    pub submit_button: String,
    /// "Stay signed in?" prompt button to dismiss, if the provider shows one
    pub stay_signed_in_button: Option<String>,
    /// How long to wait for the optional prompt
    pub stay_signed_in_timeout_ms: u64,
}

impl Default for LoginForm {
    fn default() -> Self {
        Self {
            username_input: "#i0116".to_string(),
            next_button: "#idSIButton9".to_string(),
            password_input: "#i0118".to_string(),
            submit_button: "#idSIButton9".to_string(),
            stay_signed_in_button: Some("#idBtn_Back".to_string()),
            stay_signed_in_timeout_ms: 3000,
        }
    }
}

impl TestStep {
    /// Short label used in logs and results
    pub fn name(&self) -> String {
        match self {
            TestStep::Navigate { url, .. } => format!("navigate:{}", url),
            TestStep::Click { selector, .. } => format!("click:{}", selector),
            TestStep::Fill { selector, .. } => format!("fill:{}", selector),
            TestStep::Wait { selector, .. } => format!("wait:{}", selector),
            TestStep::Sleep { ms } => format!("sleep:{}ms", ms),
            TestStep::AssertCount { selector, count } => {
                format!("assert_count:{}={}", selector, count)
            }
            TestStep::EnterCredentials { .. } => "enter_credentials".to_string(),
            TestStep::Popup { trigger, .. } => format!("popup:{}", trigger),
            TestStep::Screenshot { name, .. } => format!("screenshot:{}", name),
            TestStep::VerifyTokenStore { storage, .. } => match storage {
                Some(kind) => format!("verify_token_store:{}", kind),
                None => "verify_token_store".to_string(),
            },
            TestStep::Log { message } => {
                let end = message
                    .char_indices()
                    .nth(30)
                    .map(|(i, _)| i)
                    .unwrap_or(message.len());
                format!("log:{}", &message[..end])
            }
        }
    }
}

impl ScenarioSpec {
    /// Parse a scenario from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let spec: Self = serde_yaml::from_str(yaml)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all scenarios from a directory, sorted by name
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut specs = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            let spec = Self::from_file(entry.path())?;
            specs.push(spec);
        }

        specs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(specs)
    }

    /// Filter scenarios by tag
    pub fn filter_by_tag<'a>(specs: &'a [Self], tag: &str) -> Vec<&'a Self> {
        specs.iter().filter(|s| s.tags.iter().any(|t| t == tag)).collect()
    }

    fn validate(&self) -> E2eResult<()> {
        if self.name.trim().is_empty() {
            return Err(E2eError::SpecParse("scenario name is empty".to_string()));
        }
        if self.steps.is_empty() {
            return Err(E2eError::SpecParse(format!("scenario '{}' has no steps", self.name)));
        }
        validate_steps(&self.name, &self.steps, false)
    }
}

fn validate_steps(scenario: &str, steps: &[TestStep], in_popup: bool) -> E2eResult<()> {
    for step in steps {
        if let TestStep::Popup { steps, .. } = step {
            if in_popup {
                return Err(E2eError::SpecParse(format!(
                    "scenario '{}': nested popup steps are not supported",
                    scenario
                )));
            }
            validate_steps(scenario, steps, true)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cachecheck_common::TokenCounts;

    #[test]
    fn test_parse_redirect_scenario() {
        let yaml = r#"
name: home-redirect
description: Sign in through loginRedirect from the home page
tags:
  - redirect
  - smoke
steps:
  - action: navigate
    url: /
  - action: click
    selector: "button:has-text('Login')"
  - action: click
    selector: "button:has-text('Login using Redirect')"
  - action: enter_credentials
  - action: wait
    selector: "p:has-text('Login successful!')"
  - action: verify_token_store
    expect:
      scopes: [User.Read]
      total_entries: 6
"#;
        let spec = ScenarioSpec::from_yaml(yaml).unwrap();
        assert_eq!(spec.name, "home-redirect");
        assert_eq!(spec.storage, StorageKind::Local);
        assert!(spec.retry);
        assert_eq!(spec.steps.len(), 6);

        match &spec.steps[5] {
            TestStep::VerifyTokenStore { storage, expect } => {
                assert_eq!(*storage, None);
                assert_eq!(expect.counts, TokenCounts::single_sign_in());
                assert_eq!(expect.total_entries, Some(6));
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_parse_popup_scenario() {
        let yaml = r#"
name: home-popup
storage: session
retry: false
steps:
  - action: navigate
    url: /
  - action: popup
    trigger: "button:has-text('Login using Popup')"
    steps:
      - action: enter_credentials
        form:
          stay_signed_in_button: null
  - action: verify_token_store
    storage: session
    expect:
      counts: { id_tokens: 1, access_tokens: 2, refresh_tokens: 1 }
"#;
        let spec = ScenarioSpec::from_yaml(yaml).unwrap();
        assert_eq!(spec.storage, StorageKind::Session);
        assert!(!spec.retry);

        match &spec.steps[1] {
            TestStep::Popup { steps, close_timeout_ms, .. } => {
                assert_eq!(*close_timeout_ms, 10_000);
                match &steps[0] {
                    TestStep::EnterCredentials { form: Some(form) } => {
                        assert_eq!(form.username_input, "#i0116");
                        assert_eq!(form.stay_signed_in_button, None);
                    }
                    other => panic!("unexpected popup step {:?}", other),
                }
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_nested_popup_rejected() {
        let yaml = r##"
name: nested
steps:
  - action: popup
    trigger: "#a"
    steps:
      - action: popup
        trigger: "#b"
        steps: []
"##;
        assert!(matches!(
            ScenarioSpec::from_yaml(yaml),
            Err(E2eError::SpecParse(_))
        ));
    }

    #[test]
    fn test_empty_steps_rejected() {
        assert!(ScenarioSpec::from_yaml("name: empty\nsteps: []\n").is_err());
    }
}
