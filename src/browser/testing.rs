//! Scripted browser for tests.
//!
//! `ScriptedBrowser` plays back a [`PagePlan`] for every launched session and
//! counts launches and closes, so callers can assert that every session was
//! released.

use crate::browser::{BrowserError, BrowserLauncher, BrowserSession};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// What a scripted section does when extracted
#[derive(Debug, Clone)]
pub enum SectionOutcome {
    /// Returns this text
    Text(String),
    /// Fails as if the section never appeared
    Timeout,
}

/// Behaviour of every session launched while this plan is active
#[derive(Debug, Clone)]
pub struct PagePlan {
    /// Launch failure message
    pub launch_error: Option<String>,
    /// Navigation failure message
    pub navigation_error: Option<String>,
    /// URL the session lands on after navigation
    pub landing_url: String,
    /// Whether the authenticated marker is visible
    pub authenticated: bool,
    /// Section label -> outcome; unknown labels time out
    pub sections: HashMap<String, SectionOutcome>,
}

impl PagePlan {
    /// An authenticated page with all three default sections present
    pub fn healthy() -> Self {
        let mut sections = HashMap::new();
        sections.insert(
            "Current session".to_string(),
            SectionOutcome::Text("Current session\nResets in 4 hr 10 min\n23% used".to_string()),
        );
        sections.insert(
            "All models".to_string(),
            SectionOutcome::Text("All models\nResets Thu 9:00 AM\n41% used".to_string()),
        );
        sections.insert(
            "Sonnet only".to_string(),
            SectionOutcome::Text("Sonnet only\nResets Thu 9:00 AM\n7% used".to_string()),
        );

        Self {
            launch_error: None,
            navigation_error: None,
            landing_url: "https://console.example.com/settings/usage".to_string(),
            authenticated: true,
            sections,
        }
    }

    /// A session that lands on the login page
    pub fn logged_out() -> Self {
        Self {
            landing_url: "https://console.example.com/login?returnTo=%2Fsettings%2Fusage"
                .to_string(),
            authenticated: false,
            ..Self::healthy()
        }
    }

    /// A session whose navigation fails at the network layer
    pub fn offline() -> Self {
        Self {
            navigation_error: Some("net::ERR_INTERNET_DISCONNECTED".to_string()),
            ..Self::healthy()
        }
    }

    pub fn with_section(mut self, label: &str, outcome: SectionOutcome) -> Self {
        self.sections.insert(label.to_string(), outcome);
        self
    }
}

#[derive(Debug)]
struct ScriptState {
    plan: PagePlan,
    launches: usize,
    closes: usize,
}

/// A [`BrowserLauncher`] driven by a [`PagePlan`]
#[derive(Debug, Clone)]
pub struct ScriptedBrowser {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedBrowser {
    pub fn new(plan: PagePlan) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptState {
                plan,
                launches: 0,
                closes: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        // A panicking test thread may poison the lock; the counters stay usable
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replaces the plan used by sessions launched from now on
    pub fn set_plan(&self, plan: PagePlan) {
        self.lock().plan = plan;
    }

    pub fn launches(&self) -> usize {
        self.lock().launches
    }

    pub fn closes(&self) -> usize {
        self.lock().closes
    }

    /// Sessions launched but not yet closed
    pub fn open_sessions(&self) -> usize {
        let state = self.lock();
        state.launches - state.closes
    }
}

#[async_trait]
impl BrowserLauncher for ScriptedBrowser {
    async fn launch(&self, _profile_dir: &Path) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let plan = {
            let mut state = self.lock();
            if let Some(error) = &state.plan.launch_error {
                return Err(BrowserError::Launch(error.clone()));
            }
            state.launches += 1;
            state.plan.clone()
        };

        Ok(Box::new(ScriptedSession {
            plan,
            browser: self.clone(),
            navigated: Mutex::new(false),
        }))
    }
}

struct ScriptedSession {
    plan: PagePlan,
    browser: ScriptedBrowser,
    navigated: Mutex<bool>,
}

impl ScriptedSession {
    fn has_navigated(&self) -> bool {
        *self
            .navigated
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<(), BrowserError> {
        if let Some(error) = &self.plan.navigation_error {
            return Err(BrowserError::Navigation {
                url: url.to_string(),
                message: error.clone(),
            });
        }
        *self
            .navigated
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = true;
        Ok(())
    }

    async fn wait_for_text(&self, text: &str, timeout: Duration) -> Result<(), BrowserError> {
        if self.has_navigated() && self.plan.authenticated {
            return Ok(());
        }
        tokio::time::sleep(timeout).await;
        Err(BrowserError::Timeout {
            what: format!("text '{}'", text),
            after: timeout,
        })
    }

    async fn wait_for_url(&self, pattern: &str, timeout: Duration) -> Result<(), BrowserError> {
        if self.has_navigated() && self.plan.landing_url.contains(pattern) {
            return Ok(());
        }
        tokio::time::sleep(timeout).await;
        Err(BrowserError::Timeout {
            what: format!("URL matching '{}'", pattern),
            after: timeout,
        })
    }

    async fn current_url(&self) -> String {
        if self.has_navigated() {
            self.plan.landing_url.clone()
        } else {
            "about:blank".to_string()
        }
    }

    async fn extract_section(
        &self,
        selector_hint: &str,
        timeout: Duration,
    ) -> Result<String, BrowserError> {
        match self.plan.sections.get(selector_hint) {
            Some(SectionOutcome::Text(text)) if self.has_navigated() => Ok(text.clone()),
            _ => Err(BrowserError::Timeout {
                what: format!("section '{}'", selector_hint),
                after: timeout,
            }),
        }
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.browser.lock().closes += 1;
        Ok(())
    }
}
