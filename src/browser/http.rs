//! HTTP-backed browser implementation
//!
//! Replays the cookie header stored in the profile directory, follows
//! redirects by hand so login redirects stay observable, and extracts
//! visible section text with an HTML parser:
//! - Redirect chains longer than 10 hops fail navigation
//! - 5xx responses fail navigation, other statuses are kept as the page
//! - Waits reload the page on a fixed poll interval until their timeout

use crate::browser::{BrowserError, BrowserLauncher, BrowserSession};
use async_trait::async_trait;
use reqwest::{header, redirect::Policy, Client};
use scraper::{ElementRef, Html, Selector};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use url::Url;

const MAX_REDIRECTS: usize = 10;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Launches [`HttpSession`]s from a profile's cookie file
#[derive(Debug, Clone)]
pub struct HttpBrowser {
    cookie_file: String,
    user_agent: String,
    poll_interval: Duration,
}

impl HttpBrowser {
    /// Creates a launcher reading `cookie_file` from each profile directory
    pub fn new(cookie_file: impl Into<String>) -> Self {
        Self {
            cookie_file: cookie_file.into(),
            user_agent: format!("usage-keeper/{}", env!("CARGO_PKG_VERSION")),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

#[async_trait]
impl BrowserLauncher for HttpBrowser {
    async fn launch(&self, profile_dir: &Path) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let cookie_path = profile_dir.join(&self.cookie_file);
        let cookie = tokio::fs::read_to_string(&cookie_path).await.map_err(|e| {
            BrowserError::Launch(format!(
                "cannot read cookie file {}: {}",
                cookie_path.display(),
                e
            ))
        })?;

        let cookie = cookie.trim().to_string();
        if cookie.is_empty() {
            return Err(BrowserError::Launch(format!(
                "cookie file {} is empty",
                cookie_path.display()
            )));
        }

        let client = Client::builder()
            .user_agent(&self.user_agent)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .redirect(Policy::none()) // Handle redirects manually
            .gzip(true)
            .brotli(true)
            .build()?;

        tracing::debug!("Launched HTTP browser session from {}", profile_dir.display());

        Ok(Box::new(HttpSession {
            client,
            cookie,
            poll_interval: self.poll_interval,
            page: Mutex::new(LoadedPage::default()),
            closed: AtomicBool::new(false),
        }))
    }
}

#[derive(Debug, Default, Clone)]
struct LoadedPage {
    requested_url: String,
    url: String,
    html: String,
}

/// A cookie-authenticated HTTP "browser" session
pub struct HttpSession {
    client: Client,
    cookie: String,
    poll_interval: Duration,
    page: Mutex<LoadedPage>,
    closed: AtomicBool,
}

impl HttpSession {
    fn ensure_open(&self) -> Result<(), BrowserError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(BrowserError::Closed)
        } else {
            Ok(())
        }
    }

    /// Follows the redirect chain from `url` and returns the final URL and body
    async fn load(&self, url: &str) -> Result<(String, String), BrowserError> {
        let mut current = Url::parse(url).map_err(|e| BrowserError::Navigation {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        for _ in 0..=MAX_REDIRECTS {
            let response = self
                .client
                .get(current.clone())
                .header(header::COOKIE, &self.cookie)
                .send()
                .await
                .map_err(|e| BrowserError::Navigation {
                    url: current.to_string(),
                    message: describe_request_error(&e),
                })?;

            let status = response.status();

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| BrowserError::Navigation {
                        url: current.to_string(),
                        message: format!("HTTP {} without Location header", status.as_u16()),
                    })?;
                let next = current.join(location).map_err(|e| BrowserError::Navigation {
                    url: current.to_string(),
                    message: format!("invalid redirect target '{}': {}", location, e),
                })?;
                tracing::trace!("Redirect {} -> {}", current, next);
                current = next;
                continue;
            }

            if status.is_server_error() {
                return Err(BrowserError::Navigation {
                    url: current.to_string(),
                    message: format!("HTTP {}", status.as_u16()),
                });
            }

            let body = response.text().await.map_err(|e| BrowserError::Navigation {
                url: current.to_string(),
                message: describe_request_error(&e),
            })?;
            return Ok((current.to_string(), body));
        }

        Err(BrowserError::Navigation {
            url: url.to_string(),
            message: format!("more than {} redirects", MAX_REDIRECTS),
        })
    }

    /// Re-fetches the last requested URL
    async fn reload(&self) -> Result<(), BrowserError> {
        let requested = self.page.lock().await.requested_url.clone();
        if requested.is_empty() {
            return Ok(());
        }
        let (url, html) = self.load(&requested).await?;
        let mut page = self.page.lock().await;
        page.url = url;
        page.html = html;
        Ok(())
    }

    async fn snapshot(&self) -> LoadedPage {
        self.page.lock().await.clone()
    }
}

#[async_trait]
impl BrowserSession for HttpSession {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), BrowserError> {
        self.ensure_open()?;

        let (final_url, html) = tokio::time::timeout(timeout, self.load(url))
            .await
            .map_err(|_| BrowserError::Timeout {
                what: format!("navigation to {}", url),
                after: timeout,
            })??;

        let mut page = self.page.lock().await;
        *page = LoadedPage {
            requested_url: url.to_string(),
            url: final_url,
            html,
        };
        Ok(())
    }

    async fn wait_for_text(&self, text: &str, timeout: Duration) -> Result<(), BrowserError> {
        let deadline = Instant::now() + timeout;
        loop {
            self.ensure_open()?;
            let page = self.snapshot().await;
            if visible_text(&page.html).contains(text) {
                return Ok(());
            }
            if Instant::now() + self.poll_interval >= deadline {
                return Err(BrowserError::Timeout {
                    what: format!("text '{}'", text),
                    after: timeout,
                });
            }
            tokio::time::sleep(self.poll_interval).await;
            if let Err(e) = self.reload().await {
                tracing::debug!("Reload while waiting for text failed: {}", e);
            }
        }
    }

    async fn wait_for_url(&self, pattern: &str, timeout: Duration) -> Result<(), BrowserError> {
        let deadline = Instant::now() + timeout;
        loop {
            self.ensure_open()?;
            if self.snapshot().await.url.contains(pattern) {
                return Ok(());
            }
            if Instant::now() + self.poll_interval >= deadline {
                return Err(BrowserError::Timeout {
                    what: format!("URL matching '{}'", pattern),
                    after: timeout,
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn current_url(&self) -> String {
        self.snapshot().await.url
    }

    async fn extract_section(
        &self,
        selector_hint: &str,
        timeout: Duration,
    ) -> Result<String, BrowserError> {
        let deadline = Instant::now() + timeout;
        loop {
            self.ensure_open()?;
            let page = self.snapshot().await;
            if let Some(text) = find_section_text(&page.html, selector_hint) {
                return Ok(text);
            }
            if Instant::now() + self.poll_interval >= deadline {
                return Err(BrowserError::Timeout {
                    what: format!("section '{}'", selector_hint),
                    after: timeout,
                });
            }
            tokio::time::sleep(self.poll_interval).await;
            if let Err(e) = self.reload().await {
                tracing::debug!("Reload while waiting for section failed: {}", e);
            }
        }
    }

    async fn close(&self) -> Result<(), BrowserError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(BrowserError::Closed);
        }
        tracing::debug!("HTTP browser session closed");
        Ok(())
    }
}

fn describe_request_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "request timeout".to_string()
    } else if e.is_connect() {
        format!("connection refused: {}", e)
    } else {
        e.to_string()
    }
}

/// Returns the visible text of a document, one text node per line
fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    match Selector::parse("body") {
        Ok(body) => document
            .select(&body)
            .next()
            .map(element_text)
            .unwrap_or_default(),
        Err(_) => String::new(),
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Finds the innermost element whose text contains `label`
///
/// Elements that also contain a percentage are preferred, so the whole usage
/// card is returned instead of just its heading.
fn find_section_text(html: &str, label: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("body *").ok()?;
    let needle = label.to_lowercase();

    let mut best: Option<String> = None;
    let mut best_has_percent = false;

    for element in document.select(&selector) {
        let text = element_text(element);
        if !text.to_lowercase().contains(&needle) {
            continue;
        }
        let has_percent = text.contains('%');
        let better = match &best {
            None => true,
            Some(current) => {
                (has_percent && !best_has_percent)
                    || (has_percent == best_has_percent && text.len() < current.len())
            }
        };
        if better {
            best = Some(text);
            best_has_percent = has_percent;
        }
    }

    best
}
