use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Local;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thirtyfour::components::SelectElement;
use thirtyfour::prelude::*;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("no element matches '{0}'")]
    NotFound(String),

    #[error("element '{0}' went stale")]
    Stale(String),

    #[error("timed out waiting for '{0}'")]
    Timeout(String),

    #[error("webdriver error: {0}")]
    Driver(String),
}

impl BrowserError {
    /// Whether retrying the same operation after a short wait may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, BrowserError::Stale(_) | BrowserError::NotFound(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPress {
    ArrowDown,
    Enter,
}

/// The DOM operations the pipeline needs from a browser session.
///
/// Elements are addressed by CSS selector plus the index of the match in
/// document order, so callers never hold live element handles across waits.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), BrowserError>;
    async fn current_url(&self) -> Result<String, BrowserError>;
    async fn refresh(&self) -> Result<(), BrowserError>;

    async fn count(&self, css: &str) -> Result<usize, BrowserError>;
    async fn outer_html(&self, css: &str, index: usize) -> Result<String, BrowserError>;
    async fn text(&self, css: &str, index: usize) -> Result<String, BrowserError>;
    async fn is_displayed(&self, css: &str, index: usize) -> Result<bool, BrowserError>;

    async fn click(&self, css: &str, index: usize) -> Result<(), BrowserError>;
    async fn scroll_into_view(&self, css: &str, index: usize) -> Result<(), BrowserError>;

    /// Clears the control and types `text` into it.
    async fn type_text(&self, css: &str, text: &str) -> Result<(), BrowserError>;
    async fn press_key(&self, css: &str, key: KeyPress) -> Result<(), BrowserError>;
    async fn value(&self, css: &str) -> Result<String, BrowserError>;
    async fn is_selected(&self, css: &str) -> Result<bool, BrowserError>;

    async fn select_by_text(&self, css: &str, text: &str) -> Result<(), BrowserError>;
    async fn selected_text(&self, css: &str) -> Result<String, BrowserError>;

    async fn upload(&self, css: &str, path: &Path) -> Result<(), BrowserError>;
    async fn screenshot(&self, path: &Path) -> Result<(), BrowserError>;
}

/// Convenience probes built on the core operations.
pub async fn exists(browser: &dyn Browser, css: &str) -> bool {
    matches!(browser.count(css).await, Ok(n) if n > 0)
}

pub async fn any_displayed(browser: &dyn Browser, css: &str) -> bool {
    let count = browser.count(css).await.unwrap_or(0);
    for index in 0..count {
        if let Ok(true) = browser.is_displayed(css, index).await {
            return true;
        }
    }
    false
}

pub async fn texts(browser: &dyn Browser, css: &str) -> Vec<String> {
    let count = browser.count(css).await.unwrap_or(0);
    let mut out = Vec::with_capacity(count);
    for index in 0..count {
        if let Ok(text) = browser.text(css, index).await {
            out.push(text.trim().to_string());
        }
    }
    out
}

/// Selector matching an element by id without CSS escaping concerns.
pub fn by_id(id: &str) -> String {
    format!("[id=\"{}\"]", id.replace('"', "\\\""))
}

static UNSAFE_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\-]").unwrap());

/// Saves a diagnostic screenshot and returns where it went. Never fails the caller.
pub async fn capture_screenshot(browser: &dyn Browser, dir: &Path, prefix: &str) -> Option<PathBuf> {
    let folder = dir.join("screenshots");
    if let Err(e) = std::fs::create_dir_all(&folder) {
        warn!(error = %e, "could not create screenshot folder");
        return None;
    }
    let prefix = UNSAFE_PREFIX.replace_all(prefix, "_");
    let stamp = Local::now().format("%Y%m%d_%H%M%S_%6f");
    let path = folder.join(format!("{}_{}.png", prefix, stamp));
    match browser.screenshot(&path).await {
        Ok(()) => {
            debug!(path = %path.display(), "screenshot saved");
            Some(path)
        }
        Err(e) => {
            warn!(error = %e, "screenshot failed");
            None
        }
    }
}

// --- WebDriver implementation ---

/// A Chrome session driven over WebDriver. Expects a running chromedriver and a
/// profile that is already logged in.
pub struct WebDriverBrowser {
    driver: WebDriver,
}

impl WebDriverBrowser {
    pub async fn connect(server_url: &str, profile_dir: Option<&Path>, headless: bool) -> Result<Self> {
        let mut caps = DesiredCapabilities::chrome();
        if let Some(dir) = profile_dir {
            caps.add_arg(&format!("--user-data-dir={}", dir.display()))?;
        }
        if headless {
            caps.add_arg("--headless=new")?;
        }
        caps.add_arg("--window-size=1400,1000")?;
        caps.add_arg("--disable-blink-features=AutomationControlled")?;

        let driver = WebDriver::new(server_url, caps)
            .await
            .with_context(|| format!("Failed to connect to WebDriver at {}. Is chromedriver running?", server_url))?;
        Ok(Self { driver })
    }

    pub async fn quit(self) -> Result<()> {
        self.driver.quit().await?;
        Ok(())
    }

    async fn nth(&self, css: &str, index: usize) -> Result<WebElement, BrowserError> {
        let elements = self
            .driver
            .find_all(By::Css(css))
            .await
            .map_err(|e| classify(css, e))?;
        elements
            .into_iter()
            .nth(index)
            .ok_or_else(|| BrowserError::NotFound(css.to_string()))
    }
}

fn classify(css: &str, err: WebDriverError) -> BrowserError {
    let message = err.to_string();
    let lower = message.to_lowercase();
    if lower.contains("stale element") {
        BrowserError::Stale(css.to_string())
    } else if lower.contains("no such element") {
        BrowserError::NotFound(css.to_string())
    } else if lower.contains("timeout") || lower.contains("timed out") {
        BrowserError::Timeout(css.to_string())
    } else {
        BrowserError::Driver(message)
    }
}

#[async_trait]
impl Browser for WebDriverBrowser {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        self.driver.goto(url).await.map_err(|e| classify(url, e))
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        let url = self.driver.current_url().await.map_err(|e| classify("url", e))?;
        Ok(url.to_string())
    }

    async fn refresh(&self) -> Result<(), BrowserError> {
        self.driver.refresh().await.map_err(|e| classify("refresh", e))
    }

    async fn count(&self, css: &str) -> Result<usize, BrowserError> {
        let elements = self
            .driver
            .find_all(By::Css(css))
            .await
            .map_err(|e| classify(css, e))?;
        Ok(elements.len())
    }

    async fn outer_html(&self, css: &str, index: usize) -> Result<String, BrowserError> {
        let element = self.nth(css, index).await?;
        element.outer_html().await.map_err(|e| classify(css, e))
    }

    async fn text(&self, css: &str, index: usize) -> Result<String, BrowserError> {
        let element = self.nth(css, index).await?;
        element.text().await.map_err(|e| classify(css, e))
    }

    async fn is_displayed(&self, css: &str, index: usize) -> Result<bool, BrowserError> {
        let element = self.nth(css, index).await?;
        element.is_displayed().await.map_err(|e| classify(css, e))
    }

    async fn click(&self, css: &str, index: usize) -> Result<(), BrowserError> {
        let element = self.nth(css, index).await?;
        element.click().await.map_err(|e| classify(css, e))
    }

    async fn scroll_into_view(&self, css: &str, index: usize) -> Result<(), BrowserError> {
        let element = self.nth(css, index).await?;
        element.scroll_into_view().await.map_err(|e| classify(css, e))
    }

    async fn type_text(&self, css: &str, text: &str) -> Result<(), BrowserError> {
        let element = self.nth(css, 0).await?;
        element.clear().await.map_err(|e| classify(css, e))?;
        element.send_keys(text).await.map_err(|e| classify(css, e))
    }

    async fn press_key(&self, css: &str, key: KeyPress) -> Result<(), BrowserError> {
        let element = self.nth(css, 0).await?;
        let key = match key {
            KeyPress::ArrowDown => Key::Down,
            KeyPress::Enter => Key::Enter,
        };
        element.send_keys(key).await.map_err(|e| classify(css, e))
    }

    async fn value(&self, css: &str) -> Result<String, BrowserError> {
        let element = self.nth(css, 0).await?;
        let value = element.value().await.map_err(|e| classify(css, e))?;
        Ok(value.unwrap_or_default())
    }

    async fn is_selected(&self, css: &str) -> Result<bool, BrowserError> {
        let element = self.nth(css, 0).await?;
        element.is_selected().await.map_err(|e| classify(css, e))
    }

    async fn select_by_text(&self, css: &str, text: &str) -> Result<(), BrowserError> {
        let element = self.nth(css, 0).await?;
        let select = SelectElement::new(&element).await.map_err(|e| classify(css, e))?;
        select
            .select_by_visible_text(text)
            .await
            .map_err(|e| classify(css, e))
    }

    async fn selected_text(&self, css: &str) -> Result<String, BrowserError> {
        let element = self.nth(css, 0).await?;
        let select = SelectElement::new(&element).await.map_err(|e| classify(css, e))?;
        let option = select
            .first_selected_option()
            .await
            .map_err(|e| classify(css, e))?;
        let text = option.text().await.map_err(|e| classify(css, e))?;
        Ok(text.trim().to_string())
    }

    async fn upload(&self, css: &str, path: &Path) -> Result<(), BrowserError> {
        let element = self.nth(css, 0).await?;
        let absolute = std::fs::canonicalize(path)
            .map_err(|e| BrowserError::Driver(format!("cannot resolve {}: {}", path.display(), e)))?;
        element
            .send_keys(absolute.to_string_lossy().as_ref())
            .await
            .map_err(|e| classify(css, e))
    }

    async fn screenshot(&self, path: &Path) -> Result<(), BrowserError> {
        self.driver
            .screenshot(path)
            .await
            .map_err(|e| classify("screenshot", e))
    }
}
