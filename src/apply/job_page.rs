use anyhow::{bail, Result};
use regex::Regex;
use scraper::{Html, Selector};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::browser::{any_displayed, capture_screenshot, exists, Browser};
use crate::models::JobRecord;
use crate::wait::Waiter;

pub const MAX_REDIRECT_ATTEMPTS: u32 = 3;
pub const MAX_DESCRIPTION_ATTEMPTS: u32 = 3;

const PREMIUM_MARKER: &str = "linkedin.com/premium";
const SEE_MORE_SELECTORS: &[&str] = &[
    "button[aria-label='Click to see more description']",
    "button.jobs-description__footer-button",
];
const DESCRIPTION_SELECTORS: &[&str] = &[
    ".jobs-description-content__text",
    ".jobs-box__html-content",
    "div#job-details",
    ".jobs-description article",
];
const SALARY_SELECTOR: &str = "li.job-insight--highlight span[dir='ltr']";
const RECRUITER_SELECTOR: &str = ".job-details-module a[href*='linkedin.com/in/'], .hirer-card__hirer-information a[href*='linkedin.com/in/']";
const TOP_CARD_SELECTORS: &[&str] = &[
    ".job-details-jobs-unified-top-card__primary-description-container",
    ".job-details-jobs-unified-top-card__tertiary-description-container",
    ".jobs-unified-top-card__subtitle-primary-grouping",
];
const EXPAND_SETTLE: Duration = Duration::from_secs(1);
const REFRESH_SETTLE: Duration = Duration::from_secs(2);

static APPLICANTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d[\d,]*)\+?\s+(?:applicants|people clicked apply)").unwrap());

/// Applicant count shown in the top card, if any.
pub fn parse_applicants(text: &str) -> Option<u32> {
    let caps = APPLICANTS.captures(text)?;
    caps[1].replace(',', "").parse().ok()
}

fn href_of(html: &str) -> Option<String> {
    let fragment = Html::parse_fragment(html);
    let selector = Selector::parse("a").ok()?;
    let href = fragment.select(&selector).next()?.value().attr("href")?;
    Some(href.split('?').next().unwrap_or(href).to_string())
}

/// Opens a job's detail page and fills in what the tile could not show.
pub struct JobPage<'a> {
    browser: &'a dyn Browser,
    waiter: Waiter,
    output_dir: &'a Path,
}

impl<'a> JobPage<'a> {
    pub fn new(browser: &'a dyn Browser, waiter: Waiter, output_dir: &'a Path) -> Self {
        Self {
            browser,
            waiter,
            output_dir,
        }
    }

    pub async fn open(&self, job: &mut JobRecord) -> Result<()> {
        self.navigate(&job.link).await?;

        job.description = Some(self.description().await);
        job.salary_text = self.salary().await;
        job.recruiter_link = self.recruiter().await;
        if job.applicants.is_none() {
            job.applicants = self.applicants().await;
        }
        info!(
            title = %job.title,
            company = %job.company,
            applicants = ?job.applicants,
            salary = ?job.salary_text,
            "job page read"
        );
        Ok(())
    }

    /// Loads the job link, going back whenever the site bounces to a premium upsell.
    async fn navigate(&self, link: &str) -> Result<()> {
        self.browser.goto(link).await?;
        for attempt in 1..=MAX_REDIRECT_ATTEMPTS {
            let url = self.browser.current_url().await?;
            if !url.contains(PREMIUM_MARKER) {
                return Ok(());
            }
            warn!(link, attempt, "redirected to premium page, going back");
            self.browser.goto(link).await?;
        }
        if self.browser.current_url().await?.contains(PREMIUM_MARKER) {
            capture_screenshot(self.browser, self.output_dir, "premium_redirect").await;
            bail!("stuck on premium page after {} attempts", MAX_REDIRECT_ATTEMPTS);
        }
        Ok(())
    }

    async fn expand_description(&self) {
        for css in SEE_MORE_SELECTORS {
            if any_displayed(self.browser, css).await {
                match self.browser.click(css, 0).await {
                    Ok(()) => {
                        self.waiter.pause(EXPAND_SETTLE).await;
                        return;
                    }
                    Err(e) => debug!(css, error = %e, "could not expand description"),
                }
            }
        }
    }

    async fn read_description(&self) -> Option<String> {
        for css in DESCRIPTION_SELECTORS {
            let count = self.browser.count(css).await.unwrap_or(0);
            for index in 0..count {
                if let Ok(text) = self.browser.text(css, index).await {
                    let text = text.trim();
                    if !text.is_empty() {
                        return Some(text.to_string());
                    }
                }
            }
        }
        None
    }

    /// Description text, refreshing between attempts. Empty when the page
    /// never shows one.
    pub async fn description(&self) -> String {
        for attempt in 1..=MAX_DESCRIPTION_ATTEMPTS {
            self.expand_description().await;
            let browser = self.browser;
            let found = self
                .waiter
                .until(|| async move {
                    for css in DESCRIPTION_SELECTORS {
                        if exists(browser, css).await {
                            return Some(());
                        }
                    }
                    None
                })
                .await;
            if found.is_some() {
                if let Some(text) = self.read_description().await {
                    return text;
                }
            }
            warn!(attempt, "job description not found");
            if attempt < MAX_DESCRIPTION_ATTEMPTS {
                if let Err(e) = self.browser.refresh().await {
                    warn!(error = %e, "refresh failed");
                }
                self.waiter.pause(REFRESH_SETTLE).await;
            }
        }
        capture_screenshot(self.browser, self.output_dir, "job_description_missing").await;
        String::new()
    }

    async fn salary(&self) -> Option<String> {
        let text = self.browser.text(SALARY_SELECTOR, 0).await.ok()?;
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }

    async fn recruiter(&self) -> Option<String> {
        let html = self.browser.outer_html(RECRUITER_SELECTOR, 0).await.ok()?;
        href_of(&html)
    }

    async fn applicants(&self) -> Option<u32> {
        for css in TOP_CARD_SELECTORS {
            if let Ok(text) = self.browser.text(css, 0).await {
                if let Some(n) = parse_applicants(&text) {
                    return Some(n);
                }
            }
        }
        None
    }
}
