use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::form_urlencoded;

use crate::browser::{any_displayed, capture_screenshot, exists, Browser};
use crate::config::SearchCriteria;
use crate::extractor::TILE_SELECTOR;
use crate::wait::{backoff_delay, Waiter};

pub const SEARCH_BASE: &str = "https://www.linkedin.com/jobs/search/";
pub const PAGE_SIZE: u32 = 25;
pub const MAX_NAV_ATTEMPTS: u32 = 3;
pub const MAX_TILE_RETRIES: u32 = 2;
pub const MAX_CONSECUTIVE_SCROLL_FAILURES: u32 = 5;

pub const NO_RESULTS_SELECTOR: &str = ".jobs-search-no-results-banner";
const LOADER_SELECTOR: &str = ".artdeco-loader";

const NAV_BACKOFF_BASE: Duration = Duration::from_secs(1);
const TILE_SETTLE: Duration = Duration::from_millis(200);
const LOADER_TIMEOUT: Duration = Duration::from_secs(3);

const WORLDWIDE_GEO_ID: &str = "92000000";
const UNITED_STATES_GEO_ID: &str = "103644278";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLoad {
    Results,
    NoResults,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrollReport {
    pub visited: usize,
    pub skipped: usize,
    pub aborted: bool,
}

/// Search URL for one page of results. Parameter order is fixed so the same
/// inputs always give the same URL.
pub fn build_search_url(criteria: &SearchCriteria, position: &str, location: &str, page: u32) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());

    if criteria.remote {
        query.append_pair("f_CF", "f_WRA");
    }

    let levels: Vec<String> = criteria
        .experience_level
        .ordered()
        .iter()
        .enumerate()
        .filter(|(_, on)| **on)
        .map(|(i, _)| (i + 1).to_string())
        .collect();
    if !levels.is_empty() {
        query.append_pair("f_E", &levels.join(","));
    }

    query.append_pair("distance", &criteria.distance.to_string());

    let types: Vec<String> = criteria
        .job_types
        .codes()
        .into_iter()
        .map(String::from)
        .collect();
    if !types.is_empty() {
        query.append_pair("f_JT", &types.join(","));
    }

    if let Some(window) = criteria.date.tpr_value() {
        query.append_pair("f_TPR", window);
    }

    query.append_pair("f_LF", "f_AL");
    query.append_pair("keywords", position);

    match location.trim() {
        "Worldwide" => query.append_pair("geoId", WORLDWIDE_GEO_ID),
        "United States" => query.append_pair("geoId", UNITED_STATES_GEO_ID),
        other => query.append_pair("location", other),
    };

    query.append_pair("start", &(page * PAGE_SIZE).to_string());

    format!("{}?{}", SEARCH_BASE, query.finish())
}

pub struct Navigator {
    browser: Arc<dyn Browser>,
    waiter: Waiter,
    output_dir: PathBuf,
}

impl Navigator {
    pub fn new(browser: Arc<dyn Browser>, waiter: Waiter, output_dir: PathBuf) -> Self {
        Self {
            browser,
            waiter,
            output_dir,
        }
    }

    /// Loads a results page, retrying with backoff. Never raises: exhausting
    /// the attempts yields `PageLoad::Failed`.
    pub async fn go_to_page(&self, url: &str) -> PageLoad {
        for attempt in 1..=MAX_NAV_ATTEMPTS {
            match self.browser.goto(url).await {
                Ok(()) => {
                    if let Some(state) = self.waiter.until(|| self.probe_page()).await {
                        debug!(url, ?state, "page loaded");
                        return state;
                    }
                    warn!(url, attempt, "results did not appear in time");
                }
                Err(e) => warn!(url, attempt, error = %e, "navigation failed"),
            }

            capture_screenshot(self.browser.as_ref(), &self.output_dir, "navigation_failed").await;
            if attempt < MAX_NAV_ATTEMPTS {
                self.waiter.pause(backoff_delay(NAV_BACKOFF_BASE, attempt)).await;
            }
        }
        PageLoad::Failed
    }

    async fn probe_page(&self) -> Option<PageLoad> {
        if exists(self.browser.as_ref(), NO_RESULTS_SELECTOR).await {
            return Some(PageLoad::NoResults);
        }
        if exists(self.browser.as_ref(), TILE_SELECTOR).await {
            return Some(PageLoad::Results);
        }
        None
    }

    async fn loader_gone(&self) -> Option<()> {
        (!any_displayed(self.browser.as_ref(), LOADER_SELECTOR).await).then_some(())
    }

    /// Brings each tile into view one by one so lazily rendered tiles fill in.
    pub async fn scroll_tiles(&self) -> ScrollReport {
        let mut report = ScrollReport::default();
        let mut total = self.browser.count(TILE_SELECTOR).await.unwrap_or(0);
        let mut index = 0;
        let mut tile_failures = 0;
        let mut consecutive_failures = 0;

        while index < total {
            match self.browser.scroll_into_view(TILE_SELECTOR, index).await {
                Ok(()) => {
                    consecutive_failures = 0;
                    tile_failures = 0;
                    self.waiter
                        .with_timeout(LOADER_TIMEOUT)
                        .until(|| self.loader_gone())
                        .await;
                    self.waiter.pause(TILE_SETTLE).await;
                    report.visited += 1;
                    index += 1;
                    if let Ok(n) = self.browser.count(TILE_SELECTOR).await {
                        total = n;
                    }
                }
                Err(e) => {
                    consecutive_failures += 1;
                    tile_failures += 1;
                    debug!(index, error = %e, "tile scroll failed");
                    if consecutive_failures >= MAX_CONSECUTIVE_SCROLL_FAILURES {
                        warn!(index, "too many scroll failures, stopping scroll");
                        report.aborted = true;
                        break;
                    }
                    if tile_failures > MAX_TILE_RETRIES {
                        report.skipped += 1;
                        index += 1;
                        tile_failures = 0;
                    } else {
                        self.waiter.pause(TILE_SETTLE).await;
                    }
                }
            }
        }

        info!(visited = report.visited, skipped = report.skipped, "scrolled results");
        report
    }
}
