use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use crate::browser::Browser;
use crate::models::JobRecord;

pub const TILE_SELECTOR: &str = "li.scaffold-layout__list-item[data-occludable-job-id]";
const SITE_ROOT: &str = "https://www.linkedin.com";

const TITLE_SELECTORS: &[&str] = &["a.job-card-list__title--link", "a.job-card-container__link"];
const LINK_SELECTOR: &str = "a[href*='/jobs/view/']";
const SUBTITLE_SELECTOR: &str = "div.artdeco-entity-lockup__subtitle";
const COMPANY_FALLBACKS: &[&str] = &[
    "span.job-card-container__primary-description",
    ".job-card-container__company-name",
];
const LOCATION_FALLBACKS: &[&str] = &[
    "div.artdeco-entity-lockup__caption",
    "li.job-card-container__metadata-item",
];
const APPLY_METHOD_SELECTORS: &[&str] = &[
    "li.job-card-container__apply-method",
    "span.job-card-container__apply-method",
];
const STATE_SELECTOR: &str = "li.job-card-container__footer-job-state";

/// A result tile captured once, so parsing never races list re-rendering.
#[derive(Debug, Clone)]
pub struct TileHandle {
    pub index: usize,
    pub html: String,
}

pub struct Extractor {
    browser: Arc<dyn Browser>,
}

impl Extractor {
    pub fn new(browser: Arc<dyn Browser>) -> Self {
        Self { browser }
    }

    pub async fn list_tiles(&self) -> Vec<TileHandle> {
        let count = match self.browser.count(TILE_SELECTOR).await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "could not count result tiles");
                return Vec::new();
            }
        };

        let mut tiles = Vec::with_capacity(count);
        for index in 0..count {
            match self.browser.outer_html(TILE_SELECTOR, index).await {
                Ok(html) => tiles.push(TileHandle { index, html }),
                Err(e) => debug!(index, error = %e, "tile vanished before snapshot"),
            }
        }
        tiles
    }

    /// Records for every parseable tile, in listing order.
    pub async fn extract(&self, search_term: &str, search_location: &str) -> Vec<JobRecord> {
        self.list_tiles()
            .await
            .iter()
            .filter_map(|tile| {
                let job = parse(tile, search_term, search_location);
                if job.is_none() {
                    debug!(index = tile.index, "dropping tile without title or link");
                }
                job
            })
            .collect()
    }
}

/// Parses a tile snapshot. Returns None when the title or link is missing.
pub fn parse(tile: &TileHandle, search_term: &str, search_location: &str) -> Option<JobRecord> {
    let fragment = Html::parse_fragment(&tile.html);
    let root = fragment.root_element();

    let title = TITLE_SELECTORS
        .iter()
        .find_map(|css| first_text(&root, css))
        .or_else(|| first_text(&root, LINK_SELECTOR))
        .map(|t| collapse_duplicate(&t))?;

    let href = first_attr(&root, LINK_SELECTOR, "href")?;
    let link = canonical_link(&href)?;

    let (mut company, mut location) = match first_text(&root, SUBTITLE_SELECTOR) {
        Some(subtitle) => split_subtitle(&subtitle),
        None => (String::new(), String::new()),
    };
    if company.is_empty() {
        company = COMPANY_FALLBACKS
            .iter()
            .find_map(|css| first_text(&root, css))
            .unwrap_or_default();
    }
    if location.is_empty() {
        location = LOCATION_FALLBACKS
            .iter()
            .find_map(|css| first_text(&root, css))
            .unwrap_or_default();
    }

    Some(JobRecord {
        title,
        company,
        location,
        link,
        apply_affordance: apply_affordance(&root),
        state_badge: first_text(&root, STATE_SELECTOR),
        search_term: search_term.to_string(),
        search_location: search_location.to_string(),
        ..JobRecord::default()
    })
}

fn first_element<'a>(root: &ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    root.select(&selector).next()
}

fn first_text(root: &ElementRef<'_>, css: &str) -> Option<String> {
    let element = first_element(root, css)?;
    let text = clean_text(&element.text().collect::<Vec<_>>().join(" "));
    (!text.is_empty()).then_some(text)
}

fn first_attr(root: &ElementRef<'_>, css: &str, attr: &str) -> Option<String> {
    first_element(root, css)?
        .value()
        .attr(attr)
        .map(str::to_string)
}

fn clean_text(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collapses a title rendered twice back to back, e.g. "Rust EngineerRust Engineer".
pub fn collapse_duplicate(s: &str) -> String {
    let s = s.trim();
    let half = s.len() / 2;
    if s.len() % 2 == 0 && s.is_char_boundary(half) && !s.is_empty() {
        let (a, b) = s.split_at(half);
        if a == b {
            return a.trim().to_string();
        }
    }
    // the visually-hidden copy is often separated by whitespace
    let words: Vec<&str> = s.split_whitespace().collect();
    if words.len() % 2 == 0 && !words.is_empty() {
        let (a, b) = words.split_at(words.len() / 2);
        if a == b {
            return a.join(" ");
        }
    }
    s.to_string()
}

/// Absolute job URL without tracking query or fragment.
pub fn canonical_link(href: &str) -> Option<String> {
    let base = Url::parse(SITE_ROOT).ok()?;
    let mut url = base.join(href.trim()).ok()?;
    url.set_query(None);
    url.set_fragment(None);
    Some(url.to_string())
}

fn split_subtitle(subtitle: &str) -> (String, String) {
    let mut parts = subtitle.split('·').map(|p| clean_text(p));
    let company = parts.next().unwrap_or_default();
    let location = parts.next().unwrap_or_default();
    (company, location)
}

fn apply_affordance(root: &ElementRef<'_>) -> Option<String> {
    for css in APPLY_METHOD_SELECTORS {
        if let Some(text) = first_text(root, css) {
            return Some(text);
        }
    }
    let all_text = root.text().collect::<Vec<_>>().join(" ").to_lowercase();
    all_text
        .contains("easy apply")
        .then(|| "Easy Apply".to_string())
}
