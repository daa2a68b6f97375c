use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::apply::{record_outcome, JobApplication};
use crate::browser::Browser;
use crate::config::SearchCriteria;
use crate::db::Ledger;
use crate::extractor::Extractor;
use crate::filter::{FilterDecision, JobFilter};
use crate::models::{ApplyOutcome, JobRecord, SkipReason};
use crate::navigator::{build_search_url, Navigator, PageLoad};
use crate::outcomes::OutcomeLog;
use crate::wait::Waiter;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub searches: usize,
    pub pages: usize,
    pub listed: usize,
    pub filtered: usize,
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} searches, {} pages, {} listings: {} applied, {} skipped, {} failed, {} filtered",
            self.searches, self.pages, self.listed, self.applied, self.skipped, self.failed, self.filtered
        )
    }
}

/// Every (position, location) pair from the configured searches, shuffled so
/// repeated runs spread their attention.
pub fn search_pairs(criteria: &SearchCriteria) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = criteria
        .searches
        .iter()
        .flat_map(|term| {
            term.positions
                .iter()
                .map(move |position| (position.clone(), term.location.clone()))
        })
        .collect();
    pairs.shuffle(&mut rand::thread_rng());
    pairs
}

/// Runs the search, filter and apply pipeline over every configured search.
pub struct JobManager {
    navigator: Navigator,
    extractor: Extractor,
    filter: JobFilter,
    criteria: SearchCriteria,
    ledger: Arc<Ledger>,
    outcomes: OutcomeLog,
    applier: Box<dyn JobApplication>,
    handled: HashSet<String>,
    summary: RunSummary,
}

impl JobManager {
    pub fn new(
        browser: Arc<dyn Browser>,
        criteria: SearchCriteria,
        ledger: Arc<Ledger>,
        outcomes: OutcomeLog,
        applier: Box<dyn JobApplication>,
        waiter: Waiter,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            navigator: Navigator::new(browser.clone(), waiter, output_dir),
            extractor: Extractor::new(browser),
            filter: JobFilter::new(&criteria),
            criteria,
            ledger,
            outcomes,
            applier,
            handled: HashSet::new(),
            summary: RunSummary::default(),
        }
    }

    pub async fn run(&mut self) -> RunSummary {
        let pairs = search_pairs(&self.criteria);
        info!(searches = pairs.len(), "starting run");
        for (position, location) in pairs {
            self.run_search(&position, &location).await;
        }
        info!(summary = %self.summary, "run finished");
        self.summary.clone()
    }

    async fn run_search(&mut self, position: &str, location: &str) {
        self.summary.searches += 1;
        for page in 0..self.criteria.max_pages {
            let url = build_search_url(&self.criteria, position, location, page);
            info!(position, location, page, "opening results page");

            match self.navigator.go_to_page(&url).await {
                PageLoad::Results => {}
                PageLoad::NoResults => {
                    info!(position, location, page, "no more results");
                    return;
                }
                PageLoad::Failed => {
                    warn!(position, location, page, "results page failed to load, moving on");
                    return;
                }
            }

            self.navigator.scroll_tiles().await;
            let jobs = self.extractor.extract(position, location).await;
            if jobs.is_empty() {
                info!(position, location, page, "page had no readable listings");
                return;
            }
            self.summary.pages += 1;
            self.summary.listed += jobs.len();

            for job in jobs {
                self.handle_job(job).await;
            }
        }
    }

    /// Takes one listing to a terminal outcome. Errors stop at this boundary:
    /// they are logged, recorded as failures, and the run continues.
    pub async fn handle_job(&mut self, mut job: JobRecord) -> Option<ApplyOutcome> {
        if !self.handled.insert(job.link.clone()) {
            debug!(link = %job.link, "already handled in this run");
            return None;
        }

        match self.filter.decide(&job, &self.ledger) {
            FilterDecision::Proceed => {}
            FilterDecision::Skip(SkipReason::AlreadyProcessed) => {
                self.summary.filtered += 1;
                return None;
            }
            FilterDecision::Skip(reason) => {
                info!(title = %job.title, company = %job.company, %reason, "filtered");
                self.summary.filtered += 1;
                let outcome = ApplyOutcome::Skipped(reason);
                self.log_outcome(&job, &outcome);
                return Some(outcome);
            }
        }

        let outcome = match self.applier.apply(&mut job).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(link = %job.link, error = %format!("{:#}", e), "application failed");
                ApplyOutcome::Abandoned(format!("{:#}", e))
            }
        };

        record_outcome(&self.ledger, &job.link, &outcome);
        self.log_outcome(&job, &outcome);
        match &outcome {
            ApplyOutcome::Submitted => self.summary.applied += 1,
            ApplyOutcome::Skipped(_) => self.summary.skipped += 1,
            ApplyOutcome::Abandoned(_) => self.summary.failed += 1,
        }
        Some(outcome)
    }

    fn log_outcome(&self, job: &JobRecord, outcome: &ApplyOutcome) {
        if let Err(e) = self.outcomes.record(job, outcome) {
            warn!(link = %job.link, error = %e, "could not write outcome log");
        }
    }
}
