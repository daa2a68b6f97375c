use std::collections::HashSet;
use tracing::{debug, warn};

use crate::config::SearchCriteria;
use crate::db::Ledger;
use crate::models::{JobRecord, SkipReason, StatusFlag};

/// Badges showing the job was already started outside this run.
const INVALID_BADGES: &[&str] = &["applied", "continue", "apply"];

#[derive(Debug, Clone, PartialEq)]
pub enum FilterDecision {
    Proceed,
    Skip(SkipReason),
}

impl FilterDecision {
    pub fn is_skip(&self) -> bool {
        matches!(self, FilterDecision::Skip(_))
    }
}

/// Decides whether a listing is worth opening. Checks run cheapest first and
/// the first hit wins.
pub struct JobFilter {
    title_words: HashSet<String>,
    companies: HashSet<String>,
    phrases: Vec<String>,
}

impl JobFilter {
    pub fn new(criteria: &SearchCriteria) -> Self {
        let lower = |items: &[String]| -> Vec<String> {
            items
                .iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        };
        Self {
            title_words: lower(&criteria.title_blacklist).into_iter().collect(),
            companies: lower(&criteria.company_blacklist).into_iter().collect(),
            phrases: lower(&criteria.description_blacklist),
        }
    }

    pub fn must_skip(&self, job: &JobRecord, ledger: &Ledger) -> bool {
        self.decide(job, ledger).is_skip()
    }

    pub fn decide(&self, job: &JobRecord, ledger: &Ledger) -> FilterDecision {
        if let Some(flag) = ledger.terminal_flag(&job.link) {
            debug!(link = %job.link, flag = flag.label(), "already in ledger");
            return FilterDecision::Skip(SkipReason::AlreadyProcessed);
        }

        if let Some(state) = invalid_apply_state(job) {
            mark(ledger, &job.link, &[StatusFlag::Seen]);
            return FilterDecision::Skip(SkipReason::InvalidApplyState(state));
        }

        let reason = self
            .title_hit(&job.title)
            .map(SkipReason::TitleBlacklist)
            .or_else(|| self.company_hit(&job.company).map(SkipReason::CompanyBlacklist))
            .or_else(|| self.description_hit(job).map(SkipReason::DescriptionBlacklist));

        match reason {
            Some(reason) => {
                debug!(link = %job.link, %reason, "blacklisted");
                mark(ledger, &job.link, &[StatusFlag::SkippedBlacklist, StatusFlag::Seen]);
                FilterDecision::Skip(reason)
            }
            None => FilterDecision::Proceed,
        }
    }

    fn title_hit(&self, title: &str) -> Option<String> {
        title
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .find(|word| self.title_words.contains(*word))
            .map(str::to_string)
    }

    fn company_hit(&self, company: &str) -> Option<String> {
        let company = company.trim().to_lowercase();
        self.companies.contains(&company).then_some(company)
    }

    /// Blacklisted phrase in the title or the fetched description. Tiles carry
    /// no description, so this runs again once the job page is read.
    pub fn description_hit(&self, job: &JobRecord) -> Option<String> {
        self.phrase_hit(&job.title, job.description_or_empty())
    }

    fn phrase_hit(&self, title: &str, description: &str) -> Option<String> {
        let haystack = format!("{} {}", title, description).to_lowercase();
        self.phrases
            .iter()
            .find(|phrase| haystack.contains(phrase.as_str()))
            .cloned()
    }
}

fn invalid_apply_state(job: &JobRecord) -> Option<String> {
    if let Some(badge) = job.state_badge.as_deref() {
        let lower = badge.trim().to_lowercase();
        if INVALID_BADGES.contains(&lower.as_str()) {
            return Some(badge.trim().to_string());
        }
    }
    if !job.is_easy_apply() {
        return job.apply_affordance.clone();
    }
    None
}

fn mark(ledger: &Ledger, link: &str, flags: &[StatusFlag]) {
    for flag in flags {
        if let Err(e) = ledger.record_status(link, *flag) {
            warn!(link, error = %e, "could not record filter decision");
        }
    }
}
