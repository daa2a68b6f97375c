//! Applying to a single job: read its page, gate on score, salary and
//! applicant count, then drive the Easy Apply form.

pub mod fields;
pub mod form;
pub mod job_page;
pub mod machine;

use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::answerer::AnswerBackend;
use crate::answers::AnswerStore;
use crate::browser::Browser;
use crate::config::{ApplicantThresholds, ApplyConfig, SearchCriteria};
use crate::db::Ledger;
use crate::documents::DocumentRenderer;
use crate::filter::JobFilter;
use crate::models::{ApplyOutcome, JobRecord, SkipReason, StatusFlag};
use crate::wait::Waiter;

use fields::{default_chain, FieldProcessor};
use job_page::JobPage;
use machine::FormStateMachine;

/// Anything that can take a job to a terminal outcome. The orchestrator only
/// sees this seam.
#[async_trait]
pub trait JobApplication: Send {
    async fn apply(&mut self, job: &mut JobRecord) -> Result<ApplyOutcome>;
}

/// Ledger flags that record an outcome.
pub fn outcome_flags(outcome: &ApplyOutcome) -> Vec<StatusFlag> {
    match outcome {
        ApplyOutcome::Submitted => vec![StatusFlag::AppliedSuccess, StatusFlag::Seen],
        ApplyOutcome::Abandoned(_) => vec![StatusFlag::FailedApplication, StatusFlag::Seen],
        ApplyOutcome::Skipped(reason) => match reason {
            SkipReason::LowScore(_) => vec![StatusFlag::SkippedLowScore, StatusFlag::Seen],
            SkipReason::LowSalary(_) => vec![StatusFlag::SkippedLowSalary, StatusFlag::Seen],
            SkipReason::TitleBlacklist(_)
            | SkipReason::CompanyBlacklist(_)
            | SkipReason::DescriptionBlacklist(_) => {
                vec![StatusFlag::SkippedBlacklist, StatusFlag::Seen]
            }
            SkipReason::ApplicantCount(_) | SkipReason::InvalidApplyState(_) => vec![StatusFlag::Seen],
            SkipReason::AlreadyProcessed | SkipReason::DryRun => Vec::new(),
        },
    }
}

pub fn record_outcome(ledger: &Ledger, link: &str, outcome: &ApplyOutcome) {
    for flag in outcome_flags(outcome) {
        if let Err(e) = ledger.record_status(link, flag) {
            warn!(link, flag = flag.label(), error = %e, "could not record outcome");
        }
    }
}

/// The real applier: browser, answer backend, documents and the answer store.
pub struct Applier {
    browser: Arc<dyn Browser>,
    backend: Arc<dyn AnswerBackend>,
    renderer: Arc<dyn DocumentRenderer>,
    ledger: Arc<Ledger>,
    answers: AnswerStore,
    chain: Vec<Box<dyn FieldProcessor>>,
    filter: JobFilter,
    config: ApplyConfig,
    applicants: ApplicantThresholds,
    waiter: Waiter,
    output_dir: PathBuf,
    dry_run: bool,
}

impl Applier {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        browser: Arc<dyn Browser>,
        backend: Arc<dyn AnswerBackend>,
        renderer: Arc<dyn DocumentRenderer>,
        ledger: Arc<Ledger>,
        answers: AnswerStore,
        config: ApplyConfig,
        applicants: ApplicantThresholds,
        waiter: Waiter,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            browser,
            backend,
            renderer,
            ledger,
            answers,
            chain: default_chain(),
            filter: JobFilter::new(&SearchCriteria::default()),
            config,
            applicants,
            waiter,
            output_dir,
            dry_run: false,
        }
    }

    /// Stop after the gate: nothing is submitted.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Blacklist checked against the description once the job page is open.
    pub fn with_filter(mut self, filter: JobFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn answers(&self) -> &AnswerStore {
        &self.answers
    }

    /// Pre-form checks. Scores and salary estimates are computed at most once
    /// per link and cached in the ledger.
    pub async fn gate(&self, job: &mut JobRecord) -> Result<Option<SkipReason>> {
        if let Some(applicants) = job.applicants {
            if !self.applicants.admits(applicants) {
                return Ok(Some(SkipReason::ApplicantCount(applicants)));
            }
        }

        if self.config.use_job_score {
            let score = match job.score.or_else(|| self.ledger.cached_score(&job.link)) {
                Some(score) => score,
                None => {
                    let score = self.backend.score_job(job).await?;
                    if let Err(e) = self.ledger.record_score(&job.link, score) {
                        warn!(link = %job.link, error = %e, "could not cache score");
                    }
                    score
                }
            };
            job.score = Some(score);
            if score < self.config.min_score {
                return Ok(Some(SkipReason::LowScore(score)));
            }
        }

        if let Some(expected) = self.config.salary_expectation {
            let estimate = match job
                .salary_estimate
                .or_else(|| self.ledger.cached_salary(&job.link))
            {
                Some(estimate) => estimate,
                None => {
                    let estimate = self.backend.estimate_salary(job).await?;
                    if let Err(e) = self.ledger.record_salary(&job.link, estimate) {
                        warn!(link = %job.link, error = %e, "could not cache salary estimate");
                    }
                    estimate
                }
            };
            job.salary_estimate = Some(estimate);
            if estimate < expected {
                return Ok(Some(SkipReason::LowSalary(estimate)));
            }
        }

        Ok(None)
    }
}

#[async_trait]
impl JobApplication for Applier {
    async fn apply(&mut self, job: &mut JobRecord) -> Result<ApplyOutcome> {
        JobPage::new(self.browser.as_ref(), self.waiter, &self.output_dir)
            .open(job)
            .await?;

        if let Some(phrase) = self.filter.description_hit(job) {
            info!(title = %job.title, company = %job.company, %phrase, "description blacklisted");
            return Ok(ApplyOutcome::Skipped(SkipReason::DescriptionBlacklist(phrase)));
        }
        if let Some(reason) = self.gate(job).await? {
            info!(title = %job.title, company = %job.company, %reason, "skipping");
            return Ok(ApplyOutcome::Skipped(reason));
        }
        if self.dry_run {
            info!(title = %job.title, company = %job.company, score = ?job.score, "dry run, not applying");
            return Ok(ApplyOutcome::Skipped(SkipReason::DryRun));
        }

        let machine = FormStateMachine {
            browser: self.browser.as_ref(),
            backend: self.backend.as_ref(),
            renderer: self.renderer.as_ref(),
            chain: &self.chain,
            waiter: self.waiter,
            output_dir: &self.output_dir,
            unfollow: self.config.unfollow_companies,
        };
        Ok(machine.run(job, &mut self.answers).await)
    }
}
