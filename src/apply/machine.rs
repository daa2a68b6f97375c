use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::fields::{dispatch, FieldProcessor, FillContext, UploadProcessor};
use super::form::{
    inline_errors_in, parse_step, ActionKind, FormStep, MODAL_SELECTOR, PRIMARY_BUTTON_SELECTOR,
};
use crate::answerer::{AnswerBackend, BackendError};
use crate::answers::AnswerStore;
use crate::browser::{any_displayed, by_id, capture_screenshot, exists, texts, Browser, BrowserError};
use crate::documents::DocumentRenderer;
use crate::models::{ApplyOutcome, JobRecord};
use crate::wait::Waiter;

pub const MAX_FORM_FILL_ATTEMPTS: u32 = 10;
pub const MAX_FORM_ERRORS_PER_JOB: u32 = 2;
pub const MAX_TRIGGER_ATTEMPTS: u32 = 3;

pub const TRIGGER_SELECTOR: &str = "button.jobs-apply-button[aria-label*='Easy Apply']";
pub const DISMISS_SELECTOR: &str = ".artdeco-modal__dismiss";
pub const DISCARD_CONFIRM_SELECTOR: &str =
    "button[data-control-name='discard_application_confirm_btn'], .artdeco-modal__confirm-dialog-btn";
const MODAL_BUTTON_SELECTOR: &str = ".artdeco-modal button";
const FOLLOW_CHECKBOX_ID: &str = "follow-company-checkbox";
const FOLLOW_LABEL_SELECTOR: &str = "label[for='follow-company-checkbox']";

const STEP_SETTLE: Duration = Duration::from_secs(1);
const REFRESH_SETTLE: Duration = Duration::from_secs(2);
const DIALOG_TIMEOUT: Duration = Duration::from_secs(3);

/// Result of one pass over the current form step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Continue,
    Submitted,
    Abandoned(String),
}

/// Why a step failed. Each failure counts against the job's error budget.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("validation errors: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("step has no primary button")]
    NoPrimaryButton,

    #[error("unrecognized primary button '{0}'")]
    UnknownAction(String),

    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error("answer backend failed: {0:#}")]
    Backend(anyhow::Error),
}

/// Drives the Easy Apply modal from its trigger button to submission,
/// bounded in steps and in errors.
pub struct FormStateMachine<'a> {
    pub browser: &'a dyn Browser,
    pub backend: &'a dyn AnswerBackend,
    pub renderer: &'a dyn DocumentRenderer,
    pub chain: &'a [Box<dyn FieldProcessor>],
    pub waiter: Waiter,
    pub output_dir: &'a Path,
    pub unfollow: bool,
}

impl FormStateMachine<'_> {
    pub async fn run(&self, job: &mut JobRecord, answers: &mut AnswerStore) -> ApplyOutcome {
        if let Err(reason) = self.open_form().await {
            capture_screenshot(self.browser, self.output_dir, "easy_apply_trigger_failed").await;
            return ApplyOutcome::Abandoned(reason);
        }

        let mut errors = 0;
        for attempt in 1..=MAX_FORM_FILL_ATTEMPTS {
            match self.step(job, answers).await {
                Ok(StepOutcome::Continue) => debug!(attempt, "advanced to next step"),
                Ok(StepOutcome::Submitted) => {
                    info!(title = %job.title, company = %job.company, "application submitted");
                    return ApplyOutcome::Submitted;
                }
                Ok(StepOutcome::Abandoned(reason)) => {
                    self.discard().await;
                    return ApplyOutcome::Abandoned(reason);
                }
                Err(e) => {
                    errors += 1;
                    warn!(attempt, errors, error = %e, "form step failed");
                    capture_screenshot(self.browser, self.output_dir, "form_step_failed").await;
                    if errors >= MAX_FORM_ERRORS_PER_JOB {
                        self.discard().await;
                        return ApplyOutcome::Abandoned(format!("form step failed {} times, last: {}", errors, e));
                    }
                }
            }
        }

        self.discard().await;
        ApplyOutcome::Abandoned(format!("form not finished within {} steps", MAX_FORM_FILL_ATTEMPTS))
    }

    // --- Trigger ---

    async fn open_form(&self) -> Result<(), String> {
        for attempt in 1..=MAX_TRIGGER_ATTEMPTS {
            let count = self.browser.count(TRIGGER_SELECTOR).await.unwrap_or(0);
            for index in 0..count {
                if !self.browser.is_displayed(TRIGGER_SELECTOR, index).await.unwrap_or(false) {
                    continue;
                }
                if let Err(e) = self.browser.click(TRIGGER_SELECTOR, index).await {
                    debug!(index, error = %e, "trigger click failed");
                    continue;
                }
                if self.wait_for_modal().await {
                    self.pass_safety_reminder().await;
                    return Ok(());
                }
            }

            warn!(attempt, "Easy Apply form did not open");
            if attempt < MAX_TRIGGER_ATTEMPTS {
                if let Err(e) = self.browser.refresh().await {
                    warn!(error = %e, "refresh failed");
                }
                self.waiter.pause(REFRESH_SETTLE).await;
            }
        }
        Err(format!("Easy Apply form did not open after {} attempts", MAX_TRIGGER_ATTEMPTS))
    }

    async fn wait_for_modal(&self) -> bool {
        let browser = self.browser;
        self.waiter
            .until(|| async move { any_displayed(browser, MODAL_SELECTOR).await.then_some(()) })
            .await
            .is_some()
    }

    /// Some postings show a safety notice before the form; continue past it.
    async fn pass_safety_reminder(&self) {
        let labels = texts(self.browser, MODAL_BUTTON_SELECTOR).await;
        let Some(index) = labels
            .iter()
            .position(|l| l.to_lowercase().contains("continue applying"))
        else {
            return;
        };
        debug!("dismissing job safety reminder");
        if let Err(e) = self.browser.click(MODAL_BUTTON_SELECTOR, index).await {
            warn!(error = %e, "could not pass safety reminder");
            return;
        }
        self.waiter.pause(STEP_SETTLE).await;
        self.wait_for_modal().await;
    }

    // --- Steps ---

    async fn step(&self, job: &mut JobRecord, answers: &mut AnswerStore) -> Result<StepOutcome, StepError> {
        let html = match self.browser.outer_html(MODAL_SELECTOR, 0).await {
            Ok(html) => html,
            Err(BrowserError::NotFound(_)) => {
                return Ok(StepOutcome::Abandoned("application form closed unexpectedly".to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let form = parse_step(&html);
        debug!(groups = form.groups.len(), review = form.is_review, "form step");

        if !form.is_review {
            self.fill(&form, job, answers).await?;
        }
        self.advance(&form).await
    }

    async fn fill(&self, form: &FormStep, job: &mut JobRecord, answers: &mut AnswerStore) -> Result<(), StepError> {
        let upload = UploadProcessor;
        let mut ctx = FillContext {
            browser: self.browser,
            backend: self.backend,
            renderer: self.renderer,
            answers,
            job,
            waiter: self.waiter,
        };

        for group in &form.groups {
            let result = if upload.claims(group) {
                upload.fill(group, &mut ctx).await
            } else {
                dispatch(self.chain, group, &mut ctx).await.map(|_| ())
            };
            if let Err(e) = result {
                if e.downcast_ref::<BackendError>().is_some() {
                    return Err(StepError::Backend(e));
                }
                warn!(question = %group.question, error = %format!("{:#}", e), "could not fill field");
            }
        }
        Ok(())
    }

    async fn advance(&self, form: &FormStep) -> Result<StepOutcome, StepError> {
        let primary = form.primary.as_ref().ok_or(StepError::NoPrimaryButton)?;
        match primary.kind {
            ActionKind::Submit => {
                if self.unfollow {
                    self.unfollow_company().await;
                }
                self.browser.click(PRIMARY_BUTTON_SELECTOR, primary.index).await?;

                let browser = self.browser;
                let sent = self
                    .waiter
                    .until(|| async move { (!submit_pending(browser).await).then_some(()) })
                    .await;
                if sent.is_none() {
                    let errors = self.visible_errors().await;
                    if !errors.is_empty() {
                        return Err(StepError::Validation(errors));
                    }
                    warn!("submit button still showing, treating application as sent");
                }
                self.close_confirmation().await;
                Ok(StepOutcome::Submitted)
            }
            ActionKind::Next | ActionKind::Review => {
                self.browser.click(PRIMARY_BUTTON_SELECTOR, primary.index).await?;
                self.waiter.pause(STEP_SETTLE).await;
                let errors = self.visible_errors().await;
                if !errors.is_empty() {
                    return Err(StepError::Validation(errors));
                }
                Ok(StepOutcome::Continue)
            }
            ActionKind::Unknown => Err(StepError::UnknownAction(primary.label.clone())),
        }
    }

    async fn visible_errors(&self) -> Vec<String> {
        match self.browser.outer_html(MODAL_SELECTOR, 0).await {
            Ok(html) => inline_errors_in(&html),
            Err(_) => Vec::new(),
        }
    }

    async fn unfollow_company(&self) {
        if let Ok(true) = self.browser.is_selected(&by_id(FOLLOW_CHECKBOX_ID)).await {
            match self.browser.click(FOLLOW_LABEL_SELECTOR, 0).await {
                Ok(()) => debug!("unfollowed company"),
                Err(e) => warn!(error = %e, "could not unfollow company"),
            }
        }
    }

    async fn close_confirmation(&self) {
        if exists(self.browser, DISMISS_SELECTOR).await {
            if let Err(e) = self.browser.click(DISMISS_SELECTOR, 0).await {
                debug!(error = %e, "could not close confirmation");
            }
        }
    }

    // --- Abandon ---

    /// Closes the modal and confirms discarding the draft. Best effort.
    async fn discard(&self) {
        capture_screenshot(self.browser, self.output_dir, "application_abandoned").await;
        if !exists(self.browser, DISMISS_SELECTOR).await {
            return;
        }
        if let Err(e) = self.browser.click(DISMISS_SELECTOR, 0).await {
            warn!(error = %e, "could not close application form");
            return;
        }

        let browser = self.browser;
        let confirm = self
            .waiter
            .with_timeout(DIALOG_TIMEOUT)
            .until(|| async move { exists(browser, DISCARD_CONFIRM_SELECTOR).await.then_some(()) })
            .await;
        if confirm.is_none() {
            return;
        }
        let labels = texts(self.browser, DISCARD_CONFIRM_SELECTOR).await;
        let index = labels
            .iter()
            .position(|l| l.to_lowercase().contains("discard"))
            .unwrap_or(0);
        if let Err(e) = self.browser.click(DISCARD_CONFIRM_SELECTOR, index).await {
            warn!(error = %e, "could not confirm discard");
        }
    }
}

async fn submit_pending(browser: &dyn Browser) -> bool {
    match browser.outer_html(MODAL_SELECTOR, 0).await {
        Ok(html) => parse_step(&html)
            .primary
            .is_some_and(|p| p.kind == ActionKind::Submit),
        Err(_) => false,
    }
}
