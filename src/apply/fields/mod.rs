//! Field processors fill one form grouping each.
//!
//! Every processor follows the same order: reuse a stored answer when one
//! fits, otherwise ask the backend, then persist what was actually entered
//! and confirm the page took it.

mod checkbox;
mod date;
mod dropdown;
mod radio;
mod text;
mod typeahead;
mod upload;

pub use checkbox::CheckboxProcessor;
pub use date::DateProcessor;
pub use dropdown::DropdownProcessor;
pub use radio::RadioProcessor;
pub use text::TextProcessor;
pub use typeahead::TypeaheadProcessor;
pub use upload::UploadProcessor;

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use super::form::FieldGroup;
use crate::answerer::{text_limit, truncate_chars, AnswerBackend};
use crate::answers::AnswerStore;
use crate::browser::Browser;
use crate::documents::DocumentRenderer;
use crate::models::{FieldType, JobRecord};
use crate::wait::Waiter;

/// How long a processor waits for the page to reflect what it entered.
pub const CONFIRM_TIMEOUT: Duration = Duration::from_secs(2);

pub struct FillContext<'a> {
    pub browser: &'a dyn Browser,
    pub backend: &'a dyn AnswerBackend,
    pub renderer: &'a dyn DocumentRenderer,
    pub answers: &'a mut AnswerStore,
    pub job: &'a mut JobRecord,
    pub waiter: Waiter,
}

impl FillContext<'_> {
    pub fn confirm_waiter(&self) -> Waiter {
        self.waiter.with_timeout(CONFIRM_TIMEOUT)
    }

    /// Polls until the control behind `css` reports selected.
    pub async fn wait_selected(&self, css: &str) -> bool {
        let browser = self.browser;
        self.confirm_waiter()
            .until(|| async move { browser.is_selected(css).await.ok().filter(|s| *s) })
            .await
            .is_some()
    }
}

#[async_trait]
pub trait FieldProcessor: Send + Sync {
    fn name(&self) -> &'static str;
    fn claims(&self, group: &FieldGroup) -> bool;
    async fn fill(&self, group: &FieldGroup, ctx: &mut FillContext<'_>) -> Result<()>;
}

/// Processors in the order they get to claim a grouping.
pub fn default_chain() -> Vec<Box<dyn FieldProcessor>> {
    vec![
        Box::new(TypeaheadProcessor),
        Box::new(CheckboxProcessor),
        Box::new(RadioProcessor),
        Box::new(TextProcessor),
        Box::new(DateProcessor),
        Box::new(DropdownProcessor),
    ]
}

/// Hands the grouping to the first processor that claims it. Returns the
/// processor's name, or None when nothing claimed the grouping.
pub async fn dispatch(
    chain: &[Box<dyn FieldProcessor>],
    group: &FieldGroup,
    ctx: &mut FillContext<'_>,
) -> Result<Option<&'static str>> {
    let Some(processor) = chain.iter().find(|p| p.claims(group)) else {
        debug!(question = %group.question, "no processor claims grouping");
        return Ok(None);
    };
    debug!(question = %group.question, processor = processor.name(), "filling");
    processor.fill(group, ctx).await?;
    Ok(Some(processor.name()))
}

fn matching_option<'a>(answer: &str, options: &'a [String]) -> Option<&'a String> {
    let answer = answer.trim().to_lowercase();
    options.iter().find(|o| o.trim().to_lowercase() == answer)
}

/// Picks one of `options` for the question. The stored answer wins if it is
/// still offered; otherwise the backend is asked. A reply that names no
/// offered option falls back to the first one, and the pick is persisted.
pub async fn resolve_choice(
    ctx: &mut FillContext<'_>,
    question: &str,
    field_type: FieldType,
    options: &[String],
) -> Result<String> {
    if options.is_empty() {
        bail!("no options offered for '{}'", question);
    }

    if let Some(stored) = ctx.answers.reusable(question, field_type) {
        if let Some(option) = matching_option(stored, options) {
            debug!(question, answer = %option, "reusing stored answer");
            return Ok(option.clone());
        }
        debug!(question, stored, "stored answer is no longer offered");
    }

    let reply = ctx.backend.answer_from_options(question, options).await?;
    let chosen = match matching_option(&reply, options) {
        Some(option) => option.clone(),
        None => {
            warn!(question, reply = %reply, fallback = %options[0], "reply matches no option, using first option");
            options[0].clone()
        }
    };
    ctx.answers.put(question, field_type, &chosen)?;
    Ok(chosen)
}

/// Free-text answer: stored if reusable, otherwise from the backend, cut to
/// the question's length budget.
pub async fn resolve_text(ctx: &mut FillContext<'_>, question: &str, field_type: FieldType) -> Result<String> {
    if let Some(stored) = ctx.answers.reusable(question, field_type) {
        if !stored.trim().is_empty() {
            return Ok(stored.to_string());
        }
    }
    let reply = ctx.backend.answer(question, &*ctx.job).await?;
    let mut answer = truncate_chars(reply.trim(), text_limit(question));
    if answer.is_empty() {
        answer = "N/A".to_string();
    }
    ctx.answers.put(question, field_type, &answer)?;
    Ok(answer)
}

pub async fn resolve_numeric(ctx: &mut FillContext<'_>, question: &str) -> Result<String> {
    if let Some(stored) = ctx.answers.reusable(question, FieldType::Numeric) {
        if stored.trim().parse::<f64>().is_ok() {
            return Ok(stored.trim().to_string());
        }
    }
    let answer = ctx.backend.answer_numeric(question).await?.to_string();
    ctx.answers.put(question, FieldType::Numeric, &answer)?;
    Ok(answer)
}
