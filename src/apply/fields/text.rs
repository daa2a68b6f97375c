use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

use super::{resolve_numeric, resolve_text, FieldProcessor, FillContext};
use crate::apply::form::{Control, FieldGroup};
use crate::models::FieldType;

const NUMERIC_HINTS: &[&str] = &["salary", "compensation", "how many years", "years of experience"];

pub struct TextProcessor;

fn wants_number(control: &Control, question: &str) -> bool {
    if control.input_type == "number" {
        return true;
    }
    if control.id.as_deref().is_some_and(|id| id.contains("numeric")) {
        return true;
    }
    let question = question.to_lowercase();
    control.tag != "textarea" && NUMERIC_HINTS.iter().any(|hint| question.contains(hint))
}

#[async_trait]
impl FieldProcessor for TextProcessor {
    fn name(&self) -> &'static str {
        "text"
    }

    fn claims(&self, group: &FieldGroup) -> bool {
        group.text_input().is_some()
    }

    async fn fill(&self, group: &FieldGroup, ctx: &mut FillContext<'_>) -> Result<()> {
        let control = group
            .text_input()
            .ok_or_else(|| anyhow!("no text control in '{}'", group.question))?;
        let input = control
            .selector()
            .ok_or_else(|| anyhow!("text control for '{}' has neither id nor name", group.question))?;

        let current = ctx.browser.value(&input).await.unwrap_or_default();
        if !current.trim().is_empty() {
            debug!(question = %group.question, "already filled");
            return Ok(());
        }

        let answer = if wants_number(control, &group.question) {
            resolve_numeric(ctx, &group.question).await?
        } else {
            let field_type = if control.tag == "textarea" {
                FieldType::Textarea
            } else {
                FieldType::Text
            };
            resolve_text(ctx, &group.question, field_type).await?
        };

        ctx.browser.type_text(&input, &answer).await?;
        let entered = ctx.browser.value(&input).await.unwrap_or_default();
        if entered.trim() != answer.trim() {
            warn!(question = %group.question, expected = %answer, entered = %entered, "page altered the entered text");
        }
        Ok(())
    }
}
