use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Local, NaiveDate};

use super::{FieldProcessor, FillContext};
use crate::apply::form::FieldGroup;
use crate::models::FieldType;

pub const DATE_FORMAT: &str = "%m/%d/%Y";

pub struct DateProcessor;

#[async_trait]
impl FieldProcessor for DateProcessor {
    fn name(&self) -> &'static str {
        "date"
    }

    fn claims(&self, group: &FieldGroup) -> bool {
        group.date_input().is_some()
    }

    async fn fill(&self, group: &FieldGroup, ctx: &mut FillContext<'_>) -> Result<()> {
        let control = group
            .date_input()
            .ok_or_else(|| anyhow!("no date control in '{}'", group.question))?;
        let input = control
            .selector()
            .ok_or_else(|| anyhow!("date control for '{}' has neither id nor name", group.question))?;

        let date = if group.question.to_lowercase().contains("today") {
            Local::now().date_naive()
        } else {
            let stored = ctx
                .answers
                .reusable(&group.question, FieldType::Date)
                .and_then(|s| NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok());
            match stored {
                Some(date) => date,
                None => {
                    let date = ctx.backend.answer_date(&group.question).await?;
                    ctx.answers
                        .put(&group.question, FieldType::Date, &date.format(DATE_FORMAT).to_string())?;
                    date
                }
            }
        };

        ctx.browser
            .type_text(&input, &date.format(DATE_FORMAT).to_string())
            .await?;
        Ok(())
    }
}
