use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use super::{resolve_choice, FieldProcessor, FillContext};
use crate::apply::form::FieldGroup;
use crate::models::FieldType;

pub struct DropdownProcessor;

#[async_trait]
impl FieldProcessor for DropdownProcessor {
    fn name(&self) -> &'static str {
        "dropdown"
    }

    fn claims(&self, group: &FieldGroup) -> bool {
        group.select().is_some()
    }

    async fn fill(&self, group: &FieldGroup, ctx: &mut FillContext<'_>) -> Result<()> {
        let select = group
            .select()
            .ok_or_else(|| anyhow!("no select in '{}'", group.question))?;
        let css = select
            .selector()
            .ok_or_else(|| anyhow!("select for '{}' has neither id nor name", group.question))?;

        let chosen = resolve_choice(ctx, &group.question, FieldType::Dropdown, &select.options).await?;
        ctx.browser.select_by_text(&css, &chosen).await?;

        let shown = ctx.browser.selected_text(&css).await?;
        if shown.trim() != chosen.trim() {
            bail!("dropdown '{}' shows '{}' instead of '{}'", group.question, shown, chosen);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::fields::tests::{group, Harness};
    use crate::browser::Browser;
    use crate::testing::ScriptedBackend;

    const ENGLISH: &str = r#"
      <div class="fb-dash-form-element">
        <label for="english">What is your level of proficiency in English?</label>
        <select id="english">
          <option>Select an option</option>
          <option>Conversational</option>
          <option>Professional</option>
          <option>Native or bilingual</option>
        </select>
      </div>"#;

    #[tokio::test(start_paused = true)]
    async fn test_selects_and_confirms_choice() {
        let mut harness = Harness::new(ENGLISH, ScriptedBackend::default().reply("english", "Professional"));

        harness.fill(&DropdownProcessor, &group(ENGLISH)).await.unwrap();

        assert_eq!(
            harness.browser.selected_text("[id=\"english\"]").await.unwrap(),
            "Professional"
        );
        assert_eq!(
            harness.answers.get("What is your level of proficiency in English?", FieldType::Dropdown),
            Some("Professional")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_reply_falls_back_to_first_real_option() {
        let mut harness = Harness::new(ENGLISH, ScriptedBackend::default().reply("english", "Fluent-ish"));

        harness.fill(&DropdownProcessor, &group(ENGLISH)).await.unwrap();
        assert_eq!(
            harness.browser.selected_text("[id=\"english\"]").await.unwrap(),
            "Conversational"
        );
    }
}
