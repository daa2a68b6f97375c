use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use tracing::debug;

use super::{resolve_text, FieldProcessor, FillContext};
use crate::apply::form::FieldGroup;
use crate::browser::{exists, KeyPress};
use crate::models::FieldType;

const SUGGESTION_SELECTOR: &str = ".basic-typeahead__selectable, [role='option']";

pub struct TypeaheadProcessor;

#[async_trait]
impl FieldProcessor for TypeaheadProcessor {
    fn name(&self) -> &'static str {
        "typeahead"
    }

    fn claims(&self, group: &FieldGroup) -> bool {
        group.combobox().is_some()
    }

    async fn fill(&self, group: &FieldGroup, ctx: &mut FillContext<'_>) -> Result<()> {
        let control = group
            .combobox()
            .ok_or_else(|| anyhow!("no combobox in '{}'", group.question))?;
        let input = control
            .selector()
            .ok_or_else(|| anyhow!("combobox for '{}' has neither id nor name", group.question))?;

        let answer = resolve_text(ctx, &group.question, FieldType::Typeahead).await?;
        ctx.browser.type_text(&input, &answer).await?;

        let browser = ctx.browser;
        let suggested = ctx
            .confirm_waiter()
            .until(|| async move { exists(browser, SUGGESTION_SELECTOR).await.then_some(()) })
            .await
            .is_some();
        if suggested {
            ctx.browser.click(SUGGESTION_SELECTOR, 0).await?;
        } else {
            debug!(question = %group.question, "no suggestion list, committing with keys");
            ctx.browser.press_key(&input, KeyPress::ArrowDown).await?;
            ctx.browser.press_key(&input, KeyPress::Enter).await?;
        }

        let value = ctx.browser.value(&input).await.unwrap_or_default();
        if value.trim().is_empty() {
            bail!("typeahead '{}' is empty after entry", group.question);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::fields::tests::{group, Harness};
    use crate::testing::{Action, ScriptedBackend};

    const CITY: &str = r#"
      <div class="fb-dash-form-element">
        <label for="city">Location (city)</label>
        <input id="city" type="text" role="combobox">
      </div>"#;

    #[tokio::test(start_paused = true)]
    async fn test_commits_with_keys_without_suggestions() {
        let mut harness = Harness::new(CITY, ScriptedBackend::default().reply("location", "Berlin"));

        harness.fill(&TypeaheadProcessor, &group(CITY)).await.unwrap();

        assert_eq!(harness.browser.typed("[id=\"city\"]").as_deref(), Some("Berlin"));
        let keys: Vec<_> = harness
            .browser
            .actions()
            .into_iter()
            .filter(|a| matches!(a, Action::Key(..)))
            .collect();
        assert_eq!(keys.len(), 2);
        assert_eq!(
            harness.answers.get("Location (city)", FieldType::Typeahead),
            Some("Berlin")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_clicks_first_suggestion() {
        let html = format!(
            "{}<ul><li class=\"basic-typeahead__selectable\">Berlin, Germany</li></ul>",
            CITY
        );
        let mut harness = Harness::new(&html, ScriptedBackend::default().reply("location", "Berlin"));

        harness.fill(&TypeaheadProcessor, &group(&html)).await.unwrap();
        assert_eq!(harness.browser.clicks(), vec![SUGGESTION_SELECTOR.to_string()]);
    }
}
