use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use tracing::debug;

use super::{resolve_choice, FieldProcessor, FillContext};
use crate::apply::form::FieldGroup;
use crate::models::FieldType;

pub struct RadioProcessor;

#[async_trait]
impl FieldProcessor for RadioProcessor {
    fn name(&self) -> &'static str {
        "radio"
    }

    fn claims(&self, group: &FieldGroup) -> bool {
        !group.radios().is_empty()
    }

    async fn fill(&self, group: &FieldGroup, ctx: &mut FillContext<'_>) -> Result<()> {
        let radios = group.radios();
        let options: Vec<String> = radios.iter().filter_map(|r| r.option_text()).collect();
        let chosen = resolve_choice(ctx, &group.question, FieldType::Radio, &options).await?;

        let radio = radios
            .iter()
            .find(|r| r.option_text().as_deref() == Some(chosen.as_str()))
            .ok_or_else(|| anyhow!("option '{}' vanished from '{}'", chosen, group.question))?;
        let input = radio
            .selector()
            .ok_or_else(|| anyhow!("radio '{}' has neither id nor name", chosen))?;

        if ctx.browser.is_selected(&input).await.unwrap_or(false) {
            return Ok(());
        }

        // the label is what the page listens to; the bare input is the fallback
        if let Some(label) = radio.label_selector() {
            ctx.browser.click(&label, 0).await?;
            if ctx.wait_selected(&input).await {
                return Ok(());
            }
            debug!(question = %group.question, "label click did not select, clicking input");
        }
        ctx.browser.click(&input, 0).await?;
        if !ctx.wait_selected(&input).await {
            bail!("radio '{}' for '{}' would not select", chosen, group.question);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::fields::tests::{group, Harness};
    use crate::browser::Browser;
    use crate::testing::{Action, ScriptedBackend};

    const LICENSE: &str = r#"
      <div class="fb-dash-form-element">
        <fieldset>
          <legend>Do you have a valid driver's license?</legend>
          <input type="radio" id="dl-yes" value="Yes"><label for="dl-yes">Yes</label>
          <input type="radio" id="dl-no" value="No"><label for="dl-no">No</label>
        </fieldset>
      </div>"#;

    #[tokio::test(start_paused = true)]
    async fn test_selects_backend_choice_and_persists() {
        let backend = ScriptedBackend::default().reply("driver's license", "No");
        let mut harness = Harness::new(LICENSE, backend);

        harness.fill(&RadioProcessor, &group(LICENSE)).await.unwrap();

        assert!(harness.browser.is_selected("[id=\"dl-no\"]").await.unwrap());
        assert!(harness
            .browser
            .actions()
            .contains(&Action::Click("label[for=\"dl-no\"]".to_string(), 0)));
        assert_eq!(
            harness.answers.get("Do you have a valid driver's license?", FieldType::Radio),
            Some("No")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stored_answer_skips_backend() {
        let mut harness = Harness::new(LICENSE, ScriptedBackend::default());
        harness
            .answers
            .put("Do you have a valid driver's license?", FieldType::Radio, "Yes")
            .unwrap();

        harness.fill(&RadioProcessor, &group(LICENSE)).await.unwrap();

        assert!(harness.backend.asked().is_empty());
        assert!(harness.browser.is_selected("[id=\"dl-yes\"]").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_selected_radio_is_not_clicked() {
        let html = LICENSE.replace(r#"id="dl-yes" value="Yes""#, r#"id="dl-yes" value="Yes" checked"#);
        let mut harness = Harness::new(&html, ScriptedBackend::default().reply("license", "Yes"));

        harness.fill(&RadioProcessor, &group(&html)).await.unwrap();
        assert!(harness.browser.clicks().is_empty());
    }
}
