use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use super::{resolve_choice, FieldProcessor, FillContext};
use crate::apply::form::{Control, FieldGroup};
use crate::models::FieldType;

const AGREEMENT_KEYWORDS: &[&str] = &["agree", "terms", "consent", "acknowledge", "certify", "privacy"];

pub struct CheckboxProcessor;

fn is_agreement(text: &str) -> bool {
    let text = text.to_lowercase();
    AGREEMENT_KEYWORDS.iter().any(|k| text.contains(k))
}

async fn ensure_checked(ctx: &FillContext<'_>, checkbox: &Control, question: &str) -> Result<()> {
    let input = checkbox
        .selector()
        .ok_or_else(|| anyhow!("checkbox for '{}' has neither id nor name", question))?;
    if ctx.browser.is_selected(&input).await.unwrap_or(false) {
        return Ok(());
    }
    let target = checkbox.label_selector().unwrap_or_else(|| input.clone());
    ctx.browser.click(&target, 0).await?;
    if !ctx.wait_selected(&input).await {
        bail!("checkbox for '{}' would not check", question);
    }
    Ok(())
}

#[async_trait]
impl FieldProcessor for CheckboxProcessor {
    fn name(&self) -> &'static str {
        "checkbox"
    }

    /// Only groupings made of nothing but checkboxes.
    fn claims(&self, group: &FieldGroup) -> bool {
        !group.controls.is_empty() && group.controls.iter().all(|c| c.is_input("checkbox"))
    }

    async fn fill(&self, group: &FieldGroup, ctx: &mut FillContext<'_>) -> Result<()> {
        let checkboxes = group.checkboxes();

        if let [single] = checkboxes.as_slice() {
            if group.required || is_agreement(&group.all_text()) {
                return ensure_checked(ctx, single, &group.question).await;
            }
            return Ok(());
        }

        let options: Vec<String> = checkboxes.iter().filter_map(|c| c.option_text()).collect();
        let chosen = resolve_choice(ctx, &group.question, FieldType::Checkbox, &options).await?;
        let checkbox = checkboxes
            .iter()
            .find(|c| c.option_text().as_deref() == Some(chosen.as_str()))
            .ok_or_else(|| anyhow!("option '{}' vanished from '{}'", chosen, group.question))?;
        ensure_checked(ctx, checkbox, &group.question).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::fields::tests::{group, Harness};
    use crate::browser::Browser;
    use crate::testing::ScriptedBackend;

    #[tokio::test(start_paused = true)]
    async fn test_agreement_checkbox_is_checked_once() {
        let html = r#"
          <div class="fb-dash-form-element">
            <input type="checkbox" id="terms"><label for="terms">I agree to the terms of service</label>
          </div>"#;
        let mut harness = Harness::new(html, ScriptedBackend::default());

        harness.fill(&CheckboxProcessor, &group(html)).await.unwrap();
        assert!(harness.browser.is_selected("[id=\"terms\"]").await.unwrap());

        // a second pass must not toggle it back off
        harness.fill(&CheckboxProcessor, &group(html)).await.unwrap();
        assert!(harness.browser.is_selected("[id=\"terms\"]").await.unwrap());
        assert_eq!(harness.browser.clicks().len(), 1);
        assert!(harness.backend.asked().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_optional_single_checkbox_is_left_alone() {
        let html = r#"
          <div class="fb-dash-form-element">
            <input type="checkbox" id="news"><label for="news">Send me job alerts</label>
          </div>"#;
        let mut harness = Harness::new(html, ScriptedBackend::default());
        harness.fill(&CheckboxProcessor, &group(html)).await.unwrap();
        assert!(harness.browser.clicks().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_multi_checkbox_uses_choice() {
        let html = r#"
          <div class="fb-dash-form-element">
            <fieldset>
              <legend>Which shifts can you work?</legend>
              <input type="checkbox" id="day"><label for="day">Day</label>
              <input type="checkbox" id="night"><label for="night">Night</label>
            </fieldset>
          </div>"#;
        let mut harness = Harness::new(html, ScriptedBackend::default().reply("shifts", "night"));

        harness.fill(&CheckboxProcessor, &group(html)).await.unwrap();
        assert!(harness.browser.is_selected("[id=\"night\"]").await.unwrap());
        assert!(!harness.browser.is_selected("[id=\"day\"]").await.unwrap());
        assert_eq!(
            harness.answers.get("Which shifts can you work?", FieldType::Checkbox),
            Some("Night")
        );
    }
}
