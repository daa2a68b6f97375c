use scraper::{ElementRef, Html, Selector};

use crate::browser::by_id;
use crate::extractor::collapse_duplicate;

pub const MODAL_SELECTOR: &str = ".artdeco-modal";
pub const PRIMARY_BUTTON_SELECTOR: &str = ".artdeco-modal button.artdeco-button--primary";
pub const INLINE_ERROR_SELECTOR: &str = ".artdeco-inline-feedback--error";

const GROUPING_SELECTOR: &str = ".jobs-easy-apply-form-section__grouping, \
    .fb-dash-form-element, \
    [data-test-text-entity-list-form-component], \
    [data-test-single-line-text-form-component], \
    [data-test-multiline-text-form-component]";
const CONTROL_SELECTOR: &str = "input, select, textarea";
const REVIEW_MARKERS: &[&str] = &[".jobs-easy-apply-review", "[data-test-review-page]"];
const REQUIRED_MARKER: &str = ".fb-dash-form-element__label-title--is-required";
const PLACEHOLDER_OPTIONS: &[&str] = &["select an option", "select", ""];

/// One `input`, `select` or `textarea` inside a grouping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Control {
    pub tag: String,
    pub input_type: String,
    pub id: Option<String>,
    pub name: Option<String>,
    pub role: Option<String>,
    pub placeholder: Option<String>,
    pub label: Option<String>,
    pub checked: bool,
    pub required: bool,
    pub value: Option<String>,
    pub options: Vec<String>,
}

impl Control {
    /// A selector that finds this control in the live page.
    pub fn selector(&self) -> Option<String> {
        if let Some(id) = &self.id {
            return Some(by_id(id));
        }
        self.name
            .as_ref()
            .map(|name| format!("{}[name=\"{}\"]", self.tag, name.replace('"', "\\\"")))
    }

    /// Selector for the `<label for=..>` of this control, if it has an id.
    pub fn label_selector(&self) -> Option<String> {
        self.id
            .as_ref()
            .map(|id| format!("label[for=\"{}\"]", id.replace('"', "\\\"")))
    }

    pub fn is_input(&self, kind: &str) -> bool {
        self.tag == "input" && self.input_type == kind
    }

    pub fn is_combobox(&self) -> bool {
        self.role.as_deref() == Some("combobox")
    }

    pub fn is_date(&self) -> bool {
        self.tag == "input"
            && (self.input_type == "date"
                || self.placeholder.as_deref().map(|p| p.eq_ignore_ascii_case("mm/dd/yyyy")) == Some(true)
                || self.name.as_deref() == Some("artdeco-date"))
    }

    pub fn is_text_like(&self) -> bool {
        match self.tag.as_str() {
            "textarea" => true,
            "input" => {
                matches!(self.input_type.as_str(), "" | "text" | "number" | "tel" | "email" | "url")
                    && !self.is_combobox()
                    && !self.is_date()
            }
            _ => false,
        }
    }

    /// Visible option text, falling back to the value attribute.
    pub fn option_text(&self) -> Option<String> {
        self.label
            .clone()
            .or_else(|| self.value.clone())
            .filter(|s| !s.trim().is_empty())
    }
}

/// A question block inside the form: its prompt plus the controls answering it.
#[derive(Debug, Clone, Default)]
pub struct FieldGroup {
    pub index: usize,
    pub question: String,
    pub required: bool,
    pub controls: Vec<Control>,
}

impl FieldGroup {
    pub fn of_type<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Control> + 'a {
        self.controls.iter().filter(move |c| c.is_input(kind))
    }

    pub fn radios(&self) -> Vec<&Control> {
        self.of_type("radio").collect()
    }

    pub fn checkboxes(&self) -> Vec<&Control> {
        self.of_type("checkbox").collect()
    }

    pub fn file_input(&self) -> Option<&Control> {
        self.of_type("file").next()
    }

    pub fn select(&self) -> Option<&Control> {
        self.controls.iter().find(|c| c.tag == "select")
    }

    pub fn combobox(&self) -> Option<&Control> {
        self.controls.iter().find(|c| c.tag == "input" && c.is_combobox())
    }

    pub fn date_input(&self) -> Option<&Control> {
        self.controls.iter().find(|c| c.is_date())
    }

    pub fn text_input(&self) -> Option<&Control> {
        self.controls.iter().find(|c| c.is_text_like())
    }

    /// Question text plus every option label, for keyword checks.
    pub fn all_text(&self) -> String {
        let mut parts = vec![self.question.clone()];
        parts.extend(self.controls.iter().filter_map(|c| c.label.clone()));
        parts.join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    Submit,
    Next,
    Review,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryButton {
    pub index: usize,
    pub label: String,
    pub kind: ActionKind,
}

pub fn classify_action(label: &str) -> ActionKind {
    let label = label.to_lowercase();
    if label.contains("submit") {
        ActionKind::Submit
    } else if label.contains("review") {
        ActionKind::Review
    } else if label.contains("next") || label.contains("continue") {
        ActionKind::Next
    } else {
        ActionKind::Unknown
    }
}

/// The parsed state of the modal at one step.
#[derive(Debug, Clone, Default)]
pub struct FormStep {
    pub groups: Vec<FieldGroup>,
    pub is_review: bool,
    pub primary: Option<PrimaryButton>,
    pub errors: Vec<String>,
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn clean(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn text_of(element: &ElementRef<'_>) -> String {
    clean(&element.text().collect::<Vec<_>>().join(" "))
}

fn first_text(root: &ElementRef<'_>, css: &str) -> Option<String> {
    let sel = selector(css)?;
    root.select(&sel)
        .map(|e| collapse_duplicate(&text_of(&e)))
        .find(|t| !t.is_empty())
}

/// Parses the outer HTML of the application modal.
pub fn parse_step(modal_html: &str) -> FormStep {
    let doc = Html::parse_fragment(modal_html);
    let root = doc.root_element();

    let groups = parse_groups(&root);
    let marker = REVIEW_MARKERS
        .iter()
        .filter_map(|css| selector(css))
        .any(|sel| root.select(&sel).next().is_some());
    let heading = selector("h3, h2")
        .map(|sel| {
            root.select(&sel)
                .any(|h| text_of(&h).to_lowercase().contains("review your application"))
        })
        .unwrap_or(false);

    FormStep {
        is_review: marker || heading || groups.is_empty(),
        primary: primary_button(&root),
        errors: inline_errors(&root),
        groups,
    }
}

/// Inline validation messages currently shown in the modal.
pub fn inline_errors(root: &ElementRef<'_>) -> Vec<String> {
    let Some(sel) = selector(INLINE_ERROR_SELECTOR) else {
        return Vec::new();
    };
    root.select(&sel)
        .map(|e| text_of(&e))
        .filter(|t| !t.is_empty())
        .collect()
}

pub fn inline_errors_in(modal_html: &str) -> Vec<String> {
    let doc = Html::parse_fragment(modal_html);
    inline_errors(&doc.root_element())
}

fn primary_button(root: &ElementRef<'_>) -> Option<PrimaryButton> {
    let sel = selector("button.artdeco-button--primary")?;
    let buttons: Vec<_> = root.select(&sel).collect();
    let (index, button) = buttons.iter().enumerate().last()?;
    let mut label = text_of(button);
    if let Some(aria) = button.value().attr("aria-label") {
        label = format!("{} {}", aria, label).trim().to_string();
    }
    Some(PrimaryButton {
        index,
        kind: classify_action(&label),
        label,
    })
}

fn parse_groups(root: &ElementRef<'_>) -> Vec<FieldGroup> {
    let Some(grouping) = selector(GROUPING_SELECTOR) else {
        return Vec::new();
    };
    let outermost = root.select(&grouping).filter(|element| {
        !element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|ancestor| grouping.matches(&ancestor))
    });

    outermost
        .enumerate()
        .filter_map(|(index, element)| parse_group(index, &element))
        .collect()
}

fn parse_group(index: usize, element: &ElementRef<'_>) -> Option<FieldGroup> {
    let control_sel = selector(CONTROL_SELECTOR)?;
    let controls: Vec<Control> = element
        .select(&control_sel)
        .filter(|c| c.value().attr("type").map(|t| t.to_lowercase()) != Some("hidden".to_string()))
        .map(|c| parse_control(element, &c))
        .collect();
    if controls.is_empty() {
        return None;
    }

    let question = question_text(element, &controls);
    let required = controls.iter().any(|c| c.required)
        || selector(REQUIRED_MARKER).is_some_and(|sel| element.select(&sel).next().is_some());

    Some(FieldGroup {
        index,
        question,
        required,
        controls,
    })
}

fn parse_control(group: &ElementRef<'_>, element: &ElementRef<'_>) -> Control {
    let value = element.value();
    let tag = value.name().to_lowercase();
    let id = value.attr("id").map(str::to_string);
    let label = id.as_ref().and_then(|id| {
        let css = format!("label[for=\"{}\"]", id.replace('"', "\\\""));
        first_text(group, &css)
    });
    let options = if tag == "select" {
        selector("option")
            .map(|sel| {
                element
                    .select(&sel)
                    .map(|o| text_of(&o))
                    .filter(|o| !is_placeholder(o))
                    .collect()
            })
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    Control {
        input_type: value.attr("type").unwrap_or("").to_lowercase(),
        id,
        name: value.attr("name").map(str::to_string),
        role: value.attr("role").map(str::to_string),
        placeholder: value.attr("placeholder").map(str::to_string),
        label,
        checked: value.attr("checked").is_some(),
        required: value.attr("required").is_some() || value.attr("aria-required") == Some("true"),
        value: value.attr("value").map(str::to_string),
        options,
        tag,
    }
}

pub fn is_placeholder(option: &str) -> bool {
    PLACEHOLDER_OPTIONS.contains(&option.trim().to_lowercase().as_str())
}

fn question_text(group: &ElementRef<'_>, controls: &[Control]) -> String {
    let choice_ids: Vec<&str> = controls
        .iter()
        .filter(|c| c.is_input("radio") || (c.is_input("checkbox") && controls.len() > 1))
        .filter_map(|c| c.id.as_deref())
        .collect();

    if let Some(legend) = first_text(group, "legend") {
        return legend;
    }

    if let Some(sel) = selector("label") {
        let label = group
            .select(&sel)
            .filter(|l| {
                l.value()
                    .attr("for")
                    .is_none_or(|target| !choice_ids.contains(&target))
            })
            .map(|l| collapse_duplicate(&text_of(&l)))
            .find(|t| !t.is_empty());
        if let Some(label) = label {
            return label;
        }
    }

    for css in [
        ".jobs-easy-apply-form-section__group-title",
        ".fb-dash-form-element__label",
    ] {
        if let Some(title) = first_text(group, css) {
            return title;
        }
    }

    let text = collapse_duplicate(&text_of(group));
    if text.is_empty() {
        "unknown".to_string()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub const CONTACT_STEP: &str = r#"
      <div class="artdeco-modal">
        <h3>Contact info</h3>
        <div class="jobs-easy-apply-form-section__grouping">
          <div class="fb-dash-form-element">
            <label for="phone-1"><span>Mobile phone number</span><span class="fb-dash-form-element__label-title--is-required">*</span></label>
            <input id="phone-1" type="text" class="artdeco-text-input--input" value="">
          </div>
        </div>
        <div class="fb-dash-form-element">
          <fieldset>
            <legend><span>Do you have a valid driver's license?</span><span class="visually-hidden">Do you have a valid driver's license?</span></legend>
            <div class="fb-text-selectable__option">
              <input type="radio" id="dl-yes" name="dl" value="Yes"><label for="dl-yes">Yes</label>
            </div>
            <div class="fb-text-selectable__option">
              <input type="radio" id="dl-no" name="dl" value="No"><label for="dl-no">No</label>
            </div>
          </fieldset>
        </div>
        <div class="fb-dash-form-element">
          <label for="notice">Notice period</label>
          <select id="notice" required>
            <option>Select an option</option>
            <option>Immediately</option>
            <option>2 weeks</option>
          </select>
        </div>
        <div class="fb-dash-form-element">
          <input type="hidden" name="token" value="x">
          <span>Nothing to fill</span>
        </div>
        <footer>
          <button class="artdeco-button artdeco-button--secondary">Back</button>
          <button class="artdeco-button artdeco-button--primary" aria-label="Continue to next step"><span>Next</span></button>
        </footer>
      </div>"#;

    #[test]
    fn test_parse_step_groups_and_questions() {
        let step = parse_step(CONTACT_STEP);
        assert!(!step.is_review);
        assert_eq!(step.groups.len(), 3);

        let phone = &step.groups[0];
        assert_eq!(phone.question, "Mobile phone number *");
        assert!(phone.required);
        assert_eq!(phone.text_input().unwrap().selector().unwrap(), "[id=\"phone-1\"]");

        let license = &step.groups[1];
        assert_eq!(license.question, "Do you have a valid driver's license?");
        let radios = license.radios();
        assert_eq!(radios.len(), 2);
        assert_eq!(radios[1].option_text().as_deref(), Some("No"));
        assert_eq!(radios[0].label_selector().unwrap(), "label[for=\"dl-yes\"]");

        let notice = &step.groups[2];
        assert_eq!(notice.question, "Notice period");
        assert!(notice.required);
        assert_eq!(notice.select().unwrap().options, vec!["Immediately", "2 weeks"]);

        let primary = step.primary.unwrap();
        assert_eq!(primary.index, 0);
        assert_eq!(primary.kind, ActionKind::Next);
    }

    #[test]
    fn test_review_step_is_detected() {
        let html = r#"
          <div class="artdeco-modal">
            <h3>Review your application</h3>
            <div class="jobs-easy-apply-review">summary</div>
            <input type="checkbox" id="follow-company-checkbox" checked>
            <button class="artdeco-button--primary" aria-label="Submit application">Submit application</button>
          </div>"#;
        let step = parse_step(html);
        assert!(step.is_review);
        assert_eq!(step.primary.unwrap().kind, ActionKind::Submit);
    }

    #[test]
    fn test_classify_action_labels() {
        assert_eq!(classify_action("Continue to next step Next"), ActionKind::Next);
        assert_eq!(classify_action("Review your application Review"), ActionKind::Review);
        assert_eq!(classify_action("Submit application"), ActionKind::Submit);
        assert_eq!(classify_action("Done"), ActionKind::Unknown);
    }

    #[test]
    fn test_control_kinds() {
        let date = Control {
            tag: "input".to_string(),
            input_type: "text".to_string(),
            placeholder: Some("mm/dd/yyyy".to_string()),
            ..Control::default()
        };
        assert!(date.is_date());
        assert!(!date.is_text_like());

        let combo = Control {
            tag: "input".to_string(),
            input_type: "text".to_string(),
            role: Some("combobox".to_string()),
            name: Some("city".to_string()),
            ..Control::default()
        };
        assert!(combo.is_combobox());
        assert!(!combo.is_text_like());
        assert_eq!(combo.selector().unwrap(), "input[name=\"city\"]");
        assert!(combo.label_selector().is_none());
    }

    #[test]
    fn test_nested_groupings_are_not_double_counted_and_errors_read() {
        let html = r#"
          <div class="artdeco-modal">
            <div class="jobs-easy-apply-form-section__grouping">
              <div class="fb-dash-form-element" data-test-single-line-text-form-component>
                <label for="years">How many years of Rust experience?</label>
                <input id="years" type="text">
                <div class="artdeco-inline-feedback artdeco-inline-feedback--error">Enter a whole number</div>
              </div>
            </div>
            <button class="artdeco-button--primary">Review</button>
          </div>"#;
        let step = parse_step(html);
        assert_eq!(step.groups.len(), 1);
        assert_eq!(step.errors, vec!["Enter a whole number"]);
        assert_eq!(inline_errors_in(html).len(), 1);
        assert_eq!(step.primary.unwrap().kind, ActionKind::Review);
    }
}
