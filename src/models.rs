use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// One discovered posting. The canonical `link` is the natural key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobRecord {
    pub title: String,
    pub company: String,
    pub location: String,
    pub link: String,
    pub apply_affordance: Option<String>, // "Easy Apply", or None when the tile gives no hint
    pub state_badge: Option<String>,      // "Applied", "Continue", ...
    pub search_term: String,
    pub search_location: String,
    pub score: Option<f64>,
    pub salary_estimate: Option<f64>,
    pub salary_text: Option<String>,
    pub description: Option<String>,
    pub recruiter_link: Option<String>,
    pub applicants: Option<u32>,
    pub generated_document_paths: Vec<PathBuf>,
}

impl JobRecord {
    pub fn is_easy_apply(&self) -> bool {
        self.apply_affordance
            .as_deref()
            .map(|a| a.to_lowercase().contains("easy apply"))
            .unwrap_or(true)
    }

    pub fn description_or_empty(&self) -> &str {
        self.description.as_deref().unwrap_or("")
    }
}

/// Terminal and bookkeeping flags kept per job link in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusFlag {
    Seen,
    AppliedSuccess,
    SkippedLowScore,
    SkippedLowSalary,
    SkippedBlacklist,
    FailedApplication,
}

impl StatusFlag {
    pub const ALL: [StatusFlag; 6] = [
        StatusFlag::Seen,
        StatusFlag::AppliedSuccess,
        StatusFlag::SkippedLowScore,
        StatusFlag::SkippedLowSalary,
        StatusFlag::SkippedBlacklist,
        StatusFlag::FailedApplication,
    ];

    pub fn as_column(&self) -> &'static str {
        match self {
            StatusFlag::Seen => "seen_at",
            StatusFlag::AppliedSuccess => "applied_success_at",
            StatusFlag::SkippedLowScore => "skipped_low_score_at",
            StatusFlag::SkippedLowSalary => "skipped_low_salary_at",
            StatusFlag::SkippedBlacklist => "skipped_blacklist_at",
            StatusFlag::FailedApplication => "failed_application_at",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StatusFlag::Seen => "seen",
            StatusFlag::AppliedSuccess => "applied",
            StatusFlag::SkippedLowScore => "low-score",
            StatusFlag::SkippedLowSalary => "low-salary",
            StatusFlag::SkippedBlacklist => "blacklist",
            StatusFlag::FailedApplication => "failed",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub link: String,
    pub first_seen_at: String,
    pub seen_at: Option<String>,
    pub applied_success_at: Option<String>,
    pub skipped_low_score_at: Option<String>,
    pub skipped_low_salary_at: Option<String>,
    pub skipped_blacklist_at: Option<String>,
    pub failed_application_at: Option<String>,
}

impl LedgerEntry {
    pub fn flags(&self) -> Vec<StatusFlag> {
        let slots = [
            (StatusFlag::Seen, &self.seen_at),
            (StatusFlag::AppliedSuccess, &self.applied_success_at),
            (StatusFlag::SkippedLowScore, &self.skipped_low_score_at),
            (StatusFlag::SkippedLowSalary, &self.skipped_low_salary_at),
            (StatusFlag::SkippedBlacklist, &self.skipped_blacklist_at),
            (StatusFlag::FailedApplication, &self.failed_application_at),
        ];
        slots
            .into_iter()
            .filter(|(_, at)| at.is_some())
            .map(|(flag, _)| flag)
            .collect()
    }
}

/// Kind of form control an answer was given for. Part of the answer key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Numeric,
    Textarea,
    Radio,
    Dropdown,
    Checkbox,
    Typeahead,
    Date,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Numeric => "numeric",
            FieldType::Textarea => "textarea",
            FieldType::Radio => "radio",
            FieldType::Dropdown => "dropdown",
            FieldType::Checkbox => "checkbox",
            FieldType::Typeahead => "typeahead",
            FieldType::Date => "date",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "text" => Some(FieldType::Text),
            "numeric" => Some(FieldType::Numeric),
            "textarea" => Some(FieldType::Textarea),
            "radio" => Some(FieldType::Radio),
            "dropdown" => Some(FieldType::Dropdown),
            "checkbox" => Some(FieldType::Checkbox),
            "typeahead" => Some(FieldType::Typeahead),
            "date" => Some(FieldType::Date),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Resume,
    Cover,
}

impl fmt::Display for UploadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadKind::Resume => f.write_str("resume"),
            UploadKind::Cover => f.write_str("cover"),
        }
    }
}

/// Why a job was not applied to.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    AlreadyProcessed,
    InvalidApplyState(String),
    TitleBlacklist(String),
    CompanyBlacklist(String),
    DescriptionBlacklist(String),
    ApplicantCount(u32),
    LowScore(f64),
    LowSalary(f64),
    DryRun,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyProcessed => write!(f, "already processed"),
            SkipReason::InvalidApplyState(state) => write!(f, "apply state '{}'", state),
            SkipReason::TitleBlacklist(word) => write!(f, "title blacklist '{}'", word),
            SkipReason::CompanyBlacklist(name) => write!(f, "company blacklist '{}'", name),
            SkipReason::DescriptionBlacklist(word) => write!(f, "description blacklist '{}'", word),
            SkipReason::ApplicantCount(n) => write!(f, "{} applicants outside thresholds", n),
            SkipReason::LowScore(score) => write!(f, "score {:.1} below minimum", score),
            SkipReason::LowSalary(salary) => write!(f, "salary estimate {:.0} below expectation", salary),
            SkipReason::DryRun => write!(f, "dry run"),
        }
    }
}

/// Terminal result of handing one job to the applier.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Submitted,
    Skipped(SkipReason),
    Abandoned(String),
}
