use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, warn};

use crate::ai::{AIProvider, ProviderError};
use crate::models::{JobRecord, UploadKind};
use crate::wait::Waiter;

pub const MAX_RATE_LIMIT_RETRIES: u32 = 3;
pub const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(30);

/// Fallback used when a score or salary reply cannot be read.
pub const UNREADABLE_ESTIMATE: f64 = 0.1;

pub const COVER_LETTER_LIMIT: usize = 1000;
pub const HEADLINE_LIMIT: usize = 124;
pub const DEFAULT_TEXT_LIMIT: usize = 140;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("still rate limited after {retries} retries")]
    RateLimitExhausted { retries: u32 },

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Answers application questions and evaluates jobs on behalf of the candidate.
#[async_trait]
pub trait AnswerBackend: Send + Sync {
    async fn answer(&self, question: &str, job: &JobRecord) -> Result<String, BackendError>;
    async fn answer_from_options(&self, question: &str, options: &[String]) -> Result<String, BackendError>;
    async fn answer_numeric(&self, question: &str) -> Result<i64, BackendError>;
    async fn answer_date(&self, question: &str) -> Result<NaiveDate, BackendError>;
    async fn classify_upload_kind(&self, label: &str) -> Result<UploadKind, BackendError>;
    /// Fit between the candidate and the job on a 0-10 scale.
    async fn score_job(&self, job: &JobRecord) -> Result<f64, BackendError>;
    async fn estimate_salary(&self, job: &JobRecord) -> Result<f64, BackendError>;
}

// --- Reply parsing ---

static NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").unwrap());
static INTEGER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-?\d+").unwrap());
static ISO_DATE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}").unwrap());
static AMOUNT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d[\d,]*(?:\.\d+)?\s*[kK]?").unwrap());

/// First number in the reply if it lies within 0..=10.
pub fn parse_score(reply: &str) -> f64 {
    NUMBER
        .find(reply)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|score| (0.0..=10.0).contains(score))
        .unwrap_or(UNREADABLE_ESTIMATE)
}

/// Largest amount mentioned, so "90,000 - 120,000" reads as 120000.
pub fn parse_salary(reply: &str) -> f64 {
    AMOUNT
        .find_iter(reply)
        .filter_map(|m| {
            let raw = m.as_str().trim();
            let thousands = raw.ends_with(['k', 'K']);
            let digits: String = raw
                .trim_end_matches(['k', 'K'])
                .trim()
                .chars()
                .filter(|c| *c != ',')
                .collect();
            let value = digits.parse::<f64>().ok()?;
            Some(if thousands { value * 1000.0 } else { value })
        })
        .fold(None, |max: Option<f64>, v| Some(max.map_or(v, |m| m.max(v))))
        .unwrap_or(UNREADABLE_ESTIMATE)
}

pub fn parse_integer(reply: &str) -> i64 {
    INTEGER
        .find(reply)
        .and_then(|m| m.as_str().parse::<i64>().ok())
        .unwrap_or(0)
}

pub fn parse_date(reply: &str) -> NaiveDate {
    ISO_DATE
        .find(reply)
        .and_then(|m| NaiveDate::parse_from_str(m.as_str(), "%Y-%m-%d").ok())
        .unwrap_or_else(|| Local::now().date_naive())
}

pub fn parse_upload_kind(reply: &str) -> UploadKind {
    if reply.to_lowercase().contains("cover") {
        UploadKind::Cover
    } else {
        UploadKind::Resume
    }
}

/// The option closest to `reply` by edit distance, ignoring case.
pub fn find_best_match<'a>(reply: &str, options: &'a [String]) -> Option<&'a String> {
    let reply = reply.trim().to_lowercase();
    options
        .iter()
        .min_by_key(|option| strsim::levenshtein(&reply, &option.trim().to_lowercase()))
}

/// Character budget for a free-text answer.
pub fn text_limit(question: &str) -> usize {
    let q = question.to_lowercase();
    if q.contains("cover letter") {
        COVER_LETTER_LIMIT
    } else if q.contains("headline") {
        HEADLINE_LIMIT
    } else {
        DEFAULT_TEXT_LIMIT
    }
}

pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

// --- LLM-backed implementation ---

pub struct LlmAnswerer {
    provider: Box<dyn AIProvider>,
    profile: String,
    salary_expectation: Option<f64>,
    waiter: Waiter,
}

impl LlmAnswerer {
    pub fn new(provider: Box<dyn AIProvider>, profile: String) -> Self {
        Self {
            provider,
            profile,
            salary_expectation: None,
            waiter: Waiter::new(DEFAULT_RATE_LIMIT_WAIT, DEFAULT_RATE_LIMIT_WAIT),
        }
    }

    pub fn with_salary_expectation(mut self, salary: Option<f64>) -> Self {
        self.salary_expectation = salary;
        self
    }

    async fn ask(&self, prompt: &str, max_tokens: u32) -> Result<String, BackendError> {
        let mut retries = 0;
        loop {
            match self.provider.complete(prompt, max_tokens).await {
                Ok(reply) => return Ok(reply.trim().to_string()),
                Err(ProviderError::RateLimited { retry_after }) => {
                    if retries >= MAX_RATE_LIMIT_RETRIES {
                        return Err(BackendError::RateLimitExhausted { retries });
                    }
                    retries += 1;
                    let wait = retry_after.unwrap_or(DEFAULT_RATE_LIMIT_WAIT);
                    warn!(
                        model = self.provider.model_name(),
                        attempt = retries,
                        wait_secs = wait.as_secs_f64(),
                        "rate limited, backing off"
                    );
                    self.waiter.pause(wait).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn job_context(job: &JobRecord) -> String {
    format!(
        "Title: {}\nCompany: {}\nLocation: {}\n\n{}",
        job.title,
        job.company,
        job.location,
        truncate_chars(job.description_or_empty(), 6000)
    )
}

#[async_trait]
impl AnswerBackend for LlmAnswerer {
    async fn answer(&self, question: &str, job: &JobRecord) -> Result<String, BackendError> {
        let limit = text_limit(question);
        let prompt = format!(
            "{}\nCandidate profile:\n{}\n\nJob:\n{}\n\nQuestion: {}\nAnswer in at most {} characters.",
            textwrap::dedent(
                "
                You are filling in a job application on behalf of the candidate below.
                Answer in the first person, truthfully, using only the profile.
                Reply with the answer text only.
                "
            ),
            self.profile,
            job_context(job),
            question,
            limit
        );
        let reply = self.ask(&prompt, 1024).await?;
        Ok(truncate_chars(&reply, limit))
    }

    async fn answer_from_options(&self, question: &str, options: &[String]) -> Result<String, BackendError> {
        let prompt = format!(
            "{}\nCandidate profile:\n{}\n\nQuestion: {}\nOptions:\n{}",
            textwrap::dedent(
                "
                Pick the option that best answers the question for the candidate below.
                Reply with the exact text of one option and nothing else.
                "
            ),
            self.profile,
            question,
            options
                .iter()
                .map(|o| format!("- {}", o))
                .collect::<Vec<_>>()
                .join("\n")
        );
        let reply = self.ask(&prompt, 64).await?;
        let chosen = find_best_match(&reply, options).cloned().unwrap_or(reply);
        debug!(question, answer = %chosen, "option chosen");
        Ok(chosen)
    }

    async fn answer_numeric(&self, question: &str) -> Result<i64, BackendError> {
        let prompt = format!(
            "{}\nCandidate profile:\n{}\n\nQuestion: {}",
            textwrap::dedent(
                "
                Answer the question for the candidate below with a single whole number.
                For years of experience round down. Reply with digits only.
                "
            ),
            self.profile,
            question
        );
        Ok(parse_integer(&self.ask(&prompt, 16).await?))
    }

    async fn answer_date(&self, question: &str) -> Result<NaiveDate, BackendError> {
        let prompt = format!(
            "Today is {}. Answer with a single date in YYYY-MM-DD format.\n\nQuestion: {}",
            Local::now().format("%Y-%m-%d"),
            question
        );
        Ok(parse_date(&self.ask(&prompt, 16).await?))
    }

    async fn classify_upload_kind(&self, label: &str) -> Result<UploadKind, BackendError> {
        let prompt = format!(
            "An application form has a file upload labelled \"{}\". \
             Reply with one word: resume or cover.",
            label
        );
        Ok(parse_upload_kind(&self.ask(&prompt, 8).await?))
    }

    async fn score_job(&self, job: &JobRecord) -> Result<f64, BackendError> {
        let prompt = format!(
            "{}\nCandidate profile:\n{}\n\nJob:\n{}",
            textwrap::dedent(
                "
                Rate how well the candidate fits this job on a scale from 0 to 10,
                where 10 is a perfect match. Reply with the number only.
                "
            ),
            self.profile,
            job_context(job)
        );
        Ok(parse_score(&self.ask(&prompt, 8).await?))
    }

    async fn estimate_salary(&self, job: &JobRecord) -> Result<f64, BackendError> {
        let posted = job.salary_text.as_deref().unwrap_or("not stated");
        let expectation = self
            .salary_expectation
            .map(|s| format!("The candidate expects about {:.0} per year.\n", s))
            .unwrap_or_default();
        let prompt = format!(
            "{}\n{}Salary shown on the posting: {}\n\nJob:\n{}",
            textwrap::dedent(
                "
                Estimate the yearly base salary this job pays, in the posting's currency.
                Reply with a single number or range of numbers only.
                "
            ),
            expectation,
            posted,
            job_context(job)
        );
        Ok(parse_salary(&self.ask(&prompt, 16).await?))
    }
}
