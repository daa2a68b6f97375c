use anyhow::{Context, Result};
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::models::{AnswerRecord, FieldType};

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Questions whose answers depend on the job, so a cached answer is never reused.
const JOB_SPECIFIC_QUESTIONS: &[&str] = &[
    "cover letter",
    "headline",
    "summary",
    "why do you want",
    "why are you interested",
    "what interests you",
];

/// Canonical form of a question used as the answer key.
pub fn normalize(question: &str) -> String {
    let lowered: String = question
        .to_lowercase()
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    let stripped = NON_WORD.replace_all(&lowered, "");
    WHITESPACE.replace_all(stripped.trim(), " ").into_owned()
}

pub fn is_job_specific(question: &str) -> bool {
    let normalized = normalize(question);
    JOB_SPECIFIC_QUESTIONS
        .iter()
        .any(|needle| normalized.contains(needle))
}

/// Question to answer cache persisted as a hand-editable JSON list.
pub struct AnswerStore {
    path: PathBuf,
    records: Vec<AnswerRecord>,
    index: HashMap<(String, FieldType), usize>,
}

impl AnswerStore {
    pub fn load(path: &Path) -> Result<Self> {
        let records = match fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<Vec<serde_json::Value>>(&raw) {
                Ok(values) => values
                    .into_iter()
                    .filter_map(|value| serde_json::from_value::<AnswerRecord>(value).ok())
                    .filter(|r| !r.question.trim().is_empty() && !r.answer.trim().is_empty())
                    .collect(),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "answers file is corrupt, starting empty");
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read answers file {}", path.display()));
            }
        };

        let mut store = Self {
            path: path.to_path_buf(),
            records: Vec::new(),
            index: HashMap::new(),
        };
        for record in records {
            store.insert(record);
        }
        debug!(count = store.records.len(), "answers loaded");
        Ok(store)
    }

    pub fn default_path(output_dir: &Path) -> PathBuf {
        output_dir.join("answers.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[AnswerRecord] {
        &self.records
    }

    pub fn get(&self, question: &str, field_type: FieldType) -> Option<&str> {
        let key = (normalize(question), field_type);
        self.index
            .get(&key)
            .map(|&i| self.records[i].answer.as_str())
    }

    /// Cached answer unless the question is job-specific.
    pub fn reusable(&self, question: &str, field_type: FieldType) -> Option<&str> {
        if is_job_specific(question) {
            return None;
        }
        self.get(question, field_type)
    }

    pub fn put(&mut self, question: &str, field_type: FieldType, answer: &str) -> Result<()> {
        let answer = answer.trim();
        if normalize(question).is_empty() || answer.is_empty() {
            return Ok(());
        }
        if self.get(question, field_type) == Some(answer) {
            return Ok(());
        }
        self.insert(AnswerRecord {
            field_type,
            question: normalize(question),
            answer: answer.to_string(),
        });
        self.save()
    }

    pub fn forget(&mut self, question: &str, field_type: FieldType) -> Result<bool> {
        let key = (normalize(question), field_type);
        let Some(&position) = self.index.get(&key) else {
            return Ok(false);
        };
        self.records.remove(position);
        self.reindex();
        self.save()?;
        Ok(true)
    }

    fn insert(&mut self, record: AnswerRecord) {
        let key = (normalize(&record.question), record.field_type);
        match self.index.get(&key) {
            Some(&i) => self.records[i].answer = record.answer,
            None => {
                self.index.insert(key, self.records.len());
                self.records.push(record);
            }
        }
    }

    fn reindex(&mut self) {
        self.index = self
            .records
            .iter()
            .enumerate()
            .map(|(i, r)| ((normalize(&r.question), r.field_type), i))
            .collect();
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.records)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .with_context(|| format!("Failed to write answers file {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace answers file {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_cosmetic_differences() {
        assert_eq!(
            normalize("  Do you have a valid driver's license?\n"),
            "do you have a valid drivers license"
        );
        assert_eq!(
            normalize("DO YOU HAVE A VALID DRIVER'S   LICENSE"),
            normalize("do you have a valid drivers license?")
        );
        assert_eq!(normalize("Years of\texperience with \"Rust\","), "years of experience with rust");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let samples = [
            "How many years of experience do you have with C++?",
            "  Salary\u{0007} expectations (USD) ",
            "¿Hablas español?",
            "",
            "___",
            "İstanbul based?",
        ];
        for sample in samples {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", sample);
        }
    }

    #[test]
    fn test_put_get_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = AnswerStore::default_path(dir.path());

        let mut store = AnswerStore::load(&path).unwrap();
        assert!(store.is_empty());
        store.put("Do you have a valid driver's license?", FieldType::Radio, "Yes").unwrap();
        store.put("Years of Rust experience?", FieldType::Numeric, "5").unwrap();

        let reloaded = AnswerStore::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(
            reloaded.get("do you have a VALID drivers license", FieldType::Radio),
            Some("Yes")
        );
        assert_eq!(reloaded.get("Do you have a valid driver's license?", FieldType::Dropdown), None);
    }

    #[test]
    fn test_put_upserts_last_answer() {
        let dir = tempfile::tempdir().unwrap();
        let path = AnswerStore::default_path(dir.path());
        let mut store = AnswerStore::load(&path).unwrap();

        store.put("Notice period?", FieldType::Dropdown, "2 weeks").unwrap();
        store.put("notice period", FieldType::Dropdown, "1 month").unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("Notice period?", FieldType::Dropdown), Some("1 month"));
        assert!(store.forget("NOTICE PERIOD", FieldType::Dropdown).unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_job_specific_questions_bypass_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = AnswerStore::load(&AnswerStore::default_path(dir.path())).unwrap();
        store.put("Cover letter", FieldType::Textarea, "Dear team").unwrap();

        assert_eq!(store.get("Cover letter", FieldType::Textarea), Some("Dear team"));
        assert_eq!(store.reusable("Cover letter", FieldType::Textarea), None);
    }

    #[test]
    fn test_hand_edited_and_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = AnswerStore::default_path(dir.path());

        fs::write(
            &path,
            r#"[
                {"type": "radio", "question": "Are you authorized to work?", "answer": "Yes"},
                {"type": "bogus", "question": "skipped", "answer": "x"},
                {"type": "text", "question": "", "answer": "empty question"}
            ]"#,
        )
        .unwrap();
        let store = AnswerStore::load(&path).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("are you authorized to work", FieldType::Radio), Some("Yes"));

        fs::write(&path, "{ not json").unwrap();
        let store = AnswerStore::load(&path).unwrap();
        assert!(store.is_empty());
    }
}
