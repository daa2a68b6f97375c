use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::models::{ApplyOutcome, JobRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Success,
    Skipped,
    Failed,
}

impl OutcomeKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            OutcomeKind::Success => "success.jsonl",
            OutcomeKind::Skipped => "skipped.jsonl",
            OutcomeKind::Failed => "failed.jsonl",
        }
    }

    pub fn of(outcome: &ApplyOutcome) -> Self {
        match outcome {
            ApplyOutcome::Submitted => OutcomeKind::Success,
            ApplyOutcome::Skipped(_) => OutcomeKind::Skipped,
            ApplyOutcome::Abandoned(_) => OutcomeKind::Failed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub company: String,
    pub title: String,
    pub link: String,
    pub score: Option<f64>,
    pub recruiter_link: Option<String>,
    pub document_path: Option<PathBuf>,
    pub reason: Option<String>,
    pub timestamp: String,
}

impl OutcomeRecord {
    pub fn new(job: &JobRecord, reason: Option<String>) -> Self {
        Self {
            company: job.company.clone(),
            title: job.title.clone(),
            link: job.link.clone(),
            score: job.score,
            recruiter_link: job.recruiter_link.clone(),
            document_path: job.generated_document_paths.first().cloned(),
            reason,
            timestamp: Local::now().to_rfc3339(),
        }
    }
}

/// Append-only audit trail of terminal decisions, one JSON object per line.
pub struct OutcomeLog {
    dir: PathBuf,
}

impl OutcomeLog {
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
        Ok(Self { dir: dir.to_path_buf() })
    }

    pub fn path(&self, kind: OutcomeKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    pub fn append(&self, kind: OutcomeKind, record: &OutcomeRecord) -> Result<()> {
        let path = self.path(kind);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let line = serde_json::to_string(record)?;
        writeln!(file, "{}", line).with_context(|| format!("Failed to append to {}", path.display()))?;
        Ok(())
    }

    pub fn record(&self, job: &JobRecord, outcome: &ApplyOutcome) -> Result<()> {
        let reason = match outcome {
            ApplyOutcome::Submitted => None,
            ApplyOutcome::Skipped(reason) => Some(reason.to_string()),
            ApplyOutcome::Abandoned(reason) => Some(reason.clone()),
        };
        self.append(OutcomeKind::of(outcome), &OutcomeRecord::new(job, reason))
    }

    pub fn read(&self, kind: OutcomeKind) -> Result<Vec<OutcomeRecord>> {
        let path = self.path(kind);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&path)?;
        Ok(raw
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SkipReason;

    #[test]
    fn test_records_go_to_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        let log = OutcomeLog::new(dir.path()).unwrap();
        let job = JobRecord {
            title: "Rust Engineer".to_string(),
            company: "Acme".to_string(),
            link: "https://www.linkedin.com/jobs/view/1/".to_string(),
            score: Some(8.0),
            generated_document_paths: vec![PathBuf::from("/tmp/Resume.pdf")],
            ..JobRecord::default()
        };

        log.record(&job, &ApplyOutcome::Submitted).unwrap();
        log.record(&job, &ApplyOutcome::Skipped(SkipReason::LowScore(4.0))).unwrap();
        log.record(&job, &ApplyOutcome::Abandoned("too many errors".to_string())).unwrap();
        log.record(&job, &ApplyOutcome::Submitted).unwrap();

        let success = log.read(OutcomeKind::Success).unwrap();
        assert_eq!(success.len(), 2);
        assert_eq!(success[0].document_path, Some(PathBuf::from("/tmp/Resume.pdf")));
        assert_eq!(success[0].reason, None);

        let skipped = log.read(OutcomeKind::Skipped).unwrap();
        assert_eq!(skipped[0].reason.as_deref(), Some("score 4.0 below minimum"));

        let failed = log.read(OutcomeKind::Failed).unwrap();
        assert_eq!(failed[0].reason.as_deref(), Some("too many errors"));
        assert_eq!(failed[0].score, Some(8.0));
    }
}
