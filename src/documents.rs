use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::info;

use crate::models::JobRecord;

/// Largest file the application form accepts.
pub const MAX_UPLOAD_BYTES: u64 = 2 * 1024 * 1024;
const MAX_NAME_PART: usize = 50;

static UNSAFE_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\-. ]").unwrap());

/// Produces the documents uploaded with an application.
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn resume(&self, job: &JobRecord) -> Result<PathBuf>;
    async fn cover_letter(&self, job: &JobRecord) -> Result<PathBuf>;
}

pub fn sanitize_filename_part(s: &str) -> String {
    let cleaned = UNSAFE_CHARS.replace_all(s.trim(), "_");
    cleaned.chars().take(MAX_NAME_PART).collect::<String>().trim().to_string()
}

/// e.g. `Resume_Rust Engineer_Acme_20261019_093000.pdf`
pub fn humanized_filename(prefix: &str, title: &str, company: &str, at: DateTime<Local>) -> String {
    format!(
        "{}_{}_{}_{}.pdf",
        prefix,
        sanitize_filename_part(title),
        sanitize_filename_part(company),
        at.format("%Y%m%d_%H%M%S")
    )
}

pub fn check_upload_size(path: &Path) -> Result<()> {
    let size = fs::metadata(path)
        .with_context(|| format!("Document not found: {}", path.display()))?
        .len();
    if size > MAX_UPLOAD_BYTES {
        return Err(anyhow!(
            "{} is {} bytes, over the {} byte upload limit",
            path.display(),
            size,
            MAX_UPLOAD_BYTES
        ));
    }
    Ok(())
}

/// Uses pre-built PDFs from the profile, copied under a per-job name.
pub struct ConfiguredDocuments {
    resume: Option<PathBuf>,
    cover_letter: Option<PathBuf>,
    out_dir: PathBuf,
}

impl ConfiguredDocuments {
    pub fn new(resume: Option<PathBuf>, cover_letter: Option<PathBuf>, output_dir: &Path) -> Self {
        Self {
            resume,
            cover_letter,
            out_dir: output_dir.join("generated"),
        }
    }

    fn copy_for(&self, source: Option<&PathBuf>, prefix: &str, job: &JobRecord) -> Result<PathBuf> {
        let source = source.ok_or_else(|| anyhow!("No {} configured in profile", prefix.to_lowercase()))?;
        check_upload_size(source)?;
        fs::create_dir_all(&self.out_dir)?;
        let target = self
            .out_dir
            .join(humanized_filename(prefix, &job.title, &job.company, Local::now()));
        fs::copy(source, &target)
            .with_context(|| format!("Failed to copy {} to {}", source.display(), target.display()))?;
        info!(path = %target.display(), "{} prepared", prefix.to_lowercase());
        Ok(target)
    }
}

#[async_trait]
impl DocumentRenderer for ConfiguredDocuments {
    async fn resume(&self, job: &JobRecord) -> Result<PathBuf> {
        self.copy_for(self.resume.as_ref(), "Resume", job)
    }

    async fn cover_letter(&self, job: &JobRecord) -> Result<PathBuf> {
        self.copy_for(self.cover_letter.as_ref(), "Cover", job)
    }
}
