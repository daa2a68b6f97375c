use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tracing::info;

use super::{FieldProcessor, FillContext};
use crate::apply::form::FieldGroup;
use crate::models::UploadKind;

/// Attaches a rendered resume or cover letter to a file input.
pub struct UploadProcessor;

#[async_trait]
impl FieldProcessor for UploadProcessor {
    fn name(&self) -> &'static str {
        "upload"
    }

    fn claims(&self, group: &FieldGroup) -> bool {
        group.file_input().is_some()
    }

    async fn fill(&self, group: &FieldGroup, ctx: &mut FillContext<'_>) -> Result<()> {
        let control = group
            .file_input()
            .ok_or_else(|| anyhow!("no file input in '{}'", group.question))?;
        let input = control
            .selector()
            .ok_or_else(|| anyhow!("file input for '{}' has neither id nor name", group.question))?;

        let label = format!("{} {}", group.question, control.id.as_deref().unwrap_or_default());
        let kind = ctx.backend.classify_upload_kind(&label).await?;
        let path = match kind {
            UploadKind::Resume => ctx.renderer.resume(&*ctx.job).await,
            UploadKind::Cover => ctx.renderer.cover_letter(&*ctx.job).await,
        }
        .with_context(|| format!("rendering {:?} for '{}'", kind, group.question))?;

        ctx.browser.upload(&input, &path).await?;
        info!(kind = ?kind, path = %path.display(), "attached document");
        ctx.job.generated_document_paths.push(path);
        Ok(())
    }
}
