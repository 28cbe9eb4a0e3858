//! Multipart form intake for the upload and search pages.

use axum::extract::Multipart;

use crate::errors::{Result, WorkflowError};
use crate::workflows::UploadedFile;

pub const FILE_FIELD: &str = "fileUploaded";
pub const OWNER_FIELD: &str = "owner";
pub const DESCRIPTION_FIELD: &str = "desc";

/// Files and text fields of one upload form.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub files: Vec<UploadedFile>,
    pub owner_info: String,
    pub description: String,
}

impl UploadForm {
    /// The single file of a one-file form.
    pub fn into_single(mut self) -> Result<(UploadedFile, String, String)> {
        if self.files.is_empty() {
            return Err(WorkflowError::ValidationFailure(format!(
                "the {FILE_FIELD} file part is missing or empty"
            )));
        }
        let file = self.files.swap_remove(0);
        Ok((file, self.owner_info, self.description))
    }
}

/// Read every part of the form. File parts without a file name or without
/// any bytes are skipped; unknown text fields are ignored.
pub async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| WorkflowError::ValidationFailure(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            FILE_FIELD => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| WorkflowError::ValidationFailure(e.to_string()))?;
                if file_name.is_empty() || bytes.is_empty() {
                    tracing::debug!(file_name = %file_name, "skipping empty file part");
                    continue;
                }
                form.files.push(UploadedFile {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            OWNER_FIELD => form.owner_info = read_text(field).await?,
            DESCRIPTION_FIELD => form.description = read_text(field).await?,
            other => tracing::trace!(field = other, "ignoring form field"),
        }
    }
    Ok(form)
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String> {
    field
        .text()
        .await
        .map(|text| text.trim().to_string())
        .map_err(|e| WorkflowError::ValidationFailure(e.to_string()))
}
