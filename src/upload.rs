use crate::error::{ApiError, ApiResult};
use axum::{body::Bytes, extract::Multipart};
use tracing::debug;

/// An uploaded file reduced to its text.
#[derive(Debug)]
pub struct UploadedText {
    pub filename: String,
    pub text: String,
}

/// Read the `file` field of a multipart request and extract its text.
pub async fn read_file_field(mut multipart: Multipart) -> ApiResult<UploadedText> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("Malformed multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| ApiError::Validation("Uploaded file has no filename".to_string()))?;
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::Validation(format!("Failed to read upload: {}", e)))?;

        debug!("Received upload '{}' ({} bytes)", filename, data.len());
        return extract_text(filename, data).await;
    }

    Err(ApiError::Validation("Multipart field 'file' is required".to_string()))
}

/// PDFs go through raw text extraction on the blocking pool; everything else
/// must be UTF-8.
pub async fn extract_text(filename: String, data: Bytes) -> ApiResult<UploadedText> {
    if !filename.to_lowercase().ends_with(".pdf") {
        let text = decode_utf8(&filename, &data)?;
        return Ok(UploadedText { filename, text });
    }

    tokio::task::spawn_blocking(move || -> ApiResult<UploadedText> {
        let text = pdf_extract::extract_text_from_mem(&data)
            .map_err(|e| ApiError::Validation(format!("Could not read PDF '{}': {}", filename, e)))?;
        Ok(UploadedText { filename, text })
    })
    .await
    .map_err(|e| ApiError::Validation(format!("PDF extraction aborted: {}", e)))?
}

fn decode_utf8(filename: &str, data: &[u8]) -> ApiResult<String> {
    String::from_utf8(data.to_vec())
        .map_err(|_| ApiError::Validation(format!("'{}' is not UTF-8 text", filename)))
}
