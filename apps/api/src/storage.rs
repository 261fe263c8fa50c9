//! Object storage for uploaded template files and generated quotes.
//!
//! Layout inside the bucket:
//!   templates/{uuid}_{original file name}
//!   generated/{quote file name}

use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;

pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

#[derive(Clone)]
pub struct FileStore {
    client: S3Client,
    bucket: String,
}

impl FileStore {
    pub fn new(client: S3Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    pub async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), AppError> {
        let size = body.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("upload of {key} failed: {e}")))?;

        info!("Stored s3://{}/{} ({size} bytes)", self.bucket, key);
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Bytes, AppError> {
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    AppError::NotFound(format!("File {key} does not exist"))
                } else {
                    AppError::Storage(format!("download of {key} failed: {e}"))
                }
            })?;

        let data = object
            .body
            .collect()
            .await
            .map_err(|e| AppError::Storage(format!("reading {key} failed: {e}")))?;
        Ok(data.into_bytes())
    }

    /// Deletes `key`. S3 treats deleting a missing key as success.
    pub async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("delete of {key} failed: {e}")))?;

        info!("Deleted s3://{}/{}", self.bucket, key);
        Ok(())
    }
}

/// Key for a freshly uploaded template file.
pub fn template_key(original_name: &str) -> String {
    format!("templates/{}_{}", Uuid::new_v4(), sanitize_file_name(original_name))
}

pub fn generated_key(file_name: &str) -> String {
    format!("generated/{file_name}")
}

/// Returns the last path segment of `key`.
pub fn file_name_of(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Keeps the file name safe for use as an object key segment.
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "template".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_key_layout() {
        let key = template_key("Quote v2.docx");
        assert!(key.starts_with("templates/"));
        assert!(key.ends_with("_Quote_v2.docx"), "got {key}");
    }

    #[test]
    fn test_sanitize_strips_directories() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name(r"C:\docs\quote.docx"), "quote.docx");
    }

    #[test]
    fn test_sanitize_empty_name() {
        assert_eq!(sanitize_file_name(".."), "template");
    }

    #[test]
    fn test_file_name_of() {
        assert_eq!(file_name_of("generated/quote_1.pdf"), "quote_1.pdf");
        assert_eq!(file_name_of("plain.txt"), "plain.txt");
    }
}
