use std::path::PathBuf;

use async_trait::async_trait;
use axum::body::Bytes;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;

/// An uploaded file as received from the multipart form.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl Upload {
    /// Only jpg, jpeg and png are accepted. The content type wins over the
    /// file name when both are present.
    pub fn image_extension(&self) -> Result<&'static str, AppError> {
        let by_type = match self.content_type.as_deref() {
            Some("image/png") => Some("png"),
            Some("image/jpeg") | Some("image/jpg") => Some("jpg"),
            _ => None,
        };
        let by_name = self
            .file_name
            .as_deref()
            .and_then(|name| name.rsplit_once('.'))
            .and_then(|(_, ext)| match ext.to_ascii_lowercase().as_str() {
                "png" => Some("png"),
                "jpg" | "jpeg" => Some("jpg"),
                _ => None,
            });

        by_type
            .or(by_name)
            .ok_or_else(|| AppError::Validation("Only jpg, jpeg and png images are allowed".to_string()))
    }
}

/// Where profile pictures go. Returns the public URL of the stored file.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn store(&self, user_id: i64, upload: &Upload) -> Result<String, AppError>;
}

pub struct LocalMediaStore {
    root: PathBuf,
    base_url: String,
}

impl LocalMediaStore {
    pub fn new(root: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn store(&self, user_id: i64, upload: &Upload) -> Result<String, AppError> {
        let ext = upload.image_extension()?;
        if upload.bytes.is_empty() {
            return Err(AppError::Validation("Profile picture file is empty".to_string()));
        }

        let file_name = format!("user_{user_id}_{}.{ext}", Uuid::new_v4().simple());
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.root.join(&file_name), &upload.bytes).await?;

        info!(user_id, file = %file_name, size = upload.bytes.len(), "stored profile picture");
        Ok(format!("{}/uploads/{file_name}", self.base_url))
    }
}
