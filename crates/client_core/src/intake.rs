use std::sync::Arc;

use shared::domain::ImageFormat;
use tracing::{debug, info};

use crate::error::ClientError;

pub const MAX_PHOTO_BYTES: u64 = 5 * 1024 * 1024;

/// A file offered by the user, before validation.
#[derive(Debug, Clone)]
pub struct PhotoCandidate {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl PhotoCandidate {
    pub fn new(filename: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn byte_len(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// A validated photo. Content is shared, so clones handed to a generation
/// request point at the same bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedPhoto {
    content: Arc<[u8]>,
    format: ImageFormat,
    mime_type: String,
    filename: String,
}

impl StagedPhoto {
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// The MIME type exactly as the user's file declared it.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn byte_len(&self) -> u64 {
        self.content.len() as u64
    }

    pub fn shares_content_with(&self, other: &StagedPhoto) -> bool {
        Arc::ptr_eq(&self.content, &other.content)
    }
}

#[derive(Debug, Default)]
pub struct FileIntake {
    staged: Option<StagedPhoto>,
}

impl FileIntake {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates type first, then size. A rejected candidate never touches
    /// the currently staged photo.
    pub fn stage(&mut self, candidate: PhotoCandidate) -> Result<StagedPhoto, ClientError> {
        let Some(format) = ImageFormat::from_mime(&candidate.mime_type) else {
            debug!(mime = %candidate.mime_type, "intake: rejected file type");
            return Err(ClientError::InvalidFileType {
                mime: candidate.mime_type,
            });
        };

        let size = candidate.byte_len();
        if size > MAX_PHOTO_BYTES {
            debug!(size, "intake: rejected oversized file");
            return Err(ClientError::FileTooLarge {
                size,
                limit: MAX_PHOTO_BYTES,
            });
        }

        let photo = StagedPhoto {
            content: Arc::from(candidate.bytes),
            format,
            mime_type: candidate.mime_type,
            filename: candidate.filename,
        };
        info!(
            filename = %photo.filename,
            mime = %photo.mime_type,
            size,
            replaced = self.staged.is_some(),
            "intake: photo staged"
        );
        self.staged = Some(photo.clone());
        Ok(photo)
    }

    pub fn staged(&self) -> Option<&StagedPhoto> {
        self.staged.as_ref()
    }

    pub fn can_generate(&self) -> bool {
        self.staged.is_some()
    }

    pub fn clear(&mut self) {
        self.staged = None;
    }
}

#[cfg(test)]
#[path = "tests/intake_tests.rs"]
mod tests;
