//! Failure taxonomy for the session controller and its components.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("unsupported file type '{mime}'; upload a JPG, PNG or GIF image")]
    InvalidFileType { mime: String },
    #[error("file is {size} bytes; photos may not exceed {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },
    #[error("template image must be a PNG, got '{mime}'")]
    InvalidTemplateFormat { mime: String },
    #[error("template image is {size} bytes; templates may not exceed {limit} bytes")]
    TemplateTooLarge { size: u64, limit: u64 },
    #[error("template name must not be empty")]
    InvalidTemplateName,
    #[error("a style named '{0}' already exists")]
    DuplicateName(String),
    #[error("no template named '{0}'")]
    NotFound(String),
    #[error("unknown style '{0}'")]
    UnknownStyle(String),
    #[error("select a photo before generating")]
    NoStagedPhoto,
    #[error("no original photo is available to regenerate from")]
    NoOriginalPhoto,
    #[error("a generation request is already in flight")]
    GenerationInFlight,
    #[error("network error: {0}")]
    Network(String),
    #[error("{0}")]
    GenerationRejected(String),
    #[error("template service rejected the request: {0}")]
    TemplateRejected(String),
    #[error("template registry unavailable: {0}")]
    RegistryUnavailable(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// Errors caught before any request leaves the client.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidFileType { .. }
                | Self::FileTooLarge { .. }
                | Self::InvalidTemplateFormat { .. }
                | Self::TemplateTooLarge { .. }
                | Self::InvalidTemplateName
                | Self::DuplicateName(_)
                | Self::NotFound(_)
                | Self::UnknownStyle(_)
                | Self::NoStagedPhoto
                | Self::NoOriginalPhoto
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RegistryUnavailable(_))
    }

    /// Text shown to the user. Service-supplied messages pass through verbatim.
    pub fn user_message(&self) -> String {
        match self {
            Self::GenerationRejected(message) | Self::TemplateRejected(message) => message.clone(),
            Self::Network(_) => format!("{self}; please try again"),
            other => other.to_string(),
        }
    }
}
