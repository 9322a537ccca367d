use std::time::Duration;

pub mod config;
pub mod controller;
pub mod error;
pub mod generation;
pub mod intake;
pub mod parameters;
pub mod progress;
pub mod templates;
pub mod transport;
pub mod view;

pub use config::{load_settings, Settings};
pub use controller::{Intent, SessionController};
pub use error::ClientError;
pub use generation::{GenerationKind, GenerationResult, GenerationService, GenerationSession};
pub use intake::{FileIntake, PhotoCandidate, StagedPhoto};
pub use parameters::{GenerationParameters, ParameterField, ParameterStore};
pub use progress::{ProgressPhase, ProgressUpdate};
pub use templates::{
    AlwaysConfirm, DeleteConfirmation, DeleteOutcome, SelectedStyle, StyleTemplate,
    TemplateImage, TemplateRegistry, TemplateService,
};
pub use transport::{HttpGenerationService, HttpTemplateService};
pub use view::{ViewController, ViewState, ViewTransform};

/// Broadcast to every subscriber of a [`SessionController`].
#[derive(Debug, Clone)]
pub enum SessionEvent {
    ViewChanged(ViewState),
    PhotoStaged {
        filename: String,
        byte_len: u64,
    },
    ParametersChanged(GenerationParameters),
    StyleSelected(String),
    TemplatesChanged(Vec<String>),
    TransformChanged(ViewTransform),
    Progress(ProgressUpdate),
    GenerationFinished {
        style_name: String,
        width: u32,
        height: u32,
        elapsed: Duration,
    },
    GenerationFailed {
        message: String,
        retryable: bool,
    },
    Error(String),
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;
