use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use crate::error::ResponseStatus;

pub mod fields {
    pub const PHOTO: &str = "photo";
    pub const STYLE: &str = "style";
    pub const BRIGHTEN_FACTOR: &str = "brighten_factor";
    pub const DARKEN_FACTOR: &str = "darken_factor";
    pub const LOW_CUTOFF_PERCENT: &str = "low_cutoff_percent";
    pub const HIGH_CUTOFF_PERCENT: &str = "high_cutoff_percent";
    pub const BORDER_CLEANUP_PIXELS: &str = "border_cleanup_pixels";

    pub const STYLE_NAME: &str = "style_name";
    pub const DESCRIPTION: &str = "description";
    pub const TEMPLATE: &str = "template";
}

pub mod routes {
    pub const GENERATE: &str = "generate";
    pub const TEMPLATES: &str = "templates";
    pub const TEMPLATES_UPLOAD: &str = "templates/upload";
    pub const TEMPLATES_DELETE: &str = "templates/delete";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub status: ResponseStatus,
    /// `data:<mime>;base64,<payload>` on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub image: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateListResponse {
    pub status: ResponseStatus,
    #[serde(default)]
    pub templates: BTreeMap<String, TemplateRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateMutationResponse {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteTemplateRequest {
    pub style_name: String,
}

/// Splits a `data:` URL into its MIME type and base64 payload.
pub fn split_data_url(url: &str) -> Option<(&str, &str)> {
    let rest = url.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    let mime = meta.strip_suffix(";base64")?;
    Some((mime, payload))
}
