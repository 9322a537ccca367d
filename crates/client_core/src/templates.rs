//! Client-side mirror of the remote custom-template catalogue, plus the
//! style selection that points either at a built-in style or at a template.

use std::{collections::BTreeMap, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use shared::{
    domain::{ImageFormat, DEFAULT_STYLE},
    error::{ResponseStatus, ServiceFailure},
    protocol::{TemplateListResponse, TemplateMutationResponse},
};
use tracing::{info, warn};

use crate::error::ClientError;

pub const MAX_TEMPLATE_BYTES: u64 = 2 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleTemplate {
    pub name: String,
    pub description: Option<String>,
    pub image_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateImage {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl TemplateImage {
    pub fn new(filename: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Template assets must be PNG and at most [`MAX_TEMPLATE_BYTES`].
    pub fn validate(&self) -> Result<(), ClientError> {
        if ImageFormat::from_mime(&self.mime_type) != Some(ImageFormat::Png) {
            return Err(ClientError::InvalidTemplateFormat {
                mime: self.mime_type.clone(),
            });
        }
        let size = self.bytes.len() as u64;
        if size > MAX_TEMPLATE_BYTES {
            return Err(ClientError::TemplateTooLarge {
                size,
                limit: MAX_TEMPLATE_BYTES,
            });
        }
        Ok(())
    }
}

/// Payload of a create-or-update submission.
#[derive(Debug, Clone)]
pub struct TemplateUpload {
    pub style_name: String,
    pub description: Option<String>,
    pub image: Option<TemplateImage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateStatus {
    Absent,
    PendingCreate,
    Live,
    PendingUpdate,
    PendingDelete,
}

#[derive(Debug, Clone)]
struct TemplateEntry {
    template: StyleTemplate,
    status: TemplateStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectedStyle {
    Builtin(String),
    Custom(String),
}

impl SelectedStyle {
    pub fn name(&self) -> &str {
        match self {
            Self::Builtin(name) | Self::Custom(name) => name,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }
}

impl Default for SelectedStyle {
    fn default() -> Self {
        Self::Builtin(DEFAULT_STYLE.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    Declined,
}

#[async_trait]
pub trait TemplateService: Send + Sync {
    async fn list(&self) -> Result<TemplateListResponse>;
    async fn upload(&self, upload: TemplateUpload) -> Result<TemplateMutationResponse>;
    async fn delete(&self, style_name: &str) -> Result<TemplateMutationResponse>;
}

/// Asks the user to confirm a destructive template operation.
#[async_trait]
pub trait DeleteConfirmation: Send + Sync {
    async fn confirm_delete(&self, style_name: &str) -> bool;
}

pub struct AlwaysConfirm;

#[async_trait]
impl DeleteConfirmation for AlwaysConfirm {
    async fn confirm_delete(&self, _style_name: &str) -> bool {
        true
    }
}

pub struct TemplateRegistry {
    service: Arc<dyn TemplateService>,
    builtins: Vec<String>,
    entries: BTreeMap<String, TemplateEntry>,
    selected: SelectedStyle,
}

impl TemplateRegistry {
    pub fn new(service: Arc<dyn TemplateService>, builtins: Vec<String>) -> Self {
        let mut builtins = builtins;
        if !builtins.iter().any(|name| name == DEFAULT_STYLE) {
            builtins.insert(0, DEFAULT_STYLE.to_string());
        }
        Self {
            service,
            builtins,
            entries: BTreeMap::new(),
            selected: SelectedStyle::default(),
        }
    }

    pub fn builtins(&self) -> &[String] {
        &self.builtins
    }

    pub fn templates(&self) -> impl Iterator<Item = &StyleTemplate> {
        self.entries
            .values()
            .filter(|entry| entry.status != TemplateStatus::PendingCreate)
            .map(|entry| &entry.template)
    }

    pub fn template_names(&self) -> Vec<String> {
        self.templates().map(|t| t.name.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&StyleTemplate> {
        self.entries.get(name).map(|entry| &entry.template)
    }

    pub fn status(&self, name: &str) -> TemplateStatus {
        self.entries
            .get(name)
            .map_or(TemplateStatus::Absent, |entry| entry.status)
    }

    pub fn selected(&self) -> &SelectedStyle {
        &self.selected
    }

    pub fn select(&mut self, name: &str) -> Result<&SelectedStyle, ClientError> {
        let name = name.trim();
        if self.builtins.iter().any(|builtin| builtin == name) {
            self.selected = SelectedStyle::Builtin(name.to_string());
        } else if self.status(name) == TemplateStatus::Live {
            self.selected = SelectedStyle::Custom(name.to_string());
        } else {
            return Err(ClientError::UnknownStyle(name.to_string()));
        }
        Ok(&self.selected)
    }

    pub fn reset_selection(&mut self) {
        self.selected = SelectedStyle::default();
    }

    /// Replaces the mirror with the remote catalogue. On failure the previous
    /// mirror stays usable.
    pub async fn load(&mut self) -> Result<usize, ClientError> {
        let response = self
            .service
            .list()
            .await
            .map_err(|err| ClientError::RegistryUnavailable(err.to_string()))?;
        if response.status != ResponseStatus::Success {
            let failure =
                ServiceFailure::from_body(None, response.message, "template listing failed");
            return Err(ClientError::RegistryUnavailable(failure.message));
        }

        self.entries = response
            .templates
            .into_iter()
            .map(|(name, record)| {
                let entry = TemplateEntry {
                    template: StyleTemplate {
                        name: name.clone(),
                        description: record.description,
                        image_ref: record.image,
                    },
                    status: TemplateStatus::Live,
                };
                (name, entry)
            })
            .collect();

        if let SelectedStyle::Custom(name) = &self.selected {
            if !self.entries.contains_key(name) {
                warn!(style = %name, "templates: selected template vanished remotely; reverting to default");
                self.reset_selection();
            }
        }

        info!(count = self.entries.len(), "templates: catalogue loaded");
        Ok(self.entries.len())
    }

    pub async fn create(
        &mut self,
        name: &str,
        description: Option<String>,
        image: TemplateImage,
    ) -> Result<(), ClientError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ClientError::InvalidTemplateName);
        }
        if self.builtins.iter().any(|builtin| builtin == name)
            || self.status(name) != TemplateStatus::Absent
        {
            return Err(ClientError::DuplicateName(name.to_string()));
        }
        image.validate()?;

        self.entries.insert(
            name.to_string(),
            TemplateEntry {
                template: StyleTemplate {
                    name: name.to_string(),
                    description: description.clone(),
                    image_ref: image.filename.clone(),
                },
                status: TemplateStatus::PendingCreate,
            },
        );

        let upload = TemplateUpload {
            style_name: name.to_string(),
            description,
            image: Some(image),
        };
        if let Err(err) = self.submit_upload(upload).await {
            self.entries.remove(name);
            return Err(err);
        }

        info!(style = %name, "templates: created");
        self.resync(name).await;
        Ok(())
    }

    pub async fn update(
        &mut self,
        name: &str,
        description: Option<String>,
        image: Option<TemplateImage>,
    ) -> Result<(), ClientError> {
        let name = name.trim();
        if self.status(name) != TemplateStatus::Live {
            return Err(ClientError::NotFound(name.to_string()));
        }
        if let Some(image) = &image {
            image.validate()?;
        }

        // The upload form always carries a description, so an image-only
        // update resends the one already stored.
        let description = description.or_else(|| {
            self.get(name)
                .and_then(|template| template.description.clone())
        });
        self.set_status(name, TemplateStatus::PendingUpdate);
        let upload = TemplateUpload {
            style_name: name.to_string(),
            description: description.clone(),
            image,
        };
        if let Err(err) = self.submit_upload(upload).await {
            self.set_status(name, TemplateStatus::Live);
            return Err(err);
        }

        if let Some(entry) = self.entries.get_mut(name) {
            if description.is_some() {
                entry.template.description = description;
            }
        }
        info!(style = %name, "templates: updated");
        self.resync(name).await;
        Ok(())
    }

    pub async fn delete(
        &mut self,
        name: &str,
        confirmation: &dyn DeleteConfirmation,
    ) -> Result<DeleteOutcome, ClientError> {
        let name = name.trim();
        if self.status(name) != TemplateStatus::Live {
            return Err(ClientError::NotFound(name.to_string()));
        }
        if !confirmation.confirm_delete(name).await {
            info!(style = %name, "templates: delete declined");
            return Ok(DeleteOutcome::Declined);
        }

        self.set_status(name, TemplateStatus::PendingDelete);
        let outcome = match self.service.delete(name).await {
            Ok(response) => check_mutation(response),
            Err(err) => Err(ClientError::Network(err.to_string())),
        };
        if let Err(err) = outcome {
            self.set_status(name, TemplateStatus::Live);
            return Err(err);
        }

        self.entries.remove(name);
        if self.selected == SelectedStyle::Custom(name.to_string()) {
            self.reset_selection();
        }
        info!(style = %name, "templates: deleted");
        self.resync(name).await;
        Ok(DeleteOutcome::Deleted)
    }

    async fn submit_upload(&self, upload: TemplateUpload) -> Result<(), ClientError> {
        let response = self
            .service
            .upload(upload)
            .await
            .map_err(|err| ClientError::Network(err.to_string()))?;
        check_mutation(response)
    }

    /// The mutation already succeeded remotely; a failed refresh only leaves
    /// the mirror stale, so the pending entry is promoted locally instead.
    async fn resync(&mut self, name: &str) {
        if let Err(err) = self.load().await {
            warn!(style = %name, "templates: resync after mutation failed: {err}");
            if let Some(entry) = self.entries.get_mut(name) {
                entry.status = TemplateStatus::Live;
            }
        }
    }

    fn set_status(&mut self, name: &str, status: TemplateStatus) {
        if let Some(entry) = self.entries.get_mut(name) {
            entry.status = status;
        }
    }
}

fn check_mutation(response: TemplateMutationResponse) -> Result<(), ClientError> {
    match response.status {
        ResponseStatus::Success => Ok(()),
        ResponseStatus::Error => {
            let failure =
                ServiceFailure::from_body(None, response.message, "template operation failed");
            Err(ClientError::TemplateRejected(failure.message))
        }
    }
}

#[cfg(test)]
#[path = "tests/templates_tests.rs"]
mod tests;
