//! Shared fakes and fixtures for unit tests.

use std::{
    collections::{BTreeMap, VecDeque},
    io::Cursor,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use shared::{
    error::ResponseStatus,
    protocol::{GenerateResponse, TemplateListResponse, TemplateMutationResponse, TemplateRecord},
};
use tokio::sync::Notify;

use crate::{
    generation::{GenerationRequest, GenerationService},
    templates::{DeleteConfirmation, TemplateUpload, TemplateService},
};

pub(crate) fn png_fixture(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([250, 210, 40, 255]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)
        .expect("encode png fixture");
    out.into_inner()
}

pub(crate) fn png_data_url(width: u32, height: u32) -> String {
    format!(
        "data:image/png;base64,{}",
        STANDARD.encode(png_fixture(width, height))
    )
}

pub(crate) fn success_response(width: u32, height: u32) -> GenerateResponse {
    GenerateResponse {
        status: ResponseStatus::Success,
        image: Some(png_data_url(width, height)),
        message: Some("generated".into()),
    }
}

pub(crate) fn rejected_response(message: &str) -> GenerateResponse {
    GenerateResponse {
        status: ResponseStatus::Error,
        image: None,
        message: Some(message.into()),
    }
}

/// Answers generation requests from a script; falls back to an 8x6 PNG.
#[derive(Default)]
pub(crate) struct ScriptedGenerationService {
    responses: Mutex<VecDeque<Result<GenerateResponse, String>>>,
    pub requests: Mutex<Vec<GenerationRequest>>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedGenerationService {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every request waits for one `notify_one` on the returned handle.
    pub(crate) fn gated() -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let service = Self {
            gate: Some(Arc::clone(&gate)),
            ..Self::default()
        };
        (service, gate)
    }

    pub(crate) fn push_response(&self, response: GenerateResponse) {
        self.responses.lock().expect("lock").push_back(Ok(response));
    }

    pub(crate) fn push_transport_error(&self, message: &str) {
        self.responses
            .lock()
            .expect("lock")
            .push_back(Err(message.to_string()));
    }

    pub(crate) fn recorded(&self) -> Vec<GenerationRequest> {
        self.requests.lock().expect("lock").clone()
    }
}

#[async_trait]
impl GenerationService for ScriptedGenerationService {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerateResponse> {
        self.requests.lock().expect("lock").push(request.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let next = self.responses.lock().expect("lock").pop_front();
        match next {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(success_response(8, 6)),
        }
    }
}

/// In-memory template catalogue that records every mutation it receives.
#[derive(Default)]
pub(crate) struct FakeTemplateService {
    catalogue: Mutex<BTreeMap<String, TemplateRecord>>,
    uploads: Mutex<Vec<TemplateUpload>>,
    deletes: Mutex<Vec<String>>,
    fail_list: AtomicBool,
    reject_with: Mutex<Option<String>>,
    lowercase_names: AtomicBool,
}

impl FakeTemplateService {
    pub(crate) fn with_templates(names: &[&str]) -> Self {
        let service = Self::default();
        {
            let mut catalogue = service.catalogue.lock().expect("lock");
            for name in names {
                catalogue.insert(name.to_string(), record(name, None));
            }
        }
        service
    }

    pub(crate) fn set_list_failure(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn reject_mutations(&self, message: &str) {
        *self.reject_with.lock().expect("lock") = Some(message.to_string());
    }

    pub(crate) fn lowercase_names(&self) {
        self.lowercase_names.store(true, Ordering::SeqCst);
    }

    pub(crate) fn mutation_count(&self) -> usize {
        self.uploads.lock().expect("lock").len() + self.deletes.lock().expect("lock").len()
    }

    pub(crate) fn uploads(&self) -> Vec<TemplateUpload> {
        self.uploads.lock().expect("lock").clone()
    }

    pub(crate) fn remote_names(&self) -> Vec<String> {
        self.catalogue.lock().expect("lock").keys().cloned().collect()
    }

    fn rejection(&self) -> Option<TemplateMutationResponse> {
        self.reject_with
            .lock()
            .expect("lock")
            .clone()
            .map(|message| TemplateMutationResponse {
                status: ResponseStatus::Error,
                message: Some(message),
            })
    }
}

fn record(name: &str, description: Option<String>) -> TemplateRecord {
    TemplateRecord {
        description,
        image: format!("/static/custom/{name}.png"),
    }
}

fn accepted() -> TemplateMutationResponse {
    TemplateMutationResponse {
        status: ResponseStatus::Success,
        message: Some("ok".into()),
    }
}

#[async_trait]
impl TemplateService for FakeTemplateService {
    async fn list(&self) -> Result<TemplateListResponse> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(anyhow!("connection refused"));
        }
        Ok(TemplateListResponse {
            status: ResponseStatus::Success,
            templates: self.catalogue.lock().expect("lock").clone(),
            message: None,
        })
    }

    async fn upload(&self, upload: TemplateUpload) -> Result<TemplateMutationResponse> {
        self.uploads.lock().expect("lock").push(upload.clone());
        if let Some(rejection) = self.rejection() {
            return Ok(rejection);
        }
        let name = if self.lowercase_names.load(Ordering::SeqCst) {
            upload.style_name.to_lowercase()
        } else {
            upload.style_name.clone()
        };
        // Like a form POST: a missing description overwrites the stored one.
        self.catalogue
            .lock()
            .expect("lock")
            .insert(name.clone(), record(&name, upload.description));
        Ok(accepted())
    }

    async fn delete(&self, style_name: &str) -> Result<TemplateMutationResponse> {
        self.deletes.lock().expect("lock").push(style_name.to_string());
        if let Some(rejection) = self.rejection() {
            return Ok(rejection);
        }
        self.catalogue.lock().expect("lock").remove(style_name);
        Ok(accepted())
    }
}

pub(crate) struct Decline;

#[async_trait]
impl DeleteConfirmation for Decline {
    async fn confirm_delete(&self, _style_name: &str) -> bool {
        false
    }
}
