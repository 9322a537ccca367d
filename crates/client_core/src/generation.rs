use std::{
    io::Cursor,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::Result;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use shared::{
    domain::RequestId,
    error::{ResponseStatus, ServiceFailure},
    protocol::{fields, split_data_url, GenerateResponse},
};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{info, warn};

use crate::{
    error::ClientError,
    intake::StagedPhoto,
    parameters::GenerationParameters,
    progress::{ProgressIndicator, ProgressUpdate, DEFAULT_STEP_PERCENT},
    templates::SelectedStyle,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationKind {
    Fresh,
    Regenerate,
}

/// One fully specified submission. Parameters are always sent, defaults
/// included.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub request_id: RequestId,
    pub kind: GenerationKind,
    pub photo: StagedPhoto,
    pub style: String,
    pub parameters: GenerationParameters,
}

impl GenerationRequest {
    /// Text fields of the multipart body; the photo travels as its own part.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut form = Vec::with_capacity(6);
        form.push((fields::STYLE, self.style.clone()));
        form.extend(
            self.parameters
                .entries()
                .into_iter()
                .map(|(field, value)| (field.wire_name(), value.to_string())),
        );
        form
    }
}

#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerateResponse>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    pub request_id: RequestId,
    pub image: Vec<u8>,
    pub mime_type: String,
    pub elapsed: Duration,
    pub timestamp: DateTime<Utc>,
    pub style_name: String,
    pub width: u32,
    pub height: u32,
    pub encoded_size: usize,
    pub parameters: GenerationParameters,
}

impl GenerationResult {
    pub fn suggested_filename(&self) -> String {
        let style: String = self
            .style_name
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        format!("emoji_{style}_{}.png", self.timestamp.format("%Y%m%d_%H%M%S"))
    }
}

#[derive(Debug)]
pub struct Completion {
    pub request_id: RequestId,
    pub kind: GenerationKind,
    pub outcome: Result<GenerationResult, ClientError>,
}

struct InFlight {
    request_id: RequestId,
    kind: GenerationKind,
    task: JoinHandle<Result<GenerationResult, ClientError>>,
    progress: ProgressIndicator,
}

/// Photo and style of the last successful fresh generation.
#[derive(Debug, Clone)]
struct OriginalInputs {
    photo: StagedPhoto,
    style: SelectedStyle,
}

pub struct GenerationSession {
    service: Arc<dyn GenerationService>,
    progress_tick: Duration,
    in_flight: Option<InFlight>,
    pending_original: Option<OriginalInputs>,
    original: Option<OriginalInputs>,
    current: Option<GenerationResult>,
}

impl GenerationSession {
    pub fn new(service: Arc<dyn GenerationService>, progress_tick: Duration) -> Self {
        Self {
            service,
            progress_tick,
            in_flight: None,
            pending_original: None,
            original: None,
            current: None,
        }
    }

    pub async fn generate(
        &mut self,
        photo: &StagedPhoto,
        style: &SelectedStyle,
        parameters: GenerationParameters,
    ) -> Result<GenerationResult, ClientError> {
        self.submit(photo, style, parameters)?;
        self.finish().await
    }

    pub async fn regenerate(
        &mut self,
        parameters: GenerationParameters,
    ) -> Result<GenerationResult, ClientError> {
        self.submit_regenerate(parameters)?;
        self.finish().await
    }

    /// Starts a fresh request without waiting for it.
    pub fn submit(
        &mut self,
        photo: &StagedPhoto,
        style: &SelectedStyle,
        parameters: GenerationParameters,
    ) -> Result<RequestId, ClientError> {
        let inputs = OriginalInputs {
            photo: photo.clone(),
            style: style.clone(),
        };
        let request_id = self.spawn(GenerationKind::Fresh, &inputs, parameters)?;
        self.pending_original = Some(inputs);
        Ok(request_id)
    }

    /// Starts a request reusing the original photo and style with a new
    /// parameter snapshot.
    pub fn submit_regenerate(
        &mut self,
        parameters: GenerationParameters,
    ) -> Result<RequestId, ClientError> {
        let inputs = self.original.clone().ok_or(ClientError::NoOriginalPhoto)?;
        self.spawn(GenerationKind::Regenerate, &inputs, parameters)
    }

    /// Waits for the in-flight request. Returns `None` when nothing is
    /// pending. Dropping the future before it resolves leaves the request
    /// in flight.
    pub async fn wait(&mut self) -> Option<Completion> {
        let in_flight = self.in_flight.as_mut()?;
        let joined = (&mut in_flight.task).await;
        let in_flight = self.in_flight.take()?;
        in_flight.progress.cancel();

        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(err) => Err(ClientError::Network(format!(
                "generation task ended unexpectedly: {err}"
            ))),
        };

        match &outcome {
            Ok(result) => {
                if in_flight.kind == GenerationKind::Fresh {
                    self.original = self.pending_original.take();
                }
                self.current = Some(result.clone());
            }
            Err(err) => {
                self.pending_original = None;
                warn!(request_id = %in_flight.request_id, "generation failed: {err}");
            }
        }

        Some(Completion {
            request_id: in_flight.request_id,
            kind: in_flight.kind,
            outcome,
        })
    }

    /// Aborts the in-flight request, if any, and stops its progress
    /// indicator. A response that was already on its way is never read.
    pub fn cancel(&mut self) -> bool {
        let Some(in_flight) = self.in_flight.take() else {
            return false;
        };
        in_flight.task.abort();
        in_flight.progress.cancel();
        self.pending_original = None;
        info!(request_id = %in_flight.request_id, "generation cancelled");
        true
    }

    pub fn reset(&mut self) {
        self.cancel();
        self.original = None;
        self.current = None;
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn in_flight_kind(&self) -> Option<GenerationKind> {
        self.in_flight.as_ref().map(|in_flight| in_flight.kind)
    }

    pub fn progress(&self) -> Option<watch::Receiver<ProgressUpdate>> {
        self.in_flight
            .as_ref()
            .map(|in_flight| in_flight.progress.subscribe())
    }

    pub fn current(&self) -> Option<&GenerationResult> {
        self.current.as_ref()
    }

    pub fn original_photo(&self) -> Option<&StagedPhoto> {
        self.original.as_ref().map(|inputs| &inputs.photo)
    }

    pub fn original_style(&self) -> Option<&SelectedStyle> {
        self.original.as_ref().map(|inputs| &inputs.style)
    }

    pub fn can_regenerate(&self) -> bool {
        self.original.is_some()
    }

    async fn finish(&mut self) -> Result<GenerationResult, ClientError> {
        match self.wait().await {
            Some(completion) => completion.outcome,
            None => Err(ClientError::Network("generation was cancelled".into())),
        }
    }

    fn spawn(
        &mut self,
        kind: GenerationKind,
        inputs: &OriginalInputs,
        parameters: GenerationParameters,
    ) -> Result<RequestId, ClientError> {
        if self.in_flight.is_some() {
            return Err(ClientError::GenerationInFlight);
        }

        let request = GenerationRequest {
            request_id: RequestId::new(),
            kind,
            photo: inputs.photo.clone(),
            style: inputs.style.name().to_string(),
            parameters,
        };
        let request_id = request.request_id;
        let service = Arc::clone(&self.service);

        info!(
            request_id = %request_id,
            kind = ?kind,
            style = %request.style,
            photo_bytes = request.photo.byte_len(),
            "generation submitted"
        );

        let task = tokio::spawn(async move {
            let started = Instant::now();
            let response = service.generate(&request).await;
            let elapsed = started.elapsed();
            interpret_response(response, &request, elapsed)
        });

        self.in_flight = Some(InFlight {
            request_id,
            kind,
            task,
            progress: ProgressIndicator::start(self.progress_tick, DEFAULT_STEP_PERCENT),
        });
        Ok(request_id)
    }
}

fn interpret_response(
    response: Result<GenerateResponse>,
    request: &GenerationRequest,
    elapsed: Duration,
) -> Result<GenerationResult, ClientError> {
    let response = response.map_err(|err| ClientError::Network(err.to_string()))?;

    if response.status == ResponseStatus::Error {
        let failure = ServiceFailure::from_body(None, response.message, "generation failed");
        return Err(ClientError::GenerationRejected(failure.message));
    }

    let data_url = response
        .image
        .ok_or_else(|| ClientError::Network("response is missing the image payload".into()))?;
    let (mime_type, payload) = split_data_url(&data_url)
        .ok_or_else(|| ClientError::Network("image payload is not a base64 data url".into()))?;
    let image = STANDARD
        .decode(payload.trim())
        .map_err(|err| ClientError::Network(format!("invalid base64 image payload: {err}")))?;
    let (width, height) = image::ImageReader::new(Cursor::new(&image))
        .with_guessed_format()
        .map_err(|err| ClientError::Network(format!("unreadable image payload: {err}")))?
        .into_dimensions()
        .map_err(|err| ClientError::Network(format!("unreadable image payload: {err}")))?;

    info!(
        request_id = %request.request_id,
        style = %request.style,
        elapsed_ms = elapsed.as_millis() as u64,
        width,
        height,
        "generation succeeded"
    );

    Ok(GenerationResult {
        request_id: request.request_id,
        mime_type: mime_type.to_string(),
        encoded_size: image.len(),
        image,
        elapsed,
        timestamp: Utc::now(),
        style_name: request.style.clone(),
        width,
        height,
        parameters: request.parameters,
    })
}

#[cfg(test)]
#[path = "tests/generation_tests.rs"]
mod tests;
