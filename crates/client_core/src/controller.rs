//! The session context: owns every component of one browsing session and
//! turns named intents into state transitions.

use std::{sync::Arc, time::Duration};

use shared::domain::SessionId;
use tokio::{
    sync::{broadcast, mpsc, watch},
    time::{self, Instant},
};
use tracing::{info, warn};

use crate::{
    config::Settings,
    error::ClientError,
    generation::{Completion, GenerationKind, GenerationResult, GenerationService, GenerationSession},
    intake::{FileIntake, PhotoCandidate, StagedPhoto},
    parameters::{GenerationParameters, ParameterField, ParameterStore},
    progress::ProgressUpdate,
    templates::{
        DeleteConfirmation, DeleteOutcome, SelectedStyle, StyleTemplate, TemplateImage,
        TemplateRegistry, TemplateService,
    },
    transport::{HttpGenerationService, HttpTemplateService},
    view::{ViewController, ViewState, ViewTransform},
    SessionEvent,
};

/// One user action. Front ends translate their input into these.
#[derive(Debug, Clone)]
pub enum Intent {
    StagePhoto(PhotoCandidate),
    SetParameter { field: ParameterField, value: i64 },
    ResetParameters,
    SelectStyle(String),
    Generate,
    Regenerate,
    Retry,
    DismissError,
    ToggleAdjust,
    OpenViewer,
    CloseViewer,
    Zoom(f32),
    Rotate(i32),
    Reset,
    LoadTemplates,
    CreateTemplate {
        name: String,
        description: Option<String>,
        image: TemplateImage,
    },
    UpdateTemplate {
        name: String,
        description: Option<String>,
        image: Option<TemplateImage>,
    },
    DeleteTemplate {
        name: String,
    },
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StagePhoto(_) => "stage_photo",
            Self::SetParameter { .. } => "set_parameter",
            Self::ResetParameters => "reset_parameters",
            Self::SelectStyle(_) => "select_style",
            Self::Generate => "generate",
            Self::Regenerate => "regenerate",
            Self::Retry => "retry",
            Self::DismissError => "dismiss_error",
            Self::ToggleAdjust => "toggle_adjust",
            Self::OpenViewer => "open_viewer",
            Self::CloseViewer => "close_viewer",
            Self::Zoom(_) => "zoom",
            Self::Rotate(_) => "rotate",
            Self::Reset => "reset",
            Self::LoadTemplates => "load_templates",
            Self::CreateTemplate { .. } => "create_template",
            Self::UpdateTemplate { .. } => "update_template",
            Self::DeleteTemplate { .. } => "delete_template",
        }
    }
}

pub struct SessionController {
    id: SessionId,
    parameters: ParameterStore,
    intake: FileIntake,
    templates: TemplateRegistry,
    generation: GenerationSession,
    view: ViewController,
    confirmation: Arc<dyn DeleteConfirmation>,
    error_dismiss_delay: Duration,
    error_deadline: Option<Instant>,
    progress: Option<watch::Receiver<ProgressUpdate>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionController {
    pub fn new(
        settings: &Settings,
        generation_service: Arc<dyn GenerationService>,
        template_service: Arc<dyn TemplateService>,
        confirmation: Arc<dyn DeleteConfirmation>,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            id: SessionId::new(),
            parameters: ParameterStore::new(),
            intake: FileIntake::new(),
            templates: TemplateRegistry::new(template_service, settings.builtin_styles.clone()),
            generation: GenerationSession::new(generation_service, settings.progress_tick()),
            view: ViewController::new(),
            confirmation,
            error_dismiss_delay: settings.error_dismiss_delay(),
            error_deadline: None,
            progress: None,
            events,
        }
    }

    /// Wires the controller to the HTTP services named in `settings`.
    pub fn connect(
        settings: &Settings,
        confirmation: Arc<dyn DeleteConfirmation>,
    ) -> Result<Self, ClientError> {
        let generation =
            HttpGenerationService::new(&settings.service_url, settings.request_timeout())?;
        let templates =
            HttpTemplateService::new(settings.template_service_url(), settings.request_timeout())?;
        Ok(Self::new(
            settings,
            Arc::new(generation),
            Arc::new(templates),
            confirmation,
        ))
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn view_state(&self) -> &ViewState {
        self.view.state()
    }

    pub fn transform(&self) -> ViewTransform {
        self.view.transform()
    }

    pub fn is_viewer_open(&self) -> bool {
        self.view.is_viewer_open()
    }

    pub fn notice(&self) -> Option<&str> {
        self.view.notice()
    }

    pub fn parameters(&self) -> GenerationParameters {
        self.parameters.snapshot()
    }

    pub fn staged_photo(&self) -> Option<&StagedPhoto> {
        self.intake.staged()
    }

    pub fn selected_style(&self) -> &SelectedStyle {
        self.templates.selected()
    }

    pub fn builtin_styles(&self) -> &[String] {
        self.templates.builtins()
    }

    pub fn templates(&self) -> Vec<StyleTemplate> {
        self.templates.templates().cloned().collect()
    }

    pub fn current_result(&self) -> Option<&GenerationResult> {
        self.generation.current()
    }

    pub fn is_generating(&self) -> bool {
        self.generation.is_in_flight()
    }

    pub async fn dispatch(&mut self, intent: Intent) -> Result<(), ClientError> {
        let name = intent.name();
        let outcome = self.apply(intent).await;
        if let Err(err) = &outcome {
            warn!(session_id = %self.id, intent = name, "intent failed: {err}");
        }
        outcome
    }

    /// Waits for the in-flight generation and applies its outcome. Returns
    /// `None` when nothing is pending.
    pub async fn settle(&mut self) -> Option<Result<(), ClientError>> {
        let completion = self.generation.wait().await?;
        Some(self.complete(completion))
    }

    /// Leaves the error state once its display deadline has passed.
    pub fn expire_error(&mut self) -> bool {
        match self.error_deadline {
            Some(deadline) if Instant::now() >= deadline => self.dismiss_error(),
            _ => false,
        }
    }

    /// Event loop: intents, the in-flight response, the progress indicator
    /// and the error display timer, one at a time. Ends when every intent
    /// sender is dropped.
    pub async fn run(mut self, mut intents: mpsc::Receiver<Intent>) -> Self {
        info!(session_id = %self.id, "session loop started");
        loop {
            let in_flight = self.generation.is_in_flight();
            let has_deadline = self.error_deadline.is_some();
            let has_progress = self.progress.is_some();
            tokio::select! {
                intent = intents.recv() => match intent {
                    Some(intent) => {
                        if let Err(err) = self.dispatch(intent).await {
                            self.emit(SessionEvent::Error(err.user_message()));
                        }
                    }
                    None => break,
                },
                completion = self.generation.wait(), if in_flight => {
                    if let Some(completion) = completion {
                        let _ = self.complete(completion);
                    }
                }
                update = next_progress(self.progress.as_mut()), if has_progress => match update {
                    Some(update) => self.emit(SessionEvent::Progress(update)),
                    None => self.progress = None,
                },
                _ = sleep_until(self.error_deadline), if has_deadline => {
                    self.dismiss_error();
                }
            }
        }
        info!(session_id = %self.id, "session loop stopped");
        self
    }

    async fn apply(&mut self, intent: Intent) -> Result<(), ClientError> {
        match intent {
            Intent::StagePhoto(candidate) => {
                let photo = self.intake.stage(candidate).inspect_err(|err| {
                    self.view.reject(err.user_message());
                })?;
                self.emit(SessionEvent::PhotoStaged {
                    filename: photo.filename().to_string(),
                    byte_len: photo.byte_len(),
                });
            }
            Intent::SetParameter { field, value } => {
                self.parameters.set(field, value);
                self.emit(SessionEvent::ParametersChanged(self.parameters.snapshot()));
            }
            Intent::ResetParameters => {
                self.parameters.reset();
                self.emit(SessionEvent::ParametersChanged(self.parameters.snapshot()));
            }
            Intent::SelectStyle(name) => {
                let selected = self.templates.select(&name)?.name().to_string();
                self.emit(SessionEvent::StyleSelected(selected));
            }
            Intent::Generate => self.start_generation(GenerationKind::Fresh)?,
            Intent::Regenerate => {
                let showing_error = matches!(self.view.state(), ViewState::Error { .. });
                if !(self.view.has_result() || showing_error) || !self.generation.can_regenerate()
                {
                    let err = ClientError::NoOriginalPhoto;
                    self.view.reject(err.user_message());
                    return Err(err);
                }
                self.start_generation(GenerationKind::Regenerate)?;
            }
            Intent::Retry => {
                let ViewState::Error { retry, .. } = self.view.state() else {
                    return Ok(());
                };
                let retry = *retry;
                self.error_deadline = None;
                self.start_generation(retry)?;
            }
            Intent::DismissError => {
                self.dismiss_error();
            }
            Intent::ToggleAdjust => {
                if self.view.toggle_adjust() {
                    self.emit_view();
                }
            }
            Intent::OpenViewer => {
                if self.view.open_viewer() {
                    self.emit_view();
                }
            }
            Intent::CloseViewer => {
                self.view.close_viewer();
                self.emit_view();
            }
            Intent::Zoom(factor) => {
                if self.view.zoom(factor) {
                    self.emit(SessionEvent::TransformChanged(self.view.transform()));
                }
            }
            Intent::Rotate(degrees) => {
                if self.view.rotate(degrees) {
                    self.emit(SessionEvent::TransformChanged(self.view.transform()));
                }
            }
            Intent::Reset => self.reset(),
            Intent::LoadTemplates => {
                self.templates.load().await?;
                self.emit_templates();
            }
            Intent::CreateTemplate {
                name,
                description,
                image,
            } => {
                self.templates.create(&name, description, image).await?;
                self.emit_templates();
            }
            Intent::UpdateTemplate {
                name,
                description,
                image,
            } => {
                self.templates.update(&name, description, image).await?;
                self.emit_templates();
            }
            Intent::DeleteTemplate { name } => {
                let outcome = self
                    .templates
                    .delete(&name, self.confirmation.as_ref())
                    .await?;
                if outcome == DeleteOutcome::Deleted {
                    self.emit_templates();
                    self.emit(SessionEvent::StyleSelected(
                        self.templates.selected().name().to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    fn start_generation(&mut self, kind: GenerationKind) -> Result<(), ClientError> {
        if self.view.is_loading() || self.generation.is_in_flight() {
            return Err(ClientError::GenerationInFlight);
        }

        let parameters = self.parameters.snapshot();
        let submitted = match kind {
            GenerationKind::Fresh => match self.intake.staged() {
                Some(photo) => {
                    self.generation
                        .submit(photo, self.templates.selected(), parameters)
                }
                None => Err(ClientError::NoStagedPhoto),
            },
            GenerationKind::Regenerate => self.generation.submit_regenerate(parameters),
        };
        if let Err(err) = submitted {
            self.view.reject(err.user_message());
            return Err(err);
        }

        self.error_deadline = None;
        self.progress = self.generation.progress();
        self.view.begin_loading(kind);
        self.emit_view();
        Ok(())
    }

    fn complete(&mut self, completion: Completion) -> Result<(), ClientError> {
        self.progress = None;
        match completion.outcome {
            Ok(result) => {
                self.view.show_result();
                self.emit(SessionEvent::GenerationFinished {
                    style_name: result.style_name.clone(),
                    width: result.width,
                    height: result.height,
                    elapsed: result.elapsed,
                });
                self.emit_view();
                Ok(())
            }
            Err(err) => {
                self.view.show_error(err.user_message(), completion.kind);
                self.error_deadline = Some(Instant::now() + self.error_dismiss_delay);
                self.emit(SessionEvent::GenerationFailed {
                    message: err.user_message(),
                    retryable: err.is_retryable(),
                });
                self.emit_view();
                Err(err)
            }
        }
    }

    fn dismiss_error(&mut self) -> bool {
        self.error_deadline = None;
        let dismissed = self.view.dismiss_error();
        if dismissed {
            self.emit_view();
        }
        dismissed
    }

    fn reset(&mut self) {
        if self.generation.is_in_flight() {
            info!(session_id = %self.id, "reset while generating; pending response will be ignored");
        }
        self.generation.reset();
        self.intake.clear();
        self.parameters.reset();
        self.view.reset();
        self.error_deadline = None;
        self.progress = None;
        self.emit(SessionEvent::ParametersChanged(self.parameters.snapshot()));
        self.emit_view();
    }

    fn emit_view(&self) {
        self.emit(SessionEvent::ViewChanged(self.view.state().clone()));
    }

    fn emit_templates(&self) {
        self.emit(SessionEvent::TemplatesChanged(self.templates.template_names()));
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

async fn next_progress(
    progress: Option<&mut watch::Receiver<ProgressUpdate>>,
) -> Option<ProgressUpdate> {
    let progress = progress?;
    progress.changed().await.ok()?;
    let update = *progress.borrow_and_update();
    Some(update)
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
