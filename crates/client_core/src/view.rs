//! Which region of the UI is visible, plus the zoom/rotation applied to the
//! rendered result.

use tracing::debug;

use crate::generation::GenerationKind;

pub const MIN_SCALE: f32 = 0.1;
pub const MAX_SCALE: f32 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    rotation_degrees: u16,
    scale_factor: f32,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl ViewTransform {
    pub const fn identity() -> Self {
        Self {
            rotation_degrees: 0,
            scale_factor: 1.0,
        }
    }

    pub fn rotation_degrees(&self) -> u16 {
        self.rotation_degrees
    }

    pub fn scale_factor(&self) -> f32 {
        self.scale_factor
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    /// Rotates by `degrees`, snapped to the nearest quarter turn.
    pub fn rotate(&mut self, degrees: i32) {
        let quarter_turns = (f64::from(degrees) / 90.0).round() as i64;
        let total = i64::from(self.rotation_degrees) + quarter_turns * 90;
        self.rotation_degrees = total.rem_euclid(360) as u16;
    }

    /// Multiplies the scale; non-positive or non-finite factors are ignored.
    pub fn zoom(&mut self, factor: f32) {
        if !factor.is_finite() || factor <= 0.0 {
            debug!(factor, "view: ignoring invalid zoom factor");
            return;
        }
        self.scale_factor = (self.scale_factor * factor).clamp(MIN_SCALE, MAX_SCALE);
    }

    pub fn reset(&mut self) {
        *self = Self::identity();
    }
}

/// Stable sections the view can fall back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Upload,
    Result,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewState {
    Upload,
    Loading {
        kind: GenerationKind,
    },
    /// `adjust_open` is the Adjust(Result) sub-state.
    Result {
        adjust_open: bool,
    },
    Error {
        message: String,
        return_to: Section,
        retry: GenerationKind,
    },
}

impl ViewState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Loading { .. } => "loading",
            Self::Result { adjust_open: false } => "result",
            Self::Result { adjust_open: true } => "adjust",
            Self::Error { .. } => "error",
        }
    }
}

#[derive(Debug)]
pub struct ViewController {
    state: ViewState,
    return_to: Section,
    transform: ViewTransform,
    viewer_open: bool,
    notice: Option<String>,
}

impl Default for ViewController {
    fn default() -> Self {
        Self {
            state: ViewState::Upload,
            return_to: Section::Upload,
            transform: ViewTransform::identity(),
            viewer_open: false,
            notice: None,
        }
    }
}

impl ViewController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn transform(&self) -> ViewTransform {
        self.transform
    }

    pub fn is_viewer_open(&self) -> bool {
        self.viewer_open
    }

    /// Last validation message shown to the user, if any.
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, ViewState::Loading { .. })
    }

    pub fn has_result(&self) -> bool {
        matches!(self.state, ViewState::Result { .. })
    }

    /// Records a rejected action without changing state.
    pub fn reject(&mut self, message: impl Into<String>) {
        let message = message.into();
        debug!(state = self.state.name(), "view: action rejected: {message}");
        self.notice = Some(message);
    }

    pub fn begin_loading(&mut self, kind: GenerationKind) {
        self.return_to = match &self.state {
            ViewState::Result { .. } => Section::Result,
            ViewState::Error { return_to, .. } => *return_to,
            _ => Section::Upload,
        };
        self.notice = None;
        self.viewer_open = false;
        self.state = ViewState::Loading { kind };
    }

    /// A fresh result always opens the adjust panel with an identity transform.
    pub fn show_result(&mut self) {
        self.transform.reset();
        self.state = ViewState::Result { adjust_open: true };
    }

    pub fn show_error(&mut self, message: impl Into<String>, retry: GenerationKind) {
        self.state = ViewState::Error {
            message: message.into(),
            return_to: self.return_to,
            retry,
        };
    }

    /// Leaves the error state for the section that was visible before the
    /// failed request. Returns false when no error is shown.
    pub fn dismiss_error(&mut self) -> bool {
        let ViewState::Error { return_to, .. } = &self.state else {
            return false;
        };
        let return_to = *return_to;
        self.state = match return_to {
            Section::Upload => ViewState::Upload,
            Section::Result => ViewState::Result { adjust_open: true },
        };
        true
    }

    pub fn toggle_adjust(&mut self) -> bool {
        match &mut self.state {
            ViewState::Result { adjust_open } => {
                *adjust_open = !*adjust_open;
                true
            }
            _ => false,
        }
    }

    pub fn open_viewer(&mut self) -> bool {
        if self.has_result() {
            self.viewer_open = true;
        }
        self.viewer_open
    }

    pub fn close_viewer(&mut self) {
        self.viewer_open = false;
    }

    /// Inline view and full-screen viewer share one transform.
    pub fn rotate(&mut self, degrees: i32) -> bool {
        if !self.has_result() {
            return false;
        }
        self.transform.rotate(degrees);
        true
    }

    pub fn zoom(&mut self, factor: f32) -> bool {
        if !self.has_result() {
            return false;
        }
        self.transform.zoom(factor);
        true
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
#[path = "tests/view_tests.rs"]
mod tests;
