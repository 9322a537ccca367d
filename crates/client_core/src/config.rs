use std::{collections::HashMap, fs, path::Path, time::Duration};

use shared::domain::BUILTIN_STYLES;
use url::Url;

use crate::error::ClientError;

pub const DEFAULT_CONFIG_FILE: &str = "emoji_client.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub service_url: String,
    /// Falls back to `service_url` when unset.
    pub template_service_url: Option<String>,
    pub request_timeout_secs: u64,
    pub progress_tick_ms: u64,
    pub error_dismiss_secs: u64,
    pub builtin_styles: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            service_url: "http://127.0.0.1:5000".into(),
            template_service_url: None,
            request_timeout_secs: 120,
            progress_tick_ms: 400,
            error_dismiss_secs: 5,
            builtin_styles: BUILTIN_STYLES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Settings {
    pub fn template_service_url(&self) -> &str {
        self.template_service_url
            .as_deref()
            .unwrap_or(&self.service_url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn progress_tick(&self) -> Duration {
        Duration::from_millis(self.progress_tick_ms.max(1))
    }

    pub fn error_dismiss_delay(&self) -> Duration {
        Duration::from_secs(self.error_dismiss_secs)
    }
}

/// Reads the optional TOML file, then applies environment overrides.
pub fn load_settings(path: Option<&Path>) -> Settings {
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<HashMap<String, String>>(&raw) {
            Ok(file_cfg) => apply_overrides(&mut settings, |key| file_cfg.get(key).cloned()),
            Err(err) => tracing::warn!(path = %path.display(), "ignoring unreadable config: {err}"),
        }
    }

    apply_overrides(&mut settings, |key| {
        std::env::var(format!("APP__{}", key.to_ascii_uppercase())).ok()
    });
    if let Ok(v) = std::env::var("EMOJI_SERVICE_URL") {
        settings.service_url = v;
    }

    settings
}

pub(crate) fn apply_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("service_url") {
        settings.service_url = v;
    }
    if let Some(v) = lookup("template_service_url") {
        settings.template_service_url = Some(v);
    }
    if let Some(v) = lookup("request_timeout_secs").and_then(|v| v.trim().parse().ok()) {
        settings.request_timeout_secs = v;
    }
    if let Some(v) = lookup("progress_tick_ms").and_then(|v| v.trim().parse().ok()) {
        settings.progress_tick_ms = v;
    }
    if let Some(v) = lookup("error_dismiss_secs").and_then(|v| v.trim().parse().ok()) {
        settings.error_dismiss_secs = v;
    }
    if let Some(v) = lookup("builtin_styles") {
        let styles: Vec<String> = v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if !styles.is_empty() {
            settings.builtin_styles = styles;
        }
    }
}

/// Trims, validates and strips the trailing slash from a service base URL.
pub fn normalize_service_url(raw: &str) -> Result<String, ClientError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ClientError::Config("service url must not be empty".into()));
    }

    let parsed = Url::parse(trimmed)
        .map_err(|err| ClientError::Config(format!("invalid service url '{trimmed}': {err}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ClientError::Config(format!(
            "service url '{trimmed}' must use http or https"
        )));
    }

    Ok(trimmed.to_string())
}

/// Resolves `route` below the base URL, keeping any path prefix of the base.
pub(crate) fn endpoint(base: &str, route: &str) -> Result<Url, ClientError> {
    let base = normalize_service_url(base)?;
    Url::parse(&format!("{base}/"))
        .and_then(|url| url.join(route))
        .map_err(|err| ClientError::Config(format!("invalid endpoint '{route}': {err}")))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
