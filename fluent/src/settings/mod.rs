mod cache;
mod store;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::prompt::{DEFAULT_EXPLAIN_LANGUAGE, DEFAULT_LANGUAGE, Tone};

pub use cache::SettingsCache;
pub use store::{FileSettingsStore, MemorySettingsStore, SettingsStore, default_config_path};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings: {0}")]
    Read(String),
    #[error("failed to write settings: {0}")]
    Write(String),
    #[error("failed to parse settings: {0}")]
    Parse(String),
    #[error("invalid settings: {0}")]
    Validation(String),
    #[error("no config directory available; set FLUENT_CONFIG")]
    NoConfigDir,
}

/// Where the Gemini key in a loaded snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApiKeySource {
    /// Settings file, keyring, or set by the user in this session.
    #[default]
    Stored,
    /// Environment fallback; never written back to storage.
    Environment,
}

/// User configuration shared by the page monitor and the correction service.
///
/// Field names follow the extension's storage keys so a synced settings blob
/// deserializes as is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub gemini_api_key: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub native_language: Option<String>,
    #[serde(default, deserialize_with = "deserialize_tone")]
    pub tone: Tone,
    #[serde(default = "default_enabled")]
    pub text_improvement_enabled: bool,
    #[serde(default = "default_enabled")]
    pub fluentify_enabled: bool,
    #[serde(default = "default_enabled")]
    pub explain_enabled: bool,
    #[serde(default)]
    pub disabled_sites: Vec<String>,
    #[serde(skip)]
    pub api_key_source: ApiKeySource,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gemini_api_key: String::new(),
            language: default_language(),
            native_language: None,
            tone: Tone::default(),
            text_improvement_enabled: default_enabled(),
            fluentify_enabled: default_enabled(),
            explain_enabled: default_enabled(),
            disabled_sites: Vec::new(),
            api_key_source: ApiKeySource::Stored,
        }
    }
}

impl Settings {
    pub fn api_key(&self) -> Option<&str> {
        let trimmed = self.gemini_api_key.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }

    /// Replaces the key with one the user entered, so it will be persisted.
    pub fn set_api_key(&mut self, api_key: impl Into<String>) {
        self.gemini_api_key = api_key.into();
        self.api_key_source = ApiKeySource::Stored;
    }

    pub fn explain_language(&self) -> &str {
        self.native_language
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_EXPLAIN_LANGUAGE)
    }

    pub fn is_site_disabled(&self, hostname: &str) -> bool {
        self.disabled_sites.iter().any(|site| site == hostname)
    }

    /// Adds or removes `hostname` from the per-site disabled list.
    pub fn set_site_enabled(&mut self, hostname: &str, enabled: bool) {
        let hostname = hostname.trim();
        if hostname.is_empty() {
            return;
        }
        if enabled {
            self.disabled_sites.retain(|site| site != hostname);
        } else if !self.is_site_disabled(hostname) {
            self.disabled_sites.push(hostname.to_string());
        }
    }
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

fn default_enabled() -> bool {
    true
}

fn deserialize_tone<'de, D>(deserializer: D) -> Result<Tone, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().map(Tone::parse_lenient).unwrap_or_default())
}

pub fn normalize_loaded_settings(mut settings: Settings) -> Settings {
    settings.gemini_api_key = settings.gemini_api_key.trim().to_string();

    let language = settings.language.trim();
    if language.is_empty() {
        warn!("loaded writing language is empty; resetting to default");
        settings.language = default_language();
    } else {
        settings.language = language.to_string();
    }

    settings.native_language = settings
        .native_language
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    let mut sites: Vec<String> = Vec::with_capacity(settings.disabled_sites.len());
    for site in &settings.disabled_sites {
        let site = site.trim();
        if !site.is_empty() && !sites.iter().any(|existing| existing == site) {
            sites.push(site.to_string());
        }
    }
    settings.disabled_sites = sites;

    settings
}

/// Checks settings coming from the options form before they are stored.
pub fn validate_settings(settings: Settings) -> Result<Settings, SettingsError> {
    let settings = normalize_loaded_settings(settings);
    if settings.api_key().is_none() {
        return Err(SettingsError::Validation(
            "Please enter a valid API key.".to_string(),
        ));
    }
    Ok(settings)
}
