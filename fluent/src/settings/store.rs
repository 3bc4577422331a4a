use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::{info, warn};

use super::{ApiKeySource, Settings, SettingsError, normalize_loaded_settings};
use crate::secure_storage::SecretSlot;

const CONFIG_ENV: &str = "FLUENT_CONFIG";
const CONFIG_DIR_NAME: &str = "fluent";
const CONFIG_FILE_NAME: &str = "settings.json";
const API_KEY_ENV_NAMES: [&str; 2] = ["GEMINI_API_KEY", "FLUENT_GEMINI_API_KEY"];
const CHANGE_CHANNEL_CAPACITY: usize = 16;

/// Key-value settings persistence with change notification.
pub trait SettingsStore: Send + Sync {
    fn load(&self) -> Result<Settings, SettingsError>;

    /// Persists `settings` and notifies subscribers with the stored value.
    fn save(&self, settings: &Settings) -> Result<(), SettingsError>;

    fn subscribe(&self) -> broadcast::Receiver<Settings>;

    fn update(&self, apply: &mut dyn FnMut(&mut Settings)) -> Result<Settings, SettingsError> {
        let mut settings = self.load()?;
        apply(&mut settings);
        self.save(&settings)?;
        Ok(settings)
    }
}

pub fn default_config_path() -> Result<PathBuf, SettingsError> {
    if let Ok(value) = std::env::var(CONFIG_ENV) {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed));
        }
    }

    dirs::config_dir()
        .map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
        .ok_or(SettingsError::NoConfigDir)
}

type EnvironmentKey = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// JSON settings file with the API key kept in the OS keyring when possible.
pub struct FileSettingsStore {
    path: PathBuf,
    secret: Option<SecretSlot>,
    environment: Option<EnvironmentKey>,
    changes: broadcast::Sender<Settings>,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            path: path.into(),
            secret: Some(SecretSlot::gemini_api_key()),
            environment: Some(Arc::new(read_api_key_from_environment)),
            changes,
        }
    }

    /// File-only store: no keyring, no environment fallback.
    pub fn plain(path: impl Into<PathBuf>) -> Self {
        let mut store = Self::new(path);
        store.secret = None;
        store.environment = None;
        store
    }

    /// Replaces where the fallback key is read from when nothing is stored.
    pub fn with_environment(
        mut self,
        lookup: impl Fn() -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.environment = Some(Arc::new(lookup));
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_config(&self) -> Result<Settings, SettingsError> {
        if !self.path.exists() {
            return Ok(Settings::default());
        }

        let content =
            fs::read_to_string(&self.path).map_err(|err| SettingsError::Read(err.to_string()))?;
        serde_json::from_str::<Settings>(&content).map_err(|err| SettingsError::Parse(err.to_string()))
    }

    fn write_config(&self, settings: &Settings) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| SettingsError::Write(err.to_string()))?;
        }

        let serialized = serde_json::to_string_pretty(settings)
            .map_err(|err| SettingsError::Write(err.to_string()))?;
        fs::write(&self.path, serialized).map_err(|err| SettingsError::Write(err.to_string()))
    }

    fn resolve_api_key(&self, settings: &mut Settings) {
        if let Some(secret) = self.secret {
            match secret.read() {
                Ok(Some(api_key)) => settings.gemini_api_key = api_key,
                Ok(None) if !settings.gemini_api_key.is_empty() => {
                    self.migrate_plaintext_key(secret, settings);
                }
                Ok(None) => {}
                Err(err) => {
                    warn!("failed to read API key from secure storage; using config fallback: {err}");
                }
            }
        }

        if !settings.gemini_api_key.is_empty() {
            return;
        }
        if let Some(env_api_key) = self.environment.as_ref().and_then(|lookup| lookup()) {
            settings.gemini_api_key = env_api_key.trim().to_string();
            settings.api_key_source = ApiKeySource::Environment;
        }
    }

    /// Moves a key found in the JSON file into the keyring, then blanks it on disk.
    fn migrate_plaintext_key(&self, secret: SecretSlot, settings: &Settings) {
        let stored = secret
            .write(&settings.gemini_api_key)
            .and_then(|()| secret.holds(&settings.gemini_api_key));
        match stored {
            Ok(true) => {}
            Ok(false) => return,
            Err(err) => {
                warn!("failed to migrate API key into secure storage: {err}");
                return;
            }
        }

        let mut sanitized = settings.clone();
        sanitized.gemini_api_key.clear();
        if let Err(err) = self.write_config(&sanitized) {
            warn!("failed to rewrite sanitized config after secure migration: {err}");
        } else {
            info!(path = %self.path.display(), "migrated plaintext API key into secure storage");
        }
    }

    /// Returns whether the keyring now owns the key, so the file may omit it.
    fn store_api_key_securely(&self, api_key: &str) -> bool {
        let Some(secret) = self.secret else {
            return false;
        };

        let verified = secret.write(api_key).and_then(|()| {
            if api_key.trim().is_empty() {
                Ok(true)
            } else {
                secret.holds(api_key)
            }
        });
        match verified {
            Ok(true) => true,
            Ok(false) => {
                warn!("secure storage write could not be verified, keeping key in settings file");
                false
            }
            Err(err) => {
                warn!("failed to write API key into secure storage, keeping key in settings file: {err}");
                false
            }
        }
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self) -> Result<Settings, SettingsError> {
        let mut settings = normalize_loaded_settings(self.read_config()?);
        self.resolve_api_key(&mut settings);
        Ok(settings)
    }

    fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        let normalized = normalize_loaded_settings(settings.clone());

        let mut persisted = normalized.clone();
        if normalized.api_key_source == ApiKeySource::Environment {
            persisted.gemini_api_key.clear();
        } else if self.store_api_key_securely(&normalized.gemini_api_key) {
            persisted.gemini_api_key.clear();
        }
        self.write_config(&persisted)?;

        let _ = self.changes.send(normalized);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Settings> {
        self.changes.subscribe()
    }
}

/// In-process store, used when settings arrive from the extension itself and in tests.
pub struct MemorySettingsStore {
    settings: Mutex<Settings>,
    changes: broadcast::Sender<Settings>,
}

impl MemorySettingsStore {
    pub fn new(settings: Settings) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            settings: Mutex::new(normalize_loaded_settings(settings)),
            changes,
        }
    }
}

impl Default for MemorySettingsStore {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Result<Settings, SettingsError> {
        let settings = self
            .settings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(settings.clone())
    }

    fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        let normalized = normalize_loaded_settings(settings.clone());
        {
            let mut current = self
                .settings
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *current = normalized.clone();
        }
        let _ = self.changes.send(normalized);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Settings> {
        self.changes.subscribe()
    }
}

fn read_api_key_from_environment() -> Option<String> {
    for key_name in API_KEY_ENV_NAMES {
        if let Ok(value) = std::env::var(key_name) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }

    None
}
