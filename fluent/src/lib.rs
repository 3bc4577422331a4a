pub mod channel;
mod error;
pub mod metrics;
pub mod monitor;
pub mod network;
pub mod prompt;
mod secure_storage;
pub mod service;
pub mod settings;
mod utils;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

pub use error::AppError;
use network::GeminiClient;
use service::CorrectionService;
use settings::{FileSettingsStore, SettingsStore, default_config_path};

const DEFAULT_LOG_FILTER: &str = "info";

/// Installs the global subscriber. Logs go to stderr because stdout carries
/// native messages.
pub fn init_logging() -> Result<(), AppError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| AppError::LoggingInit(err.to_string()))
}

/// Opens the settings file at `path`, or at the default location.
pub fn open_settings_store(path: Option<PathBuf>) -> Result<Arc<FileSettingsStore>, AppError> {
    let path = match path {
        Some(path) => path,
        None => default_config_path()?,
    };
    info!(path = %path.display(), "using settings file");
    Ok(Arc::new(FileSettingsStore::new(path)))
}

pub fn build_service(store: Arc<dyn SettingsStore>) -> Result<Arc<CorrectionService>, AppError> {
    let client = GeminiClient::new()?;
    Ok(Arc::new(CorrectionService::new(store, client)))
}

/// Serves the correction service over stdin/stdout until the browser closes
/// the pipe.
pub async fn run_native_host(store: Arc<dyn SettingsStore>) -> Result<(), AppError> {
    let service = build_service(store)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting native messaging host"
    );
    channel::native::serve(service, tokio::io::stdin(), tokio::io::stdout()).await?;
    info!("native messaging host stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{MemorySettingsStore, Settings};

    #[tokio::test]
    async fn built_service_reports_missing_key() {
        let store = Arc::new(MemorySettingsStore::new(Settings::default()));
        let service = build_service(store).expect("service should build");

        let status = service.status().await;
        assert!(!status.gemini_configured);
        assert_eq!(status.model, network::GEMINI_MODEL);
    }

    #[test]
    fn explicit_store_path_is_kept() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");

        let store = open_settings_store(Some(path.clone())).expect("store should open");
        assert_eq!(store.path(), path.as_path());
    }
}
