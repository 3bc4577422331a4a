use thiserror::Error;

use crate::channel::ChannelError;
use crate::network::NetworkError;
use crate::settings::SettingsError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),
    #[error("network error: {0}")]
    Network(#[from] NetworkError),
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),
}
