use thiserror::Error;

use crate::config;
use crate::discord::ChannelError;

/// Conditions that stop the service
#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] config::Error),
    #[error("zone store unavailable: {0:#}")]
    Store(anyhow::Error),
    #[error("discord login failed: {0}")]
    Login(ChannelError),
    #[error("status channel {channel_id} is unusable: {source}")]
    Channel { channel_id: u64, source: ChannelError },
    #[error("{0:#}")]
    Setup(#[from] anyhow::Error),
    #[error("{0:#}")]
    Io(#[from] std::io::Error),
}
