//! Обёртка над rclone: выгрузка, прогресс, конфиг удалённого диска.

#[path = "rclone/conf.rs"]
mod conf;
#[path = "rclone/progress.rs"]
mod progress;
#[path = "rclone/status.rs"]
mod status;
#[path = "rclone/transfer.rs"]
mod transfer;

pub use conf::{render_drive_stanza, user_config_path};
pub use status::{TransferSnapshot, TransferStatus};
pub use transfer::{RcloneSettings, RcloneTransfer};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Rclone configuration not found! Configure it using /rclone command")]
    NotConfigured,
    #[error("Rclone configuration file not found!")]
    ConfigFileMissing(PathBuf),
    #[error("Некорректный путь к файлу: {}", .0.display())]
    InvalidSource(PathBuf),
    #[error("Не удалось запустить rclone: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("Upload cancelled!")]
    Cancelled,
    #[error("Got {0} errors during upload!")]
    Reported(u64),
    #[error("{0}")]
    Failed(String),
    #[error("{0}")]
    Link(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TransferError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransferError::Cancelled)
    }
}
