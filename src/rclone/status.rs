//! Состояние одной выгрузки: пишет цикл чтения rclone, читает `/status`.

use super::progress::{parse_size, parse_speed, ProgressLine};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

#[derive(Debug, Clone)]
struct Fields {
    transferred_size: String,
    percentage: String,
    speed: String,
    eta: String,
    checks: u64,
    transferred_files: u64,
    total_files: u64,
}

impl Default for Fields {
    fn default() -> Self {
        Self {
            transferred_size: "0 B".to_string(),
            percentage: "0%".to_string(),
            speed: "0 B/s".to_string(),
            eta: "-".to_string(),
            checks: 0,
            transferred_files: 0,
            total_files: 0,
        }
    }
}

/// Снимок для отображения пользователю.
#[derive(Debug, Clone)]
pub struct TransferSnapshot {
    pub name: String,
    pub elapsed: Duration,
    pub transferred_size: String,
    pub percentage: String,
    pub speed: String,
    pub eta: String,
    pub speed_bytes: u64,
    pub processed_bytes: u64,
    pub checks: u64,
    pub transferred_files: u64,
    pub total_files: u64,
    pub is_cancelled: bool,
    pub is_errored: bool,
}

#[derive(Debug)]
pub struct TransferStatus {
    name: String,
    started_at: Instant,
    cancelled: AtomicBool,
    errored: AtomicBool,
    wake: Notify,
    fields: Mutex<Fields>,
}

impl TransferStatus {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            started_at: Instant::now(),
            cancelled: AtomicBool::new(false),
            errored: AtomicBool::new(false),
            wake: Notify::new(),
            fields: Mutex::new(Fields::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ставит флаг отмены; цикл чтения увидит его на следующей итерации.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_errored(&self) -> bool {
        self.errored.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_errored(&self) {
        self.errored.store(true, Ordering::SeqCst);
    }

    pub(crate) async fn cancelled_signal(&self) {
        self.wake.notified().await;
    }

    pub(crate) fn apply(&self, line: &ProgressLine) {
        let mut fields = self.lock_fields();
        match line {
            ProgressLine::Bytes {
                size,
                percentage,
                speed,
                eta,
            } => {
                fields.transferred_size = size.clone();
                fields.percentage = percentage.clone();
                fields.speed = speed.clone();
                fields.eta = eta.clone();
            }
            ProgressLine::Files { transferred, total } => {
                fields.transferred_files = *transferred;
                fields.total_files = *total;
            }
            ProgressLine::Checks(count) => fields.checks = *count,
            ProgressLine::Errors(_) => {}
        }
    }

    /// Скорость в байтах/с из последней строки `Transferred:`.
    pub fn speed_bytes(&self) -> u64 {
        parse_speed(&self.lock_fields().speed)
    }

    pub fn processed_bytes(&self) -> u64 {
        parse_size(&self.lock_fields().transferred_size)
    }

    pub fn snapshot(&self) -> TransferSnapshot {
        let fields = self.lock_fields().clone();
        TransferSnapshot {
            name: self.name.clone(),
            elapsed: self.started_at.elapsed(),
            speed_bytes: self.speed_bytes(),
            processed_bytes: self.processed_bytes(),
            transferred_size: fields.transferred_size,
            percentage: fields.percentage,
            speed: fields.speed,
            eta: fields.eta,
            checks: fields.checks,
            transferred_files: fields.transferred_files,
            total_files: fields.total_files,
            is_cancelled: self.is_cancelled(),
            is_errored: self.is_errored(),
        }
    }

    fn lock_fields(&self) -> std::sync::MutexGuard<'_, Fields> {
        self.fields
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_status_reports_zeroes() {
        let status = TransferStatus::new("movie.mkv");
        assert_eq!(status.speed_bytes(), 0);
        assert_eq!(status.processed_bytes(), 0);
        let snapshot = status.snapshot();
        assert_eq!(snapshot.percentage, "0%");
        assert_eq!(snapshot.eta, "-");
        assert!(!snapshot.is_cancelled);
        assert!(!snapshot.is_errored);
    }

    #[test]
    fn last_line_wins() {
        let status = TransferStatus::new("a.bin");
        status.apply(&ProgressLine::Bytes {
            size: "1 MiB".into(),
            percentage: "10%".into(),
            speed: "1 MiB/s".into(),
            eta: "9s".into(),
        });
        status.apply(&ProgressLine::Bytes {
            size: "2 MiB".into(),
            percentage: "20%".into(),
            speed: "512 KiB/s".into(),
            eta: "8s".into(),
        });
        assert_eq!(status.processed_bytes(), 2 * 1_048_576);
        assert_eq!(status.speed_bytes(), 512 * 1024);
        assert_eq!(status.snapshot().percentage, "20%");
    }

    #[test]
    fn counters_are_tracked() {
        let status = TransferStatus::new("a.bin");
        status.apply(&ProgressLine::Checks(3));
        status.apply(&ProgressLine::Files {
            transferred: 1,
            total: 2,
        });
        let snapshot = status.snapshot();
        assert_eq!(snapshot.checks, 3);
        assert_eq!(snapshot.transferred_files, 1);
        assert_eq!(snapshot.total_files, 2);
    }

    #[test]
    fn malformed_speed_reads_as_zero() {
        let status = TransferStatus::new("a.bin");
        status.apply(&ProgressLine::Bytes {
            size: "-".into(),
            percentage: "-".into(),
            speed: "fast".into(),
            eta: "-".into(),
        });
        assert_eq!(status.speed_bytes(), 0);
        assert_eq!(status.processed_bytes(), 0);
    }

    #[test]
    fn cancel_sets_flag() {
        let status = TransferStatus::new("a.bin");
        status.cancel();
        assert!(status.is_cancelled());
    }
}
