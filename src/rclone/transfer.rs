//! `rclone copy -P` с разбором прогресса и `rclone link` после успешной выгрузки.

use super::progress::{LineClassifier, ProgressLine, RegexLineClassifier};
use super::status::TransferStatus;
use super::TransferError;
use crate::exec::run_command;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct RcloneSettings {
    pub binary: PathBuf,
    pub remote_name: String,
}

impl RcloneSettings {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            binary: config.rclone.binary.clone(),
            remote_name: config.rclone.remote_name.clone(),
        }
    }
}

pub struct RcloneTransfer<C = RegexLineClassifier> {
    settings: RcloneSettings,
    classifier: C,
}

impl RcloneTransfer {
    pub fn new(settings: RcloneSettings) -> Self {
        Self::with_classifier(settings, RegexLineClassifier)
    }
}

impl<C: LineClassifier> RcloneTransfer<C> {
    pub fn with_classifier(settings: RcloneSettings, classifier: C) -> Self {
        Self {
            settings,
            classifier,
        }
    }

    /// Выгружает файл на удалённый диск пользователя и возвращает ссылку на него.
    ///
    /// Без конфига (или если файла конфига нет на диске) rclone не запускается.
    pub async fn upload(
        &self,
        status: &TransferStatus,
        config_path: Option<&Path>,
        file_path: &Path,
    ) -> Result<String, TransferError> {
        let config_path = config_path.ok_or(TransferError::NotConfigured)?;
        if !tokio::fs::try_exists(config_path).await.unwrap_or(false) {
            return Err(TransferError::ConfigFileMissing(config_path.to_path_buf()));
        }
        let file_name = file_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| TransferError::InvalidSource(file_path.to_path_buf()))?;

        let remote_root = format!("{}:", self.settings.remote_name);
        tracing::info!(
            binary = %self.settings.binary.display(),
            config = %config_path.display(),
            source = %file_path.display(),
            remote = %remote_root,
            "Starting rclone upload"
        );

        let mut child = Command::new(&self.settings.binary)
            .arg("copy")
            .arg("--config")
            .arg(config_path)
            .arg(file_path)
            .arg(&remote_root)
            .arg("-P")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(TransferError::Spawn)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("stdout rclone не захвачен"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("stderr rclone не захвачен"))?;
        // stderr читается параллельно, иначе rclone может встать на заполненном пайпе.
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            if let Err(error) = BufReader::new(stderr).read_to_string(&mut buf).await {
                tracing::debug!(error = %error, "Failed to read rclone stderr");
            }
            buf
        });

        let mut lines = BufReader::new(stdout).lines();
        loop {
            if status.is_cancelled() {
                if let Err(error) = child.kill().await {
                    tracing::warn!(error = %error, "Failed to kill rclone after cancel");
                }
                tracing::info!(file = %file_name, "Upload cancelled");
                return Err(TransferError::Cancelled);
            }

            let line = tokio::select! {
                line = lines.next_line() => line,
                _ = status.cancelled_signal() => continue,
            };
            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(error) => {
                    status.mark_errored();
                    if let Err(kill_error) = child.kill().await {
                        tracing::warn!(error = %kill_error, "Failed to kill rclone after read error");
                    }
                    tracing::error!(file = %file_name, error = %error, "Failed to read rclone output");
                    return Err(TransferError::Io(error));
                }
            };
            let Some(parsed) = self.classifier.classify(&line) else {
                continue;
            };
            if let ProgressLine::Errors(count) = parsed
                && count > 0
            {
                status.mark_errored();
                if let Err(error) = child.kill().await {
                    tracing::warn!(error = %error, "Failed to kill rclone after reported errors");
                }
                tracing::error!(file = %file_name, errors = count, "rclone reported errors");
                return Err(TransferError::Reported(count));
            }
            status.apply(&parsed);
        }

        let exit = child.wait().await?;
        let stderr_text = stderr_task.await.unwrap_or_default();
        if !exit.success() {
            status.mark_errored();
            let message = stderr_text.trim();
            tracing::error!(file = %file_name, code = ?exit.code(), stderr = %message, "rclone upload error");
            return Err(TransferError::Failed(if message.is_empty() {
                format!("rclone завершился с кодом {:?}", exit.code())
            } else {
                message.to_string()
            }));
        }

        self.link(config_path, &file_name).await
    }

    async fn link(&self, config_path: &Path, file_name: &str) -> Result<String, TransferError> {
        let args: Vec<OsString> = vec![
            "link".into(),
            "--config".into(),
            config_path.into(),
            format!("{}:{}", self.settings.remote_name, file_name).into(),
        ];
        let result = run_command(&self.settings.binary, args).await;
        if !result.success {
            tracing::error!(file = %file_name, stderr = %result.stderr, "Error getting link");
            return Err(TransferError::Link(result.stderr));
        }
        Ok(result.stdout)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;

    /// Подменный rclone: `copy` исполняет `copy_body`, `link` исполняет `link_body`.
    fn fake_rclone(dir: &Path, copy_body: &str, link_body: &str) -> PathBuf {
        let path = dir.join("rclone");
        let script = format!(
            "#!/bin/sh\ncase \"$1\" in\n  copy)\n{}\n    ;;\n  link)\n{}\n    ;;\nesac\n",
            copy_body, link_body
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn setup(copy_body: &str, link_body: &str) -> (tempfile::TempDir, RcloneTransfer, PathBuf, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_rclone(dir.path(), copy_body, link_body);
        let config = dir.path().join("42_cine.conf");
        std::fs::write(&config, "[cine]\ntype = drive\n").unwrap();
        let source = dir.path().join("movie.mkv");
        std::fs::write(&source, b"data").unwrap();
        let transfer = RcloneTransfer::new(RcloneSettings {
            binary,
            remote_name: "cine".into(),
        });
        (dir, transfer, config, source)
    }

    #[tokio::test]
    async fn missing_account_fails_before_spawn() {
        let transfer = RcloneTransfer::new(RcloneSettings {
            binary: PathBuf::from("/nonexistent/rclone"),
            remote_name: "cine".into(),
        });
        let status = TransferStatus::new("movie.mkv");
        let err = transfer
            .upload(&status, None, Path::new("/tmp/movie.mkv"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::NotConfigured));
    }

    #[tokio::test]
    async fn missing_config_file_fails_before_spawn() {
        let transfer = RcloneTransfer::new(RcloneSettings {
            binary: PathBuf::from("/nonexistent/rclone"),
            remote_name: "cine".into(),
        });
        let status = TransferStatus::new("movie.mkv");
        let err = transfer
            .upload(
                &status,
                Some(Path::new("/nonexistent/42_cine.conf")),
                Path::new("/tmp/movie.mkv"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::ConfigFileMissing(_)));
    }

    #[tokio::test]
    async fn successful_upload_parses_progress_and_returns_link() {
        let (_dir, transfer, config, source) = setup(
            "    echo 'Transferred:   5 MiB / 10 MiB, 50%, 2 MiB/s, ETA 3s'\n    echo 'Checks:   1 / 1, 100%'\n    echo 'Transferred:   1 / 1, 100%'\n    echo 'Errors:   0'\n    echo 'Elapsed time: 1s'",
            "    echo \"https://drive.google.com/open?id=$4\"",
        );
        let status = TransferStatus::new("movie.mkv");
        let link = transfer
            .upload(&status, Some(config.as_path()), &source)
            .await
            .unwrap();

        assert_eq!(link, "https://drive.google.com/open?id=cine:movie.mkv");
        let snapshot = status.snapshot();
        assert_eq!(snapshot.transferred_size, "5 MiB / 10 MiB");
        assert_eq!(snapshot.percentage, "50%");
        assert_eq!(snapshot.speed, "2 MiB/s");
        assert_eq!(snapshot.eta, "3s");
        assert_eq!(snapshot.speed_bytes, 2 * 1_048_576);
        assert_eq!(snapshot.processed_bytes, 5 * 1_048_576);
        assert_eq!(snapshot.checks, 1);
        assert_eq!(snapshot.transferred_files, 1);
        assert_eq!(snapshot.total_files, 1);
        assert!(!snapshot.is_errored);
    }

    #[tokio::test]
    async fn reported_errors_abort_without_waiting() {
        let (_dir, transfer, config, source) =
            setup("    echo 'Errors:   3 (retrying may help)'\n    exec sleep 30", "    echo unused");
        let status = TransferStatus::new("movie.mkv");
        let result = tokio::time::timeout(
            Duration::from_secs(10),
            transfer.upload(&status, Some(config.as_path()), &source),
        )
        .await
        .expect("upload must not wait for rclone to finish");

        assert!(matches!(result, Err(TransferError::Reported(3))));
        assert!(status.is_errored());
    }

    #[tokio::test]
    async fn non_zero_exit_surfaces_stderr() {
        let (_dir, transfer, config, source) = setup(
            "    echo 'Failed to copy: googleapi: quota exceeded' >&2\n    exit 1",
            "    echo unused",
        );
        let status = TransferStatus::new("movie.mkv");
        let err = transfer
            .upload(&status, Some(config.as_path()), &source)
            .await
            .unwrap_err();
        match err {
            TransferError::Failed(message) => {
                assert_eq!(message, "Failed to copy: googleapi: quota exceeded")
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(status.is_errored());
    }

    #[tokio::test]
    async fn link_failure_is_an_error() {
        let (_dir, transfer, config, source) = setup(
            "    echo 'Transferred:   1 / 1, 100%'",
            "    echo 'object not found' >&2\n    exit 2",
        );
        let status = TransferStatus::new("movie.mkv");
        let err = transfer
            .upload(&status, Some(config.as_path()), &source)
            .await
            .unwrap_err();
        match err {
            TransferError::Link(message) => assert_eq!(message, "object not found"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreadable_output_marks_error_and_stops() {
        let (_dir, transfer, config, source) =
            setup("    printf 'Transferred: \\377\\n'\n    exec sleep 30", "    echo unused");
        let status = TransferStatus::new("movie.mkv");
        let result = tokio::time::timeout(
            Duration::from_secs(10),
            transfer.upload(&status, Some(config.as_path()), &source),
        )
        .await
        .expect("read error must stop the upload");

        assert!(matches!(result, Err(TransferError::Io(_))));
        assert!(status.is_errored());
    }

    #[tokio::test]
    async fn cancel_kills_running_upload() {
        let (_dir, transfer, config, source) = setup(
            "    echo 'Transferred:   0 B / 10 MiB, 0%, 0 B/s, ETA -'\n    exec sleep 30",
            "    echo unused",
        );
        let status = std::sync::Arc::new(TransferStatus::new("movie.mkv"));
        let canceller = status.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            canceller.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(10),
            transfer.upload(&status, Some(config.as_path()), &source),
        )
        .await
        .expect("cancel must interrupt the read loop");
        assert!(matches!(result, Err(TransferError::Cancelled)));
        assert!(status.is_cancelled());
    }
}
