//! Разовый запуск внешней команды с захватом вывода.

use std::ffi::OsStr;
use std::process::Stdio;
use tokio::process::Command;

#[derive(Debug)]
pub struct CommandResult {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

pub async fn run_command<I, S>(program: impl AsRef<OsStr>, args: I) -> CommandResult
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let program = program.as_ref();
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await;

    match output {
        Ok(o) => {
            let result = CommandResult {
                success: o.status.success(),
                code: o.status.code(),
                stdout: String::from_utf8_lossy(&o.stdout).trim().to_string(),
                stderr: String::from_utf8_lossy(&o.stderr).trim().to_string(),
            };
            if !result.success {
                tracing::warn!(
                    program = %program.to_string_lossy(),
                    code = ?result.code,
                    stderr = %result.stderr,
                    "Command returned non-zero status"
                );
            }
            result
        }
        Err(e) => {
            tracing::error!(
                program = %program.to_string_lossy(),
                error = %e,
                "Failed to execute command"
            );
            CommandResult {
                success: false,
                code: None,
                stdout: String::new(),
                stderr: format!("Ошибка запуска {}: {}", program.to_string_lossy(), e),
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_status() {
        let result = run_command("sh", ["-c", "echo hello; echo oops >&2"]).await;
        assert!(result.success);
        assert_eq!(result.code, Some(0));
        assert_eq!(result.stdout, "hello");
        assert_eq!(result.stderr, "oops");
    }

    #[tokio::test]
    async fn non_zero_exit_is_reported() {
        let result = run_command("sh", ["-c", "echo broken >&2; exit 3"]).await;
        assert!(!result.success);
        assert_eq!(result.code, Some(3));
        assert_eq!(result.stderr, "broken");
    }

    #[tokio::test]
    async fn missing_binary_is_not_a_panic() {
        let result = run_command("/nonexistent/rclone-binary", ["version"]).await;
        assert!(!result.success);
        assert!(result.code.is_none());
        assert!(!result.stderr.is_empty());
    }
}
