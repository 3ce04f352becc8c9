//! Credentials sourced from an external command.
//!
//! Profiles with a `credential_process` setting name a command that prints
//! credentials as JSON on stdout:
//!
//! ```json
//! {
//!   "Version": 1,
//!   "AccessKeyId": "AKID",
//!   "SecretAccessKey": "SECRET",
//!   "SessionToken": "TOKEN",
//!   "Expiration": "2026-01-01T00:00:00Z"
//! }
//! ```

use crate::{Credentials, CredmuxError, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Executes a command and returns stdout as a string.
///
/// # Arguments
///
/// - `program`: Command to execute
/// - `args`: Command arguments
///
/// The child inherits this process's environment and gets no stdin.
///
/// # Errors
///
/// Returns [`CredmuxError::CommandFailed`] if:
/// - Command not found
/// - Exit code is non-zero
/// - Output is not valid UTF-8
pub async fn run_command(program: &str, args: &[&str]) -> Result<String> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    let output = cmd.output().await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            CredmuxError::CommandFailed(format!("{} command not found", program))
        } else {
            CredmuxError::Io(e)
        }
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CredmuxError::CommandFailed(format!(
            "{} failed with exit code {}: {}",
            program,
            output.status.code().unwrap_or(-1),
            stderr.trim()
        )));
    }

    String::from_utf8(output.stdout).map_err(|e| {
        CredmuxError::CommandFailed(format!("invalid UTF-8 in command output: {}", e))
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ProcessOutput {
    version: u32,
    access_key_id: String,
    secret_access_key: String,
    #[serde(default)]
    session_token: Option<String>,
    #[serde(default)]
    expiration: Option<DateTime<Utc>>,
}

/// Parses the JSON printed by a credential process.
///
/// # Errors
///
/// Returns [`CredmuxError::Json`] for malformed output and
/// [`CredmuxError::CommandFailed`] for an unsupported `Version`.
///
/// ```
/// use credmux::process::parse_process_output;
///
/// let creds = parse_process_output(
///     r#"{"Version": 1, "AccessKeyId": "AKID", "SecretAccessKey": "SECRET"}"#,
/// ).unwrap();
/// assert_eq!(creds.access_key_id, "AKID");
/// assert!(creds.expiration.is_none());
/// ```
pub fn parse_process_output(stdout: &str) -> Result<Credentials> {
    let output: ProcessOutput = serde_json::from_str(stdout)?;

    if output.version != 1 {
        return Err(CredmuxError::CommandFailed(format!(
            "unsupported credential process output version {}",
            output.version
        )));
    }

    Ok(Credentials {
        access_key_id: output.access_key_id,
        secret_access_key: output.secret_access_key,
        session_token: output.session_token,
        expiration: output.expiration,
    })
}

/// Runs a `credential_process` command line through the platform shell and
/// parses its output.
pub async fn run_credential_process(command_line: &str) -> Result<Credentials> {
    debug!(command = command_line, "running credential process");

    #[cfg(windows)]
    let stdout = run_command("cmd", &["/C", command_line]).await?;
    #[cfg(not(windows))]
    let stdout = run_command("sh", &["-c", command_line]).await?;

    parse_process_output(&stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[cfg(unix)]
    async fn test_run_command_success() {
        let output = run_command("echo", &["hello"]).await.unwrap();
        assert_eq!(output.trim(), "hello");
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_run_command_closes_stdin() {
        let output = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            run_command("sh", &["-c", "cat; echo done"]),
        )
        .await
        .expect("command waited on stdin")
        .unwrap();
        assert_eq!(output.trim(), "done");
    }

    #[tokio::test]
    async fn test_run_command_not_found() {
        let result = run_command("nonexistent-command-12345", &[]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_run_command_nonzero_exit() {
        let err = run_command("sh", &["-c", "echo nope >&2; exit 3"])
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("exit code 3"));
        assert!(message.contains("nope"));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_run_credential_process() {
        let creds = run_credential_process(
            r#"echo '{"Version": 1, "AccessKeyId": "AKID", "SecretAccessKey": "SECRET", "SessionToken": "TOKEN", "Expiration": "2030-01-01T00:00:00Z"}'"#,
        )
        .await
        .unwrap();

        assert_eq!(creds.access_key_id, "AKID");
        assert_eq!(creds.session_token.as_deref(), Some("TOKEN"));
        assert_eq!(
            creds.expiration.unwrap().to_rfc3339(),
            "2030-01-01T00:00:00+00:00"
        );
    }

    #[test]
    fn test_unsupported_version() {
        let result = parse_process_output(
            r#"{"Version": 2, "AccessKeyId": "AKID", "SecretAccessKey": "SECRET"}"#,
        );
        assert!(matches!(result, Err(CredmuxError::CommandFailed(_))));
    }

    #[test]
    fn test_malformed_output() {
        let result = parse_process_output("not json");
        assert!(matches!(result, Err(CredmuxError::Json(_))));
    }
}
