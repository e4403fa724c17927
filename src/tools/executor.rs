//! Diagnostic Executor
//!
//! Runs a validated registry entry and shapes the result. In-process
//! values are computed directly; subprocess entries are spawned without a
//! shell, with their fixed argument list, under a timeout and an output cap.

use super::timeout::{ExecutionTimeout, TimedOut};
use super::validator::{Action, AllowedCommand};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command as TokioCommand;
use tracing::{debug, info, warn};

/// Maximum output size in bytes (1MB)
pub const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

const ELLIPSIS: &str = "...";

/// Fixed search path handed to every child
const CHILD_PATH: &str = "/usr/sbin:/usr/bin:/sbin:/bin";

/// Outcome of a successful diagnostic
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticResult {
    /// Echo of the matched registry key
    pub command: String,

    /// Captured output or computed value
    pub result: String,

    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Utc>,

    #[serde(skip)]
    pub duration: Duration,
}

fn serialize_timestamp<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Why a whitelisted command did not produce a result
#[derive(Debug, thiserror::Error)]
pub enum ExecutionFailure {
    #[error("Failed to spawn process '{program}': {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Command exited with code {code:?}")]
    NonZeroExit { code: Option<i32>, stderr: String },

    #[error(transparent)]
    TimedOut(#[from] TimedOut),

    #[error("In-process diagnostic failed: {0}")]
    PureValue(anyhow::Error),
}

impl ExecutionFailure {
    /// Message safe to hand back to the caller
    ///
    /// Captured stderr is only included when `expose_stderr` is set.
    pub fn public_message(&self, expose_stderr: bool) -> String {
        match self {
            ExecutionFailure::NonZeroExit { stderr, .. }
                if expose_stderr && !stderr.trim().is_empty() =>
            {
                stderr.clone()
            }
            ExecutionFailure::TimedOut(_) => "Command timed out".to_string(),
            _ => "Command failed".to_string(),
        }
    }
}

/// Configuration for diagnostic execution
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Budget for a subprocess (default: 10 seconds)
    pub timeout: ExecutionTimeout,

    /// Maximum output size in bytes per stream (default: 1MB)
    pub max_output_size: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout: ExecutionTimeout::default(),
            max_output_size: MAX_OUTPUT_SIZE,
        }
    }
}

impl ExecutorConfig {
    pub fn with_timeout(timeout: ExecutionTimeout) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }

    pub fn with_max_output_size(size: usize) -> Self {
        Self {
            max_output_size: size,
            ..Default::default()
        }
    }
}

/// Executor for validated diagnostics
///
/// # Security
///
/// 1. Uses `tokio::process::Command` directly, never a shell
/// 2. Arguments come only from the registry entry
/// 3. The child gets a cleared environment with a fixed `PATH`
/// 4. A timed-out child is killed
/// 5. Output size is capped
#[derive(Debug, Clone, Default)]
pub struct DiagnosticExecutor {
    config: ExecutorConfig,
}

impl DiagnosticExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ExecutorConfig) -> Self {
        Self { config }
    }

    /// Execute a registry entry
    ///
    /// # Errors
    ///
    /// Returns `ExecutionFailure` if the process cannot be spawned, exits
    /// non-zero, or exceeds the timeout, or if an in-process value fails.
    pub async fn run(&self, command: &AllowedCommand) -> Result<DiagnosticResult, ExecutionFailure> {
        let start = Instant::now();

        let output = match command.action {
            Action::Pure(compute) => {
                debug!(command = command.key, "Computing in-process diagnostic");
                compute().map_err(ExecutionFailure::PureValue)?
            }
            Action::Subprocess { program, args } => self.spawn(program, args).await?,
        };

        let duration = start.elapsed();
        info!(
            command = command.key,
            duration_ms = duration.as_millis() as u64,
            bytes = output.len(),
            "Diagnostic succeeded"
        );

        Ok(DiagnosticResult {
            command: command.key.to_string(),
            result: output,
            timestamp: Utc::now(),
            duration,
        })
    }

    async fn spawn(
        &self,
        program: &'static str,
        args: &'static [&'static str],
    ) -> Result<String, ExecutionFailure> {
        info!(program, ?args, "Executing diagnostic subprocess");

        let mut process = TokioCommand::new(program);
        process
            .args(args)
            .env_clear()
            .env("PATH", CHILD_PATH)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = process
            .spawn()
            .map_err(|source| ExecutionFailure::Spawn { program, source })?;

        // One byte past the cap is kept so truncation can be detected.
        let keep = self.config.max_output_size.saturating_add(1);
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let collect = async {
            tokio::try_join!(
                read_capped(stdout, keep),
                read_capped(stderr, keep),
                child.wait()
            )
        };

        // On timeout the child is dropped on return, which kills it.
        let (stdout, stderr, status) = match self.config.timeout.run(collect).await {
            Ok(result) => result.map_err(|source| ExecutionFailure::Spawn { program, source })?,
            Err(timed_out) => {
                warn!(program, timeout = ?timed_out.0, "Diagnostic subprocess timed out");
                return Err(timed_out.into());
            }
        };

        let limit = self.config.max_output_size;
        let stdout = truncate_string(String::from_utf8_lossy(&stdout).into_owned(), limit);
        let stderr = truncate_string(String::from_utf8_lossy(&stderr).into_owned(), limit);

        if status.success() {
            Ok(stdout)
        } else {
            let code = status.code();
            warn!(program, ?code, stderr = %stderr.trim(), "Diagnostic subprocess failed");
            Err(ExecutionFailure::NonZeroExit { code, stderr })
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }
}

/// Read at most `keep` bytes from a child pipe, discarding the rest
///
/// The remainder is drained so the child never blocks on a full pipe.
async fn read_capped<R>(reader: Option<R>, keep: usize) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok(Vec::new());
    };

    let mut buf = Vec::new();
    (&mut reader).take(keep as u64).read_to_end(&mut buf).await?;
    tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;
    Ok(buf)
}

/// Truncate a string to at most `max_len` bytes
///
/// An ellipsis marks the cut when there is room for it.
fn truncate_string(mut s: String, max_len: usize) -> String {
    if s.len() <= max_len {
        return s;
    }

    let (mut cut, suffix) = if max_len > ELLIPSIS.len() {
        (max_len - ELLIPSIS.len(), ELLIPSIS)
    } else {
        (max_len, "")
    };
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
    s.push_str(suffix);
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::validator::CommandRegistry;

    fn builtin(key: &str) -> AllowedCommand {
        CommandRegistry::builtin().get(key).unwrap()
    }

    #[tokio::test]
    async fn test_pure_value_runs_in_process() {
        let executor = DiagnosticExecutor::new();
        let result = executor.run(&builtin("ping")).await.unwrap();

        assert_eq!(result.command, "ping");
        assert_eq!(result.result, "pong");
    }

    #[tokio::test]
    async fn test_repeated_runs_echo_same_command() {
        let executor = DiagnosticExecutor::new();
        let command = builtin("status");

        let first = executor.run(&command).await.unwrap();
        let second = executor.run(&command).await.unwrap();

        assert_eq!(first.command, second.command);
        assert!(!first.result.is_empty());
        assert!(!second.result.is_empty());
    }

    #[tokio::test]
    async fn test_subprocess_captures_stdout() {
        let executor = DiagnosticExecutor::new();
        let result = executor.run(&builtin("uname")).await.unwrap();

        assert_eq!(result.command, "uname");
        assert!(!result.result.trim().is_empty());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_fixed_file_read() {
        let executor = DiagnosticExecutor::new();
        let result = executor.run(&builtin("cat /proc/meminfo")).await.unwrap();
        assert!(result.result.contains("MemTotal"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_reports_stderr_not_stdout() {
        let command = AllowedCommand::subprocess(
            "broken",
            "sh",
            &["-c", "echo partial; echo disk on fire >&2; exit 3"],
        );
        let executor = DiagnosticExecutor::new();

        match executor.run(&command).await {
            Err(ExecutionFailure::NonZeroExit { code, stderr }) => {
                assert_eq!(code, Some(3));
                assert!(stderr.contains("disk on fire"));
                assert!(!stderr.contains("partial"));
            }
            other => panic!("expected non-zero exit, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let command = AllowedCommand::subprocess("slow", "sleep", &["10"]);
        let config = ExecutorConfig::with_timeout(ExecutionTimeout::new(Duration::from_millis(200)));
        let executor = DiagnosticExecutor::with_config(config);

        let start = Instant::now();
        let result = executor.run(&command).await;

        assert!(matches!(result, Err(ExecutionFailure::TimedOut(_))));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_failure() {
        let command = AllowedCommand::subprocess("ghost", "this-command-does-not-exist-12345", &[]);
        let result = DiagnosticExecutor::new().run(&command).await;

        let err = result.unwrap_err();
        assert!(matches!(err, ExecutionFailure::Spawn { .. }));
        assert!(err.to_string().contains("Failed to spawn"));
    }

    #[tokio::test]
    async fn test_child_environment_is_cleared() {
        std::env::set_var("DIAGNOSTICS_TEST_SECRET", "hunter2");
        let command = AllowedCommand::subprocess("env", "env", &[]);
        let result = DiagnosticExecutor::new().run(&command).await.unwrap();

        assert!(!result.result.contains("hunter2"));
        assert!(result.result.contains("LC_ALL=C"));
    }

    #[tokio::test]
    async fn test_output_truncation() {
        let command = AllowedCommand::subprocess("seq", "seq", &["1000"]);
        let executor = DiagnosticExecutor::with_config(ExecutorConfig::with_max_output_size(100));

        let result = executor.run(&command).await.unwrap();
        assert!(result.result.len() <= 100);
        assert!(result.result.ends_with("..."));
    }

    #[tokio::test]
    async fn test_tiny_output_cap_is_never_exceeded() {
        let command = AllowedCommand::subprocess("seq", "seq", &["1000"]);

        for cap in 1..=3 {
            let executor = DiagnosticExecutor::with_config(ExecutorConfig::with_max_output_size(cap));
            let result = executor.run(&command).await.unwrap();
            assert!(result.result.len() <= cap, "cap {} gave {:?}", cap, result.result);
            assert!(result.result.starts_with('1'));
        }
    }

    #[tokio::test]
    async fn test_large_output_is_drained_not_buffered() {
        // Several megabytes of output; the child must not stall on a full pipe
        let command = AllowedCommand::subprocess("seq", "seq", &["1000000"]);
        let executor = DiagnosticExecutor::with_config(ExecutorConfig::with_max_output_size(64));

        let result = executor.run(&command).await.unwrap();
        assert!(result.result.len() <= 64);
        assert!(result.result.ends_with("..."));
    }

    #[tokio::test]
    async fn test_pure_value_error_is_reported() {
        let command = AllowedCommand::pure("broken", || Err(anyhow::anyhow!("no clock")));
        let result = DiagnosticExecutor::new().run(&command).await;
        assert!(matches!(result, Err(ExecutionFailure::PureValue(_))));
    }

    #[test]
    fn test_public_message_hides_stderr_by_default() {
        let failure = ExecutionFailure::NonZeroExit {
            code: Some(1),
            stderr: "/var/secret/path: permission denied".to_string(),
        };
        assert_eq!(failure.public_message(false), "Command failed");
        assert!(failure.public_message(true).contains("permission denied"));

        let blank = ExecutionFailure::NonZeroExit {
            code: Some(1),
            stderr: "  \n".to_string(),
        };
        assert_eq!(blank.public_message(true), "Command failed");

        let timed_out = ExecutionFailure::TimedOut(TimedOut(Duration::from_secs(1)));
        assert_eq!(timed_out.public_message(true), "Command timed out");
    }

    #[test]
    fn test_result_serializes_three_fields() {
        let result = DiagnosticResult {
            command: "ping".to_string(),
            result: "pong".to_string(),
            timestamp: Utc::now(),
            duration: Duration::from_millis(3),
        };
        let value = serde_json::to_value(&result).unwrap();
        let object = value.as_object().unwrap();

        assert_eq!(object.len(), 3);
        assert_eq!(object["command"], "ping");
        assert_eq!(object["result"], "pong");
        let ts = object["timestamp"].as_str().unwrap();
        assert!(ts.ends_with('Z'));
        assert!(DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("hello".to_string(), 10), "hello");
        assert_eq!(truncate_string("hello".to_string(), 5), "hello");
        assert_eq!(truncate_string("hello world".to_string(), 5), "he...");
        assert_eq!(truncate_string("".to_string(), 10), "");
    }

    #[test]
    fn test_truncate_below_ellipsis_width() {
        assert_eq!(truncate_string("hello".to_string(), 3), "hel");
        assert_eq!(truncate_string("hello".to_string(), 2), "he");
        assert_eq!(truncate_string("hello".to_string(), 1), "h");
        assert_eq!(truncate_string("hello".to_string(), 0), "");
        assert_eq!(truncate_string("éa".to_string(), 1), "");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        // 'é' is two bytes; a naive cut at byte 2 would split it
        let truncated = truncate_string("aéééé".to_string(), 5);
        assert_eq!(truncated, "a...");
    }
}
