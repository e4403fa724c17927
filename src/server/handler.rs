//! Request handling for `POST /api/admin/diagnostics`.
//!
//! Each request is an independent authenticate → parse → validate →
//! execute → respond sequence. Authentication happens in [`admin_gate`]
//! before the body is buffered. Nothing here is shared between requests
//! except the read-only registry inside the validator.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;
use tracing::{debug, error, info_span, warn, Instrument};
use uuid::Uuid;

use super::error::DiagnosticError;
use super::AppState;
use crate::metrics;
use crate::tools::{DiagnosticResult, ExecutionFailure};

/// Route middleware that rejects non-admin callers before the body is read
///
/// Opens the per-request span that the handler runs inside.
pub async fn admin_gate(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let span = info_span!("diagnostics", request_id = %Uuid::new_v4());

    async move {
        if let Err(reason) = state.auth.require_admin(request.headers()).await {
            warn!(%reason, "Rejected diagnostics request from non-admin caller");
            let err = DiagnosticError::Unauthorized;
            metrics::record_outcome(err.outcome());
            return err.into_response();
        }
        next.run(request).await
    }
    .instrument(span)
    .await
}

pub async fn diagnostics_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    match handle(&state, &body).await {
        Ok(result) => {
            metrics::record_outcome("success");
            (StatusCode::OK, Json(result)).into_response()
        }
        Err(err) => {
            match &err {
                DiagnosticError::Internal(detail) => error!(%detail, "Diagnostics error"),
                other => debug!(error = %other, "Diagnostics request refused"),
            }
            metrics::record_outcome(err.outcome());
            err.into_response()
        }
    }
}

async fn handle(state: &AppState, body: &[u8]) -> Result<DiagnosticResult, DiagnosticError> {
    let raw = extract_command(body)?;

    let command = state.validator.validate(&raw).map_err(|err| {
        warn!(error = %err, "Rejected diagnostic command");
        DiagnosticError::from(err)
    })?;

    let result = state
        .executor
        .run(&command)
        .await
        .map_err(|failure| execution_error(failure, state.expose_stderr))?;

    metrics::DIAGNOSTIC_DURATION_SECONDS
        .with_label_values(&[command.key])
        .observe(result.duration.as_secs_f64());

    Ok(result)
}

/// Pull the `command` string out of the body
///
/// A body that is not JSON, not an object, or lacks a non-empty `command`
/// counts as a missing parameter.
fn extract_command(body: &[u8]) -> Result<String, DiagnosticError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|_| DiagnosticError::MissingParameter)?;

    match value.get("command") {
        None | Some(Value::Null) => Err(DiagnosticError::MissingParameter),
        Some(Value::String(s)) if s.is_empty() => Err(DiagnosticError::MissingParameter),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(DiagnosticError::NonStringCommand),
    }
}

fn execution_error(failure: ExecutionFailure, expose_stderr: bool) -> DiagnosticError {
    match &failure {
        ExecutionFailure::PureValue(_) => {}
        ExecutionFailure::TimedOut(_) => {
            metrics::SUBPROCESS_TIMEOUTS_TOTAL.inc();
            warn!(error = %failure, "Diagnostic execution failed");
        }
        _ => warn!(error = %failure, "Diagnostic execution failed"),
    }
    DiagnosticError::from_execution(failure, expose_stderr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_command() {
        assert_eq!(extract_command(br#"{"command":"ping"}"#).unwrap(), "ping");
        assert_eq!(
            extract_command(br#"{"command":" cat  /proc/cpuinfo "}"#).unwrap(),
            " cat  /proc/cpuinfo "
        );
    }

    #[test]
    fn test_extract_command_missing() {
        for body in [
            &br#"{}"#[..],
            br#"{"command":null}"#,
            br#"{"command":""}"#,
            br#"[]"#,
            br#""ping""#,
            b"not json",
            b"",
        ] {
            assert!(
                matches!(extract_command(body), Err(DiagnosticError::MissingParameter)),
                "body {:?}",
                String::from_utf8_lossy(body)
            );
        }
    }

    #[test]
    fn test_extract_command_non_string() {
        assert!(matches!(
            extract_command(br#"{"command":["uptime","-a"]}"#),
            Err(DiagnosticError::NonStringCommand)
        ));
        assert!(matches!(
            extract_command(br#"{"command":42}"#),
            Err(DiagnosticError::NonStringCommand)
        ));
    }

    #[test]
    fn test_pure_value_failure_is_internal() {
        let err = execution_error(ExecutionFailure::PureValue(anyhow::anyhow!("clock")), true);
        assert!(matches!(err, DiagnosticError::Internal(_)));
    }

    #[test]
    fn test_nonzero_exit_message_follows_policy() {
        let failure = || ExecutionFailure::NonZeroExit {
            code: Some(2),
            stderr: "df: /mnt: Permission denied".to_string(),
        };
        assert_eq!(
            execution_error(failure(), false).public_message(),
            "Command failed"
        );
        assert!(execution_error(failure(), true)
            .public_message()
            .contains("Permission denied"));
    }
}
