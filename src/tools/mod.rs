//! Diagnostic Command Subsystem
//!
//! This module decides which diagnostics may run and runs them. It enforces
//! strict measures to prevent command injection.
//!
//! # Security Features
//!
//! - **Command Whitelisting**: input must exactly match a registry key
//! - **Opaque Keys**: caller text is never passed to a program, path or shell
//! - **Fixed Arguments**: every subprocess entry carries a hardcoded argument list
//! - **Timeout Enforcement**: subprocesses are killed when their budget runs out
//! - **Output Limits**: captured output is capped
//!
//! # Architecture
//!
//! - `validator.rs`: registry and whitelist validation
//! - `executor.rs`: in-process values and subprocess execution
//! - `timeout.rs`: timeout management
//!
//! # Example
//!
//! ```no_run
//! use admin_diagnostics::tools::{CommandValidator, DiagnosticExecutor};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let validator = CommandValidator::default();
//!     let executor = DiagnosticExecutor::new();
//!
//!     let command = validator.validate("cat /proc/cpuinfo")?;
//!     let result = executor.run(&command).await?;
//!     println!("{}", result.result);
//!
//!     Ok(())
//! }
//! ```

mod executor;
mod timeout;
mod validator;

pub use executor::{DiagnosticExecutor, DiagnosticResult, ExecutionFailure, ExecutorConfig, MAX_OUTPUT_SIZE};
pub use timeout::{ExecutionTimeout, TimedOut, MAX_TIMEOUT_SECS};
pub use validator::{
    mark_process_start, normalize, Action, AllowedCommand, CommandKind, CommandRegistry,
    CommandValidationError, CommandValidator, RegistryError,
};
