//! Command Validation Module
//!
//! This module decides whether a free-form string names one of the allowed
//! diagnostic operations. It uses a whitelist approach: the input is reduced
//! to an opaque lookup key and only an exact member of the registry passes.
//! The caller's text is discarded after the lookup and never reaches the
//! executed action.

use lazy_static::lazy_static;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

lazy_static! {
    static ref PROCESS_START: Instant = Instant::now();

    /// Built-in registry, constructed once and shared by every handler
    static ref BUILTIN_REGISTRY: Arc<CommandRegistry> = Arc::new(
        CommandRegistry::new(builtin_entries())
            .expect("built-in diagnostic registry is well formed")
    );
}

/// Error types for command validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandValidationError {
    #[error("Command {0:?} is not in the allowed whitelist")]
    NotAllowed(String),

    #[error("Command {input:?} contains disallowed character {character:?}")]
    DisallowedCharacter { input: String, character: char },
}

/// Error types for registry construction
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Registry key must not be empty")]
    EmptyKey,

    #[error("Registry key {0:?} is registered more than once")]
    DuplicateKey(&'static str),

    #[error("Registry key {0:?} is not in normalized form")]
    NotNormalized(&'static str),

    #[error("Registry key {key:?} contains disallowed character {character:?}")]
    DisallowedCharacter { key: &'static str, character: char },
}

/// How an allowed command produces its output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Computed in-process with no externally observable side effect
    PureValue,
    /// Spawns a fixed external program with a fixed argument list
    Subprocess,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::PureValue => write!(f, "pure-value"),
            CommandKind::Subprocess => write!(f, "subprocess"),
        }
    }
}

/// The concrete operation behind a registry key
///
/// Both variants hold only `'static` data, so nothing derived from a
/// request can be stored in an action.
#[derive(Clone, Copy)]
pub enum Action {
    Pure(fn() -> anyhow::Result<String>),
    Subprocess {
        program: &'static str,
        args: &'static [&'static str],
    },
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Pure(_) => f.write_str("Pure(<fn>)"),
            Action::Subprocess { program, args } => f
                .debug_struct("Subprocess")
                .field("program", program)
                .field("args", args)
                .finish(),
        }
    }
}

/// An entry in the command registry
#[derive(Debug, Clone, Copy)]
pub struct AllowedCommand {
    /// The exact string a caller must supply
    pub key: &'static str,

    /// What runs when the key matches
    pub action: Action,
}

impl AllowedCommand {
    /// Create an in-process entry
    pub fn pure(key: &'static str, compute: fn() -> anyhow::Result<String>) -> Self {
        Self {
            key,
            action: Action::Pure(compute),
        }
    }

    /// Create an entry that spawns `program` with exactly `args`
    pub fn subprocess(
        key: &'static str,
        program: &'static str,
        args: &'static [&'static str],
    ) -> Self {
        Self {
            key,
            action: Action::Subprocess { program, args },
        }
    }

    pub fn kind(&self) -> CommandKind {
        match self.action {
            Action::Pure(_) => CommandKind::PureValue,
            Action::Subprocess { .. } => CommandKind::Subprocess,
        }
    }
}

/// Immutable mapping from opaque key to action
///
/// Built once at startup. There are no mutating methods, so the registry
/// can be shared across handlers without synchronization.
#[derive(Debug)]
pub struct CommandRegistry {
    entries: BTreeMap<&'static str, AllowedCommand>,
}

impl CommandRegistry {
    /// Build a registry, checking every key
    ///
    /// # Errors
    ///
    /// Fails on empty keys, duplicate keys, keys that would not survive
    /// normalization unchanged, and keys with characters outside the
    /// permitted class (which excludes every wildcard character).
    pub fn new(entries: impl IntoIterator<Item = AllowedCommand>) -> Result<Self, RegistryError> {
        let mut map = BTreeMap::new();

        for entry in entries {
            if entry.key.is_empty() {
                return Err(RegistryError::EmptyKey);
            }
            if normalize(entry.key) != entry.key {
                return Err(RegistryError::NotNormalized(entry.key));
            }
            if let Some(character) = first_disallowed_char(entry.key) {
                return Err(RegistryError::DisallowedCharacter {
                    key: entry.key,
                    character,
                });
            }
            if map.insert(entry.key, entry).is_some() {
                return Err(RegistryError::DuplicateKey(entry.key));
            }
        }

        Ok(Self { entries: map })
    }

    /// The process-wide built-in registry
    pub fn builtin() -> Arc<CommandRegistry> {
        Arc::clone(&*BUILTIN_REGISTRY)
    }

    pub fn get(&self, key: &str) -> Option<AllowedCommand> {
        self.entries.get(key).copied()
    }

    /// Entries ordered by key
    pub fn list(&self) -> impl Iterator<Item = &AllowedCommand> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn builtin_entries() -> Vec<AllowedCommand> {
    vec![
        AllowedCommand::pure("ping", || Ok("pong".to_string())),
        AllowedCommand::pure("status", || Ok("OK".to_string())),
        AllowedCommand::pure("process-uptime", process_uptime),
        AllowedCommand::pure("hostname", host_name),
        AllowedCommand::subprocess("uptime", "uptime", &[]),
        AllowedCommand::subprocess("df", "df", &[]),
        AllowedCommand::subprocess("free", "free", &[]),
        AllowedCommand::subprocess("top", "top", &["-b", "-n", "1"]),
        AllowedCommand::subprocess("ps", "ps", &[]),
        AllowedCommand::subprocess("whoami", "whoami", &[]),
        AllowedCommand::subprocess("uname", "uname", &[]),
        AllowedCommand::subprocess("ls", "ls", &[]),
        AllowedCommand::subprocess("cat /proc/cpuinfo", "cat", &["/proc/cpuinfo"]),
        AllowedCommand::subprocess("cat /proc/meminfo", "cat", &["/proc/meminfo"]),
        AllowedCommand::subprocess("cat /etc/os-release", "cat", &["/etc/os-release"]),
    ]
}

/// Pin the start instant. Call early in `main` so `process-uptime` counts
/// from startup rather than from its first request.
pub fn mark_process_start() {
    lazy_static::initialize(&PROCESS_START);
}

fn process_uptime() -> anyhow::Result<String> {
    Ok(format!("{:.3}s", PROCESS_START.elapsed().as_secs_f64()))
}

fn host_name() -> anyhow::Result<String> {
    let name = hostname::get()?;
    Ok(name.to_string_lossy().into_owned())
}

/// Trim and collapse internal whitespace runs to a single space
pub fn normalize(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_permitted_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '/' | '.' | ' ')
}

fn first_disallowed_char(s: &str) -> Option<char> {
    s.chars().find(|c| !is_permitted_char(*c))
}

/// Command validator that enforces the whitelist
///
/// # Security Principles
///
/// 1. **Whitelist Only**: the final decision is exact membership in the registry
/// 2. **Character Screening**: shell metacharacters are rejected before the lookup
/// 3. **Opaque Keys**: a match yields the registry entry, never the caller's text
#[derive(Debug, Clone)]
pub struct CommandValidator {
    registry: Arc<CommandRegistry>,
}

impl Default for CommandValidator {
    fn default() -> Self {
        Self::new(CommandRegistry::builtin())
    }
}

impl CommandValidator {
    pub fn new(registry: Arc<CommandRegistry>) -> Self {
        Self { registry }
    }

    /// Validate untrusted input against the registry
    ///
    /// # Example
    ///
    /// ```
    /// use admin_diagnostics::tools::CommandValidator;
    ///
    /// let validator = CommandValidator::default();
    /// assert!(validator.validate("  cat   /proc/cpuinfo ").is_ok());
    /// assert!(validator.validate("uptime; rm -rf /").is_err());
    /// ```
    pub fn validate(&self, raw: &str) -> Result<AllowedCommand, CommandValidationError> {
        let normalized = normalize(raw);

        if let Some(character) = first_disallowed_char(&normalized) {
            return Err(CommandValidationError::DisallowedCharacter {
                input: normalized,
                character,
            });
        }

        self.registry
            .get(&normalized)
            .ok_or(CommandValidationError::NotAllowed(normalized))
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }
}
