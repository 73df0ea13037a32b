//! CLI error types with miette diagnostics.
//!
//! Maps config, transport and core errors into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use cuplink_config::ConfigError;
use cuplink_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not reach MQTT broker at {endpoint}: {reason}")]
    #[diagnostic(
        code(cuplink::connection_failed),
        help(
            "Check that the broker is running and accepts connections.\n\
             Configure it under [broker] url, or set CUPLINK_BROKER__URL."
        )
    )]
    ConnectionFailed { endpoint: String, reason: String },

    #[error("Broker at {endpoint} did not accept a connection within {seconds}s")]
    #[diagnostic(
        code(cuplink::timeout),
        help("Increase --timeout-secs or run with -v to see each connect attempt.")
    )]
    Timeout { endpoint: String, seconds: u64 },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(cuplink::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Configuration file not found: {path}")]
    #[diagnostic(
        code(cuplink::no_config),
        help("Pass an existing file with --config, or omit it to use the default location.")
    )]
    NoConfig { path: String },

    #[error("{message}")]
    #[diagnostic(code(cuplink::config))]
    Config { message: String },

    // ── Runtime ──────────────────────────────────────────────────────

    #[error("{message}")]
    #[diagnostic(code(cuplink::operation_failed))]
    OperationFailed { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::Config { .. } => exit_code::USAGE,
            Self::NoConfig { .. } => exit_code::NOT_FOUND,
            Self::OperationFailed { .. } | Self::Io(_) => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NotFound { path } => CliError::NoConfig {
                path: path.display().to_string(),
            },
            other => CliError::Config {
                message: other.to_string(),
            },
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectorDisconnected => CliError::ConnectionFailed {
                endpoint: "(disconnected)".into(),
                reason: "the broker session is not open".into(),
            },

            CoreError::Transport { message } => CliError::ConnectionFailed {
                endpoint: "(broker)".into(),
                reason: message,
            },

            CoreError::InvalidRequest { message } => CliError::Validation {
                field: "publish".into(),
                reason: message,
            },

            CoreError::Config { message } => CliError::Config { message },

            other => CliError::OperationFailed {
                message: other.to_string(),
            },
        }
    }
}

impl From<cuplink_api::Error> for CliError {
    fn from(err: cuplink_api::Error) -> Self {
        CoreError::from(err).into()
    }
}
