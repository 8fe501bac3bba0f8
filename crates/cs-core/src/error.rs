//! Core error types for the codespace tunnel engine

use cs_protocol::ProtocolError;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type
#[derive(Error, Debug)]
pub enum CsError {
    /// Session handshake failed; never retried
    #[error("error connecting to codespace: {0}")]
    Connect(String),

    /// Workspace API failure
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Bad flag or argument combination, detected before any network activity
    #[error("{0}")]
    Validation(String),

    /// The port forwarder stopped
    #[error("tunnel closed: {0}")]
    Tunnel(#[from] TunnelError),

    /// The local ssh/scp process failed
    #[error("{context}: {source}")]
    LocalClient {
        context: &'static str,
        source: LocalClientError,
    },

    /// The account has no workspaces; not a failure for the user
    #[error("no codespaces found")]
    NoWorkspaces,

    /// Named workspace does not exist
    #[error("codespace not found: {0}")]
    NotFound(String),

    /// Remote side rejected a session operation
    #[error("session error: {0}")]
    Session(String),

    #[error("operation canceled")]
    Canceled,

    /// Protocol error
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CsError {
    /// Whether the process should still exit successfully after printing this
    pub fn is_benign(&self) -> bool {
        matches!(self, CsError::NoWorkspaces)
    }
}

/// Errors from the workspace REST API
#[derive(Error, Debug)]
pub enum ApiError {
    /// Server-side failure (5xx); the only kind the resolver retries
    #[error("server error {status}: {message}")]
    Transient { status: u16, message: String },

    /// Any other non-success status
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    /// Transport failure
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("error decoding response: {0}")]
    Decode(String),

    #[error("request canceled")]
    Canceled,
}

impl ApiError {
    /// Classify an HTTP status that is not a success
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            404 => ApiError::NotFound(message),
            500..=599 => ApiError::Transient { status, message },
            _ => ApiError::Status { status, message },
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Transient { .. })
    }
}

/// Why a port forwarder returned
#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("context canceled")]
    Canceled,

    /// The session ended underneath the forwarder
    #[error("session closed")]
    SessionClosed,

    #[error("error accepting connection: {0}")]
    Accept(std::io::Error),

    #[error("error opening channel: {0}")]
    Open(String),

    /// Single-stream forward finished because one side hung up
    #[error("connection closed")]
    StreamClosed,

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// Failure of the local ssh/scp process
#[derive(Error, Debug)]
pub enum LocalClientError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: &'static str,
        source: std::io::Error,
    },

    #[error("{}", describe_exit(*.0))]
    Exit(Option<i32>),

    #[error("interrupted")]
    Canceled,
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit status {}", code),
        None => "terminated by signal".to_string(),
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
}
