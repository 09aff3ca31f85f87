//! Error types for the TMSN broadcast network
//!
//! Provides structured error handling with:
//! - Numeric error codes for machine parsing
//! - User-friendly messages with suggestions
//! - Retry/fatal classification used by the dialer and the binary
//! - Exit codes for CLI

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for network operations
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric error codes for machine parsing and documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Configuration errors (1xx)
    ConfigNotFound = 100,
    ConfigParseError = 101,
    ConfigValidation = 102,

    // IO errors (2xx)
    IoRead = 200,
    IoWrite = 201,
    IoPermission = 202,
    IoNotFound = 203,

    // Connection errors (3xx)
    BindFailed = 300,
    ConnectionFailed = 301,
    ConnectionTimeout = 302,
    ConnectionRefused = 303,

    // Protocol errors (4xx)
    HandshakeRejected = 400,
    HandshakeTimeout = 401,
    FrameTooLarge = 402,
    ProtocolMalformed = 403,

    // Link errors (5xx)
    LinkClosed = 500,
    LinkQueueFull = 501,

    // Internal errors (9xx)
    InternalError = 900,
}

impl ErrorCode {
    /// Get the string code (e.g., "E300")
    pub fn as_str(&self) -> String {
        format!("E{}", *self as u16)
    }

    /// Get the exit code for CLI (maps to 1-125 range)
    pub fn exit_code(&self) -> i32 {
        match *self as u16 {
            100..=199 => 10, // Config errors
            200..=299 => 20, // IO errors
            300..=399 => 30, // Connection errors
            400..=499 => 40, // Protocol errors
            500..=599 => 50, // Link errors
            900..=999 => 90, // Internal errors
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type for the network
#[derive(Error, Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Configuration parse error
    #[error("Failed to parse configuration: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<toml::de::Error>,
    },

    /// Configuration validation error
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String, field: Option<String> },

    /// Generic configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    // ─────────────────────────────────────────────────────────────
    // IO / Serialization Errors
    // ─────────────────────────────────────────────────────────────

    /// Generic IO error (socket read/write on an established link)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    /// JSON envelope error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Connection Errors
    // ─────────────────────────────────────────────────────────────

    /// Listening port could not be bound
    #[error("Failed to bind listening address {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Outbound connect attempt timed out
    #[error("Connection to {addr} timed out after {timeout_ms}ms")]
    ConnectTimeout { addr: String, timeout_ms: u64 },

    /// Remote actively refused the connection
    #[error("Connection to {addr} refused")]
    ConnectRefused { addr: String },

    /// Any other connect failure (DNS, unreachable, ...)
    #[error("Failed to connect to {addr}: {message}")]
    ConnectFailed { addr: String, message: String },

    // ─────────────────────────────────────────────────────────────
    // Protocol Errors
    // ─────────────────────────────────────────────────────────────

    /// Peer identity handshake rejected
    #[error("Handshake rejected{}: {reason}", peer_suffix(.peer))]
    HandshakeRejected { peer: Option<String>, reason: String },

    /// Handshake did not complete in time
    #[error("Handshake with {addr} timed out after {timeout_ms}ms")]
    HandshakeTimeout { addr: String, timeout_ms: u64 },

    /// Declared frame length exceeds the configured maximum
    #[error("Frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: u64, max: u32 },

    /// Stream ended or produced bytes that do not form a valid frame
    #[error("Malformed frame: {0}")]
    Decode(String),

    // ─────────────────────────────────────────────────────────────
    // Link Errors
    // ─────────────────────────────────────────────────────────────

    /// Link to the peer is closed
    #[error("Link to peer '{peer}' is closed")]
    LinkClosed { peer: String },

    /// Outbound queue for the peer is full
    #[error("Outbound queue for peer '{peer}' is full")]
    LinkQueueFull { peer: String },

    // ─────────────────────────────────────────────────────────────
    // Internal Errors
    // ─────────────────────────────────────────────────────────────

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    // ─────────────────────────────────────────────────────────────
    // Error Classification
    // ─────────────────────────────────────────────────────────────

    /// Get the numeric error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            Error::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Error::ConfigValidation { .. } => ErrorCode::ConfigValidation,
            Error::Config(_) => ErrorCode::ConfigValidation,

            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ErrorCode::IoNotFound,
                std::io::ErrorKind::PermissionDenied => ErrorCode::IoPermission,
                std::io::ErrorKind::WriteZero | std::io::ErrorKind::BrokenPipe => ErrorCode::IoWrite,
                _ => ErrorCode::IoRead,
            },
            Error::Toml(_) => ErrorCode::ConfigParseError,
            Error::Json(_) => ErrorCode::ProtocolMalformed,

            Error::Bind { .. } => ErrorCode::BindFailed,
            Error::ConnectTimeout { .. } => ErrorCode::ConnectionTimeout,
            Error::ConnectRefused { .. } => ErrorCode::ConnectionRefused,
            Error::ConnectFailed { .. } => ErrorCode::ConnectionFailed,

            Error::HandshakeRejected { .. } => ErrorCode::HandshakeRejected,
            Error::HandshakeTimeout { .. } => ErrorCode::HandshakeTimeout,
            Error::FrameTooLarge { .. } => ErrorCode::FrameTooLarge,
            Error::Decode(_) => ErrorCode::ProtocolMalformed,

            Error::LinkClosed { .. } => ErrorCode::LinkClosed,
            Error::LinkQueueFull { .. } => ErrorCode::LinkQueueFull,

            Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Check if the error should feed the dialer's backoff instead of giving up
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ConnectTimeout { .. }
                | Error::ConnectRefused { .. }
                | Error::ConnectFailed { .. }
                | Error::HandshakeTimeout { .. }
                | Error::HandshakeRejected { .. }
                | Error::FrameTooLarge { .. }
                | Error::Decode(_)
                | Error::Io(_)
        )
    }

    /// Check if the error is fatal (the node should exit)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Bind { .. }
                | Error::ConfigNotFound { .. }
                | Error::ConfigParse { .. }
                | Error::ConfigValidation { .. }
                | Error::Config(_)
                | Error::Internal(_)
        )
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }

    // ─────────────────────────────────────────────────────────────
    // User-Friendly Messages
    // ─────────────────────────────────────────────────────────────

    /// Get a user-friendly suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::ConfigNotFound { .. } => Some(
                "Run 'tmsn-node config init' to create a default configuration file.",
            ),
            Error::ConfigParse { .. } => Some(
                "Check your configuration file syntax. Run 'tmsn-node config validate' to see details.",
            ),
            Error::ConfigValidation { .. } | Error::Config(_) => Some(
                "Review the configuration file and fix the invalid values.",
            ),
            Error::Bind { .. } => Some(
                "Another process may already use this port. Pick a different 'listen_port'.",
            ),
            Error::ConnectTimeout { .. } | Error::ConnectRefused { .. } => Some(
                "The peer may not be started yet. The node keeps retrying in the background.",
            ),
            Error::HandshakeRejected { .. } => Some(
                "Make sure every node uses the same peer list, or enable 'listen_for_late_joiners'.",
            ),
            Error::FrameTooLarge { .. } => Some(
                "Raise 'max_frame_size' on every node or send smaller payloads.",
            ),
            _ => None,
        }
    }

    /// Format the error for terminal display with colors
    pub fn format_for_terminal(&self) -> String {
        let code = self.code();
        let suggestion = self.suggestion();

        let mut output = format!("\x1b[31mError [{}]\x1b[0m: {}\n", code.as_str(), self);

        if let Some(hint) = suggestion {
            output.push_str(&format!("\n\x1b[33mHint\x1b[0m: {}\n", hint));
        }

        output
    }

    /// Format the error for logging (no colors)
    pub fn format_for_log(&self) -> String {
        format!("[{}] {}", self.code().as_str(), self)
    }
}

fn peer_suffix(peer: &Option<String>) -> String {
    peer.as_ref()
        .map(|p| format!(" for peer '{}'", p))
        .unwrap_or_default()
}

// ─────────────────────────────────────────────────────────────────
// Error Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    /// Create a config validation error
    pub fn config_validation(message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a config validation error with field name
    pub fn config_field_invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a handshake rejection
    pub fn handshake_rejected(peer: Option<String>, reason: impl Into<String>) -> Self {
        Error::HandshakeRejected {
            peer,
            reason: reason.into(),
        }
    }

    /// Classify a failed `connect` into refused / generic failure
    pub fn from_connect(addr: impl Into<String>, err: std::io::Error) -> Self {
        let addr = addr.into();
        match err.kind() {
            std::io::ErrorKind::ConnectionRefused => Error::ConnectRefused { addr },
            std::io::ErrorKind::TimedOut => Error::ConnectTimeout { addr, timeout_ms: 0 },
            _ => Error::ConnectFailed {
                addr,
                message: err.to_string(),
            },
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
