//! Error types for cadence operations.
//!
//! Every failure the engine can observe maps onto one variant here. Only a
//! configuration error at startup is fatal; everything else is contained to
//! the event that caused it.

use thiserror::Error;

/// Result type alias for cadence operations.
pub type CadenceResult<T> = Result<T, CadenceError>;

/// Main error type for all cadence operations.
#[derive(Error, Debug)]
pub enum CadenceError {
    /// A rule resource is missing, unreadable or malformed.
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An inbound message does not fit the expected shape.
    #[error("Malformed event: {message}")]
    MalformedEvent { message: String, code: ErrorCode },

    /// Appending to the log sink failed.
    #[error("Log sink write error: {message}")]
    SinkWrite {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Emitting a detection action failed.
    #[error("Dispatch error: {message}")]
    Dispatch { message: String, code: ErrorCode },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Configuration (CFG_xxx)
    CfgMissingResource,
    CfgInvalidResource,

    // Events (EVT_xxx)
    EvtMalformed,

    // Sink (SNK_xxx)
    SnkWriteFailed,

    // Dispatch (DSP_xxx)
    DspFailed,

    // Internal
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::CfgMissingResource => "CFG_001",
            ErrorCode::CfgInvalidResource => "CFG_002",
            ErrorCode::EvtMalformed => "EVT_001",
            ErrorCode::SnkWriteFailed => "SNK_001",
            ErrorCode::DspFailed => "DSP_001",
            ErrorCode::Internal => "INT_001",
        }
    }
}

impl CadenceError {
    /// Create a configuration error for an unparseable resource.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            code: ErrorCode::CfgInvalidResource,
            source: None,
        }
    }

    /// Create a configuration error carrying its underlying cause.
    pub fn configuration_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Configuration {
            message: message.into(),
            code: ErrorCode::CfgInvalidResource,
            source: Some(Box::new(source)),
        }
    }

    /// Create a configuration error for a resource that could not be read.
    pub fn config_missing(resource: impl Into<String>, source: std::io::Error) -> Self {
        Self::Configuration {
            message: format!("cannot read '{}'", resource.into()),
            code: ErrorCode::CfgMissingResource,
            source: Some(Box::new(source)),
        }
    }

    /// Create a malformed event error.
    pub fn malformed_event(message: impl Into<String>) -> Self {
        Self::MalformedEvent {
            message: message.into(),
            code: ErrorCode::EvtMalformed,
        }
    }

    /// Create a sink write error.
    pub fn sink_write(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::SinkWrite {
            message: message.into(),
            code: ErrorCode::SnkWriteFailed,
            source: Some(Box::new(source)),
        }
    }

    /// Create a dispatch error.
    pub fn dispatch(message: impl Into<String>) -> Self {
        Self::Dispatch {
            message: message.into(),
            code: ErrorCode::DspFailed,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Configuration { code, .. } => *code,
            Self::MalformedEvent { code, .. } => *code,
            Self::SinkWrite { code, .. } => *code,
            Self::Dispatch { code, .. } => *code,
            Self::Serialization(_) => ErrorCode::EvtMalformed,
            _ => ErrorCode::Internal,
        }
    }

    /// Whether this error belongs to the configuration class.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    /// Get an operator-facing suggestion for resolving this error.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Configuration {
                code: ErrorCode::CfgMissingResource,
                ..
            } => Some("Check that habits.json, triggers.json and ignore.json exist"),
            Self::Configuration { .. } => Some("Check the rule files for JSON syntax errors"),
            Self::SinkWrite { .. } => Some("Check that the log directory is writable"),
            Self::Dispatch { .. } => Some("Check that the message bus connection is up"),
            _ => None,
        }
    }
}
