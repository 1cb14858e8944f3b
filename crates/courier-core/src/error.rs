//! Shared error type across courier crates.

use thiserror::Error;
use uuid::Uuid;

use crate::protocol::data::TypeTag;

/// Boxed underlying cause carried by codec failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Stable error codes (used in logs and metric labels).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// A messenger with the same identity is already active.
    AlreadyInitialized,
    /// Operation against a closed connection or disabled messenger.
    NotOpen,
    /// Malformed frame or opaque payload (de)serialization failure.
    Codec,
    /// Typed access to an absent field.
    FieldNotFound,
    /// Typed access with the wrong type.
    TypeMismatch,
    /// A pending reply with the same request id already exists.
    DuplicateCorrelation,
    /// Transport collaborator failure.
    Transport,
    /// Invalid configuration.
    Config,
    /// Unsupported configuration version.
    UnsupportedVersion,
}

impl ErrorCode {
    /// String representation used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::AlreadyInitialized => "ALREADY_INITIALIZED",
            ErrorCode::NotOpen => "NOT_OPEN",
            ErrorCode::Codec => "CODEC",
            ErrorCode::FieldNotFound => "FIELD_NOT_FOUND",
            ErrorCode::TypeMismatch => "TYPE_MISMATCH",
            ErrorCode::DuplicateCorrelation => "DUPLICATE_CORRELATION",
            ErrorCode::Transport => "TRANSPORT",
            ErrorCode::Config => "CONFIG",
            ErrorCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, CourierError>;

/// Unified error type used by core and messenger.
#[derive(Debug, Error)]
pub enum CourierError {
    #[error("messenger already initialized: {0}")]
    AlreadyInitialized(String),
    #[error("connection is not open")]
    NotOpen,
    #[error("codec error: {context}")]
    Codec {
        context: String,
        #[source]
        source: Option<BoxError>,
    },
    #[error("field not found: {0}")]
    FieldNotFound(String),
    #[error("type mismatch on field {field}: stored {found}, requested {expected}")]
    TypeMismatch {
        field: String,
        expected: TypeTag,
        found: TypeTag,
    },
    #[error("reply already pending for request {0}")]
    DuplicateCorrelation(Uuid),
    #[error("transport: {0}")]
    Transport(String),
    #[error("config: {0}")]
    Config(String),
    #[error("unsupported config version")]
    UnsupportedVersion,
}

impl CourierError {
    /// Codec failure without an underlying cause.
    pub fn codec(context: impl Into<String>) -> Self {
        CourierError::Codec {
            context: context.into(),
            source: None,
        }
    }

    /// Codec failure wrapping the underlying cause.
    pub fn codec_with(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        CourierError::Codec {
            context: context.into(),
            source: Some(source.into()),
        }
    }

    /// Map to the stable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            CourierError::AlreadyInitialized(_) => ErrorCode::AlreadyInitialized,
            CourierError::NotOpen => ErrorCode::NotOpen,
            CourierError::Codec { .. } => ErrorCode::Codec,
            CourierError::FieldNotFound(_) => ErrorCode::FieldNotFound,
            CourierError::TypeMismatch { .. } => ErrorCode::TypeMismatch,
            CourierError::DuplicateCorrelation(_) => ErrorCode::DuplicateCorrelation,
            CourierError::Transport(_) => ErrorCode::Transport,
            CourierError::Config(_) => ErrorCode::Config,
            CourierError::UnsupportedVersion => ErrorCode::UnsupportedVersion,
        }
    }
}
