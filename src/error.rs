//! Error handling for geolayers
//!
//! Typed errors per subsystem, built with thiserror. Protocol adapters tag
//! every failure with the protocol it came from; the sync engine wraps tree,
//! import and backend failures into one scoped [`SyncError`].

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::sources::Protocol;
use crate::sync::OperationKind;

// =============================================================================
// Protocol adapters
// =============================================================================

/// Failure of a protocol adapter call, tagged with the originating protocol
#[derive(Error, Debug)]
#[error("{protocol} request failed: {kind}")]
pub struct SourceError {
    pub protocol: Protocol,
    pub kind: SourceErrorKind,
}

#[derive(Error, Debug)]
pub enum SourceErrorKind {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("service exception: {0}")]
    ServiceException(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl SourceError {
    pub fn new(protocol: Protocol, kind: SourceErrorKind) -> Self {
        Self { protocol, kind }
    }

    pub fn malformed(protocol: Protocol, message: impl Into<String>) -> Self {
        Self::new(protocol, SourceErrorKind::Malformed(message.into()))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, SourceErrorKind::Timeout(_))
    }

    /// HTTP status of the failed response, if the server answered
    pub fn status(&self) -> Option<u16> {
        match self.kind {
            SourceErrorKind::Status { status, .. } => Some(status),
            _ => None,
        }
    }
}

// =============================================================================
// Project backend
// =============================================================================

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("backend transport error: {0}")]
    Transport(String),

    #[error("backend request timed out")]
    Timeout,

    #[error("backend returned {status}: {}", .message.as_deref().unwrap_or("no message"))]
    Status {
        status: u16,
        message: Option<String>,
    },

    #[error("malformed backend response: {0}")]
    Malformed(String),
}

impl BackendError {
    /// Message supplied by the backend itself, suitable for the user
    pub fn backend_message(&self) -> Option<&str> {
        match self {
            Self::Status {
                message: Some(message),
                ..
            } => Some(message.as_str()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

// =============================================================================
// Layer tree
// =============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("duplicate layer id in project tree: {0}")]
    DuplicateLayerId(String),

    #[error("cannot move '{dragged}' into its own subtree at '{target}'")]
    CyclicMove { dragged: String, target: String },

    #[error("drop target '{0}' is not a group")]
    NotAGroup(String),
}

// =============================================================================
// Import validation
// =============================================================================

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("layer name must not be empty")]
    EmptyLayerName,

    #[error("shapefile bundle has no .shp file")]
    MissingPrimaryFile,

    #[error("no {0} file supplied")]
    MissingFile(&'static str),

    #[error("unsupported file for {format} import: {file}")]
    UnsupportedFile { format: &'static str, file: String },

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// =============================================================================
// Sync engine
// =============================================================================

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("import rejected: {0}")]
    Import(#[from] ImportError),

    #[error("{operation} failed: {message}")]
    Remote {
        operation: OperationKind,
        message: String,
        #[source]
        source: BackendError,
    },

    #[error("project refresh failed: {0}")]
    Refresh(#[source] BackendError),

    #[error("invalid request: {0}")]
    Validation(String),
}

impl SyncError {
    /// True when the failure happened before any remote call was issued
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::Tree(_) | Self::Import(_) | Self::Validation(_)
        )
    }
}

pub type SourceResult<T> = std::result::Result<T, SourceError>;
pub type BackendResult<T> = std::result::Result<T, BackendError>;
pub type SyncResult<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_names_protocol() {
        let err = SourceError::new(
            Protocol::FeatureQuery,
            SourceErrorKind::Status {
                status: 503,
                body: "down".into(),
            },
        );
        assert_eq!(err.status(), Some(503));
        assert!(err.to_string().starts_with("WFS"));
    }

    #[test]
    fn test_backend_message_only_from_status() {
        let err = BackendError::Status {
            status: 400,
            message: Some("Group exists".into()),
        };
        assert_eq!(err.backend_message(), Some("Group exists"));
        assert_eq!(BackendError::Timeout.backend_message(), None);
    }

    #[test]
    fn test_local_sync_errors() {
        assert!(SyncError::from(ImportError::MissingPrimaryFile).is_local());
        assert!(!SyncError::Refresh(BackendError::Timeout).is_local());
    }
}
