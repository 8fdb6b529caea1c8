//! Transport error types.

use std::io;

/// Transport layer errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// I/O error from the underlying socket or device
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Raw sockets or capture devices need elevated privileges
    #[error("permission denied opening {0} (raw sockets need root or CAP_NET_RAW)")]
    PermissionDenied(&'static str),

    /// Attaching a packet filter failed
    #[error("failed to attach packet filter: {0}")]
    FilterAttach(String),

    /// No interface could be opened for capture
    #[error("no capturable interface: {0}")]
    NoInterface(String),

    /// Every capture worker has exited
    #[error("capture closed")]
    Closed,

    /// Capture is not implemented on this platform
    #[error("packet capture is not supported on this platform")]
    Unsupported,
}

impl TransportError {
    /// Map an `io::Error` raised while opening `what`, surfacing EPERM/EACCES
    /// as [`TransportError::PermissionDenied`].
    #[must_use]
    pub fn opening(what: &'static str, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::PermissionDenied {
            Self::PermissionDenied(what)
        } else {
            Self::Io(err)
        }
    }
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;
