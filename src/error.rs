//! Error types for capture sessions

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::io::Mode;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Capture error types
///
/// Connect-time errors leave the session disconnected. Per-cycle errors (everything returned by
/// [`crate::Session::poll`]) leave it connected; [`Error::is_recoverable`] tells whether simply
/// polling again is expected to succeed.
#[derive(Debug, Error)]
pub enum Error {
    /// The path does not exist or is not a character device
    #[error("cannot identify {path:?}: {source}")]
    DeviceNotFound { path: PathBuf, source: io::Error },

    #[error("cannot open {path:?}: {source}")]
    OpenFailed { path: PathBuf, source: io::Error },

    #[error("{path:?} is not a video capture device")]
    NotACaptureDevice {
        path: PathBuf,
        #[source]
        source: Option<io::Error>,
    },

    /// The device lacks the capability the transport mode depends on
    #[error("{path:?} does not support {mode} i/o")]
    UnsupportedTransport { path: PathBuf, mode: Mode },

    #[error("format negotiation failed ({op}): {source}")]
    FormatNegotiationFailed { op: &'static str, source: io::Error },

    #[error("insufficient buffer memory: {granted} buffers, need at least {required}")]
    InsufficientBuffers { granted: u32, required: u32 },

    #[error("buffer initialization failed ({op}): {source}")]
    BufferInitFailed { op: &'static str, source: io::Error },

    #[error("cannot start streaming ({op}): {source}")]
    StreamOnFailed { op: &'static str, source: io::Error },

    /// Waiting for the device to become readable failed
    #[error("unable to select video device: {0}")]
    PollError(#[source] io::Error),

    /// No frame arrived within the timeout
    #[error("select timeout after {0:?}")]
    PollTimeout(Duration),

    /// The driver had no frame ready (`EAGAIN`)
    #[error("no frame ready ({op})")]
    AcquireRecoverable { op: &'static str },

    #[error("frame acquisition failed ({op}): {source}")]
    AcquireFatal { op: &'static str, source: io::Error },

    #[error("cannot close device: {0}")]
    CloseFailed(#[source] io::Error),

    #[error("device is not connected")]
    NotConnected,

    #[error("device is already connected")]
    AlreadyConnected,

    /// A configuration value could not be interpreted
    #[error("invalid {key}: {reason}")]
    Config { key: &'static str, reason: String },
}

impl Error {
    /// Whether the next update cycle may succeed without any intervention
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::PollTimeout(_) | Error::AcquireRecoverable { .. }
        )
    }

    /// Classifies a failed acquisition step: `EAGAIN` is recoverable, anything else is not
    pub(crate) fn acquire(op: &'static str, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::WouldBlock {
            Error::AcquireRecoverable { op }
        } else {
            Error::AcquireFatal { op, source }
        }
    }

    pub(crate) fn buffer_init(op: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| Error::BufferInitFailed { op, source }
    }

    pub(crate) fn stream_on(op: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| Error::StreamOnFailed { op, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eagain_is_recoverable() {
        let err = Error::acquire("VIDIOC_DQBUF", io::Error::from_raw_os_error(libc::EAGAIN));
        assert!(matches!(err, Error::AcquireRecoverable { op: "VIDIOC_DQBUF" }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn eio_is_fatal() {
        let err = Error::acquire("read", io::Error::from_raw_os_error(libc::EIO));
        assert!(matches!(err, Error::AcquireFatal { .. }));
        assert!(!err.is_recoverable());
        assert!(Error::PollTimeout(Duration::from_secs(2)).is_recoverable());
    }
}
