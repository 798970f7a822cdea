use std::{
    fmt,
    io,
};

/// Result type used throughout this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Error returned by every fallible operation of this crate
///
/// Carries an [`ErrorKind`] to branch on, the name of the operation that
/// failed and, if the kernel reported one, the raw `errno`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{op}: {kind}{}", OsCode(.errno))]
pub struct Error {
    kind: ErrorKind,
    op: &'static str,
    errno: Option<i32>,
}

/// The kind of an [`Error`]
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Bad flags, mask, path or descriptor
    #[error("invalid argument")]
    InvalidArgument,

    /// A per-process or system-wide limit on descriptors, watches or marks
    #[error("resource limit reached")]
    ResourceExhausted,

    /// The caller lacks a required capability
    #[error("permission denied")]
    PermissionDenied,

    /// The kernel could not allocate memory
    #[error("insufficient kernel memory")]
    OutOfMemory,

    /// A path or descriptor does not exist
    #[error("not found")]
    NotFound,

    /// The facility is not available on this kernel
    #[error("unsupported")]
    Unsupported,

    /// Operation on a source that was already closed
    #[error("I/O operation on closed file descriptor")]
    Closed,

    /// The kernel handed back a record that could not be decoded
    #[error("malformed kernel record")]
    Protocol,

    /// The call was interrupted by a signal
    #[error("interrupted")]
    Interrupted,

    /// An event-loop bridge received more events than it may buffer
    #[error("event queue overflow")]
    Overflow,

    /// The event loop was asked to wait, but nothing could ever wake it
    #[error("event loop has nothing to wait for")]
    Stalled,

    /// The OS reported an error code this crate does not know about
    #[error("unexpected OS error")]
    Unexpected,
}

struct OsCode<'a>(&'a Option<i32>);

impl fmt::Display for OsCode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self.0 {
            Some(errno) => write!(f, " (os error {})", errno),
            None        => Ok(()),
        }
    }
}

impl Error {
    pub(crate) fn new(kind: ErrorKind, op: &'static str) -> Self {
        Error {
            kind,
            op,
            errno: None,
        }
    }

    pub(crate) fn from_errno(kind: ErrorKind, op: &'static str, errno: i32)
        -> Self
    {
        Error {
            kind,
            op,
            errno: Some(errno),
        }
    }

    pub(crate) fn closed(op: &'static str) -> Self {
        Error::new(ErrorKind::Closed, op)
    }

    pub(crate) fn protocol(op: &'static str) -> Self {
        Error::new(ErrorKind::Protocol, op)
    }

    /// What went wrong
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Name of the syscall or operation that failed
    pub fn op(&self) -> &'static str {
        self.op
    }

    /// The raw `errno`, if the error came from the kernel
    pub fn raw_os_error(&self) -> Option<i32> {
        self.errno
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        if let Some(errno) = err.errno {
            return io::Error::from_raw_os_error(errno);
        }

        let kind = match err.kind {
            ErrorKind::InvalidArgument   => io::ErrorKind::InvalidInput,
            ErrorKind::PermissionDenied  => io::ErrorKind::PermissionDenied,
            ErrorKind::NotFound          => io::ErrorKind::NotFound,
            ErrorKind::Protocol          => io::ErrorKind::InvalidData,
            ErrorKind::Interrupted       => io::ErrorKind::Interrupted,
            ErrorKind::OutOfMemory       => io::ErrorKind::OutOfMemory,
            ErrorKind::Unsupported       => io::ErrorKind::Unsupported,
            _                            => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}
