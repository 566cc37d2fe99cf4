//! Uniform result of one send or recv, independent of transport.

use std::fmt;
use std::io;

/// Legacy result code for a clean or expected closure.
pub const CODE_CLOSED: i64 = -1;

/// Legacy result code for any other I/O failure.
pub const CODE_FAULT: i64 = -2;

/// Which half of the stream an outcome came from. End of stream only counts
/// as a clean close on the receive side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Recv,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Send => write!(f, "send"),
            Direction::Recv => write!(f, "recv"),
        }
    }
}

/// Outcome of a single send or recv.
///
/// # Examples
///
/// ```
/// use rperf3_transport::IoOutcome;
///
/// assert_eq!(IoOutcome::Transferred(1024).code(), 1024);
/// assert_eq!(IoOutcome::GracefulClose.code(), -1);
/// assert!(IoOutcome::GracefulClose.is_terminal());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoOutcome {
    /// Exactly this many bytes moved.
    Transferred(usize),
    /// The peer or the session closed; the stream should wind down quietly.
    GracefulClose,
    /// Unexpected failure; fatal for this stream only.
    TransportFault { kind: io::ErrorKind, message: String },
}

impl IoOutcome {
    /// Maps to the legacy integer space: `n`, `-1` or `-2`.
    pub fn code(&self) -> i64 {
        match self {
            IoOutcome::Transferred(n) => *n as i64,
            IoOutcome::GracefulClose => CODE_CLOSED,
            IoOutcome::TransportFault { .. } => CODE_FAULT,
        }
    }

    /// Whether the stream loop should stop after this outcome.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, IoOutcome::Transferred(_))
    }

    /// Bytes moved, zero for terminal outcomes.
    pub fn bytes(&self) -> usize {
        match self {
            IoOutcome::Transferred(n) => *n,
            _ => 0,
        }
    }
}

/// Whether `err` means the session is closed rather than broken.
pub fn is_closed_error(err: &io::Error, direction: Direction) -> bool {
    match err.kind() {
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::WriteZero => return true,
        io::ErrorKind::UnexpectedEof => return direction == Direction::Recv,
        _ => {}
    }
    if err.raw_os_error() == Some(libc::EBADF) {
        return true;
    }
    // engines without a dedicated kind report a bare message
    err.to_string() == "broken pipe"
}

/// Classifies a failed send or recv.
pub fn classify_error(err: io::Error, direction: Direction) -> IoOutcome {
    if is_closed_error(&err, direction) {
        IoOutcome::GracefulClose
    } else {
        IoOutcome::TransportFault {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
