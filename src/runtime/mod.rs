//! Blocking I/O runtime shared by the server and the client.
//!
//! Two layers:
//! - `reliable`: one syscall per call, transient failures retried in place
//! - `framed`: `write_all` and `read_line` built on the reliable layer
//!
//! Every primitive either returns a meaningful value or an [`IoError`]
//! naming the operation that failed. Callers propagate the error with `?`
//! and the owning context (a connection thread, or the process at startup)
//! ends there.

mod framed;
mod reliable;

pub use framed::{read_line, write_all};
pub use reliable::{accept_connection, close_stream, read_n, wait_readable};

use std::fmt;
use std::io;

/// The OS operation an [`IoError`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Read,
    Write,
    Close,
    Accept,
    Poll,
    WriteAll,
}

impl Op {
    fn name(self) -> &'static str {
        match self {
            Op::Read => "read()",
            Op::Write => "write()",
            Op::Close => "close()",
            Op::Accept => "accept()",
            Op::Poll => "poll()",
            Op::WriteAll => "write_all()",
        }
    }
}

/// Unrecoverable I/O failure.
///
/// Transient conditions never reach this type; they are retried by the
/// primitive that saw them.
#[derive(Debug)]
pub struct IoError {
    op: Op,
    source: io::Error,
}

impl IoError {
    pub(crate) fn new(op: Op, source: io::Error) -> Self {
        Self { op, source }
    }

    /// Operation that failed.
    pub fn op(&self) -> Op {
        self.op
    }

    /// Kind of the underlying OS error.
    pub fn kind(&self) -> io::ErrorKind {
        self.source.kind()
    }
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.op.name(), self.source)
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_operation() {
        let err = IoError::new(
            Op::Read,
            io::Error::new(io::ErrorKind::ConnectionReset, "reset"),
        );
        assert_eq!(err.to_string(), "read(): reset");
        assert_eq!(err.op(), Op::Read);
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }
}
