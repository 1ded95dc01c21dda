//! Whole-buffer writes and bounded line reads.

use super::reliable::{read_n, write_n};
use super::{IoError, Op};
use std::io::{self, Read, Write};

/// Write every byte of `buf`, in order, looping over short writes.
///
/// Returns `buf.len()`. An empty buffer is a no-op.
pub fn write_all<W: Write + ?Sized>(stream: &mut W, buf: &[u8]) -> Result<usize, IoError> {
    let mut remaining = buf;
    while !remaining.is_empty() {
        let n = write_n(stream, remaining)?;
        if n == 0 {
            return Err(IoError::new(
                Op::WriteAll,
                io::Error::new(io::ErrorKind::WriteZero, "stream accepted no bytes"),
            ));
        }
        remaining = &remaining[n..];
    }
    Ok(buf.len())
}

/// Read one line into `buf`, one byte at a time.
///
/// Stops after a `\n` (which is kept), at end of stream, or once
/// `buf.len() - 1` bytes are stored, whichever comes first. The byte after
/// the data is set to `0`, so at most `buf.len() - 1` bytes are ever
/// consumed from the stream. Returns the number of data bytes.
///
/// An empty `buf` reads nothing and returns 0.
pub fn read_line<R: Read + ?Sized>(stream: &mut R, buf: &mut [u8]) -> Result<usize, IoError> {
    let Some(limit) = buf.len().checked_sub(1) else {
        return Ok(0);
    };

    let mut n = 0;
    while n < limit {
        if read_n(stream, &mut buf[n..n + 1])? == 0 {
            break;
        }
        n += 1;
        if buf[n - 1] == b'\n' {
            break;
        }
    }
    buf[n] = 0;

    Ok(n)
}
