//! Line echo handler.
//!
//! Every line the peer sends comes back verbatim. Lines longer than the
//! line capacity are echoed in capacity-sized pieces, so arbitrary input
//! round-trips unchanged while memory per read stays bounded.

use super::Exchange;
use crate::runtime::{read_line, write_all, IoError};
use std::io::{Read, Write};
use tracing::trace;

/// Echo lines until the peer closes its side.
pub fn handle<S: Read + Write + ?Sized>(
    stream: &mut S,
    line_capacity: usize,
) -> Result<Exchange, IoError> {
    let mut line = vec![0u8; line_capacity];
    let mut exchange = Exchange::default();

    loop {
        let n = read_line(stream, &mut line)?;
        if n == 0 {
            trace!("peer closed");
            return Ok(exchange);
        }
        exchange.bytes_read += n;
        exchange.bytes_written += write_all(stream, &line[..n])?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::testing::{ScriptedStream, Step};
    use std::io;

    #[test]
    fn test_echo_ping() {
        let mut stream = ScriptedStream::with_input(b"ping\n");
        let exchange = handle(&mut stream, 256).unwrap();

        assert_eq!(stream.output, b"ping\n");
        assert_eq!(
            exchange,
            Exchange {
                bytes_read: 5,
                bytes_written: 5
            }
        );
    }

    #[test]
    fn test_echo_multiple_lines_and_trailing_fragment() {
        let mut stream = ScriptedStream::with_input(b"one\ntwo\nthree");
        handle(&mut stream, 256).unwrap();
        assert_eq!(stream.output, b"one\ntwo\nthree");
    }

    #[test]
    fn test_echo_long_line_in_pieces() {
        let input: Vec<u8> = std::iter::repeat(b'x').take(20).chain([b'\n']).collect();
        let mut stream = ScriptedStream::with_input(&input);
        stream.write_script.push_back(Step::Limit(2));

        let exchange = handle(&mut stream, 8).unwrap();
        assert_eq!(stream.output, input);
        assert_eq!(exchange.bytes_read, 21);
        // one byte per read, plus the end-of-stream read
        assert_eq!(stream.read_calls, 22);
    }

    #[test]
    fn test_echo_stops_on_write_failure() {
        let mut stream = ScriptedStream::with_input(b"a\nb\n");
        stream.write_script.push_back(Step::Fail(io::ErrorKind::ConnectionReset));

        let err = handle(&mut stream, 16).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert_eq!(stream.remaining_input(), 2);
    }

    #[test]
    fn test_echo_empty_stream() {
        let mut stream = ScriptedStream::default();
        assert_eq!(handle(&mut stream, 16).unwrap(), Exchange::default());
        assert!(stream.output.is_empty());
    }
}
