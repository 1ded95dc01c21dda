//! Relay client.
//!
//! Connects once, then shuttles bytes between the local terminal and the
//! connection. Each loop iteration makes a single readiness wait over both
//! sources and serves every source that is ready, so neither side can
//! starve the other.

use crate::runtime::{close_stream, read_n, wait_readable, write_all, IoError, Op};
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::net::{SocketAddrV4, TcpStream};
use std::os::unix::io::{AsFd, AsRawFd};
use tracing::{debug, info};

const LOCAL: usize = 0;
const REMOTE: usize = 1;

/// Which side ended the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    LocalClosed,
    RemoteClosed,
}

/// Outcome of [`relay`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelaySummary {
    pub end: RelayEnd,
    pub bytes_sent: usize,
    pub bytes_received: usize,
}

/// Connect to `peer` and relay stdin/stdout until either side closes.
pub fn run(peer: SocketAddrV4, chunk_size: usize) -> Result<RelaySummary, ClientError> {
    let mut stream = TcpStream::connect(peer).map_err(|e| ClientError::Connect(peer, e))?;
    info!(peer = %peer, "Connected");

    // Unbuffered handles: std's stdin buffering would hide bytes from poll.
    let mut local_in = File::from(
        io::stdin()
            .as_fd()
            .try_clone_to_owned()
            .map_err(ClientError::Stdio)?,
    );
    let mut local_out = File::from(
        io::stdout()
            .as_fd()
            .try_clone_to_owned()
            .map_err(ClientError::Stdio)?,
    );

    let summary = relay(&mut local_in, &mut local_out, &mut stream, chunk_size)
        .map_err(ClientError::Relay)?;
    close_stream(stream).map_err(ClientError::Relay)?;

    info!(
        end = ?summary.end,
        bytes_sent = summary.bytes_sent,
        bytes_received = summary.bytes_received,
        "Disconnected"
    );
    Ok(summary)
}

/// Forward `local_in → remote` and `remote → local_out` in chunks of at
/// most `chunk_size` bytes until one source reaches end of stream.
pub fn relay<L, O, R>(
    local_in: &mut L,
    local_out: &mut O,
    remote: &mut R,
    chunk_size: usize,
) -> Result<RelaySummary, IoError>
where
    L: Read + AsRawFd + ?Sized,
    O: Write + ?Sized,
    R: Read + Write + AsRawFd + ?Sized,
{
    let fds = [local_in.as_raw_fd(), remote.as_raw_fd()];
    let mut chunk = vec![0u8; chunk_size];
    let mut bytes_sent = 0;
    let mut bytes_received = 0;

    let end = loop {
        let ready = wait_readable(&fds)?;

        if ready.is_ready(LOCAL) {
            let n = read_n(local_in, &mut chunk)?;
            if n == 0 {
                break RelayEnd::LocalClosed;
            }
            bytes_sent += write_all(remote, &chunk[..n])?;
        }

        if ready.is_ready(REMOTE) {
            let n = read_n(remote, &mut chunk)?;
            if n == 0 {
                break RelayEnd::RemoteClosed;
            }
            bytes_received += write_all(local_out, &chunk[..n])?;
            local_out.flush().map_err(|e| IoError::new(Op::Write, e))?;
        }
    };

    debug!(end = ?end, bytes_sent, bytes_received, "Relay finished");
    Ok(RelaySummary {
        end,
        bytes_sent,
        bytes_received,
    })
}

/// Client errors
#[derive(Debug)]
pub enum ClientError {
    Connect(SocketAddrV4, io::Error),
    Stdio(io::Error),
    Relay(IoError),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Connect(peer, e) => write!(f, "connect() to {}: {}", peer, e),
            ClientError::Stdio(e) => write!(f, "stdio: {}", e),
            ClientError::Relay(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ClientError {}
