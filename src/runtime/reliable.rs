//! Reliable wrappers around single blocking syscalls.
//!
//! `EINTR` is retried transparently. `accept` additionally retries
//! `ECONNABORTED`: a peer that gave up while queued only frees a backlog
//! slot. Everything else becomes an [`IoError`].

use super::{IoError, Op};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::os::unix::io::RawFd;

/// Read at most `buf.len()` bytes. `Ok(0)` means the peer closed the stream
/// (or `buf` is empty).
pub fn read_n<R: Read + ?Sized>(stream: &mut R, buf: &mut [u8]) -> Result<usize, IoError> {
    loop {
        match stream.read(buf) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(IoError::new(Op::Read, e)),
        }
    }
}

/// Write at most `buf.len()` bytes, returning how many the OS accepted.
pub fn write_n<W: Write + ?Sized>(stream: &mut W, buf: &[u8]) -> Result<usize, IoError> {
    loop {
        match stream.write(buf) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(IoError::new(Op::Write, e)),
        }
    }
}

/// Close a connected stream.
///
/// Takes the stream by value so it cannot be used or closed again. Both
/// directions are shut down before the descriptor is released; a peer that
/// already tore the connection down is not an error.
pub fn close_stream(stream: TcpStream) -> Result<(), IoError> {
    retry_shutdown(|| stream.shutdown(Shutdown::Both))?;
    drop(stream);
    Ok(())
}

fn retry_shutdown<F>(mut shutdown: F) -> Result<(), IoError>
where
    F: FnMut() -> io::Result<()>,
{
    loop {
        match shutdown() {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == io::ErrorKind::NotConnected => return Ok(()),
            Err(e) => return Err(IoError::new(Op::Close, e)),
        }
    }
}

/// Accept the next pending connection.
pub fn accept_connection(listener: &TcpListener) -> Result<(TcpStream, SocketAddr), IoError> {
    retry_accept(|| listener.accept())
}

fn retry_accept<S, F>(mut accept: F) -> Result<(S, SocketAddr), IoError>
where
    F: FnMut() -> io::Result<(S, SocketAddr)>,
{
    loop {
        match accept() {
            Ok(accepted) => return Ok(accepted),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::Interrupted | io::ErrorKind::ConnectionAborted
                ) =>
            {
                continue
            }
            Err(e) => return Err(IoError::new(Op::Accept, e)),
        }
    }
}

/// Result of [`wait_readable`]: which of the watched descriptors can be read
/// without blocking.
#[derive(Debug)]
pub struct Readiness {
    fds: Vec<libc::pollfd>,
}

impl Readiness {
    /// Whether the descriptor at `index` (in the order passed to
    /// [`wait_readable`]) is ready. Hang-up, error and invalid-descriptor
    /// conditions count as ready: the next read reports them.
    pub fn is_ready(&self, index: usize) -> bool {
        const READY: libc::c_short =
            libc::POLLIN | libc::POLLHUP | libc::POLLERR | libc::POLLNVAL;
        self.fds
            .get(index)
            .map(|fd| fd.revents & READY != 0)
            .unwrap_or(false)
    }
}

/// Block until at least one of `fds` is readable. No timeout.
pub fn wait_readable(fds: &[RawFd]) -> Result<Readiness, IoError> {
    retry_poll(fds, |pollfds| {
        // SAFETY: `pollfds` is a valid, exclusively borrowed array of
        // `pollfds.len()` entries for the duration of the call.
        let rc = unsafe {
            libc::poll(
                pollfds.as_mut_ptr(),
                pollfds.len() as libc::nfds_t,
                -1,
            )
        };
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    })
}

fn retry_poll<F>(fds: &[RawFd], mut poll: F) -> Result<Readiness, IoError>
where
    F: FnMut(&mut [libc::pollfd]) -> io::Result<()>,
{
    let mut pollfds: Vec<libc::pollfd> = fds
        .iter()
        .map(|&fd| libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        })
        .collect();

    loop {
        match poll(&mut pollfds) {
            Ok(()) => return Ok(Readiness { fds: pollfds }),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(IoError::new(Op::Poll, e)),
        }
    }
}
