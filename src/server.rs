//! TCP server: one thread per accepted connection.
//!
//! The accept loop owns the listening socket. Each accepted stream moves
//! into a [`ConnectionContext`] and from there into a freshly spawned thread
//! that runs the configured handler and closes the stream. The loop keeps
//! no handle to that thread and goes straight back to `accept`.

use crate::config::{Config, ProtocolType};
use crate::protocols;
use crate::runtime::{accept_connection, close_stream, IoError};
use std::fmt;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;
use tracing::{debug, error, info, warn};

/// Everything a connection thread needs, moved in at spawn time.
#[derive(Debug)]
pub struct ConnectionContext {
    pub id: u64,
    pub peer: SocketAddr,
    pub stream: TcpStream,
    pub protocol: ProtocolType,
    pub line_capacity: usize,
}

/// Server instance
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    protocol: ProtocolType,
    line_capacity: usize,
}

impl Server {
    /// Create, bind `listen` and start listening. Failures here are fatal
    /// at startup.
    pub fn bind(listen: SocketAddr, config: &Config) -> Result<Self, ServerError> {
        let listener = create_listener(listen, config.backlog)?;
        let local_addr = listener.local_addr().map_err(ServerError::Listen)?;

        info!(address = %local_addr, backlog = config.backlog, "Server listening");

        Ok(Server {
            listener,
            local_addr,
            protocol: config.protocol,
            line_capacity: config.line_capacity,
        })
    }

    /// Address actually bound (resolves port 0).
    #[cfg(test)]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections forever, handing each to its own thread.
    ///
    /// Only returns if `accept` fails with a non-transient error.
    pub fn run(self) -> Result<(), ServerError> {
        let mut next_id: u64 = 0;

        loop {
            let (stream, peer) = accept_connection(&self.listener).map_err(|e| {
                error!(address = %self.local_addr, error = %e, "Accept failed");
                ServerError::Accept(e)
            })?;

            next_id += 1;
            debug!(conn_id = next_id, peer = %peer, "New connection");

            self.dispatch(ConnectionContext {
                id: next_id,
                peer,
                stream,
                protocol: self.protocol,
                line_capacity: self.line_capacity,
            });
        }
    }

    /// Launch the connection thread and forget it.
    fn dispatch(&self, ctx: ConnectionContext) {
        let id = ctx.id;
        // The closure owns `ctx`; if the spawn fails the closure is dropped
        // and the stream is closed with it.
        let spawned = thread::Builder::new()
            .name(format!("conn-{id}"))
            .spawn(move || serve_connection(ctx));

        if let Err(e) = spawned {
            warn!(conn_id = id, error = %e, "Failed to spawn connection thread, dropping connection");
        }
    }
}

/// Body of a connection thread: run the handler, then close the stream.
///
/// Errors end this connection only. On the error path the stream is closed
/// by drop.
pub fn serve_connection(ctx: ConnectionContext) {
    let ConnectionContext {
        id,
        peer,
        mut stream,
        protocol,
        line_capacity,
    } = ctx;

    let result = match protocols::handle(protocol, &mut stream, line_capacity) {
        Ok(exchange) => close_stream(stream).map(|()| exchange),
        Err(e) => Err(e),
    };

    match result {
        Ok(exchange) => debug!(
            conn_id = id,
            peer = %peer,
            bytes_read = exchange.bytes_read,
            bytes_written = exchange.bytes_written,
            "Connection closed"
        ),
        Err(e) if is_peer_reset(e.kind()) => {
            debug!(conn_id = id, peer = %peer, op = ?e.op(), "Connection reset by peer")
        }
        Err(e) => warn!(conn_id = id, peer = %peer, error = %e, "Connection failed"),
    }
}

fn is_peer_reset(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe
    )
}

/// Create an IPv4/IPv6 TCP listener bound to `addr`.
fn create_listener(addr: SocketAddr, backlog: i32) -> Result<TcpListener, ServerError> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )
    .map_err(ServerError::Socket)?;

    socket.set_reuse_address(true).map_err(ServerError::Socket)?;
    socket
        .bind(&addr.into())
        .map_err(|e| ServerError::Bind(addr, e))?;
    socket.listen(backlog).map_err(ServerError::Listen)?;

    Ok(socket.into())
}

/// Server errors
#[derive(Debug)]
pub enum ServerError {
    Socket(io::Error),
    Bind(SocketAddr, io::Error),
    Listen(io::Error),
    Accept(IoError),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Socket(e) => write!(f, "socket(): {}", e),
            ServerError::Bind(addr, e) => write!(f, "bind() to {}: {}", addr, e),
            ServerError::Listen(e) => write!(f, "listen(): {}", e),
            ServerError::Accept(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ServerError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mode;
    use crate::runtime::{read_line, read_n, write_all};
    use std::io::Read;
    use std::net::Shutdown;

    fn test_config(protocol: ProtocolType) -> Config {
        Config {
            mode: Mode::Serve {
                listen: loopback(),
            },
            backlog: 16,
            protocol,
            line_capacity: 256,
            chunk_size: 256,
            log_level: "info".to_string(),
        }
    }

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    fn start(protocol: ProtocolType) -> SocketAddr {
        let server = Server::bind(loopback(), &test_config(protocol)).unwrap();
        let addr = server.local_addr();
        thread::spawn(move || server.run());
        addr
    }

    #[test]
    fn test_echo_ping() {
        let addr = start(ProtocolType::Echo);
        let mut stream = TcpStream::connect(addr).unwrap();

        write_all(&mut stream, b"ping\n").unwrap();
        let mut buf = [0u8; 64];
        let n = read_line(&mut stream, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"ping\n");
    }

    #[test]
    fn test_handler_closes_stream_at_eof() {
        let addr = start(ProtocolType::Echo);
        let mut stream = TcpStream::connect(addr).unwrap();

        write_all(&mut stream, b"last line").unwrap();
        stream.shutdown(Shutdown::Write).unwrap();

        let mut received = Vec::new();
        stream.read_to_end(&mut received).unwrap();
        assert_eq!(received, b"last line");
    }

    #[test]
    fn test_greeting_then_close() {
        let addr = start(ProtocolType::Greeting);
        let mut stream = TcpStream::connect(addr).unwrap();

        let mut received = Vec::new();
        stream.read_to_end(&mut received).unwrap();
        assert_eq!(received.last(), Some(&b'\n'));
        assert!(received.len() <= protocols::greeting::MAX_GREETING_LEN + 1);
    }

    #[test]
    fn test_concurrent_clients_no_cross_talk() {
        let addr = start(ProtocolType::Echo);

        let clients: Vec<_> = (0..16)
            .map(|i| {
                thread::spawn(move || {
                    let mut stream = TcpStream::connect(addr).unwrap();
                    let mut buf = [0u8; 64];
                    for round in 0..20 {
                        let line = format!("client {i} round {round}\n");
                        write_all(&mut stream, line.as_bytes()).unwrap();
                        let n = read_line(&mut stream, &mut buf).unwrap();
                        assert_eq!(&buf[..n], line.as_bytes());
                    }
                })
            })
            .collect();

        for client in clients {
            client.join().unwrap();
        }
    }

    #[test]
    fn test_slow_connection_does_not_block_accept() {
        let addr = start(ProtocolType::Echo);

        // Holds its handler thread open without sending anything.
        let _idle = TcpStream::connect(addr).unwrap();

        let mut stream = TcpStream::connect(addr).unwrap();
        write_all(&mut stream, b"still served\n").unwrap();
        let mut buf = [0u8; 64];
        let n = read_line(&mut stream, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"still served\n");
    }

    #[test]
    fn test_failed_handlers_do_not_stop_listener() {
        let addr = start(ProtocolType::Echo);

        for _ in 0..8 {
            let stream = TcpStream::connect(addr).unwrap();
            // Reset instead of FIN: the handler's next I/O fails.
            socket2::SockRef::from(&stream)
                .set_linger(Some(std::time::Duration::ZERO))
                .unwrap();
            write_all(&mut &stream, b"abandoned\n").unwrap();
            drop(stream);
        }

        let mut stream = TcpStream::connect(addr).unwrap();
        write_all(&mut stream, b"ping\n").unwrap();
        let mut buf = [0u8; 8];
        let n = read_line(&mut stream, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"ping\n");

        stream.shutdown(Shutdown::Write).unwrap();
        assert_eq!(read_n(&mut stream, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_bind_conflict_is_fatal() {
        let config = test_config(ProtocolType::Echo);
        let server = Server::bind(loopback(), &config).unwrap();
        assert_ne!(server.local_addr().port(), 0);

        let err = Server::bind(server.local_addr(), &config).err().unwrap();
        assert!(matches!(err, ServerError::Bind(addr, _) if addr == server.local_addr()));
    }

    #[test]
    fn test_serve_connection_closes_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (stream, peer) = listener.accept().unwrap();

        // Echo with a one-byte capacity reads nothing and finishes at once.
        serve_connection(ConnectionContext {
            id: 1,
            peer,
            stream,
            protocol: ProtocolType::Echo,
            line_capacity: 1,
        });

        let mut buf = [0u8; 1];
        assert_eq!(read_n(&mut client, &mut buf).unwrap(), 0);
    }
}
