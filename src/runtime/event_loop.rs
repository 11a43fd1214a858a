//! Readiness-based event loop.
//!
//! Single-threaded cooperative model: one `Poll` is the sole suspension
//! point, and every per-connection step runs to completion before the
//! next event is processed, so the connection registry and interest sets
//! need no locking. Registry removal at teardown is synchronous — an
//! entry is gone before its descriptor could be handed out by a
//! subsequent accept.
//!
//! Idle-connection timeouts are not part of the base contract; the
//! extension point would be a bounded poll timeout checked against
//! per-connection last-activity stamps.

use crate::chain::{Dispatcher, ProtocolChain};
use crate::config::Config;
use crate::runtime::connection::Connection;
use crate::runtime::error::{ConnectionError, FatalError};
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use slab::Slab;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const LISTENER_TOKEN: Token = Token(usize::MAX);
const EVENTS_CAPACITY: usize = 1024;

/// The server: listener, poller, and connection registry.
pub struct Server {
    config: Config,
    poll: Poll,
    events: Events,
    listener: TcpListener,
    connections: Slab<Connection>,
    dispatcher: Arc<Dispatcher>,
    /// Monotonic connection id source; never reused.
    next_conn_id: u64,
}

impl Server {
    /// Bind the listener and set up the poller. The command table is
    /// frozen here; nothing registers handlers after this point.
    pub fn bind(config: Config, dispatcher: Dispatcher) -> Result<Self, FatalError> {
        let addr_str = format!("{}:{}", config.host, config.port);
        let addr: SocketAddr = addr_str.parse().map_err(|e| FatalError::Bind {
            addr: addr_str.clone(),
            source: io::Error::new(io::ErrorKind::InvalidInput, e),
        })?;

        let std_listener = create_listener(addr).map_err(|source| FatalError::Bind {
            addr: addr_str,
            source,
        })?;
        let mut listener = TcpListener::from_std(std_listener);

        let poll = Poll::new().map_err(FatalError::Poll)?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)
            .map_err(FatalError::Poll)?;

        Ok(Self {
            config,
            poll,
            events: Events::with_capacity(EVENTS_CAPACITY),
            listener,
            connections: Slab::new(),
            dispatcher: Arc::new(dispatcher),
            next_conn_id: 0,
        })
    }

    /// Actual bound address (useful when configured with port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the event loop until a fatal error.
    ///
    /// On fatal failure the remaining connections are closed best-effort
    /// and the error is returned, so `main` exits with a non-zero status.
    pub fn run(&mut self) -> Result<(), FatalError> {
        info!(
            addr = %self.local_addr().map(|a| a.to_string()).unwrap_or_default(),
            commands = ?self.dispatcher.command_names(),
            "server listening"
        );

        let result = self.serve();
        if let Err(ref e) = result {
            error!(error = %e, "fatal server error");
        }
        self.close_all();
        result
    }

    fn serve(&mut self) -> Result<(), FatalError> {
        loop {
            self.poll_once()?;
        }
    }

    /// One wait-and-dispatch step.
    fn poll_once(&mut self) -> Result<(), FatalError> {
        if let Err(e) = self.poll.poll(&mut self.events, None) {
            if e.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(FatalError::Poll(e));
        }

        let ready: Vec<(Token, bool, bool)> = self
            .events
            .iter()
            .map(|event| (event.token(), event.is_readable(), event.is_writable()))
            .collect();

        for (token, readable, writable) in ready {
            if token == LISTENER_TOKEN {
                self.accept_ready()?;
            } else {
                self.drive_connection(token.0, readable, writable);
            }
        }
        Ok(())
    }

    /// One listener readiness notification can mean several pending
    /// connections: accept until would-block. Any other accept error is
    /// fatal — the server cannot keep accepting.
    fn accept_ready(&mut self) -> Result<(), FatalError> {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    let id = self.next_conn_id;
                    self.next_conn_id += 1;

                    let chain =
                        ProtocolChain::from_config(&self.config, Arc::clone(&self.dispatcher));
                    let entry = self.connections.vacant_entry();
                    let key = entry.key();
                    let conn = entry.insert(Connection::new(id, stream, peer, chain));

                    if let Err(e) = self.poll.registry().register(
                        &mut conn.stream,
                        Token(key),
                        Interest::READABLE,
                    ) {
                        warn!(conn = id, peer = %peer, error = %e, "failed to register connection");
                        self.connections.remove(key);
                        continue;
                    }

                    debug!(conn = id, peer = %peer, "accepted connection");
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(FatalError::Accept(e)),
            }
        }
    }

    /// Deliver one readiness event to a connection. Connection-scoped
    /// failures are contained here: they tear down this connection and
    /// never reach the caller.
    fn drive_connection(&mut self, key: usize, readable: bool, writable: bool) {
        // The entry may have been torn down earlier in this batch.
        if !self.connections.contains(key) {
            return;
        }

        match self.io_step(key, readable, writable) {
            Ok(true) => {}
            Ok(false) => self.teardown(key, "peer closed"),
            Err(e) => {
                debug!(error = %e, "connection error");
                self.teardown(key, "io error");
            }
        }
    }

    /// Returns `Ok(false)` when the connection finished cleanly (peer
    /// half-closed and the write buffer drained) and should be torn down.
    fn io_step(
        &mut self,
        key: usize,
        readable: bool,
        writable: bool,
    ) -> Result<bool, ConnectionError> {
        let conn = match self.connections.get_mut(key) {
            Some(conn) => conn,
            None => return Ok(true),
        };

        if readable && !conn.peer_closed() {
            conn.on_readable()?;
        }
        if writable {
            conn.on_writable()?;
        }

        if conn.is_finished() {
            return Ok(false);
        }

        let want = conn.desired_interest();
        if want != conn.interest {
            self.poll
                .registry()
                .reregister(&mut conn.stream, Token(key), want)
                .map_err(ConnectionError::Register)?;
            conn.interest = want;
        }
        Ok(true)
    }

    /// Remove, deregister, and close one connection. Idempotent: a second
    /// call for the same key is a no-op.
    fn teardown(&mut self, key: usize, reason: &str) {
        if let Some(mut conn) = self.connections.try_remove(key) {
            let _ = self.poll.registry().deregister(&mut conn.stream);
            debug!(conn = conn.id(), peer = %conn.peer(), reason, "connection closed");
        }
    }

    fn close_all(&mut self) {
        let keys: Vec<usize> = self.connections.iter().map(|(key, _)| key).collect();
        for key in keys {
            self.teardown(key, "server shutdown");
        }
    }
}

/// Create a non-blocking TCP listener with SO_REUSEADDR.
fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;

    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands;
    use crate::config::TextEncoding;
    use std::io::{Read, Write};
    use std::net::{Shutdown, TcpStream as StdStream};
    use std::thread;
    use std::time::Duration;

    fn spawn_server(config: Config) -> SocketAddr {
        let mut server = Server::bind(config, commands::builtin()).unwrap();
        let addr = server.local_addr().unwrap();
        thread::spawn(move || {
            let _ = server.run();
        });
        addr
    }

    fn test_config() -> Config {
        Config {
            port: 0,
            ..Config::default()
        }
    }

    fn connect(addr: SocketAddr) -> StdStream {
        let stream = StdStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream
    }

    fn read_exactly(stream: &mut StdStream, n: usize) -> Vec<u8> {
        let mut buf = vec![0u8; n];
        stream.read_exact(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_ping_pong() {
        let addr = spawn_server(test_config());
        let mut client = connect(addr);
        client.write_all(b"PING\n").unwrap();
        assert_eq!(read_exactly(&mut client, 5), b"PONG\n");
    }

    #[test]
    fn test_split_receive_same_result() {
        let addr = spawn_server(test_config());
        let mut client = connect(addr);
        client.write_all(b"PI").unwrap();
        client.flush().unwrap();
        client.write_all(b"NG\n").unwrap();
        assert_eq!(read_exactly(&mut client, 5), b"PONG\n");
    }

    #[test]
    fn test_echo_arguments() {
        let addr = spawn_server(test_config());
        let mut client = connect(addr);
        client.write_all(b"ECHO hello world\n").unwrap();
        assert_eq!(read_exactly(&mut client, 12), b"hello world\n");
    }

    #[test]
    fn test_unknown_command_keeps_connection_open() {
        let addr = spawn_server(test_config());
        let mut client = connect(addr);
        client.write_all(b"FOO\n").unwrap();
        assert_eq!(
            read_exactly(&mut client, 27),
            b"ERROR unknown command: FOO\n"
        );

        // Same connection still serves.
        client.write_all(b"PING\n").unwrap();
        assert_eq!(read_exactly(&mut client, 5), b"PONG\n");
    }

    #[test]
    fn test_partial_record_then_shutdown() {
        let addr = spawn_server(test_config());
        let mut client = connect(addr);
        client.write_all(b"PING").unwrap();
        client.shutdown(Shutdown::Write).unwrap();

        // No delimiter was sent: no dispatch, clean close, no data back.
        let mut buf = [0u8; 16];
        assert_eq!(client.read(&mut buf).unwrap(), 0);

        // The server survived the teardown.
        let mut other = connect(addr);
        other.write_all(b"PING\n").unwrap();
        assert_eq!(read_exactly(&mut other, 5), b"PONG\n");
    }

    #[test]
    fn test_pipelined_records_in_order() {
        let addr = spawn_server(test_config());
        let mut client = connect(addr);
        client.write_all(b"PING\nECHO x\nPING\n").unwrap();
        assert_eq!(read_exactly(&mut client, 12), b"PONG\nx\nPONG\n");
    }

    #[test]
    fn test_two_connections_never_swap() {
        let addr = spawn_server(test_config());
        let mut a = connect(addr);
        let mut b = connect(addr);

        a.write_all(b"ECHO a\n").unwrap();
        b.write_all(b"ECHO b\n").unwrap();
        assert_eq!(read_exactly(&mut a, 2), b"a\n");
        assert_eq!(read_exactly(&mut b, 2), b"b\n");

        // Opposite send order on the same connections.
        b.write_all(b"ECHO bb\n").unwrap();
        a.write_all(b"ECHO aa\n").unwrap();
        assert_eq!(read_exactly(&mut a, 3), b"aa\n");
        assert_eq!(read_exactly(&mut b, 3), b"bb\n");
    }

    #[test]
    fn test_abrupt_close_leaves_others_running() {
        let addr = spawn_server(test_config());
        let mut survivor = connect(addr);
        let dying = connect(addr);
        drop(dying);

        survivor.write_all(b"PING\n").unwrap();
        assert_eq!(read_exactly(&mut survivor, 5), b"PONG\n");
    }

    #[test]
    fn test_utf8_reject_policy_end_to_end() {
        let config = Config {
            encoding: TextEncoding::Utf8,
            ..test_config()
        };
        let addr = spawn_server(config);
        let mut client = connect(addr);

        client.write_all(&[0xFF, 0xFE, b'\n']).unwrap();
        assert_eq!(
            read_exactly(&mut client, 36),
            b"ERROR cannot decode record as utf-8\n"
        );

        // The record was rejected, not the connection.
        client.write_all(b"PING\n").unwrap();
        assert_eq!(read_exactly(&mut client, 5), b"PONG\n");
    }

    #[test]
    fn test_crlf_delimiter_server() {
        let config = Config {
            delimiter: "\r\n".to_string(),
            ..test_config()
        };
        let addr = spawn_server(config);
        let mut client = connect(addr);
        client.write_all(b"PING\r\nECHO hi\r\n").unwrap();
        assert_eq!(read_exactly(&mut client, 10), b"PONG\r\nhi\r\n");
    }

    #[test]
    fn test_bind_failure_is_fatal() {
        let err = Server::bind(
            Config {
                host: "definitely-not-an-address".to_string(),
                ..test_config()
            },
            commands::builtin(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, FatalError::Bind { .. }));
    }
}
