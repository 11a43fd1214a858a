//! Per-connection state and non-blocking I/O.
//!
//! A connection owns its protocol chain (including the framer's
//! partial-record carry) and its outbound buffer, so arbitrary
//! interleaving of partial reads and writes across unrelated sockets
//! cannot cross-contaminate. All methods run on the event-loop thread.

use crate::chain::ProtocolChain;
use crate::runtime::error::ConnectionError;
use bytes::{Buf, BytesMut};
use mio::net::TcpStream;
use mio::Interest;
use std::io::{self, Read, Write};
use std::net::SocketAddr;

/// Read chunk size per recv call.
const READ_CHUNK: usize = 4096;

/// A single client connection.
pub struct Connection {
    pub stream: TcpStream,
    /// Monotonic identity, stable across slab key reuse. Used in logs.
    id: u64,
    /// Peer address, informational, fixed at accept time.
    peer: SocketAddr,
    /// Protocol chain instance, owned exclusively by this connection.
    chain: ProtocolChain,
    /// Outbound bytes awaiting send, consumed from the head.
    write_buf: BytesMut,
    /// Peer signaled end-of-stream; no further reads are attempted.
    peer_closed: bool,
    /// Interest set currently registered with the poller.
    pub interest: Interest,
}

impl Connection {
    pub fn new(id: u64, stream: TcpStream, peer: SocketAddr, chain: ProtocolChain) -> Self {
        Self {
            stream,
            id,
            peer,
            chain,
            write_buf: BytesMut::new(),
            peer_closed: false,
            interest: Interest::READABLE,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn peer_closed(&self) -> bool {
        self.peer_closed
    }

    /// Peer is gone and nothing is left to drain: ready for teardown.
    /// Any partial record still buffered in the framer is discarded.
    pub fn is_finished(&self) -> bool {
        self.peer_closed && self.write_buf.is_empty()
    }

    /// Drain readable bytes into the protocol chain.
    ///
    /// Reads until would-block (registrations are edge-triggered, so a
    /// single receive could strand buffered bytes until the peer sends
    /// again). A zero-length read sets the half-close flag; replies for
    /// records completed before it still land in the write buffer.
    pub fn on_readable(&mut self) -> Result<(), ConnectionError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    self.peer_closed = true;
                    return Ok(());
                }
                Ok(n) => self.chain.feed(&chunk[..n], &mut self.write_buf),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ConnectionError::Recv(e)),
            }
        }
    }

    /// Drain the write buffer head until empty or would-block.
    ///
    /// A partial send leaves the remainder queued for the next writable
    /// event; it is never retried in a blocking loop.
    pub fn on_writable(&mut self) -> Result<(), ConnectionError> {
        while !self.write_buf.is_empty() {
            match self.stream.write(&self.write_buf) {
                Ok(0) => {
                    return Err(ConnectionError::Send(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "send returned zero",
                    )));
                }
                Ok(n) => self.write_buf.advance(n),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ConnectionError::Send(e)),
            }
        }
        Ok(())
    }

    /// Interest set this connection should be registered for.
    ///
    /// Invariant: WRITABLE is requested exactly while the write buffer is
    /// non-empty; READABLE is dropped once the peer half-closed. The
    /// empty/empty case never reaches the poller — `is_finished`
    /// connections are torn down first.
    pub fn desired_interest(&self) -> Interest {
        if self.peer_closed {
            Interest::WRITABLE
        } else if self.write_buf.is_empty() {
            Interest::READABLE
        } else {
            Interest::READABLE | Interest::WRITABLE
        }
    }

    #[cfg(test)]
    pub fn pending_output(&self) -> &[u8] {
        &self.write_buf
    }
}
