use bytes::{Buf, BytesMut};
use kestrel_types::wire::{ProtocolError, LENGTH_HEADER_SIZE};
use kestrel_types::{request, response};
use mio::net::TcpStream;
use mio::Interest;
use std::io::{self, Read, Write};
use std::net::SocketAddr;

use crate::engine::store::Keyspace;

const READ_CHUNK: usize = 64 * 1024;

/// Per-connection state. The flag pair doubles as the connection state
/// machine: reading while `want_read`, writing while `want_write`, and
/// `want_close` marks the connection for destruction at the end of the
/// current loop iteration.
pub(crate) struct Connection {
    pub(crate) socket: TcpStream,
    pub(crate) addr: SocketAddr,
    incoming: BytesMut,
    outgoing: BytesMut,
    pub(crate) want_read: bool,
    pub(crate) want_write: bool,
    pub(crate) want_close: bool,
    pub(crate) last_active_ms: u64,
    /// Interest currently registered with the poll, to skip redundant
    /// reregistrations.
    pub(crate) registered: Interest,
}

impl Connection {
    pub(crate) fn new(socket: TcpStream, addr: SocketAddr, now_ms: u64) -> Self {
        Self {
            socket,
            addr,
            incoming: BytesMut::new(),
            outgoing: BytesMut::new(),
            want_read: true,
            want_write: false,
            want_close: false,
            last_active_ms: now_ms,
            registered: Interest::READABLE,
        }
    }

    /// The poll interest implied by the current state flags.
    pub(crate) fn interest(&self) -> Interest {
        if self.want_write && self.want_read {
            Interest::READABLE | Interest::WRITABLE
        } else if self.want_write {
            Interest::WRITABLE
        } else {
            Interest::READABLE
        }
    }

    /// Drains the socket, dispatches every complete frame, and flips to
    /// writing when responses have accumulated.
    pub(crate) fn handle_read(&mut self, keyspace: &mut Keyspace, max_message_size: usize) {
        let mut chunk = [0u8; READ_CHUNK];
        let mut saw_eof = false;
        loop {
            match self.socket.read(&mut chunk) {
                Ok(0) => {
                    saw_eof = true;
                    break;
                }
                Ok(n) => self.incoming.extend_from_slice(&chunk[..n]),
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    log::error!("read error on {}: {err}", self.addr);
                    self.want_close = true;
                    return;
                }
            }
        }

        // pipelining: consume as many complete frames as arrived
        while self.try_one_request(keyspace, max_message_size) {}

        if saw_eof {
            if self.incoming.is_empty() {
                log::info!("client {} closed the connection", self.addr);
            } else {
                log::error!("unexpected EOF from {} mid-frame", self.addr);
            }
            self.want_close = true;
            return;
        }

        if !self.outgoing.is_empty() {
            self.want_read = false;
            self.want_write = true;
            self.handle_write();
        }
    }

    /// Drains the write buffer as far as the socket allows; once empty the
    /// connection goes back to reading.
    pub(crate) fn handle_write(&mut self) {
        while !self.outgoing.is_empty() {
            match self.socket.write(&self.outgoing) {
                Ok(0) => break,
                Ok(n) => self.outgoing.advance(n),
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => return,
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    log::error!("write error on {}: {err}", self.addr);
                    self.want_close = true;
                    return;
                }
            }
        }
        if self.outgoing.is_empty() {
            self.want_write = false;
            self.want_read = true;
        }
    }

    /// Extracts one frame from the read buffer if a complete one is
    /// present, executes it, and appends the response. Framing violations
    /// close the connection without a reply.
    fn try_one_request(&mut self, keyspace: &mut Keyspace, max_message_size: usize) -> bool {
        if self.incoming.len() < LENGTH_HEADER_SIZE {
            return false;
        }
        let declared = u32::from_le_bytes(
            self.incoming[..LENGTH_HEADER_SIZE]
                .try_into()
                .expect("sliced exactly four bytes"),
        ) as usize;
        if declared > max_message_size {
            log::error!(
                "bad request from {}: {}",
                self.addr,
                ProtocolError::MessageTooBig(declared, max_message_size)
            );
            self.want_close = true;
            return false;
        }
        if LENGTH_HEADER_SIZE + declared > self.incoming.len() {
            return false;
        }

        let payload = &self.incoming[LENGTH_HEADER_SIZE..LENGTH_HEADER_SIZE + declared];
        let cmd = match request::parse(payload) {
            Ok(cmd) => cmd,
            Err(err) => {
                log::error!("bad request from {}: {err}", self.addr);
                self.want_close = true;
                return false;
            }
        };

        let header = response::begin(&mut self.outgoing);
        keyspace.execute(cmd, &mut self.outgoing);
        response::end(&mut self.outgoing, header, max_message_size);

        self.incoming.advance(LENGTH_HEADER_SIZE + declared);
        true
    }
}
