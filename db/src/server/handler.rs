use mio::event::Event;
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token, Waker};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::algorithm::recency::RecencyList;
use crate::cli::ServerConfig;
use crate::clock;
use crate::engine::store::Keyspace;
use crate::server::connection::Connection;

const LISTENER: Token = Token(usize::MAX - 1);
const WAKER: Token = Token(usize::MAX - 2);
const EVENT_CAPACITY: usize = 1024;

/// Stops a running [`Server`] from another thread: flips the shutdown flag
/// and wakes the poll so the loop notices immediately.
#[derive(Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
        let _ = self.waker.wake();
    }
}

/// The event loop and everything it owns: listener, connection table,
/// recency list, and the keyspace. One thread runs the whole server;
/// commands execute serially between polls.
pub struct Server {
    config: ServerConfig,
    poll: Poll,
    listener: TcpListener,
    local_addr: SocketAddr,
    connections: Vec<Option<Connection>>,
    free_slots: Vec<usize>,
    idle: RecencyList,
    keyspace: Keyspace,
    shutdown: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl Server {
    pub fn new(config: &ServerConfig) -> io::Result<Self> {
        let addr = (config.host.as_str(), config.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "could not resolve bind address")
            })?;
        let mut listener = TcpListener::bind(addr)?;
        let local_addr = listener.local_addr()?;
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);

        Ok(Self {
            poll,
            listener,
            local_addr,
            connections: Vec::new(),
            free_slots: Vec::new(),
            idle: RecencyList::new(),
            keyspace: Keyspace::new(config.threadpool_size),
            shutdown: Arc::new(AtomicBool::new(false)),
            waker,
            config: config.clone(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            flag: self.shutdown.clone(),
            waker: self.waker.clone(),
        }
    }

    /// Runs the loop until the shutdown handle fires. Each iteration polls
    /// with a timeout bounded by the nearest TTL or idle deadline, services
    /// ready sockets, then processes whatever timers came due.
    pub fn start(mut self) -> io::Result<()> {
        log::info!("listening on {}", self.local_addr);
        let mut events = Events::with_capacity(EVENT_CAPACITY);
        while !self.shutdown.load(Ordering::SeqCst) {
            let timeout = self.next_timer_ms().map(Duration::from_millis);
            if let Err(err) = self.poll.poll(&mut events, timeout) {
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER => self.accept_ready(),
                    WAKER => {}
                    Token(slot) => self.connection_ready(slot, event),
                }
            }
            self.process_timers();
        }
        log::info!("shutting down");
        Ok(())
    }

    /// Accepts until the listener runs dry; every new connection starts in
    /// the reading state at the back of the recency list.
    fn accept_ready(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut socket, addr)) => {
                    let slot = self.free_slots.pop().unwrap_or(self.connections.len());
                    if let Err(err) =
                        self.poll
                            .registry()
                            .register(&mut socket, Token(slot), Interest::READABLE)
                    {
                        log::error!("could not register connection from {addr}: {err}");
                        if slot < self.connections.len() {
                            self.free_slots.push(slot);
                        }
                        continue;
                    }
                    log::info!("new connection from {addr}");
                    let conn = Connection::new(socket, addr, clock::monotonic_ms());
                    if slot == self.connections.len() {
                        self.connections.push(Some(conn));
                    } else {
                        self.connections[slot] = Some(conn);
                    }
                    self.idle.push_back(slot);
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    log::error!("accept error: {err}");
                    break;
                }
            }
        }
    }

    fn connection_ready(&mut self, slot: usize, event: &Event) {
        let max_message_size = self.config.message_size;
        {
            let Server {
                connections,
                idle,
                keyspace,
                ..
            } = &mut *self;
            let conn = match connections.get_mut(slot).and_then(|c| c.as_mut()) {
                Some(conn) => conn,
                // event raced with destruction, nothing to do
                None => return,
            };
            conn.last_active_ms = clock::monotonic_ms();
            idle.touch(slot);

            if event.is_readable() && conn.want_read {
                conn.handle_read(keyspace, max_message_size);
            }
            if event.is_writable() && conn.want_write {
                conn.handle_write();
            }
        }

        let close = match self.connections[slot].as_ref() {
            Some(conn) => event.is_error() || conn.want_close,
            None => return,
        };
        if close {
            self.destroy_connection(slot);
        } else {
            self.sync_interest(slot);
        }
    }

    /// Reregisters the socket when the state flags imply a different
    /// readiness interest than the one currently registered.
    fn sync_interest(&mut self, slot: usize) {
        let Server {
            connections, poll, ..
        } = &mut *self;
        let conn = match connections[slot].as_mut() {
            Some(conn) => conn,
            None => return,
        };
        let interest = conn.interest();
        if interest != conn.registered {
            match poll
                .registry()
                .reregister(&mut conn.socket, Token(slot), interest)
            {
                Ok(()) => conn.registered = interest,
                Err(err) => {
                    log::error!("could not reregister {}: {err}", conn.addr);
                    conn.want_close = true;
                }
            }
        }
        if self.connections[slot]
            .as_ref()
            .is_some_and(|conn| conn.want_close)
        {
            self.destroy_connection(slot);
        }
    }

    /// Tears a connection down on every exit path: deregisters the socket,
    /// clears the table slot, and detaches the recency node. Dropping the
    /// socket closes it.
    fn destroy_connection(&mut self, slot: usize) {
        if let Some(mut conn) = self.connections[slot].take() {
            let _ = self.poll.registry().deregister(&mut conn.socket);
            self.idle.detach(slot);
            self.free_slots.push(slot);
        }
    }

    /// Sweeps idle connections from the front of the recency list, then
    /// expired keys. Runs after every poll.
    fn process_timers(&mut self) {
        let now = clock::monotonic_ms();
        while let Some(slot) = self.idle.front() {
            let deadline = match self.connections[slot].as_ref() {
                Some(conn) => conn.last_active_ms + self.config.idle_timeout_ms,
                None => {
                    self.idle.detach(slot);
                    continue;
                }
            };
            if deadline >= now {
                break;
            }
            if let Some(conn) = self.connections[slot].as_ref() {
                log::info!("closing idle connection from {}", conn.addr);
            }
            self.destroy_connection(slot);
        }
        self.keyspace.evict_expired(now);
    }

    /// Milliseconds until the nearest deadline, `None` when there is
    /// nothing to wait for and the poll may block indefinitely.
    fn next_timer_ms(&self) -> Option<u64> {
        let mut next: Option<u64> = None;
        if let Some(slot) = self.idle.front() {
            if let Some(conn) = self.connections[slot].as_ref() {
                next = Some(conn.last_active_ms + self.config.idle_timeout_ms);
            }
        }
        if let Some(deadline) = self.keyspace.next_deadline() {
            next = Some(next.map_or(deadline, |n| n.min(deadline)));
        }
        next.map(|deadline| deadline.saturating_sub(clock::monotonic_ms()))
    }
}
