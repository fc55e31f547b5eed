//! Cross-thread wake-up latch for readiness-based loops.
//!
//! A [`CancelSignal`] is a binary latch backed by a connected pair of
//! endpoints. Setting the latch writes a single byte into the pair, which
//! makes the read endpoint readable; clearing it consumes that byte. Because
//! the read endpoint is an ordinary OS handle, it can be registered with a
//! `mio::Poll` alongside a data socket, and a thread blocked in `poll` wakes
//! up as soon as another thread calls [`CancelSignal::signal`].
//!
//! On Unix the pair is a `socketpair(2)` of datagram sockets. Elsewhere it is
//! two loopback UDP sockets connected to each other.
//!
//! # Example
//!
//! ```no_run
//! use cotcast_core::CancelSignal;
//!
//! let cancel = CancelSignal::new()?;
//! cancel.signal()?;
//! cancel.signal()?; // already set, no second byte
//! assert!(cancel.is_set());
//!
//! cancel.reset()?;
//! assert!(!cancel.is_set());
//! cancel.close();
//! # Ok::<(), cotcast_core::CoreError>(())
//! ```

use std::fmt;
use std::io::{self, ErrorKind};

use mio::event::Source;
use mio::{Interest, Registry, Token};
use parking_lot::Mutex;

use crate::error::Result;
use crate::logging::targets;

#[cfg(unix)]
type Endpoint = mio::net::UnixDatagram;

#[cfg(not(unix))]
type Endpoint = mio::net::UdpSocket;

/// The byte written into the pair when the latch is set.
const WAKE_BYTE: [u8; 1] = [1];

/// A thread-safe, idempotent wake-up latch usable inside a readiness multiplex.
///
/// Register the signal with a `mio::Poll` (it implements
/// [`mio::event::Source`]) before sharing it; after that, any thread can call
/// [`signal`](Self::signal) to wake the poller.
///
/// `signal` and `reset` are serialized by an internal lock, so a `reset`
/// never swallows the byte of a `signal` that completed after it began.
pub struct CancelSignal {
    reader: Endpoint,
    writer: Endpoint,
    set: Mutex<bool>,
}

impl CancelSignal {
    /// Create a new, cleared signal.
    pub fn new() -> Result<Self> {
        let (reader, writer) = endpoint_pair()?;
        Ok(Self {
            reader,
            writer,
            set: Mutex::new(false),
        })
    }

    /// Set the latch.
    ///
    /// The first call writes one byte and makes the wait handle readable.
    /// Calls while already set do nothing.
    pub fn signal(&self) -> Result<()> {
        let mut set = self.set.lock();
        if *set {
            return Ok(());
        }

        loop {
            match self.writer.send(&WAKE_BYTE) {
                Ok(_) => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        *set = true;
        crate::cotcast_trace!("cancel signal set");
        Ok(())
    }

    /// Clear the latch, consuming the pending wake byte.
    ///
    /// Does nothing if the latch is already clear.
    pub fn reset(&self) -> Result<()> {
        let mut set = self.set.lock();
        if !*set {
            return Ok(());
        }

        let mut buf = [0u8; 8];
        loop {
            match self.reader.recv(&mut buf) {
                // At most one byte is ever in flight while the lock is held,
                // but keep reading until empty so a late loopback delivery
                // cannot leave the handle readable.
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        *set = false;
        crate::cotcast_trace!("cancel signal cleared");
        Ok(())
    }

    /// Check whether the latch is currently set.
    pub fn is_set(&self) -> bool {
        *self.set.lock()
    }

    /// Release both endpoints.
    pub fn close(self) {
        tracing::trace!(target: targets::CANCEL, set = self.is_set(), "closing cancel signal");
        drop(self);
    }
}

impl Source for CancelSignal {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        self.reader.register(registry, token, interests)
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        self.reader.reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        self.reader.deregister(registry)
    }
}

impl fmt::Debug for CancelSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelSignal")
            .field("set", &self.is_set())
            .finish()
    }
}

static_assertions::assert_impl_all!(CancelSignal: Send, Sync);

#[cfg(unix)]
fn endpoint_pair() -> io::Result<(Endpoint, Endpoint)> {
    mio::net::UnixDatagram::pair()
}

#[cfg(not(unix))]
fn endpoint_pair() -> io::Result<(Endpoint, Endpoint)> {
    use std::net::{Ipv4Addr, SocketAddr};

    let loopback = SocketAddr::from((Ipv4Addr::LOCALHOST, 0));
    let reader = mio::net::UdpSocket::bind(loopback)?;
    let writer = mio::net::UdpSocket::bind(loopback)?;
    writer.connect(reader.local_addr()?)?;
    reader.connect(writer.local_addr()?)?;
    Ok((reader, writer))
}
