//! Multicast channel with a background receive loop and observer fan-out.

use std::fmt;
use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use cotcast_core::logging::targets;
use cotcast_core::{
    CancelSignal, Observer, ObserverGuard, ObserverId, ObserverRegistry, ObserverResult,
};
use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};
use mio::net::UdpSocket;
use mio::{Events, Interest, Poll, Token};
use parking_lot::Mutex;

use super::bind::BindStrategy;
use super::config::{ChannelConfig, GroupAddress};
use super::socket::{leave_group, open_group_socket};
use super::state::{ChannelState, StopOutcome};
use crate::Result;
use crate::error::NetworkError;

/// Largest payload of a single IPv4 UDP datagram.
pub const UDP_MAX_PAYLOAD: usize = 65_507;

const DATA: Token = Token(0);
const CANCEL: Token = Token(1);
const EVENT_CAPACITY: usize = 8;

/// Handles owned while the receive loop runs.
struct Active {
    socket: Arc<UdpSocket>,
    cancel: CancelSignal,
    handle: JoinHandle<()>,
    finished: Receiver<()>,
    local_addr: Option<SocketAddr>,
}

/// A UDP socket joined to a multicast group, delivering every received
/// datagram to a set of observers.
///
/// The channel owns one background thread while running. That thread blocks
/// in a `mio::Poll` over the group socket and a [`CancelSignal`]; it is the
/// only place the channel ever waits for data. Observers run on that thread,
/// in registration order, and an observer that fails is removed without
/// affecting the others.
///
/// # Lifecycle
///
/// `Idle` → [`start`](Self::start) → `Running` → [`stop`](Self::stop) →
/// `Closed`. A closed channel cannot be restarted; create a new one.
/// Dropping a running channel stops it.
///
/// # Example
///
/// ```no_run
/// use cotcast_net::multicast::{GroupAddress, MulticastChannel};
///
/// let group = GroupAddress::parse("239.2.3.1", 6969, "192.168.1.20")?;
/// let channel = MulticastChannel::new(group);
///
/// channel.add_observer_fn(|payload, sender| {
///     println!("{} bytes from {}", payload.len(), sender);
///     Ok(())
/// });
///
/// channel.start()?;
/// channel.send(b"hello")?;
/// channel.stop();
/// # Ok::<(), cotcast_net::NetworkError>(())
/// ```
pub struct MulticastChannel {
    group: GroupAddress,
    config: ChannelConfig,
    observers: Arc<ObserverRegistry>,
    state: Arc<Mutex<ChannelState>>,
    active: Mutex<Option<Active>>,
    teardown: Mutex<()>,
}

impl MulticastChannel {
    /// Create an idle channel with default configuration.
    pub fn new(group: GroupAddress) -> Self {
        Self::with_config(group, ChannelConfig::default())
    }

    /// Create an idle channel with custom configuration.
    pub fn with_config(group: GroupAddress, config: ChannelConfig) -> Self {
        Self {
            group,
            config,
            observers: Arc::new(ObserverRegistry::new()),
            state: Arc::new(Mutex::new(ChannelState::Idle)),
            active: Mutex::new(None),
            teardown: Mutex::new(()),
        }
    }

    /// Create and start a channel in one step.
    ///
    /// The channel stops when dropped.
    pub fn open(group: GroupAddress, config: ChannelConfig) -> Result<Self> {
        let channel = Self::with_config(group, config);
        channel.start()?;
        Ok(channel)
    }

    /// Get the current channel state.
    pub fn state(&self) -> ChannelState {
        *self.state.lock()
    }

    /// Check if the receive loop is running.
    pub fn is_running(&self) -> bool {
        self.state() == ChannelState::Running
    }

    /// Get the group this channel joins.
    pub fn group(&self) -> &GroupAddress {
        &self.group
    }

    /// Get the channel configuration.
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Get the local address of the socket while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.active.lock().as_ref().and_then(|a| a.local_addr)
    }

    /// Get the observer registry.
    pub fn observers(&self) -> &Arc<ObserverRegistry> {
        &self.observers
    }

    /// Join the group and spawn the receive loop.
    ///
    /// Valid only from `Idle`. Returns as soon as the loop is spawned. On
    /// failure the channel stays `Idle` and everything opened is released.
    pub fn start(&self) -> Result<()> {
        let mut active = self.active.lock();
        let state = self.state();
        if state != ChannelState::Idle {
            return Err(NetworkError::InvalidState {
                operation: "start",
                state,
            });
        }

        let strategy = BindStrategy::for_host()?;
        let mut socket = open_group_socket(&self.group, &self.config, strategy)?;
        let local_addr = socket.local_addr().ok();

        let poll = Poll::new()?;
        let mut cancel = CancelSignal::new()?;
        poll.registry()
            .register(&mut socket, DATA, Interest::READABLE)?;
        poll.registry()
            .register(&mut cancel, CANCEL, Interest::READABLE)?;

        let socket = Arc::new(socket);
        let (finished_tx, finished) = bounded(1);

        let receive_loop = ReceiveLoop {
            poll,
            socket: socket.clone(),
            group: self.group.clone(),
            state: self.state.clone(),
            observers: self.observers.clone(),
        };

        *self.state.lock() = ChannelState::Running;
        let spawned = thread::Builder::new()
            .name(self.thread_name())
            .spawn(move || {
                receive_loop.run();
                let _ = finished_tx.send(());
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                *self.state.lock() = ChannelState::Idle;
                return Err(NetworkError::ThreadSpawn(e));
            }
        };

        tracing::info!(
            target: targets::MULTICAST,
            group = %self.group,
            local_addr = ?local_addr,
            "multicast channel started"
        );

        *active = Some(Active {
            socket,
            cancel,
            handle,
            finished,
            local_addr,
        });
        Ok(())
    }

    /// Stop the receive loop and release the socket.
    ///
    /// Signals the loop, then waits up to the configured stop timeout for it
    /// to leave the group and exit. Whether or not it finished in time, the
    /// channel ends `Closed` and drops its socket and cancel handles. A
    /// loop that misses the deadline is detached and reported as
    /// [`StopOutcome::TimedOut`].
    ///
    /// Stopping an idle channel closes it. Stopping a closed channel does
    /// nothing. A stop that races another waits for that teardown to finish,
    /// so every call returns with the channel `Closed`.
    pub fn stop(&self) -> StopOutcome {
        let _teardown = self.teardown.lock();

        // Take the handles first so sends see the channel as gone and the
        // handle lock is not held while waiting.
        let Some(active) = self.active.lock().take() else {
            let mut state = self.state.lock();
            if *state == ChannelState::Idle {
                *state = ChannelState::Closed;
            }
            return StopOutcome::NotRunning;
        };

        let Active {
            socket,
            cancel,
            handle,
            finished,
            ..
        } = active;

        *self.state.lock() = ChannelState::Stopping;
        if let Err(e) = cancel.signal() {
            tracing::error!(
                target: targets::MULTICAST,
                group = %self.group,
                error = %e,
                "failed to signal receive loop"
            );
        }

        let outcome = match finished.recv_timeout(self.config.stop_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    tracing::error!(
                        target: targets::MULTICAST,
                        group = %self.group,
                        "receive thread panicked"
                    );
                }
                StopOutcome::Stopped
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    target: targets::MULTICAST,
                    group = %self.group,
                    timeout = ?self.config.stop_timeout,
                    "receive loop did not exit in time; detaching it"
                );
                StopOutcome::TimedOut
            }
        };

        drop(socket);
        cancel.close();

        *self.state.lock() = ChannelState::Closed;
        tracing::info!(
            target: targets::MULTICAST,
            group = %self.group,
            %outcome,
            "multicast channel stopped"
        );
        outcome
    }

    /// Send a payload to the group.
    ///
    /// Safe to call while the receive loop runs. Returns the number of bytes
    /// sent.
    pub fn send(&self, payload: &[u8]) -> Result<usize> {
        if payload.len() > UDP_MAX_PAYLOAD {
            return Err(NetworkError::PayloadTooLarge {
                len: payload.len(),
                max: UDP_MAX_PAYLOAD,
            });
        }

        let socket = match self.active.lock().as_ref() {
            Some(active) if self.state() == ChannelState::Running => active.socket.clone(),
            // The loop exited on its own; the group has been left.
            Some(_) => return Err(NetworkError::Closed),
            None => {
                return Err(match self.state() {
                    ChannelState::Idle => NetworkError::NotStarted,
                    _ => NetworkError::Closed,
                });
            }
        };

        let sent = socket.send_to(payload, self.group.socket_addr())?;
        tracing::trace!(target: targets::MULTICAST, group = %self.group, sent, "datagram sent");
        Ok(sent)
    }

    /// Register an observer. Returns its id for later removal.
    pub fn add_observer<O: Observer>(&self, observer: O) -> ObserverId {
        self.observers.add(observer)
    }

    /// Register a closure observer.
    pub fn add_observer_fn<F>(&self, func: F) -> ObserverId
    where
        F: Fn(&[u8], SocketAddr) -> ObserverResult + Send + Sync + 'static,
    {
        self.observers.add_fn(func)
    }

    /// Register an observer that is removed when the returned guard drops.
    pub fn observe_scoped<O: Observer>(&self, observer: O) -> ObserverGuard {
        self.observers.add_scoped(observer)
    }

    /// Remove an observer by id.
    ///
    /// Returns `true` if the observer was registered.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.observers.remove(id)
    }

    /// Remove all observers.
    pub fn clear_observers(&self) {
        self.observers.clear();
    }

    /// Check whether an observer is registered.
    pub fn contains_observer(&self, id: ObserverId) -> bool {
        self.observers.contains(id)
    }

    /// Get the number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    fn thread_name(&self) -> String {
        self.config.thread_name.clone().unwrap_or_else(|| {
            format!("cotcast-rx-{}:{}", self.group.group(), self.group.port())
        })
    }
}

impl Drop for MulticastChannel {
    fn drop(&mut self) {
        if self.active.get_mut().is_some() {
            self.stop();
        }
    }
}

impl fmt::Debug for MulticastChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MulticastChannel")
            .field("group", &self.group)
            .field("state", &self.state())
            .field("local_addr", &self.local_addr())
            .field("observers", &self.observer_count())
            .finish()
    }
}

static_assertions::assert_impl_all!(MulticastChannel: Send, Sync);

/// State moved onto the receive thread.
struct ReceiveLoop {
    poll: Poll,
    socket: Arc<UdpSocket>,
    group: GroupAddress,
    state: Arc<Mutex<ChannelState>>,
    observers: Arc<ObserverRegistry>,
}

impl ReceiveLoop {
    fn run(mut self) {
        let mut events = Events::with_capacity(EVENT_CAPACITY);
        let mut buf = vec![0u8; UDP_MAX_PAYLOAD];
        tracing::debug!(target: targets::MULTICAST, group = %self.group, "receive loop started");

        loop {
            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == ErrorKind::Interrupted {
                    continue;
                }
                tracing::error!(
                    target: targets::MULTICAST,
                    group = %self.group,
                    error = %e,
                    "readiness wait failed; receive loop exiting"
                );
                break;
            }

            // Readiness is edge-triggered, so drain the socket on every wake
            // rather than trusting which token fired.
            if !self.drain(&mut buf) {
                break;
            }
        }

        self.shutdown();
    }

    fn is_running(&self) -> bool {
        *self.state.lock() == ChannelState::Running
    }

    fn drain(&self, buf: &mut [u8]) -> bool {
        drain_socket(
            buf,
            |buf| self.socket.recv_from(buf),
            || self.is_running(),
            &self.observers,
            &self.group,
        )
    }

    fn shutdown(self) {
        if let Err(e) = leave_group(&self.socket, &self.group) {
            tracing::debug!(
                target: targets::MULTICAST,
                group = %self.group,
                error = %e,
                "failed to leave multicast group"
            );
        }
        *self.state.lock() = ChannelState::Closed;
        tracing::debug!(target: targets::MULTICAST, group = %self.group, "receive loop exited");
    }
}

/// Receive and dispatch until `recv` would block.
///
/// Returns `false` once `running` reports the channel stopped. A failed
/// receive is logged and draining continues, since readiness only fires
/// again for new datagrams.
fn drain_socket<R>(
    buf: &mut [u8],
    mut recv: R,
    running: impl Fn() -> bool,
    observers: &ObserverRegistry,
    group: &GroupAddress,
) -> bool
where
    R: FnMut(&mut [u8]) -> io::Result<(usize, SocketAddr)>,
{
    loop {
        if !running() {
            return false;
        }

        match recv(buf) {
            Ok((len, sender)) => {
                let report = observers.dispatch(&buf[..len], sender);
                tracing::trace!(
                    target: targets::MULTICAST,
                    len,
                    %sender,
                    delivered = report.delivered,
                    "datagram received"
                );
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => return true,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::warn!(
                    target: targets::MULTICAST,
                    %group,
                    error = %e,
                    "receive failed"
                );
            }
        }
    }
}
