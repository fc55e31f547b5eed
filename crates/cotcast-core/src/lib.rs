//! Core primitives for cotcast.
//!
//! This crate provides the building blocks the multicast transport is made of:
//!
//! - **CancelSignal**: A cross-thread wake-up latch that can sit inside a
//!   `mio::Poll` next to a socket, so a blocked receive loop can be woken
//!   from any other thread without polling
//! - **Observer Registry**: An ordered, thread-safe set of datagram observers
//!   with snapshot dispatch and failure isolation
//! - **Logging**: `tracing` targets and convenience macros shared by the
//!   cotcast crates
//!
//! # Observer Example
//!
//! ```
//! use std::net::SocketAddr;
//! use cotcast_core::ObserverRegistry;
//!
//! let registry = ObserverRegistry::new();
//!
//! let id = registry.add_fn(|payload, sender| {
//!     println!("{} bytes from {}", payload.len(), sender);
//!     Ok(())
//! });
//!
//! let sender: SocketAddr = "127.0.0.1:6969".parse().unwrap();
//! let report = registry.dispatch(b"hello", sender);
//! assert_eq!(report.delivered, 1);
//!
//! registry.remove(id);
//! ```
//!
//! # Cancel Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use cotcast_core::CancelSignal;
//! use mio::{Events, Interest, Poll, Token};
//!
//! let mut poll = Poll::new()?;
//! let mut cancel = CancelSignal::new()?;
//! poll.registry().register(&mut cancel, Token(0), Interest::READABLE)?;
//!
//! let cancel = Arc::new(cancel);
//! let remote = cancel.clone();
//! std::thread::spawn(move || remote.signal());
//!
//! let mut events = Events::with_capacity(4);
//! poll.poll(&mut events, Some(Duration::from_secs(1)))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod cancel;
mod error;
pub mod logging;
pub mod observer;

pub use cancel::CancelSignal;
pub use error::{CoreError, Result};
pub use observer::{
    DispatchReport, NamedObserver, Observer, ObserverError, ObserverFailure, ObserverGuard,
    ObserverId, ObserverRegistry, ObserverResult, named,
};
