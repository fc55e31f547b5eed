//! Multicast networking for cotcast.
//!
//! Cursor-on-Target traffic is carried over UDP multicast. This crate joins a
//! group on a chosen local adapter, receives on a dedicated background
//! thread, and hands each datagram to every registered observer. Sending to
//! the same group goes through the same socket.
//!
//! ```no_run
//! use cotcast_net::multicast::{GroupAddress, MulticastChannel};
//!
//! let channel = MulticastChannel::new(GroupAddress::parse("239.2.3.1", 6969, "")?);
//! channel.add_observer_fn(|payload, sender| {
//!     println!("{}: {}", sender, String::from_utf8_lossy(payload));
//!     Ok(())
//! });
//! channel.start()?;
//! # Ok::<(), cotcast_net::NetworkError>(())
//! ```
//!
//! Observer failures never reach the caller. A failing or panicking
//! observer is logged under the `cotcast_net::multicast` tracing target and
//! removed.

mod error;
pub mod multicast;

pub use error::{NetworkError, Result};
pub use multicast::{
    ChannelConfig, ChannelState, GroupAddress, ListenerConfig, MulticastChannel, StopOutcome,
};
