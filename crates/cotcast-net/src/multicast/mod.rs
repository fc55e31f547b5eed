//! Multicast UDP channel with observer-based datagram delivery.
//!
//! This module provides:
//! - **GroupAddress**: Validated group, port, and local adapter
//! - **ChannelConfig** / **ListenerConfig**: Tunables, loadable from TOML
//! - **MulticastChannel**: Joins a group, runs a receive thread, fans each
//!   datagram out to registered observers, and sends to the group
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use cotcast_net::multicast::{ChannelConfig, GroupAddress, MulticastChannel};
//!
//! let group = GroupAddress::parse("239.2.3.1", 6969, "")?;
//! let config = ChannelConfig::new().stop_timeout(Duration::from_secs(2));
//!
//! let channel = MulticastChannel::open(group, config)?;
//! let id = channel.add_observer_fn(|payload, sender| {
//!     println!("{} bytes from {}", payload.len(), sender);
//!     Ok(())
//! });
//!
//! std::thread::sleep(Duration::from_secs(10));
//! channel.remove_observer(id);
//! channel.stop();
//! # Ok::<(), cotcast_net::NetworkError>(())
//! ```
//!
//! # Bind behaviour
//!
//! On Linux and BSD-derived systems the socket binds to the group address.
//! On Windows it binds to the adapter address. Other platforms are rejected
//! at [`MulticastChannel::start`] with
//! [`NetworkError::UnsupportedPlatform`](crate::NetworkError::UnsupportedPlatform).

mod bind;
mod channel;
mod config;
mod socket;
mod state;

pub use bind::BindStrategy;
pub use channel::{MulticastChannel, UDP_MAX_PAYLOAD};
pub use config::{
    ChannelConfig, DEFAULT_RECV_BUFFER_SIZE, DEFAULT_STOP_TIMEOUT, GroupAddress, ListenerConfig,
};
pub use state::{ChannelState, StopOutcome};
