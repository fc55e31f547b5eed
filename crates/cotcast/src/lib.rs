//! cotcast: receive Cursor-on-Target traffic over UDP multicast.
//!
//! This crate re-exports the workspace crates:
//!
//! - [`core`]: the cross-thread [`CancelSignal`](core::CancelSignal) and the
//!   [`ObserverRegistry`](core::ObserverRegistry)
//! - [`net`]: the [`MulticastChannel`](net::MulticastChannel) and its
//!   configuration
//!
//! Most programs only need the prelude:
//!
//! ```no_run
//! use cotcast::prelude::*;
//!
//! let group = GroupAddress::parse("239.2.3.1", 6969, "")?;
//! let channel = MulticastChannel::open(group, ChannelConfig::default())?;
//! channel.add_observer_fn(|payload, sender| {
//!     println!("{}: {} bytes", sender, payload.len());
//!     Ok(())
//! });
//! # Ok::<(), NetworkError>(())
//! ```
//!
//! The `cotcast-listen` binary wraps the same API for the command line.

pub use cotcast_core as core;
pub use cotcast_net as net;

pub mod prelude;
