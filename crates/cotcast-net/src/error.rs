//! Error types for the networking module.

use std::net::{AddrParseError, Ipv4Addr};

use cotcast_core::CoreError;
use thiserror::Error;

use crate::multicast::ChannelState;

/// Network-specific errors.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// A group or adapter address is not valid IPv4 text.
    #[error("invalid IPv4 address {value:?}: {source}")]
    InvalidAddress {
        /// The text that failed to parse.
        value: String,
        /// The underlying parse error.
        #[source]
        source: AddrParseError,
    },

    /// The group address is outside 224.0.0.0/4.
    #[error("{0} is not an IPv4 multicast address")]
    NotMulticast(Ipv4Addr),

    /// Port 0 cannot be joined.
    #[error("invalid port {0}: must be in 1..=65535")]
    InvalidPort(u16),

    /// The host OS family has no known multicast bind strategy.
    #[error("unsupported platform {0:?} for multicast binding")]
    UnsupportedPlatform(String),

    /// The operation is not valid in the channel's current state.
    #[error("cannot {operation} a channel in state {state}")]
    InvalidState {
        /// The rejected operation.
        operation: &'static str,
        /// The state the channel was in.
        state: ChannelState,
    },

    /// The channel has not been started.
    #[error("channel not started")]
    NotStarted,

    /// The channel has been stopped and its socket released.
    #[error("channel closed")]
    Closed,

    /// The payload does not fit in one IPv4 UDP datagram.
    #[error("payload of {len} bytes exceeds the {max}-byte datagram limit")]
    PayloadTooLarge {
        /// Size of the rejected payload.
        len: usize,
        /// Largest accepted payload.
        max: usize,
    },

    /// A configuration file could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    /// The receive thread could not be spawned.
    #[error("failed to spawn receive thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    /// The cancel signal failed.
    #[error(transparent)]
    Cancel(#[from] CoreError),

    /// Socket-level I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized Result type for network operations.
pub type Result<T> = std::result::Result<T, NetworkError>;
