//! Platform-dependent bind strategy for multicast sockets.
//!
//! Socket stacks disagree on what a multicast receiver may bind to. BSD-derived
//! and Linux stacks accept the group address itself, which also filters out
//! unicast traffic aimed at the same port. Winsock rejects a multicast bind
//! address, so the socket binds to the adapter's unicast address instead.

use std::net::SocketAddrV4;

use super::config::GroupAddress;
use crate::Result;
use crate::error::NetworkError;

/// Which local address a group socket binds to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindStrategy {
    /// Bind to `(group, port)`.
    Group,
    /// Bind to `(adapter, port)`.
    Adapter,
}

impl BindStrategy {
    /// The strategy for the OS this binary was built for.
    pub fn for_host() -> Result<Self> {
        Self::for_os(std::env::consts::OS)
    }

    /// The strategy for an OS family name as reported by
    /// [`std::env::consts::OS`].
    pub fn for_os(os: &str) -> Result<Self> {
        match os {
            "linux" | "android" | "macos" | "ios" | "freebsd" | "openbsd" | "netbsd"
            | "dragonfly" => Ok(Self::Group),
            "windows" => Ok(Self::Adapter),
            other => Err(NetworkError::UnsupportedPlatform(other.to_string())),
        }
    }

    /// The local address to bind for `group`.
    pub fn bind_addr(self, group: &GroupAddress) -> SocketAddrV4 {
        match self {
            Self::Group => SocketAddrV4::new(group.group(), group.port()),
            Self::Adapter => SocketAddrV4::new(group.adapter(), group.port()),
        }
    }
}
