//! Configuration types for multicast channels.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::error::NetworkError;

/// Default time `stop()` waits for the receive loop to exit.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Default socket receive buffer size in bytes.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 65535;

/// A multicast group, port, and the local adapter used to join it.
///
/// The adapter is the IPv4 address of the local interface that carries group
/// membership and outbound multicast traffic. `0.0.0.0` lets the OS choose.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GroupAddress {
    group: Ipv4Addr,
    port: u16,
    adapter: Ipv4Addr,
}

impl GroupAddress {
    /// Create a group address from parsed parts.
    ///
    /// Fails if `group` is not in 224.0.0.0/4 or `port` is 0.
    pub fn new(group: Ipv4Addr, port: u16, adapter: Ipv4Addr) -> Result<Self> {
        if !group.is_multicast() {
            return Err(NetworkError::NotMulticast(group));
        }
        if port == 0 {
            return Err(NetworkError::InvalidPort(port));
        }
        Ok(Self {
            group,
            port,
            adapter,
        })
    }

    /// Parse a group address from text.
    ///
    /// An empty adapter string means any interface.
    ///
    /// # Example
    ///
    /// ```
    /// use cotcast_net::multicast::GroupAddress;
    ///
    /// let addr = GroupAddress::parse("239.2.3.1", 6969, "").unwrap();
    /// assert_eq!(addr.to_string(), "239.2.3.1:6969 via 0.0.0.0");
    /// ```
    pub fn parse(group: &str, port: u16, adapter: &str) -> Result<Self> {
        let group = parse_ipv4(group)?;
        let adapter = if adapter.trim().is_empty() {
            Ipv4Addr::UNSPECIFIED
        } else {
            parse_ipv4(adapter)?
        };
        Self::new(group, port, adapter)
    }

    /// The multicast group address.
    pub fn group(&self) -> Ipv4Addr {
        self.group
    }

    /// The group port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The local adapter address.
    pub fn adapter(&self) -> Ipv4Addr {
        self.adapter
    }

    /// The destination address for outbound datagrams.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.group, self.port))
    }
}

impl fmt::Display for GroupAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} via {}", self.group, self.port, self.adapter)
    }
}

fn parse_ipv4(value: &str) -> Result<Ipv4Addr> {
    value
        .trim()
        .parse()
        .map_err(|source| NetworkError::InvalidAddress {
            value: value.to_string(),
            source,
        })
}

/// Tunables for a multicast channel.
///
/// Build it with the chained setters or load it from TOML; every field has a
/// default.
///
/// ```toml
/// recv_buffer_size = 262144
/// stop_timeout_ms = 2000
/// multicast_loop = true
/// multicast_ttl = 4
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Socket receive buffer size in bytes.
    pub recv_buffer_size: usize,
    /// How long `stop()` waits for the receive loop to exit.
    #[serde(rename = "stop_timeout_ms", with = "millis")]
    pub stop_timeout: Duration,
    /// Whether datagrams sent by this host are looped back to local members.
    pub multicast_loop: bool,
    /// TTL for outbound multicast datagrams. `None` keeps the OS default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multicast_ttl: Option<u32>,
    /// Name of the receive thread. Defaults to `cotcast-rx-<group>:<port>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_name: Option<String>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            multicast_loop: true,
            multicast_ttl: None,
            thread_name: None,
        }
    }
}

impl ChannelConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the receive buffer size.
    pub fn recv_buffer_size(mut self, size: usize) -> Self {
        self.recv_buffer_size = size;
        self
    }

    /// Set the stop timeout.
    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Enable or disable multicast loopback.
    pub fn multicast_loop(mut self, enabled: bool) -> Self {
        self.multicast_loop = enabled;
        self
    }

    /// Set the multicast TTL.
    pub fn multicast_ttl(mut self, ttl: u32) -> Self {
        self.multicast_ttl = Some(ttl);
        self
    }

    /// Set the receive thread name.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = Some(name.into());
        self
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load a configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }
}

/// A complete listener description: where to join and how.
///
/// This is the shape of a listener configuration file:
///
/// ```toml
/// group = "239.2.3.1"
/// port = 6969
/// adapter = "192.168.1.20"
///
/// [channel]
/// stop_timeout_ms = 1000
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Multicast group address.
    pub group: String,
    /// Group port.
    pub port: u16,
    /// Local adapter address. Empty means any interface.
    #[serde(default)]
    pub adapter: String,
    /// Channel tunables.
    #[serde(default)]
    pub channel: ChannelConfig,
}

impl ListenerConfig {
    /// Parse a listener configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load a listener configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Validate and convert the group section.
    pub fn group_address(&self) -> Result<GroupAddress> {
        GroupAddress::parse(&self.group, self.port, &self.adapter)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().try_into().unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
