//! Commonly used types.
//!
//! ```
//! use cotcast::prelude::*;
//! ```

pub use cotcast_core::{
    CancelSignal, Observer, ObserverError, ObserverGuard, ObserverId, ObserverRegistry,
    ObserverResult, named,
};
pub use cotcast_net::multicast::{
    ChannelConfig, ChannelState, GroupAddress, ListenerConfig, MulticastChannel, StopOutcome,
};
pub use cotcast_net::NetworkError;
