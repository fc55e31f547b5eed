//! State enumerations for multicast channels.

/// Lifecycle state of a [`MulticastChannel`](super::MulticastChannel).
///
/// `Idle` → `start()` → `Running` → `stop()` → `Stopping` → `Closed`.
/// A closed channel cannot be restarted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ChannelState {
    /// Constructed, socket not yet opened.
    #[default]
    Idle,
    /// Joined to the group; the receive loop is running.
    Running,
    /// Stop requested; waiting for the receive loop to exit.
    Stopping,
    /// Socket released. Terminal.
    Closed,
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelState::Idle => write!(f, "Idle"),
            ChannelState::Running => write!(f, "Running"),
            ChannelState::Stopping => write!(f, "Stopping"),
            ChannelState::Closed => write!(f, "Closed"),
        }
    }
}

/// The observable result of [`MulticastChannel::stop`](super::MulticastChannel::stop).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopOutcome {
    /// The channel was not running; nothing had to be torn down.
    NotRunning,
    /// The receive loop exited and was joined within the timeout.
    Stopped,
    /// The receive loop did not exit within the timeout and was detached.
    ///
    /// Its socket and cancel signal are released when the loop finally
    /// returns.
    TimedOut,
}

impl StopOutcome {
    /// Check whether the stop completed without leaving a thread behind.
    pub fn is_clean(self) -> bool {
        !matches!(self, StopOutcome::TimedOut)
    }
}

impl std::fmt::Display for StopOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopOutcome::NotRunning => write!(f, "not running"),
            StopOutcome::Stopped => write!(f, "stopped"),
            StopOutcome::TimedOut => write!(f, "timed out"),
        }
    }
}
