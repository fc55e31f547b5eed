//! Observer registry for received datagrams.
//!
//! An [`ObserverRegistry`] holds an ordered list of [`Observer`]s. Every
//! datagram handed to [`ObserverRegistry::dispatch`] is delivered to each
//! observer in registration order. Observers can be added and removed from
//! any thread at any time, including while a dispatch is running on another
//! thread.
//!
//! # Dispatch Semantics
//!
//! - Each dispatch cycle iterates a snapshot taken when the cycle starts. An
//!   observer added mid-cycle is first invoked for the next datagram.
//! - Observers run synchronously on the dispatching thread.
//! - An observer that returns `Err` or panics is logged and removed; it is
//!   never invoked again. The other observers still receive the datagram.
//!
//! # Example
//!
//! ```
//! use std::net::SocketAddr;
//! use cotcast_core::{ObserverRegistry, named};
//!
//! let registry = ObserverRegistry::new();
//!
//! registry.add(named("printer", |payload, sender| {
//!     println!("{:?} from {}", payload, sender);
//!     Ok(())
//! }));
//!
//! let flaky = registry.add_fn(|_, _| Err("not today".into()));
//!
//! let sender: SocketAddr = "10.0.0.1:4242".parse().unwrap();
//! let report = registry.dispatch(b"ping", sender);
//!
//! assert_eq!(report.delivered, 1);
//! assert_eq!(report.evicted, vec![flaky]);
//! assert!(!registry.contains(flaky));
//! ```

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use thiserror::Error;

use crate::logging::targets;

/// Error type observers return to report a failure.
pub type ObserverError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type returned by [`Observer::receive`].
pub type ObserverResult = std::result::Result<(), ObserverError>;

/// A receiver of datagrams.
///
/// Implemented automatically for closures of the shape
/// `Fn(&[u8], SocketAddr) -> ObserverResult`. Implement it directly to give
/// an observer a readable [`name`](Self::name) in diagnostics.
pub trait Observer: Send + Sync + 'static {
    /// Handle one datagram and the address it came from.
    fn receive(&self, payload: &[u8], sender: SocketAddr) -> ObserverResult;

    /// A human-readable name used in diagnostics.
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed(std::any::type_name::<Self>())
    }
}

impl<F> Observer for F
where
    F: Fn(&[u8], SocketAddr) -> ObserverResult + Send + Sync + 'static,
{
    fn receive(&self, payload: &[u8], sender: SocketAddr) -> ObserverResult {
        self(payload, sender)
    }
}

/// A closure observer with an explicit name.
///
/// Created with [`named`].
pub struct NamedObserver<F> {
    name: String,
    func: F,
}

/// Wrap a closure so it reports `name` in diagnostics.
pub fn named<F>(name: impl Into<String>, func: F) -> NamedObserver<F>
where
    F: Fn(&[u8], SocketAddr) -> ObserverResult + Send + Sync + 'static,
{
    NamedObserver {
        name: name.into(),
        func,
    }
}

impl<F> Observer for NamedObserver<F>
where
    F: Fn(&[u8], SocketAddr) -> ObserverResult + Send + Sync + 'static,
{
    fn receive(&self, payload: &[u8], sender: SocketAddr) -> ObserverResult {
        (self.func)(payload, sender)
    }

    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.name)
    }
}

impl<F> fmt::Debug for NamedObserver<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedObserver")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A unique handle for a registered observer.
///
/// Returned by the `add*` methods and used to remove the observer again.
/// Ids are never reused within a registry, so a stale id cannot remove a
/// newer observer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObserverId(u64);

impl ObserverId {
    /// Get the raw numeric value of this id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer#{}", self.0)
    }
}

/// Why an observer was evicted.
#[derive(Error, Debug)]
pub enum ObserverFailure {
    /// The observer returned an error.
    #[error("{0}")]
    Error(ObserverError),
    /// The observer panicked.
    #[error("observer panicked: {0}")]
    Panicked(String),
}

/// Outcome of one dispatch cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Number of observers that handled the datagram successfully.
    pub delivered: usize,
    /// Observers removed because they failed on this datagram.
    pub evicted: Vec<ObserverId>,
}

#[derive(Clone)]
struct Registration {
    id: ObserverId,
    observer: Arc<dyn Observer>,
}

/// An ordered, thread-safe collection of observers.
///
/// Registration order is dispatch order. The same observer may be
/// registered more than once; each registration gets its own id.
pub struct ObserverRegistry {
    observers: Mutex<Vec<Registration>>,
    next_id: AtomicU64,
}

impl Default for ObserverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ObserverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            observers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register an observer at the end of the dispatch order.
    pub fn add<O: Observer>(&self, observer: O) -> ObserverId {
        self.add_shared(Arc::new(observer))
    }

    /// Register a closure at the end of the dispatch order.
    ///
    /// Equivalent to [`add`](Self::add), but lets the compiler infer the
    /// closure's argument types.
    pub fn add_fn<F>(&self, func: F) -> ObserverId
    where
        F: Fn(&[u8], SocketAddr) -> ObserverResult + Send + Sync + 'static,
    {
        self.add(func)
    }

    /// Register an already shared observer.
    pub fn add_shared(&self, observer: Arc<dyn Observer>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(target: targets::OBSERVER, %id, name = %observer.name(), "observer added");
        self.observers.lock().push(Registration { id, observer });
        id
    }

    /// Remove an observer by id.
    ///
    /// Returns `true` if the observer was registered.
    pub fn remove(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.lock();
        match observers.iter().position(|r| r.id == id) {
            Some(index) => {
                observers.remove(index);
                tracing::debug!(target: targets::OBSERVER, %id, "observer removed");
                true
            }
            None => false,
        }
    }

    /// Remove all observers.
    pub fn clear(&self) {
        let removed = std::mem::take(&mut *self.observers.lock()).len();
        tracing::debug!(target: targets::OBSERVER, removed, "observers cleared");
    }

    /// Check whether an observer is registered.
    pub fn contains(&self, id: ObserverId) -> bool {
        self.observers.lock().iter().any(|r| r.id == id)
    }

    /// Get the number of registered observers.
    pub fn len(&self) -> usize {
        self.observers.lock().len()
    }

    /// Check whether no observers are registered.
    pub fn is_empty(&self) -> bool {
        self.observers.lock().is_empty()
    }

    /// Get the ids of all registered observers in dispatch order.
    pub fn ids(&self) -> Vec<ObserverId> {
        self.observers.lock().iter().map(|r| r.id).collect()
    }

    /// Deliver a datagram to every observer registered when the call starts.
    ///
    /// Observers that fail are removed and listed in the returned report.
    /// The registry lock is not held while observers run, so observers may
    /// add or remove observers themselves.
    pub fn dispatch(&self, payload: &[u8], sender: SocketAddr) -> DispatchReport {
        let snapshot: Vec<Registration> = self.observers.lock().clone();
        tracing::trace!(
            target: targets::OBSERVER,
            observers = snapshot.len(),
            len = payload.len(),
            %sender,
            "dispatching datagram"
        );

        let mut report = DispatchReport::default();
        for registration in &snapshot {
            match invoke(registration.observer.as_ref(), payload, sender) {
                Ok(()) => report.delivered += 1,
                Err(failure) => {
                    tracing::warn!(
                        target: targets::OBSERVER,
                        id = %registration.id,
                        observer = %registration.observer.name(),
                        error = %failure,
                        "removing failed observer"
                    );
                    self.remove(registration.id);
                    report.evicted.push(registration.id);
                }
            }
        }
        report
    }
}

impl ObserverRegistry {
    /// Register an observer that is removed when the returned guard drops.
    pub fn add_scoped<O: Observer>(self: &Arc<Self>, observer: O) -> ObserverGuard {
        let id = self.add(observer);
        ObserverGuard {
            registry: Arc::downgrade(self),
            id: Some(id),
        }
    }
}

impl fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.ids())
            .finish()
    }
}

static_assertions::assert_impl_all!(ObserverRegistry: Send, Sync);

fn invoke(observer: &dyn Observer, payload: &[u8], sender: SocketAddr) -> Result<(), ObserverFailure> {
    match panic::catch_unwind(AssertUnwindSafe(|| observer.receive(payload, sender))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(ObserverFailure::Error(err)),
        Err(panic) => Err(ObserverFailure::Panicked(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Removes its observer from the registry when dropped.
///
/// Created via [`ObserverRegistry::add_scoped`]. The guard only holds a weak
/// reference, so it does not keep the registry alive.
///
/// # Example
///
/// ```
/// use std::net::SocketAddr;
/// use std::sync::Arc;
/// use cotcast_core::ObserverRegistry;
///
/// let registry = Arc::new(ObserverRegistry::new());
/// {
///     let _guard = registry.add_scoped(|_: &[u8], _: SocketAddr| Ok(()));
///     assert_eq!(registry.len(), 1);
/// }
/// assert!(registry.is_empty());
/// ```
#[must_use = "the observer is removed as soon as the guard is dropped"]
pub struct ObserverGuard {
    registry: Weak<ObserverRegistry>,
    id: Option<ObserverId>,
}

impl ObserverGuard {
    /// Get the id of the guarded observer.
    pub fn id(&self) -> Option<ObserverId> {
        self.id
    }

    /// Keep the observer registered and return its id.
    pub fn release(mut self) -> Option<ObserverId> {
        self.id.take()
    }
}

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        if let (Some(id), Some(registry)) = (self.id.take(), self.registry.upgrade()) {
            registry.remove(id);
        }
    }
}

impl fmt::Debug for ObserverGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverGuard").field("id", &self.id).finish()
    }
}
