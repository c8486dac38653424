//! Vote fan-out to registered listeners.
//!
//! Listeners are collected in a [`ListenerRegistry`] at startup and frozen
//! into a [`Dispatcher`] before the server starts accepting. The frozen list
//! is shared by every connection task and never changes afterwards.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use votifier_protocol::Vote;

/// Error returned by a listener callback.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Receives every successfully decoded vote.
///
/// Callbacks run on a blocking thread and may perform blocking I/O. A
/// failing or panicking listener does not prevent later listeners from
/// seeing the vote.
pub trait VoteListener: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Handles one vote.
    fn on_vote(&self, vote: &Vote) -> Result<(), ListenerError>;
}

/// Mutable listener collection used during startup.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Vec<Arc<dyn VoteListener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a listener; listeners are invoked in registration order.
    pub fn register(&mut self, listener: impl VoteListener + 'static) -> &mut Self {
        self.listeners.push(Arc::new(listener));
        self
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Freezes the registry into an immutable dispatcher.
    pub fn freeze(self) -> Dispatcher {
        Dispatcher {
            listeners: self.listeners.into(),
        }
    }
}

/// Outcome of dispatching one vote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Listeners that returned Ok.
    pub delivered: usize,
    /// Names of listeners that returned an error or panicked.
    pub failed: Vec<String>,
}

impl DispatchReport {
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Immutable, cheaply clonable listener list.
#[derive(Clone)]
pub struct Dispatcher {
    listeners: Arc<[Arc<dyn VoteListener>]>,
}

impl Dispatcher {
    /// Dispatcher with no listeners.
    pub fn empty() -> Self {
        ListenerRegistry::new().freeze()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Delivers the vote to every listener in registration order.
    pub fn dispatch(&self, vote: &Vote) -> DispatchReport {
        let mut report = DispatchReport::default();

        for listener in self.listeners.iter() {
            match catch_unwind(AssertUnwindSafe(|| listener.on_vote(vote))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    tracing::warn!("Listener {} failed to handle {}: {}", listener.name(), vote, e);
                    report.failed.push(listener.name().to_string());
                }
                Err(panic) => {
                    tracing::error!(
                        "Listener {} panicked while handling {}: {}",
                        listener.name(),
                        vote,
                        panic_message(&*panic)
                    );
                    report.failed.push(listener.name().to_string());
                }
            }
        }

        report
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.listeners.iter().map(|l| l.name()).collect();
        f.debug_struct("Dispatcher")
            .field("listeners", &names)
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
