//! In-flight authorizations keyed by OAuth `state`
//!
//! Each registration owns a oneshot channel. Whoever removes the entry from
//! the map owns the sender, so an outcome is delivered at most once, and a
//! send to a waiter that already gave up is just a failed send.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::error::{AuthorizationError, Result, SocialcastError};
use crate::types::ManagedPage;

/// What the callback hands back to a waiting connect request
pub type AuthorizationOutcome = std::result::Result<Vec<ManagedPage>, AuthorizationError>;

struct Entry {
    ticket: u64,
    sender: oneshot::Sender<AuthorizationOutcome>,
}

#[derive(Default)]
struct Inner {
    entries: Mutex<HashMap<String, Entry>>,
    next_ticket: AtomicU64,
}

#[derive(Clone, Default)]
pub struct PendingAuthorizations {
    inner: Arc<Inner>,
}

impl PendingAuthorizations {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a waiter for `state`.
    ///
    /// A waiter already registered for the same state is told it was
    /// superseded; the newest registration wins.
    pub fn register(&self, state: &str) -> PendingHandle {
        let ticket = self.inner.next_ticket.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();

        let replaced = self
            .entries()
            .insert(state.to_string(), Entry { ticket, sender });

        if let Some(old) = replaced {
            info!("Replacing pending authorization for {}", state);
            let _ = old.sender.send(Err(AuthorizationError::Superseded));
        }
        debug!("Registered pending authorization for {}", state);

        PendingHandle {
            state: state.to_string(),
            ticket,
            receiver: Some(receiver),
            registry: self.clone(),
        }
    }

    /// Deliver an outcome to the waiter for `state`.
    ///
    /// Returns `false` when nobody is waiting anymore. That is never an error.
    pub fn resolve(&self, state: &str, outcome: AuthorizationOutcome) -> bool {
        let entry = self.entries().remove(state);
        match entry {
            Some(entry) => entry.sender.send(outcome).is_ok(),
            None => false,
        }
    }

    /// Fail every outstanding waiter with `Cancelled`, returning how many there were
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<Entry> = self.entries().drain().map(|(_, entry)| entry).collect();
        let count = drained.len();
        for entry in drained {
            let _ = entry.sender.send(Err(AuthorizationError::Cancelled));
        }
        count
    }

    pub fn contains(&self, state: &str) -> bool {
        self.entries().contains_key(state)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, state: &str, ticket: u64) {
        let mut entries = self.entries();
        if entries.get(state).map(|e| e.ticket) == Some(ticket) {
            entries.remove(state);
            debug!("Released pending authorization for {}", state);
        }
    }
}

/// The waiting side of one registration.
///
/// Dropping the handle removes its registration, whatever path the caller
/// took out of the wait.
pub struct PendingHandle {
    state: String,
    ticket: u64,
    receiver: Option<oneshot::Receiver<AuthorizationOutcome>>,
    registry: PendingAuthorizations,
}

impl PendingHandle {
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Wait for the callback, giving up after `timeout`
    pub async fn wait(mut self, timeout: Duration) -> Result<Vec<ManagedPage>> {
        let receiver = match self.receiver.take() {
            Some(receiver) => receiver,
            None => return Err(AuthorizationError::Cancelled.into()),
        };

        let outcome = tokio::time::timeout(timeout, receiver).await;
        self.registry.release(&self.state, self.ticket);

        match outcome {
            Err(_) => {
                info!("Authorization for {} timed out after {:?}", self.state, timeout);
                Err(SocialcastError::Timeout(timeout))
            }
            Ok(Err(_)) => Err(AuthorizationError::Cancelled.into()),
            Ok(Ok(Ok(pages))) => Ok(pages),
            Ok(Ok(Err(e))) => Err(e.into()),
        }
    }
}

impl Drop for PendingHandle {
    fn drop(&mut self) {
        self.registry.release(&self.state, self.ticket);
    }
}
