//! Session context
//!
//! A [`SessionContext`] is everything one device needs to talk to the
//! shared store: the store itself, a clock, the runtime options, and an
//! inbox collecting the snapshots of the subscriptions it owns. Releasing or
//! dropping the context unsubscribes everything it watched.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc,
        mpsc::{Receiver, Sender, channel},
    },
};

use web_time::SystemTime;

use crate::{
    clock::Clock,
    config::Options,
    store::{self, DocumentStore, Snapshot, Subscription, Target},
};

/// Handle to one watched target within a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WatchId(u64);

/// Store access and subscriptions owned by one device
pub struct SessionContext {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    options: Options,
    sender: Sender<(WatchId, Snapshot)>,
    inbox: Receiver<(WatchId, Snapshot)>,
    subscriptions: HashMap<WatchId, Subscription>,
    next_watch: u64,
}

impl SessionContext {
    /// Creates a context with no subscriptions
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>, options: Options) -> Self {
        let (sender, inbox) = channel();
        Self {
            store,
            clock,
            options,
            sender,
            inbox,
            subscriptions: HashMap::new(),
            next_watch: 0,
        }
    }

    /// A new context sharing this one's store, clock and options
    ///
    /// The fork starts without subscriptions and has its own inbox.
    pub fn fork(&self) -> Self {
        Self::new(
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
            self.options.clone(),
        )
    }

    /// The shared store
    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    /// The runtime options
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// The device's wall-clock time
    pub fn now(&self) -> SystemTime {
        self.clock.now()
    }

    /// Subscribes to `target`, delivering snapshots into the inbox
    ///
    /// The current state is queued right away.
    ///
    /// # Errors
    ///
    /// Returns the store error if the subscription cannot be opened.
    pub fn watch(&mut self, target: Target) -> Result<WatchId, store::Error> {
        let id = WatchId(self.next_watch);
        self.next_watch += 1;
        let sender = self.sender.clone();
        let subscription = self.store.subscribe(
            target,
            Box::new(move |snapshot: Snapshot| {
                // the receiver is gone only when the context is being dropped
                sender.send((id, snapshot)).ok();
            }),
        )?;
        self.subscriptions.insert(id, subscription);
        Ok(id)
    }

    /// Stops watching `id`; queued snapshots for it are discarded
    pub fn unwatch(&mut self, id: WatchId) {
        if let Some(subscription) = self.subscriptions.remove(&id) {
            subscription.unsubscribe();
        }
    }

    /// Whether `id` is still watched
    pub fn is_watching(&self, id: WatchId) -> bool {
        self.subscriptions.contains_key(&id)
    }

    /// Takes all queued snapshots, keeping only the latest per watch
    pub fn drain(&mut self) -> BTreeMap<WatchId, Snapshot> {
        let mut latest = BTreeMap::new();
        let mut received = 0usize;
        for (id, snapshot) in self.inbox.try_iter() {
            received += 1;
            if self.subscriptions.contains_key(&id) {
                latest.insert(id, snapshot);
            }
        }
        if received > latest.len() {
            tracing::debug!(received, kept = latest.len(), "coalesced notifications");
        }
        latest
    }

    /// Unsubscribes from everything
    pub fn release(&mut self) {
        for (_, subscription) in self.subscriptions.drain() {
            subscription.unsubscribe();
        }
        while self.inbox.try_recv().is_ok() {}
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("options", &self.options)
            .field("subscriptions", &self.subscriptions.len())
            .finish_non_exhaustive()
    }
}
