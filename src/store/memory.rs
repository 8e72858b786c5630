//! In-process document store
//!
//! [`MemoryStore`] implements [`DocumentStore`] on a mutex-guarded map.
//! Clones share the same data, so every simulated device in a test talks to
//! one store. Callbacks run after the data lock has been released, one write
//! at a time and in write order. A callback may read from the store but must
//! not write to it.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use web_time::SystemTime;

use super::{
    Callback, DocPath, Document, DocumentStore, Error, Query, Snapshot, Subscription, Target,
    Write, merge,
};
use crate::clock::{Clock, SystemClock};

/// An applied write, as recorded by the journal
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    /// A document was written
    Set {
        /// Written path
        path: DocPath,
        /// Document or patch as sent
        doc: Document,
        /// Replace or merge
        write: Write,
    },
    /// A document was deleted
    Delete {
        /// Deleted path
        path: DocPath,
    },
}

impl Entry {
    /// The path this entry touched
    pub fn path(&self) -> &DocPath {
        match self {
            Self::Set { path, .. } | Self::Delete { path } => path,
        }
    }
}

struct Subscriber {
    id: u64,
    target: Target,
    callback: Arc<Callback>,
}

#[derive(Default)]
struct Inner {
    documents: BTreeMap<DocPath, Document>,
    subscribers: Vec<Subscriber>,
    next_subscriber: u64,
    journal: Vec<Entry>,
    ordered_queries: bool,
    offline: bool,
}

impl Inner {
    fn run(&self, query: &Query) -> Vec<(DocPath, Document)> {
        let mut docs: Vec<_> = self
            .documents
            .iter()
            .filter(|(path, doc)| path.parent() == &query.collection && query.matches(doc))
            .map(|(path, doc)| (path.clone(), doc.clone()))
            .collect();
        query.sort(&mut docs);
        docs
    }

    fn check_order(&self, query: &Query) -> Result<(), Error> {
        match &query.order_by {
            Some(order) if !self.ordered_queries => Err(Error::QueryUnsupported {
                collection: query.collection.clone(),
                field: order.field.clone(),
            }),
            _ => Ok(()),
        }
    }

    fn snapshot(&self, target: &Target) -> Snapshot {
        match target {
            Target::Document(path) => Snapshot::Document(self.documents.get(path).cloned()),
            Target::Query(query) => Snapshot::Query(self.run(query)),
        }
    }

    fn affected_by(&self, changed: &DocPath) -> Vec<(Arc<Callback>, Snapshot)> {
        self.subscribers
            .iter()
            .filter(|s| match &s.target {
                Target::Document(path) => path == changed,
                Target::Query(query) => changed.parent() == &query.collection,
            })
            .map(|s| (Arc::clone(&s.callback), self.snapshot(&s.target)))
            .collect()
    }

    fn ensure_online(&self) -> Result<(), Error> {
        if self.offline {
            Err(Error::Unavailable("store is offline".to_owned()))
        } else {
            Ok(())
        }
    }
}

/// Thread-safe in-memory document store
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    delivery: Arc<Mutex<()>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl MemoryStore {
    /// Creates an empty store whose server time comes from `clock`
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                ordered_queries: true,
                ..Inner::default()
            })),
            delivery: Arc::default(),
            clock,
        }
    }

    /// Makes ordered queries fail, as a store without a matching index does
    #[must_use]
    pub fn without_ordered_queries(self) -> Self {
        self.lock().ordered_queries = false;
        self
    }

    /// Makes every read and write fail until switched back
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Returns every applied write in order
    pub fn journal(&self) -> Vec<Entry> {
        self.lock().journal.clone()
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver_in_order(&self) -> MutexGuard<'_, ()> {
        self.delivery.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(pending: Vec<(Arc<Callback>, Snapshot)>) {
        for (callback, snapshot) in pending {
            callback(snapshot);
        }
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, path: &DocPath) -> Result<Option<Document>, Error> {
        let inner = self.lock();
        inner.ensure_online()?;
        Ok(inner.documents.get(path).cloned())
    }

    fn set(&self, path: &DocPath, doc: Document, write: Write) -> Result<(), Error> {
        let _delivery = self.deliver_in_order();
        let pending = {
            let mut inner = self.lock();
            inner.ensure_online()?;
            inner.journal.push(Entry::Set {
                path: path.clone(),
                doc: doc.clone(),
                write,
            });
            match write {
                Write::Replace => {
                    inner.documents.insert(path.clone(), doc);
                }
                Write::Merge => merge(inner.documents.entry(path.clone()).or_default(), doc),
            }
            inner.affected_by(path)
        };
        Self::notify(pending);
        Ok(())
    }

    fn delete(&self, path: &DocPath) -> Result<(), Error> {
        let _delivery = self.deliver_in_order();
        let pending = {
            let mut inner = self.lock();
            inner.ensure_online()?;
            if inner.documents.remove(path).is_none() {
                return Ok(());
            }
            inner.journal.push(Entry::Delete { path: path.clone() });
            inner.affected_by(path)
        };
        Self::notify(pending);
        Ok(())
    }

    fn query(&self, query: &Query) -> Result<Vec<(DocPath, Document)>, Error> {
        let inner = self.lock();
        inner.ensure_online()?;
        inner.check_order(query)?;
        Ok(inner.run(query))
    }

    fn subscribe(&self, target: Target, callback: Callback) -> Result<Subscription, Error> {
        let callback = Arc::new(callback);
        let _delivery = self.deliver_in_order();
        let (id, initial) = {
            let mut inner = self.lock();
            if let Target::Query(query) = &target {
                inner.check_order(query)?;
            }
            let id = inner.next_subscriber;
            inner.next_subscriber += 1;
            let initial = inner.snapshot(&target);
            inner.subscribers.push(Subscriber {
                id,
                target,
                callback: Arc::clone(&callback),
            });
            (id, initial)
        };
        callback(initial);

        let weak: Weak<Mutex<Inner>> = Arc::downgrade(&self.inner);
        Ok(Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .subscribers
                    .retain(|s| s.id != id);
            }
        }))
    }

    fn server_time(&self) -> SystemTime {
        self.clock.now()
    }
}
