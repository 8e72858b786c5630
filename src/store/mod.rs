//! Document store abstraction
//!
//! All coordination between the teacher's and the students' devices goes
//! through a shared document store. The core relies only on point reads,
//! point writes with field-level merge, deletes, live subscriptions and a
//! collection scan with one equality filter and an optional ordering.

pub mod memory;
pub mod path;

use std::cmp::Ordering;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;
use web_time::SystemTime;

pub use memory::MemoryStore;
pub use path::{CollectionPath, DocPath};

/// A stored document, a JSON object
pub type Document = serde_json::Map<String, Value>;

/// How a write combines with the stored document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Write {
    /// The document is replaced as a whole
    Replace,
    /// Fields are merged recursively into the stored document
    Merge,
}

/// Single-field equality filter
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    /// Field name at the top level of the document
    pub field: String,
    /// Value the field must equal
    pub value: Value,
}

/// Result ordering on a single field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// Field name at the top level of the document
    pub field: String,
    /// Largest values first
    pub descending: bool,
}

/// A collection scan
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Collection to scan
    pub collection: CollectionPath,
    /// Optional equality filter
    pub filter: Option<Filter>,
    /// Optional ordering
    pub order_by: Option<OrderBy>,
}

impl Query {
    /// Scans every document of `collection`
    pub fn all(collection: CollectionPath) -> Self {
        Self {
            collection,
            filter: None,
            order_by: None,
        }
    }

    /// Keeps only documents whose `field` equals `value`
    #[must_use]
    pub fn filter(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filter = Some(Filter {
            field: field.to_owned(),
            value: value.into(),
        });
        self
    }

    /// Orders the results on `field`
    #[must_use]
    pub fn order_by(mut self, field: &str, descending: bool) -> Self {
        self.order_by = Some(OrderBy {
            field: field.to_owned(),
            descending,
        });
        self
    }

    /// Whether `doc` passes the filter
    pub fn matches(&self, doc: &Document) -> bool {
        self.filter
            .as_ref()
            .is_none_or(|filter| doc.get(&filter.field) == Some(&filter.value))
    }

    /// Sorts `docs` according to the ordering, if any
    pub fn sort(&self, docs: &mut [(DocPath, Document)]) {
        let Some(order) = &self.order_by else {
            return;
        };
        docs.sort_by(|(_, a), (_, b)| {
            let ordering = compare_fields(a.get(&order.field), b.get(&order.field));
            match (order.descending, a.get(&order.field), b.get(&order.field)) {
                // missing fields stay last in both directions
                (true, Some(_), Some(_)) => ordering.reverse(),
                _ => ordering,
            }
        });
    }
}

fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

/// What a subscription watches
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// One document
    Document(DocPath),
    /// The results of a query
    Query(Query),
}

/// The state delivered to a subscriber
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    /// Current content of a watched document, `None` once deleted
    Document(Option<Document>),
    /// Current results of a watched query
    Query(Vec<(DocPath, Document)>),
}

/// Receives snapshots of a subscription's target
pub type Callback = Box<dyn Fn(Snapshot) + Send + Sync>;

/// Handle to a live subscription
///
/// Dropping the handle unsubscribes.
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wraps the function that tears the subscription down
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Unsubscribes now
    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Errors reported by a document store
#[derive(Error, Debug)]
pub enum Error {
    /// The store cannot order this query, typically a missing index
    #[error("ordering on {field} is not supported for {collection}")]
    QueryUnsupported {
        /// Collection that was queried
        collection: CollectionPath,
        /// Field the query tried to order on
        field: String,
    },
    /// The store could not be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// A document did not have the expected shape
    #[error("malformed document: {0}")]
    Codec(#[from] serde_json::Error),
}

/// A shared document store
pub trait DocumentStore: Send + Sync {
    /// Reads one document
    ///
    /// # Errors
    ///
    /// Returns `Error::Unavailable` when the store cannot be reached.
    fn get(&self, path: &DocPath) -> Result<Option<Document>, Error>;

    /// Writes one document, replacing or merging
    ///
    /// # Errors
    ///
    /// Returns `Error::Unavailable` when the store cannot be reached.
    fn set(&self, path: &DocPath, doc: Document, write: Write) -> Result<(), Error>;

    /// Deletes one document, succeeding if it does not exist
    ///
    /// # Errors
    ///
    /// Returns `Error::Unavailable` when the store cannot be reached.
    fn delete(&self, path: &DocPath) -> Result<(), Error>;

    /// Runs a collection scan
    ///
    /// # Errors
    ///
    /// Returns `Error::QueryUnsupported` if the ordering cannot be served.
    fn query(&self, query: &Query) -> Result<Vec<(DocPath, Document)>, Error>;

    /// Subscribes to a document or query
    ///
    /// The callback receives the current state right away and again after
    /// every write affecting the target. Intermediate states may be skipped.
    ///
    /// # Errors
    ///
    /// Returns `Error::QueryUnsupported` if the ordering cannot be served.
    fn subscribe(&self, target: Target, callback: Callback) -> Result<Subscription, Error>;

    /// The store's own notion of the current time
    fn server_time(&self) -> SystemTime;
}

/// Runs `query`, falling back to an unordered scan sorted locally
///
/// # Errors
///
/// Propagates any error other than `Error::QueryUnsupported`.
pub fn query_with_fallback<S: DocumentStore + ?Sized>(
    store: &S,
    query: &Query,
) -> Result<Vec<(DocPath, Document)>, Error> {
    match store.query(query) {
        Err(Error::QueryUnsupported { collection, field }) => {
            tracing::debug!(%collection, %field, "ordered query unsupported, scanning");
            let unordered = Query {
                order_by: None,
                ..query.clone()
            };
            let mut docs = store.query(&unordered)?;
            query.sort(&mut docs);
            Ok(docs)
        }
        result => result,
    }
}

/// Merges `patch` into `target` field by field
///
/// Nested objects are merged recursively, every other value replaces the
/// stored one.
pub fn merge(target: &mut Document, patch: Document) {
    for (key, value) in patch {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(nested)) => merge(existing, nested),
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

/// Encodes a typed record as a document
///
/// # Errors
///
/// Returns `Error::Codec` if the record does not serialize to an object.
pub fn encode<T: Serialize>(record: &T) -> Result<Document, Error> {
    match serde_json::to_value(record)? {
        Value::Object(doc) => Ok(doc),
        other => Err(Error::Codec(serde::de::Error::custom(format!(
            "expected an object, found {other}"
        )))),
    }
}

/// Decodes a document into a typed record
///
/// # Errors
///
/// Returns `Error::Codec` if the document does not have the expected shape.
pub fn decode<T: DeserializeOwned>(doc: Document) -> Result<T, Error> {
    Ok(serde_json::from_value(Value::Object(doc))?)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_merge_is_field_level() {
        let mut stored = doc(json!({
            "name": "Ada",
            "tabStatus": "Active",
            "answers": { "q0": 1, "q1": [0, 2] },
        }));
        merge(&mut stored, doc(json!({ "answers": { "q1": [2] } })));
        merge(&mut stored, doc(json!({ "tabStatus": "Out of Tab" })));

        assert_eq!(
            Value::Object(stored),
            json!({
                "name": "Ada",
                "tabStatus": "Out of Tab",
                "answers": { "q0": 1, "q1": [2] },
            })
        );
    }

    #[test]
    fn test_merge_replaces_non_objects() {
        let mut stored = doc(json!({ "answers": 3 }));
        merge(&mut stored, doc(json!({ "answers": { "q0": 1 } })));
        assert_eq!(stored["answers"], json!({ "q0": 1 }));
    }

    #[test]
    fn test_query_matches() {
        let query = Query::all(path::tests()).filter("teacherId", "t1");
        assert!(query.matches(&doc(json!({ "teacherId": "t1" }))));
        assert!(!query.matches(&doc(json!({ "teacherId": "t2" }))));
        assert!(!query.matches(&doc(json!({}))));
        assert!(Query::all(path::tests()).matches(&doc(json!({}))));
    }

    #[test]
    fn test_query_sort_descending_missing_last() {
        let query = Query::all(path::tests()).order_by("createdAt", true);
        let mut docs = vec![
            (path::tests().doc("a"), doc(json!({ "createdAt": 1 }))),
            (path::tests().doc("b"), doc(json!({}))),
            (path::tests().doc("c"), doc(json!({ "createdAt": 3 }))),
        ];
        query.sort(&mut docs);
        let ids: Vec<_> = docs.iter().map(|(p, _)| p.id().to_owned()).collect();
        assert_eq!(ids, ["c", "a", "b"]);
    }

    #[test]
    fn test_encode_rejects_non_objects() {
        assert!(matches!(encode(&3), Err(Error::Codec(_))));
        let encoded = encode(&json!({ "a": 1 })).unwrap();
        assert_eq!(encoded["a"], 1);
    }

    #[test]
    fn test_subscription_cancels_once() {
        use std::sync::{
            Arc,
            atomic::{AtomicUsize, Ordering as AtomicOrdering},
        };

        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let subscription = Subscription::new(move || {
            counter.fetch_add(1, AtomicOrdering::SeqCst);
        });
        subscription.unsubscribe();
        assert_eq!(count.load(AtomicOrdering::SeqCst), 1);

        let counter = Arc::clone(&count);
        drop(Subscription::new(move || {
            counter.fetch_add(1, AtomicOrdering::SeqCst);
        }));
        assert_eq!(count.load(AtomicOrdering::SeqCst), 2);
    }
}
