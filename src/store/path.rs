//! Document and collection paths
//!
//! Paths alternate collection and document ids, `tests/123456` for a test
//! and `tests/123456/responses/<student>` for one participant record.

use std::fmt::Display;

use itertools::Itertools;

use crate::{join_code::JoinCode, participant::StudentId};

const TESTS: &str = "tests";
const RESPONSES: &str = "responses";

/// Path of a single document (an even number of segments)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocPath {
    collection: CollectionPath,
    id: String,
}

/// Path of a collection (an odd number of segments)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CollectionPath(Vec<String>);

impl CollectionPath {
    /// A top-level collection
    pub fn root(name: &str) -> Self {
        Self(vec![name.to_owned()])
    }

    /// The document `id` inside this collection
    pub fn doc(&self, id: impl Display) -> DocPath {
        DocPath {
            collection: self.clone(),
            id: id.to_string(),
        }
    }
}

impl DocPath {
    /// The sub-collection `name` of this document
    pub fn collection(&self, name: &str) -> CollectionPath {
        let mut segments = self.collection.0.clone();
        segments.push(self.id.clone());
        segments.push(name.to_owned());
        CollectionPath(segments)
    }

    /// The collection this document lives in
    pub fn parent(&self) -> &CollectionPath {
        &self.collection
    }

    /// The last segment of the path
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Display for CollectionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.iter().join("/"))
    }
}

impl Display for DocPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// The collection of all tests
pub fn tests() -> CollectionPath {
    CollectionPath::root(TESTS)
}

/// The test document for `code`
pub fn test(code: JoinCode) -> DocPath {
    tests().doc(code)
}

/// The participant records of the test `code`
pub fn responses(code: JoinCode) -> CollectionPath {
    test(code).collection(RESPONSES)
}

/// The participant record of `student` in the test `code`
pub fn response(code: JoinCode, student: StudentId) -> DocPath {
    responses(code).doc(student)
}
