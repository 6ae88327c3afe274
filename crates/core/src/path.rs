//! Collection, document, and field path types.
//!
//! Paths follow the document-store convention of alternating collection and
//! document segments: `users` is a collection, `users/alice` a document, and
//! `waves/w1/splashes` a subcollection of the `waves/w1` document.

use serde::{Deserialize, Serialize};
use std::fmt;

fn split_segments(path: &str) -> Option<Vec<&str>> {
    let segments: Vec<&str> = path.split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return None;
    }
    Some(segments)
}

/// A path naming a collection (odd number of segments).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CollectionPath(String);

impl CollectionPath {
    /// Parse a collection path, validating segment structure.
    pub fn parse(path: &str) -> crate::Result<Self> {
        let segments = split_segments(path).ok_or_else(|| {
            crate::Error::InvalidCollectionPath(format!("empty segment in '{path}'"))
        })?;
        if segments.len() % 2 == 0 {
            return Err(crate::Error::InvalidCollectionPath(format!(
                "'{path}' has {} segments, a collection needs an odd count",
                segments.len()
            )));
        }
        Ok(Self(path.to_string()))
    }

    /// Reference a document inside this collection.
    pub fn doc(&self, id: &str) -> crate::Result<DocRef> {
        if id.is_empty() || id.contains('/') {
            return Err(crate::Error::InvalidDocumentPath(format!(
                "invalid document id '{id}' in {self}"
            )));
        }
        Ok(DocRef {
            collection: self.clone(),
            id: id.to_string(),
        })
    }

    /// The last segment, e.g. `splashes` for `waves/w1/splashes`.
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// The document owning this collection, if it is a subcollection.
    pub fn parent(&self) -> Option<DocRef> {
        let (parent, _) = self.0.rsplit_once('/')?;
        DocRef::parse(parent).ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CollectionPath {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<CollectionPath> for String {
    fn from(value: CollectionPath) -> Self {
        value.0
    }
}

impl fmt::Debug for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CollectionPath({})", self.0)
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A reference to a single document: its collection plus its id.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocRef {
    collection: CollectionPath,
    id: String,
}

impl DocRef {
    /// Parse a full document path such as `waves/w1`.
    pub fn parse(path: &str) -> crate::Result<Self> {
        let (collection, id) = path.rsplit_once('/').ok_or_else(|| {
            crate::Error::InvalidDocumentPath(format!("'{path}' has no collection segment"))
        })?;
        let collection = CollectionPath::parse(collection)
            .map_err(|e| crate::Error::InvalidDocumentPath(format!("'{path}': {e}")))?;
        collection.doc(id)
    }

    pub fn collection_path(&self) -> &CollectionPath {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Path of a subcollection nested under this document.
    pub fn collection(&self, name: &str) -> crate::Result<CollectionPath> {
        if name.is_empty() || name.contains('/') {
            return Err(crate::Error::InvalidCollectionPath(format!(
                "invalid subcollection name '{name}' under {self}"
            )));
        }
        Ok(CollectionPath(format!("{}/{}", self.path(), name)))
    }

    /// The full slash-separated path.
    pub fn path(&self) -> String {
        format!("{}/{}", self.collection, self.id)
    }
}

impl TryFrom<String> for DocRef {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<DocRef> for String {
    fn from(value: DocRef) -> Self {
        value.path()
    }
}

impl fmt::Debug for DocRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocRef({}/{})", self.collection, self.id)
    }
}

impl fmt::Display for DocRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// A dotted path into a document's fields, e.g. `counts.splashes`.
///
/// Segments are restricted to ASCII alphanumerics and `_` so they can be
/// embedded in SQLite JSON paths without quoting.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath(String);

impl FieldPath {
    pub fn parse(path: &str) -> crate::Result<Self> {
        if path.is_empty() {
            return Err(crate::Error::InvalidFieldPath("empty field path".to_string()));
        }
        for segment in path.split('.') {
            if segment.is_empty()
                || !segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                return Err(crate::Error::InvalidFieldPath(format!(
                    "invalid segment '{segment}' in '{path}'"
                )));
            }
        }
        Ok(Self(path.to_string()))
    }

    /// Append a child segment: `counts` + `splashes` -> `counts.splashes`.
    pub fn child(&self, segment: &str) -> crate::Result<Self> {
        Self::parse(&format!("{}.{}", self.0, segment))
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// SQLite JSON path form (`$.counts.splashes`).
    pub fn json_path(&self) -> String {
        format!("$.{}", self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for FieldPath {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<FieldPath> for String {
    fn from(value: FieldPath) -> Self {
        value.0
    }
}

impl fmt::Debug for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldPath({})", self.0)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
