//! Schema-less manifest documents
//!
//! A [`Document`] holds any Kubernetes manifest or API response body as a JSON
//! object. Reads go through [`Node`], which turns a missing path into
//! [`Node::Absent`] instead of failing; writes materialize every missing
//! ancestor as an empty object.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A nested key/value document. The root is always a JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct Document(Value);

/// Read-only view of a value inside a [`Document`].
///
/// `Absent` is the placeholder returned for paths that were never written.
/// It compares as empty, chains further lookups, and never touches the
/// underlying map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Node<'a> {
    Absent,
    Present(&'a Value),
}

impl Default for Document {
    fn default() -> Self {
        Self(Value::Object(Map::new()))
    }
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Root view of the document
    pub fn root(&self) -> Node<'_> {
        Node::Present(&self.0)
    }

    /// Read the value at a dotted path (`metadata.labels.app`).
    ///
    /// Numeric segments index into sequences. Any missing segment yields
    /// [`Node::Absent`].
    pub fn get(&self, path: &str) -> Node<'_> {
        self.root().path(path)
    }

    /// Shorthand for `get(path).as_str()`
    pub fn str(&self, path: &str) -> Option<&str> {
        self.get(path).as_str()
    }

    pub fn contains(&self, path: &str) -> bool {
        !self.get(path).is_absent()
    }

    /// Assign `value` at a dotted path, creating intermediate objects.
    ///
    /// An intermediate scalar or null is replaced by an empty object. A
    /// sequence index past the end appends rather than padding with nulls.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) {
        *self.slot(path) = value.into();
    }

    /// Mutable access to the object at `path`, created empty if missing.
    ///
    /// Use this for maps whose keys contain dots, such as labels and
    /// annotations.
    pub fn map_mut(&mut self, path: &str) -> &mut Map<String, Value> {
        ensure_object(self.slot(path))
    }

    /// Remove the value at `path`, returning it if it was present.
    pub fn remove(&mut self, path: &str) -> Option<Value> {
        match path.rsplit_once('.') {
            None => ensure_object(&mut self.0).remove(path),
            Some((parent, leaf)) => {
                if !self.get(parent).is_object() {
                    return None;
                }
                self.map_mut(parent).remove(leaf)
            }
        }
    }

    /// Recursively convert into plain JSON.
    ///
    /// Placeholders are never stored, so the result only contains values
    /// that were actually assigned.
    pub fn to_primitive(&self) -> Value {
        self.0.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.root().is_empty()
    }

    pub fn kind(&self) -> Option<&str> {
        self.str("kind")
    }

    pub fn name(&self) -> Option<&str> {
        self.str("metadata.name")
    }

    pub fn namespace(&self) -> Option<&str> {
        self.str("metadata.namespace")
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.get("metadata.labels").key(key).as_str()
    }

    fn slot(&mut self, path: &str) -> &mut Value {
        let mut slot = &mut self.0;
        for segment in path.split('.') {
            slot = child_mut(slot, segment);
        }
        slot
    }
}

impl<'a> Node<'a> {
    /// Look up a single key (or sequence index) without splitting on dots.
    pub fn key(self, key: &str) -> Node<'a> {
        let Node::Present(value) = self else {
            return Node::Absent;
        };
        let found = match value {
            Value::Object(map) => map.get(key),
            Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        found.map_or(Node::Absent, Node::Present)
    }

    /// Follow a dotted path from this node.
    pub fn path(self, path: &str) -> Node<'a> {
        path.split('.').fold(self, Node::key)
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Node::Absent)
    }

    /// Absent, null, `false`, zero, and empty strings, maps, and sequences
    /// all count as empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Node::Absent | Node::Present(Value::Null) => true,
            Node::Present(Value::Bool(b)) => !b,
            Node::Present(Value::Number(n)) => n.as_f64() == Some(0.0),
            Node::Present(Value::String(s)) => s.is_empty(),
            Node::Present(Value::Array(items)) => items.is_empty(),
            Node::Present(Value::Object(map)) => map.is_empty(),
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Node::Present(Value::Object(_)))
    }

    pub fn value(self) -> Option<&'a Value> {
        match self {
            Node::Present(Value::Null) | Node::Absent => None,
            Node::Present(value) => Some(value),
        }
    }

    pub fn as_str(self) -> Option<&'a str> {
        self.value().and_then(Value::as_str)
    }

    pub fn as_i64(self) -> Option<i64> {
        self.value().and_then(Value::as_i64)
    }

    pub fn as_bool(self) -> Option<bool> {
        self.value().and_then(Value::as_bool)
    }

    /// Elements of a sequence; empty for anything else.
    pub fn items(self) -> impl Iterator<Item = Node<'a>> {
        let items: &'a [Value] = match self {
            Node::Present(Value::Array(items)) => items,
            _ => &[],
        };
        items.iter().map(Node::Present)
    }

    /// Key/value pairs of an object; empty for anything else.
    pub fn entries(self) -> impl Iterator<Item = (&'a str, Node<'a>)> {
        let map = match self {
            Node::Present(Value::Object(map)) => Some(map),
            _ => None,
        };
        map.into_iter()
            .flat_map(|map| map.iter())
            .map(|(k, v)| (k.as_str(), Node::Present(v)))
    }

    /// Copy an object node into a standalone document.
    pub fn to_document(self) -> Document {
        match self {
            Node::Present(Value::Object(map)) => Document::from(map.clone()),
            _ => Document::new(),
        }
    }
}

impl PartialEq<&str> for Node<'_> {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == Some(*other)
    }
}

/// An index at or past the end of a sequence appends one element.
fn child_mut<'a>(value: &'a mut Value, segment: &str) -> &'a mut Value {
    if let (Value::Array(items), Ok(index)) = (&mut *value, segment.parse::<usize>()) {
        let index = if index < items.len() {
            index
        } else {
            items.push(Value::Null);
            items.len() - 1
        };
        return &mut value[index];
    }
    ensure_object(value).entry(segment).or_insert(Value::Null)
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was replaced with an object above"),
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Self(Value::Object(map))
    }
}

impl From<Document> for Map<String, Value> {
    fn from(doc: Document) -> Self {
        match doc.0 {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

impl TryFrom<Value> for Document {
    type Error = serde_json::Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Null => Ok(Self::default()),
            other => serde_json::from_value(other),
        }
    }
}

impl PartialEq<Value> for Document {
    fn eq(&self, other: &Value) -> bool {
        &self.0 == other
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string_pretty(&self.0) {
            Ok(text) => f.write_str(&text),
            Err(_) => write!(f, "{:?}", self.0),
        }
    }
}
