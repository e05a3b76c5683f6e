//! Keys identifying tracked state
//!
//! A `StreamKey` names one table. A `GlobalKey` groups the tables that
//! share a single change-log position.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Identity of a single stream
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
}

impl StreamKey {
    /// Create a key without namespace
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    /// Create a namespaced key
    pub fn with_namespace(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{namespace}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Identity of the set of streams sharing one CDC log position
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct GlobalKey {
    streams: BTreeSet<StreamKey>,
}

impl GlobalKey {
    /// Create a global key over the given streams
    pub fn new(streams: impl IntoIterator<Item = StreamKey>) -> Self {
        Self {
            streams: streams.into_iter().collect(),
        }
    }

    /// Nested streams, in key order
    pub fn streams(&self) -> impl Iterator<Item = &StreamKey> {
        self.streams.iter()
    }

    /// Whether the stream shares this key's log position
    pub fn contains(&self, stream: &StreamKey) -> bool {
        self.streams.contains(stream)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

impl fmt::Display for GlobalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "global[")?;
        for (i, stream) in self.streams.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{stream}")?;
        }
        write!(f, "]")
    }
}

/// Any tracked key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Stream(StreamKey),
    Global(GlobalKey),
}

impl From<StreamKey> for Key {
    fn from(key: StreamKey) -> Self {
        Key::Stream(key)
    }
}

impl From<GlobalKey> for Key {
    fn from(key: GlobalKey) -> Self {
        Key::Global(key)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Stream(key) => key.fmt(f),
            Key::Global(key) => key.fmt(f),
        }
    }
}
