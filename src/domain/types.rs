//! Identifier and discriminator types shared by every layer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Monotonic write counter, one per content kind.
///
/// Generation `0` is the empty store that exists before the first load.
pub type Generation = u64;

/// Counter bumped every time a kind is rebuilt from the storage layer.
pub type Epoch = u64;

/// The content kinds served from the snapshot cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Document,
    Media,
    Member,
}

impl ContentKind {
    pub const ALL: [ContentKind; 3] = [ContentKind::Document, ContentKind::Media, ContentKind::Member];

    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Document => "document",
            ContentKind::Media => "media",
            ContentKind::Member => "member",
        }
    }

    /// Dense index used for per-kind arrays.
    pub(crate) fn index(self) -> usize {
        match self {
            ContentKind::Document => 0,
            ContentKind::Media => 1,
            ContentKind::Member => 2,
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "document" | "content" => Ok(ContentKind::Document),
            "media" => Ok(ContentKind::Media),
            "member" => Ok(ContentKind::Member),
            other => Err(format!("unknown content kind `{other}`")),
        }
    }
}

/// Legacy integer identifier, stable for the lifetime of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub i32);

impl NodeId {
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for NodeId {
    fn from(raw: i32) -> Self {
        Self(raw)
    }
}

/// Opaque, globally unique key. Never reassigned once a node has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeKey(pub Uuid);

impl NodeKey {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for NodeKey {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}
