//! Catalog Models
//!
//! Hierarchy levels, identifiers, the uniform tree node and the nested
//! payload exchanged with the server.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sentinel id the store expects for top-level (Section) parents
pub const ROOT_ID: &str = "root";

/// Hierarchy level of a catalog node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Level {
    #[serde(rename = "seccion")]
    Section,
    #[serde(rename = "categoria")]
    Category,
    #[serde(rename = "servicio")]
    Service,
}

impl Level {
    /// Wire name used by the store
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Section => "seccion",
            Level::Category => "categoria",
            Level::Service => "servicio",
        }
    }

    /// Parse a wire name; unknown names yield `None`
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "seccion" => Some(Level::Section),
            "categoria" => Some(Level::Category),
            "servicio" => Some(Level::Service),
            _ => None,
        }
    }

    /// Level of the only legal parent (`None` = the catalog root)
    pub fn parent_level(&self) -> Option<Level> {
        match self {
            Level::Section => None,
            Level::Category => Some(Level::Section),
            Level::Service => Some(Level::Category),
        }
    }

    /// Level of the children this level owns (`None` for leaves)
    pub fn child_level(&self) -> Option<Level> {
        match self {
            Level::Section => Some(Level::Category),
            Level::Category => Some(Level::Service),
            Level::Service => None,
        }
    }

    /// Human-readable name used in notices
    pub fn label(&self) -> &'static str {
        match self {
            Level::Section => "section",
            Level::Category => "category",
            Level::Service => "service",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Opaque node identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this id is the root sentinel (the catalog background)
    pub fn is_root(&self) -> bool {
        self.0 == ROOT_ID
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Owning parent of a node. Serialized as the parent id or `"root"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ParentRef {
    Root,
    Node(NodeId),
}

impl ParentRef {
    pub fn as_node(&self) -> Option<&NodeId> {
        match self {
            ParentRef::Root => None,
            ParentRef::Node(id) => Some(id),
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self, ParentRef::Root)
    }
}

impl From<String> for ParentRef {
    fn from(s: String) -> Self {
        if s == ROOT_ID {
            ParentRef::Root
        } else {
            ParentRef::Node(NodeId(s))
        }
    }
}

impl From<ParentRef> for String {
    fn from(parent: ParentRef) -> Self {
        match parent {
            ParentRef::Root => ROOT_ID.to_string(),
            ParentRef::Node(id) => id.0,
        }
    }
}

impl std::fmt::Display for ParentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParentRef::Root => f.write_str(ROOT_ID),
            ParentRef::Node(id) => f.write_str(id.as_str()),
        }
    }
}

/// A catalog node. All three levels share this shape; `children` holds the
/// ordered ids of the next level down and its order is the position.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub level: Level,
    pub name: String,
    pub description: Option<String>,
    /// Attributes the engine carries without interpreting (prices, flags, ...)
    pub extra: Map<String, Value>,
    pub parent: ParentRef,
    pub children: Vec<NodeId>,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, level: Level, name: impl Into<String>, parent: ParentRef) -> Self {
        Self {
            id: id.into(),
            level,
            name: name.into(),
            description: None,
            extra: Map::new(),
            parent,
            children: Vec::new(),
        }
    }
}

/// Drag-end event from the sensor layer.
/// `over_id` is `None` when the pointer was released outside any target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DragEnd {
    #[serde(rename = "activeId")]
    pub active_id: NodeId,
    #[serde(rename = "overId", default)]
    pub over_id: Option<NodeId>,
}

impl DragEnd {
    pub fn new(active_id: impl Into<NodeId>, over_id: Option<NodeId>) -> Self {
        Self {
            active_id: active_id.into(),
            over_id,
        }
    }

    pub fn over(active_id: impl Into<NodeId>, over_id: impl Into<NodeId>) -> Self {
        Self::new(active_id, Some(over_id.into()))
    }
}

// ========================
// Server Payload
// ========================

/// Top-level entry of the catalog payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionPayload {
    pub id: NodeId,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "descripcion", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "categorias", default)]
    pub categories: Vec<CategoryPayload>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryPayload {
    pub id: NodeId,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "descripcion", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Back-reference; the nesting is authoritative on ingest
    #[serde(rename = "seccion_id", default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<NodeId>,
    #[serde(rename = "servicios", default)]
    pub services: Vec<ServicePayload>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Leaf entry. Pricing attributes (`costo`, `precio_publico`, ...) travel in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServicePayload {
    pub id: NodeId,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "descripcion", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "categoria_id", default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<NodeId>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
