//! Catalog Repository - Core Operations
//!
//! SQLite-backed storage of catalog nodes. Positioning and the engine's
//! position client live in `catalog_positioning`.

use rusqlite::{params, Connection, Row};
use serde_json::{Map, Value};
use std::collections::HashMap;

use catalog_dnd::{
    Catalog, CategoryPayload, DomainError, DomainResult, Level, NodeId, ParentRef, SectionPayload,
    ServicePayload, wire_index,
};

use super::db::{internal, SharedConnection};

const SELECT_NODE: &str =
    "SELECT id, level, parent_id, nombre, descripcion, extra, position, updated_at FROM catalog_nodes";

/// A stored catalog node
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    pub id: NodeId,
    pub level: Level,
    pub parent: ParentRef,
    pub name: String,
    pub description: Option<String>,
    pub extra: Map<String, Value>,
    pub position: i32,
    pub updated_at: Option<i64>,
}

/// Input for `create_node`
#[derive(Debug, Clone, PartialEq)]
pub struct NewNode {
    pub id: NodeId,
    pub level: Level,
    pub parent: ParentRef,
    pub name: String,
    pub description: Option<String>,
    pub extra: Map<String, Value>,
}

impl NewNode {
    pub fn new(id: impl Into<NodeId>, level: Level, parent: ParentRef, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            level,
            parent,
            name: name.into(),
            description: None,
            extra: Map::new(),
        }
    }

    pub fn section(id: impl Into<NodeId>, name: impl Into<String>) -> Self {
        Self::new(id, Level::Section, ParentRef::Root, name)
    }

    pub fn child(id: impl Into<NodeId>, level: Level, parent: impl Into<NodeId>, name: impl Into<String>) -> Self {
        Self::new(id, level, ParentRef::Node(parent.into()), name)
    }
}

/// SQLite implementation of the catalog repository
pub struct CatalogRepository {
    pub(super) conn: SharedConnection,
}

pub(super) fn parent_column(parent: &ParentRef) -> Option<&str> {
    parent.as_node().map(|id| id.as_str())
}

pub(super) fn row_to_record(row: &Row<'_>) -> DomainResult<NodeRecord> {
    let level: String = row.get(1).map_err(internal)?;
    let level = Level::parse(&level)
        .ok_or_else(|| DomainError::Internal(format!("Unknown level {}", level)))?;
    let parent: Option<String> = row.get(2).map_err(internal)?;
    let extra: String = row.get(5).map_err(internal)?;
    let extra = match serde_json::from_str::<Value>(&extra) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };

    Ok(NodeRecord {
        id: NodeId::new(row.get::<_, String>(0).map_err(internal)?),
        level,
        parent: parent.map(|p| ParentRef::Node(NodeId::new(p))).unwrap_or(ParentRef::Root),
        name: row.get(3).map_err(internal)?,
        description: row.get(4).map_err(internal)?,
        extra,
        position: row.get(6).map_err(internal)?,
        updated_at: row.get(7).map_err(internal)?,
    })
}

pub(super) fn find_record(conn: &Connection, id: &NodeId) -> DomainResult<Option<NodeRecord>> {
    let mut stmt = conn
        .prepare(&format!("{} WHERE id = ?", SELECT_NODE))
        .map_err(internal)?;
    let mut rows = stmt.query(params![id.as_str()]).map_err(internal)?;
    let record = match rows.next().map_err(internal)? {
        Some(row) => Some(row_to_record(row)?),
        None => None,
    };
    Ok(record)
}

/// Children of a parent ordered by position
pub(super) fn child_records(conn: &Connection, parent: &ParentRef) -> DomainResult<Vec<NodeRecord>> {
    let mut stmt = match parent {
        ParentRef::Root => conn.prepare(&format!(
            "{} WHERE parent_id IS NULL ORDER BY position, id",
            SELECT_NODE
        )),
        ParentRef::Node(_) => conn.prepare(&format!(
            "{} WHERE parent_id = ? ORDER BY position, id",
            SELECT_NODE
        )),
    }
    .map_err(internal)?;

    let mut rows = match parent {
        ParentRef::Root => stmt.query([]),
        ParentRef::Node(pid) => stmt.query(params![pid.as_str()]),
    }
    .map_err(internal)?;

    let mut records = Vec::new();
    while let Some(row) = rows.next().map_err(internal)? {
        records.push(row_to_record(row)?);
    }
    Ok(records)
}

/// A node of `level` may only sit under `parent` if the parent exists at the
/// level directly above (or is the root, for sections)
pub(super) fn check_parent(conn: &Connection, level: Level, parent: &ParentRef) -> DomainResult<()> {
    let parent_level = match parent {
        ParentRef::Root => None,
        ParentRef::Node(pid) => Some(
            find_record(conn, pid)?
                .ok_or_else(|| DomainError::InvalidInput(format!("Parent {} not found", pid)))?
                .level,
        ),
    };
    if parent_level != level.parent_level() {
        return Err(DomainError::InvalidInput(format!(
            "A {} cannot be placed under {}",
            level, parent
        )));
    }
    Ok(())
}

fn insert_record(conn: &Connection, node: &NewNode, position: i32, now: i64) -> DomainResult<()> {
    let extra = Value::Object(node.extra.clone()).to_string();
    conn.execute(
        "INSERT INTO catalog_nodes (id, level, parent_id, nombre, descripcion, extra, position, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            node.id.as_str(),
            node.level.as_str(),
            parent_column(&node.parent),
            node.name,
            node.description,
            extra,
            position,
            now
        ],
    )
    .map_err(internal)?;
    Ok(())
}

impl CatalogRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    /// Create a node at the end of its parent's list
    pub async fn create_node(&self, node: &NewNode) -> DomainResult<NodeRecord> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(DomainError::Internal("Database not initialized".to_string()))?;

        if node.id.is_root() {
            return Err(DomainError::InvalidInput(format!("{} is a reserved id", node.id)));
        }
        if find_record(conn, &node.id)?.is_some() {
            return Err(DomainError::Conflict(format!("Node {} already exists", node.id)));
        }
        check_parent(conn, node.level, &node.parent)?;

        let position = super::catalog_positioning::next_position(conn, &node.parent)?;
        insert_record(conn, node, position, chrono::Utc::now().timestamp_millis())?;

        find_record(conn, &node.id)?
            .ok_or_else(|| DomainError::Internal(format!("Node {} vanished after insert", node.id)))
    }

    /// Find node by ID
    pub async fn find_by_id(&self, id: &NodeId) -> DomainResult<Option<NodeRecord>> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(DomainError::Internal("Database not initialized".to_string()))?;
        find_record(conn, id)
    }

    /// Children of a parent (`ParentRef::Root` = sections), ordered by position
    pub async fn get_children(&self, parent: &ParentRef) -> DomainResult<Vec<NodeRecord>> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(DomainError::Internal("Database not initialized".to_string()))?;
        child_records(conn, parent)
    }

    /// Delete a node and everything under it, then close the gap it left
    pub async fn delete_node(&self, id: &NodeId) -> DomainResult<()> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(DomainError::Internal("Database not initialized".to_string()))?;
        let tx = conn.transaction().map_err(internal)?;

        let record = find_record(&tx, id)?
            .ok_or_else(|| DomainError::NotFound(format!("Node {} not found", id)))?;

        let mut to_delete = vec![record.id.clone()];
        let mut to_visit = vec![record.id.clone()];
        while let Some(current) = to_visit.pop() {
            for child in child_records(&tx, &ParentRef::Node(current))? {
                to_visit.push(child.id.clone());
                to_delete.push(child.id);
            }
        }

        for node_id in &to_delete {
            tx.execute("DELETE FROM catalog_nodes WHERE id = ?", params![node_id.as_str()])
                .map_err(internal)?;
        }
        super::catalog_positioning::reindex(&tx, &record.parent)?;

        tx.commit().map_err(internal)?;
        log::info!("[DB] Deleted {} {} ({} nodes)", record.level, id, to_delete.len());
        Ok(())
    }

    /// Load the whole catalog as the nested payload the engine consumes
    pub async fn load_catalog(&self) -> DomainResult<Catalog> {
        let records = {
            let guard = self.conn.lock().await;
            let conn = guard.as_ref().ok_or(DomainError::Internal("Database not initialized".to_string()))?;
            let mut stmt = conn
                .prepare(&format!("{} ORDER BY position, id", SELECT_NODE))
                .map_err(internal)?;
            let mut rows = stmt.query([]).map_err(internal)?;
            let mut records = Vec::new();
            while let Some(row) = rows.next().map_err(internal)? {
                records.push(row_to_record(row)?);
            }
            records
        };

        let mut by_parent: HashMap<ParentRef, Vec<NodeRecord>> = HashMap::new();
        for record in records {
            by_parent.entry(record.parent.clone()).or_default().push(record);
        }
        let roots = by_parent.remove(&ParentRef::Root).unwrap_or_default();
        let mut take = |parent: &NodeId| by_parent.remove(&ParentRef::Node(parent.clone())).unwrap_or_default();

        let sections = roots
            .into_iter()
            .map(|section| {
                let categories = take(&section.id)
                    .into_iter()
                    .map(|category| CategoryPayload {
                        services: take(&category.id)
                            .into_iter()
                            .map(|service| ServicePayload {
                                id: service.id,
                                name: service.name,
                                description: service.description,
                                category_id: Some(category.id.clone()),
                                extra: service.extra,
                            })
                            .collect(),
                        id: category.id,
                        name: category.name,
                        description: category.description,
                        section_id: Some(section.id.clone()),
                        extra: category.extra,
                    })
                    .collect();
                SectionPayload {
                    id: section.id,
                    name: section.name,
                    description: section.description,
                    categories,
                    extra: section.extra,
                }
            })
            .collect();

        Catalog::from_payload(sections)
    }

    /// Replace every stored node with the contents of `catalog`
    pub async fn import_catalog(&self, catalog: &Catalog) -> DomainResult<()> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(DomainError::Internal("Database not initialized".to_string()))?;
        let tx = conn.transaction().map_err(internal)?;
        let now = chrono::Utc::now().timestamp_millis();

        tx.execute("DELETE FROM catalog_nodes", []).map_err(internal)?;

        let mut to_visit: Vec<&NodeId> = catalog.roots().iter().rev().collect();
        while let Some(id) = to_visit.pop() {
            let Some(node) = catalog.get(id) else { continue };
            let position = catalog.locate(id).and_then(|l| wire_index(l.index)).ok_or_else(|| {
                DomainError::InvalidInput(format!("Node {} has no storable position", id))
            })?;
            let record = NewNode {
                id: node.id.clone(),
                level: node.level,
                parent: node.parent.clone(),
                name: node.name.clone(),
                description: node.description.clone(),
                extra: node.extra.clone(),
            };
            insert_record(&tx, &record, position, now)?;
            to_visit.extend(node.children.iter().rev());
        }

        tx.commit().map_err(internal)?;
        log::info!("[DB] Imported {} catalog nodes", catalog.len());
        Ok(())
    }
}
