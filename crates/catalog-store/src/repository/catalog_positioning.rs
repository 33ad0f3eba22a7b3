//! Catalog Positioning Operations
//!
//! Parent and position management, and the position client the engine
//! persists its moves through.

use async_trait::async_trait;
use rusqlite::{params, Connection};

use catalog_dnd::{
    clamp_index, wire_index, DomainError, DomainResult, Level, NodeId, ParentRef, PositionClient, PositionUpdate,
};

use super::catalog_repo::{check_parent, child_records, find_record, parent_column, CatalogRepository};
use super::db::internal;

/// Trait for catalog positioning operations
#[async_trait]
pub trait CatalogPositioningOperations {
    /// Next free position under a parent (used in create)
    async fn get_next_position(&self, parent: &ParentRef) -> DomainResult<i32>;

    /// Reindex children of a parent to be sequential (0, 1, 2, ...)
    async fn reindex_children(&self, parent: &ParentRef) -> DomainResult<()>;

    /// Move a node of `level` under `new_parent` at `position` (clamped).
    /// Returns the position it ended up at.
    async fn move_to(
        &self,
        id: &NodeId,
        level: Level,
        new_parent: &ParentRef,
        position: i32,
    ) -> DomainResult<i32>;
}

pub(super) fn next_position(conn: &Connection, parent: &ParentRef) -> DomainResult<i32> {
    let position = match parent {
        ParentRef::Root => conn.query_row(
            "SELECT COALESCE(MAX(position), -1) + 1 FROM catalog_nodes WHERE parent_id IS NULL",
            [],
            |row| row.get::<_, i32>(0),
        ),
        ParentRef::Node(pid) => conn.query_row(
            "SELECT COALESCE(MAX(position), -1) + 1 FROM catalog_nodes WHERE parent_id = ?",
            params![pid.as_str()],
            |row| row.get::<_, i32>(0),
        ),
    }
    .map_err(internal)?;
    Ok(position)
}

fn write_positions(conn: &Connection, ids: &[NodeId], now: i64) -> DomainResult<()> {
    for (new_pos, id) in ids.iter().enumerate() {
        let new_pos = wire_index(new_pos)
            .ok_or_else(|| DomainError::Internal(format!("Position {} out of range", new_pos)))?;
        conn.execute(
            "UPDATE catalog_nodes SET position = ?, updated_at = ? WHERE id = ?",
            params![new_pos, now, id.as_str()],
        )
        .map_err(internal)?;
    }
    Ok(())
}

/// Rewrite positions under `parent` as 0..n in their current order
pub(super) fn reindex(conn: &Connection, parent: &ParentRef) -> DomainResult<()> {
    let ids: Vec<NodeId> = child_records(conn, parent)?.into_iter().map(|r| r.id).collect();
    write_positions(conn, &ids, chrono::Utc::now().timestamp_millis())
}

fn apply_move(
    conn: &mut Connection,
    id: &NodeId,
    level: Level,
    new_parent: &ParentRef,
    position: i32,
) -> DomainResult<i32> {
    let tx = conn.transaction().map_err(internal)?;

    let record = find_record(&tx, id)?
        .ok_or_else(|| DomainError::NotFound(format!("Node {} not found", id)))?;
    if record.level != level {
        return Err(DomainError::InvalidInput(format!(
            "{} is a {}, not a {}",
            id, record.level, level
        )));
    }
    check_parent(&tx, record.level, new_parent)?;

    // New sibling order with the node at its clamped slot
    let mut ids: Vec<NodeId> = child_records(&tx, new_parent)?
        .into_iter()
        .map(|r| r.id)
        .filter(|sibling| sibling != id)
        .collect();
    let at = clamp_index(position, ids.len());
    ids.insert(at, id.clone());

    let now = chrono::Utc::now().timestamp_millis();
    tx.execute(
        "UPDATE catalog_nodes SET parent_id = ?, updated_at = ? WHERE id = ?",
        params![parent_column(new_parent), now, id.as_str()],
    )
    .map_err(internal)?;
    write_positions(&tx, &ids, now)?;

    // Close the gap in the old parent
    if record.parent != *new_parent {
        reindex(&tx, &record.parent)?;
    }

    tx.commit().map_err(internal)?;
    wire_index(at).ok_or_else(|| DomainError::Internal(format!("Position {} out of range", at)))
}

#[async_trait]
impl CatalogPositioningOperations for CatalogRepository {
    async fn get_next_position(&self, parent: &ParentRef) -> DomainResult<i32> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(DomainError::Internal("Database not initialized".to_string()))?;
        next_position(conn, parent)
    }

    async fn reindex_children(&self, parent: &ParentRef) -> DomainResult<()> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(DomainError::Internal("Database not initialized".to_string()))?;
        reindex(conn, parent)
    }

    async fn move_to(
        &self,
        id: &NodeId,
        level: Level,
        new_parent: &ParentRef,
        position: i32,
    ) -> DomainResult<i32> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or(DomainError::Internal("Database not initialized".to_string()))?;
        apply_move(conn, id, level, new_parent, position)
    }
}

#[async_trait]
impl PositionClient for CatalogRepository {
    async fn update_position(&self, update: &PositionUpdate) -> DomainResult<()> {
        match self
            .move_to(&update.item_id, update.item_type, &update.new_parent_id, update.new_index)
            .await
        {
            Ok(position) => {
                log::debug!(
                    "[DB] {} {} now under {} at {}",
                    update.item_type, update.item_id, update.new_parent_id, position
                );
                Ok(())
            }
            Err(e) => {
                log::error!("[DB] Position update for {} failed: {}", update.item_id, e);
                Err(e)
            }
        }
    }
}
