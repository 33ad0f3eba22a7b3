//! Position Commands
//!
//! Contract with the remote store that durably records parent and position.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DomainResult;
use crate::models::{Level, NodeId, ParentRef};

/// Arguments of the position-update call.
/// Sections always carry `ParentRef::Root`, serialized as `"root"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionUpdate {
    #[serde(rename = "itemId")]
    pub item_id: NodeId,
    #[serde(rename = "itemType")]
    pub item_type: Level,
    #[serde(rename = "newParentId")]
    pub new_parent_id: ParentRef,
    #[serde(rename = "newIndex")]
    pub new_index: i32,
}

/// Remote store client.
///
/// Implementations must return an error on any server-side failure so the
/// engine can roll back, and must tolerate the same update twice.
#[async_trait]
pub trait PositionClient: Send + Sync {
    async fn update_position(&self, update: &PositionUpdate) -> DomainResult<()>;
}
