//! Move Resolver
//!
//! Turns a validated drag/drop pair into the parent and index the dragged
//! item should occupy.
//!
//! Same-parent reorders use the drop target's index in the sibling list as it
//! is *before* the dragged item is removed. The engine removes first and then
//! inserts at that raw index, so a forward drag lands one slot after the
//! target while a backward drag lands exactly on it.

use crate::models::{NodeId, ParentRef};
use crate::tree::{wire_index, CatalogIndex};

/// Where the dragged item goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveTarget {
    pub parent: ParentRef,
    pub index: i32,
}

/// Resolve the target of dropping `active` on `over`.
///
/// `over` may be the root sentinel (the catalog background). Returns `None`
/// when no legal parent can be determined or the index does not fit the wire.
pub fn resolve(index: &CatalogIndex, active: &NodeId, over: &NodeId) -> Option<MoveTarget> {
    let dragged = index.get(active)?;

    if over.is_root() {
        return match dragged.level.parent_level() {
            None => Some(MoveTarget {
                parent: ParentRef::Root,
                index: wire_index(index.root_count())?,
            }),
            Some(_) => None,
        };
    }

    let target = index.get(over)?;

    // Same-parent reorder
    if target.level == dragged.level && target.parent == dragged.parent {
        return Some(MoveTarget {
            parent: target.parent.clone(),
            index: wire_index(target.index)?,
        });
    }

    // Dropped on a container: append
    if Some(target.level) == dragged.level.parent_level() {
        return Some(MoveTarget {
            parent: ParentRef::Node(over.clone()),
            index: wire_index(target.child_count)?,
        });
    }

    // Dropped on a sibling under another parent: take its slot
    if target.level == dragged.level {
        return Some(MoveTarget {
            parent: target.parent.clone(),
            index: wire_index(target.index)?,
        });
    }

    None
}
