//! Move Validator
//!
//! Decides whether a dragged level may join a drop zone. An item may only be
//! dropped into a zone whose level is the level of its parent.

use serde::{Deserialize, Serialize};

use crate::models::Level;

/// The effective container a dragged item would join
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DropZone {
    /// The catalog background (top-level Section list)
    Root,
    Container(Level),
}

impl DropZone {
    /// Zone owned by a parent of the given level (`None` = root)
    pub fn of(parent_level: Option<Level>) -> Self {
        match parent_level {
            None => DropZone::Root,
            Some(level) => DropZone::Container(level),
        }
    }
}

impl std::fmt::Display for DropZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropZone::Root => f.write_str("the catalog root"),
            DropZone::Container(level) => write!(f, "a {}", level),
        }
    }
}

/// Why a drag was refused before anything was mutated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveRejection {
    /// The level pair is outside the legality table
    IllegalMove { dragged: Level, zone: DropZone },
    /// No target parent/index could be determined
    Unresolved(String),
}

impl std::fmt::Display for MoveRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MoveRejection::IllegalMove { dragged, zone } => {
                write!(f, "cannot move a {} into {}", dragged, zone)
            }
            MoveRejection::Unresolved(reason) => write!(f, "cannot move item: {}", reason),
        }
    }
}

impl std::error::Error for MoveRejection {}

/// Effective drop zone for `dragged` released over an item of level `over`
/// (`None` = the catalog background).
///
/// Dropping on a valid container means "into it"; dropping on anything else
/// means "next to it", so the zone is that item's parent level.
pub fn drop_zone(dragged: Level, over: Option<Level>) -> DropZone {
    match over {
        None => DropZone::Root,
        Some(level) if Some(level) == dragged.parent_level() => DropZone::Container(level),
        Some(level) => DropZone::of(level.parent_level()),
    }
}

/// Check a `(dragged, zone)` pair against the legality table
pub fn validate(dragged: Level, zone: DropZone) -> Result<(), MoveRejection> {
    if zone == DropZone::of(dragged.parent_level()) {
        Ok(())
    } else {
        Err(MoveRejection::IllegalMove { dragged, zone })
    }
}

/// `drop_zone` followed by `validate`
pub fn validate_drop(dragged: Level, over: Option<Level>) -> Result<DropZone, MoveRejection> {
    let zone = drop_zone(dragged, over);
    validate(dragged, zone).map(|_| zone)
}
