//! Catalog drag-and-drop engine
//!
//! Reorders and reparents items of a Section → Category → Service catalog:
//! - models: levels, ids, nodes and the server payload
//! - tree: arena tree with copy-on-write primitives
//! - validator / resolver: legality and target computation for a drop
//! - engine: optimistic mutation with rollback
//! - commands: contract with the position store

pub mod commands;
pub mod engine;
pub mod error;
pub mod models;
pub mod notice;
pub mod resolver;
pub mod tree;
pub mod validator;

pub use commands::{PositionClient, PositionUpdate};
pub use engine::{MoveEngine, MoveOutcome, MovePhase, PendingMove};
pub use error::{DomainError, DomainResult};
pub use models::{
    CategoryPayload, DragEnd, Level, Node, NodeId, ParentRef, SectionPayload, ServicePayload, ROOT_ID,
};
pub use notice::{MoveListener, Notice, NoopListener};
pub use resolver::{resolve, MoveTarget};
pub use tree::{clamp_index, wire_index, Catalog, CatalogIndex, Location, Subtree};
pub use validator::{drop_zone, validate, validate_drop, DropZone, MoveRejection};
