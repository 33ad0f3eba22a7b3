//! Repository Layer
//!
//! Data access for the catalog, split into:
//! - catalog_repo: create, find, delete, load and import
//! - catalog_positioning: positions, moves and the engine's position client

mod db;
mod catalog_repo;
mod catalog_positioning;


pub use db::{init_db, DbState, SharedConnection};
pub use catalog_repo::{CatalogRepository, NewNode, NodeRecord};
pub use catalog_positioning::CatalogPositioningOperations;
