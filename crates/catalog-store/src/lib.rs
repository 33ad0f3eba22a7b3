//! Catalog Store
//!
//! Durable home of the catalog's parent and position columns:
//! - config: where the database and logs live
//! - repository: SQLite access, positioning and the position client

mod config;
mod repository;

use catalog_dnd::{DomainError, DomainResult};

pub use config::{StoreConfig, ENV_APP_NAME, ENV_DB_PATH, ENV_LOG_DIR, IN_MEMORY};
pub use repository::{
    init_db, CatalogPositioningOperations, CatalogRepository, DbState, NewNode, NodeRecord,
    SharedConnection,
};

/// Open (and migrate) the configured database
pub async fn open(config: &StoreConfig) -> DomainResult<CatalogRepository> {
    let state = init_db(&config.db_path).await?;
    Ok(CatalogRepository::new(state.conn))
}

/// Route all `log` records into the rolling log under `config.log_dir`
pub fn init_logging(config: &StoreConfig) -> DomainResult<()> {
    rolling_logger::init_logger(config.log_dir.clone(), &config.app_name).map_err(DomainError::Internal)?;
    log::info!("[STORE] Logging to {}", config.log_dir.display());
    Ok(())
}
