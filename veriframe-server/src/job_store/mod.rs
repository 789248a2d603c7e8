//! Job store backend selection
//!
//! Jobs are persisted in PostgreSQL when `DATABASE_URL` is set. Otherwise the
//! server falls back to the in-memory store (useful for development, but jobs
//! are lost on restart).

mod postgres;

pub use postgres::PostgresJobStore;

use std::sync::Arc;

use veriframe_core::{JobStore, MemoryJobStore, StoreError};

use crate::config::Config;

/// Open the configured job store.
pub async fn connect(config: &Config) -> Result<Arc<dyn JobStore>, StoreError> {
    match &config.database_url {
        Some(url) => {
            let store = PostgresJobStore::new(url, config.database_max_connections).await?;
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set - using in-memory job store, jobs will be lost on restart!");
            Ok(Arc::new(MemoryJobStore::new()))
        }
    }
}
