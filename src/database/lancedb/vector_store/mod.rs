#[cfg(test)]
mod tests;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lancedb::Connection;
use tracing::{debug, error, info, warn};

use super::VectorCollection;
use crate::config::Config;
use crate::{RagError, Result};

/// Owned handle to the vector database.
///
/// Created once per process and shared by reference. Collections handed
/// out by [`VectorStore::collection`] clone the underlying connection, so
/// they stay valid independently of this handle.
#[derive(Clone)]
pub struct VectorStore {
    connection: Connection,
    timeout: Duration,
}

impl VectorStore {
    /// Open (or create) the vector database configured in `config`
    #[inline]
    pub async fn new(config: &Config) -> Result<Self> {
        Self::open(&config.vector_database_path(), config.store.timeout()).await
    }

    /// Open (or create) a vector database at `db_path`
    #[inline]
    pub async fn open(db_path: &Path, timeout: Duration) -> Result<Self> {
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(db_path).map_err(|e| {
            RagError::Database(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = db_path.display().to_string();

        // Attempt to connect with corruption recovery
        let connection = match bounded(timeout, "connect", connect(&uri)).await {
            Ok(conn) => conn,
            Err(e) => {
                error!("Failed to connect to LanceDB: {}", e);

                let error_msg = e.to_string().to_lowercase();
                if error_msg.contains("corrupt")
                    || error_msg.contains("invalid")
                    || error_msg.contains("malformed")
                {
                    warn!("Database corruption detected, attempting recovery");
                    attempt_corruption_recovery(db_path)?;

                    bounded(timeout, "connect after recovery", connect(&uri)).await?
                } else {
                    return Err(e);
                }
            }
        };

        info!("Vector store opened at {:?}", db_path);
        Ok(Self {
            connection,
            timeout,
        })
    }

    /// Handle to the named collection; nothing is created until
    /// [`VectorCollection::create`] is called
    #[inline]
    pub fn collection(&self, name: &str) -> VectorCollection {
        VectorCollection::new(self.connection.clone(), name, self.timeout)
    }

    /// Names of every collection in the store
    #[inline]
    pub async fn collection_names(&self) -> Result<Vec<String>> {
        bounded(self.timeout, "list collections", async {
            self.connection
                .table_names()
                .execute()
                .await
                .map_err(|e| RagError::Database(format!("Failed to list tables: {}", e)))
        })
        .await
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

async fn connect(uri: &str) -> Result<Connection> {
    lancedb::connect(uri)
        .execute()
        .await
        .map_err(|e| RagError::Database(format!("Failed to connect to LanceDB: {}", e)))
}

/// Run a store operation under a caller-visible deadline
pub(crate) async fn bounded<T, F>(timeout: Duration, operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| RagError::Timeout {
            operation: operation.to_string(),
            after: timeout,
        })?
}

/// Move a corrupted database out of the way so a fresh one can be created
fn attempt_corruption_recovery(db_path: &Path) -> Result<()> {
    warn!("Attempting database corruption recovery at {:?}", db_path);

    // Never delete: if the data cannot be moved aside, leave it for the user
    if db_path.exists() {
        let backup_path: PathBuf = db_path.with_extension("corrupted_backup");
        std::fs::rename(db_path, &backup_path).map_err(|e| {
            error!("Failed to backup corrupted database: {}", e);
            RagError::Database(format!(
                "Failed to move corrupted database {:?} to {:?}: {}",
                db_path, backup_path, e
            ))
        })?;
        info!("Corrupted database backed up to {:?}", backup_path);
    }

    std::fs::create_dir_all(db_path).map_err(|e| {
        RagError::Database(format!("Failed to recreate vector database directory: {}", e))
    })?;

    info!("Database corruption recovery completed");
    Ok(())
}
