use std::sync::Arc;

use recarga_db::repositories::{
    InMemoryCatalogRepository, InMemoryDialogRepository, InMemoryOrderRepository,
    InMemorySessionRepository, SqlCatalogRepository, SqlDialogRepository, SqlOrderRepository,
    SqlSessionRepository,
};
use recarga_db::{
    BlobStore, CatalogRepository, DbPool, DialogRepository, InMemoryBlobStore, OrderRepository,
    SessionRepository,
};

/// The durable collaborators a conversation step reads and writes.
#[derive(Clone)]
pub struct Stores {
    pub catalog: Arc<dyn CatalogRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub dialogs: Arc<dyn DialogRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub blobs: Arc<dyn BlobStore>,
}

impl Stores {
    pub fn sqlite(pool: DbPool, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            catalog: Arc::new(SqlCatalogRepository::new(pool.clone())),
            sessions: Arc::new(SqlSessionRepository::new(pool.clone())),
            dialogs: Arc::new(SqlDialogRepository::new(pool.clone())),
            orders: Arc::new(SqlOrderRepository::new(pool)),
            blobs,
        }
    }

    pub fn in_memory() -> Self {
        Self {
            catalog: Arc::new(InMemoryCatalogRepository::default()),
            sessions: Arc::new(InMemorySessionRepository::default()),
            dialogs: Arc::new(InMemoryDialogRepository::default()),
            orders: Arc::new(InMemoryOrderRepository::default()),
            blobs: Arc::new(InMemoryBlobStore::default()),
        }
    }
}
