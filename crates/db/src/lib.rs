pub mod blobs;
pub mod connection;
pub mod migrations;
pub mod repositories;

pub use blobs::{screenshot_key, BlobError, BlobStore, FsBlobStore, InMemoryBlobStore};
pub use connection::{connect, connect_with_config, connect_with_settings, DbPool};
pub use repositories::{
    CatalogRepository, CompletionOutcome, DialogRepository, OrderRepository, RepositoryError,
    SessionRepository,
};
