//! Vector store abstraction.
//!
//! A store is bound to one collection in one database. Construction goes
//! through [`PgVectorStore::initialize`], which refuses to run without an
//! embeddings capability.

mod pg_store;

pub use pg_store::PgVectorStore;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::DocumentChunk;

/// Options applied when binding a store to its collection.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// Drop any existing collection of the same name first. Destructive.
    pub pre_delete_collection: bool,
    pub max_connections: u32,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            pre_delete_collection: false,
            max_connections: 4,
        }
    }
}

/// Collection information.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionInfo {
    pub name: String,
    pub uuid: Uuid,
    pub points_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: Uuid,
    pub content: String,
    pub metadata: serde_json::Value,
    /// Cosine similarity, 1.0 is identical.
    pub score: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Embed and store texts under fresh ids.
    async fn add_texts(
        &self,
        texts: &[String],
        metadatas: &[serde_json::Value],
    ) -> Result<Vec<Uuid>, StoreError>;

    /// Embed and upsert chunks under their own ids.
    async fn add_chunks(&self, chunks: &[DocumentChunk]) -> Result<usize, StoreError>;

    /// Nearest `k` entries to `query`.
    async fn similarity_search(&self, query: &str, k: u32) -> Result<Vec<SearchHit>, StoreError>;

    /// `None` when the collection does not exist.
    async fn collection_info(&self) -> Result<Option<CollectionInfo>, StoreError>;

    /// Remove the collection and all of its embeddings.
    async fn delete_collection(&self) -> Result<(), StoreError>;

    fn collection(&self) -> &str;
}
