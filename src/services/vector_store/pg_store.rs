use std::sync::Arc;

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::Row;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use tracing::{debug, info};
use uuid::Uuid;

use super::{CollectionInfo, InitOptions, SearchHit, VectorStore};
use crate::error::StoreError;
use crate::models::{ConnectionParams, DocumentChunk};
use crate::services::embedding::Embeddings;

fn store_options(target: &ConnectionParams) -> Result<PgConnectOptions, StoreError> {
    target
        .uri_options()
        .map_err(|e| StoreError::ConnectionError(e.to_string()))
}

const COLLECTION_TABLE: &str = "vector_collection";
const EMBEDDING_TABLE: &str = "vector_embedding";

/// pgvector-backed store bound to one collection.
pub struct PgVectorStore {
    pool: PgPool,
    embeddings: Arc<dyn Embeddings>,
    collection: String,
    collection_id: Uuid,
}

impl std::fmt::Debug for PgVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgVectorStore")
            .field("collection", &self.collection)
            .field("collection_id", &self.collection_id)
            .field("model", &self.embeddings.model())
            .finish()
    }
}

impl PgVectorStore {
    /// Bind a store to `collection_name` in the database described by `target`.
    ///
    /// Fails with [`StoreError::Validation`] when `embeddings` is `None`.
    pub async fn initialize(
        embeddings: Option<Arc<dyn Embeddings>>,
        collection_name: &str,
        target: &ConnectionParams,
        options: &InitOptions,
    ) -> Result<Self, StoreError> {
        let embeddings = embeddings.ok_or_else(|| {
            StoreError::Validation(
                "embeddings must be initialized before the vector store".to_string(),
            )
        })?;
        if collection_name.trim().is_empty() {
            return Err(StoreError::Validation(
                "collection name must not be empty".to_string(),
            ));
        }

        let pool = PgPoolOptions::new()
            .max_connections(options.max_connections.max(1))
            .acquire_timeout(target.connect_timeout)
            .connect_with(store_options(target)?)
            .await
            .map_err(|e| StoreError::ConnectionError(format!("{target}: {e}")))?;

        check_pgvector_extension(&pool).await?;
        ensure_tables(&pool).await?;

        if options.pre_delete_collection {
            let deleted = delete_collection_rows(&pool, collection_name).await?;
            if deleted {
                info!(collection = collection_name, "dropped existing collection");
            }
        }

        let collection_id =
            get_or_create_collection(&pool, collection_name, embeddings.model()).await?;

        info!(
            collection = collection_name,
            %collection_id,
            target = %target,
            "vector store initialized"
        );

        Ok(Self {
            pool,
            embeddings,
            collection: collection_name.to_string(),
            collection_id,
        })
    }

    /// Look up a collection without creating tables or rows.
    ///
    /// `Ok(None)` when the store tables or the collection do not exist.
    pub async fn inspect(
        collection_name: &str,
        target: &ConnectionParams,
    ) -> Result<Option<CollectionInfo>, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(target.connect_timeout)
            .connect_with(store_options(target)?)
            .await
            .map_err(|e| StoreError::ConnectionError(format!("{target}: {e}")))?;

        let result = async {
            let (present,): (bool,) =
                sqlx::query_as("SELECT to_regclass($1) IS NOT NULL")
                    .bind(COLLECTION_TABLE)
                    .fetch_one(&pool)
                    .await
                    .map_err(|e| StoreError::CollectionError(e.to_string()))?;
            if !present {
                return Ok(None);
            }
            fetch_collection_info(&pool, collection_name).await
        }
        .await;

        pool.close().await;
        result
    }

    pub fn collection_id(&self) -> Uuid {
        self.collection_id
    }

    /// Close the pool. Call before the tunnel goes away.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn upsert(
        &self,
        ids: &[Uuid],
        texts: &[String],
        metadatas: &[serde_json::Value],
    ) -> Result<(), StoreError> {
        if texts.is_empty() {
            return Ok(());
        }
        if metadatas.len() != texts.len() || ids.len() != texts.len() {
            return Err(StoreError::Validation(format!(
                "got {} texts, {} metadatas and {} ids",
                texts.len(),
                metadatas.len(),
                ids.len()
            )));
        }

        let vectors = self.embeddings.embed_documents(texts).await?;
        if vectors.len() != texts.len() {
            return Err(StoreError::InsertError(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }

        let query = format!(
            r#"
            INSERT INTO {EMBEDDING_TABLE} (id, collection_id, embedding, document, cmetadata)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                collection_id = EXCLUDED.collection_id,
                embedding = EXCLUDED.embedding,
                document = EXCLUDED.document,
                cmetadata = EXCLUDED.cmetadata
            "#
        );

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::InsertError(e.to_string()))?;

        for (((id, text), metadata), vector) in ids.iter().zip(texts).zip(metadatas).zip(vectors) {
            sqlx::query(&query)
                .bind(id)
                .bind(self.collection_id)
                .bind(Vector::from(vector))
                .bind(text)
                .bind(metadata)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::InsertError(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::InsertError(e.to_string()))?;

        debug!(collection = %self.collection, count = texts.len(), "stored embeddings");
        Ok(())
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn add_texts(
        &self,
        texts: &[String],
        metadatas: &[serde_json::Value],
    ) -> Result<Vec<Uuid>, StoreError> {
        let ids: Vec<Uuid> = texts.iter().map(|_| Uuid::new_v4()).collect();
        self.upsert(&ids, texts, metadatas).await?;
        Ok(ids)
    }

    async fn add_chunks(&self, chunks: &[DocumentChunk]) -> Result<usize, StoreError> {
        let ids: Vec<Uuid> = chunks.iter().map(|c| c.id).collect();
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let metadatas: Vec<serde_json::Value> = chunks.iter().map(DocumentChunk::metadata).collect();
        self.upsert(&ids, &texts, &metadatas).await?;
        Ok(chunks.len())
    }

    async fn similarity_search(&self, query: &str, k: u32) -> Result<Vec<SearchHit>, StoreError> {
        let embedding = Vector::from(self.embeddings.embed_query(query).await?);

        let sql = format!(
            r#"
            SELECT id, document, cmetadata, (embedding <=> $1) AS distance
            FROM {EMBEDDING_TABLE}
            WHERE collection_id = $2
            ORDER BY embedding <=> $1
            LIMIT $3
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(&embedding)
            .bind(self.collection_id)
            .bind(i64::from(k))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::SearchError(e.to_string()))?;

        rows.into_iter()
            .map(|row: PgRow| -> Result<SearchHit, StoreError> {
                let distance: f64 = row
                    .try_get("distance")
                    .map_err(|e| StoreError::SearchError(e.to_string()))?;
                Ok(SearchHit {
                    id: row
                        .try_get("id")
                        .map_err(|e| StoreError::SearchError(e.to_string()))?,
                    content: row
                        .try_get::<Option<String>, _>("document")
                        .map_err(|e| StoreError::SearchError(e.to_string()))?
                        .unwrap_or_default(),
                    metadata: row
                        .try_get::<Option<serde_json::Value>, _>("cmetadata")
                        .map_err(|e| StoreError::SearchError(e.to_string()))?
                        .unwrap_or(serde_json::Value::Null),
                    score: (1.0 - distance) as f32,
                })
            })
            .collect()
    }

    async fn collection_info(&self) -> Result<Option<CollectionInfo>, StoreError> {
        fetch_collection_info(&self.pool, &self.collection).await
    }

    async fn delete_collection(&self) -> Result<(), StoreError> {
        if delete_collection_rows(&self.pool, &self.collection).await? {
            info!(collection = %self.collection, "deleted collection");
        }
        Ok(())
    }

    fn collection(&self) -> &str {
        &self.collection
    }
}

async fn check_pgvector_extension(pool: &PgPool) -> Result<(), StoreError> {
    let result: Option<(String,)> =
        sqlx::query_as("SELECT extname::text FROM pg_extension WHERE extname = 'vector'")
            .fetch_optional(pool)
            .await
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?;

    if result.is_none() {
        return Err(StoreError::ExtensionMissing(
            "pgvector extension is not installed. Run: docingest bootstrap".to_string(),
        ));
    }
    Ok(())
}

async fn ensure_tables(pool: &PgPool) -> Result<(), StoreError> {
    let statements = [
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {COLLECTION_TABLE} (
                uuid UUID PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                cmetadata JSONB
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {EMBEDDING_TABLE} (
                id UUID PRIMARY KEY,
                collection_id UUID NOT NULL REFERENCES {COLLECTION_TABLE}(uuid) ON DELETE CASCADE,
                embedding vector NOT NULL,
                document TEXT,
                cmetadata JSONB
            )
            "#
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {EMBEDDING_TABLE}_collection_idx ON {EMBEDDING_TABLE} (collection_id)"
        ),
    ];

    for statement in &statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| StoreError::CollectionError(e.to_string()))?;
    }
    Ok(())
}

async fn fetch_collection_info(
    pool: &PgPool,
    name: &str,
) -> Result<Option<CollectionInfo>, StoreError> {
    let row: Option<(Uuid,)> = sqlx::query_as(&format!(
        "SELECT uuid FROM {COLLECTION_TABLE} WHERE name = $1"
    ))
    .bind(name)
    .fetch_optional(pool)
    .await
    .map_err(|e| StoreError::CollectionError(e.to_string()))?;

    let Some((uuid,)) = row else {
        return Ok(None);
    };

    let (count,): (i64,) = sqlx::query_as(&format!(
        "SELECT COUNT(*) FROM {EMBEDDING_TABLE} WHERE collection_id = $1"
    ))
    .bind(uuid)
    .fetch_one(pool)
    .await
    .map_err(|e| StoreError::CollectionError(e.to_string()))?;

    Ok(Some(CollectionInfo {
        name: name.to_string(),
        uuid,
        points_count: count.max(0) as u64,
    }))
}

async fn delete_collection_rows(pool: &PgPool, name: &str) -> Result<bool, StoreError> {
    let result = sqlx::query(&format!("DELETE FROM {COLLECTION_TABLE} WHERE name = $1"))
        .bind(name)
        .execute(pool)
        .await
        .map_err(|e| StoreError::CollectionError(e.to_string()))?;
    Ok(result.rows_affected() > 0)
}

async fn get_or_create_collection(
    pool: &PgPool,
    name: &str,
    model: &str,
) -> Result<Uuid, StoreError> {
    let metadata = serde_json::json!({ "embedding_model": model });

    sqlx::query(&format!(
        "INSERT INTO {COLLECTION_TABLE} (uuid, name, cmetadata) VALUES ($1, $2, $3) ON CONFLICT (name) DO NOTHING"
    ))
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(&metadata)
    .execute(pool)
    .await
    .map_err(|e| StoreError::CollectionError(e.to_string()))?;

    let (uuid,): (Uuid,) = sqlx::query_as(&format!(
        "SELECT uuid FROM {COLLECTION_TABLE} WHERE name = $1"
    ))
    .bind(name)
    .fetch_one(pool)
    .await
    .map_err(|e| StoreError::CollectionError(e.to_string()))?;

    Ok(uuid)
}
