//! End-to-end ingestion: tunnel, bootstrap, store, load, split, upload.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use indicatif::ProgressBar;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::models::{DEFAULT_VECTOR_EXTENSION, DocumentChunk, Settings, TunnelConfig};
use crate::services::bootstrap::{BootstrapManager, BootstrapReport, BootstrapStatus};
use crate::services::chunker::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, TextSplitter};
use crate::services::embedding::{Embeddings, OpenAiEmbeddings};
use crate::services::loader;
use crate::services::tunnel::TunnelSession;
use crate::services::vector_store::{CollectionInfo, InitOptions, PgVectorStore, VectorStore};

/// Chunks sent to the store per upload.
pub const DEFAULT_UPLOAD_BATCH: usize = 64;

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub paths: Vec<PathBuf>,
    pub bootstrap: bool,
    pub pre_delete_collection: bool,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub upload_batch: usize,
}

impl IngestOptions {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            bootstrap: true,
            pre_delete_collection: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            upload_batch: DEFAULT_UPLOAD_BATCH,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub collection: String,
    pub documents: usize,
    pub chunks: usize,
    pub stored: usize,
    pub bootstrap: Option<BootstrapReport>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub environment: String,
    pub tunnel_enabled: bool,
    pub database: BootstrapStatus,
    pub collection: Option<CollectionInfo>,
}

/// Run `work` with the configured route to the database held open.
///
/// When tunnelling is disabled `work` runs directly. Otherwise the session is
/// stopped after `work` finishes, whether it succeeded or failed; if the
/// future is dropped instead, the session's `Drop` kills the forwarder.
pub async fn with_tunnel<T, F, Fut>(tunnel: &TunnelConfig, work: F) -> Result<T, PipelineError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, PipelineError>>,
{
    if !tunnel.enabled {
        return work().await;
    }

    let mut session = TunnelSession::open(tunnel.clone()).await?;
    let result = work().await;
    session.stop().await;
    result
}

/// Create the vector database and enable its extension.
pub async fn bootstrap(settings: &Settings) -> Result<BootstrapReport, PipelineError> {
    with_tunnel(&settings.tunnel, || bootstrap_over_route(settings)).await
}

async fn bootstrap_over_route(settings: &Settings) -> Result<BootstrapReport, PipelineError> {
    let report = BootstrapManager::new(settings.admin_connection())
        .bootstrap(&settings.database.vector_db_name, DEFAULT_VECTOR_EXTENSION)
        .await?;
    Ok(report)
}

/// Read-only connectivity check. Never creates anything.
pub async fn status(settings: &Settings) -> Result<StatusReport, PipelineError> {
    with_tunnel(&settings.tunnel, || async move {
        let database = BootstrapManager::new(settings.admin_connection())
            .inspect(&settings.database.vector_db_name, DEFAULT_VECTOR_EXTENSION)
            .await?;

        let collection = if database.database_exists && database.extension_enabled {
            PgVectorStore::inspect(
                &settings.database.collection_name,
                &settings.vector_connection(),
            )
            .await?
        } else {
            None
        };

        Ok(StatusReport {
            environment: settings.environment.to_string(),
            tunnel_enabled: settings.tunnel.enabled,
            database,
            collection,
        })
    })
    .await
}

/// Documents read and split, ready for upload.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub documents: usize,
    pub chunks: Vec<DocumentChunk>,
}

/// Load and split without touching the network.
pub fn prepare(options: &IngestOptions) -> Result<Prepared, PipelineError> {
    let splitter = TextSplitter::new(options.chunk_size, options.chunk_overlap)?;
    let documents = loader::load_paths(&options.paths)?;
    let chunks = splitter.split_documents(&documents);
    info!(
        documents = documents.len(),
        chunks = chunks.len(),
        "prepared documents"
    );
    Ok(Prepared {
        documents: documents.len(),
        chunks,
    })
}

/// Full ingestion run.
///
/// Files are read and split before the tunnel opens, so local errors never
/// leave a forwarder behind.
pub async fn ingest(
    settings: &Settings,
    options: &IngestOptions,
    progress: &ProgressBar,
) -> Result<IngestReport, PipelineError> {
    let start = Instant::now();

    let prepared = prepare(options)?;
    let embeddings: Arc<dyn Embeddings> = Arc::new(OpenAiEmbeddings::new(&settings.model)?);

    let chunk_refs = prepared.chunks.as_slice();
    let (bootstrap, stored) = with_tunnel(&settings.tunnel, || async move {
        let bootstrap = if options.bootstrap {
            Some(bootstrap_over_route(settings).await?)
        } else {
            None
        };

        let init = InitOptions {
            pre_delete_collection: options.pre_delete_collection,
            ..InitOptions::default()
        };
        let store = PgVectorStore::initialize(
            Some(embeddings),
            &settings.database.collection_name,
            &settings.vector_connection(),
            &init,
        )
        .await?;

        let result = upload(&store, chunk_refs, options.upload_batch, progress).await;
        store.close().await;
        Ok((bootstrap, result?))
    })
    .await?;

    let report = IngestReport {
        collection: settings.database.collection_name.clone(),
        documents: prepared.documents,
        chunks: prepared.chunks.len(),
        stored,
        bootstrap,
        duration_ms: start.elapsed().as_millis() as u64,
    };
    info!(
        collection = %report.collection,
        stored = report.stored,
        duration_ms = report.duration_ms,
        "ingestion complete"
    );
    Ok(report)
}

async fn upload(
    store: &dyn VectorStore,
    chunks: &[DocumentChunk],
    batch_size: usize,
    progress: &ProgressBar,
) -> Result<usize, PipelineError> {
    if chunks.is_empty() {
        warn!("no chunks to store");
        return Ok(0);
    }

    progress.set_length(chunks.len() as u64);
    let mut stored = 0;
    for batch in chunks.chunks(batch_size.max(1)) {
        stored += store.add_chunks(batch).await?;
        progress.inc(batch.len() as u64);
    }
    progress.finish_and_clear();
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{StoreError, TunnelError};
    use crate::models::sample_settings;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct RecordingStore {
        batches: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl VectorStore for RecordingStore {
        async fn add_texts(
            &self,
            texts: &[String],
            _metadatas: &[serde_json::Value],
        ) -> Result<Vec<uuid::Uuid>, StoreError> {
            Ok(texts.iter().map(|_| uuid::Uuid::new_v4()).collect())
        }

        async fn add_chunks(&self, chunks: &[DocumentChunk]) -> Result<usize, StoreError> {
            self.batches.lock().unwrap().push(chunks.len());
            Ok(chunks.len())
        }

        async fn similarity_search(
            &self,
            _query: &str,
            _k: u32,
        ) -> Result<Vec<crate::services::vector_store::SearchHit>, StoreError> {
            Ok(Vec::new())
        }

        async fn collection_info(&self) -> Result<Option<CollectionInfo>, StoreError> {
            Ok(None)
        }

        async fn delete_collection(&self) -> Result<(), StoreError> {
            Ok(())
        }

        fn collection(&self) -> &str {
            "recording"
        }
    }

    #[tokio::test]
    async fn test_with_tunnel_disabled_runs_work_directly() {
        let mut tunnel = sample_settings().tunnel;
        tunnel.enabled = false;
        let value = with_tunnel(&tunnel, || async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_with_tunnel_start_failure_skips_work() {
        let mut tunnel = sample_settings().tunnel;
        tunnel.enabled = true;
        tunnel.ssh_binary = "/nonexistent/ssh-binary".to_string();
        tunnel.local_bind_port = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let ran = AtomicBool::new(false);
        let ran_ref = &ran;
        let err = with_tunnel(&tunnel, || async move {
            ran_ref.store(true, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Tunnel(TunnelError::SpawnError { .. })
        ));
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_prepare_loads_and_splits() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "word ".repeat(100)).unwrap();

        let mut options = IngestOptions::new(vec![dir.path().to_path_buf()]);
        options.chunk_size = 100;
        options.chunk_overlap = 20;

        let prepared = prepare(&options).unwrap();
        assert_eq!(prepared.documents, 1);
        let chunks = prepared.chunks;
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.content.chars().count() <= 100));
    }

    #[test]
    fn test_prepare_rejects_bad_overlap() {
        let mut options = IngestOptions::new(Vec::new());
        options.chunk_overlap = options.chunk_size;
        assert!(matches!(prepare(&options), Err(PipelineError::Config(_))));
    }

    #[tokio::test]
    async fn test_upload_batches() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "word ".repeat(200)).unwrap();
        let mut options = IngestOptions::new(vec![dir.path().to_path_buf()]);
        options.chunk_size = 50;
        options.chunk_overlap = 0;
        let chunks = prepare(&options).unwrap().chunks;

        let store = RecordingStore::default();
        let stored = upload(&store, &chunks, 4, &ProgressBar::hidden())
            .await
            .unwrap();

        assert_eq!(stored, chunks.len());
        let batches = store.batches.lock().unwrap();
        assert!(batches.iter().all(|&n| n <= 4));
        assert_eq!(batches.iter().sum::<usize>(), chunks.len());
    }

    #[tokio::test]
    async fn test_upload_nothing() {
        let store = RecordingStore::default();
        let stored = upload(&store, &[], 4, &ProgressBar::hidden()).await.unwrap();
        assert_eq!(stored, 0);
        assert!(store.batches.lock().unwrap().is_empty());
    }
}
