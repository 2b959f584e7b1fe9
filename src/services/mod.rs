pub mod bootstrap;
pub mod chunker;
pub mod embedding;
pub mod loader;
pub mod pipeline;
pub mod tunnel;
pub mod vector_store;

pub use bootstrap::{
    BootstrapManager, BootstrapReport, BootstrapStatus, DatabaseOutcome, ExtensionOutcome,
    quote_ident,
};
pub use chunker::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, TextSplitter};
pub use embedding::{Embeddings, OpenAiEmbeddings};
pub use pipeline::{IngestOptions, IngestReport, Prepared, StatusReport, with_tunnel};
pub use tunnel::TunnelSession;
pub use vector_store::{CollectionInfo, InitOptions, PgVectorStore, SearchHit, VectorStore};
