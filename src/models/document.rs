use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Text loaded from one file, or one page of a PDF.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    /// Path the content was read from.
    pub source: String,
    /// Zero-based page number for paged formats.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

impl Document {
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source: source.into(),
            page: None,
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }
}

/// One piece of a [`Document`] produced by the splitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: Uuid,
    pub content: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    pub chunk_index: u32,
    /// Character offset of the chunk within the document content.
    pub start_index: usize,
}

impl DocumentChunk {
    /// Stable id so re-ingesting the same file overwrites rather than duplicates.
    pub fn generate_id(source: &str, page: Option<u32>, chunk_index: u32) -> Uuid {
        let name = match page {
            Some(page) => format!("{source}#{page}:{chunk_index}"),
            None => format!("{source}:{chunk_index}"),
        };
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
    }

    pub fn from_document(
        document: &Document,
        content: String,
        chunk_index: u32,
        start_index: usize,
    ) -> Self {
        Self {
            id: Self::generate_id(&document.source, document.page, chunk_index),
            content,
            source: document.source.clone(),
            page: document.page,
            chunk_index,
            start_index,
        }
    }

    /// Metadata stored next to the embedding.
    pub fn metadata(&self) -> serde_json::Value {
        let mut metadata = serde_json::json!({
            "source": self.source,
            "chunk_index": self.chunk_index,
            "start_index": self.start_index,
        });
        if let Some(page) = self.page {
            metadata["page"] = page.into();
        }
        metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_generate_id_is_stable() {
        let id = DocumentChunk::generate_id("/docs/report.pdf", Some(2), 5);
        assert_eq!(id, DocumentChunk::generate_id("/docs/report.pdf", Some(2), 5));
        assert_ne!(id, DocumentChunk::generate_id("/docs/report.pdf", Some(3), 5));
        assert_ne!(id, DocumentChunk::generate_id("/docs/report.pdf", Some(2), 6));
    }

    #[test]
    fn test_chunk_metadata() {
        let doc = Document::new("hello world", "/docs/a.txt");
        let chunk = DocumentChunk::from_document(&doc, "world".to_string(), 1, 6);
        let metadata = chunk.metadata();
        assert_eq!(metadata["source"], "/docs/a.txt");
        assert_eq!(metadata["start_index"], 6);
        assert!(metadata.get("page").is_none());

        let paged = DocumentChunk::from_document(&doc.with_page(3), "x".to_string(), 0, 0);
        assert_eq!(paged.metadata()["page"], 3);
    }
}
