//! Load documents from files and directories.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::LoaderError;
use crate::models::Document;

const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "rst", "text"];
const PDF_EXTENSION: &str = "pdf";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Text,
    Pdf,
}

fn file_kind(path: &Path) -> Option<FileKind> {
    let ext = path.extension()?.to_string_lossy().to_lowercase();
    if ext == PDF_EXTENSION {
        Some(FileKind::Pdf)
    } else if TEXT_EXTENSIONS.contains(&ext.as_str()) {
        Some(FileKind::Text)
    } else {
        None
    }
}

/// Supported files under `path`, sorted. A file path is returned as-is if supported.
pub fn collect_files(path: &Path) -> Result<Vec<PathBuf>, LoaderError> {
    if !path.exists() {
        return Err(LoaderError::NotFound(path.display().to_string()));
    }

    if path.is_file() {
        return Ok(file_kind(path).map(|_| vec![path.to_path_buf()]).unwrap_or_default());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path).follow_links(true) {
        let entry = entry.map_err(|e| LoaderError::WalkError(e.to_string()))?;
        if entry.file_type().is_file() && file_kind(entry.path()).is_some() {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Read one file into documents: one per text file, one per non-blank PDF page.
pub fn load_file(path: &Path) -> Result<Vec<Document>, LoaderError> {
    let source = path.display().to_string();

    match file_kind(path) {
        Some(FileKind::Text) => {
            let content = fs::read_to_string(path).map_err(|e| LoaderError::ReadError {
                path: source.clone(),
                source: e,
            })?;
            if content.trim().is_empty() {
                return Ok(Vec::new());
            }
            Ok(vec![Document::new(content, source)])
        }
        Some(FileKind::Pdf) => {
            let bytes = fs::read(path).map_err(|e| LoaderError::ReadError {
                path: source.clone(),
                source: e,
            })?;
            let pages = pdf_extract::extract_text_from_mem_by_pages(&bytes).map_err(|e| {
                LoaderError::PdfError {
                    path: source.clone(),
                    message: e.to_string(),
                }
            })?;
            Ok(page_documents(pages, &source))
        }
        None => {
            debug!(path = %source, "unsupported file type, skipping");
            Ok(Vec::new())
        }
    }
}

/// Load every supported file under each of `paths`.
///
/// Unreadable files are logged and skipped; a missing root path is an error.
pub fn load_paths(paths: &[PathBuf]) -> Result<Vec<Document>, LoaderError> {
    let mut documents = Vec::new();
    for root in paths {
        for file in collect_files(root)? {
            match load_file(&file) {
                Ok(docs) => documents.extend(docs),
                Err(e) => warn!(path = %file.display(), error = %e, "skipping file"),
            }
        }
    }
    Ok(documents)
}

/// Zero-based page numbers; blank pages are dropped but keep their number.
fn page_documents(pages: Vec<String>, source: &str) -> Vec<Document> {
    pages
        .into_iter()
        .enumerate()
        .filter(|(_, page)| !page.trim().is_empty())
        .map(|(i, page)| Document::new(page, source).with_page(i as u32))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_files_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("b.md"), "# B").unwrap();
        fs::write(dir.path().join("a.txt"), "A").unwrap();
        fs::write(dir.path().join("nested/c.TXT"), "C").unwrap();
        fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();

        let files = collect_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.md", "nested/c.TXT"]);
    }

    #[test]
    fn test_missing_path() {
        let err = collect_files(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, LoaderError::NotFound(_)));
    }

    #[test]
    fn test_load_paths_skips_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("empty.txt"), "  \n").unwrap();
        fs::write(dir.path().join("notes.md"), "Revenue grew 10%.").unwrap();

        let docs = load_paths(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "Revenue grew 10%.");
        assert!(docs[0].source.ends_with("notes.md"));
    }

    #[test]
    fn test_page_documents() {
        let pages = vec![
            "page one".to_string(),
            "  \n".to_string(),
            "page three".to_string(),
        ];
        let docs = page_documents(pages, "/r.pdf");
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].page, Some(0));
        assert_eq!(docs[0].content, "page one");
        assert_eq!(docs[1].page, Some(2));
        assert_eq!(docs[1].content, "page three");
        assert!(docs.iter().all(|d| d.source == "/r.pdf"));
    }

    #[test]
    fn test_invalid_pdf_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"not a pdf").unwrap();

        let err = load_file(&path).unwrap_err();
        assert!(matches!(err, LoaderError::PdfError { .. }));
    }
}
