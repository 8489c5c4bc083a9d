use crate::chunking::{build_chunks, ChunkingConfig};
use crate::embeddings::Embedder;
use crate::extractor::PdfExtractor;
use crate::models::{ChunkProvenance, DocumentChunk, DocumentSource};
use crate::QaError;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_file(path: &Path) -> Result<String, QaError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// A document that has been extracted, chunked and embedded but not stored.
#[derive(Debug, Clone)]
pub struct PreparedDocument {
    pub source: DocumentSource,
    pub chunks: Vec<DocumentChunk>,
    pub embeddings: Vec<Vec<f32>>,
}

impl PreparedDocument {
    pub fn provenance(&self) -> Vec<ChunkProvenance> {
        self.chunks
            .iter()
            .map(|chunk| self.source.for_chunk(chunk))
            .collect()
    }
}

/// Runs every step of ingestion that happens before the store is touched.
///
/// Blocking: parses the PDF and runs the embedder on the calling thread.
pub fn prepare_document(
    path: &Path,
    extractor: &dyn PdfExtractor,
    embedder: &dyn Embedder,
    config: ChunkingConfig,
) -> Result<PreparedDocument, QaError> {
    let text = extractor.extract_text(path)?;
    if text.is_empty() {
        return Err(QaError::EmptyDocument(format!(
            "no text extracted from {}",
            path.display()
        )));
    }

    let chunks = build_chunks(&text, config)?;
    if chunks.is_empty() {
        return Err(QaError::EmptyDocument(format!(
            "no text chunks generated from {}",
            path.display()
        )));
    }

    let texts = chunks.iter().map(|chunk| chunk.text.clone()).collect::<Vec<_>>();
    let embeddings = embedder.embed_batch(&texts)?;
    if embeddings.len() != chunks.len() {
        return Err(QaError::Embedding(format!(
            "embedder returned {} vectors for {} chunks",
            embeddings.len(),
            chunks.len()
        )));
    }

    Ok(PreparedDocument {
        source: document_source(path)?,
        chunks,
        embeddings,
    })
}

fn document_source(path: &Path) -> Result<DocumentSource, QaError> {
    let source_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.to_string_lossy().to_string());

    Ok(DocumentSource {
        source_name,
        document_checksum: digest_file(path)?,
        ingested_at: Utc::now(),
    })
}
