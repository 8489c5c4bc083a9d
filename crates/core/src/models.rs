use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A contiguous slice of extracted document text, ready to embed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub chunk_index: u64,
    pub text: String,
}

/// Where a stored chunk came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkProvenance {
    pub source_name: String,
    pub document_checksum: String,
    pub chunk_index: u64,
    pub ingested_at: DateTime<Utc>,
}

/// Document-level provenance shared by every chunk of one ingest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSource {
    pub source_name: String,
    pub document_checksum: String,
    pub ingested_at: DateTime<Utc>,
}

impl DocumentSource {
    pub fn for_chunk(&self, chunk: &DocumentChunk) -> ChunkProvenance {
        ChunkProvenance {
            source_name: self.source_name.clone(),
            document_checksum: self.document_checksum.clone(),
            chunk_index: chunk.chunk_index,
            ingested_at: self.ingested_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub score: f64,
    pub provenance: Option<ChunkProvenance>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub query: String,
    pub answer: String,
    pub sources: Vec<RetrievedChunk>,
}

impl Answer {
    pub fn source_texts(&self) -> Vec<String> {
        self.sources.iter().map(|source| source.text.clone()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub source_name: String,
    pub document_checksum: String,
    pub chunk_count: usize,
}

/// Fixed retrieval-pipeline parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QaOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
}

impl Default for QaOptions {
    fn default() -> Self {
        Self {
            chunk_size: 700,
            chunk_overlap: 100,
            top_k: 4,
        }
    }
}
