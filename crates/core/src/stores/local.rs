use crate::models::{ChunkProvenance, DocumentChunk, RetrievedChunk};
use crate::traits::{check_batch_shape, VectorIndex};
use crate::QaError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub const DATABASE_FILE: &str = "collection.sqlite3";

const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    text TEXT NOT NULL,
    embedding_dimension INTEGER NOT NULL,
    embedding_vector BLOB NOT NULL,
    source_name TEXT NOT NULL,
    document_checksum TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    ingested_at TEXT NOT NULL
);
";

/// Vector collection kept in a SQLite database inside one directory.
///
/// Every `add_chunks` call is a single transaction: a batch that fails or is
/// interrupted leaves no rows behind. Search scans every stored vector by
/// cosine similarity. Nothing is ever compacted or evicted.
pub struct LocalVectorStore {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

struct PendingRow {
    text: String,
    embedding: Vec<u8>,
    provenance: ChunkProvenance,
}

impl LocalVectorStore {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, QaError> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(DATABASE_FILE);

        let db_path = path.clone();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, QaError> {
            let conn = Connection::open(&db_path)?;
            conn.pragma_update(None, "synchronous", "FULL")?;
            conn.execute_batch(SCHEMA_SQL)?;
            Ok(conn)
        })
        .await
        .map_err(|error| QaError::Task(error.to_string()))??;

        debug!(path = %path.display(), "opened local vector store");
        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn database_path(&self) -> &Path {
        &self.path
    }

    async fn with_connection<T, F>(&self, work: F) -> Result<T, QaError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, QaError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            work(&mut *guard)
        })
        .await
        .map_err(|error| QaError::Task(error.to_string()))?
    }
}

#[async_trait]
impl VectorIndex for LocalVectorStore {
    async fn add_chunks(
        &self,
        chunks: &[DocumentChunk],
        embeddings: &[Vec<f32>],
        provenance: &[ChunkProvenance],
    ) -> Result<(), QaError> {
        check_batch_shape(chunks, embeddings, provenance)?;
        let Some(first) = embeddings.first() else {
            return Ok(());
        };

        let dimension = first.len();
        if let Some(bad) = embeddings.iter().find(|vector| vector.len() != dimension) {
            return Err(QaError::Store(format!(
                "embedding dimension {} != {}",
                bad.len(),
                dimension
            )));
        }

        let rows = chunks
            .iter()
            .zip(embeddings)
            .zip(provenance)
            .map(|((chunk, embedding), provenance)| PendingRow {
                text: chunk.text.clone(),
                embedding: encode_embedding(embedding),
                provenance: provenance.clone(),
            })
            .collect::<Vec<_>>();

        let total = self
            .with_connection(move |conn| {
                let stored: Option<i64> = conn
                    .query_row("SELECT embedding_dimension FROM chunks LIMIT 1", [], |row| {
                        row.get(0)
                    })
                    .optional()?;
                if let Some(stored) = stored {
                    if stored != dimension as i64 {
                        return Err(QaError::Store(format!(
                            "embedding dimension {dimension} != {stored}"
                        )));
                    }
                }

                let tx = conn.transaction()?;
                {
                    let mut insert = tx.prepare(
                        "INSERT INTO chunks (
                            text, embedding_dimension, embedding_vector,
                            source_name, document_checksum, chunk_index, ingested_at
                         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    )?;
                    for row in &rows {
                        insert.execute(params![
                            row.text,
                            dimension as i64,
                            row.embedding,
                            row.provenance.source_name,
                            row.provenance.document_checksum,
                            row.provenance.chunk_index as i64,
                            row.provenance.ingested_at,
                        ])?;
                    }
                }
                tx.commit()?;

                count_rows(conn)
            })
            .await?;

        debug!(added = chunks.len(), total, "appended chunks");
        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, QaError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let query = query_vector.to_vec();
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT text, embedding_dimension, embedding_vector,
                        source_name, document_checksum, chunk_index, ingested_at
                 FROM chunks
                 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map([], |row| {
                let dimension: i64 = row.get(1)?;
                let chunk_index: i64 = row.get(5)?;
                let ingested_at: DateTime<Utc> = row.get(6)?;
                Ok((
                    row.get::<_, String>(0)?,
                    dimension,
                    row.get::<_, Vec<u8>>(2)?,
                    ChunkProvenance {
                        source_name: row.get(3)?,
                        document_checksum: row.get(4)?,
                        chunk_index: u64::try_from(chunk_index)
                            .map_err(|_| rusqlite::Error::IntegralValueOutOfRange(5, chunk_index))?,
                        ingested_at,
                    },
                ))
            })?;

            let mut hits = Vec::new();
            for row in rows {
                let (text, dimension, blob, provenance) = row?;
                if dimension != query.len() as i64 {
                    return Err(QaError::Store(format!(
                        "query vector dim {} is not {}",
                        query.len(),
                        dimension
                    )));
                }
                let embedding = decode_embedding(&blob, query.len())?;
                hits.push(RetrievedChunk {
                    text,
                    score: cosine_similarity(&query, &embedding),
                    provenance: Some(provenance),
                });
            }

            // Stable sort: equal scores keep insertion order.
            hits.sort_by(|left, right| right.score.total_cmp(&left.score));
            hits.truncate(top_k);
            Ok(hits)
        })
        .await
    }

    async fn len(&self) -> Result<usize, QaError> {
        self.with_connection(|conn| count_rows(conn)).await
    }
}

fn count_rows(conn: &Connection) -> Result<usize, QaError> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
    Ok(usize::try_from(count).unwrap_or_default())
}

fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(std::mem::size_of_val(vector));
    for &value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn decode_embedding(blob: &[u8], dimension: usize) -> Result<Vec<f32>, QaError> {
    let expected_len = dimension * std::mem::size_of::<f32>();
    if blob.len() != expected_len {
        return Err(QaError::Store(format!(
            "embedding blob holds {} bytes, expected {expected_len}",
            blob.len()
        )));
    }

    Ok(blob
        .chunks_exact(4)
        .map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        .collect())
}

fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    let mut dot = 0f64;
    let mut left_norm = 0f64;
    let mut right_norm = 0f64;
    for (a, b) in left.iter().zip(right) {
        let (a, b) = (f64::from(*a), f64::from(*b));
        dot += a * b;
        left_norm += a * a;
        right_norm += b * b;
    }

    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    dot / (left_norm.sqrt() * right_norm.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    fn batch(texts: &[&str]) -> (Vec<DocumentChunk>, Vec<ChunkProvenance>) {
        let chunks = texts
            .iter()
            .enumerate()
            .map(|(index, text)| DocumentChunk {
                chunk_index: index as u64,
                text: (*text).to_string(),
            })
            .collect::<Vec<_>>();
        let provenance = chunks
            .iter()
            .map(|chunk| ChunkProvenance {
                source_name: "invoice.pdf".to_string(),
                document_checksum: "abc".to_string(),
                chunk_index: chunk.chunk_index,
                ingested_at: Utc::now(),
            })
            .collect();
        (chunks, provenance)
    }

    #[tokio::test]
    async fn empty_store_returns_no_hits() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = LocalVectorStore::open(dir.path()).await?;
        assert!(store.is_empty().await?);
        assert!(store.search(&[1.0, 0.0], 4).await?.is_empty());
        assert!(store.database_path().is_file());
        Ok(())
    }

    #[tokio::test]
    async fn search_orders_nearest_first_and_caps_at_k() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = LocalVectorStore::open(dir.path()).await?;
        let (chunks, provenance) = batch(&["east", "north", "north-east"]);
        let embeddings = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]];
        store.add_chunks(&chunks, &embeddings, &provenance).await?;

        let hits = store.search(&[0.0, 1.0], 2).await?;
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "north");
        assert_eq!(hits[1].text, "north-east");
        assert!(hits[0].score >= hits[1].score);

        let all = store.search(&[0.0, 1.0], 10).await?;
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].text, "east");
        Ok(())
    }

    #[tokio::test]
    async fn entries_survive_reopen() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        {
            let store = LocalVectorStore::open(dir.path()).await?;
            let (chunks, provenance) = batch(&["Total: $500.00"]);
            store.add_chunks(&chunks, &[vec![0.0, 1.0]], &provenance).await?;
        }

        let reopened = LocalVectorStore::open(dir.path()).await?;
        assert_eq!(reopened.len().await?, 1);
        let hits = reopened.search(&[0.0, 1.0], 4).await?;
        assert_eq!(hits[0].text, "Total: $500.00");
        let provenance = hits[0].provenance.as_ref().expect("provenance should be stored");
        assert_eq!(provenance.source_name, "invoice.pdf");
        assert_eq!(provenance.chunk_index, 0);
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_adds_are_kept() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = LocalVectorStore::open(dir.path()).await?;
        let (chunks, provenance) = batch(&["same"]);
        store.add_chunks(&chunks, &[vec![1.0, 0.0]], &provenance).await?;
        store.add_chunks(&chunks, &[vec![1.0, 0.0]], &provenance).await?;

        let hits = store.search(&[1.0, 0.0], 4).await?;
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|hit| hit.text == "same"));
        Ok(())
    }

    #[tokio::test]
    async fn rejected_batches_write_nothing() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = LocalVectorStore::open(dir.path()).await?;
        let (chunks, provenance) = batch(&["a", "b"]);

        let mismatched = store.add_chunks(&chunks, &[vec![1.0, 0.0]], &provenance).await;
        assert!(matches!(mismatched, Err(QaError::Store(_))));

        let ragged = store
            .add_chunks(&chunks, &[vec![1.0, 0.0], vec![1.0]], &provenance)
            .await;
        assert!(matches!(ragged, Err(QaError::Store(_))));

        assert_eq!(store.len().await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn stored_dimension_is_enforced() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = LocalVectorStore::open(dir.path()).await?;
        let (chunks, provenance) = batch(&["a"]);
        store.add_chunks(&chunks, &[vec![1.0, 0.0]], &provenance).await?;

        let wider = store
            .add_chunks(&chunks, &[vec![1.0, 0.0, 0.0]], &provenance)
            .await;
        assert!(matches!(wider, Err(QaError::Store(_))));

        let result = store.search(&[1.0, 0.0, 0.0], 1).await;
        assert!(matches!(result, Err(QaError::Store(_))));
        assert_eq!(store.len().await?, 1);
        Ok(())
    }

    // A trigger aborts the insert of one row the way a full disk would fail a write.
    fn fail_inserts_of(path: &Path, text: &str) -> Result<(), rusqlite::Error> {
        let conn = Connection::open(path)?;
        conn.execute_batch(&format!(
            "CREATE TRIGGER fail_insert BEFORE INSERT ON chunks
             WHEN NEW.text = '{text}'
             BEGIN SELECT RAISE(ABORT, 'disk full'); END;"
        ))
    }

    fn allow_inserts(path: &Path) -> Result<(), rusqlite::Error> {
        Connection::open(path)?.execute_batch("DROP TRIGGER fail_insert;")
    }

    #[tokio::test]
    async fn failed_batch_leaves_no_partial_rows() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = LocalVectorStore::open(dir.path()).await?;
        let (chunks, provenance) = batch(&["first"]);
        store.add_chunks(&chunks, &[vec![1.0, 0.0]], &provenance).await?;

        fail_inserts_of(store.database_path(), "boom")?;
        let (chunks, provenance) = batch(&["partial", "boom"]);
        let failed = store
            .add_chunks(&chunks, &[vec![0.0, 1.0], vec![0.7, 0.7]], &provenance)
            .await;
        assert!(matches!(failed, Err(QaError::Database(_))));
        assert_eq!(store.len().await?, 1);

        let reopened = LocalVectorStore::open(dir.path()).await?;
        let hits = reopened.search(&[0.0, 1.0], 10).await?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "first");
        Ok(())
    }

    #[tokio::test]
    async fn store_keeps_accepting_batches_after_a_failure() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = LocalVectorStore::open(dir.path()).await?;
        let (chunks, provenance) = batch(&["first"]);
        store.add_chunks(&chunks, &[vec![1.0, 0.0]], &provenance).await?;

        fail_inserts_of(store.database_path(), "second")?;
        let (chunks, provenance) = batch(&["second"]);
        assert!(store
            .add_chunks(&chunks, &[vec![0.0, 1.0]], &provenance)
            .await
            .is_err());

        allow_inserts(store.database_path())?;
        store.add_chunks(&chunks, &[vec![0.0, 1.0]], &provenance).await?;
        drop(store);

        let reopened = LocalVectorStore::open(dir.path()).await?;
        assert_eq!(reopened.len().await?, 2);
        let hits = reopened.search(&[0.0, 1.0], 1).await?;
        assert_eq!(hits[0].text, "second");
        Ok(())
    }

    #[test]
    fn embedding_blob_keeps_values() -> Result<(), QaError> {
        let vector = vec![0.25f32, -1.5, 3.0];
        assert_eq!(decode_embedding(&encode_embedding(&vector), 3)?, vector);
        assert!(matches!(
            decode_embedding(&[0, 0, 0], 1),
            Err(QaError::Store(_))
        ));
        Ok(())
    }

    #[test]
    fn cosine_of_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[2.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
    }
}
