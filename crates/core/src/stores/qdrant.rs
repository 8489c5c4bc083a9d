use crate::models::{ChunkProvenance, DocumentChunk, RetrievedChunk};
use crate::traits::{check_batch_shape, VectorIndex};
use crate::QaError;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

const BACKEND: &str = "qdrant";

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    score: f64,
    payload: PointPayload,
}

#[derive(Deserialize)]
struct PointPayload {
    text: String,
    #[serde(default)]
    provenance: Option<ChunkProvenance>,
}

#[derive(Deserialize)]
struct CountResponse {
    result: CountResult,
}

#[derive(Deserialize)]
struct CountResult {
    count: u64,
}

/// A Qdrant collection reached over its REST API.
pub struct QdrantStore {
    endpoint: String,
    collection: String,
    client: Client,
    vector_size: usize,
}

impl QdrantStore {
    pub fn new(endpoint: impl Into<String>, collection: impl Into<String>, vector_size: usize) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            client: Client::new(),
            vector_size,
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.endpoint, self.collection)
    }

    /// Creates the collection with cosine distance when it does not exist yet.
    pub async fn ensure_collection(&self) -> Result<(), QaError> {
        let response = self
            .client
            .get(self.collection_url())
            .send()
            .await
            .map_err(transport_error)?;

        if response.status().is_success() {
            return Ok(());
        }
        if response.status() != StatusCode::NOT_FOUND {
            return Err(backend_error(response).await);
        }

        let response = self
            .client
            .put(self.collection_url())
            .json(&json!({
                "vectors": {
                    "size": self.vector_size,
                    "distance": "Cosine",
                }
            }))
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(backend_error(response).await);
        }

        debug!(collection = %self.collection, "created qdrant collection");
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for QdrantStore {
    async fn add_chunks(
        &self,
        chunks: &[DocumentChunk],
        embeddings: &[Vec<f32>],
        provenance: &[ChunkProvenance],
    ) -> Result<(), QaError> {
        check_batch_shape(chunks, embeddings, provenance)?;

        let points = chunks
            .iter()
            .zip(embeddings)
            .zip(provenance)
            .map(|((chunk, embedding), provenance)| {
                if embedding.len() != self.vector_size {
                    return Err(QaError::Store(format!(
                        "embedding dimension {} != {}",
                        embedding.len(),
                        self.vector_size
                    )));
                }

                Ok(json!({
                    "id": uuid::Uuid::new_v4().to_string(),
                    "vector": embedding,
                    "payload": {
                        "text": chunk.text,
                        "provenance": provenance,
                    },
                }))
            })
            .collect::<Result<Vec<_>, QaError>>()?;

        if points.is_empty() {
            return Ok(());
        }

        self.ensure_collection().await?;

        let response = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url()))
            .json(&json!({ "points": points }))
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(backend_error(response).await);
        }

        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, QaError> {
        if query_vector.len() != self.vector_size {
            return Err(QaError::Store(format!(
                "query vector dim {} is not {}",
                query_vector.len(),
                self.vector_size
            )));
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&json!({
                "vector": query_vector,
                "limit": top_k,
                "with_payload": true,
            }))
            .send()
            .await
            .map_err(transport_error)?;

        // Nothing has been ingested yet.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(backend_error(response).await);
        }

        let parsed: SearchResponse = read_body(response, "search").await?;
        Ok(parsed
            .result
            .into_iter()
            .map(|point| RetrievedChunk {
                text: point.payload.text,
                score: point.score,
                provenance: point.payload.provenance,
            })
            .collect())
    }

    async fn len(&self) -> Result<usize, QaError> {
        let response = self
            .client
            .post(format!("{}/points/count", self.collection_url()))
            .json(&json!({ "exact": true }))
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(0);
        }
        if !response.status().is_success() {
            return Err(backend_error(response).await);
        }

        let parsed: CountResponse = read_body(response, "count").await?;
        usize::try_from(parsed.result.count)
            .map_err(|_| QaError::Store(format!("point count {} overflows", parsed.result.count)))
    }
}

fn transport_error(error: reqwest::Error) -> QaError {
    QaError::upstream(BACKEND, error.to_string())
}

async fn read_body<T: DeserializeOwned>(response: Response, operation: &str) -> Result<T, QaError> {
    let body = response.bytes().await.map_err(transport_error)?;
    serde_json::from_slice(&body)
        .map_err(|error| QaError::Store(format!("malformed qdrant {operation} response: {error}")))
}

async fn backend_error(response: Response) -> QaError {
    let status = response.status();
    let body = match response.text().await {
        Ok(body) => body,
        Err(error) => format!("<body unreadable: {error}>"),
    };
    QaError::upstream(BACKEND, format!("{status}: {body}"))
}
