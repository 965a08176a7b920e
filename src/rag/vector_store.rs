use std::time::Duration;

use anyhow::{Context, Result};
use qdrant_client::qdrant::{
    vectors_output::VectorsOptions, CreateCollectionBuilder, Distance, PointStruct, ScoredPoint,
    ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::models::DocumentChunk;

const CONNECT_BASE_DELAY: Duration = Duration::from_secs(1);
const RECREATE_PAUSE: Duration = Duration::from_millis(500);
const VERIFY_SAMPLE_SIZE: u32 = 5;

/// Gateway to the vector index. Owns collection lifecycle, batched
/// uploads, a post-upload integrity check and nearest-neighbor search.
pub struct VectorStore {
    client: Qdrant,
}

impl VectorStore {
    /// Connects with exponential backoff. Ingestion and startup treat an
    /// unreachable index as fatal, so after `max_retries` this errors with
    /// remediation guidance instead of degrading.
    pub async fn connect(url: &str, max_retries: u32) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .build()
            .with_context(|| format!("failed to build Qdrant client for {}", url))?;

        let mut delay = CONNECT_BASE_DELAY;
        for attempt in 1..=max_retries {
            match client.health_check().await {
                Ok(_) => {
                    tracing::info!("Connected to Qdrant at {}", url);
                    return Ok(Self { client });
                }
                Err(e) => {
                    tracing::warn!(
                        "Qdrant connection attempt {}/{} failed: {}",
                        attempt,
                        max_retries,
                        e
                    );
                }
            }
            if attempt < max_retries {
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }

        anyhow::bail!(
            "Qdrant unreachable at {} after {} attempts. Start it with: \
             docker run -d -p 6333:6333 -p 6334:6334 qdrant/qdrant",
            url,
            max_retries
        )
    }

    /// Drops the collection if it exists and creates it fresh with cosine
    /// distance. Ingestion is idempotent via full rebuild; there is no
    /// incremental merge path.
    pub async fn recreate_collection(&self, name: &str, vector_size: usize) -> Result<()> {
        if self.client.collection_exists(name).await? {
            tracing::info!("Deleting existing collection '{}'", name);
            self.client.delete_collection(name).await?;
            // Give the backend a moment to finish cleanup before recreating.
            tokio::time::sleep(RECREATE_PAUSE).await;
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(VectorParamsBuilder::new(vector_size as u64, Distance::Cosine)),
            )
            .await
            .with_context(|| format!("failed to create collection '{}'", name))?;

        tracing::info!("Created collection '{}' (dim {})", name, vector_size);
        Ok(())
    }

    /// Uploads vectors and their chunks in fixed-size batches, waiting on
    /// each batch so failures surface immediately and memory stays
    /// bounded. Point ids are sequential across the whole upload.
    pub async fn upload(
        &self,
        collection: &str,
        vectors: &[Vec<f32>],
        chunks: &[DocumentChunk],
        vector_size: usize,
        batch_size: usize,
    ) -> Result<()> {
        if vectors.len() != chunks.len() {
            anyhow::bail!(
                "vector/chunk count mismatch: {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            );
        }
        check_dimensions(vectors, vector_size)?;

        let batch_size = batch_size.max(1);
        let total_batches = vectors.len().div_ceil(batch_size);

        for (batch_no, (vector_batch, chunk_batch)) in vectors
            .chunks(batch_size)
            .zip(chunks.chunks(batch_size))
            .enumerate()
        {
            let base_id = batch_no * batch_size;
            let points: Vec<PointStruct> = vector_batch
                .iter()
                .zip(chunk_batch.iter())
                .enumerate()
                .map(|(offset, (vector, chunk))| {
                    let mut payload = JsonMap::new();
                    payload.insert("text".to_string(), JsonValue::String(chunk.text.clone()));
                    payload.insert(
                        "chunk_id".to_string(),
                        JsonValue::String(chunk.chunk_id.clone()),
                    );
                    payload.insert("index".to_string(), JsonValue::from(chunk.index as u64));
                    PointStruct::new((base_id + offset) as u64, vector.clone(), payload)
                })
                .collect();

            self.client
                .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
                .await
                .with_context(|| {
                    format!(
                        "failed to upload batch {}/{} to '{}'",
                        batch_no + 1,
                        total_batches,
                        collection
                    )
                })?;

            tracing::info!(
                "Uploaded batch {}/{} to '{}' ({} points)",
                batch_no + 1,
                total_batches,
                collection,
                vector_batch.len()
            );
        }

        tracing::info!(
            "Uploaded {} points to collection '{}'",
            vectors.len(),
            collection
        );
        Ok(())
    }

    /// Post-upload integrity gate: reads back the point count and a small
    /// sample of points. Fails if the collection is empty, a sampled
    /// vector is empty, or a sampled point is missing its text payload.
    pub async fn verify(&self, collection: &str) -> Result<bool> {
        let info = self.client.collection_info(collection).await?;
        let point_count = info.result.and_then(|r| r.points_count).unwrap_or(0);
        if point_count == 0 {
            tracing::warn!("Collection '{}' has no points", collection);
            return Ok(false);
        }

        let sample = self
            .client
            .scroll(
                ScrollPointsBuilder::new(collection)
                    .limit(VERIFY_SAMPLE_SIZE)
                    .with_payload(true)
                    .with_vectors(true),
            )
            .await?;

        for point in sample.result {
            let has_text = point
                .payload
                .get("text")
                .and_then(|v| v.as_str())
                .map(|t| !t.is_empty())
                .unwrap_or(false);
            if !has_text {
                tracing::warn!(
                    "Collection '{}' has a point without text payload",
                    collection
                );
                return Ok(false);
            }

            let vector_len = point
                .vectors
                .and_then(|v| v.vectors_options)
                .map(|options| match options {
                    VectorsOptions::Vector(v) => v.data.len(),
                    VectorsOptions::Vectors(named) => {
                        named.vectors.values().map(|v| v.data.len()).sum()
                    }
                })
                .unwrap_or(0);
            if vector_len == 0 {
                tracing::warn!(
                    "Collection '{}' has a point with an empty vector",
                    collection
                );
                return Ok(false);
            }
        }

        tracing::info!(
            "Verified collection '{}': {} points, sample intact",
            collection,
            point_count
        );
        Ok(true)
    }

    /// Nearest-neighbor search with a caller-supplied relevance floor.
    pub async fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        limit: u64,
        score_threshold: f32,
    ) -> Result<Vec<ScoredPoint>> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(collection, query_vector.to_vec(), limit)
                    .with_payload(true)
                    .score_threshold(score_threshold),
            )
            .await?;
        Ok(response.result)
    }
}

/// All vectors in a collection must share the configured dimensionality.
/// A mismatched row fails loudly rather than being truncated or padded.
fn check_dimensions(vectors: &[Vec<f32>], expected: usize) -> Result<()> {
    for (i, vector) in vectors.iter().enumerate() {
        if vector.len() != expected {
            anyhow::bail!(
                "vector {} has dimension {} but the collection expects {}",
                i,
                vector.len(),
                expected
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_dimensions_accepts_uniform_rows() {
        let vectors = vec![vec![0.0; 4], vec![1.0; 4]];
        assert!(check_dimensions(&vectors, 4).is_ok());
    }

    #[test]
    fn test_check_dimensions_rejects_mismatch() {
        let vectors = vec![vec![0.0; 4], vec![1.0; 3]];
        let err = check_dimensions(&vectors, 4).unwrap_err();
        assert!(err.to_string().contains("dimension 3"));
    }
}
