use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;

use crate::models::{EmbeddingRequest, EmbeddingResponse};

const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(3);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of embedding a single text. Failures are first-class values so
/// the degraded path stays observable instead of disappearing into a log
/// line.
#[derive(Debug, Clone, PartialEq)]
pub enum EmbedOutcome {
    Embedded(Vec<f32>),
    Failed,
}

/// Client for the external embedding service. Texts go in, unit-norm
/// vectors come out; a failed item yields an all-zero row of the
/// configured dimensionality and processing continues.
pub struct EmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
    dimension: usize,
    batch_size: usize,
}

impl EmbeddingClient {
    /// Connects to the embedding service, failing fast if it is
    /// unreachable. This is the only point where the client errors;
    /// every later call degrades instead.
    pub async fn connect(
        base_url: &str,
        model: &str,
        dimension: usize,
        batch_size: usize,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        let version_url = format!("{}/api/version", base_url);
        http.get(&version_url)
            .timeout(VERSION_PROBE_TIMEOUT)
            .send()
            .await
            .with_context(|| {
                format!(
                    "embedding service unreachable at {} (start it with: ollama serve)",
                    base_url
                )
            })?;

        tracing::info!("Embedding client connected to {} (model {})", base_url, model);

        Ok(Self {
            http,
            base_url: base_url.to_string(),
            model: model.to_string(),
            dimension,
            batch_size: batch_size.max(1),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_one(&self, text: &str) -> EmbedOutcome {
        let url = format!("{}/api/embeddings", self.base_url);
        let request = EmbeddingRequest {
            model: self.model.clone(),
            prompt: text.to_string(),
        };

        let response = match self.http.post(&url).json(&request).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!("Embedding request failed: {}", e);
                return EmbedOutcome::Failed;
            }
        };

        if !response.status().is_success() {
            tracing::error!("Embedding request returned {}", response.status());
            return EmbedOutcome::Failed;
        }

        match response.json::<EmbeddingResponse>().await {
            Ok(body) if !body.embedding.is_empty() => EmbedOutcome::Embedded(body.embedding),
            Ok(_) => {
                tracing::warn!(
                    "No embedding in response for text: {}...",
                    text_prefix(text, 50)
                );
                EmbedOutcome::Failed
            }
            Err(e) => {
                tracing::warn!("Malformed embedding response: {}", e);
                EmbedOutcome::Failed
            }
        }
    }

    /// Embeds a sequence of texts in batches. One row per input text, in
    /// input order, each normalized to unit length. A failed item becomes
    /// an all-zero row; a single bad item never aborts its batch.
    pub async fn embed(&self, texts: &[String]) -> Vec<Vec<f32>> {
        let mut rows = Vec::with_capacity(texts.len());

        for (batch_no, batch) in texts.chunks(self.batch_size).enumerate() {
            let mut batch_dead = false;
            for text in batch {
                if batch_dead {
                    rows.push(vec![0.0; self.dimension]);
                    continue;
                }
                match self.embed_one(text).await {
                    EmbedOutcome::Embedded(vector) => rows.push(vector),
                    EmbedOutcome::Failed => {
                        tracing::error!("Error embedding batch {}", batch_no + 1);
                        rows.push(vec![0.0; self.dimension]);
                        batch_dead = true;
                    }
                }
            }
        }

        for row in &mut rows {
            normalize(row);
        }
        rows
    }

    /// Single-query form. Never errors: an all-zero vector signals that no
    /// embedding is available.
    pub async fn embed_query(&self, text: &str) -> Vec<f32> {
        match self.embed_one(text).await {
            EmbedOutcome::Embedded(mut vector) => {
                normalize(&mut vector);
                vector
            }
            EmbedOutcome::Failed => vec![0.0; self.dimension],
        }
    }
}

/// Scales a vector to unit L2 norm. All-zero vectors are left untouched;
/// they mean "no embedding available", not a direction.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Returns true when every component is exactly zero, i.e. the fallback
/// vector produced by a failed embedding.
pub fn is_zero_vector(vector: &[f32]) -> bool {
    vector.iter().all(|v| *v == 0.0)
}

fn text_prefix(text: &str, chars: usize) -> String {
    text.chars().take(chars).collect()
}
