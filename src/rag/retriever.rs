use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::config::{collection_name, Settings};
use crate::language::Language;
use crate::models::ScoredChunk;

use super::embedding::{is_zero_vector, EmbeddingClient};
use super::vector_store::VectorStore;

/// Relevance floor applied in every collection search.
pub const SCORE_THRESHOLD: f32 = 0.3;
/// Cap on the merged, de-duplicated result list.
pub const MAX_RESULTS: usize = 5;
/// Near-duplicate chunks are collapsed on their first 100 characters;
/// exact boilerplate repeated across years dominates the noise.
pub const DEDUP_PREFIX_CHARS: usize = 100;
pub const DEFAULT_LIMIT_PER_COLLECTION: u64 = 3;

/// Searches every year-partitioned collection of the question's language
/// and merges the hits into a ranked, de-duplicated top list.
pub struct Retriever {
    embeddings: Arc<EmbeddingClient>,
    store: Arc<VectorStore>,
    reports_ar: BTreeMap<String, String>,
    reports_en: BTreeMap<String, String>,
}

impl Retriever {
    pub fn new(
        embeddings: Arc<EmbeddingClient>,
        store: Arc<VectorStore>,
        settings: &Settings,
    ) -> Self {
        Self {
            embeddings,
            store,
            reports_ar: settings.reports_ar.clone(),
            reports_en: settings.reports_en.clone(),
        }
    }

    /// Embeds the question once, searches each of the language's
    /// collections, and returns at most [`MAX_RESULTS`] unique chunks
    /// sorted by score. A failed collection is skipped; partial coverage
    /// beats no answer.
    pub async fn search_collections(
        &self,
        question: &str,
        language: Language,
        limit_per_collection: u64,
    ) -> Vec<ScoredChunk> {
        if question.trim().is_empty() {
            return Vec::new();
        }

        let query = self.embeddings.embed_query(question).await;
        if is_zero_vector(&query) {
            tracing::error!("No query embedding available, skipping retrieval");
            return Vec::new();
        }

        let reports = match language {
            Language::Arabic => &self.reports_ar,
            Language::English => &self.reports_en,
        };

        let mut hits = Vec::new();
        for (year, stem) in reports {
            let collection = collection_name(stem);
            let points = match self
                .store
                .search(&collection, &query, limit_per_collection, SCORE_THRESHOLD)
                .await
            {
                Ok(points) => points,
                Err(e) => {
                    tracing::error!("Error searching collection {}: {}", collection, e);
                    continue;
                }
            };

            for point in points {
                let text = point
                    .payload
                    .get("text")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
                    .unwrap_or_default();
                hits.push(ScoredChunk {
                    text,
                    score: point.score,
                    year: year.clone(),
                    source: stem.clone(),
                });
            }
        }

        rank_and_dedup(hits)
    }
}

/// Sorts hits by score descending, drops near-duplicates by text prefix
/// (the first occurrence wins, i.e. the highest-scoring one), and caps
/// the list at [`MAX_RESULTS`].
pub fn rank_and_dedup(mut hits: Vec<ScoredChunk>) -> Vec<ScoredChunk> {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for hit in hits {
        if seen.insert(text_prefix(&hit.text, DEDUP_PREFIX_CHARS)) {
            unique.push(hit);
            if unique.len() == MAX_RESULTS {
                break;
            }
        }
    }
    unique
}

/// First `n` characters of a string, respecting char boundaries (chunk
/// text is frequently Arabic).
pub fn text_prefix(text: &str, n: usize) -> String {
    text.chars().take(n).collect()
}
