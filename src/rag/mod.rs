pub mod embedding;
pub mod retriever;
pub mod vector_store;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::config::Settings;
use crate::language::Language;
use crate::llm::LlmGateway;
use crate::models::{ChatTurn, RagAnswer, ScoredChunk, SourceRef};

use embedding::EmbeddingClient;
use retriever::{Retriever, DEFAULT_LIMIT_PER_COLLECTION};
use vector_store::VectorStore;

const QDRANT_CONNECT_RETRIES: u32 = 5;
const ANSWER_MAX_TOKENS: u32 = 500;
const ANSWER_TEMPERATURE: f32 = 0.3;

/// The façade every front end talks to: retrieve context for a question,
/// then generate (or fall back to) an answer. Constructed once at process
/// start; request-time calls never error.
pub struct RagEngine {
    retriever: Retriever,
    gateway: LlmGateway,
}

impl RagEngine {
    /// Builds all service clients. A broken deployment (unreachable
    /// embedding service or vector index) surfaces here at startup
    /// instead of being discovered one failed question at a time.
    pub async fn new(settings: &Settings) -> Result<Self> {
        let embeddings = Arc::new(
            EmbeddingClient::connect(
                &settings.ollama_url,
                &settings.embed_model,
                settings.embed_dimension,
                settings.embed_batch_size,
            )
            .await?,
        );
        let store = Arc::new(VectorStore::connect(&settings.qdrant_url, QDRANT_CONNECT_RETRIES).await?);
        let retriever = Retriever::new(embeddings, store, settings);
        let gateway = LlmGateway::new(&settings.llm_proxy_url, &settings.llm_model)?;

        Ok(Self { retriever, gateway })
    }

    /// Answers a question from the annual reports, in the question's own
    /// language. Returns the canned no-information message when nothing
    /// relevant is retrieved.
    pub async fn answer(&self, question: &str, history: &[ChatTurn]) -> String {
        let language = Language::detect(question);
        let chunks = self
            .retriever
            .search_collections(question, language, DEFAULT_LIMIT_PER_COLLECTION)
            .await;

        if chunks.is_empty() {
            return language.no_context_message().to_string();
        }

        let context = join_context(&chunks);
        self.gateway
            .generate_answer(
                question,
                &context,
                language,
                history,
                ANSWER_MAX_TOKENS,
                ANSWER_TEMPERATURE,
            )
            .await
    }

    /// Same pipeline as [`answer`](Self::answer), additionally surfacing
    /// per-year provenance and the top score as a confidence value.
    pub async fn answer_with_sources(&self, question: &str, history: &[ChatTurn]) -> RagAnswer {
        let language = Language::detect(question);
        let chunks = self
            .retriever
            .search_collections(question, language, DEFAULT_LIMIT_PER_COLLECTION)
            .await;

        if chunks.is_empty() {
            return RagAnswer {
                answer: language.no_context_message().to_string(),
                sources: Vec::new(),
                confidence: 0.0,
            };
        }

        let context = join_context(&chunks);
        let answer = self
            .gateway
            .generate_answer(
                question,
                &context,
                language,
                history,
                ANSWER_MAX_TOKENS,
                ANSWER_TEMPERATURE,
            )
            .await;

        RagAnswer {
            answer,
            confidence: chunks.first().map(|c| c.score).unwrap_or(0.0),
            sources: chunks
                .into_iter()
                .map(|c| SourceRef {
                    year: c.year,
                    score: c.score,
                })
                .collect(),
        }
    }

    /// One-shot proxy health probe, for the service health endpoint.
    pub async fn proxy_healthy(&self) -> bool {
        self.gateway.health_check(1, Duration::from_secs(2)).await
    }

    /// Terminates an owned proxy child, if any.
    pub async fn shutdown(&self) {
        self.gateway.shutdown().await;
    }
}

/// Retrieved chunks become one context block, joined by blank lines and
/// inserted verbatim into the prompt.
fn join_context(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> ScoredChunk {
        ScoredChunk {
            text: text.to_string(),
            score: 0.5,
            year: "2023".to_string(),
            source: "PIF-2023-Annual-Report-EN".to_string(),
        }
    }

    #[test]
    fn test_join_context_blank_line_separated() {
        let chunks = vec![chunk("first"), chunk("second")];
        assert_eq!(join_context(&chunks), "first\n\nsecond");
    }

    #[test]
    fn test_join_context_single_chunk_verbatim() {
        let chunks = vec![chunk("only one")];
        assert_eq!(join_context(&chunks), "only one");
    }
}
