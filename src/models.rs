use serde::{Deserialize, Serialize};

// OpenAI-compatible chat types, as spoken by the LLM proxy.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    /// Name of the model that actually served the request. The proxy may
    /// have routed to a fallback model chain internally.
    pub model: String,
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: Message,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

// Embedding service wire types (Ollama-style).

#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingRequest {
    pub model: String,
    pub prompt: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingResponse {
    #[serde(default)]
    pub embedding: Vec<f32>,
}

// Conversation state owned by the caller. The generator only reads the
// role and content of the most recent turns.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub follow_ups: Vec<String>,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
            follow_ups: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
            follow_ups: Vec::new(),
        }
    }
}

// Retrieval output.

/// One retrieved chunk, tagged with the year and report it came from.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub text: String,
    pub score: f32,
    pub year: String,
    pub source: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub year: String,
    pub score: f32,
}

/// Structured answer returned by the orchestrator alongside provenance.
#[derive(Debug, Clone, Serialize)]
pub struct RagAnswer {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub confidence: f32,
}

// Ingestion.

/// A contextualized span of extracted report text. Created once during
/// ingestion, immutable afterwards.
#[derive(Debug, Clone)]
pub struct DocumentChunk {
    /// 1-based ordinal within the source document.
    pub index: usize,
    pub chunk_id: String,
    pub text: String,
}

// HTTP front-end wire types.

#[derive(Debug, Clone, Deserialize)]
pub struct AnswerRequest {
    pub question: String,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}
