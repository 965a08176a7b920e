pub mod process;

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::language::Language;
use crate::models::{ChatRequest, ChatResponse, ChatTurn, Message};

use process::ProxyProcess;

const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);
/// A completion call gets exactly one shot. Retrying a slow generation
/// would double the user-perceived latency for little gain; the fallback
/// already guarantees an answer.
const GENERATION_TIMEOUT: Duration = Duration::from_secs(20);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);
const HEALTH_ATTEMPTS: u32 = 2;
const HEALTH_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Most recent turns folded into the prompt, bounding its size
/// regardless of true history length (4 exchanges).
pub const HISTORY_WINDOW: usize = 8;
/// Length of the context excerpt used by the extractive fallback.
pub const FALLBACK_EXCERPT_CHARS: usize = 800;

#[derive(Debug, Error)]
enum GenerationError {
    #[error("completion request timed out")]
    Timeout,
    #[error("connection error: {0}")]
    Connection(String),
    #[error("proxy rejected the request: {0}")]
    BadRequest(String),
    #[error("malformed completion response: {0}")]
    Response(String),
}

/// Client for the OpenAI-compatible chat-completion proxy. Generation
/// never errors towards the caller: any failure degrades to an
/// extractive answer built from the retrieved context.
pub struct LlmGateway {
    http: Client,
    base_url: String,
    model: String,
    process: Option<Mutex<ProxyProcess>>,
}

impl LlmGateway {
    pub fn new(base_url: &str, model: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(CLIENT_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.to_string(),
            model: model.to_string(),
            process: None,
        })
    }

    /// Adopts a proxy child process spawned by this service. Liveness
    /// checks then also require the child to still be running.
    pub fn with_process(mut self, process: ProxyProcess) -> Self {
        self.process = Some(Mutex::new(process));
        self
    }

    /// GET {base}/health; HTTP 200 means healthy.
    pub async fn health_check(&self, attempts: u32, timeout: Duration) -> bool {
        let url = format!("{}/health", self.base_url);
        for attempt in 1..=attempts {
            match self.http.get(&url).timeout(timeout).send().await {
                Ok(response) if response.status().is_success() => return true,
                Ok(response) => {
                    tracing::debug!("Health check returned {}", response.status());
                }
                Err(e) if e.is_timeout() => tracing::debug!("Health check timeout"),
                Err(e) => tracing::debug!("Health check error: {}", e),
            }
            if attempt < attempts {
                tokio::time::sleep(HEALTH_RETRY_DELAY).await;
            }
        }
        false
    }

    /// A previously healthy proxy may have died or become unreachable
    /// between calls, so both the owned child (if any) and the health
    /// endpoint are re-checked before every generation.
    async fn is_live(&self) -> bool {
        if let Some(process) = &self.process {
            if !process.lock().await.is_alive() {
                tracing::warn!("LLM proxy process has exited");
                return false;
            }
        }
        self.health_check(HEALTH_ATTEMPTS, HEALTH_TIMEOUT).await
    }

    /// Stops the owned proxy child, if there is one.
    pub async fn shutdown(&self) {
        if let Some(process) = &self.process {
            process.lock().await.stop().await;
        }
    }

    /// Generates an answer from the retrieved context and recent
    /// conversation. Always returns a string; on any failure the caller
    /// gets the extractive fallback instead of an error.
    pub async fn generate_answer(
        &self,
        question: &str,
        context: &str,
        language: Language,
        history: &[ChatTurn],
        max_tokens: u32,
        temperature: f32,
    ) -> String {
        if !self.is_live().await {
            tracing::warn!("LLM proxy not available, using fallback");
            return fallback_answer(context, language);
        }

        match self
            .try_generate(question, context, language, history, max_tokens, temperature)
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                tracing::error!("Error generating answer: {}", e);
                fallback_answer(context, language)
            }
        }
    }

    async fn try_generate(
        &self,
        question: &str,
        context: &str,
        language: Language,
        history: &[ChatTurn],
        max_tokens: u32,
        temperature: f32,
    ) -> std::result::Result<String, GenerationError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message::new("system", system_prompt(language)),
                Message::new("user", build_user_prompt(question, context, history, language)),
            ],
            temperature,
            max_tokens,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&request)
            .timeout(GENERATION_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout
                } else {
                    GenerationError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::BadRequest(format!("{}: {}", status, body)));
        }
        if !status.is_success() {
            return Err(GenerationError::Response(format!(
                "unexpected status {}",
                status
            )));
        }

        let completion: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Response(e.to_string()))?;
        let choice = completion
            .choices
            .first()
            .ok_or_else(|| GenerationError::Response("no choices in response".to_string()))?;

        tracing::info!("Generated answer using: {}", completion.model);
        Ok(choice.message.content.trim().to_string())
    }
}

/// Deterministic extractive answer used whenever the proxy is down or a
/// completion call fails: the language's introductory phrase followed by
/// the first 800 characters of the retrieved context.
pub fn fallback_answer(context: &str, language: Language) -> String {
    let excerpt: String = context.chars().take(FALLBACK_EXCERPT_CHARS).collect();
    if context.chars().count() > FALLBACK_EXCERPT_CHARS {
        format!("{}{}...", language.fallback_intro(), excerpt)
    } else {
        format!("{}{}", language.fallback_intro(), excerpt)
    }
}

fn system_prompt(language: Language) -> &'static str {
    match language {
        Language::Arabic => {
            "أنت مساعد ذكي متخصص في تحليل تقارير صندوق الاستثمارات العامة السعودي (PIF).\n\
مهمتك هي تقديم إجابات دقيقة ومفصلة بناءً على السياق المقدم من التقارير السنوية.\n\n\
قواعد الإجابة:\n\
1. استخدم المعلومات من السياق المقدم فقط\n\
2. راعِ المحادثة السابقة لفهم السياق الكامل\n\
3. قدم إجابات واضحة ومنظمة\n\
4. اذكر الأرقام والإحصائيات عند توفرها\n\
5. إذا كانت المعلومات غير كافية، اذكر ذلك بوضوح\n\
6. لا تختلق معلومات غير موجودة في السياق"
        }
        Language::English => {
            "You are an intelligent assistant specialized in analyzing Saudi Arabia's Public Investment Fund (PIF) annual reports.\n\
Your task is to provide accurate and detailed answers based on the provided context from annual reports.\n\n\
Answer Guidelines:\n\
1. Use only information from the provided context\n\
2. Consider previous conversation for full context understanding\n\
3. Provide clear and well-structured answers\n\
4. Include numbers and statistics when available\n\
5. If information is insufficient, state it clearly\n\
6. Do not fabricate information not in the context"
        }
    }
}

fn build_user_prompt(
    question: &str,
    context: &str,
    history: &[ChatTurn],
    language: Language,
) -> String {
    let history_block = history_transcript(history, language);
    match language {
        Language::Arabic => format!(
            "{}\n{}\n{}\n\nالسؤال الحالي: {}\n\n\
             قدم إجابة شاملة ودقيقة بناءً على السياق والمحادثة السابقة. \
             استخدم تنسيق واضح مع نقاط منظمة عند الضرورة.",
            language.context_header(),
            context,
            history_block,
            question
        ),
        Language::English => format!(
            "{}\n{}\n{}\n\nCurrent Question: {}\n\n\
             Provide a comprehensive and accurate answer based on the context and \
             previous conversation. Use clear formatting with organized bullet \
             points when necessary.",
            language.context_header(),
            context,
            history_block,
            question
        ),
    }
}

/// Folds the most recent [`HISTORY_WINDOW`] turns into a labeled
/// transcript.
fn history_transcript(history: &[ChatTurn], language: Language) -> String {
    if history.is_empty() {
        return String::new();
    }

    let recent = &history[history.len().saturating_sub(HISTORY_WINDOW)..];
    let mut block = format!("\n\n{}\n", language.history_header());
    for turn in recent {
        let label = if turn.role == "user" {
            language.user_label()
        } else {
            language.assistant_label()
        };
        block.push_str(&format!("{}: {}\n", label, turn.content));
    }
    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn test_fallback_answer_short_context() {
        let answer = fallback_answer("Revenue grew 12%.", Language::English);
        assert_eq!(
            answer,
            format!("{}Revenue grew 12%.", Language::English.fallback_intro())
        );
    }

    #[test]
    fn test_fallback_answer_truncates_long_context() {
        let context = "y".repeat(1000);
        let answer = fallback_answer(&context, Language::English);
        let intro = Language::English.fallback_intro();
        assert!(answer.starts_with(intro));
        assert!(answer.ends_with("..."));
        assert_eq!(
            answer.len(),
            intro.len() + FALLBACK_EXCERPT_CHARS + "...".len()
        );
    }

    #[test]
    fn test_fallback_answer_arabic_intro() {
        let answer = fallback_answer("نمت الإيرادات", Language::Arabic);
        assert!(answer.starts_with(Language::Arabic.fallback_intro()));
    }

    #[test]
    fn test_fallback_answer_char_boundary_safe() {
        let context = "استثمار ".repeat(200);
        let answer = fallback_answer(&context, Language::Arabic);
        assert!(answer.ends_with("..."));
    }

    #[test]
    fn test_history_transcript_caps_at_window() {
        let history: Vec<ChatTurn> = (0..20)
            .map(|i| ChatTurn::user(format!("question {}", i)))
            .collect();
        let block = history_transcript(&history, Language::English);
        assert!(!block.contains("question 11"));
        assert!(block.contains("question 12"));
        assert!(block.contains("question 19"));
        assert_eq!(block.matches("User:").count(), HISTORY_WINDOW);
    }

    #[test]
    fn test_history_transcript_labels_roles() {
        let history = vec![
            ChatTurn::user("what is NEOM?"),
            ChatTurn::assistant("NEOM is a giga-project."),
        ];
        let block = history_transcript(&history, Language::English);
        assert!(block.contains("User: what is NEOM?"));
        assert!(block.contains("Assistant: NEOM is a giga-project."));

        let block_ar = history_transcript(&history, Language::Arabic);
        assert!(block_ar.contains("المستخدم: what is NEOM?"));
        assert!(block_ar.contains("المساعد: NEOM is a giga-project."));
    }

    #[test]
    fn test_empty_history_adds_nothing() {
        assert!(history_transcript(&[], Language::English).is_empty());
        let prompt = build_user_prompt("q", "ctx", &[], Language::English);
        assert!(!prompt.contains("Previous conversation:"));
    }

    #[tokio::test]
    async fn test_generate_answer_falls_back_when_unhealthy() {
        let server = MockServer::start_async().await;
        server.mock_async(|when, then| {
            when.method(GET).path("/health");
            then.status(503);
        }).await;

        let gateway = LlmGateway::new(&server.base_url(), "rag-llm").unwrap();
        let context = "PIF invested heavily in NEOM during 2023.";
        let answer = gateway
            .generate_answer("What about NEOM?", context, Language::English, &[], 500, 0.3)
            .await;

        assert!(answer.starts_with(Language::English.fallback_intro()));
        assert!(answer.contains(context));
    }

    #[tokio::test]
    async fn test_generate_answer_success_trims_content() {
        let server = MockServer::start_async().await;
        server.mock_async(|when, then| {
            when.method(GET).path("/health");
            then.status(200);
        }).await;
        server.mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(json!({
                "model": "llama-3.1-8b-instant",
                "choices": [{
                    "message": {"role": "assistant", "content": "  NEOM received $10B.  "},
                    "finish_reason": "stop"
                }]
            }));
        }).await;

        let gateway = LlmGateway::new(&server.base_url(), "rag-llm").unwrap();
        let answer = gateway
            .generate_answer("How much?", "context", Language::English, &[], 500, 0.3)
            .await;
        assert_eq!(answer, "NEOM received $10B.");
    }

    #[tokio::test]
    async fn test_generate_answer_falls_back_on_server_error() {
        let server = MockServer::start_async().await;
        server.mock_async(|when, then| {
            when.method(GET).path("/health");
            then.status(200);
        }).await;
        server.mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(500);
        }).await;

        let gateway = LlmGateway::new(&server.base_url(), "rag-llm").unwrap();
        let answer = gateway
            .generate_answer("q", "some context", Language::English, &[], 500, 0.3)
            .await;
        assert!(answer.starts_with(Language::English.fallback_intro()));
    }

    #[tokio::test]
    async fn test_generate_answer_falls_back_on_bad_request() {
        let server = MockServer::start_async().await;
        server.mock_async(|when, then| {
            when.method(GET).path("/health");
            then.status(200);
        }).await;
        server.mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(400).body("prompt rejected");
        }).await;

        let gateway = LlmGateway::new(&server.base_url(), "rag-llm").unwrap();
        let answer = gateway
            .generate_answer("q", "some context", Language::Arabic, &[], 500, 0.3)
            .await;
        assert!(answer.starts_with(Language::Arabic.fallback_intro()));
    }

    #[tokio::test]
    async fn test_health_check_ok() {
        let server = MockServer::start_async().await;
        server.mock_async(|when, then| {
            when.method(GET).path("/health");
            then.status(200);
        }).await;

        let gateway = LlmGateway::new(&server.base_url(), "rag-llm").unwrap();
        assert!(gateway.health_check(1, Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_health_check_refused() {
        let gateway = LlmGateway::new("http://127.0.0.1:1", "rag-llm").unwrap();
        assert!(!gateway.health_check(1, Duration::from_millis(500)).await);
    }
}
