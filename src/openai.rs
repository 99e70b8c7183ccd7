//! # OpenAI Client Module
//!
//! Thin typed client for the OpenAI chat-completions API. Every AI feature of
//! the bot (persona replies, quiz generation, doubt solving) goes through
//! this one client so retry, timeout, and circuit-breaker behavior stay
//! consistent.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::config::OpenAiConfig;
use crate::db::ConversationTurn;
use crate::ocr::calculate_retry_delay;
use crate::ocr_config::RecoveryConfig;

/// Custom error types for OpenAI operations
#[derive(Debug, Clone)]
pub enum OpenAiError {
    /// Request construction or transport errors
    Request(String),
    /// Non-success HTTP status from the API
    Api(String),
    /// Response body could not be parsed
    Parse(String),
    /// Request exceeded the configured timeout
    Timeout(String),
    /// Circuit breaker is open
    Unavailable(String),
}

impl std::fmt::Display for OpenAiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpenAiError::Request(msg) => write!(f, "[AI_REQUEST] Request failed: {}", msg),
            OpenAiError::Api(msg) => write!(f, "[AI_API] API returned an error: {}", msg),
            OpenAiError::Parse(msg) => write!(f, "[AI_PARSE] Failed to parse response: {}", msg),
            OpenAiError::Timeout(msg) => write!(f, "[AI_TIMEOUT] Request timed out: {}", msg),
            OpenAiError::Unavailable(msg) => write!(f, "[AI_UNAVAILABLE] {}", msg),
        }
    }
}

impl std::error::Error for OpenAiError {}

/// A single chat message in a completion request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// System prompt fixing the bot's Hinglish study-assistant persona
const PERSONA_SYSTEM_PROMPT: &str = "You are Sathi, a helpful Hindi-English mixed (Hinglish) study assistant for Indian students. Be friendly, use emojis, and keep responses concise.";

/// System prompt for the quiz generator
const QUIZ_SYSTEM_PROMPT: &str = "You are an expert quiz generator for Indian students. Generate questions in Hindi-English mixed style (Hinglish). Always answer with valid JSON.";

/// System prompt for the doubt solver
const SOLVER_SYSTEM_PROMPT: &str = "You are a patient teacher solving a student's doubt. Write a short step-by-step solution in simple Hinglish. Keep each step on its own line and under 60 characters so it fits on a photo.";

/// Client for the OpenAI chat-completions API
///
/// Holds a pooled `reqwest` client, the API configuration, and a circuit
/// breaker shared across all request kinds. Cloning is cheap via `Arc` at the
/// call sites; the struct itself is created once at startup.
pub struct OpenAiClient {
    http: reqwest::Client,
    config: OpenAiConfig,
    recovery: RecoveryConfig,
    circuit_breaker: CircuitBreaker,
}

impl OpenAiClient {
    /// Create a new client from configuration
    pub fn new(config: OpenAiConfig) -> Result<Self, OpenAiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| OpenAiError::Request(format!("Failed to build HTTP client: {e}")))?;

        let recovery = RecoveryConfig::default();
        let circuit_breaker = CircuitBreaker::new(recovery.clone());

        Ok(Self {
            http,
            config,
            recovery,
            circuit_breaker,
        })
    }

    /// Perform a chat completion with retry and circuit-breaker protection
    ///
    /// Retries transport and 5xx/429 failures with exponential backoff.
    /// Client errors (4xx other than 429) are not retried — they indicate a
    /// bad request or key, and repeating them only burns quota.
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, OpenAiError> {
        let span = crate::observability::openai_span("chat_completion");
        let _enter = span.enter();

        if self.circuit_breaker.is_open() {
            warn!("Circuit breaker is open, rejecting OpenAI request");
            return Err(OpenAiError::Unavailable(
                "AI service is temporarily unavailable due to repeated failures. Please try again later."
                    .to_string(),
            ));
        }

        let start_time = std::time::Instant::now();
        let mut attempt = 0;
        let max_attempts = self.recovery.max_retries + 1;

        loop {
            attempt += 1;

            match self.perform_request(messages, max_tokens, temperature).await {
                Ok(content) => {
                    self.circuit_breaker.record_success();
                    crate::observability::record_openai_request(
                        "chat_completion",
                        true,
                        start_time.elapsed(),
                    );
                    info!(
                        attempt,
                        chars = content.len(),
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "OpenAI completion succeeded"
                    );
                    return Ok(content);
                }
                Err(err) => {
                    let retryable = matches!(
                        &err,
                        OpenAiError::Request(_) | OpenAiError::Timeout(_)
                    ) || matches!(&err, OpenAiError::Api(msg) if msg.starts_with("429") || msg.starts_with('5'));

                    if !retryable || attempt >= max_attempts {
                        self.circuit_breaker.record_failure();
                        crate::observability::record_openai_request(
                            "chat_completion",
                            false,
                            start_time.elapsed(),
                        );
                        crate::errors::error_logging::log_openai_error(
                            &err,
                            "chat_completion",
                            None,
                            Some(attempt),
                        );
                        return Err(err);
                    }

                    let delay_ms = calculate_retry_delay(attempt, &self.recovery);
                    warn!(
                        "OpenAI request attempt {attempt} failed: {err}. Retrying in {delay_ms}ms"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
            }
        }
    }

    async fn perform_request(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, OpenAiError> {
        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages,
            max_tokens,
            temperature,
        };

        let response = self
            .http
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OpenAiError::Timeout(e.to_string())
                } else {
                    OpenAiError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<ApiErrorResponse>()
                .await
                .ok()
                .and_then(|body| body.error)
                .map(|e| e.message)
                .unwrap_or_else(|| "no error detail".to_string());
            return Err(OpenAiError::Api(format!("{} {}", status.as_u16(), detail)));
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| OpenAiError::Parse(e.to_string()))?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| OpenAiError::Parse("Completion contained no content".to_string()))?;

        Ok(content)
    }

    /// Generate a persona reply using the user's recent history as context
    pub async fn assistant_reply(
        &self,
        history: &[ConversationTurn],
        query: &str,
    ) -> Result<String, OpenAiError> {
        let prompt = build_context_prompt(history, query);
        debug!(prompt_chars = prompt.len(), "Requesting assistant reply");

        let messages = [
            ChatMessage::system(PERSONA_SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ];
        self.chat(&messages, self.config.max_tokens, self.config.temperature)
            .await
    }

    /// Request multiple-choice questions for a chunk of study text
    ///
    /// Returns the raw model output; parsing and validation happen in the
    /// quiz module so its regex fallback can see the original text.
    pub async fn generate_quiz_questions(
        &self,
        text_chunk: &str,
        num_questions: usize,
    ) -> Result<String, OpenAiError> {
        let prompt = format!(
            "Based on the following text, generate {num_questions} multiple choice questions. Each question should:\n\
             1. Test understanding of key concepts\n\
             2. Have 4 options\n\
             3. Have exactly one correct answer\n\
             4. Be clear and unambiguous\n\
             5. Be in Hindi-English mixed style (Hinglish) suitable for Indian students\n\n\
             Text:\n{text_chunk}\n\n\
             Format your response as a JSON array with this structure:\n\
             [\n  {{\n    \"question\": \"Question text in Hinglish\",\n    \"options\": [\"Option A\", \"Option B\", \"Option C\", \"Option D\"],\n    \"correct_answer\": \"A\",\n    \"explanation\": \"Brief explanation in Hinglish\"\n  }}\n]"
        );

        let messages = [ChatMessage::system(QUIZ_SYSTEM_PROMPT), ChatMessage::user(prompt)];
        // Quiz payloads are much larger than chat replies
        self.chat(&messages, 1500, self.config.temperature).await
    }

    /// Request a worked solution for OCR-extracted problem text
    pub async fn solve_problem(&self, problem_text: &str) -> Result<String, OpenAiError> {
        let prompt = format!("Solve this problem step by step:\n\n{problem_text}");
        let messages = [
            ChatMessage::system(SOLVER_SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ];
        self.chat(&messages, 500, 0.3).await
    }
}

/// Embed recent history turns and the current query into a single prompt
fn build_context_prompt(history: &[ConversationTurn], query: &str) -> String {
    let mut prompt = String::new();

    if !history.is_empty() {
        prompt.push_str("Conversation so far:\n");
        for turn in history {
            let speaker = if turn.sender == "user" { "Student" } else { "Sathi" };
            prompt.push_str(&format!("{}: {}\n", speaker, turn.message));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!("Current query: {query}"));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn turn(sender: &str, message: &str) -> ConversationTurn {
        ConversationTurn {
            message: message.to_string(),
            sender: sender.to_string(),
            message_type: "text".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_context_prompt_includes_history() {
        let history = vec![
            turn("user", "physics notes chahiye"),
            turn("bot", "Bhej raha hun!"),
        ];

        let prompt = build_context_prompt(&history, "ab chemistry bhi bhejo");
        assert!(prompt.contains("Student: physics notes chahiye"));
        assert!(prompt.contains("Sathi: Bhej raha hun!"));
        assert!(prompt.ends_with("Current query: ab chemistry bhi bhejo"));
    }

    #[test]
    fn test_context_prompt_without_history() {
        let prompt = build_context_prompt(&[], "hello");
        assert_eq!(prompt, "Current query: hello");
    }

    #[test]
    fn test_chat_message_constructors() {
        let msg = ChatMessage::system("be helpful");
        assert_eq!(msg.role, "system");
        let msg = ChatMessage::user("hi");
        assert_eq!(msg.role, "user");
    }
}
