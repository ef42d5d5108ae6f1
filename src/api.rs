//! Summarization and question answering over a harvested thread.
//!
//! The harvester only produces the corpus; generating text from it is the job
//! of an OpenAI-compatible chat completions endpoint. This module renders the
//! corpus into prompts and talks to that endpoint.
//!
//! # Architecture
//!
//! - [`TextGenerator`]: core trait, one prompt in, generated text out
//! - [`ChatCompletionsGenerator`]: `POST {api_base}/chat/completions` with a bearer key
//! - [`RetryGenerator`]: decorator adding exponential backoff with jitter for
//!   transient failures (quota, transport)
//!
//! The corpus is always passed in explicitly as a [`HarvestResult`]; nothing
//! here remembers the last thread.

use crate::config::GeneratorConfig;
use crate::models::{HarvestResult, Message};
use chrono::NaiveDate;
use itertools::Itertools;
use rand::{Rng, rng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

/// Separator between rendered messages in a prompt.
pub const MESSAGE_SEPARATOR: &str = "\n\n---\n\n";

/// Typed failures of a generation call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("the API key is invalid or lacks permission")]
    InvalidCredential,
    #[error("API quota exceeded or rate limited")]
    QuotaExceeded,
    #[error("generation blocked: {0}")]
    ContentBlocked(String),
    #[error("the model returned an empty response")]
    EmptyGeneration,
    #[error("thread has no messages to work with")]
    EmptyCorpus,
    #[error("question is empty")]
    EmptyQuestion,
    #[error("request failed: {0}")]
    Transport(String),
}

impl GenerationError {
    /// Worth retrying after a pause.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GenerationError::QuotaExceeded | GenerationError::Transport(_)
        )
    }

    /// Map a provider's HTTP status and error text to a typed failure.
    pub fn classify(status: u16, detail: &str) -> Self {
        let lower = detail.to_lowercase();
        if status == 401
            || lower.contains("api_key_invalid")
            || lower.contains("api key not valid")
            || lower.contains("invalid api key")
        {
            GenerationError::InvalidCredential
        } else if status == 429 || lower.contains("quota") || lower.contains("rate limit") {
            GenerationError::QuotaExceeded
        } else if lower.contains("content_filter") || lower.contains("safety") {
            GenerationError::ContentBlocked(detail.to_string())
        } else {
            GenerationError::Transport(format!("HTTP {status}: {detail}"))
        }
    }
}

/// Sends a prompt to a language model.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, prompt: &str)
    -> impl Future<Output = Result<String, GenerationError>> + Send;
}

/// Wrapper that adds exponential backoff retry logic to any [`TextGenerator`].
///
/// Only transient failures are retried. The delay before retry `n` is
/// `min(base_delay * 2^(n-1), max_delay)` plus up to 250ms of jitter.
pub struct RetryGenerator<T> {
    inner: T,
    max_retries: usize,
    base_delay: StdDuration,
    max_delay: StdDuration,
}

impl<T: TextGenerator> RetryGenerator<T> {
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }
}

impl<T> fmt::Debug for RetryGenerator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryGenerator")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T: TextGenerator> TextGenerator for RetryGenerator<T> {
    #[instrument(level = "info", skip_all)]
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match self.inner.generate(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                            error = %e,
                            "generate() exhausted retries"
                        );
                        return Err(e);
                    }

                    let exp = u32::try_from(attempt - 1).unwrap_or(u32::MAX).min(16);
                    let delay = self.base_delay.saturating_mul(1 << exp).min(self.max_delay);
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + StdDuration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        ?delay,
                        error = %e,
                        "generate() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatReply>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// OpenAI-compatible chat completions client.
pub struct ChatCompletionsGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl fmt::Debug for ChatCompletionsGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatCompletionsGenerator")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl ChatCompletionsGenerator {
    pub fn new(config: &GeneratorConfig, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            model: config.model.clone(),
            api_key: api_key.into(),
        }
    }
}

impl TextGenerator for ChatCompletionsGenerator {
    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let t0 = Instant::now();
        let request = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let err = GenerationError::classify(status.as_u16(), &detail);
            warn!(elapsed_ms = t0.elapsed().as_millis() as u64, error = %err, "API call failed");
            return Err(err);
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;
        let choice = body.choices.into_iter().next();
        if let Some(reason) = choice.as_ref().and_then(|c| c.finish_reason.as_deref()) {
            if reason == "content_filter" {
                return Err(GenerationError::ContentBlocked(reason.to_string()));
            }
        }
        let text = choice
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(GenerationError::EmptyGeneration);
        }
        info!(elapsed_ms = t0.elapsed().as_millis() as u64, chars = text.len(), "Generated text");
        Ok(text)
    }
}

/// Render one message as a prompt block.
pub fn format_message(message: &Message) -> String {
    format!(
        "Date: {}\nUser: {}\nMessage: {}",
        message.posted_at, message.author, message.body
    )
}

/// Render the whole corpus, messages separated by [`MESSAGE_SEPARATOR`].
pub fn format_corpus(messages: &[Message]) -> String {
    messages.iter().map(format_message).join(MESSAGE_SEPARATOR)
}

/// Build the summarization prompt for a harvested thread.
///
/// # Arguments
///
/// * `result` - The harvest whose messages form the corpus
/// * `keywords` - Topics the summary should focus on; empty for a general summary
/// * `today` - Date the model is told it is, so it can judge how current posts are
///
/// # Returns
///
/// The full prompt, with the corpus rendered by [`format_corpus`].
pub fn summary_prompt(result: &HarvestResult, keywords: &[String], today: NaiveDate) -> String {
    let focus = if keywords.is_empty() {
        String::new()
    } else {
        format!(
            "\nFocus the summary on these topics: {}. Mention explicitly if the thread says nothing about one of them.\n",
            keywords.join(", ")
        )
    };
    format!(
        "Current date is {today}. You are a helpful assistant tasked with summarizing a discussion thread from an online forum ({url}). Each post below includes its posting date and user.\n\
         Your summary should be comprehensive and well-organized, and highlight the key topics, main questions asked, significant opinions or experiences shared, and any conclusions or consensus reached.\n\
         Pay close attention to the dates of the messages to identify the most current information. Note conflicting viewpoints and information that later posts have made outdated.\n\
         Synthesize rather than copy messages.\n{focus}\n\
         Thread Content:\n{corpus}\n\n\
         Please provide your summary:",
        url = result.thread_url,
        corpus = format_corpus(&result.messages),
    )
}

/// Build the prompt asking `question` about a harvested thread.
///
/// # Arguments
///
/// * `result` - The harvest whose messages form the corpus
/// * `question` - The user's question; surrounding whitespace is trimmed
/// * `today` - Date the model is told it is
///
/// # Examples
///
/// ```ignore
/// let prompt = question_prompt(&result, "  Is it lifetime free? ", today);
/// assert!(prompt.contains("User's Question: \"Is it lifetime free?\""));
/// ```
pub fn question_prompt(result: &HarvestResult, question: &str, today: NaiveDate) -> String {
    format!(
        "Current date is {today}. You are a helpful assistant. Based on the following forum thread content (which includes message dates and users), answer the user's question.\n\
         Consider the posting dates; more recent information is generally more relevant. If the answer might be outdated because of newer posts, say so. If the answer is not found in the messages, state that explicitly.\n\n\
         Thread Content:\n{corpus}\n\n\
         User's Question: \"{question}\"\n\n\
         Please provide your answer:",
        corpus = format_corpus(&result.messages),
        question = question.trim(),
    )
}

/// Summarize a harvested thread.
#[instrument(level = "info", skip_all, fields(thread = %result.thread_url))]
pub async fn summarize<G: TextGenerator>(
    generator: &G,
    result: &HarvestResult,
    keywords: &[String],
    today: NaiveDate,
) -> Result<String, GenerationError> {
    if result.messages.is_empty() {
        return Err(GenerationError::EmptyCorpus);
    }
    generator.generate(&summary_prompt(result, keywords, today)).await
}

/// Answer a question about a harvested thread.
#[instrument(level = "info", skip_all, fields(thread = %result.thread_url))]
pub async fn answer_question<G: TextGenerator>(
    generator: &G,
    result: &HarvestResult,
    question: &str,
    today: NaiveDate,
) -> Result<String, GenerationError> {
    if result.messages.is_empty() {
        return Err(GenerationError::EmptyCorpus);
    }
    if question.trim().is_empty() {
        return Err(GenerationError::EmptyQuestion);
    }
    generator.generate(&question_prompt(result, question, today)).await
}
