//! LLM client — the single point of entry for all Gemini API calls.
//!
//! ARCHITECTURAL RULE: No other module may call the Gemini API directly.
//! The pipeline sees this module only through the [`Analyst`] trait, so
//! tests swap in an in-memory collaborator.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub mod prompts;

use crate::errors::AppError;
use crate::jdmatch::models::JdVerification;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
/// The model used for all LLM calls. Intentionally hardcoded to prevent drift.
pub const MODEL: &str = "gemini-2.5-flash";
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(rename = "inlineData", skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

impl Part {
    fn text(text: String) -> Self {
        Self {
            text: Some(text),
            inline_data: None,
        }
    }

    fn file(mime_type: &str, bytes: &[u8]) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: mime_type.to_string(),
                data: BASE64_STANDARD.encode(bytes),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GeminiResponse {
    /// Concatenates the text of all parts of the first candidate.
    fn text(&self) -> Option<String> {
        let candidate = self.candidates.first()?;
        let text: String = candidate
            .content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// Envelope returned by the browsing/extraction call.
#[derive(Debug, Deserialize)]
struct ExtractEnvelope {
    message: String,
    data: String,
}

/// The single Gemini client used by the pipeline. Wraps the generateContent
/// API with retry logic, JSON helpers, and SSE streaming.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
        }
    }

    /// Makes a blocking (non-streaming) call, returning the response text.
    /// Retries on 429 and 5xx with exponential backoff.
    async fn call(&self, contents: Vec<Content>) -> Result<String, LlmError> {
        let url = format!(
            "{GEMINI_API_BASE}/{MODEL}:generateContent?key={}",
            self.api_key
        );
        let request_body = GeminiRequest {
            contents,
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
            },
        };

        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s
                let delay = std::time::Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = match self.client.post(&url).json(&request_body).send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("LLM API returned {status}: {body}");
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
            }

            let parsed: GeminiResponse = response.json().await?;
            debug!("LLM call succeeded");
            return parsed.text().ok_or(LlmError::EmptyContent);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }

    /// Calls the LLM and deserializes the text response as JSON.
    async fn call_json<T: DeserializeOwned>(&self, contents: Vec<Content>) -> Result<T, LlmError> {
        let text = self.call(contents).await?;
        let text = strip_json_fences(&text);
        serde_json::from_str(text).map_err(LlmError::Parse)
    }

    /// Opens a streaming call and forwards each text chunk into a channel.
    /// Dropping the returned stream drops the receiver, which stops the
    /// forwarding task and the underlying HTTP stream on the next chunk.
    async fn stream_call(
        &self,
        contents: Vec<Content>,
    ) -> Result<BoxStream<'static, Result<String, AppError>>, AppError> {
        let url = format!(
            "{GEMINI_API_BASE}/{MODEL}:streamGenerateContent?alt=sse&key={}",
            self.api_key
        );
        let request_body = GeminiRequest {
            contents,
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| AppError::Llm(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Llm(format!(
                "streaming call returned {status}: {body}"
            )));
        }

        let (tx, rx) = mpsc::channel::<Result<String, AppError>>(16);
        let mut byte_stream = response.bytes_stream();

        tokio::spawn(async move {
            let mut buf = String::new();
            while let Some(chunk) = byte_stream.next().await {
                let bytes = match chunk {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx.send(Err(AppError::Llm(e.to_string()))).await;
                        return;
                    }
                };
                buf.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(pos) = buf.find('\n') {
                    let line: String = buf.drain(..=pos).collect();
                    let line = line.trim_end();
                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    if data == "[DONE]" {
                        return;
                    }
                    let frame = match serde_json::from_str::<GeminiResponse>(data) {
                        Ok(f) => f,
                        Err(e) => {
                            let _ = tx
                                .send(Err(AppError::Llm(format!("bad SSE frame: {e}"))))
                                .await;
                            return;
                        }
                    };
                    if let Some(text) = frame.text() {
                        if tx.send(Ok(text)).await.is_err() {
                            // Consumer went away; stop pulling from the API.
                            return;
                        }
                    }
                }
            }
        });

        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed())
    }
}

/// The three analysis collaborators the orchestrator depends on.
#[async_trait]
pub trait Analyst: Send + Sync {
    /// Confirms that inline text actually is a job description.
    async fn verify_jd(&self, text: &str) -> Result<JdVerification, AppError>;

    /// Browses a JD URL and returns extracted plain-text JD content.
    async fn extract_jd(&self, url: &str) -> Result<String, AppError>;

    /// Scores the resume at `resume_path` against the JD, streaming
    /// incremental text chunks of one JSON document.
    async fn score_resume(
        &self,
        jd: &str,
        resume_path: &str,
    ) -> Result<BoxStream<'static, Result<String, AppError>>, AppError>;
}

#[async_trait]
impl Analyst for GeminiClient {
    async fn verify_jd(&self, text: &str) -> Result<JdVerification, AppError> {
        let contents = vec![Content {
            role: "user",
            parts: vec![Part::text(prompts::jd_verify_prompt(text))],
        }];
        self.call_json::<JdVerification>(contents)
            .await
            .map_err(|e| AppError::Llm(format!("JD verification failed: {e}")))
    }

    async fn extract_jd(&self, url: &str) -> Result<String, AppError> {
        let contents = vec![Content {
            role: "user",
            parts: vec![Part::text(prompts::jd_extract_prompt(url))],
        }];
        let envelope = self
            .call_json::<ExtractEnvelope>(contents)
            .await
            .map_err(|e| AppError::ExtractionFailed(e.to_string()))?;

        if envelope.message != "SUCCESS" || envelope.data.is_empty() {
            return Err(AppError::ExtractionFailed(envelope.data));
        }
        Ok(envelope.data)
    }

    async fn score_resume(
        &self,
        jd: &str,
        resume_path: &str,
    ) -> Result<BoxStream<'static, Result<String, AppError>>, AppError> {
        let bytes = tokio::fs::read(resume_path)
            .await
            .map_err(|e| AppError::Llm(format!("Failed to read {resume_path}: {e}")))?;

        let contents = vec![Content {
            role: "user",
            parts: vec![
                Part::file("application/pdf", &bytes),
                Part::text(prompts::score_prompt(jd)),
            ],
        }];
        self.stream_call(contents).await
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
pub fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "{\"key\": \"value\"}";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_gemini_response_concatenates_parts() {
        let json = r#"{"candidates":[{"content":{"parts":[{"text":"{\"sco"},{"text":"re\": 85}"}]}}]}"#;
        let response: GeminiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.text().as_deref(), Some("{\"score\": 85}"));
    }

    #[test]
    fn test_gemini_response_empty_candidates_is_none() {
        let response: GeminiResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(response.text().is_none());
    }

    #[test]
    fn test_part_serialization_omits_absent_fields() {
        let json = serde_json::to_string(&Part::text("hi".to_string())).unwrap();
        assert_eq!(json, r#"{"text":"hi"}"#);

        let json = serde_json::to_string(&Part::file("application/pdf", b"x")).unwrap();
        assert!(json.contains("inlineData"));
        assert!(!json.contains("\"text\""));
    }
}
