use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use futures::StreamExt;
use futures::stream::BoxStream;
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::sleep;

use crate::config::{GeminiConfig, RetryConfig};
use crate::error::{LabAssistError, Result};
use crate::models::GeminiRequest;
use crate::sse::SseDecoder;

/// Ordered text fragments of one streamed reply. An `Err` item ends the stream.
pub type TextStream = BoxStream<'static, Result<String>>;

type ByteStream = BoxStream<'static, reqwest::Result<Vec<u8>>>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait Transport: Send + Sync {
    /// One-shot generateContent call; returns the first candidate's text.
    async fn generate(&self, req: &GeminiRequest) -> Result<String>;

    /// Streaming generateContent call.
    async fn stream(&self, req: &GeminiRequest) -> Result<TextStream>;

    /// Single 1:1 JPEG from an image model.
    async fn generate_image(&self, model: &str, prompt: &str) -> Result<Vec<u8>>;
}

pub struct GeminiTransport {
    client: Client,
    api_key: String,
    base_url: String,
    request_timeout: Duration,
    retry: RetryConfig,
}

impl GeminiTransport {
    pub fn new(cfg: &GeminiConfig, retry: RetryConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| LabAssistError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: cfg.api_key.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(cfg.request_timeout_seconds),
            retry,
        })
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/models/{}:{}", self.base_url, model, method)
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base_ms = self
            .retry
            .initial_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
        let j = self.retry.jitter_factor.clamp(0.0, 1.0);
        let jitter = if j > 0.0 {
            rand::thread_rng().gen_range((1.0 - j)..=(1.0 + j))
        } else {
            1.0
        };
        let delay = Duration::from_millis((base_ms as f64 * jitter) as u64);
        std::cmp::min(delay, Duration::from_millis(self.retry.max_delay_ms))
    }

    /// POST with retry on network errors and 5xx. Other failures return at once,
    /// so a 429 reaches the caller on the first attempt.
    async fn post_json<B: Serialize + Sync>(&self, url: &str, body: &B) -> Result<String> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            attempts += 1;

            let outcome = self
                .client
                .post(url)
                .query(&[("key", self.api_key.as_str())])
                .timeout(self.request_timeout)
                .json(body)
                .send()
                .await;

            match outcome {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.text().await.map_err(|e| {
                            LabAssistError::Transport(format!(
                                "Failed to read Gemini API response: {e}"
                            ))
                        });
                    }

                    let body_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    if !status.is_server_error() || attempts >= max_attempts {
                        return Err(http_error(status, &body_text));
                    }
                    tracing::warn!(
                        %status,
                        attempt = attempts,
                        "Gemini API returned a server error, retrying"
                    );
                }
                Err(e) => {
                    if attempts >= max_attempts {
                        return Err(LabAssistError::Transport(format!(
                            "Failed to send request to Gemini API after {attempts} attempts: {e}"
                        )));
                    }
                    tracing::warn!(attempt = attempts, "Gemini API request failed: {}", e);
                }
            }

            sleep(self.backoff_delay(attempts)).await;
        }
    }
}

#[async_trait]
impl Transport for GeminiTransport {
    async fn generate(&self, req: &GeminiRequest) -> Result<String> {
        tracing::debug!(model = %req.model, "generateContent");
        let url = self.endpoint(&req.model, "generateContent");
        let payload = self.post_json(&url, req).await?;

        let parsed: GenerateContentResponse = serde_json::from_str(&payload).map_err(|e| {
            LabAssistError::SchemaViolation(format!("Failed to parse Gemini response: {e}"))
        })?;
        if let Some(err) = parsed.error {
            return Err(LabAssistError::Transport(err.describe()));
        }
        candidate_text(&parsed).ok_or_else(|| {
            LabAssistError::SchemaViolation(
                "Gemini API returned no text in the response candidates".to_string(),
            )
        })
    }

    async fn stream(&self, req: &GeminiRequest) -> Result<TextStream> {
        tracing::debug!(model = %req.model, "streamGenerateContent");
        let url = self.endpoint(&req.model, "streamGenerateContent");
        let response = self
            .client
            .post(&url)
            .query(&[("alt", "sse"), ("key", self.api_key.as_str())])
            .json(req)
            .send()
            .await
            .map_err(|e| {
                LabAssistError::Transport(format!("Gemini API request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(http_error(status, &body_text));
        }

        let body: ByteStream = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed();
        Ok(text_stream_from_sse(body))
    }

    async fn generate_image(&self, model: &str, prompt: &str) -> Result<Vec<u8>> {
        tracing::debug!(model, "predict image");
        let url = self.endpoint(model, "predict");
        let body = serde_json::json!({
            "instances": [{ "prompt": prompt }],
            "parameters": {
                "sampleCount": 1,
                "outputMimeType": "image/jpeg",
                "aspectRatio": "1:1"
            }
        });
        let payload = self.post_json(&url, &body).await?;
        decode_prediction(&payload)
    }
}

// ───────────────────────────────────────────────────────────────────────────────
// Wire format
// ───────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ContentResponse>,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Debug, Deserialize)]
struct PartResponse {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<i64>,
    message: Option<String>,
    status: Option<String>,
}

impl ErrorBody {
    fn describe(&self) -> String {
        let message = self.message.clone().unwrap_or_else(|| "unknown error".to_string());
        match (&self.status, self.code) {
            (Some(status), Some(code)) => format!("{status} ({code}): {message}"),
            (Some(status), None) => format!("{status}: {message}"),
            (None, Some(code)) => format!("{code}: {message}"),
            (None, None) => message,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(rename = "bytesBase64Encoded")]
    bytes_base64_encoded: Option<String>,
}

fn candidate_text(response: &GenerateContentResponse) -> Option<String> {
    let parts = &response.candidates.first()?.content.as_ref()?.parts;
    let texts: Vec<&str> = parts.iter().filter_map(|p| p.text.as_deref()).collect();
    if texts.is_empty() {
        None
    } else {
        Some(texts.concat())
    }
}

fn http_error(status: StatusCode, body: &str) -> LabAssistError {
    let message = serde_json::from_str::<ErrorWrapper>(body)
        .map(|wrapper| wrapper.error.describe())
        .unwrap_or_else(|_| body.to_string());
    LabAssistError::Transport(format!("Gemini API error ({status}): {message}"))
}

fn decode_prediction(payload: &str) -> Result<Vec<u8>> {
    let parsed: PredictResponse = serde_json::from_str(payload).map_err(|e| {
        LabAssistError::SchemaViolation(format!("Failed to parse image response: {e}"))
    })?;
    let encoded = parsed
        .predictions
        .into_iter()
        .find_map(|p| p.bytes_base64_encoded)
        .ok_or_else(|| {
            LabAssistError::SchemaViolation("Image model returned no image".to_string())
        })?;
    BASE64_STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| LabAssistError::SchemaViolation(format!("Image payload is not base64: {e}")))
}

/// Decode one SSE data payload into a text fragment. Chunks that carry no
/// text (e.g. the final usage/finish chunk) produce nothing.
fn decode_stream_chunk(data: &str) -> Option<Result<String>> {
    let parsed: GenerateContentResponse = match serde_json::from_str(data) {
        Ok(parsed) => parsed,
        Err(e) => {
            return Some(Err(LabAssistError::SchemaViolation(format!(
                "Malformed stream chunk: {e}"
            ))));
        }
    };
    if let Some(err) = parsed.error {
        return Some(Err(LabAssistError::Transport(err.describe())));
    }
    candidate_text(&parsed).filter(|t| !t.is_empty()).map(Ok)
}

struct SseState {
    body: ByteStream,
    decoder: SseDecoder,
    pending: VecDeque<Result<String>>,
    done: bool,
}

fn text_stream_from_sse(body: ByteStream) -> TextStream {
    let state = SseState {
        body,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        done: false,
    };

    futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                if item.is_err() {
                    st.pending.clear();
                    st.done = true;
                }
                return Some((item, st));
            }
            if st.done {
                return None;
            }
            match st.body.next().await {
                Some(Ok(bytes)) => {
                    for data in st.decoder.push(&bytes) {
                        st.pending.extend(decode_stream_chunk(&data));
                    }
                }
                Some(Err(e)) => {
                    st.done = true;
                    return Some((
                        Err(LabAssistError::Transport(format!(
                            "Gemini stream interrupted: {e}"
                        ))),
                        st,
                    ));
                }
                None => {
                    st.done = true;
                    if let Some(data) = st.decoder.finish() {
                        st.pending.extend(decode_stream_chunk(&data));
                    }
                }
            }
        }
    })
    .boxed()
}
