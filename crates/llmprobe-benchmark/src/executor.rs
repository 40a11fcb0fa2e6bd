use std::time::{Duration, Instant};

use futures::StreamExt;
use llmprobe_core::{BackendConfig, ChatMessage, Measurement, ProbeError, RequestConfig, Result};
use reqwest::{StatusCode, Url};
use tracing::{debug, error, info, instrument};

use crate::stream::{drain_lines, StreamAccumulator};
use crate::wire::{ChatRequest, ChatResponse, ModelList, StreamOptions};

const CHAT_PATH: &str = "v1/chat/completions";
const MODELS_PATH: &str = "v1/models";
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Issues timed chat-completion requests against one backend.
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    client: reqwest::Client,
    name: String,
    model: String,
    base_url: Url,
    chat_url: Url,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
}

impl RequestExecutor {
    pub fn new(backend: &BackendConfig, request: &RequestConfig) -> Result<Self> {
        if request.max_tokens == 0 {
            return Err(ProbeError::Config("max_tokens must be greater than 0".into()));
        }

        let base_url = normalize_base(&backend.endpoint)?;
        let chat_url = join(&base_url, CHAT_PATH)?;
        let timeout = Duration::from_secs(request.timeout_secs);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProbeError::Http(e.to_string()))?;

        Ok(Self {
            client,
            name: backend.name.clone(),
            model: backend.model.clone(),
            base_url,
            chat_url,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            timeout,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn chat_url(&self) -> &str {
        self.chat_url.as_str()
    }

    /// Sends one request and measures it. `stream` selects SSE mode, which is
    /// the only mode that can observe time-to-first-token.
    #[instrument(skip(self, messages), fields(backend = %self.name))]
    pub async fn execute(&self, messages: &[ChatMessage], stream: bool) -> Result<Measurement> {
        if messages.is_empty() {
            return Err(ProbeError::Config("Request needs at least one message".into()));
        }

        let request = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stream,
            stream_options: stream.then_some(StreamOptions {
                include_usage: true,
            }),
        };

        let measurement = if stream {
            self.execute_streaming(&request).await?
        } else {
            self.execute_blocking(&request).await?
        };

        info!(
            wall_s = measurement.wall_time_seconds,
            ttft_s = ?measurement.time_to_first_token_seconds,
            tokens = measurement.completion_tokens,
            "Request complete"
        );
        Ok(measurement)
    }

    async fn execute_blocking(&self, request: &ChatRequest<'_>) -> Result<Measurement> {
        let start = Instant::now();

        let resp = self
            .client
            .post(self.chat_url.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.map_error(e))?;
        let wall = start.elapsed();

        if status != StatusCode::OK {
            return Err(ProbeError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| {
            ProbeError::Http(format!(
                "Failed to parse response: {} - Body: {}",
                e,
                preview(&body, 500)
            ))
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or_else(|| ProbeError::Http("Response has no choices".into()))?;

        let usage = parsed.usage.unwrap_or_default();
        if parsed.usage.is_none() {
            debug!("Response carried no usage object");
        }

        Ok(Measurement {
            wall_time_seconds: wall.as_secs_f64(),
            time_to_first_token_seconds: None,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            response_text: content,
        })
    }

    async fn execute_streaming(&self, request: &ChatRequest<'_>) -> Result<Measurement> {
        let start = Instant::now();

        let resp = self
            .client
            .post(self.chat_url.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = resp.status();
        if status != StatusCode::OK {
            let body = resp.text().await.map_err(|e| self.map_error(e))?;
            return Err(ProbeError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let mut acc = StreamAccumulator::new();
        let mut buf: Vec<u8> = Vec::new();
        let mut body = resp.bytes_stream();

        while let Some(chunk) = body.next().await {
            let bytes = chunk.map_err(|e| self.map_error(e))?;
            buf.extend_from_slice(&bytes);

            for line in drain_lines(&mut buf) {
                acc.push_line(&line, start.elapsed());
            }
            if acc.is_done() {
                break;
            }
        }

        if !acc.is_done() && !buf.is_empty() {
            let tail = String::from_utf8_lossy(&buf).into_owned();
            acc.push_line(&tail, start.elapsed());
        }

        let wall = start.elapsed();
        if acc.skipped() > 0 {
            debug!(skipped = acc.skipped(), "Stream had malformed chunks");
        }
        Ok(acc.finish(wall))
    }

    /// Checks that the server answers `GET /v1/models` and returns the model
    /// ids it advertises.
    #[instrument(skip(self), fields(backend = %self.name))]
    pub async fn probe(&self) -> Result<Vec<String>> {
        let url = join(&self.base_url, MODELS_PATH)?;

        let resp = self
            .client
            .get(url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, self.base_url.as_str(), PROBE_TIMEOUT))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| map_reqwest_error(e, self.base_url.as_str(), PROBE_TIMEOUT))?;

        if status != StatusCode::OK {
            return Err(ProbeError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let models: ModelList = serde_json::from_str(&body)?;
        Ok(models.data.into_iter().map(|m| m.id).collect())
    }

    fn map_error(&self, e: reqwest::Error) -> ProbeError {
        map_reqwest_error(e, self.chat_url.as_str(), self.timeout)
    }
}

/// Map reqwest errors to ProbeError, separating connect failures and timeouts
fn map_reqwest_error(e: reqwest::Error, url: &str, timeout: Duration) -> ProbeError {
    if e.is_timeout() {
        error!("Request to {} timed out", url);
        return ProbeError::Timeout(timeout.as_secs());
    }

    if e.is_connect() {
        error!("Could not connect to {}", url);
        return ProbeError::Connection(url.to_string());
    }

    error!("HTTP error: {}", e);
    ProbeError::Http(e.to_string())
}

/// Reduces any accepted endpoint spelling to the server base URL with a
/// trailing slash: `http://h:1`, `http://h:1/v1` and
/// `http://h:1/v1/chat/completions` all map to `http://h:1/`.
pub fn normalize_base(endpoint: &str) -> Result<Url> {
    let url = Url::parse(endpoint.trim())
        .map_err(|e| ProbeError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ProbeError::InvalidEndpoint(format!(
            "{}: scheme must be http or https",
            endpoint
        )));
    }
    if url.host_str().is_none() {
        return Err(ProbeError::InvalidEndpoint(format!("{}: missing host", endpoint)));
    }

    let mut path = url.path().trim_end_matches('/').to_string();
    for suffix in ["/chat/completions", "/v1"] {
        if let Some(stripped) = path.strip_suffix(suffix) {
            path = stripped.to_string();
        }
    }

    let mut base = url;
    base.set_query(None);
    base.set_fragment(None);
    base.set_path(&format!("{}/", path));
    Ok(base)
}

fn join(base: &Url, path: &str) -> Result<Url> {
    base.join(path)
        .map_err(|e| ProbeError::InvalidEndpoint(format!("{}{}: {}", base, path, e)))
}

fn preview(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
