//! Streaming chat completion client.
//!
//! Sends the summary request to an OpenAI-compatible endpoint and folds the
//! server-sent event stream into one growing text, reporting progress through
//! a throttled callback.

use crate::clock::{Clock, SystemClock};
use crate::config::AgentConfig;
use crate::prompt::{ChatRequestBody, PromptRequest};
use crate::summary::{parse_summary_with_outcome, ParseOutcome, SummaryResult};
use chrono::{DateTime, Duration, Utc};
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use std::future::Future;
use thiserror::Error;
use tracing::{debug, info, warn};

/// User-Agent string identifying this client
const USER_AGENT: &str = concat!("quickxiv/", env!("CARGO_PKG_VERSION"));

const CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Minimum spacing between progress callbacks while streaming.
pub const RENDER_INTERVAL_MS: i64 = 150;

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// Failures that abort a summarization attempt.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid API key. Please update it in settings.")]
    Auth { status: u16 },
    #[error("Model is loading. Please retry in a few seconds.")]
    Unavailable,
    #[error("API error ({status}): {body}")]
    Server { status: u16, body: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ApiError {
    /// Map a non-success HTTP status and its body to an error.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => ApiError::Auth { status },
            503 => ApiError::Unavailable,
            _ => ApiError::Server { status, body },
        }
    }
}

/// A stream line that could not be decoded. Skipped, never fatal.
#[derive(Error, Debug)]
pub enum LineError {
    #[error("malformed stream chunk: {0}")]
    MalformedChunk(#[from] serde_json::Error),
}

/// What one complete stream line contributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// Blank, comment, non-data or content-free line
    Ignored,
    /// The end-of-stream sentinel
    Done,
    Delta(String),
}

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Decode one complete line of the event stream.
pub fn decode_line(line: &str) -> Result<LineEvent, LineError> {
    let Some(payload) = line.trim().strip_prefix(DATA_PREFIX) else {
        return Ok(LineEvent::Ignored);
    };
    let payload = payload.trim();
    if payload == DONE_SENTINEL {
        return Ok(LineEvent::Done);
    }

    let chunk: ChunkPayload = serde_json::from_str(payload)?;
    let content = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content)
        .filter(|content| !content.is_empty());

    Ok(content.map_or(LineEvent::Ignored, LineEvent::Delta))
}

/// Splits raw response bytes into complete lines.
///
/// Bytes are held until a newline arrives, so a UTF-8 sequence or a line cut
/// across network reads is only decoded once it is whole.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a network chunk and return every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };
        let complete: Vec<u8> = self.pending.drain(..=last_newline).collect();
        complete[..complete.len() - 1]
            .split(|&b| b == b'\n')
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect()
    }

    /// Whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

/// Lets an event through at most once per interval.
#[derive(Debug, Clone)]
pub struct RenderGate {
    interval: Duration,
    last: Option<DateTime<Utc>>,
}

impl RenderGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Whether an event at `now` may pass; a passing event restarts the interval.
    pub fn ready(&mut self, now: DateTime<Utc>) -> bool {
        let open = self.last.map_or(true, |last| now - last >= self.interval);
        if open {
            self.last = Some(now);
        }
        open
    }
}

impl Default for RenderGate {
    fn default() -> Self {
        Self::new(Duration::milliseconds(RENDER_INTERVAL_MS))
    }
}

/// Fold an event stream into the concatenation of its content deltas.
///
/// `on_partial` receives the whole accumulated text, throttled by `gate`
/// while streaming, and once more with the final text after the stream ends.
pub async fn accumulate_stream<S, B, E, F>(
    stream: S,
    clock: &dyn Clock,
    mut gate: RenderGate,
    mut on_partial: F,
) -> Result<String, ApiError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<ApiError>,
    F: FnMut(&str),
{
    let mut stream = std::pin::pin!(stream);
    let mut decoder = SseDecoder::new();
    let mut text = String::new();
    let mut skipped = 0usize;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(Into::<ApiError>::into)?;
        for line in decoder.push(chunk.as_ref()) {
            if apply_line(&line, &mut text, &mut skipped) && gate.ready(clock.now()) {
                on_partial(&text);
            }
        }
    }
    if let Some(line) = decoder.finish() {
        apply_line(&line, &mut text, &mut skipped);
    }

    if skipped > 0 {
        debug!(skipped, "skipped malformed stream lines");
    }
    on_partial(&text);
    Ok(text)
}

/// Apply one line to the accumulator, returning whether text was appended.
fn apply_line(line: &str, text: &mut String, skipped: &mut usize) -> bool {
    match decode_line(line) {
        Ok(LineEvent::Delta(delta)) => {
            text.push_str(&delta);
            true
        }
        Ok(LineEvent::Ignored | LineEvent::Done) => false,
        Err(e) => {
            debug!(error = %e, "skipping stream line");
            *skipped += 1;
            false
        }
    }
}

/// Client for the streaming chat completions endpoint.
pub struct SummaryClient {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl SummaryClient {
    pub fn new(agent: &AgentConfig, api_key: &str) -> Result<Self, ApiError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            endpoint: agent.endpoint.clone(),
            model: agent.model.clone(),
            api_key: api_key.to_string(),
        })
    }
}

/// Something that turns a prompt into a streamed summary.
pub trait Generator {
    /// Run `request` and return the summary parsed from the complete response.
    ///
    /// `on_partial` receives the accumulated response text as it grows.
    fn stream_summary<F>(
        &self,
        request: &PromptRequest,
        on_partial: F,
    ) -> impl Future<Output = Result<SummaryResult, ApiError>>
    where
        F: FnMut(&str);
}

impl Generator for SummaryClient {
    async fn stream_summary<F>(
        &self,
        request: &PromptRequest,
        on_partial: F,
    ) -> Result<SummaryResult, ApiError>
    where
        F: FnMut(&str),
    {
        info!(
            model = %self.model,
            input_chars = request.user_content.chars().count(),
            "sending streaming request"
        );

        let body = ChatRequestBody::new(&self.model, request);
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), %body, "generation request rejected");
            return Err(ApiError::from_status(status.as_u16(), body));
        }

        let text = accumulate_stream(
            response.bytes_stream(),
            &SystemClock,
            RenderGate::default(),
            on_partial,
        )
        .await?;
        info!(output_chars = text.chars().count(), "streaming complete");

        let (summary, outcome) = parse_summary_with_outcome(&text);
        if outcome == ParseOutcome::Fallback {
            warn!("response had no recognisable headings, showing it unsplit");
        }
        Ok(summary)
    }
}
