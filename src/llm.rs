//! Streaming completion client.
//!
//! Issues a streaming `generateContent` request with SSE framing and
//! demultiplexes the provider's event frames into a plain token stream.
//! Frame parsing is strict on shape but fails closed: a single malformed
//! line is logged and skipped, never aborting the whole stream.

use std::pin::Pin;
use std::time::Duration;

use anyhow::{bail, Result};
use futures::Stream;
use serde::Deserialize;
use tokio_stream::StreamExt;

use crate::config::CompletionConfig;
use crate::embedding::api_key;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Boxed token stream handed to the chat layer.
pub type TokenStream = Pin<Box<dyn Stream<Item = StreamChunk> + Send>>;

/// A single demultiplexed event from the upstream SSE stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    Token(String),
    Done,
    Error(String),
}

// The closed subset of the provider frame shape actually consumed:
// candidates[0].content.parts[0].text. Anything else is a shape mismatch
// and the line is skipped.
#[derive(Debug, Deserialize)]
struct StreamFrame {
    #[serde(default)]
    candidates: Vec<FrameCandidate>,
}

#[derive(Debug, Deserialize)]
struct FrameCandidate {
    #[serde(default)]
    content: Option<FrameContent>,
}

#[derive(Debug, Deserialize)]
struct FrameContent {
    #[serde(default)]
    parts: Vec<FramePart>,
}

#[derive(Debug, Deserialize)]
struct FramePart {
    #[serde(default)]
    text: Option<String>,
}

/// Outcome of parsing one line of the SSE stream.
#[derive(Debug, Clone, PartialEq)]
pub enum SseLine {
    /// A text delta to forward.
    Token(String),
    /// The `[DONE]` sentinel: close the output stream.
    Done,
    /// Comment, blank line, empty frame, or malformed payload: skip.
    Skip,
}

/// Parses one line of SSE framing. Pure, so the line-level recovery rules
/// are testable without a network.
pub fn parse_sse_line(line: &str) -> SseLine {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return SseLine::Skip;
    }

    let Some(payload) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let payload = payload.trim_start();

    if payload == "[DONE]" {
        return SseLine::Done;
    }

    match serde_json::from_str::<StreamFrame>(payload) {
        Ok(frame) => {
            let text = frame
                .candidates
                .into_iter()
                .next()
                .and_then(|c| c.content)
                .and_then(|c| c.parts.into_iter().next())
                .and_then(|p| p.text);
            match text {
                Some(t) if !t.is_empty() => SseLine::Token(t),
                _ => SseLine::Skip,
            }
        }
        Err(e) => {
            tracing::warn!("skipping malformed stream line: {}", e);
            SseLine::Skip
        }
    }
}

/// Opens a streaming completion for `prompt`.
///
/// Fails up front on an empty prompt, a missing credential, or a non-2xx
/// upstream response. After that, errors surface as a terminal
/// [`StreamChunk::Error`] item. Dropping the returned stream drops the
/// upstream reader, which cancels the request best-effort.
pub async fn stream_completion(config: &CompletionConfig, prompt: &str) -> Result<TokenStream> {
    if prompt.trim().is_empty() {
        bail!("Prompt must not be empty");
    }
    let api_key = api_key()?;

    let url = format!(
        "{}/models/{}:streamGenerateContent?alt=sse",
        API_BASE, config.model
    );
    let body = serde_json::json!({
        "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
    });

    // Connect timeout only: a whole-request timeout would cut long streams.
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let response = client
        .post(&url)
        .header("x-goog-api-key", api_key)
        .header("Content-Type", "application/json")
        .json(&body)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        bail!("Completion API error {}: {}", status, body_text);
    }

    let stream = async_stream::stream! {
        let mut upstream = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(chunk) = upstream.next().await {
            let bytes = match chunk {
                Ok(b) => b,
                Err(e) => {
                    yield StreamChunk::Error(format!("Stream read error: {}", e));
                    return;
                }
            };

            buffer.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(line_end) = buffer.find('\n') {
                let line: String = buffer.drain(..=line_end).collect();
                match parse_sse_line(&line) {
                    SseLine::Token(text) => yield StreamChunk::Token(text),
                    SseLine::Done => {
                        yield StreamChunk::Done;
                        return;
                    }
                    SseLine::Skip => {}
                }
            }
        }

        // Graceful upstream end: flush any trailing line, then close.
        match parse_sse_line(&buffer) {
            SseLine::Token(text) => yield StreamChunk::Token(text),
            SseLine::Done | SseLine::Skip => {}
        }
        yield StreamChunk::Done;
    };

    Ok(Box::pin(stream))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_text_delta() {
        let line = r#"data: {"candidates":[{"content":{"parts":[{"text":"hello"}]}}]}"#;
        assert_eq!(parse_sse_line(line), SseLine::Token("hello".to_string()));
    }

    #[test]
    fn done_sentinel_closes_the_stream() {
        assert_eq!(parse_sse_line("data: [DONE]"), SseLine::Done);
        assert_eq!(parse_sse_line("data:[DONE]"), SseLine::Done);
    }

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        assert_eq!(parse_sse_line(""), SseLine::Skip);
        assert_eq!(parse_sse_line("   "), SseLine::Skip);
        assert_eq!(parse_sse_line(": keepalive"), SseLine::Skip);
        assert_eq!(parse_sse_line("event: ping"), SseLine::Skip);
    }

    #[test]
    fn malformed_payload_is_skipped_not_fatal() {
        assert_eq!(parse_sse_line("data: {not json"), SseLine::Skip);
        assert_eq!(parse_sse_line("data: 42"), SseLine::Skip);
    }

    #[test]
    fn empty_frame_shapes_are_skipped() {
        assert_eq!(parse_sse_line("data: {}"), SseLine::Skip);
        assert_eq!(parse_sse_line(r#"data: {"candidates":[]}"#), SseLine::Skip);
        assert_eq!(
            parse_sse_line(r#"data: {"candidates":[{"content":{"parts":[]}}]}"#),
            SseLine::Skip
        );
        assert_eq!(
            parse_sse_line(r#"data: {"candidates":[{"content":{"parts":[{"text":""}]}}]}"#),
            SseLine::Skip
        );
    }

    #[test]
    fn malformed_lines_mixed_with_valid_lines_keep_the_valid_text() {
        let lines = [
            r#"data: {"candidates":[{"content":{"parts":[{"text":"one "}]}}]}"#,
            "data: {broken",
            r#"data: {"candidates":[{"content":{"parts":[{"text":"two"}]}}]}"#,
        ];
        let aggregate: String = lines
            .iter()
            .filter_map(|l| match parse_sse_line(l) {
                SseLine::Token(t) => Some(t),
                _ => None,
            })
            .collect();
        assert_eq!(aggregate, "one two");
    }

    #[test]
    fn only_the_first_candidate_and_part_are_read() {
        let line = r#"data: {"candidates":[{"content":{"parts":[{"text":"a"},{"text":"b"}]}},{"content":{"parts":[{"text":"c"}]}}]}"#;
        assert_eq!(parse_sse_line(line), SseLine::Token("a".to_string()));
    }
}
