//! RAG chat orchestration.
//!
//! One chat turn: retrieve, short-circuit when nothing matched, otherwise
//! build the grounded prompt and stream the completion. The event stream is
//! the application-level wire protocol: newline-delimited JSON objects in a
//! fixed order per turn. One `sources`, one `message_start`, zero or more
//! `message_chunk`, then exactly one of `message_end` or `error`.

use anyhow::Result;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::StreamExt;

use crate::config::Config;
use crate::llm::{self, StreamChunk};
use crate::memory::Role;
use crate::prompt::build_prompt;
use crate::retrieve::{self, RetrievalResult};
use crate::session::SessionState;

/// Canned reply when retrieval finds nothing; emitted without calling the
/// model to avoid hallucination and a wasted API call.
pub const NO_RESULTS_MESSAGE: &str =
    "I could not find relevant information about that in the document. \
     Try rephrasing the question or asking about a different part of the document.";

/// One event on the chat wire. Ephemeral; exists only during one turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    Sources { sources: Vec<RetrievalResult> },
    MessageStart,
    MessageChunk { content: String },
    MessageEnd,
    Error { error: String },
}

pub type ChatEventStream = Pin<Box<dyn Stream<Item = ChatEvent> + Send>>;

/// Non-streaming chat response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: String,
    pub sources: Vec<RetrievalResult>,
}

/// Runs one streaming chat turn.
///
/// Errors returned here happen before any event is emitted (no index, bad
/// credential, upstream rejection) and are mapped to an HTTP status by the
/// caller. Once the stream starts, failures surface as an `error` event.
pub async fn stream_chat_turn(
    config: &Config,
    session: Arc<SessionState>,
    message: &str,
) -> Result<ChatEventStream> {
    let sources = retrieve::retrieve(config, &session, message).await?;

    // History is captured before this turn's user message is appended, so
    // the question appears once in the prompt.
    let history = session.history_text();
    session.push_message(Role::User, message);

    if sources.is_empty() {
        session.push_message(Role::Assistant, NO_RESULTS_MESSAGE);
        let stream = futures::stream::iter([
            ChatEvent::Sources { sources: vec![] },
            ChatEvent::MessageStart,
            ChatEvent::MessageChunk {
                content: NO_RESULTS_MESSAGE.to_string(),
            },
            ChatEvent::MessageEnd,
        ]);
        return Ok(Box::pin(stream));
    }

    let context = build_context(&sources);
    let prompt = build_prompt(&history, &context, message);
    let tokens = llm::stream_completion(&config.completion, &prompt).await?;

    // Pass-through wrapper: forwards chunks unmodified while accumulating
    // the full text so the finished turn can be appended to memory.
    let stream = async_stream::stream! {
        yield ChatEvent::Sources { sources };
        yield ChatEvent::MessageStart;

        let mut tokens = tokens;
        let mut full_text = String::new();
        while let Some(chunk) = tokens.next().await {
            match chunk {
                StreamChunk::Token(text) => {
                    full_text.push_str(&text);
                    yield ChatEvent::MessageChunk { content: text };
                }
                StreamChunk::Done => {
                    session.push_message(Role::Assistant, full_text);
                    yield ChatEvent::MessageEnd;
                    return;
                }
                StreamChunk::Error(error) => {
                    yield ChatEvent::Error { error };
                    return;
                }
            }
        }

        // Upstream closed without a terminal chunk; treat as a clean end.
        session.push_message(Role::Assistant, full_text);
        yield ChatEvent::MessageEnd;
    };

    Ok(Box::pin(stream))
}

/// Runs one chat turn and drains the stream into a plain response.
pub async fn chat_turn(
    config: &Config,
    session: Arc<SessionState>,
    message: &str,
) -> Result<ChatResponse> {
    let mut stream = stream_chat_turn(config, session, message).await?;

    let mut sources = Vec::new();
    let mut full_text = String::new();
    while let Some(event) = stream.next().await {
        match event {
            ChatEvent::Sources { sources: s } => sources = s,
            ChatEvent::MessageChunk { content } => full_text.push_str(&content),
            ChatEvent::Error { error } => anyhow::bail!(error),
            ChatEvent::MessageStart | ChatEvent::MessageEnd => {}
        }
    }

    Ok(ChatResponse {
        message: full_text,
        sources,
    })
}

/// Renders retrieval results as a context block with 1-indexed bracket
/// citations, page tags included when known.
fn build_context(sources: &[RetrievalResult]) -> String {
    sources
        .iter()
        .enumerate()
        .map(|(i, r)| match r.page {
            Some(page) => format!("[{}] (page {}) {}", i + 1, page, r.content),
            None => format!("[{}] {}", i + 1, r.content),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::VectorIndex;
    use tempfile::TempDir;

    fn offline_setup() -> (Config, Arc<SessionState>, TempDir) {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = tmp.path().to_path_buf();
        let session = Arc::new(SessionState::new(&config.memory));
        (config, session, tmp)
    }

    #[tokio::test]
    async fn zero_results_short_circuits_without_calling_the_model() {
        let (config, session, _tmp) = offline_setup();
        // An index with no entries: retrieval succeeds with zero results.
        session.set_index(Arc::new(VectorIndex {
            model: "m".into(),
            dims: 2,
            entries: vec![],
        }));

        let events: Vec<ChatEvent> =
            stream_chat_turn(&config, session.clone(), "anything in here?")
                .await
                .unwrap()
                .collect()
                .await;

        assert_eq!(
            events,
            vec![
                ChatEvent::Sources { sources: vec![] },
                ChatEvent::MessageStart,
                ChatEvent::MessageChunk {
                    content: NO_RESULTS_MESSAGE.to_string()
                },
                ChatEvent::MessageEnd,
            ]
        );
        // Both turns were recorded, the canned reply as the assistant's.
        assert_eq!(session.memory_len(), 2);
        assert_eq!(
            session.last_assistant_message().as_deref(),
            Some(NO_RESULTS_MESSAGE)
        );
    }

    #[tokio::test]
    async fn missing_index_propagates_the_not_found_message() {
        let (config, session, _tmp) = offline_setup();
        let err = stream_chat_turn(&config, session, "question")
            .await
            .map(|_| ())
            .unwrap_err();
        assert!(err.to_string().contains("Vector store not found"));
    }

    #[test]
    fn events_serialize_with_snake_case_tags() {
        let event = ChatEvent::MessageChunk {
            content: "hi".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"message_chunk","content":"hi"}"#);

        let start = serde_json::to_string(&ChatEvent::MessageStart).unwrap();
        assert_eq!(start, r#"{"type":"message_start"}"#);

        let sources = serde_json::to_string(&ChatEvent::Sources { sources: vec![] }).unwrap();
        assert_eq!(sources, r#"{"type":"sources","sources":[]}"#);
    }

    #[test]
    fn context_uses_bracket_citations_and_page_tags() {
        let sources = vec![
            RetrievalResult {
                content: "first hit".into(),
                score: 0.9,
                page: Some(3),
            },
            RetrievalResult {
                content: "second hit".into(),
                score: 0.5,
                page: None,
            },
        ];
        let context = build_context(&sources);
        assert_eq!(context, "[1] (page 3) first hit\n\n[2] second hit");
    }
}
