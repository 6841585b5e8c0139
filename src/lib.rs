//! pagechat: ask questions about a PDF over HTTP.
//!
//! A single-user retrieval-augmented question answering service. A PDF is
//! uploaded once, split into page-sized chunks, embedded, and indexed; chat
//! turns then retrieve the closest chunks, assemble a grounded prompt, and
//! stream the model's answer back as newline-delimited JSON events.
//!
//! Module map:
//! - [`config`]: layered TOML configuration with serde defaults
//! - [`extract`]: PDF text extraction and declared page counts
//! - [`segment`]: page segmentation heuristics over extracted text
//! - [`store`]: flat-file persistence under the data directory
//! - [`embedding`]: batch embedding client with retry and backoff
//! - [`index`]: the in-memory vector index and the ingestion pipeline
//! - [`memory`]: token-budgeted conversation memory
//! - [`prompt`]: grounded prompt assembly with guardrails
//! - [`llm`]: streaming completion client over SSE framing
//! - [`retrieve`]: nearest-neighbor retrieval with cold-start reload
//! - [`session`]: shared per-session state handle
//! - [`chat`]: one-turn RAG orchestration and the chat event protocol
//! - [`server`]: axum routes and error classification

pub mod chat;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod index;
pub mod llm;
pub mod memory;
pub mod prompt;
pub mod retrieve;
pub mod segment;
pub mod server;
pub mod session;
pub mod store;
