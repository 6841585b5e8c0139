//! Bounded conversation history.
//!
//! Holds the single active conversation as an ordered message list with a
//! token budget: the most recent messages are kept verbatim within
//! `short_term_ratio × token_limit`, and older messages fill the remainder,
//! truncated from the front when the boundary message does not fit.
//!
//! Token accounting is approximate (4 characters per token).

use serde::{Deserialize, Serialize};

use crate::config::MemoryConfig;

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct ConversationMemory {
    messages: Vec<ChatMessage>,
    token_limit: usize,
    short_term_ratio: f64,
}

fn approx_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN).max(1)
}

impl ConversationMemory {
    pub fn new(config: &MemoryConfig) -> Self {
        Self {
            messages: Vec::new(),
            token_limit: config.token_limit.max(1),
            short_term_ratio: config.short_term_ratio.clamp(0.0, 1.0),
        }
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(ChatMessage {
            role,
            content: content.into(),
        });
    }

    pub fn reset(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// The budgeted view of the conversation, oldest first.
    ///
    /// Recent messages are included verbatim up to the short-term budget;
    /// older messages fill the rest of the token limit, with the message at
    /// the boundary truncated from the front and everything older dropped.
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        let short_budget = (self.token_limit as f64 * self.short_term_ratio) as usize;

        let mut kept: Vec<ChatMessage> = Vec::new();
        let mut used = 0usize;
        let mut iter = self.messages.iter().rev().peekable();

        // Short-term window: newest messages verbatim. The newest message is
        // always included so a turn is never silently empty.
        while let Some(msg) = iter.peek() {
            let cost = approx_tokens(&msg.content);
            if !kept.is_empty() && used + cost > short_budget {
                break;
            }
            kept.push((*msg).clone());
            used += cost;
            iter.next();
        }

        // Long-term remainder: older messages until the overall limit.
        for msg in iter {
            let cost = approx_tokens(&msg.content);
            if used + cost <= self.token_limit {
                kept.push(msg.clone());
                used += cost;
                continue;
            }
            let remaining_tokens = self.token_limit.saturating_sub(used);
            if remaining_tokens > 0 {
                kept.push(ChatMessage {
                    role: msg.role,
                    content: tail_chars(&msg.content, remaining_tokens * CHARS_PER_TOKEN),
                });
            }
            break;
        }

        kept.reverse();
        kept
    }

    /// The budgeted history rendered as plain text for the prompt builder.
    pub fn history_text(&self) -> String {
        self.snapshot()
            .iter()
            .map(|m| {
                let speaker = match m.role {
                    Role::User => "User",
                    Role::Assistant => "Assistant",
                };
                format!("{}: {}", speaker, m.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// The last `max_chars` characters of `text` (char-boundary safe).
fn tail_chars(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    text.chars().skip(total - max_chars).collect()
}
