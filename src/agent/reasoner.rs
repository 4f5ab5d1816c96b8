//! Reasoning component
//!
//! The opaque decision maker behind the loop. Given the transcript so far it
//! proposes either one tool call or a final answer.

use crate::agent::tools::ToolSpec;
use crate::agent::transcript::{Transcript, TranscriptEntry};
use crate::error::Result;
use crate::llm::{ChatMessage, ChatReply, FunctionCall, LlmClient};
use async_trait::async_trait;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReasonerStep {
    ToolCall {
        id: Option<String>,
        name: String,
        arguments: String,
    },
    FinalAnswer(String),
}

#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn next_step(&self, transcript: &Transcript, tools: &[ToolSpec]) -> Result<ReasonerStep>;
}

/// Reasoner backed by an OpenAI-compatible chat model.
pub struct LlmReasoner {
    client: LlmClient,
}

impl LlmReasoner {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Reasoner for LlmReasoner {
    async fn next_step(&self, transcript: &Transcript, tools: &[ToolSpec]) -> Result<ReasonerStep> {
        let messages = render_messages(transcript);
        match self.client.chat_with_tools(&messages, tools).await? {
            ChatReply::ToolCalls(calls) => {
                if calls.len() > 1 {
                    debug!("Model proposed {} tool calls; running the first only", calls.len());
                }
                match calls.into_iter().next() {
                    Some(call) => Ok(ReasonerStep::ToolCall {
                        id: Some(call.id),
                        name: call.name,
                        arguments: call.arguments,
                    }),
                    None => Ok(ReasonerStep::FinalAnswer(String::new())),
                }
            }
            ChatReply::Content(text) => Ok(ReasonerStep::FinalAnswer(text)),
        }
    }
}

/// Chat messages for a transcript: instructions, question, then every entry.
pub fn render_messages(transcript: &Transcript) -> Vec<ChatMessage> {
    let mut messages = vec![
        ChatMessage::system(transcript.instructions()),
        ChatMessage::user(transcript.question()),
    ];
    for entry in transcript.entries() {
        messages.push(match entry {
            TranscriptEntry::ToolCall {
                id,
                name,
                arguments,
            } => ChatMessage::assistant_tool_call(FunctionCall {
                id: id.clone(),
                name: name.clone(),
                arguments: arguments.clone(),
            }),
            TranscriptEntry::ToolResult {
                id, name, content, ..
            } => ChatMessage::tool_result(id, name, content),
            TranscriptEntry::Notice { text } => ChatMessage::user(text),
            TranscriptEntry::FinalAnswer { text } => ChatMessage::assistant(text),
        });
    }
    messages
}
