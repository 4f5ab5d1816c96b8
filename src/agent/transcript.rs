//! Agent transcript
//!
//! Everything one question's run has seen so far: the instructions, the
//! question and every tool call, tool result and notice in order. Lives for
//! the duration of a single run and is never persisted.

use crate::agent::tools::ToolName;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    ToolListRequest,
    ToolSchemaRequest,
    ToolQueryValidate,
    ToolQueryExecute,
    FinalAnswer,
}

/// Compact per-step record used for diagnostics. Payloads carry the tool
/// arguments, not tool results, so row data never leaves the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentTurn {
    pub kind: TurnKind,
    pub payload: String,
}

/// Write the turns of an unfinished run to the log.
pub fn log_turns(turns: &[AgentTurn]) {
    for (i, turn) in turns.iter().enumerate() {
        warn!("  turn {}: {:?} {}", i + 1, turn.kind, turn.payload);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TranscriptEntry {
    ToolCall {
        id: String,
        name: String,
        arguments: String,
    },
    ToolResult {
        id: String,
        name: String,
        content: String,
        is_error: bool,
    },
    /// Corrective instruction injected by the loop.
    Notice { text: String },
    FinalAnswer { text: String },
}

#[derive(Debug, Clone)]
pub struct Transcript {
    instructions: String,
    question: String,
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new(instructions: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            question: question.into(),
            entries: Vec::new(),
        }
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn push_tool_call(&mut self, id: &str, name: &str, arguments: &str) {
        self.entries.push(TranscriptEntry::ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        });
    }

    pub fn push_tool_result(&mut self, id: &str, name: &str, content: String, is_error: bool) {
        self.entries.push(TranscriptEntry::ToolResult {
            id: id.to_string(),
            name: name.to_string(),
            content,
            is_error,
        });
    }

    pub fn push_notice(&mut self, text: impl Into<String>) {
        self.entries.push(TranscriptEntry::Notice { text: text.into() });
    }

    pub fn push_final_answer(&mut self, text: impl Into<String>) {
        self.entries.push(TranscriptEntry::FinalAnswer { text: text.into() });
    }

    /// Most recent tool result, if any.
    pub fn last_tool_result(&self) -> Option<(&str, &str, bool)> {
        self.entries.iter().rev().find_map(|e| match e {
            TranscriptEntry::ToolResult {
                name,
                content,
                is_error,
                ..
            } => Some((name.as_str(), content.as_str(), *is_error)),
            _ => None,
        })
    }

    /// Most recent notice, if it is the last entry.
    pub fn pending_notice(&self) -> Option<&str> {
        match self.entries.last() {
            Some(TranscriptEntry::Notice { text }) => Some(text),
            _ => None,
        }
    }

    pub fn turns(&self) -> Vec<AgentTurn> {
        self.entries
            .iter()
            .filter_map(|e| match e {
                TranscriptEntry::ToolCall {
                    name, arguments, ..
                } => ToolName::parse(name).map(|tool| AgentTurn {
                    kind: tool.turn_kind(),
                    payload: arguments.clone(),
                }),
                TranscriptEntry::FinalAnswer { text } => Some(AgentTurn {
                    kind: TurnKind::FinalAnswer,
                    payload: text.clone(),
                }),
                _ => None,
            })
            .collect()
    }
}
