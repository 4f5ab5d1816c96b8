use crate::agent::transcript::AgentTurn;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Whether a failed query can be fixed by rewriting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionErrorKind {
    /// The query itself is wrong (unknown column, type mismatch, ...).
    Logical,
    /// The store could not be reached or is unusable.
    Connectivity,
}

impl fmt::Display for ExecutionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionErrorKind::Logical => write!(f, "logical"),
            ExecutionErrorKind::Connectivity => write!(f, "connectivity"),
        }
    }
}

#[derive(Error, Debug)]
pub enum RoamingError {
    #[error("SQL syntax error: {0}")]
    Syntax(String),

    #[error("Forbidden statement: {0}")]
    ForbiddenStatement(String),

    #[error("Execution error ({kind}): {detail}")]
    Execution {
        kind: ExecutionErrorKind,
        detail: String,
    },

    #[error("Agent exhausted its budget of {steps} steps without a final answer")]
    AgentExhausted {
        steps: usize,
        transcript: Vec<AgentTurn>,
    },

    #[error("Agent failure{}: {detail}", tool_suffix(.last_tool))]
    AgentFailure {
        last_tool: Option<String>,
        detail: String,
    },

    #[error("Invalid question: {0}")]
    InvalidQuestion(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Ingestion error: {0}")]
    Ingest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl RoamingError {
    pub fn logical(detail: impl Into<String>) -> Self {
        RoamingError::Execution {
            kind: ExecutionErrorKind::Logical,
            detail: detail.into(),
        }
    }

    pub fn connectivity(detail: impl Into<String>) -> Self {
        RoamingError::Execution {
            kind: ExecutionErrorKind::Connectivity,
            detail: detail.into(),
        }
    }

    /// Errors the agent loop may fix by revising its query.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RoamingError::Syntax(_)
                | RoamingError::ForbiddenStatement(_)
                | RoamingError::Execution {
                    kind: ExecutionErrorKind::Logical,
                    ..
                }
        )
    }

    /// Turns recorded before the step budget ran out.
    pub fn partial_transcript(&self) -> Option<&[AgentTurn]> {
        match self {
            RoamingError::AgentExhausted { transcript, .. } => Some(transcript.as_slice()),
            _ => None,
        }
    }
}

fn tool_suffix(last_tool: &Option<String>) -> String {
    last_tool
        .as_ref()
        .map(|t| format!(" (last tool: {})", t))
        .unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, RoamingError>;
