use crate::agent::transcript::AgentTurn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

const INSIGHT_MARKER: &str = "Insight:";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TraceEventType {
    ToolCall,
    ToolResult,
    PolicyRefusal,
    Notice,
    Error,
    FinalAnswer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub ts_ms: u64,
    pub step: usize,
    pub event_type: TraceEventType,
    #[serde(default)]
    pub payload: Value,
}

impl TraceEvent {
    pub fn now(step: usize, event_type: TraceEventType, payload: Value) -> Self {
        let ts_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self {
            ts_ms,
            step,
            event_type,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

/// Successful result of one question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentAnswer {
    pub run_id: String,
    /// Final answer exactly as produced.
    pub text: String,
    pub answer: String,
    #[serde(default)]
    pub insight: Option<String>,
    /// Last query that executed successfully.
    #[serde(default)]
    pub sql: Option<String>,
    pub steps: usize,
    #[serde(default)]
    pub trace: Vec<TraceEvent>,
}

impl AgentAnswer {
    pub fn new(
        run_id: String,
        text: String,
        sql: Option<String>,
        steps: usize,
        trace: Vec<TraceEvent>,
    ) -> Self {
        let (answer, insight) = split_insight(&text);
        Self {
            run_id,
            text,
            answer,
            insight,
            sql,
            steps,
            trace,
        }
    }
}

/// Split a final answer on the first `Insight:` marker.
pub fn split_insight(text: &str) -> (String, Option<String>) {
    match text.find(INSIGHT_MARKER) {
        Some(idx) => {
            let answer = text[..idx].trim().trim_end_matches("**").trim_end().to_string();
            let insight = text[idx + INSIGHT_MARKER.len()..]
                .trim()
                .trim_start_matches("**")
                .trim_start()
                .to_string();
            let insight = if insight.is_empty() { None } else { Some(insight) };
            (answer, insight)
        }
        None => (text.trim().to_string(), None),
    }
}

/// Error body returned to callers of the HTTP API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
    #[serde(default)]
    pub last_tool: Option<String>,
    #[serde(default)]
    pub steps: Option<usize>,
    /// Turns of an exhausted run. Payloads hold tool arguments only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<Vec<AgentTurn>>,
}

impl ErrorResponse {
    pub fn from_error(err: &crate::error::RoamingError) -> Self {
        use crate::error::RoamingError;
        let transcript = err.partial_transcript().map(<[AgentTurn]>::to_vec);
        let (kind, last_tool, steps) = match err {
            RoamingError::AgentExhausted { steps, .. } => ("agent_exhausted", None, Some(*steps)),
            RoamingError::AgentFailure { last_tool, .. } => ("agent_failure", last_tool.clone(), None),
            RoamingError::InvalidQuestion(_) => ("invalid_question", None, None),
            RoamingError::Config(_) => ("config", None, None),
            RoamingError::Database(_) => ("database", None, None),
            RoamingError::Llm(_) => ("llm", None, None),
            _ => ("internal", None, None),
        };
        Self {
            error: err.to_string(),
            kind: kind.to_string(),
            last_tool,
            steps,
            transcript,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::transcript::TurnKind;
    use crate::error::RoamingError;

    #[test]
    fn test_split_insight() {
        let (answer, insight) = split_insight(
            "Germany (Cosmote) used 1000 bytes.\n\nInsight: Germany leads inbound traffic.",
        );
        assert_eq!(answer, "Germany (Cosmote) used 1000 bytes.");
        assert_eq!(insight.as_deref(), Some("Germany leads inbound traffic."));
    }

    #[test]
    fn test_split_insight_bold_and_missing() {
        let (answer, insight) = split_insight("Total: 5\n**Insight:** Growth is strong.");
        assert_eq!(answer, "Total: 5");
        assert_eq!(insight.as_deref(), Some("Growth is strong."));

        let (answer, insight) = split_insight("  Just an answer ");
        assert_eq!(answer, "Just an answer");
        assert!(insight.is_none());
    }

    #[test]
    fn test_error_response_kinds() {
        let resp = ErrorResponse::from_error(&RoamingError::AgentExhausted {
            steps: 4,
            transcript: vec![AgentTurn {
                kind: TurnKind::ToolListRequest,
                payload: "{}".into(),
            }],
        });
        assert_eq!(resp.kind, "agent_exhausted");
        assert_eq!(resp.steps, Some(4));
        assert_eq!(resp.transcript.as_ref().map(Vec::len), Some(1));
        let body = serde_json::to_string(&resp).unwrap();
        assert!(body.contains("\"tool_list_request\""));

        let resp = ErrorResponse::from_error(&RoamingError::AgentFailure {
            last_tool: Some("sql_db_query".into()),
            detail: "database is locked".into(),
        });
        assert_eq!(resp.last_tool.as_deref(), Some("sql_db_query"));
        assert!(resp.transcript.is_none());
        assert!(!serde_json::to_string(&resp).unwrap().contains("transcript"));
    }
}
