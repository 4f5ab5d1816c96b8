use crate::agent::tools::ToolInvocation;
use crate::error::{Result, RoamingError};
use crate::storage::{check_read_only, QueryRows, SqlBackend};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Executes parsed tool invocations against the storage backend and renders
/// their results as text for the transcript.
#[derive(Clone)]
pub struct ToolRuntime {
    backend: Arc<dyn SqlBackend>,
    max_result_chars: usize,
}

impl ToolRuntime {
    pub fn new(backend: Arc<dyn SqlBackend>, max_result_chars: usize) -> Self {
        Self {
            backend,
            max_result_chars,
        }
    }

    /// [`ToolRuntime::execute`] on tokio's blocking pool, so store I/O never
    /// stalls an async worker shared with other connections.
    pub async fn execute_blocking(&self, invocation: &ToolInvocation, row_limit: usize) -> Result<String> {
        let runtime = self.clone();
        let invocation = invocation.clone();
        tokio::task::spawn_blocking(move || runtime.execute(&invocation, row_limit))
            .await
            .map_err(|e| RoamingError::connectivity(format!("tool task did not complete: {}", e)))?
    }

    /// `row_limit` applies to `ExecuteQuery` only and must already be capped.
    pub fn execute(&self, invocation: &ToolInvocation, row_limit: usize) -> Result<String> {
        let text = match invocation {
            ToolInvocation::ListTables => self.backend.list_tables()?.join(", "),
            ToolInvocation::DescribeSchema { tables } => self
                .backend
                .describe_schema(tables)?
                .iter()
                .map(|d| d.render())
                .collect::<Vec<_>>()
                .join("\n\n"),
            ToolInvocation::ValidateQuery { query } => {
                check_read_only(query)?;
                self.backend.validate_query(query)?;
                format!("The query is valid:\n{}", query)
            }
            ToolInvocation::ExecuteQuery { query, .. } => {
                check_read_only(query)?;
                let rows = self.backend.execute_query(query, row_limit)?;
                debug!("Query rows: {:?}", rows.rows);
                render_rows(&rows, row_limit)
            }
        };
        Ok(truncate_chars(text, self.max_result_chars))
    }
}

pub fn render_rows(rows: &QueryRows, row_limit: usize) -> String {
    if rows.rows.is_empty() {
        return format!("Columns: {}\nNo rows returned.", rows.columns.join(", "));
    }
    let mut lines = Vec::with_capacity(rows.rows.len() + 2);
    lines.push(rows.columns.join("\t"));
    for row in &rows.rows {
        let cells: Vec<String> = row
            .iter()
            .map(|v| match v {
                Value::Null => "NULL".to_string(),
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        lines.push(cells.join("\t"));
    }
    if rows.truncated {
        lines.push(format!("(showing the first {} rows)", row_limit));
    }
    lines.join("\n")
}

fn truncate_chars(text: String, max_chars: usize) -> String {
    if max_chars == 0 || text.chars().count() <= max_chars {
        return text;
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("\n...(truncated)");
    out
}
