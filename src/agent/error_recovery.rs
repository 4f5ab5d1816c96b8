//! Error Recovery
//!
//! Builds the correction text fed back to the reasoning component after a
//! recoverable tool error.

use crate::agent::error_classifier::SqlErrorClass;
use crate::agent::tools::ToolName;
use crate::catalog::SchemaCatalog;
use std::sync::Arc;
use strsim::jaro_winkler;

const SUGGESTION_THRESHOLD: f64 = 0.75;

/// Error recovery prompt builder
pub struct ErrorRecovery {
    catalog: Arc<SchemaCatalog>,
}

impl ErrorRecovery {
    pub fn new(catalog: Arc<SchemaCatalog>) -> Self {
        Self { catalog }
    }

    /// Build a recovery message from an error classification
    pub fn build_recovery_prompt(&self, error_class: &SqlErrorClass, error_text: &str) -> String {
        let mut parts = Vec::new();
        parts.push(format!("Error: {}", error_text));

        match error_class {
            SqlErrorClass::ColumnNotFound(column) => {
                parts.push("A column referenced in your query does not exist.".to_string());
                if let Some(column) = column {
                    let suggestions = self.suggest_columns(column);
                    if !suggestions.is_empty() {
                        parts.push(format!("Did you mean: {}?", suggestions.join(", ")));
                    }
                }
                parts.push(format!(
                    "Valid columns of {}: {}",
                    self.catalog.table,
                    self.catalog
                        .column_names()
                        .iter()
                        .map(|c| quote_if_needed(c))
                        .collect::<Vec<_>>()
                        .join(", ")
                ));
            }
            SqlErrorClass::TableNotFound(_) => {
                parts.push(format!(
                    "A table referenced in your query does not exist. Call {} to see the available tables.",
                    ToolName::ListTables
                ));
            }
            SqlErrorClass::AmbiguousColumn => {
                parts.push("A column reference is ambiguous. Qualify it with its table name.".to_string());
            }
            SqlErrorClass::InvalidAggregation => {
                parts.push("An aggregate function is used incorrectly. Check GROUP BY and move aggregate conditions to HAVING.".to_string());
            }
            SqlErrorClass::Syntax(_) => {
                parts.push("The query is not valid SQLite. Fix the syntax.".to_string());
            }
            SqlErrorClass::Forbidden(_) => {
                parts.push("Only read-only SELECT queries are allowed. Do not retry a data-modifying statement. If the user asked to change or delete data, explain in your final answer that the operation is not permitted.".to_string());
                return parts.join("\n");
            }
            SqlErrorClass::Logical(_) | SqlErrorClass::Connectivity(_) | SqlErrorClass::Other(_) => {}
        }

        parts.push(format!(
            "Rewrite the query, check it with {}, then run it with {}. Do not repeat the failed query unchanged.",
            ToolName::ValidateQuery,
            ToolName::ExecuteQuery
        ));
        parts.join("\n")
    }

    /// Catalog columns that look like `column`, best match first.
    pub fn suggest_columns(&self, column: &str) -> Vec<String> {
        let needle = column.to_lowercase();
        let mut scored: Vec<(f64, &str)> = self
            .catalog
            .column_names()
            .into_iter()
            .map(|name| (jaro_winkler(&needle, &name.to_lowercase()), name))
            .filter(|(score, _)| *score >= SUGGESTION_THRESHOLD)
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(3)
            .map(|(_, name)| quote_if_needed(name))
            .collect()
    }
}

fn quote_if_needed(name: &str) -> String {
    if name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        name.to_string()
    } else {
        format!("\"{}\"", name)
    }
}
