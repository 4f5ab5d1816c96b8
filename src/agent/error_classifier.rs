//! Error Classifier
//!
//! Classifies tool errors into a taxonomy for recovery.

use crate::error::{ExecutionErrorKind, RoamingError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// SQL error classification taxonomy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlErrorClass {
    ColumnNotFound(Option<String>),
    TableNotFound(Option<String>),
    AmbiguousColumn,
    InvalidAggregation,
    Syntax(String),
    Forbidden(String),
    Logical(String),
    Connectivity(String),
    Other(String),
}

impl SqlErrorClass {
    /// Whether the loop may keep going after this error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SqlErrorClass::Connectivity(_) | SqlErrorClass::Other(_))
    }
}

impl fmt::Display for SqlErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlErrorClass::ColumnNotFound(_) => write!(f, "ColumnNotFound"),
            SqlErrorClass::TableNotFound(_) => write!(f, "TableNotFound"),
            SqlErrorClass::AmbiguousColumn => write!(f, "AmbiguousColumn"),
            SqlErrorClass::InvalidAggregation => write!(f, "InvalidAggregation"),
            SqlErrorClass::Syntax(msg) => write!(f, "Syntax({})", msg),
            SqlErrorClass::Forbidden(msg) => write!(f, "Forbidden({})", msg),
            SqlErrorClass::Logical(msg) => write!(f, "Logical({})", msg),
            SqlErrorClass::Connectivity(msg) => write!(f, "Connectivity({})", msg),
            SqlErrorClass::Other(msg) => write!(f, "Other({})", msg),
        }
    }
}

/// Error classifier
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify an error into the taxonomy
    pub fn classify(&self, error: &RoamingError) -> SqlErrorClass {
        let detail = match error {
            RoamingError::ForbiddenStatement(msg) => return SqlErrorClass::Forbidden(msg.clone()),
            RoamingError::Execution {
                kind: ExecutionErrorKind::Connectivity,
                detail,
            } => return SqlErrorClass::Connectivity(detail.clone()),
            RoamingError::Syntax(detail)
            | RoamingError::Execution {
                kind: ExecutionErrorKind::Logical,
                detail,
            } => detail.clone(),
            other => return SqlErrorClass::Other(other.to_string()),
        };
        let error_msg = detail.to_lowercase();

        if let Some(column) = name_after(&detail, "no such column:") {
            return SqlErrorClass::ColumnNotFound(Some(column));
        }
        if error_msg.contains("column") && (error_msg.contains("not found") || error_msg.contains("does not exist")) {
            return SqlErrorClass::ColumnNotFound(None);
        }

        if let Some(table) = name_after(&detail, "no such table:") {
            return SqlErrorClass::TableNotFound(Some(table));
        }
        if error_msg.contains("table") && (error_msg.contains("not found") || error_msg.contains("does not exist")) {
            return SqlErrorClass::TableNotFound(None);
        }

        if error_msg.contains("ambiguous column") {
            return SqlErrorClass::AmbiguousColumn;
        }

        if error_msg.contains("misuse of aggregate") || error_msg.contains("aggregate functions are not allowed") {
            return SqlErrorClass::InvalidAggregation;
        }

        match error {
            RoamingError::Syntax(_) => SqlErrorClass::Syntax(detail),
            _ => SqlErrorClass::Logical(detail),
        }
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Identifier following `marker` in a SQLite message, e.g. `no such column: foo`.
fn name_after(detail: &str, marker: &str) -> Option<String> {
    let lower = detail.to_lowercase();
    let start = lower.find(marker)? + marker.len();
    let rest = detail.get(start..)?.trim_start();
    let name: String = rest
        .chars()
        .take_while(|c| !c.is_whitespace() && *c != ',' && *c != ')')
        .collect();
    let name = name.trim_matches(|c| c == '"' || c == '\'' || c == '`');
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}
