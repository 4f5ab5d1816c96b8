//! Tool definitions
//!
//! The fixed tool set exposed to the reasoning component, the JSON schemas
//! advertised for them, and parsing of raw invocations into typed calls.

use crate::agent::transcript::TurnKind;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolName {
    #[serde(rename = "sql_db_list_tables")]
    ListTables,
    #[serde(rename = "sql_db_schema")]
    DescribeSchema,
    #[serde(rename = "sql_db_query_checker")]
    ValidateQuery,
    #[serde(rename = "sql_db_query")]
    ExecuteQuery,
}

impl ToolName {
    pub const ALL: [ToolName; 4] = [
        ToolName::ListTables,
        ToolName::DescribeSchema,
        ToolName::ValidateQuery,
        ToolName::ExecuteQuery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::ListTables => "sql_db_list_tables",
            ToolName::DescribeSchema => "sql_db_schema",
            ToolName::ValidateQuery => "sql_db_query_checker",
            ToolName::ExecuteQuery => "sql_db_query",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL.iter().copied().find(|t| t.as_str() == name)
    }

    pub fn turn_kind(&self) -> TurnKind {
        match self {
            ToolName::ListTables => TurnKind::ToolListRequest,
            ToolName::DescribeSchema => TurnKind::ToolSchemaRequest,
            ToolName::ValidateQuery => TurnKind::ToolQueryValidate,
            ToolName::ExecuteQuery => TurnKind::ToolQueryExecute,
        }
    }

    /// Counts toward the schema-discovery requirement.
    pub fn is_discovery(&self) -> bool {
        matches!(self, ToolName::ListTables | ToolName::DescribeSchema)
    }

    pub fn spec(&self) -> ToolSpec {
        match self {
            ToolName::ListTables => ToolSpec {
                name: self.as_str().to_string(),
                description: "Input is an empty string, output is a comma-separated list of tables in the database.".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {},
                }),
            },
            ToolName::DescribeSchema => ToolSpec {
                name: self.as_str().to_string(),
                description: format!(
                    "Input to this tool is a comma-separated list of tables, output is the schema and sample rows for those tables. Be sure that the tables actually exist by calling {} first!",
                    ToolName::ListTables.as_str()
                ),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "table_names": {
                            "type": "string",
                            "description": "Comma-separated table names, e.g. 'usage_logs'"
                        }
                    },
                    "required": ["table_names"],
                }),
            },
            ToolName::ValidateQuery => ToolSpec {
                name: self.as_str().to_string(),
                description: format!(
                    "Use this tool to double check if your query is correct before executing it. Always use this tool before executing a query with {}!",
                    ToolName::ExecuteQuery.as_str()
                ),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "A single read-only SQL query"
                        }
                    },
                    "required": ["query"],
                }),
            },
            ToolName::ExecuteQuery => ToolSpec {
                name: self.as_str().to_string(),
                description: format!(
                    "Input to this tool is a detailed and correct SQL query, output is a result from the database. If the query is not correct, an error message will be returned. If an error is returned, rewrite the query, check it with {}, and try again.",
                    ToolName::ValidateQuery.as_str()
                ),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "A single read-only SQL query"
                        },
                        "limit": {
                            "type": "integer",
                            "minimum": 1,
                            "description": "Maximum number of rows to return"
                        }
                    },
                    "required": ["query"],
                }),
            },
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Function definition advertised to the reasoning component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

pub fn tool_specs() -> Vec<ToolSpec> {
    ToolName::ALL.iter().map(|t| t.spec()).collect()
}

/// A tool call the loop could not accept. Always recoverable: the error is
/// fed back to the reasoning component.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvocationError {
    #[error("Unknown tool '{0}'. Available tools: sql_db_list_tables, sql_db_schema, sql_db_query_checker, sql_db_query")]
    UnknownTool(String),

    #[error("Malformed arguments for {tool}: {detail}")]
    MalformedArguments { tool: ToolName, detail: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolInvocation {
    ListTables,
    DescribeSchema { tables: Vec<String> },
    ValidateQuery { query: String },
    ExecuteQuery { query: String, limit: Option<usize> },
}

impl ToolInvocation {
    /// Parse a raw call (tool name plus JSON-encoded arguments).
    pub fn parse(name: &str, arguments: &str) -> Result<Self, InvocationError> {
        let tool = ToolName::parse(name).ok_or_else(|| InvocationError::UnknownTool(name.to_string()))?;
        let malformed = |detail: String| InvocationError::MalformedArguments { tool, detail };

        let args: Value = if arguments.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(arguments).map_err(|e| malformed(format!("invalid JSON: {}", e)))?
        };
        if !args.is_object() {
            return Err(malformed("arguments must be a JSON object".to_string()));
        }

        match tool {
            ToolName::ListTables => Ok(ToolInvocation::ListTables),
            ToolName::DescribeSchema => {
                let tables = match args.get("table_names").or_else(|| args.get("tables")) {
                    Some(Value::String(s)) => s
                        .split(',')
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty())
                        .collect::<Vec<_>>(),
                    Some(Value::Array(items)) => items
                        .iter()
                        .filter_map(|v| v.as_str())
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty())
                        .collect(),
                    _ => Vec::new(),
                };
                if tables.is_empty() {
                    return Err(malformed("'table_names' must name at least one table".to_string()));
                }
                Ok(ToolInvocation::DescribeSchema { tables })
            }
            ToolName::ValidateQuery => Ok(ToolInvocation::ValidateQuery {
                query: query_arg(&args).map_err(malformed)?,
            }),
            ToolName::ExecuteQuery => {
                let query = query_arg(&args).map_err(malformed)?;
                let limit = match args.get("limit") {
                    None | Some(Value::Null) => None,
                    Some(Value::Number(n)) => match n.as_u64() {
                        Some(l) if l > 0 => Some(l as usize),
                        _ => return Err(malformed(format!("'limit' must be a positive integer, got {}", n))),
                    },
                    Some(Value::String(s)) => match s.trim().parse::<usize>() {
                        Ok(l) if l > 0 => Some(l),
                        _ => return Err(malformed(format!("'limit' must be a positive integer, got '{}'", s))),
                    },
                    Some(other) => {
                        return Err(malformed(format!("'limit' must be a positive integer, got {}", other)))
                    }
                };
                Ok(ToolInvocation::ExecuteQuery { query, limit })
            }
        }
    }

    pub fn tool(&self) -> ToolName {
        match self {
            ToolInvocation::ListTables => ToolName::ListTables,
            ToolInvocation::DescribeSchema { .. } => ToolName::DescribeSchema,
            ToolInvocation::ValidateQuery { .. } => ToolName::ValidateQuery,
            ToolInvocation::ExecuteQuery { .. } => ToolName::ExecuteQuery,
        }
    }

    pub fn query(&self) -> Option<&str> {
        match self {
            ToolInvocation::ValidateQuery { query } | ToolInvocation::ExecuteQuery { query, .. } => {
                Some(query)
            }
            _ => None,
        }
    }
}

fn query_arg(args: &Value) -> Result<String, String> {
    match args.get("query").and_then(|v| v.as_str()) {
        Some(q) if !q.trim().is_empty() => Ok(q.trim().to_string()),
        Some(_) => Err("'query' must not be empty".to_string()),
        None => Err("missing string argument 'query'".to_string()),
    }
}
