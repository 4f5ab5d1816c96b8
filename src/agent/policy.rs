//! Loop policy
//!
//! Invariants enforced on every proposed tool call regardless of what the
//! reasoning component asks for: schema discovery before execution, row caps
//! and no verbatim retries of a failed query.

use crate::agent::tools::{ToolInvocation, ToolName};
use crate::storage::normalize_sql;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use tracing::warn;

const COUNT: &str = r"(\d+|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|thirteen|fourteen|fifteen|sixteen|seventeen|eighteen|nineteen|twenty)\b";

lazy_static! {
    static ref TOP_COUNT: Regex =
        Regex::new(&format!(r"(?i)\btop\s+(?:the\s+)?{}", COUNT)).unwrap();
    static ref NOUN_COUNT: Regex = Regex::new(&format!(
        r"(?i)\b{}\s+(?:[a-z0-9/-]+\s+)?(?:rows?|records?|results?|entries|examples|imsis?|subscribers?|users?|roamers?|devices?|operators?|networks?|countries|country)\b",
        COUNT
    ))
    .unwrap();
    static ref TIME_UNIT: Regex = Regex::new(
        r"(?i)^\s+(?:seconds?|minutes?|hours?|days?|weeks?|months?|quarters?|years?)\b"
    )
    .unwrap();
}

fn count_value(token: &str) -> Option<usize> {
    if let Ok(n) = token.parse::<usize>() {
        return Some(n);
    }
    let words = [
        "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten", "eleven",
        "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
        "nineteen", "twenty",
    ];
    let lower = token.to_ascii_lowercase();
    words.iter().position(|w| *w == lower).map(|i| i + 1)
}

/// Row count the question explicitly asks for ("top 10 ...", "20 rows",
/// "five operators"). Numbers followed by a time unit ("last 30 days") are
/// windows, not counts.
pub fn requested_row_count(question: &str) -> Option<usize> {
    [&*TOP_COUNT, &*NOUN_COUNT]
        .iter()
        .flat_map(|re| re.captures_iter(question))
        .filter_map(|caps| caps.get(1))
        .filter(|m| !TIME_UNIT.is_match(&question[m.end()..]))
        .filter_map(|m| count_value(m.as_str()))
        .find(|n| *n > 0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowCap {
    /// Used when a call carries no limit.
    pub default_limit: usize,
    /// Hard ceiling for any call.
    pub cap: usize,
}

impl RowCap {
    pub fn for_question(question: &str, top_k: usize, max_explicit_rows: usize) -> Self {
        let top_k = top_k.max(1);
        match requested_row_count(question) {
            Some(n) => {
                let n = n.clamp(1, max_explicit_rows.max(1));
                Self {
                    default_limit: n,
                    cap: n.max(top_k),
                }
            }
            None => Self {
                default_limit: top_k,
                cap: top_k,
            },
        }
    }

    /// Effective limit, plus the original request when it was clamped.
    pub fn apply(&self, requested: Option<usize>) -> (usize, Option<usize>) {
        match requested {
            None => (self.default_limit, None),
            Some(l) if l > self.cap => (self.cap, Some(l)),
            Some(l) => (l.max(1), None),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Proceed {
        row_limit: usize,
        clamped_from: Option<usize>,
    },
    /// Do not run the tool; the text goes back to the reasoning component.
    Refuse(String),
}

pub struct QueryPolicy {
    row_cap: RowCap,
    discovery_calls: usize,
    failed_queries: HashSet<String>,
}

impl QueryPolicy {
    pub fn new(question: &str, top_k: usize, max_explicit_rows: usize) -> Self {
        Self {
            row_cap: RowCap::for_question(question, top_k, max_explicit_rows),
            discovery_calls: 0,
            failed_queries: HashSet::new(),
        }
    }

    pub fn discovery_done(&self) -> bool {
        self.discovery_calls > 0
    }

    pub fn review(&self, invocation: &ToolInvocation) -> PolicyDecision {
        match invocation {
            ToolInvocation::ExecuteQuery { query, limit } => {
                if !self.discovery_done() {
                    warn!("Refusing execution before schema discovery");
                    return PolicyDecision::Refuse(format!(
                        "Schema discovery comes first. Call {} or {} to inspect the database before running {}.",
                        ToolName::ListTables,
                        ToolName::DescribeSchema,
                        ToolName::ExecuteQuery
                    ));
                }
                if self.failed_queries.contains(&query_key(query)) {
                    warn!("Refusing verbatim retry of a failed query");
                    return PolicyDecision::Refuse(
                        "This exact query already failed. Revise the query to fix the reported error, or explain the error in your final answer.".to_string(),
                    );
                }
                let (row_limit, clamped_from) = self.row_cap.apply(*limit);
                PolicyDecision::Proceed {
                    row_limit,
                    clamped_from,
                }
            }
            _ => PolicyDecision::Proceed {
                row_limit: self.row_cap.default_limit,
                clamped_from: None,
            },
        }
    }

    /// Record a dispatched call and whether it failed with a query error.
    pub fn record(&mut self, invocation: &ToolInvocation, query_failed: bool) {
        if invocation.tool().is_discovery() {
            self.discovery_calls += 1;
        }
        if query_failed {
            if let Some(query) = invocation.query() {
                self.failed_queries.insert(query_key(query));
            }
        }
    }
}

fn query_key(query: &str) -> String {
    normalize_sql(query).trim_end_matches(';').trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn execute(query: &str, limit: Option<usize>) -> ToolInvocation {
        ToolInvocation::ExecuteQuery {
            query: query.to_string(),
            limit,
        }
    }

    #[test]
    fn test_requested_row_count() {
        assert_eq!(requested_row_count("Show the top 10 operators by usage"), Some(10));
        assert_eq!(requested_row_count("List first three countries"), Some(3));
        assert_eq!(requested_row_count("Give me 25 rows of IOT usage"), Some(25));
        assert_eq!(requested_row_count("How much data was used in January 2025?"), None);
        assert_eq!(requested_row_count("How many IOT devices used 4G/5G networks?"), None);
        assert_eq!(requested_row_count("List the top 5 IMSIs with the highest uploads"), Some(5));
    }

    #[test]
    fn test_time_windows_are_not_row_counts() {
        assert_eq!(
            requested_row_count("Which country had the highest roaming usage in the last 30 days?"),
            None
        );
        assert_eq!(
            requested_row_count("Which subscribers roamed in the first 10 days of January?"),
            None
        );
        assert_eq!(requested_row_count("Show the top 3 days by inbound usage"), None);
        assert_eq!(
            requested_row_count("Top 10 subscribers over the last 7 days"),
            Some(10)
        );

        let cap = RowCap::for_question("Which operators saw roamers in the past 2 weeks?", 5, 1000);
        assert_eq!(cap.apply(None), (5, None));
        assert_eq!(cap.apply(Some(14)), (5, Some(14)));
    }

    #[test]
    fn test_row_cap_without_explicit_count() {
        let cap = RowCap::for_question("Which country used most data?", 5, 1000);
        assert_eq!(cap.apply(None), (5, None));
        assert_eq!(cap.apply(Some(3)), (3, None));
        assert_eq!(cap.apply(Some(500)), (5, Some(500)));
    }

    #[test]
    fn test_row_cap_with_explicit_count() {
        let cap = RowCap::for_question("top 20 subscribers by download", 5, 1000);
        assert_eq!(cap.apply(None), (20, None));
        assert_eq!(cap.apply(Some(50)), (20, Some(50)));

        let cap = RowCap::for_question("show 5000 rows", 5, 1000);
        assert_eq!(cap.cap, 1000);
    }

    #[test]
    fn test_execution_refused_before_discovery() {
        let mut policy = QueryPolicy::new("q", 5, 1000);
        assert!(matches!(
            policy.review(&execute("SELECT 1", None)),
            PolicyDecision::Refuse(_)
        ));
        policy.record(&ToolInvocation::ListTables, false);
        assert_eq!(
            policy.review(&execute("SELECT 1", None)),
            PolicyDecision::Proceed {
                row_limit: 5,
                clamped_from: None
            }
        );
    }

    #[test]
    fn test_failed_query_cannot_be_repeated_verbatim() {
        let mut policy = QueryPolicy::new("q", 5, 1000);
        policy.record(&ToolInvocation::ListTables, false);
        let bad = execute("SELECT msisdn FROM usage_logs;", None);
        policy.record(&bad, true);

        let same = execute("select  MSISDN from usage_logs", None);
        assert!(matches!(policy.review(&same), PolicyDecision::Refuse(_)));

        let revised = execute("SELECT imsi FROM usage_logs", None);
        assert!(matches!(policy.review(&revised), PolicyDecision::Proceed { .. }));
    }
}
