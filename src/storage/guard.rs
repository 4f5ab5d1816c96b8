//! Read-only statement guard
//!
//! Rejects any statement containing a data-modifying keyword before it
//! reaches the engine. The text is scanned with comments stripped, with
//! comments removed without a gap, and as-is (case folded, whitespace
//! collapsed), since a comment marker inside a string literal would
//! otherwise hide the rest of the statement.

use crate::error::{Result, RoamingError};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref BLOCK_COMMENT: Regex = Regex::new(r"(?s)/\*.*?(\*/|$)").unwrap();
    static ref LINE_COMMENT: Regex = Regex::new(r"--[^\n]*").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref FORBIDDEN: Regex = Regex::new(
        r"\b(insert|update|delete|drop|alter|create|truncate|attach|detach|pragma|vacuum|reindex|replace\s+into)\b"
    )
    .unwrap();
}

/// Case-folded, comment-free, whitespace-collapsed form of `sql`.
pub fn normalize_sql(sql: &str) -> String {
    let without_blocks = BLOCK_COMMENT.replace_all(sql, " ");
    let without_lines = LINE_COMMENT.replace_all(&without_blocks, " ");
    let folded = without_lines.to_lowercase();
    WHITESPACE.replace_all(folded.trim(), " ").into_owned()
}

/// Same as [`normalize_sql`] but comments are removed without leaving a gap,
/// so keywords split by an inline comment are joined back together.
fn compact_sql(sql: &str) -> String {
    let without_blocks = BLOCK_COMMENT.replace_all(sql, "");
    let without_lines = LINE_COMMENT.replace_all(&without_blocks, "");
    let folded = without_lines.to_lowercase();
    WHITESPACE.replace_all(folded.trim(), " ").into_owned()
}

fn folded_sql(sql: &str) -> String {
    WHITESPACE.replace_all(sql.to_lowercase().trim(), " ").into_owned()
}

/// First data-modifying keyword found in `sql`, upper-cased.
pub fn forbidden_keyword(sql: &str) -> Option<String> {
    for text in [normalize_sql(sql), compact_sql(sql), folded_sql(sql)] {
        if let Some(m) = FORBIDDEN.find(&text) {
            let keyword = WHITESPACE.replace_all(m.as_str(), " ").to_uppercase();
            return Some(keyword);
        }
    }
    None
}

pub fn check_read_only(sql: &str) -> Result<()> {
    match forbidden_keyword(sql) {
        Some(keyword) => Err(RoamingError::ForbiddenStatement(format!(
            "{} statements are not permitted; only read-only SELECT queries may run",
            keyword
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_and_folds() {
        assert_eq!(
            normalize_sql("SELECT  vmcc\n\tFROM   usage_logs -- trailing\n"),
            "select vmcc from usage_logs"
        );
        assert_eq!(normalize_sql("select /* hint */ 1"), "select 1");
    }

    #[test]
    fn test_plain_select_is_allowed() {
        assert!(check_read_only("SELECT vmcc, SUM(data_inbound_uploaded_bytes) FROM usage_logs GROUP BY vmcc").is_ok());
        assert!(check_read_only("WITH t AS (SELECT imsi FROM usage_logs) SELECT COUNT(*) FROM t").is_ok());
    }

    #[test]
    fn test_identifiers_containing_keywords_are_allowed() {
        assert!(check_read_only("SELECT updated_at, is_deleted, created_by FROM usage_logs").is_ok());
        assert!(check_read_only("SELECT data_inbound_uploaded_bytes FROM usage_logs").is_ok());
        assert!(check_read_only("SELECT replace(imsi, '0', '') FROM usage_logs").is_ok());
    }

    #[test]
    fn test_disguised_delete_is_rejected() {
        assert_eq!(
            forbidden_keyword("DeLeTe /**/ from usage_logs").as_deref(),
            Some("DELETE")
        );
        assert_eq!(
            forbidden_keyword("DEL/* split */ETE FROM usage_logs").as_deref(),
            Some("DELETE")
        );
        assert_eq!(
            forbidden_keyword("select 1;\n  drop\ttable usage_logs").as_deref(),
            Some("DROP")
        );
        assert_eq!(
            forbidden_keyword("REPLACE\n INTO usage_logs VALUES (1)").as_deref(),
            Some("REPLACE INTO")
        );
    }

    #[test]
    fn test_comment_markers_inside_literals_do_not_hide_writes() {
        assert_eq!(
            forbidden_keyword("SELECT '--'; DELETE FROM usage_logs").as_deref(),
            Some("DELETE")
        );
        assert_eq!(
            forbidden_keyword("SELECT '/*'; DROP TABLE usage_logs; SELECT '*/'").as_deref(),
            Some("DROP")
        );
        assert!(matches!(
            check_read_only("SELECT '--' AS x;\nupdate usage_logs SET vmcc = '1'"),
            Err(RoamingError::ForbiddenStatement(_))
        ));
    }

    #[test]
    fn test_forbidden_error_is_typed() {
        let err = check_read_only("UPDATE usage_logs SET vmcc = '1'").unwrap_err();
        assert!(matches!(err, RoamingError::ForbiddenStatement(ref m) if m.starts_with("UPDATE")));
    }
}
