mod support;

use roaming_insights::agent::contracts::TraceEventType;
use roaming_insights::agent::reasoner::ReasonerStep;
use roaming_insights::agent::transcript::{Transcript, TurnKind};
use roaming_insights::agent::AnswerService;
use roaming_insights::catalog::{SchemaCatalog, USAGE_TABLE};
use roaming_insights::exemplars::default_exemplars;
use roaming_insights::storage::ingest::replace_records;
use roaming_insights::RoamingError;
use rusqlite::Connection;
use serde_json::json;
use std::sync::Arc;
use support::*;

const HIGHEST_INBOUND_SQL: &str = "SELECT vmcc, SUM(data_inbound_uploaded_bytes + data_inbound_downloaded_bytes) AS total_inbound \
     FROM usage_logs GROUP BY vmcc ORDER BY total_inbound DESC LIMIT 1";

fn highest_inbound_answer(t: &Transcript) -> String {
    let (_, content, _) = t.last_tool_result().expect("query result in transcript");
    let row = content.lines().nth(1).unwrap_or_default();
    let cells: Vec<&str> = row.split('\t').collect();
    format!(
        "Visited country code {} had the highest inbound usage with {} bytes.\nInsight: Prioritise capacity with this partner.",
        cells[0], cells[1]
    )
}

#[tokio::test]
async fn test_highest_inbound_country_cites_vmcc_202() {
    let reasoner = Arc::new(ScriptedReasoner::new(vec![
        list_tables(),
        describe("usage_logs"),
        check(HIGHEST_INBOUND_SQL),
        execute(HIGHEST_INBOUND_SQL),
        answer_with(highest_inbound_answer),
    ]));
    let backend = Arc::new(fixture_store(&inbound_fixture()));
    let agent = agent(reasoner, backend, settings(10));

    let result = agent
        .answer("Which visited country code had the highest inbound data usage?")
        .await
        .unwrap();

    assert!(result.answer.contains("202"));
    assert!(result.answer.contains("1000"));
    assert!(!result.answer.contains("204"));
    assert_eq!(result.insight.as_deref(), Some("Prioritise capacity with this partner."));
    assert_eq!(result.sql.as_deref(), Some(HIGHEST_INBOUND_SQL));
    assert_eq!(result.steps, 5);
}

#[tokio::test]
async fn test_nonexistent_column_is_revised_before_budget_runs_out() {
    let revised = "SELECT imsi FROM usage_logs LIMIT 1";
    let reasoner = Arc::new(ScriptedReasoner::new(vec![
        list_tables(),
        execute("SELECT msisdn FROM usage_logs LIMIT 1"),
        answer_with(|t| {
            let (_, content, is_error) = t.last_tool_result().unwrap();
            assert!(is_error);
            assert!(content.contains("no such column"));
            String::new()
        }),
        execute(revised),
        answer("Found a subscriber."),
    ]));
    let backend = Arc::new(fixture_store(&inbound_fixture()));
    let agent = agent(reasoner, backend, settings(6));

    let result = agent.answer("Show one subscriber").await.unwrap();

    assert_eq!(result.sql.as_deref(), Some(revised));
    let error_event = result
        .trace
        .iter()
        .find(|e| e.event_type == TraceEventType::Error)
        .expect("logical error recorded");
    assert!(error_event.payload["class"]
        .as_str()
        .unwrap()
        .starts_with("ColumnNotFound"));
}

#[tokio::test]
async fn test_delete_request_never_reaches_the_store() {
    let reasoner = Arc::new(ScriptedReasoner::new(vec![
        list_tables(),
        execute("DELETE FROM usage_logs WHERE extract_date < '2024-01-01'"),
        answer_with(|t| {
            let (_, content, is_error) = t.last_tool_result().unwrap();
            if is_error && content.contains("not permitted") {
                "Deleting records is not permitted; this assistant can only read data.".to_string()
            } else {
                "Records deleted.".to_string()
            }
        }),
    ]));
    let store = fixture_store(&inbound_fixture());
    let backend = Arc::new(RecordingBackend::new(store));
    let agent = agent(reasoner, backend.clone(), settings(10));

    let result = agent
        .answer("delete all records older than 2024")
        .await
        .unwrap();

    assert!(backend.executed().is_empty());
    assert!(result.text.contains("not permitted"));
    assert!(result.sql.is_none());
    let rows = backend_row_count(&backend);
    assert_eq!(rows, 2);
}

fn backend_row_count(backend: &RecordingBackend) -> i64 {
    use roaming_insights::storage::SqlBackend;
    let rows = backend
        .execute_query("SELECT COUNT(*) FROM usage_logs", 1)
        .unwrap();
    rows.rows[0][0].as_i64().unwrap()
}

#[tokio::test]
async fn test_execution_before_discovery_is_refused() {
    let reasoner = Arc::new(ScriptedReasoner::new(vec![
        execute("SELECT COUNT(*) FROM usage_logs"),
        list_tables(),
        execute("SELECT COUNT(*) FROM usage_logs"),
        answer("There are 2 records."),
    ]));
    let backend = Arc::new(RecordingBackend::new(fixture_store(&inbound_fixture())));
    let agent = agent(reasoner, backend.clone(), settings(10));

    let result = agent.answer("How many records are there?").await.unwrap();

    assert_eq!(backend.executed().len(), 1);
    assert_eq!(result.trace.iter().filter(|e| e.event_type == TraceEventType::PolicyRefusal).count(), 1);
    assert_eq!(result.sql.as_deref(), Some("SELECT COUNT(*) FROM usage_logs"));
}

#[tokio::test]
async fn test_row_limit_never_exceeds_top_k() {
    let reasoner = Arc::new(ScriptedReasoner::new(vec![
        list_tables(),
        execute_with_limit("SELECT imsi FROM usage_logs", 500),
        execute("SELECT vmcc FROM usage_logs"),
        answer_with(|t| {
            let (_, content, _) = t.last_tool_result().unwrap();
            format!("Done.\n{}", content)
        }),
    ]));
    let records: Vec<_> = (0..12)
        .map(|i| record(&format!("3101500000000{:02}", i), "202", i, i))
        .collect();
    let backend = Arc::new(RecordingBackend::new(fixture_store(&records)));
    let agent = agent(reasoner, backend.clone(), settings(10));

    agent.answer("Which subscribers roamed in Germany?").await.unwrap();

    let executed = backend.executed();
    assert_eq!(executed.len(), 2);
    assert!(executed.iter().all(|(_, limit)| *limit <= 5));
}

#[tokio::test]
async fn test_time_window_in_question_keeps_top_k_cap() {
    let reasoner = Arc::new(ScriptedReasoner::new(vec![
        list_tables(),
        execute("SELECT imsi FROM usage_logs"),
        execute_with_limit("SELECT vmcc FROM usage_logs", 30),
        answer("Listed."),
    ]));
    let backend = Arc::new(RecordingBackend::new(fixture_store(&inbound_fixture())));
    let agent = agent(reasoner, backend.clone(), settings(10));

    agent
        .answer("Which subscribers roamed in the first 10 days of January?")
        .await
        .unwrap();

    let executed = backend.executed();
    assert_eq!(executed.len(), 2);
    assert!(executed.iter().all(|(_, limit)| *limit == 5), "{:?}", executed);
}

#[tokio::test]
async fn test_explicit_count_in_question_raises_the_cap() {
    let reasoner = Arc::new(ScriptedReasoner::new(vec![
        list_tables(),
        execute_with_limit("SELECT imsi FROM usage_logs", 50),
        answer("Listed."),
    ]));
    let backend = Arc::new(RecordingBackend::new(fixture_store(&inbound_fixture())));
    let agent = agent(reasoner, backend.clone(), settings(10));

    agent.answer("List the top 20 IMSIs by inbound usage").await.unwrap();

    assert_eq!(backend.executed()[0].1, 20);
}

#[tokio::test]
async fn test_clamped_limit_is_reported_to_the_reasoner() {
    let reasoner = Arc::new(ScriptedReasoner::new(vec![
        list_tables(),
        execute_with_limit("SELECT imsi FROM usage_logs", 100),
        answer_with(|t| t.last_tool_result().unwrap().1.to_string()),
    ]));
    let backend = Arc::new(fixture_store(&inbound_fixture()));
    let agent = agent(reasoner, backend, settings(10));

    let result = agent.answer("Which subscribers roamed?").await.unwrap();
    assert!(result.text.starts_with("Note: the requested limit of 100 rows exceeds the row cap"));
}

#[tokio::test]
async fn test_budget_exhaustion_returns_partial_transcript() {
    let reasoner = Arc::new(ScriptedReasoner::new(vec![list_tables()]));
    let backend = Arc::new(fixture_store(&inbound_fixture()));
    let agent = agent(reasoner.clone(), backend, settings(3));

    let err = agent.answer("Which country?").await.unwrap_err();

    match err {
        RoamingError::AgentExhausted { steps, transcript } => {
            assert_eq!(steps, 3);
            assert_eq!(transcript.len(), 3);
            assert!(transcript.iter().all(|t| t.kind == TurnKind::ToolListRequest));
        }
        other => panic!("expected AgentExhausted, got {:?}", other),
    }
    assert_eq!(reasoner.calls(), 3);
}

#[tokio::test]
async fn test_connectivity_fault_is_agent_failure() {
    let reasoner = Arc::new(ScriptedReasoner::new(vec![
        list_tables(),
        execute("SELECT COUNT(*) FROM usage_logs"),
        answer("unreachable"),
    ]));
    let backend = Arc::new(RecordingBackend::disconnected(fixture_store(&inbound_fixture())));
    let agent = agent(reasoner, backend, settings(10));

    let err = agent.answer("How many records?").await.unwrap_err();

    match err {
        RoamingError::AgentFailure { last_tool, detail } => {
            assert_eq!(last_tool.as_deref(), Some("sql_db_query"));
            assert!(detail.contains("disk I/O error"));
        }
        other => panic!("expected AgentFailure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_failed_validation_is_revised_not_aborted() {
    let bad = "SELECT msisdn FROM usage_logs LIMIT 1";
    let revised = "SELECT imsi FROM usage_logs LIMIT 1";
    let retry_unchanged: Script = Box::new(move |t: &Transcript| {
        let (name, content, is_error) = t.last_tool_result().unwrap();
        assert_eq!(name, "sql_db_query_checker");
        assert!(is_error);
        assert!(content.contains("no such column"));
        assert!(content.contains("msisdn"));
        Ok(ReasonerStep::ToolCall {
            id: None,
            name: "sql_db_query".to_string(),
            arguments: json!({ "query": bad }).to_string(),
        })
    });
    let reasoner = Arc::new(ScriptedReasoner::new(vec![
        list_tables(),
        check(bad),
        retry_unchanged,
        answer_with(|t| {
            let (_, content, is_error) = t.last_tool_result().unwrap();
            assert!(is_error);
            assert!(content.contains("already failed"));
            String::new()
        }),
        check(revised),
        execute(revised),
        answer("Subscriber 310150000000001 roamed."),
    ]));
    let backend = Arc::new(RecordingBackend::new(fixture_store(&inbound_fixture())));
    let agent = agent(reasoner.clone(), backend.clone(), settings(10));

    let result = agent.answer("Show a subscriber's msisdn").await.unwrap();

    assert_eq!(result.sql.as_deref(), Some(revised));
    assert_eq!(
        *backend.validated.lock().unwrap(),
        vec![bad.to_string(), revised.to_string()]
    );
    assert_eq!(backend.executed(), vec![(revised.to_string(), 5)]);
    assert_eq!(reasoner.calls(), 7);
}

#[tokio::test]
async fn test_failed_query_is_not_retried_verbatim() {
    let bad = "SELECT msisdn FROM usage_logs";
    let reasoner = Arc::new(ScriptedReasoner::new(vec![
        list_tables(),
        execute(bad),
        execute(bad),
        answer_with(|t| {
            let (_, content, is_error) = t.last_tool_result().unwrap();
            assert!(is_error);
            assert!(content.contains("already failed"));
            "The msisdn column does not exist.".to_string()
        }),
    ]));
    let backend = Arc::new(RecordingBackend::new(fixture_store(&inbound_fixture())));
    let agent = agent(reasoner, backend.clone(), settings(10));

    let result = agent.answer("Show msisdn values").await.unwrap();

    assert_eq!(backend.executed().len(), 1);
    assert!(result.text.contains("does not exist"));
}

#[tokio::test]
async fn test_unknown_tool_and_bad_arguments_are_recoverable() {
    let reasoner = Arc::new(ScriptedReasoner::new(vec![
        call("sql_db_drop", json!({})),
        call("sql_db_query", json!({ "sql": "SELECT 1" })),
        list_tables(),
        answer("usage_logs is the only table."),
    ]));
    let backend = Arc::new(fixture_store(&inbound_fixture()));
    let agent = agent(reasoner, backend, settings(10));

    let result = agent.answer("What tables exist?").await.unwrap();

    assert_eq!(result.steps, 4);
    assert_eq!(result.trace.iter().filter(|e| e.event_type == TraceEventType::Error).count(), 2);
}

#[tokio::test]
async fn test_reasoner_failure_is_agent_failure() {
    let reasoner = Arc::new(ScriptedReasoner::new(vec![list_tables(), fail("quota exceeded")]));
    let backend = Arc::new(fixture_store(&inbound_fixture()));
    let agent = agent(reasoner, backend, settings(10));

    match agent.answer("Which country?").await.unwrap_err() {
        RoamingError::AgentFailure { last_tool, detail } => {
            assert_eq!(last_tool.as_deref(), Some("sql_db_list_tables"));
            assert!(detail.contains("quota exceeded"));
        }
        other => panic!("expected AgentFailure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_final_answer_triggers_notice() {
    let reasoner = Arc::new(ScriptedReasoner::new(vec![
        answer("   "),
        answer_with(|t| {
            assert!(t.pending_notice().is_some());
            "Answer after notice".to_string()
        }),
    ]));
    let backend = Arc::new(fixture_store(&inbound_fixture()));
    let agent = agent(reasoner, backend, settings(5));

    let result = agent.answer("Anything?").await.unwrap();
    assert_eq!(result.text, "Answer after notice");
    assert_eq!(result.steps, 2);
}

#[tokio::test]
async fn test_blank_question_is_rejected() {
    let reasoner = Arc::new(ScriptedReasoner::new(vec![answer("never")]));
    let backend = Arc::new(fixture_store(&inbound_fixture()));
    let agent = agent(reasoner.clone(), backend, settings(5));

    assert!(matches!(
        agent.answer("  ").await,
        Err(RoamingError::InvalidQuestion(_))
    ));
    assert_eq!(reasoner.calls(), 0);
}

#[tokio::test]
async fn test_service_opens_a_store_per_question() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("telecom_data.db");
    {
        let mut conn = Connection::open(&db_path)?;
        replace_records(&mut conn, USAGE_TABLE, &inbound_fixture())?;
    }

    let list_with_composed_instructions: Script = Box::new(|t: &Transcript| {
        assert!(t.instructions().contains("at most 5 results"));
        Ok(ReasonerStep::ToolCall {
            id: None,
            name: "sql_db_list_tables".to_string(),
            arguments: "{}".to_string(),
        })
    });
    let reasoner = Arc::new(ScriptedReasoner::new(vec![
        list_with_composed_instructions,
        execute(HIGHEST_INBOUND_SQL),
        answer_with(highest_inbound_answer),
    ]));
    let service = AnswerService::new(
        reasoner,
        SchemaCatalog::roaming(),
        &default_exemplars(),
        &db_path,
        settings(10),
    );

    let result = service
        .answer("Which visited country code had the highest inbound data usage?")
        .await?;
    assert!(result.answer.contains("202"));

    let missing = AnswerService::new(
        Arc::new(ScriptedReasoner::new(vec![answer("x")])),
        SchemaCatalog::roaming(),
        &[],
        dir.path().join("missing.db"),
        settings(10),
    );
    assert!(matches!(
        missing.answer("Which country?").await,
        Err(RoamingError::Database(_))
    ));
    Ok(())
}
