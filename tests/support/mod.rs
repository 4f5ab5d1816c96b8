#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use roaming_insights::agent::reasoner::{Reasoner, ReasonerStep};
use roaming_insights::agent::tools::ToolSpec;
use roaming_insights::agent::transcript::Transcript;
use roaming_insights::agent::QueryAgent;
use roaming_insights::catalog::{SchemaCatalog, USAGE_TABLE};
use roaming_insights::config::LoopSettings;
use roaming_insights::error::{Result, RoamingError};
use roaming_insights::exemplars::default_exemplars;
use roaming_insights::prompt::{compose_instructions, SQLITE_DIALECT};
use roaming_insights::storage::ingest::replace_records;
use roaming_insights::storage::{DeviceType, QueryRows, SqlBackend, TableDescription, UsageRecord, UsageStore};
use rusqlite::Connection;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// One usage row with the fields the tests care about.
pub fn record(imsi: &str, vmcc: &str, inbound_up: u64, inbound_down: u64) -> UsageRecord {
    UsageRecord {
        imsi: imsi.to_string(),
        imsitac: "35693803".to_string(),
        vmcc: vmcc.to_string(),
        vmnc: "1".to_string(),
        hmcc: "302".to_string(),
        hmnc: "5".to_string(),
        inbound_uploaded_bytes: inbound_up,
        inbound_downloaded_bytes: inbound_down,
        outbound_uploaded_bytes: 0,
        outbound_downloaded_bytes: 0,
        uses_2g_3g: false,
        uses_4g_5g: true,
        device_type: DeviceType::Iot,
        extract_date: NaiveDate::from_ymd_opt(2025, 1, 14).unwrap(),
    }
}

pub fn fixture_connection(records: &[UsageRecord]) -> Connection {
    let mut conn = Connection::open_in_memory().unwrap();
    replace_records(&mut conn, USAGE_TABLE, records).unwrap();
    conn
}

pub fn fixture_store(records: &[UsageRecord]) -> UsageStore {
    UsageStore::from_connection(fixture_connection(records))
}

/// vmcc 202 totals 1000 inbound bytes, vmcc 204 totals 100.
pub fn inbound_fixture() -> Vec<UsageRecord> {
    vec![
        record("310150000000001", "202", 100, 900),
        record("310150000000002", "204", 50, 50),
    ]
}

/// Backend wrapper that records what reaches the store.
pub struct RecordingBackend {
    inner: UsageStore,
    pub executed: Mutex<Vec<(String, usize)>>,
    pub validated: Mutex<Vec<String>>,
    connectivity_down: bool,
}

impl RecordingBackend {
    pub fn new(inner: UsageStore) -> Self {
        Self {
            inner,
            executed: Mutex::new(Vec::new()),
            validated: Mutex::new(Vec::new()),
            connectivity_down: false,
        }
    }

    /// Every query execution fails as if the store went away.
    pub fn disconnected(inner: UsageStore) -> Self {
        Self {
            connectivity_down: true,
            ..Self::new(inner)
        }
    }

    pub fn executed(&self) -> Vec<(String, usize)> {
        self.executed.lock().unwrap().clone()
    }
}

impl SqlBackend for RecordingBackend {
    fn list_tables(&self) -> Result<Vec<String>> {
        self.inner.list_tables()
    }

    fn describe_schema(&self, tables: &[String]) -> Result<Vec<TableDescription>> {
        self.inner.describe_schema(tables)
    }

    fn validate_query(&self, sql: &str) -> Result<()> {
        self.validated.lock().unwrap().push(sql.to_string());
        self.inner.validate_query(sql)
    }

    fn execute_query(&self, sql: &str, row_limit: usize) -> Result<QueryRows> {
        self.executed.lock().unwrap().push((sql.to_string(), row_limit));
        if self.connectivity_down {
            return Err(RoamingError::connectivity("disk I/O error"));
        }
        self.inner.execute_query(sql, row_limit)
    }
}

pub type Script = Box<dyn Fn(&Transcript) -> Result<ReasonerStep> + Send + Sync>;

/// Reasoner that plays back a fixed script; the last entry repeats once the
/// script runs out.
pub struct ScriptedReasoner {
    steps: Vec<Script>,
    cursor: AtomicUsize,
}

impl ScriptedReasoner {
    pub fn new(steps: Vec<Script>) -> Self {
        assert!(!steps.is_empty(), "script must have at least one step");
        Self {
            steps,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    async fn next_step(&self, transcript: &Transcript, _tools: &[ToolSpec]) -> Result<ReasonerStep> {
        let idx = self.cursor.fetch_add(1, Ordering::SeqCst).min(self.steps.len() - 1);
        (self.steps[idx])(transcript)
    }
}

pub fn call(name: &str, args: Value) -> Script {
    let name = name.to_string();
    let arguments = args.to_string();
    Box::new(move |_| {
        Ok(ReasonerStep::ToolCall {
            id: None,
            name: name.clone(),
            arguments: arguments.clone(),
        })
    })
}

pub fn list_tables() -> Script {
    call("sql_db_list_tables", json!({}))
}

pub fn describe(tables: &str) -> Script {
    call("sql_db_schema", json!({ "table_names": tables }))
}

pub fn check(query: &str) -> Script {
    call("sql_db_query_checker", json!({ "query": query }))
}

pub fn execute(query: &str) -> Script {
    call("sql_db_query", json!({ "query": query }))
}

pub fn execute_with_limit(query: &str, limit: usize) -> Script {
    call("sql_db_query", json!({ "query": query, "limit": limit }))
}

pub fn answer(text: &str) -> Script {
    let text = text.to_string();
    Box::new(move |_| Ok(ReasonerStep::FinalAnswer(text.clone())))
}

/// Final answer computed from the transcript.
pub fn answer_with(f: impl Fn(&Transcript) -> String + Send + Sync + 'static) -> Script {
    Box::new(move |t| Ok(ReasonerStep::FinalAnswer(f(t))))
}

pub fn fail(detail: &str) -> Script {
    let detail = detail.to_string();
    Box::new(move |_| Err(RoamingError::Llm(detail.clone())))
}

pub fn settings(max_steps: usize) -> LoopSettings {
    LoopSettings {
        max_steps,
        ..LoopSettings::default()
    }
}

pub fn instructions(top_k: usize) -> Arc<str> {
    Arc::from(compose_instructions(
        SQLITE_DIALECT,
        top_k,
        &SchemaCatalog::roaming(),
        &default_exemplars(),
    ))
}

pub fn agent(reasoner: Arc<ScriptedReasoner>, backend: Arc<dyn SqlBackend>, settings: LoopSettings) -> QueryAgent {
    QueryAgent::new(
        reasoner,
        backend,
        instructions(settings.top_k),
        Arc::new(SchemaCatalog::roaming()),
        settings,
    )
}
