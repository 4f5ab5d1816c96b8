use crate::agent::contracts::AgentAnswer;
use crate::agent::r#loop::QueryAgent;
use crate::agent::reasoner::{LlmReasoner, Reasoner};
use crate::catalog::SchemaCatalog;
use crate::config::{AppConfig, LoopSettings};
use crate::error::{Result, RoamingError};
use crate::exemplars::{default_exemplars, Exemplar};
use crate::llm::LlmClient;
use crate::prompt::{compose_instructions, SQLITE_DIALECT};
use crate::storage::{SqlBackend, UsageStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Process-wide entry point: holds the instruction block (composed once) and
/// builds a fresh agent and store connection for every question.
pub struct AnswerService {
    reasoner: Arc<dyn Reasoner>,
    catalog: Arc<SchemaCatalog>,
    instructions: Arc<str>,
    db_path: PathBuf,
    settings: LoopSettings,
}

impl AnswerService {
    pub fn new(
        reasoner: Arc<dyn Reasoner>,
        catalog: SchemaCatalog,
        exemplars: &[Exemplar],
        db_path: impl Into<PathBuf>,
        settings: LoopSettings,
    ) -> Self {
        let instructions = compose_instructions(SQLITE_DIALECT, settings.top_k, &catalog, exemplars);
        info!("Composed agent instructions ({} chars)", instructions.len());
        Self {
            reasoner,
            catalog: Arc::new(catalog),
            instructions: Arc::from(instructions),
            db_path: db_path.into(),
            settings,
        }
    }

    /// LLM-backed service over the roaming catalog and default exemplars.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let api_key = config.require_api_key()?.to_string();
        if !config.db_path.exists() {
            return Err(RoamingError::Database(format!(
                "database file {} does not exist; run the ingest command first",
                config.db_path.display()
            )));
        }
        let client = LlmClient::new(api_key, config.llm.base_url.clone(), config.llm.model.clone())?;
        info!("Using model {}", client.model());
        Ok(Self::new(
            Arc::new(LlmReasoner::new(client)),
            SchemaCatalog::roaming(),
            &default_exemplars(),
            config.db_path.clone(),
            config.loop_settings,
        ))
    }

    /// Agent bound to an existing backend.
    pub fn agent_with_backend(&self, backend: Arc<dyn SqlBackend>) -> QueryAgent {
        QueryAgent::new(
            Arc::clone(&self.reasoner),
            backend,
            Arc::clone(&self.instructions),
            Arc::clone(&self.catalog),
            self.settings,
        )
    }

    /// Agent with its own read-only connection to the configured database.
    pub fn open_agent(&self) -> Result<QueryAgent> {
        let store = UsageStore::open_read_only(&self.db_path)?;
        Ok(self.agent_with_backend(Arc::new(store)))
    }

    pub async fn answer(&self, question: &str) -> Result<AgentAnswer> {
        if question.trim().is_empty() {
            return Err(RoamingError::InvalidQuestion("Please enter a question".to_string()));
        }
        let agent = self.open_agent()?;
        agent.answer(question).await
    }
}
