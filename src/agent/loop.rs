//! Query Agent Loop
//!
//! Bounded tool-use loop turning one question into a final answer. Each step
//! asks the reasoner for a proposal, checks it against the loop policy, runs
//! the tool and appends the outcome to the transcript.

use crate::agent::contracts::{AgentAnswer, TraceEvent, TraceEventType};
use crate::agent::error_classifier::ErrorClassifier;
use crate::agent::error_recovery::ErrorRecovery;
use crate::agent::policy::{PolicyDecision, QueryPolicy};
use crate::agent::reasoner::{Reasoner, ReasonerStep};
use crate::agent::runtime::ToolRuntime;
use crate::agent::tools::{tool_specs, ToolInvocation, ToolSpec};
use crate::agent::transcript::Transcript;
use crate::catalog::SchemaCatalog;
use crate::config::LoopSettings;
use crate::error::{Result, RoamingError};
use crate::storage::SqlBackend;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

const EMPTY_ANSWER_NOTICE: &str = "Your reply was empty. Keep using the tools, or give the final answer followed by a line starting with \"Insight:\".";

/// One agent bound to a backend and a fixed instruction block. Cheap to
/// build; construct one per request.
pub struct QueryAgent {
    reasoner: Arc<dyn Reasoner>,
    runtime: ToolRuntime,
    instructions: Arc<str>,
    settings: LoopSettings,
    classifier: ErrorClassifier,
    recovery: ErrorRecovery,
    tools: Vec<ToolSpec>,
}

impl QueryAgent {
    pub fn new(
        reasoner: Arc<dyn Reasoner>,
        backend: Arc<dyn SqlBackend>,
        instructions: Arc<str>,
        catalog: Arc<SchemaCatalog>,
        settings: LoopSettings,
    ) -> Self {
        Self {
            reasoner,
            runtime: ToolRuntime::new(backend, settings.max_result_chars),
            instructions,
            settings,
            classifier: ErrorClassifier::new(),
            recovery: ErrorRecovery::new(catalog),
            tools: tool_specs(),
        }
    }

    pub async fn answer(&self, question: &str) -> Result<AgentAnswer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RoamingError::InvalidQuestion("Please enter a question".to_string()));
        }
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("agent_run", run_id = %run_id);
        self.run(question, run_id).instrument(span).await
    }

    async fn run(&self, question: &str, run_id: String) -> Result<AgentAnswer> {
        info!("Question: {}", question);
        let mut transcript = Transcript::new(&*self.instructions, question);
        let mut policy = QueryPolicy::new(question, self.settings.top_k, self.settings.max_explicit_rows);
        let mut trace = Vec::new();
        let mut last_tool: Option<String> = None;
        let mut last_sql: Option<String> = None;

        for step in 1..=self.settings.max_steps {
            let proposal = self
                .reasoner
                .next_step(&transcript, &self.tools)
                .await
                .map_err(|e| {
                    error!("Reasoner failed at step {}: {}", step, e);
                    RoamingError::AgentFailure {
                        last_tool: last_tool.clone(),
                        detail: e.to_string(),
                    }
                })?;

            let (call_id, name, arguments) = match proposal {
                ReasonerStep::FinalAnswer(text) => {
                    let text = text.trim();
                    if text.is_empty() {
                        warn!("Step {}: empty final answer", step);
                        transcript.push_notice(EMPTY_ANSWER_NOTICE);
                        trace.push(TraceEvent::now(step, TraceEventType::Notice, json!({ "notice": EMPTY_ANSWER_NOTICE })));
                        continue;
                    }
                    transcript.push_final_answer(text);
                    trace.push(TraceEvent::now(step, TraceEventType::FinalAnswer, json!({ "chars": text.len() })));
                    info!("✅ Final answer after {} steps", step);
                    return Ok(AgentAnswer::new(run_id, text.to_string(), last_sql, step, trace));
                }
                ReasonerStep::ToolCall { id, name, arguments } => {
                    let call_id = id
                        .filter(|id| !id.trim().is_empty())
                        .unwrap_or_else(|| format!("call_{}", step));
                    (call_id, name, arguments)
                }
            };

            info!("Step {}: {} {}", step, name, arguments);
            transcript.push_tool_call(&call_id, &name, &arguments);
            trace.push(TraceEvent::now(
                step,
                TraceEventType::ToolCall,
                json!({ "tool_name": name, "arguments": arguments }),
            ));
            last_tool = Some(name.clone());

            let invocation = match ToolInvocation::parse(&name, &arguments) {
                Ok(invocation) => invocation,
                Err(e) => {
                    warn!("Step {}: rejected tool call: {}", step, e);
                    trace.push(TraceEvent::now(
                        step,
                        TraceEventType::Error,
                        json!({ "tool_name": name, "error": e.to_string() }),
                    ));
                    transcript.push_tool_result(&call_id, &name, e.to_string(), true);
                    continue;
                }
            };

            let (row_limit, clamped_from) = match policy.review(&invocation) {
                PolicyDecision::Proceed {
                    row_limit,
                    clamped_from,
                } => (row_limit, clamped_from),
                PolicyDecision::Refuse(reason) => {
                    trace.push(TraceEvent::now(
                        step,
                        TraceEventType::PolicyRefusal,
                        json!({ "tool_name": name, "reason": reason }),
                    ));
                    transcript.push_tool_result(&call_id, &name, reason, true);
                    continue;
                }
            };

            match self.runtime.execute_blocking(&invocation, row_limit).await {
                Ok(mut content) => {
                    policy.record(&invocation, false);
                    if let Some(requested) = clamped_from {
                        info!("Row limit {} clamped to {}", requested, row_limit);
                        content = format!(
                            "Note: the requested limit of {} rows exceeds the row cap; at most {} rows were returned.\n{}",
                            requested, row_limit, content
                        );
                    }
                    if let ToolInvocation::ExecuteQuery { query, .. } = &invocation {
                        last_sql = Some(query.clone());
                    }
                    trace.push(TraceEvent::now(
                        step,
                        TraceEventType::ToolResult,
                        json!({ "tool_name": name, "chars": content.len(), "row_limit": row_limit }),
                    ));
                    transcript.push_tool_result(&call_id, &name, content, false);
                }
                Err(e) => {
                    let class = self.classifier.classify(&e);
                    if !class.is_recoverable() {
                        error!("Step {}: {} failed: {}", step, name, e);
                        return Err(RoamingError::AgentFailure {
                            last_tool: Some(name),
                            detail: e.to_string(),
                        });
                    }
                    warn!("Step {}: {} failed ({}): {}", step, name, class, e);
                    policy.record(&invocation, true);
                    trace.push(TraceEvent::now(
                        step,
                        TraceEventType::Error,
                        json!({ "tool_name": name, "class": class.to_string(), "error": e.to_string() }),
                    ));
                    let hint = self.recovery.build_recovery_prompt(&class, &e.to_string());
                    transcript.push_tool_result(&call_id, &name, hint, true);
                }
            }
        }

        warn!("Step budget of {} exhausted", self.settings.max_steps);
        Err(RoamingError::AgentExhausted {
            steps: self.settings.max_steps,
            transcript: transcript.turns(),
        })
    }
}
