pub mod contracts;
pub mod error_classifier;
pub mod error_recovery;
pub mod r#loop;
pub mod policy;
pub mod reasoner;
pub mod runtime;
pub mod service;
pub mod tools;
pub mod transcript;

pub use contracts::AgentAnswer;
pub use r#loop::QueryAgent;
pub use reasoner::{LlmReasoner, Reasoner, ReasonerStep};
pub use service::AnswerService;
