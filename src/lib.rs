pub mod agent;
pub mod catalog;
pub mod config;
pub mod error;
pub mod exemplars;
pub mod llm;
pub mod logging;
pub mod prompt;
pub mod storage;

pub use agent::{AgentAnswer, AnswerService, QueryAgent};
pub use config::{AppConfig, LoopSettings};
pub use error::{Result, RoamingError};
