pub mod cli;
pub mod comment;
pub mod config;
pub mod error;
pub mod github;
pub mod llm;
pub mod orchestrator;
pub mod prompts;
pub mod resolver;
pub mod summarize;
