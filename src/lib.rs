pub mod config;
pub mod indexer;
pub mod language;
pub mod llm;
pub mod models;
pub mod rag;
