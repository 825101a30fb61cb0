pub mod cli;
pub mod config;
pub mod fingerprint;
pub mod github;
pub mod logging;
pub mod matching;
pub mod publisher;
pub mod scanner;

// Re-export core types for convenience
pub use snipsentry_core::{FileMatchResult, ResultStore, SnippetError};
