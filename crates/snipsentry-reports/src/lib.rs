//! Report generation for the snipsentry snippet scanner.
//!
//! This crate renders a `ResultStore` in several formats:
//! - Markdown pull-request comments (grouped per file or one per snippet)
//! - SARIF (Static Analysis Results Interchange Format)
//! - A repository-wide Markdown summary for check runs

pub mod markdown;
pub mod sarif;
pub mod summary;

pub use markdown::{render_comments, render_grouped, render_separated, CommentStyle, FileLink};
pub use sarif::{SarifLevel, SarifReport, SarifResult, SarifRule, SarifToolInfo};
pub use summary::{to_summary_markdown, truncate_markdown, CHECK_RUN_SUMMARY_LIMIT, SUMMARY_HEADING};
