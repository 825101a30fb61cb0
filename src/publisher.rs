//! Sends a finished result store to its destinations.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use snipsentry_core::{CheckConclusion, CheckRunRequest, ResultStore, SnippetError, SourceHost};
use snipsentry_reports::{
    render_comments, to_summary_markdown, truncate_markdown, CommentStyle, FileLink, SarifReport,
    SarifToolInfo, CHECK_RUN_SUMMARY_LIMIT,
};

pub const CHECK_RUN_TITLE: &str = "Snippet analysis results";

pub struct Publisher<'a> {
    host: &'a dyn SourceHost,
    link: FileLink<'a>,
    check_run_name: &'a str,
}

impl<'a> Publisher<'a> {
    pub fn new(host: &'a dyn SourceHost, link: FileLink<'a>, check_run_name: &'a str) -> Self {
        Self {
            host,
            link,
            check_run_name,
        }
    }

    /// Post comments for every file in the store; returns how many were posted.
    ///
    /// A failed comment is logged and does not stop the remaining ones.
    pub async fn post_comments(&self, store: &ResultStore, style: CommentStyle) -> usize {
        let mut posted = 0;
        for (path, result) in store.iter() {
            for body in render_comments(style, path, result, &self.link) {
                match self.host.create_issue_comment(&body).await {
                    Ok(()) => posted += 1,
                    Err(e) => warn!("Failed to comment on {}: {}", path, e),
                }
            }
        }
        info!("Posted {} pull request comments", posted);
        posted
    }

    pub fn check_run_request(&self, store: &ResultStore) -> CheckRunRequest {
        let conclusion = if store.is_empty() {
            CheckConclusion::Success
        } else {
            CheckConclusion::ActionRequired
        };
        CheckRunRequest {
            name: self.check_run_name.to_string(),
            head_sha: self.link.commit_sha.to_string(),
            title: CHECK_RUN_TITLE.to_string(),
            summary: truncate_markdown(
                &to_summary_markdown(store, &self.link),
                CHECK_RUN_SUMMARY_LIMIT,
            ),
            conclusion,
        }
    }

    pub async fn publish_check_run(
        &self,
        store: &ResultStore,
    ) -> Result<CheckConclusion, SnippetError> {
        let request = self.check_run_request(store);
        self.host.create_check_run(&request).await?;
        Ok(request.conclusion)
    }

    pub fn write_summary_file(&self, store: &ResultStore, path: &Path) -> Result<()> {
        write_summary_file(store, &self.link, path)
    }
}

pub fn write_summary_file(store: &ResultStore, link: &FileLink<'_>, path: &Path) -> Result<()> {
    write_output(path, &to_summary_markdown(store, link))
        .with_context(|| format!("Failed to write summary to {}", path.display()))?;
    info!("Summary written to {}", path.display());
    Ok(())
}

pub fn write_results_file(store: &ResultStore, path: &Path) -> Result<()> {
    ensure_parent_dir(path)?;
    store
        .save_to_file(path)
        .with_context(|| format!("Failed to write results to {}", path.display()))?;
    info!("{} file results written to {}", store.len(), path.display());
    Ok(())
}

pub fn write_sarif_file(store: &ResultStore, tool: &SarifToolInfo, path: &Path) -> Result<()> {
    let report = SarifReport::from_store(store, tool);
    ensure_parent_dir(path)?;
    report
        .save_to_file(path)
        .with_context(|| format!("Failed to write SARIF report to {}", path.display()))?;
    info!(
        "SARIF report with {} results written to {}",
        report.results().len(),
        path.display()
    );
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn write_output(path: &Path, content: &str) -> Result<()> {
    ensure_parent_dir(path)?;
    std::fs::write(path, content)?;
    Ok(())
}
