use anyhow::{anyhow, Result};
use std::time::Instant;
use tracing::{error, info, warn};

use snipsentry_core::CheckConclusion;
use snipsentry_reports::{CommentStyle, FileLink, SarifToolInfo};
use snipsentry_utils::{ExtensionFilter, FileSelector, SelectionMode};

use crate::config::SnipsentryConfig;
use crate::fingerprint::JavaFingerprinter;
use crate::github::GitHubClient;
use crate::matching::BlackDuckClient;
use crate::publisher::{write_results_file, write_sarif_file, Publisher};
use crate::scanner::SnippetScanner;

pub fn sarif_tool_info(config: &SnipsentryConfig) -> SarifToolInfo {
    SarifToolInfo {
        name: config.output.tool_name.clone(),
        information_uri: config.output.information_uri.clone(),
        ..Default::default()
    }
}

pub async fn run_scan_command(config: SnipsentryConfig) -> Result<()> {
    let start = Instant::now();
    config.validate()?;

    // Setup failures are fatal; per-file failures are not
    let host = GitHubClient::new(&config.github)?;
    let repo_url = host.repository_html_url().await?;
    let head_sha = host.resolve_head_sha().await?;
    let host = host.with_ref(head_sha.clone());
    info!("Analysing {} at {}", host.full_name(), head_sha);

    let matcher = BlackDuckClient::new(&config.blackduck)
        .map_err(|e| anyhow!("Failed to create Black Duck client: {}", e))?;
    let fingerprinter = JavaFingerprinter::new(&config.fingerprint);

    let selector = FileSelector::with_filter(
        config.scan.scratch_dir.clone(),
        ExtensionFilter::new(&config.scan.extensions),
    );
    let mode = if config.scan.changed_only {
        SelectionMode::ChangedFiles
    } else {
        SelectionMode::FullTree
    };
    let files = selector.select(&host, mode).await;
    info!("{} files selected for snippet analysis", files.len());

    let scanner = SnippetScanner::new(
        Box::new(fingerprinter),
        Box::new(matcher),
        config.scan.admission_policy(),
    );
    let report = scanner.scan(&host, &selector, &files, &head_sha).await;

    let link = FileLink::new(&repo_url, &head_sha);
    let publisher = Publisher::new(&host, link, &config.output.check_run_name);

    if config.scan.pr_comment {
        let style = CommentStyle::from_group_flag(config.scan.group);
        publisher.post_comments(&report.store, style).await;
    } else {
        write_results_file(&report.store, &config.output.result_file)?;
    }

    if config.scan.sarif {
        write_sarif_file(
            &report.store,
            &sarif_tool_info(&config),
            &config.output.sarif_file,
        )?;
    }

    if let Some(summary_file) = &config.output.summary_file {
        publisher.write_summary_file(&report.store, summary_file)?;
    }

    if config.scan.check_run {
        match publisher.publish_check_run(&report.store).await {
            Ok(CheckConclusion::ActionRequired) => {
                warn!("Check run concluded: action required")
            }
            Ok(CheckConclusion::Success) => info!("Check run concluded: success"),
            Err(e) => error!("Failed to publish check run: {}", e),
        }
    }

    info!(
        "Done: {} snippet matches in {} files, took {:.1}s",
        report.store.snippet_count(),
        report.store.len(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}
