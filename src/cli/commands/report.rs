use anyhow::{Context, Result};
use tracing::info;

use snipsentry_core::ResultStore;
use snipsentry_reports::FileLink;

use crate::cli::args::{validate_report_args, ReportArgs};
use crate::cli::commands::scan::sarif_tool_info;
use crate::config::SnipsentryConfig;
use crate::publisher::{write_sarif_file, write_summary_file};

/// Re-render reports from a results file without contacting any service.
pub fn run_report_command(args: ReportArgs, config: &SnipsentryConfig) -> Result<()> {
    validate_report_args(&args)?;

    let store = ResultStore::from_file(&args.input)
        .with_context(|| format!("Failed to load results from {}", args.input.display()))?;
    info!(
        "Loaded {} file results from {}",
        store.len(),
        args.input.display()
    );

    if let Some(sarif_file) = &args.sarif_file {
        write_sarif_file(&store, &sarif_tool_info(config), sarif_file)?;
    }

    if let Some(summary_file) = &args.summary_file {
        let link = FileLink::new(&args.repo_url, &args.commit_sha);
        write_summary_file(&store, &link, summary_file)?;
    }

    Ok(())
}
