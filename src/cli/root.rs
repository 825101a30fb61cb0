use anyhow::Result;
use clap::Parser;
use std::collections::HashMap;

use crate::cli::args::{Args, Commands, ReportArgs};
use crate::cli::commands::{run_report_command, run_scan_command};
use crate::config::SnipsentryConfig;
use crate::logging;

pub struct RootCommand;

impl RootCommand {
    pub async fn execute() -> Result<()> {
        let args = Args::parse();

        if args.generate_config {
            println!("{}", SnipsentryConfig::generate_default_config()?);
            return Ok(());
        }

        let env_vars: HashMap<String, String> = std::env::vars().collect();
        let config =
            SnipsentryConfig::load_with_precedence(args.config.as_deref(), &args, &env_vars)?;
        config.validate_logging()?;
        logging::init(&config.logging)?;

        match &args.command {
            Some(Commands::Report {
                input,
                sarif_file,
                summary_file,
                repo_url,
                commit_sha,
            }) => {
                let report_args = ReportArgs {
                    input: input.clone(),
                    sarif_file: sarif_file.clone(),
                    summary_file: summary_file.clone(),
                    repo_url: repo_url
                        .clone()
                        .or_else(|| config.github.repository_web_url())
                        .unwrap_or_default(),
                    commit_sha: commit_sha
                        .clone()
                        .or_else(|| config.github.commit_sha.clone())
                        .unwrap_or_default(),
                };
                run_report_command(report_args, &config)
            }
            None => run_scan_command(config).await,
        }
    }
}
