use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::parse_flag;

fn flag_value(value: &str) -> Result<bool, String> {
    Ok(parse_flag(value))
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Black Duck snippet analysis for GitHub pull requests",
    long_about = None
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Black Duck server URL
    #[arg(long)]
    pub url: Option<String>,

    /// Black Duck API token
    #[arg(long)]
    pub token: Option<String>,

    /// GitHub Enterprise URL (public GitHub when omitted)
    #[arg(long)]
    pub giturl: Option<String>,

    /// GitHub access token
    #[arg(long)]
    pub gittoken: Option<String>,

    /// Repository as owner/name
    #[arg(long)]
    pub repo: Option<String>,

    /// Pull request number
    #[arg(long = "pr-id", alias = "prID")]
    pub pr_id: Option<u64>,

    /// Only analyse files changed by the pull request
    #[arg(long, value_parser = flag_value)]
    pub changed_only: Option<bool>,

    /// One comment per file instead of one per snippet match
    #[arg(long, value_parser = flag_value)]
    pub group: Option<bool>,

    /// Post findings as pull request comments instead of writing the results file
    #[arg(long, value_parser = flag_value)]
    pub pr_comment: Option<bool>,

    /// Write a SARIF report
    #[arg(long, value_parser = flag_value)]
    pub sarif: Option<bool>,

    /// Publish a check run with the summary
    #[arg(long, value_parser = flag_value)]
    pub check_run: Option<bool>,

    #[arg(long)]
    pub result_file: Option<PathBuf>,

    #[arg(long)]
    pub sarif_file: Option<PathBuf>,

    #[arg(long)]
    pub summary_file: Option<PathBuf>,

    #[arg(long)]
    pub tool_name: Option<String>,

    #[arg(long)]
    pub information_uri: Option<String>,

    /// Comma separated extensions; an empty item matches files without one
    #[arg(long)]
    pub extensions: Option<String>,

    /// Directory that fetched files are written to
    #[arg(long)]
    pub scratch_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub generate_config: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render SARIF and summary reports from a saved results file
    Report {
        /// Results file written by a previous scan
        input: PathBuf,

        #[arg(long)]
        sarif_file: Option<PathBuf>,

        #[arg(long)]
        summary_file: Option<PathBuf>,

        /// Repository web URL used for file links, derived from the GitHub
        /// settings (e.g. GITHUB_SERVER_URL and GITHUB_REPOSITORY) when omitted
        #[arg(long)]
        repo_url: Option<String>,

        #[arg(long)]
        commit_sha: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct ReportArgs {
    pub input: PathBuf,
    pub sarif_file: Option<PathBuf>,
    pub summary_file: Option<PathBuf>,
    pub repo_url: String,
    pub commit_sha: String,
}

pub fn validate_report_args(args: &ReportArgs) -> Result<()> {
    if !args.input.exists() {
        return Err(anyhow::anyhow!(
            "Results file not found: {}",
            args.input.display()
        ));
    }

    if args.sarif_file.is_none() && args.summary_file.is_none() {
        return Err(anyhow::anyhow!(
            "Nothing to render: give --sarif-file and/or --summary-file"
        ));
    }

    if args.summary_file.is_some() {
        if args.repo_url.is_empty() {
            return Err(anyhow::anyhow!(
                "The summary links every file: give --repo-url or set GITHUB_REPOSITORY"
            ));
        }
        if args.commit_sha.is_empty() {
            return Err(anyhow::anyhow!(
                "The summary links every file: give --commit-sha or set GITHUB_SHA"
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_accept_truthy_words() {
        let args = Args::parse_from([
            "snipsentry",
            "--changed-only",
            "t",
            "--sarif",
            "1",
            "--check-run",
            "nope",
        ]);
        assert_eq!(args.changed_only, Some(true));
        assert_eq!(args.sarif, Some(true));
        assert_eq!(args.check_run, Some(false));
        assert_eq!(args.group, None);
    }

    #[test]
    fn test_pr_id_alias() {
        let args = Args::parse_from(["snipsentry", "--prID", "17"]);
        assert_eq!(args.pr_id, Some(17));
    }

    #[test]
    fn test_report_subcommand() {
        let args = Args::parse_from([
            "snipsentry",
            "report",
            "findings.json",
            "--sarif-file",
            "out.sarif",
        ]);
        match args.command {
            Some(Commands::Report {
                input, sarif_file, ..
            }) => {
                assert_eq!(input, PathBuf::from("findings.json"));
                assert_eq!(sarif_file, Some(PathBuf::from("out.sarif")));
            }
            None => panic!("expected report subcommand"),
        }
    }

    #[test]
    fn test_validate_report_args() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("findings.json");
        std::fs::write(&input, "{}").unwrap();

        let mut args = ReportArgs {
            input,
            sarif_file: None,
            summary_file: None,
            repo_url: String::new(),
            commit_sha: String::new(),
        };
        assert!(validate_report_args(&args).is_err());

        args.sarif_file = Some(dir.path().join("out.sarif"));
        assert!(validate_report_args(&args).is_ok());

        // Summary links need a repository and a revision
        args.summary_file = Some(dir.path().join("summary.md"));
        assert!(validate_report_args(&args).is_err());
        args.repo_url = "https://github.com/acme/widgets".to_string();
        assert!(validate_report_args(&args).is_err());
        args.commit_sha = "beef".to_string();
        assert!(validate_report_args(&args).is_ok());

        args.input = dir.path().join("missing.json");
        assert!(validate_report_args(&args).is_err());
    }
}
