use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use snipsentry_core::{AdmissionPolicy, MAX_FINGERPRINTS, MIN_FINGERPRINTS};
use snipsentry_utils::DEFAULT_EXTENSIONS;

use crate::cli::args::Args;

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct SnipsentryConfig {
    #[serde(default)]
    pub blackduck: BlackDuckConfig,

    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub fingerprint: FingerprintConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Black Duck server used for snippet matching
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct BlackDuckConfig {
    pub url: Option<String>,

    pub token: Option<String>,

    /// Skip TLS certificate verification
    pub insecure: bool,

    pub timeout_secs: u64,
}

impl Default for BlackDuckConfig {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            insecure: true,
            timeout_secs: 120,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct GitHubConfig {
    /// GitHub Enterprise base URL; public GitHub when unset
    pub url: Option<String>,

    pub token: Option<String>,

    /// Repository as `owner/name`
    pub repo: Option<String>,

    pub pr_id: Option<u64>,

    /// Commit to analyse when no pull request is given
    pub commit_sha: Option<String>,

    pub timeout_secs: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            repo: None,
            pr_id: None,
            commit_sha: None,
            timeout_secs: 60,
        }
    }
}

impl GitHubConfig {
    /// Web URL of the configured repository, `https://github.com/<owner>/<name>`
    /// unless an Enterprise server is set.
    pub fn repository_web_url(&self) -> Option<String> {
        let repo = self.repo.as_deref()?;
        split_repo(repo)?;
        let server = self.url.as_deref().unwrap_or("https://github.com");
        Some(format!("{}/{}", server.trim_end_matches('/'), repo))
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ScanConfig {
    #[serde(default = "default_true")]
    pub changed_only: bool,

    #[serde(default = "default_true")]
    pub group: bool,

    #[serde(default)]
    pub pr_comment: bool,

    #[serde(default)]
    pub sarif: bool,

    #[serde(default)]
    pub check_run: bool,

    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    #[serde(default = "default_min_fingerprints")]
    pub min_fingerprints: usize,

    #[serde(default = "default_max_fingerprints")]
    pub max_fingerprints: usize,

    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
}

fn default_true() -> bool {
    true
}

fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|ext| ext.to_string()).collect()
}

fn default_min_fingerprints() -> usize {
    MIN_FINGERPRINTS
}

fn default_max_fingerprints() -> usize {
    MAX_FINGERPRINTS
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            changed_only: true,
            group: true,
            pr_comment: false,
            sarif: false,
            check_run: false,
            extensions: default_extensions(),
            min_fingerprints: default_min_fingerprints(),
            max_fingerprints: default_max_fingerprints(),
            scratch_dir: default_scratch_dir(),
        }
    }
}

impl ScanConfig {
    pub fn admission_policy(&self) -> AdmissionPolicy {
        AdmissionPolicy::new(self.min_fingerprints, self.max_fingerprints)
    }
}

/// External fingerprint extractor (`java -cp <classpath> <main_class> <file>`)
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct FingerprintConfig {
    pub java: PathBuf,
    pub classpath: String,
    pub main_class: String,
    pub timeout_secs: u64,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            java: PathBuf::from("java"),
            classpath: "snippet-scanner-1.0-SNAPSHOT.jar:sca-fingerprint-client-1.0.0.jar"
                .to_string(),
            main_class: "com.blackduck.snippet.App".to_string(),
            timeout_secs: 120,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub result_file: PathBuf,
    pub sarif_file: PathBuf,
    pub summary_file: Option<PathBuf>,
    pub tool_name: String,
    pub information_uri: Option<String>,
    pub check_run_name: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            result_file: PathBuf::from("blackduckSnippetFindings.json"),
            sarif_file: PathBuf::from("blackduck-snippet.sarif.json"),
            summary_file: Some(PathBuf::from("blackduck-snippet-summary.md")),
            tool_name: "Black Duck Snippet Analysis".to_string(),
            information_uri: None,
            check_run_name: "Black Duck Snippet Analysis".to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Missing {field}: {hint}")]
    MissingValue { field: String, hint: String },

    #[error("Invalid value in {field}: {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Invalid range in {field}: {value} (valid range: {valid_range})")]
    InvalidRange {
        field: String,
        value: String,
        valid_range: String,
    },

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(nested)) => {
                merge_tables(existing, nested)
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Boolean flags accept `yes`, `true`, `t` and `1` (case-insensitive); anything
/// else is false.
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "yes" | "true" | "t" | "1"
    )
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|item| item.trim().trim_start_matches('.').to_string())
        .collect()
}

impl SnipsentryConfig {
    pub fn generate_default_config() -> Result<String> {
        Ok(toml::to_string_pretty(&Self::default())?)
    }

    /// Get the user config file path (~/.config/snipsentry/config.toml)
    pub fn get_user_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/snipsentry/config.toml"))
    }

    /// Get the current directory config file path (./snipsentry.toml)
    pub fn get_current_config_path() -> PathBuf {
        PathBuf::from("./snipsentry.toml")
    }

    /// Load configuration with full precedence chain:
    /// 1. Default values (lowest)
    /// 2. User config (~/.config/snipsentry/config.toml)
    /// 3. Current directory (./snipsentry.toml)
    /// 4. Explicit `--config` file
    /// 5. Environment variables
    /// 6. CLI arguments (highest)
    pub fn load_with_precedence(
        config_path: Option<&Path>,
        args: &Args,
        env_vars: &HashMap<String, String>,
    ) -> Result<Self> {
        let mut layers: Vec<PathBuf> = [
            Self::get_user_config_path(),
            Some(Self::get_current_config_path()),
        ]
        .into_iter()
        .flatten()
        .filter(|path| path.exists())
        .collect();
        // An explicit file must exist, so it is not filtered
        if let Some(path) = config_path {
            layers.push(path.to_path_buf());
        }

        let mut config = Self::load_layered(&layers)?;
        config.apply_env_vars(env_vars)?;
        config.apply_args(args);
        config.normalize();

        Ok(config)
    }

    /// Merge config files in order over the defaults. A later file overrides
    /// only the keys it sets; tables are merged key by key.
    pub fn load_layered(paths: &[PathBuf]) -> Result<Self> {
        let mut merged = toml::Table::new();
        for path in paths {
            let layer = std::fs::read_to_string(path)
                .map_err(ConfigError::from)
                .and_then(|content| Ok(content.parse::<toml::Table>()?))
                .map_err(|e| anyhow!("Failed to load config file {}: {}", path.display(), e))?;
            merge_tables(&mut merged, layer);
            tracing::debug!("Loaded config from: {}", path.display());
        }

        toml::Value::Table(merged)
            .try_into()
            .map_err(|e| anyhow!("Invalid configuration: {}", e))
    }

    pub fn apply_env_vars(&mut self, env_vars: &HashMap<String, String>) -> Result<()> {
        // CI conventions first so SNIPSENTRY_* can override them
        for (key, value) in env_vars {
            match key.as_str() {
                "BD_URL" => self.blackduck.url = Some(value.clone()),
                "BD_TOKEN" => self.blackduck.token = Some(value.clone()),
                "GITHUB_TOKEN" => self.github.token = Some(value.clone()),
                "GITHUB_REPOSITORY" => self.github.repo = Some(value.clone()),
                "GITHUB_SHA" => self.github.commit_sha = Some(value.clone()),
                "GITHUB_SERVER_URL" if value.trim_end_matches('/') != "https://github.com" => {
                    self.github.url = Some(value.clone())
                }
                _ => {}
            }
        }

        for (key, value) in env_vars {
            let Some(config_key) = key.strip_prefix("SNIPSENTRY_") else {
                continue;
            };
            match config_key {
                "BLACKDUCK_URL" => self.blackduck.url = Some(value.clone()),
                "BLACKDUCK_TOKEN" => self.blackduck.token = Some(value.clone()),
                "BLACKDUCK_INSECURE" => self.blackduck.insecure = parse_flag(value),
                "BLACKDUCK_TIMEOUT_SECS" => {
                    self.blackduck.timeout_secs = value
                        .parse()
                        .map_err(|_| anyhow!("Invalid blackduck timeout value: {}", value))?;
                }
                "GITHUB_URL" => self.github.url = Some(value.clone()),
                "GITHUB_TOKEN" => self.github.token = Some(value.clone()),
                "GITHUB_REPO" => self.github.repo = Some(value.clone()),
                "GITHUB_PR_ID" => {
                    self.github.pr_id = Some(
                        value
                            .parse()
                            .map_err(|_| anyhow!("Invalid pr_id value: {}", value))?,
                    );
                }
                "GITHUB_COMMIT_SHA" => self.github.commit_sha = Some(value.clone()),
                "GITHUB_TIMEOUT_SECS" => {
                    self.github.timeout_secs = value
                        .parse()
                        .map_err(|_| anyhow!("Invalid github timeout value: {}", value))?;
                }
                "SCAN_CHANGED_ONLY" => self.scan.changed_only = parse_flag(value),
                "SCAN_GROUP" => self.scan.group = parse_flag(value),
                "SCAN_PR_COMMENT" => self.scan.pr_comment = parse_flag(value),
                "SCAN_SARIF" => self.scan.sarif = parse_flag(value),
                "SCAN_CHECK_RUN" => self.scan.check_run = parse_flag(value),
                "SCAN_EXTENSIONS" => self.scan.extensions = split_list(value),
                "SCAN_SCRATCH_DIR" => self.scan.scratch_dir = PathBuf::from(value),
                "FINGERPRINT_JAVA" => self.fingerprint.java = PathBuf::from(value),
                "FINGERPRINT_CLASSPATH" => self.fingerprint.classpath = value.clone(),
                "FINGERPRINT_MAIN_CLASS" => self.fingerprint.main_class = value.clone(),
                "FINGERPRINT_TIMEOUT_SECS" => {
                    self.fingerprint.timeout_secs = value
                        .parse()
                        .map_err(|_| anyhow!("Invalid fingerprint timeout value: {}", value))?;
                }
                "OUTPUT_RESULT_FILE" => self.output.result_file = PathBuf::from(value),
                "OUTPUT_SARIF_FILE" => self.output.sarif_file = PathBuf::from(value),
                "OUTPUT_SUMMARY_FILE" => self.output.summary_file = Some(PathBuf::from(value)),
                "OUTPUT_TOOL_NAME" => self.output.tool_name = value.clone(),
                "LOGGING_LEVEL" => self.logging.level = value.clone(),
                _ => {} // Ignore unknown environment variables
            }
        }
        Ok(())
    }

    pub fn apply_args(&mut self, args: &Args) {
        if let Some(ref url) = args.url {
            self.blackduck.url = Some(url.clone());
        }
        if let Some(ref token) = args.token {
            self.blackduck.token = Some(token.clone());
        }
        if let Some(ref giturl) = args.giturl {
            self.github.url = Some(giturl.clone());
        }
        if let Some(ref gittoken) = args.gittoken {
            self.github.token = Some(gittoken.clone());
        }
        if let Some(ref repo) = args.repo {
            self.github.repo = Some(repo.clone());
        }
        if let Some(pr_id) = args.pr_id {
            self.github.pr_id = Some(pr_id);
        }
        if let Some(changed_only) = args.changed_only {
            self.scan.changed_only = changed_only;
        }
        if let Some(group) = args.group {
            self.scan.group = group;
        }
        if let Some(pr_comment) = args.pr_comment {
            self.scan.pr_comment = pr_comment;
        }
        if let Some(sarif) = args.sarif {
            self.scan.sarif = sarif;
        }
        if let Some(check_run) = args.check_run {
            self.scan.check_run = check_run;
        }
        if let Some(ref extensions) = args.extensions {
            self.scan.extensions = split_list(extensions);
        }
        if let Some(ref scratch_dir) = args.scratch_dir {
            self.scan.scratch_dir = scratch_dir.clone();
        }
        if let Some(ref result_file) = args.result_file {
            self.output.result_file = result_file.clone();
        }
        if let Some(ref sarif_file) = args.sarif_file {
            self.output.sarif_file = sarif_file.clone();
        }
        if let Some(ref summary_file) = args.summary_file {
            self.output.summary_file = Some(summary_file.clone());
        }
        if let Some(ref tool_name) = args.tool_name {
            self.output.tool_name = tool_name.clone();
        }
        if let Some(ref information_uri) = args.information_uri {
            self.output.information_uri = Some(information_uri.clone());
        }
        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Strip trailing slashes from base URLs and drop empty secrets.
    pub fn normalize(&mut self) {
        for url in [&mut self.blackduck.url, &mut self.github.url] {
            if let Some(value) = url.as_mut() {
                let trimmed = value.trim().trim_end_matches('/').to_string();
                *value = trimmed;
            }
            if url.as_deref() == Some("") {
                *url = None;
            }
        }
        for secret in [&mut self.blackduck.token, &mut self.github.token] {
            if secret.as_deref().is_some_and(|s| s.trim().is_empty()) {
                *secret = None;
            }
        }
    }

    pub fn validate_logging(&self) -> Result<(), ConfigError> {
        self.logging
            .level
            .parse::<tracing::Level>()
            .map(|_| ())
            .map_err(|e| ConfigError::InvalidValue {
                field: "logging.level".to_string(),
                value: self.logging.level.clone(),
                reason: e.to_string(),
            })
    }

    /// Checks needed before a scan touches the network.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.blackduck.url.is_none() {
            return Err(ConfigError::MissingValue {
                field: "blackduck.url".to_string(),
                hint: "give it with --url or as a BD_URL environment variable".to_string(),
            });
        }
        if self.blackduck.token.is_none() {
            return Err(ConfigError::MissingValue {
                field: "blackduck.token".to_string(),
                hint: "give it with --token or as a BD_TOKEN environment variable".to_string(),
            });
        }
        if self.github.token.is_none() {
            return Err(ConfigError::MissingValue {
                field: "github.token".to_string(),
                hint: "give it with --gittoken or as a GITHUB_TOKEN environment variable"
                    .to_string(),
            });
        }

        match self.github.repo.as_deref() {
            None => {
                return Err(ConfigError::MissingValue {
                    field: "github.repo".to_string(),
                    hint: "give it with --repo as owner/name".to_string(),
                })
            }
            Some(repo) if split_repo(repo).is_none() => {
                return Err(ConfigError::InvalidValue {
                    field: "github.repo".to_string(),
                    value: repo.to_string(),
                    reason: "expected owner/name".to_string(),
                })
            }
            Some(_) => {}
        }

        if (self.scan.pr_comment || self.scan.changed_only) && self.github.pr_id.is_none() {
            return Err(ConfigError::MissingValue {
                field: "github.pr_id".to_string(),
                hint: "changed-only scans and PR comments need --pr-id".to_string(),
            });
        }

        if self.scan.min_fingerprints > self.scan.max_fingerprints {
            return Err(ConfigError::InvalidRange {
                field: "scan.min_fingerprints".to_string(),
                value: self.scan.min_fingerprints.to_string(),
                valid_range: format!("0-{}", self.scan.max_fingerprints),
            });
        }

        if self.blackduck.timeout_secs == 0
            || self.github.timeout_secs == 0
            || self.fingerprint.timeout_secs == 0
        {
            return Err(ConfigError::InvalidRange {
                field: "timeout_secs".to_string(),
                value: "0".to_string(),
                valid_range: "1-".to_string(),
            });
        }

        self.validate_logging()
    }
}

/// Split `owner/name` into its parts.
pub fn split_repo(repo: &str) -> Option<(&str, &str)> {
    let (owner, name) = repo.trim().split_once('/')?;
    if owner.is_empty() || name.is_empty() || name.contains('/') {
        return None;
    }
    Some((owner, name))
}
