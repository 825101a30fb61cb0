use anyhow::{anyhow, Result};
use async_trait::async_trait;
use octocrab::Octocrab;
use reqwest::{Client as HttpClient, StatusCode};
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

use snipsentry_core::{CheckRunRequest, EntryKind, RepoEntry, SnippetError, SourceHost};

use crate::config::{split_repo, GitHubConfig};

const PER_PAGE: usize = 100;
const PUBLIC_API_BASE: &str = "https://api.github.com";
/// Contents API media type returning the blob bytes undecoded, for files up to 100 MB.
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw+json";
const USER_AGENT: &str = concat!("snipsentry/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct RepositoryInfo {
    html_url: String,
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct PullRequestInfo {
    head: GitRef,
}

#[derive(Debug, Deserialize)]
struct GitRef {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct CommitInfo {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct PullRequestFile {
    filename: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct ContentEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

/// Repository access for one pull request (or one commit) on GitHub or GitHub Enterprise.
pub struct GitHubClient {
    client: Octocrab,
    http_client: HttpClient,
    api_base: String,
    token: String,
    owner: String,
    repo: String,
    pr_number: Option<u64>,
    commit_sha: Option<String>,
    git_ref: Option<String>,
    timeout_secs: u64,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let token = config
            .token
            .clone()
            .ok_or_else(|| anyhow!("GitHub token is required"))?;
        let repo = config
            .repo
            .as_deref()
            .ok_or_else(|| anyhow!("GitHub repository is required"))?;
        let (owner, name) =
            split_repo(repo).ok_or_else(|| anyhow!("Invalid repository (expected owner/name): {}", repo))?;

        let mut builder = Octocrab::builder().personal_token(token.clone());
        let api_base = match &config.url {
            Some(url) => {
                let api_base = enterprise_api_base(url);
                debug!("Using GitHub Enterprise API at {}", api_base);
                builder = builder
                    .base_uri(api_base.as_str())
                    .map_err(|e| anyhow!("Invalid GitHub URL {}: {}", url, e))?;
                api_base
            }
            None => PUBLIC_API_BASE.to_string(),
        };

        let client = builder
            .build()
            .map_err(|e| anyhow!("Failed to create GitHub client: {}", e))?;

        // File content goes through the raw media type, which octocrab does not expose as bytes
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| anyhow!("Failed to create GitHub HTTP client: {}", e))?;

        Ok(Self {
            client,
            http_client,
            api_base,
            token,
            owner: owner.to_string(),
            repo: name.to_string(),
            pr_number: config.pr_id,
            commit_sha: config.commit_sha.clone(),
            git_ref: None,
            timeout_secs: config.timeout_secs,
        })
    }

    /// Pin directory listings to a revision (the default branch otherwise).
    pub fn with_ref(mut self, git_ref: impl Into<String>) -> Self {
        self.git_ref = Some(git_ref.into());
        self
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    async fn repository_info(&self) -> Result<RepositoryInfo> {
        let route = format!("/repos/{}/{}", self.owner, self.repo);
        self.call("get repository", self.client.get(route, None::<&()>))
            .await
            .map_err(|e| anyhow!("{}", e))
    }

    /// Web URL of the repository, the base for file links.
    pub async fn repository_html_url(&self) -> Result<String> {
        Ok(self.repository_info().await?.html_url)
    }

    /// Commit to analyse: the pull request head, else the configured commit,
    /// else the tip of the default branch.
    pub async fn resolve_head_sha(&self) -> Result<String> {
        if let Some(number) = self.pr_number {
            let route = format!("/repos/{}/{}/pulls/{}", self.owner, self.repo, number);
            let pr: PullRequestInfo = self
                .call("get pull request", self.client.get(route, None::<&()>))
                .await
                .map_err(|e| anyhow!("{}", e))?;
            info!("Pull request #{} head is {}", number, pr.head.sha);
            return Ok(pr.head.sha);
        }

        if let Some(sha) = &self.commit_sha {
            return Ok(sha.clone());
        }

        let info = self.repository_info().await?;
        let route = format!(
            "/repos/{}/{}/commits/{}",
            self.owner,
            self.repo,
            urlencoding::encode(&info.default_branch)
        );
        let commit: CommitInfo = self
            .call("get default branch commit", self.client.get(route, None::<&()>))
            .await
            .map_err(|e| anyhow!("{}", e))?;
        Ok(commit.sha)
    }

    async fn call<T, F>(&self, operation: &str, request: F) -> Result<T, SnippetError>
    where
        F: Future<Output = octocrab::Result<T>>,
    {
        match tokio::time::timeout(Duration::from_secs(self.timeout_secs), request).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(SnippetError::collaborator(
                "GitHub",
                format!("{} failed: {}", operation, e),
            )),
            Err(_) => Err(SnippetError::Timeout {
                operation: format!("GitHub {}", operation),
                timeout_secs: self.timeout_secs,
            }),
        }
    }

    fn http_error(&self, operation: &str, error: reqwest::Error) -> SnippetError {
        if error.is_timeout() {
            SnippetError::Timeout {
                operation: format!("GitHub {}", operation),
                timeout_secs: self.timeout_secs,
            }
        } else {
            SnippetError::collaborator("GitHub", format!("{} failed: {}", operation, error))
        }
    }

    fn contents_route(&self, path: &str) -> String {
        let mut route = format!("/repos/{}/{}/contents", self.owner, self.repo);
        let encoded = encode_path(path);
        if !encoded.is_empty() {
            route.push('/');
            route.push_str(&encoded);
        }
        if let Some(git_ref) = &self.git_ref {
            route.push_str(&format!("?ref={}", urlencoding::encode(git_ref)));
        }
        route
    }

    fn raw_content_url(&self, path: &str, git_ref: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}?ref={}",
            self.api_base,
            self.owner,
            self.repo,
            encode_path(path),
            urlencoding::encode(git_ref)
        )
    }
}

/// `https://ghe.example.com/` becomes `https://ghe.example.com/api/v3`.
pub fn enterprise_api_base(url: &str) -> String {
    format!("{}/api/v3", url.trim_end_matches('/'))
}

/// Percent-encode each path segment, keeping the separators.
fn encode_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn entry_kind(kind: &str) -> EntryKind {
    match kind {
        "file" => EntryKind::File,
        "dir" => EntryKind::Dir,
        _ => EntryKind::Other,
    }
}

#[async_trait]
impl SourceHost for GitHubClient {
    async fn changed_files(&self) -> Result<Vec<String>, SnippetError> {
        let number = self.pr_number.ok_or_else(|| {
            SnippetError::collaborator("GitHub", "no pull request number configured")
        })?;

        let mut files = Vec::new();
        let mut page = 1usize;
        loop {
            let route = format!(
                "/repos/{}/{}/pulls/{}/files?per_page={}&page={}",
                self.owner, self.repo, number, PER_PAGE, page
            );
            let batch: Vec<PullRequestFile> = self
                .call("list pull request files", self.client.get(route, None::<&()>))
                .await?;
            let fetched = batch.len();

            files.extend(
                batch
                    .into_iter()
                    .filter(|file| file.status != "removed")
                    .map(|file| file.filename),
            );

            if fetched < PER_PAGE {
                break;
            }
            page += 1;
        }

        debug!("Pull request #{} changes {} files", number, files.len());
        Ok(files)
    }

    async fn list_directory(&self, path: &str) -> Result<Vec<RepoEntry>, SnippetError> {
        let entries: Vec<ContentEntry> = self
            .call(
                "list directory",
                self.client.get(self.contents_route(path), None::<&()>),
            )
            .await?;

        Ok(entries
            .into_iter()
            .map(|entry| RepoEntry {
                path: entry.path,
                kind: entry_kind(&entry.kind),
            })
            .collect())
    }

    async fn fetch_content(
        &self,
        path: &str,
        git_ref: &str,
    ) -> Result<Option<Vec<u8>>, SnippetError> {
        let response = self
            .http_client
            .get(self.raw_content_url(path, git_ref))
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", RAW_MEDIA_TYPE)
            .header("X-GitHub-Api-Version", "2022-11-28")
            .send()
            .await
            .map_err(|e| self.http_error("get file content", e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SnippetError::collaborator(
                "GitHub",
                format!("get file content failed: {} - {}", status.as_u16(), error_text),
            ));
        }

        let content = response
            .bytes()
            .await
            .map_err(|e| self.http_error("read file content", e))?;
        debug!("Fetched {} bytes of {} at {}", content.len(), path, git_ref);
        Ok(Some(content.to_vec()))
    }

    async fn create_issue_comment(&self, body: &str) -> Result<(), SnippetError> {
        let number = self.pr_number.ok_or_else(|| {
            SnippetError::collaborator("GitHub", "no pull request number configured")
        })?;
        self.call(
            "create comment",
            self.client
                .issues(&self.owner, &self.repo)
                .create_comment(number, body),
        )
        .await?;
        Ok(())
    }

    async fn create_check_run(&self, request: &CheckRunRequest) -> Result<(), SnippetError> {
        let route = format!("/repos/{}/{}/check-runs", self.owner, self.repo);
        let body = serde_json::json!({
            "name": request.name,
            "head_sha": request.head_sha,
            "status": "completed",
            "conclusion": request.conclusion.as_str(),
            "completed_at": chrono::Utc::now().to_rfc3339(),
            "output": {
                "title": request.title,
                "summary": request.summary,
            },
        });

        let _: serde_json::Value = self
            .call("create check run", self.client.post(route, Some(&body)))
            .await?;
        info!("Created check run '{}' on {}", request.name, request.head_sha);
        Ok(())
    }
}
