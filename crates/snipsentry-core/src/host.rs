//! Collaborator seams: source hosting, fingerprint extraction, snippet matching.

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;

use crate::error::SnippetError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    /// Symlinks, submodules and anything else that is neither
    Other,
}

/// One entry of a repository directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoEntry {
    pub path: String,
    pub kind: EntryKind,
}

impl RepoEntry {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
        }
    }

    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Dir,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckConclusion {
    ActionRequired,
    Success,
}

impl CheckConclusion {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckConclusion::ActionRequired => "action_required",
            CheckConclusion::Success => "success",
        }
    }
}

/// A completed check run to attach to a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRunRequest {
    pub name: String,
    pub head_sha: String,
    pub title: String,
    pub summary: String,
    pub conclusion: CheckConclusion,
}

/// Source-hosting API used to pick files and publish reports.
#[async_trait]
pub trait SourceHost: Send + Sync {
    /// Paths changed by the pull request under analysis.
    async fn changed_files(&self) -> Result<Vec<String>, SnippetError>;

    /// Entries directly under `path` ("" is the repository root).
    async fn list_directory(&self, path: &str) -> Result<Vec<RepoEntry>, SnippetError>;

    /// Raw file bytes at `git_ref`, `None` when the path is not a file there.
    /// Content is never decoded: sources in any encoding are analysed as is.
    async fn fetch_content(&self, path: &str, git_ref: &str)
        -> Result<Option<Vec<u8>>, SnippetError>;

    async fn create_issue_comment(&self, body: &str) -> Result<(), SnippetError>;

    async fn create_check_run(&self, check: &CheckRunRequest) -> Result<(), SnippetError>;
}

/// Fingerprint payload produced for one file.
///
/// The payload is forwarded to the matcher untouched; only the number of
/// fingerprints is inspected.
#[derive(Debug, Clone, PartialEq)]
pub struct FingerprintSet {
    payload: Value,
    count: usize,
}

impl FingerprintSet {
    /// `None` when the payload has no `fingerprints` array.
    pub fn from_value(payload: Value) -> Option<Self> {
        let count = payload.get("fingerprints")?.as_array()?.len();
        Some(Self { payload, count })
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }
}

#[async_trait]
pub trait Fingerprinter: Send + Sync {
    /// Fingerprints for a local file, `None` when the extractor produced nothing.
    async fn fingerprint(&self, path: &Path) -> Result<Option<FingerprintSet>, SnippetError>;
}

#[async_trait]
pub trait SnippetMatcher: Send + Sync {
    /// Submit fingerprints and return the raw match response, `None` when the
    /// service returned an empty body.
    async fn match_snippets(
        &self,
        fingerprints: &FingerprintSet,
    ) -> Result<Option<String>, SnippetError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fingerprint_set_counts_array() {
        let set = FingerprintSet::from_value(json!({"fingerprints": [1, 2, 3], "fileName": "a.py"}))
            .unwrap();
        assert_eq!(set.count(), 3);
        assert_eq!(set.payload()["fileName"], "a.py");
    }

    #[test]
    fn test_fingerprint_set_requires_array() {
        assert!(FingerprintSet::from_value(json!({})).is_none());
        assert!(FingerprintSet::from_value(json!({"fingerprints": "x"})).is_none());
    }

    #[test]
    fn test_check_conclusion_wire_names() {
        assert_eq!(CheckConclusion::ActionRequired.as_str(), "action_required");
        assert_eq!(CheckConclusion::Success.as_str(), "success");
    }
}
