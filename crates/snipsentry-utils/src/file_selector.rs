use std::collections::VecDeque;
use std::path::{Component, Path, PathBuf};

use snipsentry_core::{EntryKind, SnippetError, SourceHost};
use tracing::{debug, warn};

/// Extensions the fingerprint extractor understands. The empty entry admits
/// files without an extension (`Makefile`, `README`, ...).
pub const DEFAULT_EXTENSIONS: &[&str] = &["py", "c", "h", "java", "ccp", "js", "go", ""];

/// Where candidate paths come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    /// Files touched by the pull request
    ChangedFiles,
    /// Every file reachable from the repository root
    FullTree,
}

/// Everything after the last `.` of the whole path, or `""` when the path has
/// no dot. A dotted directory counts: `build.d/Makefile` yields `d/Makefile`.
pub fn extension_of(path: &str) -> &str {
    match path.rfind('.') {
        Some(idx) => &path[idx + 1..],
        None => "",
    }
}

/// Allow-list of file extensions, compared case-sensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionFilter {
    extensions: Vec<String>,
}

impl Default for ExtensionFilter {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSIONS.iter().copied())
    }
}

impl ExtensionFilter {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_string())
                .collect(),
        }
    }

    /// Parse a comma-separated list. Empty items stand for extensionless files,
    /// so `"py,c,"` admits `*.py`, `*.c` and files without an extension.
    pub fn parse_list(list: &str) -> Self {
        Self::new(list.split(','))
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn is_supported_extension(&self, ext: &str) -> bool {
        self.extensions.iter().any(|allowed| allowed == ext)
    }

    pub fn matches(&self, path: &str) -> bool {
        self.is_supported_extension(extension_of(path))
    }
}

/// Picks the repository files eligible for snippet analysis and makes their
/// content available locally.
pub struct FileSelector {
    filter: ExtensionFilter,
    scratch_dir: PathBuf,
}

impl FileSelector {
    /// Create a selector with the default extension allow-list
    pub fn new(scratch_dir: PathBuf) -> Self {
        Self::with_filter(scratch_dir, ExtensionFilter::default())
    }

    pub fn with_filter(scratch_dir: PathBuf, filter: ExtensionFilter) -> Self {
        Self {
            filter,
            scratch_dir,
        }
    }

    pub fn filter(&self) -> &ExtensionFilter {
        &self.filter
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Eligible paths for `mode`. Listing failures yield an empty selection.
    pub async fn select(&self, host: &dyn SourceHost, mode: SelectionMode) -> Vec<String> {
        match mode {
            SelectionMode::ChangedFiles => self.changed_files(host).await,
            SelectionMode::FullTree => self.walk_tree(host).await,
        }
    }

    async fn changed_files(&self, host: &dyn SourceHost) -> Vec<String> {
        match host.changed_files().await {
            Ok(files) => files
                .into_iter()
                .filter(|path| self.filter.matches(path))
                .collect(),
            Err(e) => {
                warn!("Failed to list changed files: {}", e);
                Vec::new()
            }
        }
    }

    async fn walk_tree(&self, host: &dyn SourceHost) -> Vec<String> {
        let mut files = Vec::new();
        let mut worklist = VecDeque::from([String::new()]);

        while let Some(dir) = worklist.pop_front() {
            let entries = match host.list_directory(&dir).await {
                Ok(entries) => entries,
                Err(e) if dir.is_empty() => {
                    warn!("Failed to list repository root: {}", e);
                    return Vec::new();
                }
                Err(e) => {
                    warn!("Failed to list directory {}: {}", dir, e);
                    continue;
                }
            };

            for entry in entries {
                match entry.kind {
                    EntryKind::Dir => worklist.push_back(entry.path),
                    EntryKind::File if self.filter.matches(&entry.path) => files.push(entry.path),
                    EntryKind::File => {}
                    EntryKind::Other => debug!("Skipping non-file entry {}", entry.path),
                }
            }
        }

        files
    }

    /// Local copy of `path` at `git_ref` under the scratch directory.
    ///
    /// An existing local file is used as is and never overwritten. Returns
    /// `None` when the host has no file at that ref (e.g. deleted in the PR).
    pub async fn materialize(
        &self,
        host: &dyn SourceHost,
        path: &str,
        git_ref: &str,
    ) -> Result<Option<PathBuf>, SnippetError> {
        let relative = safe_relative_path(path)?;
        let local = self.scratch_dir.join(relative);
        if local.is_file() {
            return Ok(Some(local));
        }

        let Some(content) = host.fetch_content(path, git_ref).await? else {
            debug!("{} is not present at {}", path, git_ref);
            return Ok(None);
        };

        if let Some(parent) = local.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&local, content)?;
        debug!("Fetched {} at {} into {}", path, git_ref, local.display());
        Ok(Some(local))
    }
}

fn safe_relative_path(path: &str) -> Result<&Path, SnippetError> {
    let relative = Path::new(path);
    let is_safe = !path.is_empty()
        && relative
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
    if is_safe {
        Ok(relative)
    } else {
        Err(SnippetError::UnsafePath(path.to_string()))
    }
}
