//! Per-file pipeline: fetch, fingerprint, admit, match, record.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use snipsentry_core::{
    Admission, AdmissionPolicy, Fingerprinter, RecordOutcome, ResultStore, SnippetMatcher,
    SourceHost,
};
use snipsentry_utils::FileSelector;

/// Why a file produced no result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Listed but absent at the analysed revision
    NotAvailable,
    NoFingerprints,
    /// Fingerprint count outside the admission policy
    Rejected {
        admission: Admission,
        fingerprints: usize,
    },
    Failed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotAvailable => write!(f, "not available at the analysed revision"),
            SkipReason::NoFingerprints => write!(f, "no fingerprints"),
            SkipReason::Rejected {
                admission,
                fingerprints,
            } => write!(f, "{} ({} fingerprints)", admission.describe(), fingerprints),
            SkipReason::Failed(message) => write!(f, "failed: {}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Matched { snippets: usize },
    Clean,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiagnostic {
    pub path: String,
    pub outcome: FileOutcome,
}

/// Everything a run learned: stored results plus one diagnostic per file.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub store: ResultStore,
    pub diagnostics: Vec<FileDiagnostic>,
    pub elapsed: Duration,
}

impl ScanReport {
    pub fn matched_files(&self) -> usize {
        self.count(|outcome| matches!(outcome, FileOutcome::Matched { .. }))
    }

    pub fn clean_files(&self) -> usize {
        self.count(|outcome| matches!(outcome, FileOutcome::Clean))
    }

    pub fn skipped_files(&self) -> usize {
        self.count(|outcome| matches!(outcome, FileOutcome::Skipped(_)))
    }

    pub fn failed_files(&self) -> usize {
        self.count(|outcome| matches!(outcome, FileOutcome::Skipped(SkipReason::Failed(_))))
    }

    fn count(&self, predicate: impl Fn(&FileOutcome) -> bool) -> usize {
        self.diagnostics
            .iter()
            .filter(|diagnostic| predicate(&diagnostic.outcome))
            .count()
    }
}

pub struct SnippetScanner {
    fingerprinter: Box<dyn Fingerprinter>,
    matcher: Box<dyn SnippetMatcher>,
    policy: AdmissionPolicy,
}

impl SnippetScanner {
    pub fn new(
        fingerprinter: Box<dyn Fingerprinter>,
        matcher: Box<dyn SnippetMatcher>,
        policy: AdmissionPolicy,
    ) -> Self {
        Self {
            fingerprinter,
            matcher,
            policy,
        }
    }

    /// Run every selected file through the pipeline.
    ///
    /// A failing file is logged and skipped; the run always completes.
    pub async fn scan(
        &self,
        host: &dyn SourceHost,
        selector: &FileSelector,
        files: &[String],
        git_ref: &str,
    ) -> ScanReport {
        let start = Instant::now();
        let mut report = ScanReport::default();

        for (index, path) in files.iter().enumerate() {
            debug!("[{}/{}] {}", index + 1, files.len(), path);
            let outcome = self
                .scan_file(host, selector, path, git_ref, &mut report.store)
                .await;

            match &outcome {
                FileOutcome::Matched { snippets } => {
                    info!("{}: {} snippet matches", path, snippets)
                }
                FileOutcome::Clean => debug!("{}: no snippet matches", path),
                FileOutcome::Skipped(reason @ SkipReason::Failed(_)) => {
                    warn!("Skipping {}: {}", path, reason)
                }
                FileOutcome::Skipped(reason) => info!("Skipping {}: {}", path, reason),
            }

            report.diagnostics.push(FileDiagnostic {
                path: path.clone(),
                outcome,
            });
        }

        report.elapsed = start.elapsed();
        info!(
            "Analysed {} files: {} with matches, {} clean, {} skipped ({} failed) in {:.1}s",
            files.len(),
            report.matched_files(),
            report.clean_files(),
            report.skipped_files(),
            report.failed_files(),
            report.elapsed.as_secs_f64()
        );
        report
    }

    async fn scan_file(
        &self,
        host: &dyn SourceHost,
        selector: &FileSelector,
        path: &str,
        git_ref: &str,
        store: &mut ResultStore,
    ) -> FileOutcome {
        let local = match selector.materialize(host, path, git_ref).await {
            Ok(Some(local)) => local,
            Ok(None) => return FileOutcome::Skipped(SkipReason::NotAvailable),
            Err(e) => return FileOutcome::Skipped(SkipReason::Failed(e.to_string())),
        };

        let fingerprints = match self.fingerprinter.fingerprint(&local).await {
            Ok(Some(fingerprints)) => fingerprints,
            Ok(None) => return FileOutcome::Skipped(SkipReason::NoFingerprints),
            Err(e) => return FileOutcome::Skipped(SkipReason::Failed(e.to_string())),
        };

        match store
            .record_result(&self.policy, path, &fingerprints, self.matcher.as_ref())
            .await
        {
            Ok(RecordOutcome::Stored { snippets }) => FileOutcome::Matched { snippets },
            Ok(RecordOutcome::NoFindings) => FileOutcome::Clean,
            Ok(RecordOutcome::Rejected(admission)) => FileOutcome::Skipped(SkipReason::Rejected {
                admission,
                fingerprints: fingerprints.count(),
            }),
            Err(e) => FileOutcome::Skipped(SkipReason::Failed(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use snipsentry_core::{CheckRunRequest, FingerprintSet, RepoEntry, SnippetError};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    struct MapHost {
        files: HashMap<String, String>,
    }

    #[async_trait]
    impl SourceHost for MapHost {
        async fn changed_files(&self) -> Result<Vec<String>, SnippetError> {
            Ok(self.files.keys().cloned().collect())
        }

        async fn list_directory(&self, _path: &str) -> Result<Vec<RepoEntry>, SnippetError> {
            Ok(Vec::new())
        }

        async fn fetch_content(
            &self,
            path: &str,
            _git_ref: &str,
        ) -> Result<Option<Vec<u8>>, SnippetError> {
            Ok(self.files.get(path).map(|content| content.as_bytes().to_vec()))
        }

        async fn create_issue_comment(&self, _body: &str) -> Result<(), SnippetError> {
            Ok(())
        }

        async fn create_check_run(&self, _check: &CheckRunRequest) -> Result<(), SnippetError> {
            Ok(())
        }
    }

    /// One fingerprint per line of the file; `boom` in the file fails.
    struct LineFingerprinter;

    #[async_trait]
    impl Fingerprinter for LineFingerprinter {
        async fn fingerprint(&self, path: &Path) -> Result<Option<FingerprintSet>, SnippetError> {
            let content = std::fs::read_to_string(path)?;
            if content.contains("boom") {
                return Err(SnippetError::collaborator("fingerprint extractor", "crashed"));
            }
            if content.is_empty() {
                return Ok(None);
            }
            let prints: Vec<usize> = (0..content.lines().count()).collect();
            Ok(FingerprintSet::from_value(
                serde_json::json!({ "fingerprints": prints }),
            ))
        }
    }

    /// Even fingerprint counts match, odd ones come back empty.
    struct ParityMatcher;

    #[async_trait]
    impl SnippetMatcher for ParityMatcher {
        async fn match_snippets(
            &self,
            fingerprints: &FingerprintSet,
        ) -> Result<Option<String>, SnippetError> {
            if fingerprints.count() % 2 == 1 {
                return Ok(None);
            }
            Ok(Some(
                r#"{"snippetMatches": {"RECIPROCAL": [{
                    "projectName": "readline",
                    "releaseVersion": "8.2",
                    "licenseDefinition": {"name": "GPL-3.0", "licenseDisplayName": "GNU GPL v3"},
                    "matchedFilePath": "lib/readline.c",
                    "regions": {"sourceStartLines": [1], "sourceEndLines": [8],
                                "matchedStartLines": [40], "matchedEndLines": [47]}
                }]}}"#
                    .to_string(),
            ))
        }
    }

    fn lines(count: usize) -> String {
        (0..count).map(|i| format!("line {}\n", i)).collect()
    }

    fn outcome_of<'a>(report: &'a ScanReport, path: &str) -> &'a FileOutcome {
        &report
            .diagnostics
            .iter()
            .find(|diagnostic| diagnostic.path == path)
            .unwrap()
            .outcome
    }

    #[tokio::test]
    async fn test_scan_records_and_skips() {
        let scratch = tempfile::tempdir().unwrap();
        let mut files = HashMap::new();
        files.insert("src/match.c".to_string(), lines(10));
        files.insert("src/clean.c".to_string(), lines(11));
        files.insert("src/tiny.c".to_string(), lines(7));
        files.insert("src/huge.c".to_string(), lines(3501));
        files.insert("src/crash.c".to_string(), format!("{}boom\n", lines(9)));
        files.insert("src/empty.c".to_string(), String::new());
        let host = MapHost { files };

        let selector = FileSelector::new(PathBuf::from(scratch.path()));
        let scanner = SnippetScanner::new(
            Box::new(LineFingerprinter),
            Box::new(ParityMatcher),
            AdmissionPolicy::default(),
        );

        let paths: Vec<String> = vec![
            "src/match.c",
            "src/clean.c",
            "src/tiny.c",
            "src/huge.c",
            "src/crash.c",
            "src/empty.c",
            "src/gone.c",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        let report = scanner.scan(&host, &selector, &paths, "abc123").await;

        assert_eq!(report.diagnostics.len(), 7);
        assert_eq!(
            outcome_of(&report, "src/match.c"),
            &FileOutcome::Matched { snippets: 1 }
        );
        assert_eq!(outcome_of(&report, "src/clean.c"), &FileOutcome::Clean);
        assert_eq!(
            outcome_of(&report, "src/tiny.c"),
            &FileOutcome::Skipped(SkipReason::Rejected {
                admission: Admission::TooSmall,
                fingerprints: 7
            })
        );
        assert_eq!(
            outcome_of(&report, "src/huge.c"),
            &FileOutcome::Skipped(SkipReason::Rejected {
                admission: Admission::TooBig,
                fingerprints: 3501
            })
        );
        assert!(matches!(
            outcome_of(&report, "src/crash.c"),
            FileOutcome::Skipped(SkipReason::Failed(_))
        ));
        assert_eq!(
            outcome_of(&report, "src/empty.c"),
            &FileOutcome::Skipped(SkipReason::NoFingerprints)
        );
        assert_eq!(
            outcome_of(&report, "src/gone.c"),
            &FileOutcome::Skipped(SkipReason::NotAvailable)
        );

        assert_eq!(report.store.len(), 1);
        assert!(report.store.contains("src/match.c"));
        assert_eq!(report.matched_files(), 1);
        assert_eq!(report.clean_files(), 1);
        assert_eq!(report.skipped_files(), 5);
        assert_eq!(report.failed_files(), 1);
    }

    #[tokio::test]
    async fn test_admission_bounds_are_inclusive() {
        let scratch = tempfile::tempdir().unwrap();
        let mut files = HashMap::new();
        files.insert("min.py".to_string(), lines(8));
        files.insert("max.py".to_string(), lines(3500));
        let host = MapHost { files };

        let selector = FileSelector::new(PathBuf::from(scratch.path()));
        let scanner = SnippetScanner::new(
            Box::new(LineFingerprinter),
            Box::new(ParityMatcher),
            AdmissionPolicy::default(),
        );
        let paths = vec!["min.py".to_string(), "max.py".to_string()];

        let report = scanner.scan(&host, &selector, &paths, "abc123").await;
        assert_eq!(report.store.len(), 2);
        assert_eq!(report.skipped_files(), 0);
    }

    /// Answers with a body the store cannot parse.
    struct GarbageMatcher;

    #[async_trait]
    impl SnippetMatcher for GarbageMatcher {
        async fn match_snippets(
            &self,
            _fingerprints: &FingerprintSet,
        ) -> Result<Option<String>, SnippetError> {
            Ok(Some("<html>502 Bad Gateway</html>".to_string()))
        }
    }

    #[tokio::test]
    async fn test_malformed_match_response_fails_the_file() {
        let scratch = tempfile::tempdir().unwrap();
        let mut files = HashMap::new();
        files.insert("src/a.c".to_string(), lines(10));
        files.insert("src/b.c".to_string(), lines(3));
        let host = MapHost { files };

        let selector = FileSelector::new(PathBuf::from(scratch.path()));
        let scanner = SnippetScanner::new(
            Box::new(LineFingerprinter),
            Box::new(GarbageMatcher),
            AdmissionPolicy::default(),
        );
        let paths = vec!["src/a.c".to_string(), "src/b.c".to_string()];

        let report = scanner.scan(&host, &selector, &paths, "abc123").await;
        assert!(report.store.is_empty());
        assert!(matches!(
            outcome_of(&report, "src/a.c"),
            FileOutcome::Skipped(SkipReason::Failed(_))
        ));
        // Rejected before the matcher is consulted
        assert!(matches!(
            outcome_of(&report, "src/b.c"),
            FileOutcome::Skipped(SkipReason::Rejected { .. })
        ));
    }

    #[test]
    fn test_skip_reason_display() {
        assert_eq!(
            SkipReason::Rejected {
                admission: Admission::TooSmall,
                fingerprints: 3
            }
            .to_string(),
            format!("{} (3 fingerprints)", Admission::TooSmall.describe())
        );
        assert_eq!(SkipReason::Failed("x".to_string()).to_string(), "failed: x");
    }
}
