//! Per-run store of match results keyed by repository-relative path.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::admission::{Admission, AdmissionPolicy};
use crate::error::SnippetError;
use crate::host::{FingerprintSet, SnippetMatcher};
use crate::snippet::FileMatchResult;

/// What happened to a result handed to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Stored { snippets: usize },
    NoFindings,
    Rejected(Admission),
}

/// Mapping from scanned file path to its match result.
///
/// Serializes as a plain JSON object, which is the results-file format.
/// Keys iterate in sorted order so every formatter sees the same sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultStore {
    files: BTreeMap<String, FileMatchResult>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the admission policy, then ask `matcher` for the raw match
    /// response and record it.
    ///
    /// Fingerprint sets outside the policy never reach the matcher.
    pub async fn record_result(
        &mut self,
        policy: &AdmissionPolicy,
        path: &str,
        fingerprints: &FingerprintSet,
        matcher: &dyn SnippetMatcher,
    ) -> Result<RecordOutcome, SnippetError> {
        let admission = policy.check(fingerprints.count());
        if !admission.is_admitted() {
            return Ok(RecordOutcome::Rejected(admission));
        }
        let Some(raw_match_json) = matcher.match_snippets(fingerprints).await? else {
            return Ok(RecordOutcome::NoFindings);
        };
        let result = FileMatchResult::from_json(&raw_match_json)?;
        Ok(self.record(path, result))
    }

    /// Store a parsed result if it carries at least one snippet match.
    pub fn record(&mut self, path: &str, result: FileMatchResult) -> RecordOutcome {
        if !result.has_findings() {
            return RecordOutcome::NoFindings;
        }
        let snippets = result.snippet_count();
        self.files.insert(path.to_string(), result);
        RecordOutcome::Stored { snippets }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FileMatchResult)> {
        self.files.iter().map(|(path, result)| (path.as_str(), result))
    }

    pub fn snippet_count(&self) -> usize {
        self.files.values().map(FileMatchResult::snippet_count).sum()
    }

    pub fn to_json(&self) -> Result<String, SnippetError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, SnippetError> {
        let store: ResultStore = serde_json::from_str(json)?;
        for result in store.files.values() {
            result.validate()?;
        }
        Ok(store)
    }

    /// Write the results file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), SnippetError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Load a previously written results file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SnippetError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}
