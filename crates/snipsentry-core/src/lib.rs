//! Core types and traits for the snipsentry snippet scanner.
//!
//! This crate provides the pieces every other component shares:
//! - Typed snippet-match records (`SnippetMatch`, `MatchRegion`, ...)
//! - License family classification (`LicenseFamily`)
//! - The fingerprint admission policy
//! - The per-run `ResultStore`
//! - Collaborator traits for the source host, fingerprinter and matcher

mod admission;
mod error;
mod family;
mod host;
mod snippet;
mod store;

pub use admission::{Admission, AdmissionPolicy, MAX_FINGERPRINTS, MIN_FINGERPRINTS};
pub use error::SnippetError;
pub use family::LicenseFamily;
pub use host::{
    CheckConclusion, CheckRunRequest, EntryKind, FingerprintSet, Fingerprinter, RepoEntry,
    SnippetMatcher, SourceHost,
};
pub use snippet::{
    FileMatchResult, LicenseDefinition, MatchRegion, MetaLink, RegionBlock, ResultMeta,
    SnippetMatch,
};
pub use store::{RecordOutcome, ResultStore};
