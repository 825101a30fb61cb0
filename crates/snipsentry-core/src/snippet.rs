//! Typed records for the snippet-matching response.
//!
//! The matching service answers with
//! `{snippetMatches: {<family>: [SnippetMatch, ...]}, _meta: {links: [{href}]}}`.
//! Everything is validated here so formatters never index into raw JSON.
//! Families keep the order the service sent them in, and fields this crate
//! does not model are carried through to the results file untouched.

use indexmap::IndexMap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::SnippetError;

/// Parallel line sequences describing matched blocks.
///
/// Index `i` across the four sequences describes one contiguous block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRegion {
    #[serde(default, deserialize_with = "deserialize_lines")]
    pub source_start_lines: Vec<u32>,
    #[serde(default, deserialize_with = "deserialize_lines")]
    pub source_end_lines: Vec<u32>,
    #[serde(default, deserialize_with = "deserialize_lines")]
    pub matched_start_lines: Vec<u32>,
    #[serde(default, deserialize_with = "deserialize_lines")]
    pub matched_end_lines: Vec<u32>,
}

/// One matched block: lines in the scanned file and in the origin file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionBlock {
    pub index: usize,
    pub source_start: u32,
    pub source_end: u32,
    pub matched_start: u32,
    pub matched_end: u32,
}

impl MatchRegion {
    pub fn len(&self) -> usize {
        self.source_start_lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source_start_lines.is_empty()
    }

    fn lengths(&self) -> [usize; 4] {
        [
            self.source_start_lines.len(),
            self.source_end_lines.len(),
            self.matched_start_lines.len(),
            self.matched_end_lines.len(),
        ]
    }

    pub fn is_consistent(&self) -> bool {
        let lengths = self.lengths();
        lengths.iter().all(|len| *len == lengths[0])
    }

    /// Iterate matched blocks in order. Only meaningful on a consistent region.
    pub fn blocks(&self) -> impl Iterator<Item = RegionBlock> + '_ {
        (0..self.len()).filter_map(move |index| {
            Some(RegionBlock {
                index,
                source_start: *self.source_start_lines.get(index)?,
                source_end: *self.source_end_lines.get(index)?,
                matched_start: *self.matched_start_lines.get(index)?,
                matched_end: *self.matched_end_lines.get(index)?,
            })
        })
    }

    pub fn first_block(&self) -> Option<RegionBlock> {
        self.blocks().next()
    }
}

/// Identifies a specific license text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub license_display_name: String,
}

impl LicenseDefinition {
    /// Name used in rule identifiers, falling back to the display name.
    pub fn rule_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.license_display_name,
        }
    }
}

/// One matched open-source fragment found inside a scanned file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnippetMatch {
    pub project_name: String,
    #[serde(default)]
    pub release_version: String,
    pub license_definition: LicenseDefinition,
    pub matched_file_path: String,
    #[serde(default)]
    pub regions: MatchRegion,
    /// Upstream fields such as `matchConfidencePercentage`
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaLink {
    pub href: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rel: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultMeta {
    #[serde(default, deserialize_with = "null_as_default")]
    pub links: Vec<MetaLink>,
}

/// Match result for a single scanned file, keyed by raw license family.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMatchResult {
    #[serde(
        rename = "snippetMatches",
        default,
        deserialize_with = "null_as_default"
    )]
    pub snippet_matches: IndexMap<String, Vec<SnippetMatch>>,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResultMeta>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FileMatchResult {
    /// Parse and validate a raw matching response.
    pub fn from_json(raw: &str) -> Result<Self, SnippetError> {
        let result: FileMatchResult = serde_json::from_str(raw)
            .map_err(|e| SnippetError::MalformedResponse(e.to_string()))?;
        result.validate()?;
        Ok(result)
    }

    pub fn validate(&self) -> Result<(), SnippetError> {
        for snippet in self.snippet_matches.values().flatten() {
            if !snippet.regions.is_consistent() {
                return Err(SnippetError::RegionLengthMismatch {
                    matched_file: snippet.matched_file_path.clone(),
                    lengths: snippet.regions.lengths(),
                });
            }
        }
        Ok(())
    }

    /// Documentation link taken from `_meta.links[0].href`.
    pub fn help_uri(&self) -> Option<&str> {
        self.meta
            .as_ref()
            .and_then(|meta| meta.links.first())
            .map(|link| link.href.as_str())
    }

    /// True when at least one license family has a non-empty match list.
    pub fn has_findings(&self) -> bool {
        self.snippet_matches.values().any(|matches| !matches.is_empty())
    }

    pub fn snippet_count(&self) -> usize {
        self.snippet_matches.values().map(Vec::len).sum()
    }

    /// All snippets with their raw family name, families in response order.
    pub fn snippets(&self) -> impl Iterator<Item = (&str, &SnippetMatch)> {
        self.snippet_matches
            .iter()
            .flat_map(|(family, matches)| matches.iter().map(move |m| (family.as_str(), m)))
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// Line numbers arrive as numbers or numeric strings.
fn deserialize_lines<'de, D>(deserializer: D) -> Result<Vec<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Line {
        Number(u32),
        Text(String),
    }

    let lines = Option::<Vec<Line>>::deserialize(deserializer)?.unwrap_or_default();
    lines
        .into_iter()
        .map(|line| match line {
            Line::Number(n) => Ok(n),
            Line::Text(text) => text
                .trim()
                .parse::<u32>()
                .map_err(|_| D::Error::custom(format!("invalid line number: {:?}", text))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = r#"{
        "snippetMatches": {
            "PERMISSIVE": [{
                "projectName": "left-pad",
                "releaseVersion": "1.3.0",
                "licenseDefinition": {"name": "MIT", "licenseDisplayName": "MIT License"},
                "matchedFilePath": "index.js",
                "regions": {
                    "sourceStartLines": [1, 20],
                    "sourceEndLines": [10, "25"],
                    "matchedStartLines": [3, 40],
                    "matchedEndLines": [12, 45]
                },
                "matchConfidencePercentage": 98
            }],
            "RECIPROCAL": []
        },
        "_meta": {"links": [{"rel": "help", "href": "https://example.com/docs"}]}
    }"#;

    #[test]
    fn test_parse_response() {
        let result = FileMatchResult::from_json(RESPONSE).unwrap();
        assert_eq!(result.snippet_count(), 1);
        assert!(result.has_findings());
        assert_eq!(result.help_uri(), Some("https://example.com/docs"));

        let (family, snippet) = result.snippets().next().unwrap();
        assert_eq!(family, "PERMISSIVE");
        assert_eq!(snippet.project_name, "left-pad");
        assert_eq!(snippet.regions.source_end_lines, vec![10, 25]);
        assert_eq!(snippet.license_definition.rule_name(), "MIT");
    }

    #[test]
    fn test_blocks_follow_index() {
        let result = FileMatchResult::from_json(RESPONSE).unwrap();
        let (_, snippet) = result.snippets().next().unwrap();
        let blocks: Vec<RegionBlock> = snippet.regions.blocks().collect();
        assert_eq!(blocks.len(), 2);
        assert_eq!(
            blocks[1],
            RegionBlock {
                index: 1,
                source_start: 20,
                source_end: 25,
                matched_start: 40,
                matched_end: 45,
            }
        );
    }

    #[test]
    fn test_absent_or_null_matches_mean_no_findings() {
        let absent = FileMatchResult::from_json("{}").unwrap();
        assert!(!absent.has_findings());

        let null = FileMatchResult::from_json(r#"{"snippetMatches": null}"#).unwrap();
        assert!(!null.has_findings());

        let empty_lists =
            FileMatchResult::from_json(r#"{"snippetMatches": {"PERMISSIVE": []}}"#).unwrap();
        assert!(!empty_lists.has_findings());
        assert_eq!(empty_lists.help_uri(), None);
    }

    #[test]
    fn test_region_length_mismatch_is_rejected() {
        let raw = r#"{"snippetMatches": {"UNKNOWN": [{
            "projectName": "p",
            "licenseDefinition": {"licenseDisplayName": "?"},
            "matchedFilePath": "a.c",
            "regions": {
                "sourceStartLines": [1, 2],
                "sourceEndLines": [3],
                "matchedStartLines": [1, 2],
                "matchedEndLines": [3, 4]
            }
        }]}}"#;

        match FileMatchResult::from_json(raw) {
            Err(SnippetError::RegionLengthMismatch { lengths, .. }) => {
                assert_eq!(lengths, [2, 1, 2, 2]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_wrong_shape_is_malformed() {
        let err = FileMatchResult::from_json(r#"{"snippetMatches": {"PERMISSIVE": [{"projectName": 1}]}}"#)
            .unwrap_err();
        assert!(matches!(err, SnippetError::MalformedResponse(_)));
    }

    #[test]
    fn test_rule_name_falls_back_to_display_name() {
        let license = LicenseDefinition {
            name: None,
            license_display_name: "Apache License 2.0".to_string(),
        };
        assert_eq!(license.rule_name(), "Apache License 2.0");

        let empty = LicenseDefinition {
            name: Some(String::new()),
            license_display_name: "BSD".to_string(),
        };
        assert_eq!(empty.rule_name(), "BSD");
    }

    #[test]
    fn test_family_order_is_kept() {
        let raw = r#"{"snippetMatches": {
            "UNKNOWN": [],
            "RECIPROCAL": [],
            "PERMISSIVE": []
        }}"#;
        let result = FileMatchResult::from_json(raw).unwrap();
        let families: Vec<&str> = result.snippet_matches.keys().map(String::as_str).collect();
        assert_eq!(families, vec!["UNKNOWN", "RECIPROCAL", "PERMISSIVE"]);

        let json = serde_json::to_string(&result).unwrap();
        let unknown = json.find("UNKNOWN").unwrap();
        let permissive = json.find("PERMISSIVE").unwrap();
        assert!(unknown < permissive);
    }

    #[test]
    fn test_unmodelled_fields_survive_serialization() {
        let raw = r#"{
            "snippetMatches": {"PERMISSIVE": [{
                "projectName": "left-pad",
                "licenseDefinition": {"licenseDisplayName": "MIT License"},
                "matchedFilePath": "index.js",
                "matchConfidencePercentage": 98
            }]},
            "scanId": "f00d"
        }"#;
        let result = FileMatchResult::from_json(raw).unwrap();
        let (_, snippet) = result.snippets().next().unwrap();
        assert_eq!(snippet.extra["matchConfidencePercentage"], 98);

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["scanId"], "f00d");
        assert_eq!(
            value["snippetMatches"]["PERMISSIVE"][0]["matchConfidencePercentage"],
            98
        );
    }
}
