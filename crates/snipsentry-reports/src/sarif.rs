use anyhow::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use snipsentry_core::{LicenseFamily, RegionBlock, ResultStore, SnippetMatch};

use crate::markdown::render_rule_help;

/// SARIF (Static Analysis Results Interchange Format) v2.1.0 implementation
/// Spec: https://docs.oasis-open.org/sarif/sarif/v2.1.0/sarif-v2.1.0.html
const SARIF_SCHEMA: &str =
    "https://raw.githubusercontent.com/oasis-tcs/sarif-spec/master/Schemata/sarif-schema-2.1.0.json";
const SARIF_VERSION: &str = "2.1.0";

const RULE_NAME: &str = "Snippet Match";
const LICENSE_TAGS: [&str; 2] = ["LICENSE_VIOLATION", "security"];

#[derive(Debug, Serialize, Deserialize)]
pub struct SarifReport {
    #[serde(rename = "$schema")]
    pub schema: String,
    pub version: String,
    pub runs: Vec<SarifRun>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SarifRun {
    pub results: Vec<SarifResult>,
    pub tool: SarifTool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SarifTool {
    pub driver: SarifDriver,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifDriver {
    pub name: String,
    pub information_uri: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    pub rules: Vec<SarifRule>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifRule {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help_uri: Option<String>,
    pub short_description: SarifMessage,
    pub full_description: SarifMessage,
    pub help: SarifMessage,
    pub properties: SarifRuleProperties,
    pub default_configuration: SarifConfiguration,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SarifRuleProperties {
    #[serde(rename = "security-severity")]
    pub security_severity: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SarifConfiguration {
    pub level: SarifLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SarifLevel {
    Error,
    Note,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SarifMessage {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
}

impl SarifMessage {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markdown: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifResult {
    pub rule_id: String,
    pub rule_index: usize,
    pub level: SarifLevel,
    pub message: SarifMessage,
    pub locations: Vec<SarifLocation>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub partial_fingerprints: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub code_flows: Vec<SarifCodeFlow>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifLocation {
    pub physical_location: SarifPhysicalLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<SarifMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifPhysicalLocation {
    pub artifact_location: SarifArtifactLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<SarifRegion>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SarifArtifactLocation {
    pub uri: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifRegion {
    pub start_line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifCodeFlow {
    pub thread_flows: Vec<SarifThreadFlow>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SarifThreadFlow {
    pub locations: Vec<SarifThreadFlowLocation>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SarifThreadFlowLocation {
    pub location: SarifLocation,
}

/// Identity of the tool written into `runs[0].tool.driver`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SarifToolInfo {
    pub name: String,
    pub version: String,
    pub information_uri: Option<String>,
    pub organization: Option<String>,
}

impl Default for SarifToolInfo {
    fn default() -> Self {
        Self {
            name: "Black Duck Snippet Analysis".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            information_uri: None,
            organization: Some("Black Duck".to_string()),
        }
    }
}

impl SarifReport {
    /// Build a SARIF report with one result per snippet match.
    ///
    /// Rules are deduplicated on `License/<license>/<family>` in first-seen
    /// order while walking files, families and snippets in store order.
    pub fn from_store(store: &ResultStore, tool: &SarifToolInfo) -> Self {
        let mut rules = Vec::new();
        let mut results = Vec::new();
        let mut rule_map: HashMap<String, usize> = HashMap::new();

        for (file_path, file_result) in store.iter() {
            for (family, snippet) in file_result.snippets() {
                let rule_id = rule_id_for(family, snippet);
                let rule_index = match rule_map.get(&rule_id) {
                    Some(index) => *index,
                    None => {
                        let index = rules.len();
                        rule_map.insert(rule_id.clone(), index);
                        rules.push(create_rule(&rule_id, family, snippet, file_result.help_uri()));
                        index
                    }
                };

                results.push(create_result(file_path, family, snippet, rule_id, rule_index));
            }
        }

        SarifReport {
            schema: SARIF_SCHEMA.to_string(),
            version: SARIF_VERSION.to_string(),
            runs: vec![SarifRun {
                results,
                tool: SarifTool {
                    driver: SarifDriver {
                        name: tool.name.clone(),
                        information_uri: tool.information_uri.clone().unwrap_or_default(),
                        version: tool.version.clone(),
                        organization: tool.organization.clone(),
                        rules,
                    },
                },
            }],
        }
    }

    /// Export SARIF report to JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Save SARIF report to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load SARIF report from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Load SARIF report from JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let report: SarifReport = serde_json::from_str(json)?;
        Ok(report)
    }

    pub fn rules(&self) -> &[SarifRule] {
        self.runs
            .first()
            .map(|run| run.tool.driver.rules.as_slice())
            .unwrap_or_default()
    }

    pub fn results(&self) -> &[SarifResult] {
        self.runs
            .first()
            .map(|run| run.results.as_slice())
            .unwrap_or_default()
    }
}

pub fn rule_id_for(family: &str, snippet: &SnippetMatch) -> String {
    format!(
        "License/{}/{}",
        snippet.license_definition.rule_name(),
        family
    )
}

/// Default configuration level for a raw license family.
pub fn family_level(family: &str) -> SarifLevel {
    match LicenseFamily::classify(family) {
        LicenseFamily::Reciprocal | LicenseFamily::Unknown => SarifLevel::Error,
        LicenseFamily::Permissive | LicenseFamily::Other => SarifLevel::Note,
    }
}

/// `security-severity` score for a raw license family.
pub fn family_security_severity(family: &str) -> &'static str {
    match LicenseFamily::classify(family) {
        LicenseFamily::Reciprocal => "9.1",
        LicenseFamily::Unknown => "6.8",
        LicenseFamily::Permissive => "1.0",
        LicenseFamily::Other => "0.0",
    }
}

fn create_rule(
    rule_id: &str,
    family: &str,
    snippet: &SnippetMatch,
    help_uri: Option<&str>,
) -> SarifRule {
    let license = &snippet.license_definition;
    let license_name = license.rule_name().to_string();

    SarifRule {
        id: rule_id.to_string(),
        name: RULE_NAME.to_string(),
        help_uri: help_uri.map(str::to_string),
        short_description: SarifMessage::text(license.license_display_name.clone()),
        full_description: SarifMessage {
            text: license_name.clone(),
            markdown: Some(license_name.clone()),
        },
        help: SarifMessage {
            text: license_name,
            markdown: Some(render_rule_help(family, snippet)),
        },
        properties: SarifRuleProperties {
            security_severity: family_security_severity(family).to_string(),
            tags: LICENSE_TAGS.iter().map(|tag| tag.to_string()).collect(),
        },
        default_configuration: SarifConfiguration {
            level: family_level(family),
        },
    }
}

fn create_result(
    file_path: &str,
    family: &str,
    snippet: &SnippetMatch,
    rule_id: String,
    rule_index: usize,
) -> SarifResult {
    let first = snippet.regions.first_block();
    let primary_region = SarifRegion {
        start_line: first.map(|block| block.source_start).unwrap_or(1),
        end_line: first.map(|block| block.source_end),
    };

    let flow_locations: Vec<SarifThreadFlowLocation> = snippet
        .regions
        .blocks()
        .map(|block| SarifThreadFlowLocation {
            location: SarifLocation {
                physical_location: physical_location(
                    file_path,
                    SarifRegion {
                        start_line: block.source_start,
                        end_line: Some(block.source_end),
                    },
                ),
                message: Some(SarifMessage::text(match_message(snippet, Some(&block)))),
            },
        })
        .collect();

    let code_flows = if flow_locations.is_empty() {
        Vec::new()
    } else {
        vec![SarifCodeFlow {
            thread_flows: vec![SarifThreadFlow {
                locations: flow_locations,
            }],
        }]
    };

    let mut partial_fingerprints = BTreeMap::new();
    partial_fingerprints.insert(
        "primaryLocationLineHash".to_string(),
        location_hash(file_path, snippet, primary_region.start_line),
    );

    SarifResult {
        rule_id,
        rule_index,
        level: family_level(family),
        message: SarifMessage::text(match_message(snippet, None)),
        locations: vec![SarifLocation {
            physical_location: physical_location(file_path, primary_region),
            message: Some(SarifMessage::text("Snippet match found.")),
        }],
        partial_fingerprints,
        code_flows,
    }
}

fn physical_location(file_path: &str, region: SarifRegion) -> SarifPhysicalLocation {
    SarifPhysicalLocation {
        artifact_location: SarifArtifactLocation {
            uri: file_path.to_string(),
        },
        region: Some(region),
    }
}

fn match_message(snippet: &SnippetMatch, block: Option<&RegionBlock>) -> String {
    let mut message = String::from("Snippet match found.\n");
    message.push_str(&format!("Matched OSS Library: {}\n", snippet.project_name));
    message.push_str(&format!(
        "Matched OSS Library version: {}\n",
        snippet.release_version
    ));
    message.push_str(&format!(
        "Matched OSS Library License: {}\n",
        snippet.license_definition.license_display_name
    ));
    message.push_str(&format!("Matched file: {}\n", snippet.matched_file_path));
    if let Some(block) = block {
        message.push_str(&format!(
            "Matched lines in OSS file: start: {}, end: {}",
            block.matched_start, block.matched_end
        ));
    }
    message
}

fn location_hash(file_path: &str, snippet: &SnippetMatch, start_line: u32) -> String {
    let input = format!(
        "{}{}:{}:{}",
        snippet.license_definition.rule_name(),
        file_path,
        snippet.matched_file_path,
        start_line
    );
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use snipsentry_core::FileMatchResult;
    use tempfile::tempdir;

    fn snippet_json(project: &str, license: &str, starts: &str, ends: &str) -> String {
        format!(
            r#"{{
                "projectName": "{project}",
                "releaseVersion": "1.0",
                "licenseDefinition": {{"name": "{license}", "licenseDisplayName": "{license} display"}},
                "matchedFilePath": "upstream/{project}.c",
                "regions": {{
                    "sourceStartLines": {starts},
                    "sourceEndLines": {ends},
                    "matchedStartLines": {starts},
                    "matchedEndLines": {ends}
                }}
            }}"#
        )
    }

    fn file_result(families: &[(&str, Vec<String>)]) -> FileMatchResult {
        let body: Vec<String> = families
            .iter()
            .map(|(family, snippets)| format!("\"{}\": [{}]", family, snippets.join(",")))
            .collect();
        FileMatchResult::from_json(&format!(
            r#"{{"snippetMatches": {{{}}}, "_meta": {{"links": [{{"href": "https://bd.example.com/help"}}]}}}}"#,
            body.join(",")
        ))
        .unwrap()
    }

    fn single_store() -> ResultStore {
        let mut store = ResultStore::new();
        store.record(
            "a.py",
            file_result(&[("PERMISSIVE", vec![snippet_json("six", "MIT", "[3]", "[9]")])]),
        );
        store
    }

    #[test]
    fn test_sarif_report_creation() {
        let sarif = SarifReport::from_store(&single_store(), &SarifToolInfo::default());

        assert_eq!(sarif.version, "2.1.0");
        assert_eq!(sarif.runs.len(), 1);
        assert_eq!(sarif.rules().len(), 1);
        assert_eq!(sarif.results().len(), 1);

        let rule = &sarif.rules()[0];
        assert_eq!(rule.id, "License/MIT/PERMISSIVE");
        assert_eq!(rule.default_configuration.level, SarifLevel::Note);
        assert_eq!(rule.properties.security_severity, "1.0");
        assert_eq!(rule.properties.tags, vec!["LICENSE_VIOLATION", "security"]);
        assert_eq!(rule.help_uri.as_deref(), Some("https://bd.example.com/help"));
        assert_eq!(rule.short_description.text, "MIT display");

        let result = &sarif.results()[0];
        assert_eq!(result.rule_id, "License/MIT/PERMISSIVE");
        assert_eq!(result.rule_index, 0);
        let region = result.locations[0].physical_location.region.as_ref().unwrap();
        assert_eq!(region.start_line, 3);
        assert_eq!(region.end_line, Some(9));
        assert!(result.partial_fingerprints.contains_key("primaryLocationLineHash"));
    }

    #[test]
    fn test_rules_are_deduplicated_across_files() {
        let mut store = ResultStore::new();
        for path in ["a.c", "b.c", "c.c"] {
            store.record(
                path,
                file_result(&[
                    (
                        "RECIPROCAL",
                        vec![
                            snippet_json("readline", "GPL-3.0", "[1]", "[5]"),
                            snippet_json("bash", "GPL-3.0", "[10]", "[20]"),
                        ],
                    ),
                    ("PERMISSIVE", vec![snippet_json("zlib", "Zlib", "[30]", "[40]")]),
                ]),
            );
        }

        let sarif = SarifReport::from_store(&store, &SarifToolInfo::default());
        let rule_ids: Vec<&str> = sarif.rules().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(rule_ids, vec!["License/GPL-3.0/RECIPROCAL", "License/Zlib/PERMISSIVE"]);
        assert_eq!(sarif.results().len(), 9);

        for result in sarif.results() {
            assert_eq!(sarif.rules()[result.rule_index].id, result.rule_id);
        }
    }

    #[test]
    fn test_primary_location_uses_scanned_file_lines() {
        let mut store = ResultStore::new();
        store.record(
            "src/crc.c",
            FileMatchResult::from_json(
                r#"{"snippetMatches": {"PERMISSIVE": [{
                    "projectName": "zlib",
                    "releaseVersion": "1.3",
                    "licenseDefinition": {"name": "Zlib", "licenseDisplayName": "zlib License"},
                    "matchedFilePath": "crc32.c",
                    "regions": {
                        "sourceStartLines": [12, 80],
                        "sourceEndLines": [30, 95],
                        "matchedStartLines": [410, 700],
                        "matchedEndLines": [428, 715]
                    }
                }]}}"#,
            )
            .unwrap(),
        );

        let sarif = SarifReport::from_store(&store, &SarifToolInfo::default());
        let result = &sarif.results()[0];
        let region = result.locations[0].physical_location.region.as_ref().unwrap();
        assert_eq!(region.start_line, 12);
        assert_eq!(region.end_line, Some(30));

        // Origin lines only appear in the step messages
        let steps = &result.code_flows[0].thread_flows[0].locations;
        let second = &steps[1].location;
        assert_eq!(second.physical_location.region.as_ref().unwrap().start_line, 80);
        assert!(second
            .message
            .as_ref()
            .unwrap()
            .text
            .contains("Matched lines in OSS file: start: 700, end: 715"));
    }

    #[test]
    fn test_results_follow_service_family_order() {
        let mut store = ResultStore::new();
        store.record(
            "a.c",
            file_result(&[
                ("UNKNOWN", vec![snippet_json("u", "Unknown", "[1]", "[2]")]),
                ("PERMISSIVE", vec![snippet_json("p", "MIT", "[3]", "[4]")]),
                ("RECIPROCAL", vec![snippet_json("r", "GPL-2.0", "[5]", "[6]")]),
            ]),
        );
        let sarif = SarifReport::from_store(&store, &SarifToolInfo::default());
        let rule_ids: Vec<&str> = sarif.results().iter().map(|r| r.rule_id.as_str()).collect();
        assert_eq!(
            rule_ids,
            vec![
                "License/Unknown/UNKNOWN",
                "License/MIT/PERMISSIVE",
                "License/GPL-2.0/RECIPROCAL"
            ]
        );
    }

    #[test]
    fn test_same_license_in_different_families_gets_two_rules() {
        let mut store = ResultStore::new();
        store.record(
            "a.js",
            file_result(&[
                ("PERMISSIVE", vec![snippet_json("x", "MIT", "[1]", "[2]")]),
                ("UNKNOWN", vec![snippet_json("y", "MIT", "[3]", "[4]")]),
            ]),
        );
        let sarif = SarifReport::from_store(&store, &SarifToolInfo::default());
        assert_eq!(sarif.rules().len(), 2);
    }

    #[test]
    fn test_severity_mapping() {
        assert_eq!(family_level("RECIPROCAL_LICENSE"), SarifLevel::Error);
        assert_eq!(family_security_severity("RECIPROCAL_LICENSE"), "9.1");
        assert_eq!(family_level("UNKNOWN"), SarifLevel::Error);
        assert_eq!(family_security_severity("UNKNOWN"), "6.8");
        assert_eq!(family_level("PERMISSIVE"), SarifLevel::Note);
        assert_eq!(family_security_severity("PERMISSIVE"), "1.0");
        assert_eq!(family_level("MIDDLE_GROUND"), SarifLevel::Note);
        assert_eq!(family_security_severity("MIDDLE_GROUND"), "0.0");
    }

    #[test]
    fn test_code_flows_cover_every_block() {
        let mut store = ResultStore::new();
        store.record(
            "src/lib.go",
            file_result(&[("UNKNOWN", vec![snippet_json("x", "Unknown", "[5, 50, 500]", "[9, 90, 900]")])]),
        );
        let sarif = SarifReport::from_store(&store, &SarifToolInfo::default());
        let result = &sarif.results()[0];
        let steps = &result.code_flows[0].thread_flows[0].locations;
        assert_eq!(steps.len(), 3);

        let first = steps[0].location.message.as_ref().unwrap();
        assert!(first.text.contains("Matched lines in OSS file: start: 5, end: 9"));
        let last = &steps[2].location;
        assert_eq!(last.physical_location.region.as_ref().unwrap().start_line, 500);
        assert!(last
            .message
            .as_ref()
            .unwrap()
            .text
            .contains("Matched lines in OSS file: start: 500, end: 900"));
    }

    #[test]
    fn test_snippet_without_regions() {
        let mut store = ResultStore::new();
        store.record(
            "a.h",
            file_result(&[("PERMISSIVE", vec![snippet_json("x", "MIT", "[]", "[]")])]),
        );
        let sarif = SarifReport::from_store(&store, &SarifToolInfo::default());
        let result = &sarif.results()[0];
        assert!(result.code_flows.is_empty());
        let region = result.locations[0].physical_location.region.as_ref().unwrap();
        assert_eq!(region.start_line, 1);
        assert_eq!(region.end_line, None);
    }

    #[test]
    fn test_output_is_deterministic() {
        let mut store = ResultStore::new();
        store.record(
            "b.py",
            file_result(&[("RECIPROCAL", vec![snippet_json("x", "GPL-2.0", "[1]", "[2]")])]),
        );
        store.record(
            "a.py",
            file_result(&[("PERMISSIVE", vec![snippet_json("y", "MIT", "[1]", "[2]")])]),
        );
        let tool = SarifToolInfo::default();
        let first = SarifReport::from_store(&store, &tool).to_json().unwrap();
        let second = SarifReport::from_store(&store, &tool).to_json().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_sarif_serialization() {
        let tool = SarifToolInfo {
            information_uri: Some("https://bd.example.com".to_string()),
            ..SarifToolInfo::default()
        };
        let json = SarifReport::from_store(&single_store(), &tool).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["$schema"], SARIF_SCHEMA);
        assert_eq!(value["version"], "2.1.0");
        let driver = &value["runs"][0]["tool"]["driver"];
        assert_eq!(driver["informationUri"], "https://bd.example.com");
        assert_eq!(driver["organization"], "Black Duck");
        assert_eq!(driver["rules"][0]["properties"]["security-severity"], "1.0");
        assert_eq!(driver["rules"][0]["defaultConfiguration"]["level"], "note");
        assert_eq!(value["runs"][0]["results"][0]["ruleId"], "License/MIT/PERMISSIVE");
        assert!(value["runs"][0]["results"][0]["codeFlows"][0]["threadFlows"].is_array());
    }

    #[test]
    fn test_empty_store() {
        let sarif = SarifReport::from_store(&ResultStore::new(), &SarifToolInfo::default());
        assert!(sarif.rules().is_empty());
        assert!(sarif.results().is_empty());
        assert_eq!(sarif.runs[0].tool.driver.information_uri, "");
    }

    #[test]
    fn test_sarif_file_round_trip() {
        let dir = tempdir().unwrap();
        let sarif_path = dir.path().join("snippets.sarif.json");

        let original = SarifReport::from_store(&single_store(), &SarifToolInfo::default());
        original.save_to_file(&sarif_path).unwrap();

        let loaded = SarifReport::from_file(&sarif_path).unwrap();
        assert_eq!(loaded.version, "2.1.0");
        assert_eq!(loaded.rules().len(), 1);
        assert_eq!(loaded.results()[0].rule_id, "License/MIT/PERMISSIVE");
    }
}
