//! Markdown rendering of snippet matches for pull-request comments.

use snipsentry_core::{FileMatchResult, LicenseFamily, SnippetMatch};

/// Prefix for license families that need a reviewer's attention.
pub const WARNING_GLYPH: &str = ":warning:";

const TABLE_HEADER: &str = "| License Family | Component | License | Match info |\n\
                            | -------------- | --------- | ------- | ---------- |\n";

/// How matches of one file are turned into comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentStyle {
    /// One table per file
    Grouped,
    /// One comment per snippet match
    Separated,
}

impl CommentStyle {
    pub fn from_group_flag(group: bool) -> Self {
        if group {
            CommentStyle::Grouped
        } else {
            CommentStyle::Separated
        }
    }
}

/// Base for links to the analysed revision of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileLink<'a> {
    pub repo_url: &'a str,
    pub commit_sha: &'a str,
}

impl<'a> FileLink<'a> {
    pub fn new(repo_url: &'a str, commit_sha: &'a str) -> Self {
        Self {
            repo_url,
            commit_sha,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/blob/{}/{}",
            self.repo_url.trim_end_matches('/'),
            self.commit_sha,
            path.trim_start_matches('/')
        )
    }
}

/// Family name, prefixed with the warning glyph when it needs action.
pub fn family_label(family: &str) -> String {
    if LicenseFamily::classify(family).requires_action() {
        format!("{}{}", WARNING_GLYPH, family)
    } else {
        family.to_string()
    }
}

/// `[1, 20]` style rendering of a line list.
pub fn format_lines(lines: &[u32]) -> String {
    let items: Vec<String> = lines.iter().map(u32::to_string).collect();
    format!("[{}]", items.join(", "))
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

fn matched_lines(snippet: &SnippetMatch) -> String {
    format!(
        "start: {}, end: {}",
        format_lines(&snippet.regions.source_start_lines),
        format_lines(&snippet.regions.source_end_lines)
    )
}

/// Render comments for one file in the requested style.
pub fn render_comments(
    style: CommentStyle,
    path: &str,
    result: &FileMatchResult,
    link: &FileLink<'_>,
) -> Vec<String> {
    match style {
        CommentStyle::Grouped => vec![render_grouped(path, result, link)],
        CommentStyle::Separated => render_separated(path, result, link),
    }
}

/// One table covering every snippet of every family in the file.
///
/// The link header and table header are always present, even with no rows.
pub fn render_grouped(path: &str, result: &FileMatchResult, link: &FileLink<'_>) -> String {
    let mut md = format!(
        "**Snippet analysis has found following matches from file: [{}]({})**\n\n",
        path,
        link.url(path)
    );
    md.push_str(TABLE_HEADER);

    for (family, snippet) in result.snippets() {
        md.push_str(&format!(
            "| {} | **Name:** {}<br>**Version:** {} | {} | **Matched file:** {}<br>**Matched lines:** {} |\n",
            escape_cell(&family_label(family)),
            escape_cell(&snippet.project_name),
            escape_cell(&snippet.release_version),
            escape_cell(&snippet.license_definition.license_display_name),
            escape_cell(&snippet.matched_file_path),
            matched_lines(snippet),
        ));
    }

    md
}

/// One free-text block per snippet match.
pub fn render_separated(
    path: &str,
    result: &FileMatchResult,
    link: &FileLink<'_>,
) -> Vec<String> {
    let file_url = link.url(path);
    result
        .snippets()
        .map(|(family, snippet)| {
            let mut md = format!(
                "**Snippet analysis has found following match from file: [{}]({})**\n\n",
                path, file_url
            );
            md.push_str(&format!("**License family:** {}  \n", family_label(family)));
            md.push_str(&snippet_fields(snippet));
            md.push_str(&format!("**Matched file:** {}  \n", snippet.matched_file_path));
            md.push_str(&format!("**Matched lines:** {}", matched_lines(snippet)));
            md
        })
        .collect()
}

/// Help text attached to a SARIF rule.
pub fn render_rule_help(family: &str, snippet: &SnippetMatch) -> String {
    let mut md = String::from("## Snippet analysis has found following match\n\n");
    md.push_str(&format!("**License family:** {}  \n", family_label(family)));
    md.push_str(&snippet_fields(snippet));
    md
}

fn snippet_fields(snippet: &SnippetMatch) -> String {
    format!(
        "**Name:** {}  \n**Version:** {}  \n**License:** {}  \n",
        snippet.project_name,
        snippet.release_version,
        snippet.license_definition.license_display_name
    )
}
