//! Repository-wide summary posted as a check run or written to a file.

use snipsentry_core::ResultStore;

use crate::markdown::{render_grouped, FileLink};

pub const SUMMARY_HEADING: &str = "# Black Duck Snippet Analysis";

/// GitHub rejects check-run summaries longer than this many characters.
pub const CHECK_RUN_SUMMARY_LIMIT: usize = 65_535;

const TRUNCATION_NOTICE: &str =
    "\n\n_Summary truncated. See the full results file for every match._\n";

/// Concatenate one grouped table per file under a fixed heading.
pub fn to_summary_markdown(store: &ResultStore, link: &FileLink<'_>) -> String {
    let mut md = format!("{}\n\n", SUMMARY_HEADING);

    if store.is_empty() {
        md.push_str("No snippet matches found.\n");
        return md;
    }

    md.push_str(&format!(
        "Found {} snippet matches in {} files at commit `{}`.\n\n",
        store.snippet_count(),
        store.len(),
        link.commit_sha
    ));

    for (path, result) in store.iter() {
        md.push_str(&render_grouped(path, result, link));
        md.push('\n');
    }

    md
}

/// Cut `markdown` to at most `limit` characters, ending with a notice.
pub fn truncate_markdown(markdown: &str, limit: usize) -> String {
    if markdown.chars().count() <= limit {
        return markdown.to_string();
    }
    let keep = limit.saturating_sub(TRUNCATION_NOTICE.chars().count());
    let mut truncated: String = markdown.chars().take(keep).collect();
    truncated.push_str(TRUNCATION_NOTICE);
    truncated
}
