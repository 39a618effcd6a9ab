// SPDX-License-Identifier: MIT

//! The remote package index: a line-delimited file of
//! `<name>|<url>|<sha256>` rows (comments and blank lines not supported).
//! Used to resolve `/package/install`'s `{name}` request shape and to back
//! `/package/search`'s substring query.

use inferd_core::DaemonError;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteIndexEntry {
    pub name: String,
    pub url: String,
    pub sha256: String,
}

/// Parse the line-delimited index format. Malformed lines (not exactly three
/// `|`-separated fields) are skipped rather than failing the whole fetch —
/// the format has no comment syntax, so a stray blank line is the only
/// "expected" malformed input, and skipping it is more useful than aborting.
pub fn parse(text: &str) -> Vec<RemoteIndexEntry> {
    text.lines()
        .filter_map(|line| {
            let mut parts = line.splitn(3, '|');
            let name = parts.next()?;
            let url = parts.next()?;
            let sha256 = parts.next()?;
            if name.is_empty() || url.is_empty() || sha256.is_empty() {
                return None;
            }
            Some(RemoteIndexEntry { name: name.to_string(), url: url.to_string(), sha256: sha256.to_string() })
        })
        .collect()
}

/// Fetch and parse the index at `url`. Blocking network I/O — callers run
/// this inside a worker, not on the HTTP frontend's event loop.
pub async fn fetch(client: &reqwest::Client, url: &str) -> Result<Vec<RemoteIndexEntry>, DaemonError> {
    let response = client.get(url).send().await.map_err(|e| DaemonError::ConnectionError(e.to_string()))?;
    if !response.status().is_success() {
        return Err(DaemonError::RepositoryError(format!("GET {url} returned {}", response.status())));
    }
    let body = response.text().await.map_err(|e| DaemonError::ConnectionError(e.to_string()))?;
    Ok(parse(&body))
}

/// Exact match by name, used to resolve `/package/install`'s `{name}` form.
pub fn resolve(entries: &[RemoteIndexEntry], name: &str) -> Option<RemoteIndexEntry> {
    entries.iter().find(|e| e.name == name).cloned()
}

/// Substring match over names, case-insensitive, used by `/package/search`.
pub fn search(entries: &[RemoteIndexEntry], query: &str) -> Vec<RemoteIndexEntry> {
    let query = query.to_lowercase();
    entries.iter().filter(|e| e.name.to_lowercase().contains(&query)).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pipe_delimited_rows() {
        let text = "echo|http://example.invalid/echo.zip|deadbeef\nresnet|http://example.invalid/resnet.zip|cafef00d\n";
        let entries = parse(text);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "echo");
        assert_eq!(entries[1].sha256, "cafef00d");
    }

    #[test]
    fn blank_lines_are_skipped() {
        let text = "echo|http://example.invalid/echo.zip|deadbeef\n\n";
        assert_eq!(parse(text).len(), 1);
    }

    #[test]
    fn resolve_finds_exact_name() {
        let entries = parse("echo|http://x/echo.zip|abc\n");
        assert!(resolve(&entries, "echo").is_some());
        assert!(resolve(&entries, "nope").is_none());
    }

    #[test]
    fn search_matches_substring_case_insensitively() {
        let entries = parse("ResNet50|http://x/r.zip|abc\necho|http://x/e.zip|def\n");
        let found = search(&entries, "resnet");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "ResNet50");
    }
}
