// src/core/normalizer/mod.rs

//! Report normalizers: one pure function per tool, turning raw tool output
//! into [`NormalizedReport`](crate::core::models::NormalizedReport)s.
//!
//! Every normalizer follows the same rules. An empty report is an error, not
//! "no findings". Individually malformed records are skipped and counted while
//! every well-formed record is kept. Severity, evidence and location are
//! mapped onto the shared model here, never in the adapters.

pub mod nikto;
pub mod nuclei;
pub mod zap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static BLOCK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</?(?:p|br|li|ul|ol|div)\b[^>]*>").unwrap());
static MARKUP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static LINK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"https?://[^\s<>"']+"#).unwrap());
static CWE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(?:cwe-)?(\d+)$").unwrap());

/// Reads a scalar JSON value as a trimmed, non-empty string.
pub(crate) fn scalar_string(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Drops HTML tags (ZAP wraps most prose in `<p>`), keeping one line per block.
pub(crate) fn strip_markup(text: &str) -> String {
    let blocks = BLOCK_RE.replace_all(text, "\n");
    MARKUP_RE
        .replace_all(&blocks, "")
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Pulls every http(s) link out of free text, in order and without duplicates.
pub(crate) fn extract_links(text: &str) -> Vec<String> {
    let mut links: Vec<String> = Vec::new();
    for found in LINK_RE.find_iter(text) {
        let link = found.as_str().trim_end_matches(['.', ',', ';', ')']).to_string();
        if !links.contains(&link) {
            links.push(link);
        }
    }
    links
}

/// Accepts `"CWE-79"`, `"79"`, `79` or an array of those. Non-positive ids
/// (ZAP uses `-1` and `0` for "none") are dropped.
pub(crate) fn cwe_ids(value: Option<&Value>) -> Vec<u32> {
    let mut ids: Vec<u32> = Vec::new();
    let mut push = |raw: &Value| {
        let id = match raw {
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            Value::String(s) => CWE_RE
                .captures(s.trim())
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse().ok()),
            _ => None,
        };
        if let Some(id) = id.filter(|id| *id > 0) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    };
    match value {
        Some(Value::Array(items)) => items.iter().for_each(&mut push),
        Some(other) => push(other),
        None => {}
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn markup_is_stripped_per_block() {
        assert_eq!(strip_markup("<p>First line.</p><p>Second <b>line</b>.</p>"), "First line.\nSecond line.");
        assert_eq!(strip_markup("plain"), "plain");
    }

    #[test]
    fn links_are_extracted_once() {
        let links = extract_links("<p>https://owasp.org/a</p><p>see https://owasp.org/a, and http://cwe.mitre.org/79.</p>");
        assert_eq!(links, vec!["https://owasp.org/a", "http://cwe.mitre.org/79"]);
    }

    #[test]
    fn cwe_ids_accept_mixed_forms() {
        assert_eq!(cwe_ids(Some(&json!(["cwe-79", "CWE-89", "cwe-79", "n/a"]))), vec![79, 89]);
        assert_eq!(cwe_ids(Some(&json!("693"))), vec![693]);
        assert_eq!(cwe_ids(Some(&json!(-1))), Vec::<u32>::new());
        assert_eq!(cwe_ids(None), Vec::<u32>::new());
    }
}
