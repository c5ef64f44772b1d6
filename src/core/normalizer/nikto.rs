// src/core/normalizer/nikto.rs

use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::Url;

use super::{extract_links, scalar_string};
use crate::core::error::ReportParseError;
use crate::core::models::{Evidence, Location, NormalizedReport, NormalizedVulnerability, Severity, TargetUpdates};

/// Normalizes Nikto's `-Format json` output. Depending on the Nikto version
/// the document is a single host object or a list of them.
///
/// Objects with neither `host` nor `vulnerabilities` are not host entries.
/// Nikto reports no severity, so every finding is `info`.
pub fn parse_report(raw: &str) -> Result<NormalizedReport, ReportParseError> {
    if raw.trim().is_empty() {
        return Err(ReportParseError::Empty);
    }

    let document: Value = serde_json::from_str(raw)?;
    let hosts: Vec<&Map<String, Value>> = match &document {
        Value::Object(host) => vec![host],
        Value::Array(items) => items.iter().filter_map(Value::as_object).collect(),
        _ => Vec::new(),
    };
    let hosts: Vec<&Map<String, Value>> = hosts
        .into_iter()
        .filter(|host| host.contains_key("host") || host.contains_key("vulnerabilities"))
        .collect();
    if hosts.is_empty() {
        return Err(ReportParseError::UnexpectedShape("no host entries in report".to_string()));
    }

    let mut report = NormalizedReport {
        target_updates: hosts.first().map(|host| host_target(host)),
        ..Default::default()
    };

    for host in hosts {
        let base = base_url(host);
        let Some(entries) = host.get("vulnerabilities").and_then(Value::as_array) else {
            continue;
        };
        for entry in entries {
            match normalize_entry(entry, base.as_ref()) {
                Some(vulnerability) => report.vulnerabilities.push(vulnerability),
                None => {
                    warn!("Skipping malformed Nikto vulnerability entry.");
                    report.skipped += 1;
                }
            }
        }
    }

    if report.vulnerabilities.is_empty() && report.skipped > 0 {
        return Err(ReportParseError::NoValidRecords { skipped: report.skipped });
    }
    debug!(findings = report.vulnerabilities.len(), skipped = report.skipped, "Nikto report normalized.");
    Ok(report)
}

fn host_target(host: &Map<String, Value>) -> TargetUpdates {
    TargetUpdates {
        ip: scalar_string(host.get("ip")),
        host: scalar_string(host.get("host")),
        scheme: base_url(host).map(|url| url.scheme().to_string()),
        port: scalar_string(host.get("port")),
    }
}

/// Nikto reports a bare host name plus a port; rebuild an absolute base URL
/// so finding paths can be joined onto it.
fn base_url(host: &Map<String, Value>) -> Option<Url> {
    let name = scalar_string(host.get("host"))?;
    if let Ok(url) = Url::parse(&name) {
        if url.has_host() {
            return Some(url);
        }
    }
    let port = scalar_string(host.get("port"));
    let authority = match port.as_deref() {
        None | Some("80") | Some("443") => name,
        Some(port) => format!("{name}:{port}"),
    };
    let scheme = if port.as_deref() == Some("443") { "https" } else { "http" };
    Url::parse(&format!("{scheme}://{authority}/")).ok()
}

fn normalize_entry(entry: &Value, base: Option<&Url>) -> Option<NormalizedVulnerability> {
    let entry = entry.as_object()?;
    let message = scalar_string(entry.get("msg"))?;
    let path = scalar_string(entry.get("url"));

    let url = match (base, path.as_deref()) {
        (Some(base), Some(path)) => base.join(path).map(String::from).unwrap_or_else(|_| path.to_string()),
        (Some(base), None) => base.to_string(),
        (None, Some(path)) => path.to_string(),
        (None, None) => String::new(),
    };

    Some(NormalizedVulnerability {
        template_id: scalar_string(entry.get("id")).unwrap_or_default(),
        name: message.clone(),
        severity: Severity::Info,
        description: message,
        location: Location { url, parameter: None },
        evidence: Evidence::None,
        references: scalar_string(entry.get("references")).map(|r| extract_links(&r)).unwrap_or_default(),
        cwe_ids: Vec::new(),
        solution: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_host_object() {
        let raw = json!({
            "host": "example.com",
            "ip": "93.184.216.34",
            "port": "8080",
            "vulnerabilities": [
                {"id": "999986", "method": "GET", "url": "/admin/", "msg": "Admin login page found.", "references": "https://cirt.net/admin"},
                {"id": "000000", "url": "/"},
                42,
                {"id": "999103", "url": "/.git/HEAD", "msg": "Git HEAD file found."}
            ]
        })
        .to_string();

        let report = parse_report(&raw).unwrap();
        assert_eq!(report.vulnerabilities.len(), 2);
        assert_eq!(report.skipped, 2);

        let admin = &report.vulnerabilities[0];
        assert_eq!(admin.template_id, "999986");
        assert_eq!(admin.severity, Severity::Info);
        assert_eq!(admin.location.url, "http://example.com:8080/admin/");
        assert_eq!(admin.references, vec!["https://cirt.net/admin"]);

        let target = report.target_updates.unwrap();
        assert_eq!(target.ip.as_deref(), Some("93.184.216.34"));
        assert_eq!(target.port.as_deref(), Some("8080"));
        assert_eq!(target.scheme.as_deref(), Some("http"));
    }

    #[test]
    fn normalizes_host_list() {
        let raw = json!([
            {"host": "example.com", "port": "443", "vulnerabilities": [{"id": "1", "url": "/x", "msg": "X"}]},
            {"host": "other.example.com", "port": "80", "vulnerabilities": []}
        ])
        .to_string();

        let report = parse_report(&raw).unwrap();
        assert_eq!(report.vulnerabilities.len(), 1);
        assert_eq!(report.vulnerabilities[0].location.url, "https://example.com/x");
        assert_eq!(report.target_updates.unwrap().scheme.as_deref(), Some("https"));
    }

    #[test]
    fn rejects_reports_without_hosts() {
        assert!(matches!(parse_report(""), Err(ReportParseError::Empty)));
        assert!(matches!(parse_report("\"scan finished\""), Err(ReportParseError::UnexpectedShape(_))));
        assert!(matches!(parse_report("[1, 2]"), Err(ReportParseError::UnexpectedShape(_))));
        assert!(matches!(parse_report("{oops"), Err(ReportParseError::InvalidJson(_))));
        assert!(matches!(parse_report("{}"), Err(ReportParseError::UnexpectedShape(_))));
        assert!(matches!(parse_report("[{\"banner\": \"x\"}]"), Err(ReportParseError::UnexpectedShape(_))));
    }

    #[test]
    fn all_malformed_entries_are_an_error() {
        let raw = json!({"host": "example.com", "vulnerabilities": [1, 2]}).to_string();
        assert!(matches!(parse_report(&raw), Err(ReportParseError::NoValidRecords { skipped: 2 })));
    }

    #[test]
    fn clean_host_is_a_valid_empty_report() {
        let raw = json!({"host": "example.com", "port": "80", "vulnerabilities": []}).to_string();
        let report = parse_report(&raw).unwrap();
        assert!(report.vulnerabilities.is_empty());
        assert_eq!(report.skipped, 0);
    }
}
