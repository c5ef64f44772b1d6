// src/core/normalizer/zap.rs

use serde_json::Value;
use tracing::{debug, warn};

use super::{cwe_ids, extract_links, scalar_string, strip_markup};
use crate::core::error::ReportParseError;
use crate::core::models::{Evidence, Location, NormalizedReport, NormalizedVulnerability, Severity, TargetUpdates};

/// Normalizes the traditional JSON report written by `zap-*-scan.py -J`.
///
/// Alerts are read from every site in the report. An alert that is not an
/// object, or carries neither a plugin id nor a name, is skipped.
pub fn parse_report(raw: &str) -> Result<NormalizedReport, ReportParseError> {
    if raw.trim().is_empty() {
        return Err(ReportParseError::Empty);
    }

    let document: Value = serde_json::from_str(raw)?;
    let Value::Object(root) = &document else {
        return Err(ReportParseError::UnexpectedShape("top level is not an object".to_string()));
    };

    let sites: Vec<&Value> = match root.get("site") {
        Some(Value::Array(sites)) => sites.iter().collect(),
        Some(site @ Value::Object(_)) => vec![site],
        Some(_) => {
            return Err(ReportParseError::UnexpectedShape("`site` is neither a list nor an object".to_string()));
        }
        None => return Err(ReportParseError::UnexpectedShape("no `site` in report".to_string())),
    };

    let mut report = NormalizedReport {
        target_updates: sites.first().map(|site| site_target(site)),
        ..Default::default()
    };

    for site in sites {
        let site_name = scalar_string(site.get("@name")).unwrap_or_default();
        let alerts = match site.get("alerts") {
            Some(Value::Array(alerts)) => alerts,
            None | Some(Value::Null) => continue,
            Some(_) => {
                warn!(site = %site_name, "Skipping ZAP site whose alerts are not a list.");
                report.skipped += 1;
                continue;
            }
        };
        for alert in alerts {
            match normalize_alert(alert, &site_name) {
                Some(vulnerability) => report.vulnerabilities.push(vulnerability),
                None => {
                    warn!(site = %site_name, "Skipping malformed ZAP alert.");
                    report.skipped += 1;
                }
            }
        }
    }

    if report.vulnerabilities.is_empty() && report.skipped > 0 {
        return Err(ReportParseError::NoValidRecords { skipped: report.skipped });
    }
    debug!(findings = report.vulnerabilities.len(), skipped = report.skipped, "ZAP report normalized.");
    Ok(report)
}

fn site_target(site: &Value) -> TargetUpdates {
    let ssl = scalar_string(site.get("@ssl")).map(|s| s.eq_ignore_ascii_case("true"));
    TargetUpdates {
        ip: None,
        host: scalar_string(site.get("@host")).or_else(|| scalar_string(site.get("@name"))),
        scheme: ssl.map(|ssl| if ssl { "https" } else { "http" }.to_string()),
        port: scalar_string(site.get("@port")),
    }
}

fn normalize_alert(alert: &Value, site_name: &str) -> Option<NormalizedVulnerability> {
    let alert = alert.as_object()?;
    let plugin_id = scalar_string(alert.get("pluginid")).or_else(|| scalar_string(alert.get("alertRef")));
    let name = scalar_string(alert.get("alert")).or_else(|| scalar_string(alert.get("name")));
    if plugin_id.is_none() && name.is_none() {
        return None;
    }

    let instances: Vec<&serde_json::Map<String, Value>> = alert
        .get("instances")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_object).collect())
        .unwrap_or_default();
    let first = instances.first();

    let resources: Vec<String> = instances.iter().filter_map(|i| scalar_string(i.get("evidence"))).collect();
    let evidence = if resources.is_empty() { Evidence::None } else { Evidence::Extracted { resources } };

    Some(NormalizedVulnerability {
        template_id: plugin_id.unwrap_or_default(),
        name: name.unwrap_or_else(|| "Unknown Alert".to_string()),
        severity: severity(alert.get("riskcode"), alert.get("riskdesc")),
        description: scalar_string(alert.get("desc")).map(|d| strip_markup(&d)).unwrap_or_default(),
        location: Location {
            url: first
                .and_then(|i| scalar_string(i.get("uri")))
                .unwrap_or_else(|| site_name.to_string()),
            parameter: first.and_then(|i| scalar_string(i.get("param"))),
        },
        evidence,
        references: scalar_string(alert.get("reference")).map(|r| extract_links(&r)).unwrap_or_default(),
        cwe_ids: cwe_ids(alert.get("cweid")),
        solution: scalar_string(alert.get("solution"))
            .map(|s| strip_markup(&s))
            .filter(|s| !s.is_empty()),
    })
}

/// `riskcode` 3/2/1/0 is high/medium/low/info; ZAP has no critical level.
/// Without a code, the leading word of `riskdesc` ("Medium (High)") is used.
fn severity(riskcode: Option<&Value>, riskdesc: Option<&Value>) -> Severity {
    match scalar_string(riskcode).as_deref() {
        Some("3") => Severity::High,
        Some("2") => Severity::Medium,
        Some("1") => Severity::Low,
        Some(_) => Severity::Info,
        None => scalar_string(riskdesc)
            .and_then(|desc| desc.split_whitespace().next().map(Severity::from_label))
            .unwrap_or(Severity::Info),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "@version": "2.14.0",
            "site": [{
                "@name": "http://example.com",
                "@host": "example.com",
                "@port": "80",
                "@ssl": "false",
                "alerts": [
                    {
                        "pluginid": "10038",
                        "alert": "Content Security Policy (CSP) Header Not Set",
                        "riskcode": "2",
                        "riskdesc": "Medium (High)",
                        "desc": "<p>CSP is an added layer of security.</p>",
                        "instances": [
                            {"uri": "http://example.com/", "method": "GET", "param": "", "evidence": ""},
                            {"uri": "http://example.com/robots.txt", "method": "GET", "param": "", "evidence": ""}
                        ],
                        "solution": "<p>Set the header.</p>",
                        "reference": "<p>https://developer.mozilla.org/csp</p><p>https://owasp.org/csp</p>",
                        "cweid": "693"
                    },
                    "not-an-alert",
                    {
                        "pluginid": "10096",
                        "alert": "Timestamp Disclosure",
                        "riskcode": 0,
                        "instances": [{"uri": "http://example.com/app.js", "param": "ts", "evidence": "1650000000"}],
                        "cweid": "-1"
                    },
                    {
                        "pluginid": "40012",
                        "alert": "Cross Site Scripting (Reflected)",
                        "riskdesc": "High (Medium)"
                    }
                ]
            }]
        })
    }

    #[test]
    fn normalizes_alerts_and_skips_malformed_ones() {
        let report = parse_report(&sample().to_string()).unwrap();
        assert_eq!(report.vulnerabilities.len(), 3);
        assert_eq!(report.skipped, 1);

        let csp = &report.vulnerabilities[0];
        assert_eq!(csp.template_id, "10038");
        assert_eq!(csp.severity, Severity::Medium);
        assert_eq!(csp.description, "CSP is an added layer of security.");
        assert_eq!(csp.location, Location { url: "http://example.com/".into(), parameter: None });
        assert_eq!(csp.evidence, Evidence::None);
        assert_eq!(csp.references, vec!["https://developer.mozilla.org/csp", "https://owasp.org/csp"]);
        assert_eq!(csp.cwe_ids, vec![693]);
        assert_eq!(csp.solution.as_deref(), Some("Set the header."));

        let ts = &report.vulnerabilities[1];
        assert_eq!(ts.severity, Severity::Info);
        assert_eq!(ts.location.parameter.as_deref(), Some("ts"));
        assert_eq!(ts.evidence, Evidence::Extracted { resources: vec!["1650000000".into()] });
        assert!(ts.cwe_ids.is_empty());

        let xss = &report.vulnerabilities[2];
        assert_eq!(xss.severity, Severity::High);
        assert_eq!(xss.location.url, "http://example.com");
    }

    #[test]
    fn target_comes_from_first_site() {
        let report = parse_report(&sample().to_string()).unwrap();
        let target = report.target_updates.unwrap();
        assert_eq!(target.host.as_deref(), Some("example.com"));
        assert_eq!(target.port.as_deref(), Some("80"));
        assert_eq!(target.scheme.as_deref(), Some("http"));
    }

    #[test]
    fn clean_site_is_a_valid_empty_report() {
        let raw = json!({"site": [{"@name": "https://example.com", "@ssl": "true", "alerts": []}]}).to_string();
        let report = parse_report(&raw).unwrap();
        assert!(report.vulnerabilities.is_empty());
        assert_eq!(report.target_updates.unwrap().scheme.as_deref(), Some("https"));
    }

    #[test]
    fn rejects_empty_and_invalid_documents() {
        assert!(matches!(parse_report(" "), Err(ReportParseError::Empty)));
        assert!(matches!(parse_report("{\"site\": ["), Err(ReportParseError::InvalidJson(_))));
        assert!(matches!(parse_report("[]"), Err(ReportParseError::UnexpectedShape(_))));
        assert!(matches!(parse_report("{\"site\": 3}"), Err(ReportParseError::UnexpectedShape(_))));
        assert!(matches!(parse_report("{}"), Err(ReportParseError::UnexpectedShape(_))));
        assert!(matches!(parse_report("{\"site\": null}"), Err(ReportParseError::UnexpectedShape(_))));
    }

    #[test]
    fn all_malformed_alerts_are_an_error() {
        let raw = json!({"site": [{"@name": "http://example.com", "alerts": [1, 2, "x"]}]}).to_string();
        assert!(matches!(parse_report(&raw), Err(ReportParseError::NoValidRecords { skipped: 3 })));

        let raw = json!({"site": {"@name": "http://example.com", "alerts": "none"}}).to_string();
        assert!(matches!(parse_report(&raw), Err(ReportParseError::NoValidRecords { skipped: 1 })));
    }
}
