// src/core/normalizer/nuclei.rs

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{cwe_ids, extract_links, scalar_string};
use crate::core::error::ReportParseError;
use crate::core::models::{Evidence, Location, NormalizedReport, NormalizedVulnerability, Severity, TargetUpdates};

/// One line of `nuclei -jsonl` output. Only `template-id` is mandatory; a line
/// without it is treated as malformed. Every other field is read loosely, so
/// a wrongly typed value loses that field, not the finding.
#[derive(Debug, Deserialize)]
struct NucleiResult {
    #[serde(rename = "template-id")]
    template_id: String,
    #[serde(default)]
    info: Value,
    #[serde(rename = "matched-at")]
    matched_at: Option<Value>,
    url: Option<Value>,
    host: Option<Value>,
    ip: Option<Value>,
    scheme: Option<Value>,
    port: Option<Value>,
    #[serde(rename = "extracted-results")]
    extracted_results: Option<Value>,
    interaction: Option<Value>,
    #[serde(rename = "curl-command")]
    curl_command: Option<Value>,
    fuzzing_parameter: Option<Value>,
}

/// Normalizes Nuclei's line-delimited JSON report.
pub fn parse_report(raw: &str) -> Result<NormalizedReport, ReportParseError> {
    if raw.trim().is_empty() {
        return Err(ReportParseError::Empty);
    }

    let mut report = NormalizedReport::default();
    for (index, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<NucleiResult>(line) {
            Ok(result) => {
                if report.target_updates.is_none() {
                    report.target_updates = Some(target_updates(&result));
                }
                report.vulnerabilities.push(normalize(result));
            }
            Err(e) => {
                warn!(line = index + 1, error = %e, "Skipping malformed Nuclei JSONL line.");
                report.skipped += 1;
            }
        }
    }

    if report.vulnerabilities.is_empty() {
        return Err(ReportParseError::NoValidRecords { skipped: report.skipped });
    }
    debug!(findings = report.vulnerabilities.len(), skipped = report.skipped, "Nuclei report normalized.");
    Ok(report)
}

fn target_updates(result: &NucleiResult) -> TargetUpdates {
    TargetUpdates {
        ip: scalar_string(result.ip.as_ref()),
        host: scalar_string(result.host.as_ref()),
        scheme: scalar_string(result.scheme.as_ref()),
        port: scalar_string(result.port.as_ref()),
    }
}

fn normalize(result: NucleiResult) -> NormalizedVulnerability {
    let evidence = evidence(&result);
    let info = &result.info;

    let references = match info.get("reference") {
        Some(Value::Array(items)) => string_items(items),
        Some(Value::String(text)) => extract_links(text),
        _ => Vec::new(),
    };

    NormalizedVulnerability {
        name: scalar_string(info.get("name")).unwrap_or_else(|| "Unknown Vulnerability".to_string()),
        severity: match info.get("severity") {
            Some(Value::String(label)) => Severity::from_label(label),
            _ => Severity::Info,
        },
        description: scalar_string(info.get("description")).unwrap_or_default(),
        location: Location {
            url: scalar_string(result.matched_at.as_ref())
                .or_else(|| scalar_string(result.url.as_ref()))
                .or_else(|| scalar_string(result.host.as_ref()))
                .unwrap_or_default(),
            parameter: scalar_string(result.fuzzing_parameter.as_ref()),
        },
        evidence,
        references,
        cwe_ids: cwe_ids(info.get("classification").and_then(|c| c.get("cwe-id"))),
        solution: scalar_string(info.get("remediation")),
        template_id: result.template_id,
    }
}

/// Non-empty trimmed strings of a JSON array; other items are ignored.
fn string_items(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Extracted results win over an OAST interaction, which wins over the curl
/// reproduction command.
fn evidence(result: &NucleiResult) -> Evidence {
    let resources = match &result.extracted_results {
        Some(Value::Array(items)) => string_items(items),
        _ => Vec::new(),
    };
    if !resources.is_empty() {
        return Evidence::Extracted { resources };
    }

    let interaction = result.interaction.as_ref();
    let interaction_domain = scalar_string(interaction.and_then(|i| i.get("full-id")));
    let remote_ip = scalar_string(interaction.and_then(|i| i.get("remote-address")));
    if interaction_domain.is_some() || remote_ip.is_some() {
        return Evidence::Oast { interaction_domain, remote_ip };
    }

    match scalar_string(result.curl_command.as_ref()) {
        Some(command) => Evidence::Curl { command },
        None => Evidence::None,
    }
}
