// src/core/models.rs

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use strum::{AsRefStr, Display, EnumIter, EnumString};

static TARGET_URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^https?://\S+$").unwrap());

// --- Tools ---

/// The closed set of scanning tools this engine knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ToolKind {
    Nuclei,
    Zap,
    Nikto,
}

/// Canonical form of a tool name as it appears in requests and result maps.
pub fn normalize_tool_name(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

// --- Severity ---

/// The shared five-level scale every tool's native severity is mapped onto.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    #[strum(to_string = "info", serialize = "informational")]
    Info,
}

impl Severity {
    /// Maps a textual severity label onto the enum. Total: anything
    /// unrecognised, including an empty label, is `Info`.
    pub fn from_label(label: &str) -> Self {
        label.trim().parse().unwrap_or(Severity::Info)
    }
}

// --- Normalized vulnerability ---

/// Where a finding was observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
}

/// Supporting evidence for a finding. When a tool offers several kinds, the
/// normalizer keeps the first one in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Evidence {
    Extracted {
        resources: Vec<String>,
    },
    Oast {
        interaction_domain: Option<String>,
        remote_ip: Option<String>,
    },
    Curl {
        command: String,
    },
    #[default]
    None,
}

/// Tool-agnostic vulnerability record produced by every normalizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedVulnerability {
    /// Template id (Nuclei), plugin id (ZAP) or check id (Nikto).
    pub template_id: String,
    pub name: String,
    pub severity: Severity,
    pub description: String,
    pub location: Location,
    pub evidence: Evidence,
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default)]
    pub cwe_ids: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
}

/// Count of findings per severity, derived from normalized records so every
/// tool reports the same shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeveritySummary {
    pub total: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub info: usize,
}

impl SeveritySummary {
    pub fn from_vulnerabilities(vulnerabilities: &[NormalizedVulnerability]) -> Self {
        let mut summary = Self::default();
        for vulnerability in vulnerabilities {
            summary.total += 1;
            match vulnerability.severity {
                Severity::Critical => summary.critical += 1,
                Severity::High => summary.high += 1,
                Severity::Medium => summary.medium += 1,
                Severity::Low => summary.low += 1,
                Severity::Info => summary.info += 1,
            }
        }
        summary
    }
}

/// Target metadata a tool observed while scanning (resolved IP, port, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetUpdates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
}

impl TargetUpdates {
    pub fn is_empty(&self) -> bool {
        self.ip.is_none() && self.host.is_none() && self.scheme.is_none() && self.port.is_none()
    }
}

/// Output of a report normalizer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedReport {
    pub vulnerabilities: Vec<NormalizedVulnerability>,
    pub target_updates: Option<TargetUpdates>,
    /// Records dropped because they were malformed.
    pub skipped: usize,
}

// --- Tool outcome ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolReport {
    pub summary: SeveritySummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_updates: Option<TargetUpdates>,
    pub vulnerabilities: Vec<NormalizedVulnerability>,
}

impl From<NormalizedReport> for ToolReport {
    fn from(report: NormalizedReport) -> Self {
        Self {
            summary: SeveritySummary::from_vulnerabilities(&report.vulnerabilities),
            target_updates: report.target_updates.filter(|t| !t.is_empty()),
            vulnerabilities: report.vulnerabilities,
        }
    }
}

/// Terminal state of one requested tool. Serialized with a `status` tag so it
/// matches the callback wire format directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolOutcome {
    Completed(ToolReport),
    Failed { error: String },
}

impl ToolOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        ToolOutcome::Failed { error: error.into() }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, ToolOutcome::Completed(_))
    }

    pub fn report(&self) -> Option<&ToolReport> {
        match self {
            ToolOutcome::Completed(report) => Some(report),
            ToolOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ToolOutcome::Completed(_) => None,
            ToolOutcome::Failed { error } => Some(error),
        }
    }
}

/// Tool name → outcome, kept in request order. Serializes as a JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolResults(Vec<(String, ToolOutcome)>);

impl ToolResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tool: impl Into<String>, outcome: ToolOutcome) {
        let tool = tool.into();
        match self.0.iter_mut().find(|(name, _)| *name == tool) {
            Some(entry) => entry.1 = outcome,
            None => self.0.push((tool, outcome)),
        }
    }

    pub fn get(&self, tool: &str) -> Option<&ToolOutcome> {
        self.0.iter().find(|(name, _)| name == tool).map(|(_, outcome)| outcome)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ToolOutcome)> {
        self.0.iter().map(|(name, outcome)| (name.as_str(), outcome))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for ToolResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(name, outcome)| (name, outcome)))
    }
}

// --- Aggregate result ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanStatus {
    Completed,
    Failed,
    Partial,
}

impl ScanStatus {
    /// All completed → `Completed`, all failed → `Failed`, any mix → `Partial`.
    /// No outcomes at all is treated as a failure.
    pub fn from_outcomes<'a>(outcomes: impl IntoIterator<Item = &'a ToolOutcome>) -> Self {
        let (completed, failed) = outcomes.into_iter().fold((0usize, 0usize), |(c, f), outcome| {
            if outcome.is_completed() { (c + 1, f) } else { (c, f + 1) }
        });
        match (completed, failed) {
            (0, _) => ScanStatus::Failed,
            (_, 0) => ScanStatus::Completed,
            _ => ScanStatus::Partial,
        }
    }
}

/// The single result of a scan: built once, then handed to the callback
/// dispatcher and returned to the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    scan_id: String,
    status: ScanStatus,
    completed_at: DateTime<Utc>,
    results: ToolResults,
}

impl AggregateResult {
    pub fn new(scan_id: impl Into<String>, results: ToolResults) -> Self {
        let status = ScanStatus::from_outcomes(results.iter().map(|(_, outcome)| outcome));
        Self { scan_id: scan_id.into(), status, completed_at: Utc::now(), results }
    }

    pub fn scan_id(&self) -> &str {
        &self.scan_id
    }

    pub fn status(&self) -> ScanStatus {
        self.status
    }

    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    pub fn results(&self) -> &ToolResults {
        &self.results
    }
}

/// Payload for request-level faults that happen before any tool has run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureNotice {
    pub scan_id: String,
    pub status: ScanStatus,
    pub error_message: String,
    pub failed_at: DateTime<Utc>,
}

impl FailureNotice {
    pub fn new(scan_id: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            scan_id: scan_id.into(),
            status: ScanStatus::Failed,
            error_message: error_message.into(),
            failed_at: Utc::now(),
        }
    }
}

// --- Scan request ---

/// Opaque per-tool configuration, passed through to the matching adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolParameters(Map<String, Value>);

impl ToolParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// A non-empty string value. Numbers are stringified and string arrays are
    /// joined with commas (the form most tool CLIs take for lists).
    pub fn string(&self, key: &str) -> Option<String> {
        let value = match self.0.get(key)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Array(items) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(","),
            _ => return None,
        };
        (!value.is_empty()).then_some(value)
    }

    /// A strictly positive integer, given either as a JSON number or a numeric string.
    pub fn positive_integer(&self, key: &str) -> Option<u64> {
        let value = match self.0.get(key)? {
            Value::Number(n) => n.as_u64()?,
            Value::String(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        (value > 0).then_some(value)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// An inbound request to scan one target with one or more tools.
///
/// Fields are private: a request is built once (deserialized or via
/// [`ScanRequest::new`]) and read-only afterwards. Tool names and parameter
/// keys are normalized on the way in.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanRequest {
    #[serde(default, deserialize_with = "deserialize_trimmed")]
    scan_id: String,
    #[serde(default, deserialize_with = "deserialize_trimmed")]
    target_url: String,
    #[serde(default, deserialize_with = "deserialize_tools")]
    scan_tools: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_parameters")]
    scan_parameters: BTreeMap<String, ToolParameters>,
    #[serde(default, deserialize_with = "deserialize_trimmed")]
    callback_url: String,
}

impl ScanRequest {
    pub fn new<I, S>(scan_id: &str, target_url: &str, scan_tools: I, callback_url: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            scan_id: scan_id.trim().to_string(),
            target_url: target_url.trim().to_string(),
            scan_tools: dedup_tools(scan_tools.into_iter().map(|t| normalize_tool_name(t.as_ref()))),
            scan_parameters: BTreeMap::new(),
            callback_url: callback_url.trim().to_string(),
        }
    }

    pub fn with_parameters(mut self, tool: &str, parameters: ToolParameters) -> Self {
        self.scan_parameters.insert(normalize_tool_name(tool), parameters);
        self
    }

    pub fn scan_id(&self) -> &str {
        &self.scan_id
    }

    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    pub fn scan_tools(&self) -> &[String] {
        &self.scan_tools
    }

    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    /// Parameters for `tool`, or an empty bag.
    pub fn parameters_for(&self, tool: &str) -> ToolParameters {
        self.scan_parameters.get(&normalize_tool_name(tool)).cloned().unwrap_or_default()
    }

    /// Structural checks that do not depend on which adapters are configured.
    pub fn violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        if self.scan_id.trim().is_empty() {
            violations.push("scan_id is required".to_string());
        }
        if self.target_url.trim().is_empty() {
            violations.push("target_url is required".to_string());
        } else if !TARGET_URL_RE.is_match(&self.target_url) {
            violations.push(format!("target_url '{}' is not an http(s) URL", self.target_url));
        }
        if self.scan_tools.is_empty() {
            violations.push("scan_tools must name at least one tool".to_string());
        }
        if self.callback_url.trim().is_empty() {
            violations.push("callback_url is required".to_string());
        }
        violations
    }
}

fn dedup_tools(tools: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = Vec::new();
    for tool in tools.filter(|t| !t.is_empty()) {
        if !seen.contains(&tool) {
            seen.push(tool);
        }
    }
    seen
}

fn deserialize_trimmed<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.map(|s| s.trim().to_string()).unwrap_or_default())
}

fn deserialize_tools<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let tools = Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(dedup_tools(tools.iter().map(|t| normalize_tool_name(t))))
}

/// Accepts an object, `null`, or a JSON-encoded object string (the legacy job
/// encoding). Unparsable strings and non-object bags become empty.
fn deserialize_parameters<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<String, ToolParameters>, D::Error> {
    let raw = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(encoded)) => serde_json::from_str(&encoded).unwrap_or(Value::Null),
        Some(value) => value,
        None => Value::Null,
    };
    let Value::Object(bags) = raw else {
        return Ok(BTreeMap::new());
    };
    Ok(bags
        .into_iter()
        .filter_map(|(tool, bag)| match bag {
            Value::Object(map) => Some((normalize_tool_name(&tool), ToolParameters(map))),
            _ => None,
        })
        .collect())
}
