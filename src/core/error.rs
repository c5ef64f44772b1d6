// src/core/error.rs

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// A request-level defect, detected before any tool runs.
///
/// All violations the validator can find are collected into one error so the
/// caller can fix the request in a single round trip.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid scan request: {}", .violations.join("; "))]
pub struct RequestValidationError {
    pub violations: Vec<String>,
}

/// Failure of a single tool invocation. Always folded into that tool's
/// `ToolOutcome`, never propagated past the orchestrator.
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("tool not supported")]
    UnsupportedTool(String),

    #[error("failed to launch {tool}: {source}")]
    Launch {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// The exit code fell outside the tool's success set. `message` is the
    /// captured stderr, or a description of the exit code when stderr was empty.
    #[error("{message}")]
    ProcessFailed { tool: String, exit_code: Option<i32>, message: String },

    #[error("{tool} timed out after {after:?}")]
    Timeout { tool: String, after: Duration },

    #[error("{tool} adapter panicked: {reason}")]
    Panicked { tool: String, reason: String },

    #[error("failed to prepare workspace for {tool}: {source}")]
    Workspace {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} report error: {source}")]
    Report {
        tool: String,
        #[source]
        source: ReportParseError,
    },
}

/// Raw tool output could not be turned into normalized records.
#[derive(Error, Debug)]
pub enum ReportParseError {
    #[error("report is empty")]
    Empty,

    #[error("report file not found at {}", .0.display())]
    Missing(PathBuf),

    #[error("could not read report: {0}")]
    Unreadable(#[from] std::io::Error),

    #[error("invalid JSON output: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("no valid records in report ({skipped} malformed)")]
    NoValidRecords { skipped: usize },

    #[error("unexpected report shape: {0}")]
    UnexpectedShape(String),
}

/// Outbound notification failure. Logged by the dispatcher, never escalated.
#[derive(Error, Debug)]
pub enum CallbackError {
    #[error("invalid callback URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported callback URL scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("callback request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("callback endpoint responded with {0}")]
    Status(reqwest::StatusCode),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {key}: '{value}'")]
    InvalidEnv { key: String, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
