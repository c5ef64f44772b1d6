// src/core/scanner/zap_scanner.rs

use std::sync::Arc;
use tracing::{debug, info};

use super::process::{ContainerRuntime, ReportWorkspace};
use crate::core::error::AdapterError;
use crate::core::models::{NormalizedReport, ToolKind, ToolParameters};
use crate::core::normalizer::zap;

const TOOL: &str = "zap";
const CONTAINER_DIR: &str = "/zap/wrk";
const DEFAULT_SPIDER_MINUTES: u64 = 300;

/// 0 is a clean run; 2 means "finished with warnings", which `-I` does not
/// suppress for every packaged scan script.
pub const SUCCESS_CODES: &[i32] = &[0, 2];

/// Runs ZAP's packaged full scan and reads the JSON report it writes into a
/// mounted temporary directory.
#[derive(Debug, Clone)]
pub struct ZapScanner {
    runtime: Arc<ContainerRuntime>,
    image: String,
}

impl ZapScanner {
    pub fn new(runtime: Arc<ContainerRuntime>, image: impl Into<String>) -> Self {
        Self { runtime, image: image.into() }
    }

    pub fn kind(&self) -> ToolKind {
        ToolKind::Zap
    }

    /// Builds the container arguments for a report written to `workspace`.
    pub fn build_args(&self, target_url: &str, parameters: &ToolParameters, workspace: &ReportWorkspace) -> Vec<String> {
        let minutes = parameters.positive_integer("timeout").unwrap_or(DEFAULT_SPIDER_MINUTES);
        let mut args: Vec<String> = vec![
            "--rm".into(),
            "-u".into(),
            "zap".into(),
            "-v".into(),
            workspace.volume(CONTAINER_DIR),
            self.image.clone(),
            "zap-full-scan.py".into(),
            "-t".into(),
            target_url.into(),
            "-J".into(),
            workspace.file_name().into(),
            "-m".into(),
            minutes.to_string(),
        ];
        if let Some(policy) = parameters.string("policy") {
            args.extend(["-p".to_string(), policy]);
        }
        args.push("-I".into());
        args
    }

    pub async fn execute(
        &self,
        target_url: &str,
        scan_id: &str,
        parameters: &ToolParameters,
    ) -> Result<NormalizedReport, AdapterError> {
        info!(scan_id, target_url, "Starting ZAP scan.");
        let workspace = ReportWorkspace::create(TOOL, scan_id)?;
        debug!(scan_id, dir = %workspace.host_dir().display(), "ZAP workspace created.");

        let args = self.build_args(target_url, parameters, &workspace);
        self.runtime.run_container(TOOL, scan_id, &args).await?.into_success(TOOL, SUCCESS_CODES)?;

        let report_error = |source| AdapterError::Report { tool: TOOL.to_string(), source };
        let raw = workspace.read_report().await.map_err(report_error)?;
        zap::parse_report(&raw).map_err(report_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ReportParseError;
    use crate::core::scanner::process::tests::scripted_runtime;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const REPORT: &str = r#"{"site":[{"@name":"http://example.com","@host":"example.com","@port":"80","@ssl":"false","alerts":[{"pluginid":"10038","alert":"CSP Header Not Set","riskcode":"2","instances":[{"uri":"http://example.com/"}]}]}]}"#;

    /// A fake runtime that writes `report` into the mounted directory, records
    /// the host directory in `marker`, and exits with `code`.
    fn fake_zap(report: Option<&str>, code: i32, marker: &std::path::Path) -> ZapScanner {
        let write = match report {
            Some(report) => format!("printf '%s' '{report}' > \"$dir/$file\""),
            None => String::new(),
        };
        let script = format!(
            r#"while [ $# -gt 0 ]; do case "$1" in -v) dir="${{2%%:*}}"; shift;; -J) file="$2"; shift;; esac; shift; done
echo "$dir" > '{}'
{write}
exit {code}"#,
            marker.display()
        );
        ZapScanner::new(Arc::new(scripted_runtime(&script)), "zaproxy/zap-stable")
    }

    fn recorded_dir(marker: &std::path::Path) -> PathBuf {
        PathBuf::from(std::fs::read_to_string(marker).unwrap().trim())
    }

    #[test]
    fn builds_invocation_with_defaults() {
        let scanner = ZapScanner::new(Arc::new(scripted_runtime("exit 0")), "zaproxy/zap-stable");
        let workspace = ReportWorkspace::create("zap", "s1").unwrap();

        let args = scanner.build_args("http://example.com", &ToolParameters::new(), &workspace);
        assert_eq!(args[..3], ["--rm", "-u", "zap"]);
        assert!(args[4].ends_with(":/zap/wrk"));
        assert_eq!(args[5..], [
            "zaproxy/zap-stable", "zap-full-scan.py", "-t", "http://example.com", "-J", "zap_report.json", "-m", "300", "-I"
        ]);

        let parameters = ToolParameters::new().with("timeout", 15).with("policy", "api-minimal");
        let args = scanner.build_args("http://example.com", &parameters, &workspace);
        assert!(args.windows(2).any(|w| w == ["-m", "15"]));
        assert!(args.windows(2).any(|w| w == ["-p", "api-minimal"]));
        assert_eq!(args.last().map(String::as_str), Some("-I"));
    }

    #[tokio::test]
    async fn exit_code_two_with_report_completes() {
        let scratch = TempDir::new().unwrap();
        let marker = scratch.path().join("dir");
        let scanner = fake_zap(Some(REPORT), 2, &marker);

        let report = scanner.execute("http://example.com", "s1", &ToolParameters::new()).await.unwrap();
        assert_eq!(report.vulnerabilities.len(), 1);
        assert_eq!(report.vulnerabilities[0].template_id, "10038");
        assert!(!recorded_dir(&marker).exists());
    }

    #[tokio::test]
    async fn missing_report_fails_and_cleans_up() {
        let scratch = TempDir::new().unwrap();
        let marker = scratch.path().join("dir");
        let scanner = fake_zap(None, 0, &marker);

        let err = scanner.execute("http://example.com", "s1", &ToolParameters::new()).await.unwrap_err();
        assert!(matches!(err, AdapterError::Report { source: ReportParseError::Missing(_), .. }));
        assert!(!recorded_dir(&marker).exists());
    }

    #[tokio::test]
    async fn other_exit_codes_fail() {
        let scratch = TempDir::new().unwrap();
        let marker = scratch.path().join("dir");
        let scanner = fake_zap(Some(REPORT), 1, &marker);

        let err = scanner.execute("http://example.com", "s1", &ToolParameters::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "zap exited with code 1");
        assert!(!recorded_dir(&marker).exists());
    }
}
