// src/core/scanner/nikto_scanner.rs

use std::sync::Arc;
use tracing::info;

use super::process::{ContainerRuntime, ReportWorkspace};
use crate::core::error::AdapterError;
use crate::core::models::{NormalizedReport, ToolKind, ToolParameters};
use crate::core::normalizer::nikto;

const TOOL: &str = "nikto";
const CONTAINER_DIR: &str = "/nikto/wrk";

pub const SUCCESS_CODES: &[i32] = &[0];

#[derive(Debug, Clone)]
pub struct NiktoScanner {
    runtime: Arc<ContainerRuntime>,
    image: String,
}

impl NiktoScanner {
    pub fn new(runtime: Arc<ContainerRuntime>, image: impl Into<String>) -> Self {
        Self { runtime, image: image.into() }
    }

    pub fn kind(&self) -> ToolKind {
        ToolKind::Nikto
    }

    pub fn build_args(&self, target_url: &str, parameters: &ToolParameters, workspace: &ReportWorkspace) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--rm".into(),
            "-v".into(),
            workspace.volume(CONTAINER_DIR),
            self.image.clone(),
            "-h".into(),
            target_url.into(),
            "-o".into(),
            format!("{CONTAINER_DIR}/{}", workspace.file_name()),
            "-Format".into(),
            "json".into(),
        ];
        if let Some(port) = parameters.positive_integer("port") {
            args.extend(["-p".to_string(), port.to_string()]);
        }
        if let Some(tuning) = parameters.string("tuning") {
            args.extend(["-Tuning".to_string(), tuning]);
        }
        if let Some(timeout) = parameters.positive_integer("timeout") {
            args.extend(["-timeout".to_string(), timeout.to_string()]);
        }
        args
    }

    pub async fn execute(
        &self,
        target_url: &str,
        scan_id: &str,
        parameters: &ToolParameters,
    ) -> Result<NormalizedReport, AdapterError> {
        info!(scan_id, target_url, "Starting Nikto scan.");
        let workspace = ReportWorkspace::create(TOOL, scan_id)?;
        let args = self.build_args(target_url, parameters, &workspace);
        self.runtime.run_container(TOOL, scan_id, &args).await?.into_success(TOOL, SUCCESS_CODES)?;

        let report_error = |source| AdapterError::Report { tool: TOOL.to_string(), source };
        let raw = workspace.read_report().await.map_err(report_error)?;
        nikto::parse_report(&raw).map_err(report_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scanner::process::tests::scripted_runtime;

    const WRITE_REPORT: &str = r#"while [ $# -gt 0 ]; do case "$1" in -v) dir="${2%%:*}"; shift;; -o) file="${2##*/}"; shift;; esac; shift; done
printf '%s' '{"host":"example.com","port":"80","vulnerabilities":[{"id":"999986","url":"/admin/","msg":"Admin login page found."}]}' > "$dir/$file""#;

    #[test]
    fn builds_invocation_with_optional_flags() {
        let scanner = NiktoScanner::new(Arc::new(scripted_runtime("exit 0")), "alpine/nikto");
        let workspace = ReportWorkspace::create("nikto", "s1").unwrap();
        let parameters = ToolParameters::new().with("port", "8443").with("tuning", "123b").with("timeout", "bogus");

        let args = scanner.build_args("http://example.com", &parameters, &workspace);
        assert_eq!(args[3..], [
            "alpine/nikto", "-h", "http://example.com", "-o", "/nikto/wrk/nikto_report.json", "-Format", "json",
            "-p", "8443", "-Tuning", "123b"
        ]);
    }

    #[tokio::test]
    async fn reads_report_from_mounted_directory() {
        let scanner = NiktoScanner::new(Arc::new(scripted_runtime(WRITE_REPORT)), "alpine/nikto");
        let report = scanner.execute("http://example.com", "s1", &ToolParameters::new()).await.unwrap();
        assert_eq!(report.vulnerabilities.len(), 1);
        assert_eq!(report.vulnerabilities[0].location.url, "http://example.com/admin/");
    }

    #[tokio::test]
    async fn launch_failure_is_reported() {
        let config = crate::core::config::RuntimeConfig { program: "/nonexistent/docker".into(), args: vec![] };
        let scanner = NiktoScanner::new(Arc::new(ContainerRuntime::new(&config, 1, std::time::Duration::from_secs(5))), "alpine/nikto");
        let err = scanner.execute("http://example.com", "s1", &ToolParameters::new()).await.unwrap_err();
        assert!(matches!(err, AdapterError::Launch { .. }));
    }
}
