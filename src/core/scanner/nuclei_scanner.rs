// src/core/scanner/nuclei_scanner.rs

use std::sync::Arc;
use tracing::{debug, info};

use super::process::ContainerRuntime;
use crate::core::error::AdapterError;
use crate::core::models::{NormalizedReport, ToolKind, ToolParameters};
use crate::core::normalizer::nuclei;

const TOOL: &str = "nuclei";

/// Nuclei signals findings through its JSONL stream, not its exit code.
pub const SUCCESS_CODES: &[i32] = &[0];

/// Runs Nuclei and reads its JSONL findings from stdout.
#[derive(Debug, Clone)]
pub struct NucleiScanner {
    runtime: Arc<ContainerRuntime>,
    image: String,
}

impl NucleiScanner {
    pub fn new(runtime: Arc<ContainerRuntime>, image: impl Into<String>) -> Self {
        Self { runtime, image: image.into() }
    }

    pub fn kind(&self) -> ToolKind {
        ToolKind::Nuclei
    }

    /// Builds the container arguments (everything after `docker run`).
    ///
    /// # Arguments
    /// * `target_url` - The URL handed to `-u`.
    /// * `parameters` - Optional `template_path`, `severity`, `tags` and `rate_limit`.
    pub fn build_args(&self, target_url: &str, parameters: &ToolParameters) -> Vec<String> {
        let mut args: Vec<String> = vec!["--rm".into(), self.image.clone(), "-u".into(), target_url.into()];
        args.extend(["-jsonl", "-silent", "-nc"].map(String::from));

        for (key, flag) in [("template_path", "-t"), ("severity", "-severity"), ("tags", "-tags")] {
            if let Some(value) = parameters.string(key) {
                args.extend([flag.to_string(), value]);
            }
        }
        if let Some(rate) = parameters.positive_integer("rate_limit") {
            args.extend(["-rl".to_string(), rate.to_string()]);
        }
        args
    }

    pub async fn execute(
        &self,
        target_url: &str,
        scan_id: &str,
        parameters: &ToolParameters,
    ) -> Result<NormalizedReport, AdapterError> {
        info!(scan_id, target_url, "Starting Nuclei scan.");
        let args = self.build_args(target_url, parameters);
        let output = self.runtime.run_container(TOOL, scan_id, &args).await?.into_success(TOOL, SUCCESS_CODES)?;
        debug!(scan_id, stderr = %output.stderr.trim(), "Nuclei finished; parsing stdout.");

        nuclei::parse_report(&output.stdout).map_err(|source| AdapterError::Report { tool: TOOL.to_string(), source })
    }
}
