// src/core/scanner/mod.rs

// Public interface of the `scanner` module: one adapter per supported tool,
// plus the process runner they share.
pub mod nikto_scanner;
pub mod nuclei_scanner;
pub mod process;
pub mod zap_scanner;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info};

use self::nikto_scanner::NiktoScanner;
use self::nuclei_scanner::NucleiScanner;
use self::process::ContainerRuntime;
use self::zap_scanner::ZapScanner;
use crate::core::config::EngineConfig;
use crate::core::error::AdapterError;
use crate::core::models::{NormalizedReport, ToolKind, ToolOutcome, ToolParameters};

/// Common contract of every scanner adapter.
///
/// An adapter never fails outward: launch errors, bad exit codes and
/// unparsable reports all come back as a `FAILED` outcome.
pub trait ScannerAdapter: Send + Sync + 'static {
    /// Runs the tool against `target_url` and returns its outcome.
    ///
    /// # Arguments
    /// * `target_url` - The validated http(s) URL to scan.
    /// * `scan_id` - The caller's scan identifier, used for logging and workspace names.
    /// * `parameters` - The tool's own parameter bag from the request.
    fn run(
        &self,
        target_url: &str,
        scan_id: &str,
        parameters: &ToolParameters,
    ) -> impl Future<Output = ToolOutcome> + Send;
}

/// The closed set of production adapters.
#[derive(Debug, Clone)]
pub enum Adapter {
    Nuclei(NucleiScanner),
    Zap(ZapScanner),
    Nikto(NiktoScanner),
}

impl Adapter {
    pub fn for_kind(kind: ToolKind, runtime: Arc<ContainerRuntime>, image: &str) -> Self {
        match kind {
            ToolKind::Nuclei => Adapter::Nuclei(NucleiScanner::new(runtime, image)),
            ToolKind::Zap => Adapter::Zap(ZapScanner::new(runtime, image)),
            ToolKind::Nikto => Adapter::Nikto(NiktoScanner::new(runtime, image)),
        }
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            Adapter::Nuclei(scanner) => scanner.kind(),
            Adapter::Zap(scanner) => scanner.kind(),
            Adapter::Nikto(scanner) => scanner.kind(),
        }
    }
}

impl ScannerAdapter for Adapter {
    async fn run(&self, target_url: &str, scan_id: &str, parameters: &ToolParameters) -> ToolOutcome {
        let result = match self {
            Adapter::Nuclei(scanner) => scanner.execute(target_url, scan_id, parameters).await,
            Adapter::Zap(scanner) => scanner.execute(target_url, scan_id, parameters).await,
            Adapter::Nikto(scanner) => scanner.execute(target_url, scan_id, parameters).await,
        };
        into_outcome(self.kind(), scan_id, result)
    }
}

/// Folds an adapter result into the tool's outcome, logging either way.
fn into_outcome(kind: ToolKind, scan_id: &str, result: Result<NormalizedReport, AdapterError>) -> ToolOutcome {
    match result {
        Ok(report) => {
            info!(
                scan_id,
                tool = %kind,
                findings = report.vulnerabilities.len(),
                skipped = report.skipped,
                "Tool completed."
            );
            ToolOutcome::Completed(report.into())
        }
        Err(e) => {
            error!(scan_id, tool = %kind, error = %e, "Tool failed.");
            ToolOutcome::failed(e.to_string())
        }
    }
}

/// Tool name → adapter lookup table, handed to the orchestrator at construction.
#[derive(Debug)]
pub struct AdapterRegistry<A = Adapter> {
    adapters: HashMap<String, Arc<A>>,
}

impl<A> Default for AdapterRegistry<A> {
    fn default() -> Self {
        Self { adapters: HashMap::new() }
    }
}

impl<A: ScannerAdapter> AdapterRegistry<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `adapter` under the normalized form of `name`, replacing any
    /// previous registration.
    pub fn register(&mut self, name: &str, adapter: A) -> &mut Self {
        self.adapters.insert(crate::core::models::normalize_tool_name(name), Arc::new(adapter));
        self
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<A>> {
        self.adapters.get(name).cloned()
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl AdapterRegistry<Adapter> {
    /// Builds one adapter per enabled tool. All of them share a single
    /// container runtime, and with it one process limiter.
    pub fn from_config(config: &EngineConfig) -> Self {
        let runtime = Arc::new(ContainerRuntime::new(&config.runtime, config.max_concurrent_processes, config.tool_timeout()));
        let mut registry = Self::new();
        for kind in config.enabled_kinds() {
            registry.register(kind.as_ref(), Adapter::for_kind(kind, runtime.clone(), config.tools.image(kind)));
        }
        info!(tools = ?registry.names(), "Adapter registry built.");
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::ScanStatus;
    use crate::core::scanner::process::tests::scripted_runtime;

    #[test]
    fn registry_follows_enabled_tools() {
        let config = EngineConfig { enabled_tools: vec!["zap".into(), "Nuclei".into()], ..EngineConfig::default() };
        let registry = AdapterRegistry::from_config(&config);
        assert_eq!(registry.names(), ["nuclei", "zap"]);
        assert_eq!(registry.resolve("zap").unwrap().kind(), ToolKind::Zap);
        assert!(registry.resolve("nikto").is_none());
        assert!(registry.resolve("bogus").is_none());
    }

    #[tokio::test]
    async fn adapter_failures_become_failed_outcomes() {
        let adapter = Adapter::Nuclei(NucleiScanner::new(Arc::new(scripted_runtime("exit 1")), "nuclei"));
        let outcome = adapter.run("http://example.com", "s1", &ToolParameters::new()).await;
        assert_eq!(outcome.error(), Some("nuclei exited with code 1"));
        assert_eq!(ScanStatus::from_outcomes([&outcome]), ScanStatus::Failed);
    }

    #[tokio::test]
    async fn adapter_success_becomes_completed_outcome() {
        let script = r#"echo '{"template-id":"x","info":{"severity":"high"},"host":"example.com"}'"#;
        let adapter = Adapter::Nuclei(NucleiScanner::new(Arc::new(scripted_runtime(script)), "nuclei"));
        let outcome = adapter.run("http://example.com", "s1", &ToolParameters::new()).await;
        let report = outcome.report().unwrap();
        assert_eq!(report.summary.high, 1);
        assert_eq!(report.vulnerabilities[0].name, "Unknown Vulnerability");
    }
}
