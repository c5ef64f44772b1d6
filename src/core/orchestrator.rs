// src/core/orchestrator.rs

use std::time::Duration;
use tracing::{error, info, warn};

use crate::core::callback::CallbackDispatcher;
use crate::core::config::EngineConfig;
use crate::core::error::{AdapterError, CallbackError, RequestValidationError};
use crate::core::models::{AggregateResult, ScanRequest, ToolOutcome, ToolResults};
use crate::core::scanner::{Adapter, AdapterRegistry, ScannerAdapter};

/// Validates scan requests, runs the requested tools one after another and
/// aggregates their outcomes.
///
/// The orchestrator is total: whatever an adapter does (error, panic, hang),
/// each requested tool ends up with exactly one outcome and the caller gets
/// exactly one result.
#[derive(Debug)]
pub struct ScanOrchestrator<A = Adapter> {
    registry: AdapterRegistry<A>,
    dispatcher: Option<CallbackDispatcher>,
    tool_timeout: Option<Duration>,
    reject_unsupported_tools: bool,
}

impl<A: ScannerAdapter> ScanOrchestrator<A> {
    pub fn new(registry: AdapterRegistry<A>, dispatcher: CallbackDispatcher, reject_unsupported_tools: bool) -> Self {
        Self { registry, dispatcher: Some(dispatcher), tool_timeout: None, reject_unsupported_tools }
    }

    /// Bounds every adapter run from the outside. Production adapters enforce
    /// the per-tool timeout themselves and clean up their containers, so this
    /// is only needed for adapters that do not.
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = Some(timeout);
        self
    }

    /// Skips callback delivery entirely; used for local runs.
    pub fn with_callbacks_disabled(mut self) -> Self {
        self.dispatcher = None;
        self
    }

    /// Runs one scan request to completion.
    ///
    /// # Returns
    /// The aggregate result, or the collected validation violations when the
    /// request is defective. In the latter case no tool is run, and a failure
    /// notice is sent if the request carries a callback URL.
    pub async fn run(&self, request: &ScanRequest) -> Result<AggregateResult, RequestValidationError> {
        let scan_id = request.scan_id();
        info!(scan_id, target_url = request.target_url(), tools = ?request.scan_tools(), "Scan request received.");

        if let Err(e) = self.validate(request) {
            warn!(scan_id, error = %e, "Rejecting scan request.");
            if !request.callback_url().is_empty() {
                if let Some(dispatcher) = &self.dispatcher {
                    dispatcher.deliver_failure(scan_id, request.callback_url(), &e.to_string()).await;
                }
            }
            return Err(e);
        }

        let mut results = ToolResults::new();
        for tool in request.scan_tools() {
            let outcome = match self.registry.resolve(tool) {
                Some(adapter) => self.dispatch(adapter, tool, request).await,
                None => ToolOutcome::failed(AdapterError::UnsupportedTool(tool.clone()).to_string()),
            };
            results.insert(tool.as_str(), outcome);
        }

        let result = AggregateResult::new(scan_id, results);
        info!(scan_id, status = %result.status(), "Scan finished.");

        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.deliver(request.callback_url(), &result).await;
        }
        Ok(result)
    }

    fn validate(&self, request: &ScanRequest) -> Result<(), RequestValidationError> {
        let mut violations = request.violations();

        let unsupported: Vec<&str> = request
            .scan_tools()
            .iter()
            .map(String::as_str)
            .filter(|tool| self.registry.resolve(tool).is_none())
            .collect();
        if !unsupported.is_empty() {
            if self.reject_unsupported_tools {
                violations.push(format!("unsupported scan tools: {}", unsupported.join(", ")));
            } else {
                warn!(
                    scan_id = request.scan_id(),
                    tools = ?unsupported,
                    supported = ?self.registry.names(),
                    "Request names unsupported tools; they will be reported as failed."
                );
            }
        }

        if violations.is_empty() { Ok(()) } else { Err(RequestValidationError { violations }) }
    }

    /// Runs one adapter on its own task so a panic stays contained, bounded by
    /// the tool timeout when one is set.
    async fn dispatch(&self, adapter: std::sync::Arc<A>, tool: &str, request: &ScanRequest) -> ToolOutcome {
        let scan_id = request.scan_id().to_string();
        let target_url = request.target_url().to_string();
        let parameters = request.parameters_for(tool);

        let task_scan_id = scan_id.clone();
        let mut handle =
            tokio::spawn(async move { adapter.run(&target_url, &task_scan_id, &parameters).await });

        let joined = match self.tool_timeout {
            Some(after) => tokio::time::timeout(after, &mut handle).await.map_err(|_| after),
            None => Ok((&mut handle).await),
        };
        let fault = match joined {
            Ok(Ok(outcome)) => return outcome,
            Ok(Err(join_error)) => AdapterError::Panicked { tool: tool.to_string(), reason: join_error.to_string() },
            Err(after) => {
                handle.abort();
                AdapterError::Timeout { tool: tool.to_string(), after }
            }
        };
        error!(scan_id = %scan_id, tool, error = %fault, "Adapter fault isolated.");
        ToolOutcome::failed(fault.to_string())
    }
}

impl ScanOrchestrator<Adapter> {
    /// The configured tool timeout is enforced by the container runtime, after
    /// each container's permit is acquired.
    pub fn from_config(config: &EngineConfig) -> Result<Self, CallbackError> {
        let dispatcher = CallbackDispatcher::new(config.callback_timeout())?;
        Ok(Self::new(AdapterRegistry::from_config(config), dispatcher, config.reject_unsupported_tools))
    }
}
