// src/core/config.rs

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use strum::IntoEnumIterator;
use tracing::debug;

use crate::core::error::ConfigError;
use crate::core::models::{ToolKind, normalize_tool_name};

const ENV_PREFIX: &str = "VANGUARD_SCAN_RUNNER";

/// How containers are started: `<program> <args..> run --rm ...`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { program: "docker".to_string(), args: Vec::new() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ToolImage {
    pub image: String,
}

impl ToolImage {
    fn new(image: &str) -> Self {
        Self { image: image.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub nuclei: ToolImage,
    pub zap: ToolImage,
    pub nikto: ToolImage,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            nuclei: ToolImage::new("projectdiscovery/nuclei:latest"),
            zap: ToolImage::new("zaproxy/zap-stable"),
            nikto: ToolImage::new("alpine/nikto"),
        }
    }
}

impl ToolsConfig {
    pub fn image(&self, kind: ToolKind) -> &str {
        match kind {
            ToolKind::Nuclei => &self.nuclei.image,
            ToolKind::Zap => &self.zap.image,
            ToolKind::Nikto => &self.nikto.image,
        }
    }
}

/// Engine-wide settings. Built from defaults, then an optional JSON file,
/// then `VANGUARD_SCAN_RUNNER_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub runtime: RuntimeConfig,
    /// Upper bound on a single tool invocation.
    pub tool_timeout_secs: u64,
    /// Upper bound on external processes running at once, across all scans.
    pub max_concurrent_processes: usize,
    pub callback_timeout_secs: u64,
    /// Treat unsupported tool names as a request defect instead of a
    /// per-tool failure.
    pub reject_unsupported_tools: bool,
    pub enabled_tools: Vec<String>,
    pub tools: ToolsConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            runtime: RuntimeConfig::default(),
            tool_timeout_secs: 3600,
            max_concurrent_processes: 4,
            callback_timeout_secs: 30,
            reject_unsupported_tools: false,
            enabled_tools: ToolKind::iter().map(|kind| kind.to_string()).collect(),
            tools: ToolsConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        debug!(?config, "Engine configuration loaded.");
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    /// Applies overrides from `lookup` (the process environment in production).
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let var = |name: &str| {
            let key = format!("{ENV_PREFIX}_{name}");
            lookup(&key).map(|value| (key, value))
        };

        if let Some((key, value)) = var("RUNTIME") {
            let mut parts = value.split_whitespace().map(str::to_string);
            let program = parts.next().ok_or(ConfigError::InvalidEnv { key, value: value.clone() })?;
            self.runtime = RuntimeConfig { program, args: parts.collect() };
        }
        if let Some((key, value)) = var("TOOL_TIMEOUT_SECS") {
            self.tool_timeout_secs = parse_env(key, value)?;
        }
        if let Some((key, value)) = var("MAX_PROCESSES") {
            self.max_concurrent_processes = parse_env(key, value)?;
        }
        if let Some((key, value)) = var("CALLBACK_TIMEOUT_SECS") {
            self.callback_timeout_secs = parse_env(key, value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.runtime.program.trim().is_empty() {
            return Err(ConfigError::Invalid("runtime.program must not be empty".to_string()));
        }
        if self.tool_timeout_secs == 0 || self.callback_timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be greater than zero".to_string()));
        }
        if self.max_concurrent_processes == 0 {
            return Err(ConfigError::Invalid("max_concurrent_processes must be greater than zero".to_string()));
        }
        for tool in &self.enabled_tools {
            let kind: ToolKind = normalize_tool_name(tool)
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("unknown tool '{tool}' in enabled_tools")))?;
            if self.tools.image(kind).trim().is_empty() {
                return Err(ConfigError::Invalid(format!("no image configured for {kind}")));
            }
        }
        Ok(())
    }

    /// Enabled tools, deduplicated, in configuration order.
    pub fn enabled_kinds(&self) -> Vec<ToolKind> {
        let mut kinds = Vec::new();
        for kind in self.enabled_tools.iter().filter_map(|t| normalize_tool_name(t).parse::<ToolKind>().ok()) {
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        kinds
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs)
    }
}

fn parse_env<T: std::str::FromStr>(key: String, value: String) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv { key, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_enable_every_tool() {
        let config = EngineConfig::default();
        assert_eq!(config.enabled_kinds(), vec![ToolKind::Nuclei, ToolKind::Zap, ToolKind::Nikto]);
        assert_eq!(config.runtime.program, "docker");
        assert_eq!(config.tools.image(ToolKind::Zap), "zaproxy/zap-stable");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn file_values_merge_over_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = NamedTempFile::new()?;
        file.write_all(br#"{"tool_timeout_secs": 600, "enabled_tools": ["ZAP"], "tools": {"zap": {"image": "registry.local/zap"}}}"#)?;
        file.flush()?;

        let config = EngineConfig::from_file(file.path())?;
        assert_eq!(config.tool_timeout(), Duration::from_secs(600));
        assert_eq!(config.enabled_kinds(), vec![ToolKind::Zap]);
        assert_eq!(config.tools.image(ToolKind::Zap), "registry.local/zap");
        assert_eq!(config.tools.image(ToolKind::Nuclei), "projectdiscovery/nuclei:latest");
        assert_eq!(config.max_concurrent_processes, 4);
        Ok(())
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = EngineConfig::default();
        config
            .apply_env_overrides(env(&[
                ("VANGUARD_SCAN_RUNNER_RUNTIME", "sudo docker"),
                ("VANGUARD_SCAN_RUNNER_MAX_PROCESSES", "2"),
                ("VANGUARD_SCAN_RUNNER_CALLBACK_TIMEOUT_SECS", " 5 "),
            ]))
            .unwrap();
        assert_eq!(config.runtime, RuntimeConfig { program: "sudo".into(), args: vec!["docker".into()] });
        assert_eq!(config.max_concurrent_processes, 2);
        assert_eq!(config.callback_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut config = EngineConfig::default();
        let err = config.apply_env_overrides(env(&[("VANGUARD_SCAN_RUNNER_TOOL_TIMEOUT_SECS", "soon")]));
        assert!(matches!(err, Err(ConfigError::InvalidEnv { .. })));

        let zero = EngineConfig { max_concurrent_processes: 0, ..EngineConfig::default() };
        assert!(matches!(zero.validate(), Err(ConfigError::Invalid(_))));

        let unknown = EngineConfig { enabled_tools: vec!["sqlmap".into()], ..EngineConfig::default() };
        assert!(matches!(unknown.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn unreadable_file_is_reported() {
        let err = EngineConfig::from_file(Path::new("/nonexistent/engine.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
