use crate::engine::FailurePolicy;
use crate::errors::ConfigError;
use crate::providers::llm::fake::HeuristicClient;
use crate::providers::llm::openai::OpenAIClient;
use crate::providers::llm::LlmClient;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

pub const SUPPORTED_CONFIG_VERSION: u32 = 1;
pub const DEFAULT_CONFIG_FILE: &str = "salesjudge.yaml";
pub const DEFAULT_DB: &str = ".salesjudge/salesjudge.db";
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";
pub const DEFAULT_OUT_DIR: &str = "artifacts";

pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_MODEL: &str = "SALESJUDGE_MODEL";
pub const ENV_LOG: &str = "SALESJUDGE_LOG";

pub const SAMPLE_CONFIG: &str = r#"# salesjudge scan configuration
version: 1
db: .salesjudge/salesjudge.db
model: gpt-4.1-mini
# openai | heuristic (offline keyword evaluator, no API key needed)
provider: openai
conversation_from: 0
conversation_to: 4
# fail_fast | retry_then_skip
failure_policy: fail_fast
report:
  out_dir: artifacts
"#;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Openai,
    Heuristic,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Openai => "openai",
            ProviderKind::Heuristic => "heuristic",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.trim() {
            "openai" => Ok(ProviderKind::Openai),
            "heuristic" => Ok(ProviderKind::Heuristic),
            other => Err(ConfigError(format!(
                "unknown provider '{}'{}",
                other,
                crate::errors::similarity::did_you_mean(other, ["openai", "heuristic"])
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportSettings {
    #[serde(default = "default_out_dir")]
    pub out_dir: String,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            out_dir: default_out_dir(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScanConfig {
    pub version: u32,
    #[serde(default = "default_db")]
    pub db: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default)]
    pub conversation_from: i64,
    #[serde(default = "default_conversation_to")]
    pub conversation_to: i64,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    #[serde(default)]
    pub report: ReportSettings,
    /// Only ever taken from the environment.
    #[serde(skip)]
    pub api_key: Option<String>,
}

fn default_db() -> String {
    DEFAULT_DB.to_string()
}
fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_out_dir() -> String {
    DEFAULT_OUT_DIR.to_string()
}
fn default_conversation_to() -> i64 {
    4
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            version: SUPPORTED_CONFIG_VERSION,
            db: default_db(),
            model: default_model(),
            provider: ProviderKind::default(),
            conversation_from: 0,
            conversation_to: default_conversation_to(),
            failure_policy: FailurePolicy::default(),
            report: ReportSettings::default(),
            api_key: None,
        }
    }
}

impl ScanConfig {
    /// Applies `OPENAI_API_KEY` and `SALESJUDGE_MODEL` from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|k| std::env::var(k).ok());
    }

    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(ENV_API_KEY).filter(|k| !k.trim().is_empty()) {
            self.api_key = Some(key);
        }
        if let Some(model) = lookup(ENV_MODEL).filter(|m| !m.trim().is_empty()) {
            self.model = model;
        }
    }

    pub fn build_client(&self) -> Result<Arc<dyn LlmClient>, ConfigError> {
        match self.provider {
            ProviderKind::Heuristic => Ok(Arc::new(HeuristicClient::new(self.model.clone()))),
            ProviderKind::Openai => {
                let key = self.api_key.clone().ok_or_else(|| {
                    ConfigError(format!(
                        "{} is not set (use --provider heuristic for offline scans)",
                        ENV_API_KEY
                    ))
                })?;
                Ok(Arc::new(OpenAIClient::new(self.model.clone(), key)))
            }
        }
    }
}

pub fn load_config(path: &Path) -> Result<ScanConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read config {}: {}", path.display(), e)))?;
    let mut cfg: ScanConfig = serde_yaml::from_str(&raw)
        .map_err(|e| ConfigError(format!("failed to parse YAML: {}", e)))?;
    if cfg.version != SUPPORTED_CONFIG_VERSION {
        return Err(ConfigError(format!(
            "unsupported config version {} (supported: {})",
            cfg.version, SUPPORTED_CONFIG_VERSION
        )));
    }
    if cfg.model.trim().is_empty() {
        return Err(ConfigError("model must not be empty".into()));
    }

    let base_dir = path.parent().unwrap_or(Path::new("."));
    resolve_relative(base_dir, &mut cfg.db);
    resolve_relative(base_dir, &mut cfg.report.out_dir);
    Ok(cfg)
}

/// Rewrites a relative path from the config file as a path from `base_dir`.
fn resolve_relative(base_dir: &Path, s: &mut String) {
    if s.trim().is_empty() || s.as_str() == ":memory:" {
        return;
    }
    let rel = PathBuf::from(&*s);
    if rel.is_absolute() {
        return;
    }
    let mut out = PathBuf::new();
    for c in base_dir.join(rel).components() {
        match c {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    *s = out.to_string_lossy().to_string();
}

/// Loads `path` when it exists, otherwise returns the defaults.
pub fn load_or_default(path: &Path) -> Result<ScanConfig, ConfigError> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(ScanConfig::default())
    }
}

pub fn write_sample_config(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError(format!("failed to create config dir: {}", e)))?;
    }
    std::fs::write(path, SAMPLE_CONFIG)
        .map_err(|e| ConfigError(format!("failed to write sample config: {}", e)))?;
    Ok(())
}
