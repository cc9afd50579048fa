use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::warn;

pub const CONFIG_PATH_ENV: &str = "BIFROST_CONFIG_PATH";

pub const DEFAULT_PROJECT_NAME: &str = "language-tools";
pub const DEFAULT_DESCRIPTION: &str = "Language tools and code analysis";
pub const DEFAULT_PORT: u16 = 8008;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_HEARTBEAT_SECS: u64 = 30;
pub const DEFAULT_MAX_CALL_LEVEL: u32 = 10;

const DEFAULT_INITIALIZE_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
const REFERENCES_TIMEOUT_MS: u64 = 10_000;

/// On-disk project descriptor (`bifrost.config.json` / `bifrost.config.toml`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BifrostConfig {
    #[serde(default, alias = "project_name")]
    pub project_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// URL prefix for every HTTP route, e.g. `"orders"` serves `/orders/sse`.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default, alias = "heartbeat_interval_secs")]
    pub heartbeat_interval_secs: Option<u64>,
    #[serde(default)]
    pub provider: Option<ProviderConfig>,
    #[serde(default, alias = "call_hierarchy")]
    pub call_hierarchy: Option<CallHierarchyConfig>,
}

/// Language server launched to answer code-intelligence queries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Option<Vec<String>>,
    /// languageId sent with textDocument/didOpen (e.g. `csharp`).
    #[serde(default, alias = "language_id")]
    pub language_id: Option<String>,
    #[serde(default, alias = "root_dir")]
    pub root_dir: Option<PathBuf>,
    #[serde(default, alias = "initialize_timeout_ms")]
    pub initialize_timeout_ms: Option<u64>,
    #[serde(default, alias = "request_timeout_ms")]
    pub request_timeout_ms: Option<u64>,
    /// Per-method timeouts keyed by LSP method, e.g. `textDocument/references`.
    #[serde(default, alias = "request_timeout_overrides_ms")]
    pub request_timeout_overrides_ms: Option<HashMap<String, u64>>,
    #[serde(default, alias = "initialization_options")]
    pub initialization_options: Option<JsonValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallHierarchyConfig {
    #[serde(default, alias = "detect_cycles")]
    pub detect_cycles: Option<bool>,
    #[serde(default, alias = "max_call_level")]
    pub max_call_level: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: BifrostConfig,
    pub workspace_root: PathBuf,
    pub source: ConfigSource,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    Default,
    Path(PathBuf),
    Env(PathBuf),
    Workspace(PathBuf),
}

/// Effective settings after defaults and validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectSettings {
    pub project_name: String,
    pub description: String,
    pub base_path: String,
    pub host: String,
    pub port: u16,
    pub heartbeat_interval: Duration,
    pub provider: Option<ResolvedProviderConfig>,
    pub detect_cycles: bool,
    pub max_call_level: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedProviderConfig {
    pub command: String,
    pub args: Vec<String>,
    pub language_id: Option<String>,
    pub root_dir: PathBuf,
    pub initialize_timeout: Duration,
    pub request_timeout: Duration,
    pub request_timeout_overrides: HashMap<String, Duration>,
    pub initialization_options: Option<JsonValue>,
}

impl ResolvedProviderConfig {
    pub fn timeout_for(&self, method: &str) -> Duration {
        self.request_timeout_overrides
            .get(method)
            .copied()
            .unwrap_or(self.request_timeout)
    }
}

impl BifrostConfig {
    /// Checks the required fields: non-empty `projectName` and `description`, and a `path` (may be empty).
    pub fn validate_identity(&self) -> Result<()> {
        let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        if !filled(&self.project_name) {
            return Err(anyhow!("projectName is missing or empty"));
        }
        if !filled(&self.description) {
            return Err(anyhow!("description is missing or empty"));
        }
        if self.path.is_none() {
            return Err(anyhow!("path is missing"));
        }
        Ok(())
    }
}

pub fn load_config(
    cli_config_path: Option<&Path>,
    cli_workspace_root: Option<&Path>,
) -> Result<LoadedConfig> {
    let workspace_root = resolve_workspace_root(cli_workspace_root)?;

    if let Some(path) = cli_config_path {
        let config = read_config_file(path)?;
        return Ok(LoadedConfig {
            config,
            workspace_root,
            source: ConfigSource::Path(path.to_path_buf()),
        });
    }

    if let Ok(path) = std::env::var(CONFIG_PATH_ENV)
        && !path.trim().is_empty()
    {
        let path = PathBuf::from(path);
        let config = read_config_file(&path)?;
        return Ok(LoadedConfig {
            config,
            workspace_root,
            source: ConfigSource::Env(path),
        });
    }

    for candidate in workspace_config_candidates(&workspace_root) {
        if !candidate.exists() {
            continue;
        }
        match read_config_file(&candidate) {
            Ok(config) => {
                return Ok(LoadedConfig {
                    config,
                    workspace_root,
                    source: ConfigSource::Workspace(candidate),
                });
            }
            Err(err) => {
                warn!(
                    "ignoring invalid config {}: {err:#}; using defaults",
                    candidate.display()
                );
                break;
            }
        }
    }

    Ok(LoadedConfig {
        config: BifrostConfig::default(),
        workspace_root,
        source: ConfigSource::Default,
    })
}

fn resolve_workspace_root(cli: Option<&Path>) -> Result<PathBuf> {
    let root = match cli {
        Some(p) => p.to_path_buf(),
        None => std::env::current_dir().context("failed to get current_dir")?,
    };
    root.canonicalize()
        .with_context(|| format!("failed to canonicalize workspace root: {root:?}"))
}

fn workspace_config_candidates(workspace_root: &Path) -> Vec<PathBuf> {
    vec![
        workspace_root.join("bifrost.config.json"),
        workspace_root.join("bifrost.config.toml"),
    ]
}

pub fn read_config_file(path: &Path) -> Result<BifrostConfig> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read config file: {path:?}"))?;
    let ext = path.extension().and_then(OsStr::to_str).unwrap_or("");

    if ext.eq_ignore_ascii_case("toml") {
        let s = String::from_utf8(bytes).context("config file is not valid UTF-8")?;
        return toml::from_str(&s).context("failed to parse TOML config");
    }
    if ext.eq_ignore_ascii_case("json") {
        return serde_json::from_slice(&bytes).context("failed to parse JSON config");
    }

    Err(anyhow!(
        "unsupported config extension (expected .json or .toml): {path:?}"
    ))
}

/// Leading-slash normalized route prefix; empty means routes live at the root.
pub fn normalize_base_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

pub fn resolve_settings(config: &BifrostConfig, workspace_root: &Path) -> ProjectSettings {
    let defaults = BifrostConfig::default();
    let config = match config.validate_identity() {
        Ok(()) => config,
        Err(err) => {
            if *config != defaults {
                warn!("invalid project config ({err}); using defaults");
            }
            &defaults
        }
    };
    let project_name = config
        .project_name
        .clone()
        .unwrap_or_else(|| DEFAULT_PROJECT_NAME.to_string());
    let description = config
        .description
        .clone()
        .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());
    let path = config.path.clone().unwrap_or_default();

    let call_hierarchy = config.call_hierarchy.clone().unwrap_or_default();

    ProjectSettings {
        project_name,
        description,
        base_path: normalize_base_path(&path),
        host: config
            .host
            .clone()
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_string()),
        port: config.port.unwrap_or(DEFAULT_PORT),
        heartbeat_interval: Duration::from_secs(
            config
                .heartbeat_interval_secs
                .filter(|s| *s > 0)
                .unwrap_or(DEFAULT_HEARTBEAT_SECS),
        ),
        provider: config
            .provider
            .as_ref()
            .and_then(|p| resolve_provider(p, workspace_root)),
        detect_cycles: call_hierarchy.detect_cycles.unwrap_or(true),
        max_call_level: call_hierarchy
            .max_call_level
            .unwrap_or(DEFAULT_MAX_CALL_LEVEL),
    }
}

fn resolve_provider(
    provider: &ProviderConfig,
    workspace_root: &Path,
) -> Option<ResolvedProviderConfig> {
    let command = provider
        .command
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())?
        .to_string();

    let root_dir = match provider.root_dir.as_deref() {
        None => workspace_root.to_path_buf(),
        Some(p) if p.is_absolute() => p.to_path_buf(),
        Some(p) => workspace_root.join(p),
    };

    let mut overrides: HashMap<String, Duration> = HashMap::from([(
        "textDocument/references".to_string(),
        Duration::from_millis(REFERENCES_TIMEOUT_MS),
    )]);
    for (method, ms) in provider
        .request_timeout_overrides_ms
        .clone()
        .unwrap_or_default()
    {
        let method = method.trim().to_string();
        if method.is_empty() || ms == 0 {
            continue;
        }
        overrides.insert(method, Duration::from_millis(ms));
    }

    Some(ResolvedProviderConfig {
        command,
        args: provider.args.clone().unwrap_or_default(),
        language_id: provider
            .language_id
            .clone()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        root_dir: root_dir.canonicalize().unwrap_or(root_dir),
        initialize_timeout: Duration::from_millis(
            provider
                .initialize_timeout_ms
                .unwrap_or(DEFAULT_INITIALIZE_TIMEOUT_MS),
        ),
        request_timeout: Duration::from_millis(
            provider
                .request_timeout_ms
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
        ),
        request_timeout_overrides: overrides,
        initialization_options: provider.initialization_options.clone(),
    })
}
