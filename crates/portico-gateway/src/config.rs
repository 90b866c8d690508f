//! Gateway configuration.
//!
//! Settings are read from a YAML, TOML or JSON file (format detected from the
//! extension) after `${VAR}` / `$VAR` environment substitution, then
//! overridden by `PORTICO__SECTION__KEY` environment variables.  API
//! definitions are separate files listed under `apis`.

use config::{Config as Cfg, Environment, File, FileFormat};
use once_cell::sync::Lazy;
use portico_kernel::ApiDefinition;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment prefix of configuration overrides.
pub const ENV_PREFIX: &str = "PORTICO";

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parsing error: {0}")]
    Parse(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid API definition '{path}': {reason}")]
    ApiDefinition { path: String, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// ─────────────────────────────────────────────────────────────────────────────
// Settings
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub port: u16,
    /// Upper bound of one API execution; `0` disables it.
    pub request_timeout_ms: u64,
    /// How long an undeploy waits for in-flight requests.
    pub drain_timeout_ms: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            port: 8082,
            request_timeout_ms: 30_000,
            drain_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderSetting {
    pub header: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardedHeadersSettings {
    pub x_forwarded_prefix: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientIpSettings {
    pub x_forward_enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Toggle {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestHandlerSettings {
    pub transaction: HeaderSetting,
    pub request: HeaderSetting,
    pub headers: ForwardedHeadersSettings,
    pub client_ip: ClientIpSettings,
    pub trace_context: Toggle,
}

impl Default for RequestHandlerSettings {
    fn default() -> Self {
        Self {
            transaction: HeaderSetting {
                header: "X-Gravitee-Transaction-Id".to_string(),
            },
            request: HeaderSetting {
                header: "X-Gravitee-Request-Id".to_string(),
            },
            headers: ForwardedHeadersSettings::default(),
            client_ip: ClientIpSettings::default(),
            trace_context: Toggle::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlersSettings {
    pub request: RequestHandlerSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportersSettings {
    pub enabled: bool,
    /// Bodies captured by API logging are truncated to this many bytes.
    pub logging_max_size: Option<usize>,
}

impl Default for ReportersSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            logging_max_size: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    pub api_keys: Vec<String>,
    pub api_key_header: String,
    pub api_key_query_param: String,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            api_key_header: "X-Gravitee-Api-Key".to_string(),
            api_key_query_param: "api-key".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub json: bool,
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    pub filter: Option<String>,
}

/// Root configuration of a gateway node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub http: HttpSettings,
    pub handlers: HandlersSettings,
    pub tracing: Toggle,
    pub reporters: ReportersSettings,
    pub alerts: Toggle,
    pub security: SecuritySettings,
    /// Paths of API definition files deployed at startup.
    pub apis: Vec<String>,
    pub logging: LogSettings,
}

impl GatewayConfig {
    /// Load from an optional file, then apply `PORTICO__*` overrides.
    pub fn load(path: Option<&str>) -> ConfigResult<Self> {
        let mut builder = Cfg::builder();
        if let Some(path) = path {
            let format = detect_format(path)?;
            let content = std::fs::read_to_string(path)?;
            builder = builder.add_source(File::from_str(&substitute_env_vars(&content), format));
        }
        builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("security.api_keys")
                    .with_list_parse_key("apis"),
            )
            .build()
            .map_err(|e| ConfigError::Parse(e.to_string()))?
            .try_deserialize()
            .map_err(|e| ConfigError::Serialization(e.to_string()))
    }

    /// Read and validate every API definition listed under `apis`.
    pub fn api_definitions(&self) -> ConfigResult<Vec<ApiDefinition>> {
        self.apis.iter().map(|p| load_api_definition(p)).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Loading helpers
// ─────────────────────────────────────────────────────────────────────────────

static BRACED_VAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"));
static SIMPLE_VAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)\b").expect("valid regex"));

/// Detect configuration format from file extension.
pub fn detect_format(path: &str) -> ConfigResult<FileFormat> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ConfigError::UnsupportedFormat("No file extension found".to_string()))?;

    match ext.to_lowercase().as_str() {
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        "toml" => Ok(FileFormat::Toml),
        "json" => Ok(FileFormat::Json),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

/// Substitute `${VAR}` and `$VAR` references; unknown variables are kept.
pub fn substitute_env_vars(content: &str) -> String {
    let braced = BRACED_VAR.replace_all(content, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    });
    SIMPLE_VAR
        .replace_all(&braced, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

/// Load any deserializable configuration from a string with explicit format.
pub fn from_str<T: DeserializeOwned>(content: &str, format: FileFormat) -> ConfigResult<T> {
    Cfg::builder()
        .add_source(File::from_str(&substitute_env_vars(content), format))
        .build()
        .map_err(|e| ConfigError::Parse(e.to_string()))?
        .try_deserialize()
        .map_err(|e| ConfigError::Serialization(e.to_string()))
}

/// Load one API definition file (YAML or JSON) and validate it.
///
/// Definitions are parsed with `serde_yaml`/`serde_json` directly so that
/// case-sensitive keys (error keys, header names, properties) survive.
pub fn load_api_definition(path: &str) -> ConfigResult<ApiDefinition> {
    let content = substitute_env_vars(&std::fs::read_to_string(path)?);
    let invalid = |reason: String| ConfigError::ApiDefinition {
        path: path.to_string(),
        reason,
    };
    let api: ApiDefinition = match detect_format(path)? {
        FileFormat::Json => serde_json::from_str(&content).map_err(|e| invalid(e.to_string()))?,
        FileFormat::Yaml => serde_yaml::from_str(&content).map_err(|e| invalid(e.to_string()))?,
        other => return Err(ConfigError::UnsupportedFormat(format!("{other:?}"))),
    };
    api.validate().map_err(|e| invalid(e.to_string()))?;
    Ok(api)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn detects_supported_formats() {
        assert_eq!(detect_format("gateway.yml").unwrap(), FileFormat::Yaml);
        assert_eq!(detect_format("gateway.toml").unwrap(), FileFormat::Toml);
        assert_eq!(detect_format("gateway.json").unwrap(), FileFormat::Json);
        assert!(detect_format("gateway.txt").is_err());
        assert!(detect_format("gateway").is_err());
    }

    #[test]
    fn unknown_variables_are_kept() {
        assert_eq!(
            substitute_env_vars("key: ${PORTICO_TEST_SURELY_UNSET}"),
            "key: ${PORTICO_TEST_SURELY_UNSET}"
        );
    }

    #[test]
    fn defaults_apply_to_missing_sections() {
        let cfg: GatewayConfig = from_str("http:\n  port: 9000\n", FileFormat::Yaml).unwrap();
        assert_eq!(cfg.http.port, 9000);
        assert_eq!(cfg.http.request_timeout_ms, 30_000);
        assert_eq!(
            cfg.handlers.request.transaction.header,
            "X-Gravitee-Transaction-Id"
        );
        assert!(cfg.reporters.enabled);
        assert!(!cfg.alerts.enabled);
    }

    #[test]
    fn toml_sections_are_read() {
        let toml = r#"
[security]
api_keys = ["k1", "k2"]

[handlers.request.trace_context]
enabled = true
"#;
        let cfg: GatewayConfig = from_str(toml, FileFormat::Toml).unwrap();
        assert_eq!(cfg.security.api_keys, vec!["k1", "k2"]);
        assert!(cfg.handlers.request.trace_context.enabled);
    }

    #[test]
    fn api_definition_files_keep_key_case() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("echo.yml");
        fs::write(
            &path,
            r#"
id: echo
listeners:
  - type: http
    paths: ["/echo"]
    entrypoints: [{ type: http-proxy }]
response_templates:
  API_KEY_MISSING:
    application/json: { status: 401, body: "{}" }
"#,
        )
        .unwrap();
        let api = load_api_definition(path.to_str().unwrap()).unwrap();
        assert!(api.response_templates.contains_key("API_KEY_MISSING"));
    }

    #[test]
    fn invalid_api_definition_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, r#"{ "id": "broken", "listeners": [] }"#).unwrap();
        let err = load_api_definition(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::ApiDefinition { .. }));
    }
}
