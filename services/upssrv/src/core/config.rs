//! Configuration loading
//!
//! Layers, lowest to highest priority:
//! 1. built-in defaults
//! 2. YAML file (`config/upssrv.yaml` unless `--config-file` names another)
//! 3. `UPSSRV_*` environment variables, nested keys split on `__`
//!    (e.g. `UPSSRV_SERVER__LISTEN_ADDRESS`)
//!
//! Command-line flags are applied on top by the bootstrap code. String keys
//! are taken from the environment verbatim, so `UPSSRV_COMMUNITY=0123` stays
//! `"0123"` instead of turning into a number.

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::catalogue::DEFAULT_PREFIX;
use crate::core::coordinator::ScrapeSettings;
use crate::core::family::{FamilyRegistry, DEFAULT_FAMILY};
use crate::core::target::{TargetConfig, TargetDefaults};
use crate::core::transport::SnmpVersion;
use errors::{config_error, ServiceError, ServiceResult};

/// Default configuration file path
pub const DEFAULT_CONFIG_FILE: &str = "config/upssrv.yaml";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "UPSSRV_";

pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:9332";
pub const DEFAULT_METRICS_PATH: &str = "/metrics";
pub const DEFAULT_COMMUNITY: &str = "public";

/// Paths the router serves itself
pub const RESERVED_PATHS: &[&str] = &["/", "/health"];

/// Keys read from the environment without value parsing
const TEXT_KEYS: &[&str] = &[
    "community",
    "family",
    "prefix",
    "snmp_version",
    "server.listen_address",
    "server.metrics_path",
    "logging.dir",
];

/// Where the file layer came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Read from this file
    File(PathBuf),
    /// The default file was absent; defaults and environment only
    Defaults(PathBuf),
}

/// Service configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Community used by targets without an override
    #[serde(deserialize_with = "deserialize_text")]
    pub community: String,
    /// Family used by targets without an override (`auto` detects)
    #[serde(deserialize_with = "deserialize_text")]
    pub family: String,
    /// Metric name prefix
    #[serde(deserialize_with = "deserialize_text")]
    pub prefix: String,
    /// `1` or `2c`
    #[serde(deserialize_with = "deserialize_text")]
    pub snmp_version: String,
    /// Bound for each SNMP request
    pub session_timeout_ms: u64,
    /// Deadline for one target's whole cycle, 0 disables it
    pub scrape_timeout_ms: u64,
    #[serde(deserialize_with = "deserialize_targets")]
    pub targets: Vec<TargetConfig>,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_address: String,
    pub metrics_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log root directory (`UPSSRV_LOG_DIR` wins)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            community: DEFAULT_COMMUNITY.to_string(),
            family: DEFAULT_FAMILY.to_string(),
            prefix: DEFAULT_PREFIX.to_string(),
            snmp_version: SnmpVersion::default().to_string(),
            session_timeout_ms: 2_000,
            scrape_timeout_ms: 10_000,
            targets: Vec::new(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            metrics_path: DEFAULT_METRICS_PATH.to_string(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Bool(bool),
}

impl From<Scalar> for String {
    fn from(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Text(text) => text,
            Scalar::Unsigned(n) => n.to_string(),
            Scalar::Signed(n) => n.to_string(),
            Scalar::Float(n) => n.to_string(),
            Scalar::Bool(b) => b.to_string(),
        }
    }
}

/// Any scalar as text, so `community: 12345` reads as `"12345"`
pub(crate) fn deserialize_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Scalar::deserialize(deserializer).map(String::from)
}

pub(crate) fn deserialize_optional_text<'de, D>(
    deserializer: D,
) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Scalar>::deserialize(deserializer)?.map(String::from))
}

/// `targets` as a list of entries, or as one comma-separated string (env)
fn deserialize_targets<'de, D>(deserializer: D) -> Result<Vec<TargetConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Targets {
        List(Vec<TargetConfig>),
        Csv(String),
    }

    Ok(match Targets::deserialize(deserializer)? {
        Targets::List(list) => list,
        Targets::Csv(csv) => csv
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| TargetConfig::Address(s.to_string()))
            .collect(),
    })
}

impl Config {
    /// Load from `path` (or the default file) and the environment
    ///
    /// A file named explicitly must exist; the default file is optional.
    /// Nothing is logged here since logging is not up yet; the returned
    /// source says what was read.
    pub fn load(path: Option<&Path>) -> ServiceResult<(Self, ConfigSource)> {
        Self::load_layers(path, Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub(crate) fn load_layers(
        path: Option<&Path>,
        env: Env,
    ) -> ServiceResult<(Self, ConfigSource)> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        let source = if path.is_file() {
            figment = figment.merge(Yaml::file(&path));
            ConfigSource::File(path)
        } else if explicit {
            return Err(config_error!(
                "configuration file {} not found",
                path.display()
            ));
        } else {
            ConfigSource::Defaults(path)
        };

        figment = figment.merge(env.clone().ignore(TEXT_KEYS));
        for (key, value) in env.only(TEXT_KEYS).iter() {
            figment = figment.merge((key.as_str().to_string(), value));
        }

        let config = figment
            .extract()
            .map_err(|e| config_error!("failed to load configuration: {}", e))?;
        Ok((config, source))
    }

    /// Check values that deserialisation alone cannot
    pub fn validate(&self, registry: &FamilyRegistry) -> ServiceResult<()> {
        let path = &self.server.metrics_path;
        if !path.starts_with('/') || RESERVED_PATHS.contains(&path.as_str()) {
            return Err(invalid(
                "server.metrics_path",
                format!(
                    "'{}' must start with '/' and must not be one of {:?}",
                    path, RESERVED_PATHS
                ),
            ));
        }
        if self.server.listen_address.trim().is_empty() {
            return Err(invalid("server.listen_address", "must not be empty"));
        }
        if self.session_timeout_ms == 0 {
            return Err(invalid("session_timeout_ms", "must be greater than 0"));
        }
        self.snmp_version()?;
        if self.prefix.is_empty() || !is_metric_name(&self.prefix) {
            return Err(invalid(
                "prefix",
                format!("'{}' is not a valid metric name prefix", self.prefix),
            ));
        }

        registry.select(&self.family).map_err(ServiceError::from)?;
        for target in &self.targets {
            if let Some(family) = target.family() {
                registry.select(family).map_err(ServiceError::from)?;
            }
        }
        Ok(())
    }

    pub fn snmp_version(&self) -> ServiceResult<SnmpVersion> {
        self.snmp_version
            .parse()
            .map_err(|reason: String| invalid("snmp_version", reason))
    }

    pub fn target_defaults(&self) -> TargetDefaults {
        TargetDefaults {
            community: self.community.clone(),
            family: self.family.clone(),
        }
    }

    pub fn scrape_settings(&self) -> ScrapeSettings {
        ScrapeSettings {
            session_timeout: Duration::from_millis(self.session_timeout_ms),
            scrape_timeout: (self.scrape_timeout_ms > 0)
                .then(|| Duration::from_millis(self.scrape_timeout_ms)),
        }
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ServiceError {
    ServiceError::InvalidConfig {
        field: field.to_string(),
        reason: reason.into(),
    }
}

/// `[a-zA-Z_:][a-zA-Z0-9_:]*`
fn is_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == ':')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use std::io::Write;

    fn yaml_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    /// Environment layer that no real variable can reach
    fn isolated_env(tag: &str) -> Env {
        Env::prefixed(&format!("UPSSRV_TEST_{}_", tag)).split("__")
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.community, "public");
        assert_eq!(config.family, "xups");
        assert_eq!(config.prefix, "eaton_usv_");
        assert_eq!(config.server.listen_address, "0.0.0.0:9332");
        assert_eq!(config.server.metrics_path, "/metrics");
        assert_eq!(config.snmp_version().unwrap(), SnmpVersion::V1);
        let settings = config.scrape_settings();
        assert_eq!(settings.session_timeout, Duration::from_secs(2));
        assert_eq!(settings.scrape_timeout, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_yaml_file_overrides_defaults() {
        let file = yaml_file(
            r#"
community: private
family: mge
targets:
  - 10.0.0.1
  - address: 10.0.0.2
    community: other
server:
  metrics_path: /ups
"#,
        );
        let config = Config::load_layers(Some(file.path()), isolated_env("YAML"))
            .unwrap()
            .0;
        assert_eq!(config.community, "private");
        assert_eq!(config.family, "mge");
        assert_eq!(config.targets.len(), 2);
        assert_eq!(config.targets[1].community(), Some("other"));
        assert_eq!(config.server.metrics_path, "/ups");
        // untouched keys keep their defaults
        assert_eq!(config.server.listen_address, DEFAULT_LISTEN_ADDRESS);
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = yaml_file("community: private\n");
        std::env::set_var("UPSSRV_TEST_ENV_COMMUNITY", "from-env");
        std::env::set_var("UPSSRV_TEST_ENV_SERVER__LISTEN_ADDRESS", "127.0.0.1:9999");
        std::env::set_var("UPSSRV_TEST_ENV_TARGETS", "10.0.0.7, 10.0.0.8");

        let config = Config::load_layers(Some(file.path()), isolated_env("ENV"))
            .unwrap()
            .0;
        assert_eq!(config.community, "from-env");
        assert_eq!(config.server.listen_address, "127.0.0.1:9999");
        assert_eq!(
            config.targets,
            vec![
                TargetConfig::Address("10.0.0.7".into()),
                TargetConfig::Address("10.0.0.8".into()),
            ]
        );
    }

    #[test]
    fn test_numeric_values_read_as_text() {
        let file = yaml_file(
            r#"
community: 12345
snmp_version: 2c
targets:
  - address: 10.0.0.2
    community: 4242
"#,
        );
        let config = Config::load_layers(Some(file.path()), isolated_env("NUMYAML"))
            .unwrap()
            .0;
        assert_eq!(config.community, "12345");
        assert_eq!(config.snmp_version().unwrap(), SnmpVersion::V2c);
        assert_eq!(config.targets[0].community(), Some("4242"));

        std::env::set_var("UPSSRV_TEST_NUMENV_COMMUNITY", "0123");
        std::env::set_var("UPSSRV_TEST_NUMENV_SESSION_TIMEOUT_MS", "500");
        std::env::set_var("UPSSRV_TEST_NUMENV_SNMP_VERSION", "1");
        let config = Config::load_layers(Some(file.path()), isolated_env("NUMENV"))
            .unwrap()
            .0;
        // leading zero survives, numeric keys still parse
        assert_eq!(config.community, "0123");
        assert_eq!(config.session_timeout_ms, 500);
        assert_eq!(config.snmp_version().unwrap(), SnmpVersion::V1);
    }

    #[test]
    fn test_source_reports_file_or_defaults() {
        let file = yaml_file("community: private\n");
        let (_, source) = Config::load_layers(Some(file.path()), isolated_env("SRC")).unwrap();
        assert_eq!(source, ConfigSource::File(file.path().to_path_buf()));

        // the default file is resolved against the working directory
        if !Path::new(DEFAULT_CONFIG_FILE).exists() {
            let (config, source) = Config::load_layers(None, isolated_env("SRC")).unwrap();
            assert_eq!(
                source,
                ConfigSource::Defaults(PathBuf::from(DEFAULT_CONFIG_FILE))
            );
            assert_eq!(config.community, DEFAULT_COMMUNITY);
        }
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.yaml");
        let err = Config::load_layers(Some(&missing), isolated_env("MISSING")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let file = yaml_file("session_timeout_ms: soon\n");
        assert!(Config::load_layers(Some(file.path()), isolated_env("BAD")).is_err());
    }

    #[test]
    fn test_validate() {
        let registry = FamilyRegistry::builtin();
        assert!(Config::default().validate(&registry).is_ok());

        let mut config = Config::default();
        config.server.metrics_path = "/".into();
        assert!(matches!(
            config.validate(&registry),
            Err(ServiceError::InvalidConfig { .. })
        ));

        for reserved in ["/health", "metrics"] {
            let mut config = Config::default();
            config.server.metrics_path = reserved.into();
            assert!(matches!(
                config.validate(&registry),
                Err(ServiceError::InvalidConfig { .. })
            ));
        }

        let mut config = Config::default();
        config.snmp_version = "3".into();
        assert!(matches!(
            config.validate(&registry),
            Err(ServiceError::InvalidConfig { .. })
        ));

        let mut config = Config::default();
        config.session_timeout_ms = 0;
        assert!(config.validate(&registry).is_err());

        let mut config = Config::default();
        config.prefix = "9ups-".into();
        assert!(config.validate(&registry).is_err());

        let mut config = Config::default();
        config.targets = vec![TargetConfig::Detailed {
            address: "10.0.0.1".into(),
            community: None,
            family: Some("apc".into()),
        }];
        assert!(matches!(
            config.validate(&registry),
            Err(ServiceError::UnknownFamily(_))
        ));
    }

    #[test]
    fn test_zero_scrape_timeout_disables_deadline() {
        let config = Config {
            scrape_timeout_ms: 0,
            ..Config::default()
        };
        assert_eq!(config.scrape_settings().scrape_timeout, None);
    }
}
