use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};
use uuid::Uuid;

use crate::error::ConfigError;
use crate::timing::{StartBaseline, DEFAULT_DURATION_SECS};

/// A recorder listed by `/recorders` and aggregated by `/sessions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecorderEntry {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,

    // Vendor platform
    pub vendor_host: String,
    pub vendor_path_prefix: String,
    pub vendor_username: String,
    pub vendor_password: String,
    pub vendor_timeout_secs: u64,
    pub default_folder_id: Option<Uuid>,

    // Credential gate
    pub gate_username: String,
    pub gate_password: String,
    pub realm: String,

    // Recorder registry
    pub recorders: Vec<RecorderEntry>,

    // Route behaviour
    pub start_baseline: StartBaseline,
    pub default_duration_secs: f64,
    pub filter_today: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            vendor_host: String::new(),
            vendor_path_prefix: "/Panopto".to_string(),
            vendor_username: String::new(),
            vendor_password: String::new(),
            vendor_timeout_secs: 300, // 5 minutes, send and receive
            default_folder_id: None,
            gate_username: String::new(),
            gate_password: String::new(),
            realm: "Recorder Proxy".to_string(),
            recorders: Vec::new(),
            start_baseline: StartBaseline::OriginalStart,
            default_duration_secs: DEFAULT_DURATION_SECS,
            filter_today: true,
        }
    }
}

fn invalid(what: &str, err: impl std::fmt::Display) -> ConfigError {
    ConfigError::Invalid(format!("{}: {}", what, err))
}

/// Parses `name=uuid,name=uuid`.
pub fn parse_recorder_list(raw: &str) -> Result<Vec<RecorderEntry>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            let (name, id) = item
                .rsplit_once('=')
                .ok_or_else(|| invalid("recorder entry", format!("'{}' is not name=uuid", item)))?;
            let id = Uuid::parse_str(id.trim()).map_err(|e| invalid("recorder id", e))?;
            Ok(RecorderEntry {
                id,
                name: name.trim().to_string(),
            })
        })
        .collect()
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("RECORDER_PROXY_BIND_ADDR") {
            config.bind_addr = addr.parse().map_err(|e| invalid("bind_addr", e))?;
        }

        if let Ok(host) = std::env::var("RECORDER_PROXY_VENDOR_HOST") {
            config.vendor_host = host;
        }

        if let Ok(prefix) = std::env::var("RECORDER_PROXY_VENDOR_PATH_PREFIX") {
            config.vendor_path_prefix = prefix;
        }

        if let Ok(user) = std::env::var("RECORDER_PROXY_VENDOR_USERNAME") {
            config.vendor_username = user;
        }

        if let Ok(pass) = std::env::var("RECORDER_PROXY_VENDOR_PASSWORD") {
            config.vendor_password = pass;
        }

        if let Ok(secs) = std::env::var("RECORDER_PROXY_VENDOR_TIMEOUT_SECS") {
            config.vendor_timeout_secs = secs.parse().map_err(|e| invalid("vendor_timeout_secs", e))?;
        }

        if let Ok(folder) = std::env::var("RECORDER_PROXY_DEFAULT_FOLDER_ID") {
            if !folder.trim().is_empty() {
                config.default_folder_id =
                    Some(Uuid::parse_str(folder.trim()).map_err(|e| invalid("default_folder_id", e))?);
            }
        }

        if let Ok(user) = std::env::var("RECORDER_PROXY_GATE_USERNAME") {
            config.gate_username = user;
        }

        if let Ok(pass) = std::env::var("RECORDER_PROXY_GATE_PASSWORD") {
            config.gate_password = pass;
        }

        if let Ok(realm) = std::env::var("RECORDER_PROXY_REALM") {
            config.realm = realm;
        }

        if let Ok(list) = std::env::var("RECORDER_PROXY_RECORDERS") {
            config.recorders = parse_recorder_list(&list)?;
        }

        if let Ok(baseline) = std::env::var("RECORDER_PROXY_START_BASELINE") {
            config.start_baseline = baseline.parse().map_err(|e: String| invalid("start_baseline", e))?;
        }

        if let Ok(secs) = std::env::var("RECORDER_PROXY_DEFAULT_DURATION_SECS") {
            config.default_duration_secs = secs.parse().map_err(|e| invalid("default_duration_secs", e))?;
        }

        if let Ok(flag) = std::env::var("RECORDER_PROXY_FILTER_TODAY") {
            config.filter_today = flag.parse().map_err(|e| invalid("filter_today", e))?;
        }

        Ok(config)
    }

    pub fn from_toml(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// `RECORDER_PROXY_CONFIG` names a TOML file; otherwise the environment is used.
    pub fn load() -> Result<Self, ConfigError> {
        let config = match std::env::var("RECORDER_PROXY_CONFIG") {
            Ok(path) => Self::from_toml(path)?,
            Err(_) => Self::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vendor_host.trim().is_empty() {
            return Err(ConfigError::Invalid("vendor_host must be set".into()));
        }

        if self.vendor_username.is_empty() || self.vendor_password.is_empty() {
            return Err(ConfigError::Invalid(
                "vendor_username and vendor_password must be set".into(),
            ));
        }

        if self.gate_username.is_empty() || self.gate_password.is_empty() {
            return Err(ConfigError::Invalid(
                "gate_username and gate_password must be set".into(),
            ));
        }

        if self.gate_username.contains(':') {
            return Err(ConfigError::Invalid("gate_username must not contain ':'".into()));
        }

        if self.vendor_timeout_secs == 0 {
            return Err(ConfigError::Invalid("vendor_timeout_secs must be > 0".into()));
        }

        if self.default_duration_secs.is_nan() || self.default_duration_secs <= 0.0 {
            return Err(ConfigError::Invalid("default_duration_secs must be > 0".into()));
        }

        url::Url::parse(&self.vendor_base_url()).map_err(|e| invalid("vendor_host", e))?;

        Ok(())
    }

    /// Base URL of the vendor; a bare hostname is served over HTTPS.
    pub fn vendor_base_url(&self) -> String {
        let host = self.vendor_host.trim().trim_end_matches('/');
        if host.contains("://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        }
    }

    pub fn vendor_timeout(&self) -> Duration {
        Duration::from_secs(self.vendor_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ServerConfig {
        ServerConfig {
            vendor_host: "video.example.edu".into(),
            vendor_username: "svc".into(),
            vendor_password: "pw".into(),
            gate_username: "gate".into(),
            gate_password: "secret".into(),
            ..Default::default()
        }
    }

    #[test]
    fn bare_host_becomes_https() {
        assert_eq!(valid().vendor_base_url(), "https://video.example.edu");

        let mut config = valid();
        config.vendor_host = "http://127.0.0.1:9000/".into();
        assert_eq!(config.vendor_base_url(), "http://127.0.0.1:9000");
    }

    #[test]
    fn validate_requires_credentials() {
        assert!(valid().validate().is_ok());

        let mut config = valid();
        config.vendor_host.clear();
        assert!(config.validate().is_err());

        let mut config = valid();
        config.gate_password.clear();
        assert!(config.validate().is_err());

        let mut config = valid();
        config.vendor_password.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn recorder_list_parses_pairs() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let list = parse_recorder_list(&format!("Room 1={}, Hall B = {} ,", a, b)).unwrap();
        assert_eq!(
            list,
            vec![
                RecorderEntry { id: a, name: "Room 1".into() },
                RecorderEntry { id: b, name: "Hall B".into() },
            ]
        );
        assert!(parse_recorder_list("Room 1").is_err());
        assert!(parse_recorder_list("Room 1=not-a-uuid").is_err());
    }

    #[test]
    fn toml_fills_defaults() {
        let id = Uuid::new_v4();
        let config = ServerConfig::from_toml_str(&format!(
            r#"
            vendor_host = "video.example.edu"
            vendor_username = "svc"
            vendor_password = "pw"
            gate_username = "gate"
            gate_password = "secret"
            start_baseline = "now"

            [[recorders]]
            id = "{}"
            name = "Room 12"
            "#,
            id
        ))
        .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.start_baseline, StartBaseline::Now);
        assert_eq!(config.vendor_timeout_secs, 300);
        assert_eq!(config.realm, "Recorder Proxy");
        assert_eq!(config.recorders, vec![RecorderEntry { id, name: "Room 12".into() }]);
    }
}
