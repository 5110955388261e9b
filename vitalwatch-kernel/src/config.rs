use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use time::Duration;
use tokio::fs;
use tracing::{info, warn};

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct KernelConfig {
    pub http: HttpConf,
    pub storage: StorageConf,
    pub views_dir: PathBuf,
    pub auth: AuthConf,
    pub ingest: IngestConf,
    pub mqtt: Option<MqttConf>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HttpConf {
    pub bind: String, // ex: "0.0.0.0:3010"
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConf {
    pub data_dir: PathBuf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AuthConf {
    /// Matricules qui reçoivent le rôle Commander à l'inscription
    pub commanders: Vec<String>,
    pub session_ttl_minutes: i64,
}

/// Bornes de la durée de session (minutes) : au-delà, `now + ttl` déborde
pub const MIN_SESSION_TTL_MINUTES: i64 = 1;
pub const MAX_SESSION_TTL_MINUTES: i64 = 30 * 24 * 60;

impl AuthConf {
    pub fn session_ttl(&self) -> Duration {
        Duration::minutes(
            self.session_ttl_minutes
                .clamp(MIN_SESSION_TTL_MINUTES, MAX_SESSION_TTL_MINUTES),
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct IngestConf {
    /// Si défini, l'upload HTTP exige l'en-tête x-device-key
    pub device_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
}

fn default_client_id() -> String {
    "vitalwatch-kernel".into()
}

impl Default for HttpConf {
    fn default() -> Self {
        Self { bind: "0.0.0.0:3010".into() }
    }
}

impl Default for StorageConf {
    fn default() -> Self {
        Self { data_dir: PathBuf::from("./data") }
    }
}

impl Default for AuthConf {
    fn default() -> Self {
        Self {
            commanders: vec!["COMMANDER".into()],
            session_ttl_minutes: 480,
        }
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            http: HttpConf::default(),
            storage: StorageConf::default(),
            views_dir: PathBuf::from("./views"),
            auth: AuthConf::default(),
            ingest: IngestConf::default(),
            mqtt: None,
        }
    }
}

impl KernelConfig {
    pub fn is_commander(&self, service_number: &str) -> bool {
        self.auth.commanders.iter().any(|c| c == service_number)
    }

    fn apply_env_overrides(mut self) -> Self {
        if let Ok(bind) = std::env::var("VITALWATCH_BIND") {
            self.http.bind = bind;
        }
        if let Ok(key) = std::env::var("VITALWATCH_DEVICE_KEY") {
            if !key.is_empty() {
                self.ingest.device_key = Some(key);
            }
        }
        self
    }
}

pub fn parse_config(txt: &str) -> Result<KernelConfig, serde_yaml::Error> {
    if txt.trim().is_empty() {
        return Ok(KernelConfig::default());
    }
    serde_yaml::from_str(txt)
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("VITALWATCH_CONFIG").unwrap_or_else(|_| "vitalwatch.yaml".into());
    let cfg = if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        parse_config(&txt).unwrap_or_else(|e| {
            warn!("invalid config {path}: {e}, using defaults");
            KernelConfig::default()
        })
    } else {
        info!("no {path}, using default config");
        KernelConfig::default()
    };
    cfg.apply_env_overrides()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.http.bind, "0.0.0.0:3010");
        assert!(cfg.is_commander("COMMANDER"));
        assert!(!cfg.is_commander("SN-1"));
        assert_eq!(cfg.auth.session_ttl_minutes, 480);
        assert!(cfg.mqtt.is_none());
    }

    #[test]
    fn test_partial_yaml() {
        let cfg = parse_config(
            r#"
storage:
  data_dir: /var/lib/vitalwatch
auth:
  commanders: ["CO-77"]
mqtt:
  host: broker.local
  port: 1883
"#,
        )
        .unwrap();
        assert_eq!(cfg.storage.data_dir, PathBuf::from("/var/lib/vitalwatch"));
        assert!(cfg.is_commander("CO-77"));
        assert!(!cfg.is_commander("COMMANDER"));
        assert_eq!(cfg.auth.session_ttl_minutes, 480);
        let mqtt = cfg.mqtt.unwrap();
        assert_eq!(mqtt.client_id, "vitalwatch-kernel");
        assert_eq!(cfg.http.bind, "0.0.0.0:3010");
    }

    #[test]
    fn test_session_ttl_is_bounded() {
        let mut auth = AuthConf::default();
        assert_eq!(auth.session_ttl(), Duration::hours(8));
        auth.session_ttl_minutes = i64::MAX;
        assert_eq!(auth.session_ttl(), Duration::days(30));
        auth.session_ttl_minutes = -5;
        assert_eq!(auth.session_ttl(), Duration::minutes(1));
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        assert!(parse_config("http: [not, a, map]").is_err());
    }
}
