use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

use crate::vitals::{HealthState, HealthStatus, Vitals};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Soldier,
    Commander,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Soldier {
    pub service_number: String,
    pub full_name: String,
    pub rank: Option<String>,
    pub unit: Option<String>,
    pub device_id: String,
    pub role: Role,
    pub password_hash: String,         // PHC Argon2, jamais exposé par l'API
    pub deployment: Option<DeploymentWindow>,
    #[serde(with = "time::serde::rfc3339")]
    pub registered_at: OffsetDateTime,
}

/// Fenêtre de déploiement planifiée par un commandant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentWindow {
    pub is_deployed: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub start_time: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub end_time: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/// Échantillon de télémétrie stocké (append-only, jamais modifié)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySample {
    pub seq: u64,                      // ordre d'ingestion, départage les timestamps égaux
    pub device_id: String,
    pub heartbeat: Option<f64>,
    pub bp: Option<f64>,
    pub temp: Option<f64>,
    pub location: Option<Location>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl TelemetrySample {
    pub fn vitals(&self) -> Vitals {
        Vitals {
            heartbeat: self.heartbeat,
            bp: self.bp,
            temp: self.temp,
        }
    }
}

/// Alerte persistée dès qu'un échantillon a au moins une constante hors plage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    pub id: String,
    pub device_id: String,
    pub service_number: Option<String>,
    pub sample_seq: u64,
    pub status: HealthState,
    pub color: String,
    pub critical_count: u8,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl AlertRecord {
    pub fn from_health(
        sample: &TelemetrySample,
        service_number: Option<String>,
        health: &HealthStatus,
        created_at: OffsetDateTime,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            device_id: sample.device_id.clone(),
            service_number,
            sample_seq: sample.seq,
            status: health.status,
            color: health.color.clone(),
            critical_count: health.critical_count,
            message: health.message.clone(),
            created_at,
        }
    }
}

/// Payload d'upload envoyé par les bracelets (HTTP ou MQTT)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryIn {
    pub device_id: String,
    #[serde(default, deserialize_with = "lenient_number")]
    pub heartbeat: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub bp: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub temp: Option<f64>,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub timestamp: Option<OffsetDateTime>,
}

/// Accepte n'importe quelle valeur JSON : seuls les nombres sont conservés,
/// le reste (null, chaîne, booléen...) devient "non évaluable".
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_f64())
}
