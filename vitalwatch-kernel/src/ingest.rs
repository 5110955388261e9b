//! Ingestion de la télémétrie, partagée par l'upload HTTP et le listener MQTT.
//!
//! Échantillon classifié → stocké avec son alerte si au moins une
//! constante est hors plage. La persistance d'alerte appartient à cette
//! couche ; `vitals::classify` reste pur.

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::models::{AlertRecord, TelemetryIn, TelemetrySample};
use crate::store::{StoreError, VitalsStore};
use crate::vitals::{classify, HealthStatus};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("deviceId is required")]
    MissingDevice,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOutcome {
    pub sample: TelemetrySample,
    pub health: HealthStatus,
    pub alert: Option<AlertRecord>,
}

pub fn ingest(
    store: &dyn VitalsStore,
    payload: TelemetryIn,
    now: OffsetDateTime,
) -> Result<IngestOutcome, IngestError> {
    let device_id = payload.device_id.trim().to_string();
    if device_id.is_empty() {
        return Err(IngestError::MissingDevice);
    }

    let sample = TelemetrySample {
        seq: 0,
        device_id,
        heartbeat: payload.heartbeat,
        bp: payload.bp,
        temp: payload.temp,
        location: payload.location,
        timestamp: payload.timestamp.unwrap_or(now),
    };

    // classification avant écriture : échantillon et alerte partent ensemble
    let health = classify(&sample.vitals());
    let alert = if health.is_alert() {
        let owner = store.soldier_by_device(&sample.device_id)?;
        Some(AlertRecord::from_health(&sample, owner.map(|s| s.service_number), &health, now))
    } else {
        None
    };
    let (sample, alert) = store.append_telemetry(sample, alert)?;

    if alert.is_some() {
        warn!(
            device = %sample.device_id,
            status = %health.status,
            count = health.critical_count,
            "vitals alert: {}",
            health.message
        );
    } else {
        info!(device = %sample.device_id, seq = sample.seq, "telemetry stored");
    }

    Ok(IngestOutcome { sample, health, alert })
}
