use crate::config::MqttConf;
use crate::health::HealthTracker;
use crate::ingest::ingest;
use crate::models::TelemetryIn;
use crate::store::VitalsStore;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::task;
use tracing::{error, info, warn};

pub const TELEMETRY_TOPIC: &str = "vitalwatch/telemetry@v1";

/// Traite un payload MQTT brut ; retourne vrai si l'échantillon a été stocké
pub fn handle_telemetry_payload(
    store: &dyn VitalsStore,
    health: &HealthTracker,
    payload: &[u8],
    now: OffsetDateTime,
) -> bool {
    let parsed: TelemetryIn = match serde_json::from_slice(payload) {
        Ok(p) => p,
        Err(e) => {
            warn!("invalid telemetry JSON on {TELEMETRY_TOPIC}: {e}");
            return false;
        }
    };
    match ingest(store, parsed, now) {
        Ok(outcome) => {
            health.record_sample(outcome.alert.is_some());
            true
        }
        Err(e) => {
            error!("telemetry ingest failed: {e}");
            false
        }
    }
}

pub fn spawn_telemetry_listener(mqtt: MqttConf, store: Arc<dyn VitalsStore>, health: HealthTracker) {
    task::spawn(async move {
        let mut opts = MqttOptions::new(mqtt.client_id.clone(), &mqtt.host, mqtt.port);
        opts.set_keep_alive(std::time::Duration::from_secs(15));
        let (client, mut eventloop) = AsyncClient::new(opts, 10);
        info!("listening for telemetry on {}:{} ({TELEMETRY_TOPIC})", mqtt.host, mqtt.port);

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    health.mark_mqtt_connected();
                    // abonnement à chaque ConnAck : rumqttc ne le rejoue pas après reconnexion
                    if let Err(e) = client.try_subscribe(TELEMETRY_TOPIC, QoS::AtLeastOnce) {
                        error!("MQTT subscribe failed: {e:?}");
                    }
                }
                Ok(Event::Incoming(Incoming::Publish(p))) if p.topic == TELEMETRY_TOPIC => {
                    handle_telemetry_payload(store.as_ref(), &health, &p.payload, OffsetDateTime::now_utc());
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("MQTT error: {e:?}");
                    health.increment_reconnects();
                    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::JsonStore;
    use vitalwatch_devkit::payloads::TelemetryBuilder;

    #[test]
    fn test_payload_is_ingested() {
        let store = JsonStore::in_memory();
        let health = HealthTracker::new(true);
        let payload = TelemetryBuilder::new("WR-5").critical().to_vec();
        assert!(handle_telemetry_payload(&store, &health, &payload, OffsetDateTime::now_utc()));
        let report = health.get_health(&store);
        assert_eq!(report.samples_ingested, 1);
        assert_eq!(report.alerts_raised, 1);
    }

    #[test]
    fn test_garbage_payload_is_dropped() {
        let store = JsonStore::in_memory();
        let health = HealthTracker::new(true);
        assert!(!handle_telemetry_payload(&store, &health, b"not json", OffsetDateTime::now_utc()));
        assert_eq!(store.counts().1, 0);
    }
}
