use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use crate::config::MqttConf;
use crate::store::VitalsStore;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use tokio::task;
use tracing::{debug, warn};

pub const HEALTH_TOPIC: &str = "vitalwatch/kernel/health@v1";

#[derive(Debug, Serialize, Deserialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub soldiers_registered: u32,
    pub samples_stored: u64,
    pub alerts_stored: u64,
    pub samples_ingested: u64, // depuis le démarrage
    pub alerts_raised: u64,    // depuis le démarrage
    pub memory_usage_mb: f32,
    pub mqtt_status: String,
    pub mqtt_reconnects: u32,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    samples_ingested: Arc<AtomicU64>,
    alerts_raised: Arc<AtomicU64>,
    mqtt_reconnects: Arc<AtomicU32>,
    mqtt_status: Arc<parking_lot::Mutex<String>>,
}

impl HealthTracker {
    pub fn new(mqtt_enabled: bool) -> Self {
        let status = if mqtt_enabled { "connecting" } else { "disabled" };
        Self {
            start_time: Instant::now(),
            samples_ingested: Arc::new(AtomicU64::new(0)),
            alerts_raised: Arc::new(AtomicU64::new(0)),
            mqtt_reconnects: Arc::new(AtomicU32::new(0)),
            mqtt_status: Arc::new(parking_lot::Mutex::new(status.to_string())),
        }
    }

    pub fn record_sample(&self, raised_alert: bool) {
        self.samples_ingested.fetch_add(1, Ordering::Relaxed);
        if raised_alert {
            self.alerts_raised.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn mark_mqtt_connected(&self) {
        *self.mqtt_status.lock() = "connected".to_string();
    }

    pub fn increment_reconnects(&self) {
        self.mqtt_reconnects.fetch_add(1, Ordering::Relaxed);
        *self.mqtt_status.lock() = "reconnecting".to_string();
    }

    pub fn get_health(&self, store: &dyn VitalsStore) -> KernelHealth {
        let (soldiers, samples, alerts) = store.counts();
        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            soldiers_registered: soldiers as u32,
            samples_stored: samples as u64,
            alerts_stored: alerts as u64,
            samples_ingested: self.samples_ingested.load(Ordering::Relaxed),
            alerts_raised: self.alerts_raised.load(Ordering::Relaxed),
            memory_usage_mb: get_memory_usage_mb(),
            mqtt_status: self.mqtt_status.lock().clone(),
            mqtt_reconnects: self.mqtt_reconnects.load(Ordering::Relaxed),
        }
    }

    /// Démarre la publication auto du health kernel (toutes les 30s)
    pub fn spawn_health_publisher(&self, mqtt: MqttConf, store: Arc<dyn VitalsStore>) {
        let health_tracker = self.clone();

        task::spawn(async move {
            let client_id = format!("{}-health", mqtt.client_id);
            let mut opts = MqttOptions::new(client_id, &mqtt.host, mqtt.port);
            opts.set_keep_alive(Duration::from_secs(15));

            let (client, mut eventloop) = AsyncClient::new(opts, 10);
            let mut interval = tokio::time::interval(Duration::from_secs(30));

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let health = health_tracker.get_health(store.as_ref());
                        if let Ok(payload) = serde_json::to_string(&health) {
                            match client.publish(HEALTH_TOPIC, QoS::AtLeastOnce, false, payload).await {
                                Ok(_) => debug!(uptime = health.uptime_seconds, "published kernel health"),
                                Err(e) => warn!("failed to publish health: {e:?}"),
                            }
                        }
                    },
                    event = eventloop.poll() => {
                        if let Err(e) = event {
                            warn!("health publisher MQTT error: {e:?}");
                            tokio::time::sleep(Duration::from_secs(2)).await;
                        }
                    }
                }
            }
        });
    }
}

fn get_memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            for line in status.lines() {
                if line.starts_with("VmRSS:") {
                    if let Some(kb_str) = line.split_whitespace().nth(1) {
                        if let Ok(kb) = kb_str.parse::<u64>() {
                            return (kb as f32) / 1024.0; // KB -> MB
                        }
                    }
                }
            }
        }
    }

    0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::JsonStore;

    #[test]
    fn test_counters() {
        let tracker = HealthTracker::new(false);
        tracker.record_sample(false);
        tracker.record_sample(true);
        let health = tracker.get_health(&JsonStore::in_memory());
        assert_eq!(health.samples_ingested, 2);
        assert_eq!(health.alerts_raised, 1);
        assert_eq!(health.soldiers_registered, 0);
        assert_eq!(health.mqtt_status, "disabled");
    }

    #[test]
    fn test_mqtt_status_transitions() {
        let tracker = HealthTracker::new(true);
        let store = JsonStore::in_memory();
        assert_eq!(tracker.get_health(&store).mqtt_status, "connecting");
        tracker.mark_mqtt_connected();
        assert_eq!(tracker.get_health(&store).mqtt_status, "connected");
        tracker.increment_reconnects();
        let health = tracker.get_health(&store);
        assert_eq!(health.mqtt_status, "reconnecting");
        assert_eq!(health.mqtt_reconnects, 1);
    }
}
