//! vitalwatch-sim - flotte de bracelets simulés
//!
//! Pousse des échantillons vers un kernel VitalWatch, en HTTP ou en MQTT.
//! Configuration par variables d'environnement :
//! VW_TARGET (http|mqtt), VW_URL, VW_MQTT_HOST, VW_MQTT_PORT, VW_DEVICES,
//! VW_DEVICE_PREFIX, VW_INTERVAL_SECS, VW_ANOMALY_RATE, VW_DEVICE_KEY

use anyhow::{bail, Result};
use rumqttc::{AsyncClient, MqttOptions, QoS};
use serde_json::Value;
use std::env;
use std::time::Duration;
use tokio::time;
use vitalwatch_devkit::payloads::TELEMETRY_TOPIC;
use vitalwatch_devkit::Wearable;

#[derive(Debug, Clone)]
struct SimConfig {
    target: String,
    url: String,
    mqtt_host: String,
    mqtt_port: u16,
    devices: usize,
    device_prefix: String,
    interval_secs: u64,
    anomaly_rate: f64,
    device_key: Option<String>,
}

impl SimConfig {
    fn from_env() -> Result<Self> {
        let target = env::var("VW_TARGET").unwrap_or_else(|_| "http".to_string());
        if target != "http" && target != "mqtt" {
            bail!("VW_TARGET must be 'http' or 'mqtt', got '{target}'");
        }
        Ok(Self {
            target,
            url: env::var("VW_URL").unwrap_or_else(|_| "http://localhost:3010".to_string()),
            mqtt_host: env::var("VW_MQTT_HOST").unwrap_or_else(|_| "localhost".to_string()),
            mqtt_port: get_env_parsed("VW_MQTT_PORT", 1883),
            devices: get_env_parsed("VW_DEVICES", 3),
            device_prefix: env::var("VW_DEVICE_PREFIX").unwrap_or_else(|_| "WR-".to_string()),
            interval_secs: get_env_parsed("VW_INTERVAL_SECS", 5),
            anomaly_rate: get_env_parsed("VW_ANOMALY_RATE", 0.1),
            device_key: env::var("VW_DEVICE_KEY").ok().filter(|k| !k.is_empty()),
        })
    }
}

fn get_env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(default)
}

enum Sink {
    Http { client: reqwest::Client, url: String, device_key: Option<String> },
    Mqtt { client: AsyncClient },
}

impl Sink {
    async fn send(&self, payload: &Value) -> Result<()> {
        match self {
            Sink::Http { client, url, device_key } => {
                let mut req = client.post(url).json(payload);
                if let Some(key) = device_key {
                    req = req.header("x-device-key", key);
                }
                req.send().await?.error_for_status()?;
            }
            Sink::Mqtt { client } => {
                client
                    .publish(TELEMETRY_TOPIC, QoS::AtLeastOnce, false, payload.to_string())
                    .await?;
            }
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cfg = SimConfig::from_env()?;
    log::info!("🚀 starting {} simulated wearables -> {}", cfg.devices, cfg.target);

    let sink = if cfg.target == "mqtt" {
        let mut opts = MqttOptions::new("vitalwatch-sim", cfg.mqtt_host.clone(), cfg.mqtt_port);
        opts.set_keep_alive(Duration::from_secs(30));
        let (client, mut eventloop) = AsyncClient::new(opts, 64);
        // l'eventloop doit tourner pour que les publish partent
        tokio::spawn(async move {
            loop {
                if let Err(e) = eventloop.poll().await {
                    log::warn!("MQTT error: {e:?}");
                    time::sleep(Duration::from_secs(1)).await;
                }
            }
        });
        Sink::Mqtt { client }
    } else {
        Sink::Http {
            client: reqwest::Client::new(),
            url: format!("{}/api/iot/upload", cfg.url.trim_end_matches('/')),
            device_key: cfg.device_key.clone(),
        }
    };

    let mut wearables: Vec<Wearable> = (1..=cfg.devices)
        .map(|i| Wearable::new(format!("{}{:03}", cfg.device_prefix, i), cfg.anomaly_rate))
        .collect();

    let mut ticker = time::interval(Duration::from_secs(cfg.interval_secs.max(1)));
    loop {
        ticker.tick().await;
        for wearable in wearables.iter_mut() {
            let (payload, episode) = wearable.next_reading();
            if let Some(ep) = episode {
                log::info!("⚠️  {} simulating {:?}", wearable.device_id(), ep);
            }
            match sink.send(&payload).await {
                Ok(()) => log::debug!("sent sample for {}", wearable.device_id()),
                Err(e) => log::error!("❌ failed to send sample for {}: {e}", wearable.device_id()),
            }
        }
    }
}
