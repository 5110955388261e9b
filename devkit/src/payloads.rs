/*!
Builders de payloads télémétrie

Produit le JSON attendu par `POST /api/iot/upload` et le topic MQTT
`vitalwatch/telemetry@v1`. Les champs non renseignés sont omis.
*/

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

pub const TELEMETRY_TOPIC: &str = "vitalwatch/telemetry@v1";

#[derive(Debug, Clone)]
pub struct TelemetryBuilder {
    device_id: String,
    heartbeat: Option<Value>,
    bp: Option<Value>,
    temp: Option<Value>,
    location: Option<(f64, f64)>,
    timestamp: Option<DateTime<Utc>>,
}

impl TelemetryBuilder {
    pub fn new<S: Into<String>>(device_id: S) -> Self {
        Self {
            device_id: device_id.into(),
            heartbeat: None,
            bp: None,
            temp: None,
            location: None,
            timestamp: None,
        }
    }

    /// Constantes dans les plages normales
    pub fn normal(self) -> Self {
        self.heartbeat(72.0).bp(118.0).temp(36.8).location(34.52, 69.18)
    }

    /// Une seule anomalie : tachycardie
    pub fn tachycardic(self) -> Self {
        self.normal().heartbeat(135.0)
    }

    /// Les trois constantes hors plage
    pub fn critical(self) -> Self {
        self.heartbeat(135.0).bp(155.0).temp(39.2).location(34.52, 69.18)
    }

    pub fn heartbeat(mut self, bpm: f64) -> Self {
        self.heartbeat = Some(Value::from(bpm));
        self
    }

    pub fn bp(mut self, systolic: f64) -> Self {
        self.bp = Some(Value::from(systolic));
        self
    }

    pub fn temp(mut self, celsius: f64) -> Self {
        self.temp = Some(Value::from(celsius));
        self
    }

    /// Valeur brute arbitraire (chaîne, null...) pour tester les lectures non numériques
    pub fn raw_heartbeat(mut self, value: Value) -> Self {
        self.heartbeat = Some(value);
        self
    }

    pub fn location(mut self, latitude: f64, longitude: f64) -> Self {
        self.location = Some((latitude, longitude));
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn build(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("deviceId".into(), Value::from(self.device_id.clone()));
        if let Some(v) = &self.heartbeat {
            obj.insert("heartbeat".into(), v.clone());
        }
        if let Some(v) = &self.bp {
            obj.insert("bp".into(), v.clone());
        }
        if let Some(v) = &self.temp {
            obj.insert("temp".into(), v.clone());
        }
        if let Some((lat, long)) = self.location {
            obj.insert("location".into(), serde_json::json!({"latitude": lat, "longitude": long}));
        }
        if let Some(ts) = self.timestamp {
            obj.insert("timestamp".into(), Value::from(ts.to_rfc3339()));
        }
        Value::Object(obj)
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.build().to_string().into_bytes()
    }
}
