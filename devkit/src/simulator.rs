/*!
Simulateur de bracelet IoT

Marche aléatoire bornée autour de constantes de repos, avec de temps en
temps un épisode anormal (tachycardie, fièvre, hypotension...).
*/

use crate::payloads::TelemetryBuilder;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Episode {
    Tachycardia,
    Bradycardia,
    Fever,
    Hypothermia,
    Hypertension,
    Hypotension,
}

const EPISODES: [Episode; 6] = [
    Episode::Tachycardia,
    Episode::Bradycardia,
    Episode::Fever,
    Episode::Hypothermia,
    Episode::Hypertension,
    Episode::Hypotension,
];

pub struct Wearable {
    device_id: String,
    heartbeat: f64,
    bp: f64,
    temp: f64,
    latitude: f64,
    longitude: f64,
    anomaly_probability: f64,
    rng: StdRng,
}

impl Wearable {
    pub fn new<S: Into<String>>(device_id: S, anomaly_probability: f64) -> Self {
        Self::with_rng(device_id, anomaly_probability, StdRng::from_entropy())
    }

    /// Générateur reproductible (tests)
    pub fn seeded<S: Into<String>>(device_id: S, anomaly_probability: f64, seed: u64) -> Self {
        Self::with_rng(device_id, anomaly_probability, StdRng::seed_from_u64(seed))
    }

    fn with_rng<S: Into<String>>(device_id: S, anomaly_probability: f64, mut rng: StdRng) -> Self {
        Self {
            device_id: device_id.into(),
            heartbeat: rng.gen_range(62.0..85.0),
            bp: rng.gen_range(105.0..125.0),
            temp: rng.gen_range(36.4..37.2),
            latitude: 34.5 + rng.gen_range(-0.05..0.05),
            longitude: 69.2 + rng.gen_range(-0.05..0.05),
            anomaly_probability: anomaly_probability.clamp(0.0, 1.0),
            rng,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    fn drift(&mut self) {
        self.heartbeat = (self.heartbeat + self.rng.gen_range(-3.0..3.0)).clamp(55.0, 110.0);
        self.bp = (self.bp + self.rng.gen_range(-4.0..4.0)).clamp(90.0, 135.0);
        self.temp = (self.temp + self.rng.gen_range(-0.1..0.1)).clamp(36.0, 37.8);
        self.latitude += self.rng.gen_range(-0.001..0.001);
        self.longitude += self.rng.gen_range(-0.001..0.001);
    }

    fn round1(v: f64) -> f64 {
        (v * 10.0).round() / 10.0
    }

    /// Prochain échantillon + épisode anormal éventuel
    pub fn next_reading(&mut self) -> (Value, Option<Episode>) {
        self.drift();

        let (mut hr, mut bp, mut temp) = (self.heartbeat, self.bp, self.temp);
        let episode = if self.rng.gen_bool(self.anomaly_probability) {
            let ep = EPISODES[self.rng.gen_range(0..EPISODES.len())];
            match ep {
                Episode::Tachycardia => hr = self.rng.gen_range(125.0..170.0),
                Episode::Bradycardia => hr = self.rng.gen_range(30.0..44.0),
                Episode::Fever => temp = self.rng.gen_range(38.5..40.5),
                Episode::Hypothermia => temp = self.rng.gen_range(32.0..34.9),
                Episode::Hypertension => bp = self.rng.gen_range(145.0..190.0),
                Episode::Hypotension => bp = self.rng.gen_range(60.0..79.0),
            }
            Some(ep)
        } else {
            None
        };

        let payload = TelemetryBuilder::new(self.device_id.clone())
            .heartbeat(hr.round())
            .bp(bp.round())
            .temp(Self::round1(temp))
            .location(self.latitude, self.longitude)
            .at(Utc::now())
            .build();
        (payload, episode)
    }
}
