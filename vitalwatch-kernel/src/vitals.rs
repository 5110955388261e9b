/**
 * CLASSIFICATION DES CONSTANTES VITALES
 *
 * RÔLE :
 * Transforme un échantillon (fréquence cardiaque, tension systolique, température)
 * en statut de santé : tag, couleur d'affichage, nombre d'anomalies, message.
 *
 * FONCTIONNEMENT :
 * - 3 contrôles indépendants, aucun ne court-circuite les autres
 * - chaque contrôle déclenché ajoute 1 au compteur + un fragment de message
 * - une valeur absente ou non finie n'est pas évaluable : le contrôle est ignoré
 *
 * Fonction pure, sans I/O : appelable en parallèle sans coordination.
 */

use serde::{Deserialize, Serialize};
use std::fmt;

pub const HEARTBEAT_HIGH: f64 = 120.0;
pub const HEARTBEAT_LOW: f64 = 45.0;
pub const TEMP_FEVER: f64 = 38.5;
pub const TEMP_LOW: f64 = 35.0;
pub const BP_HIGH: f64 = 140.0;
pub const BP_LOW: f64 = 80.0;

pub const COLOR_GREEN: &str = "#28A745";
pub const COLOR_LIGHT_RED: &str = "#FF7F7F";
pub const COLOR_RED: &str = "#FF0000";
pub const COLOR_GRAY: &str = "#808080";

pub const NORMAL_MESSAGE: &str = "Vitals are normal.";
pub const OFFLINE_MESSAGE: &str = "Device Offline.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthState {
    Normal,
    AlertLightRed,
    CriticalRed,
    Offline,
}

impl HealthState {
    pub fn color(self) -> &'static str {
        match self {
            HealthState::Normal => COLOR_GREEN,
            HealthState::AlertLightRed => COLOR_LIGHT_RED,
            HealthState::CriticalRed => COLOR_RED,
            HealthState::Offline => COLOR_GRAY,
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            HealthState::Normal => "NORMAL",
            HealthState::AlertLightRed => "ALERT_LIGHT_RED",
            HealthState::CriticalRed => "CRITICAL_RED",
            HealthState::Offline => "OFFLINE",
        };
        f.write_str(tag)
    }
}

/// Résultat de la classification (ou statut OFFLINE quand aucun échantillon)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: HealthState,
    pub color: String,
    pub critical_count: u8,
    pub message: String,
}

impl HealthStatus {
    pub fn offline() -> Self {
        Self {
            status: HealthState::Offline,
            color: COLOR_GRAY.to_string(),
            critical_count: 0,
            message: OFFLINE_MESSAGE.to_string(),
        }
    }

    /// Vrai dès qu'au moins une constante sort de la plage normale
    pub fn is_alert(&self) -> bool {
        self.critical_count >= 1
    }
}

/// Les trois constantes évaluées. `None` = absente ou non numérique.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vitals {
    pub heartbeat: Option<f64>,
    pub bp: Option<f64>,
    pub temp: Option<f64>,
}

fn evaluable(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

fn check_heartbeat(value: Option<f64>) -> Option<String> {
    let hr = evaluable(value)?;
    if hr > HEARTBEAT_HIGH {
        Some(format!("Heart rate {hr} bpm is critically high"))
    } else if hr < HEARTBEAT_LOW {
        Some(format!("Heart rate {hr} bpm is critically low"))
    } else {
        None
    }
}

fn check_temperature(value: Option<f64>) -> Option<String> {
    let temp = evaluable(value)?;
    if temp >= TEMP_FEVER {
        Some(format!("Temperature {temp}°C is high (fever)"))
    } else if temp < TEMP_LOW {
        Some(format!("Temperature {temp}°C is critically low"))
    } else {
        None
    }
}

fn check_blood_pressure(value: Option<f64>) -> Option<String> {
    let bp = evaluable(value)?;
    if bp > BP_HIGH {
        Some(format!("Blood pressure {bp} mmHg is severely high"))
    } else if bp < BP_LOW {
        Some(format!("Blood pressure {bp} mmHg is critically low"))
    } else {
        None
    }
}

pub fn classify(vitals: &Vitals) -> HealthStatus {
    let fragments: Vec<String> = [
        check_heartbeat(vitals.heartbeat),
        check_temperature(vitals.temp),
        check_blood_pressure(vitals.bp),
    ]
    .into_iter()
    .flatten()
    .collect();

    let critical_count = fragments.len() as u8;
    let status = match critical_count {
        0 => HealthState::Normal,
        1 => HealthState::AlertLightRed,
        _ => HealthState::CriticalRed,
    };
    let message = if fragments.is_empty() {
        NORMAL_MESSAGE.to_string()
    } else {
        fragments.join("; ")
    };

    HealthStatus {
        status,
        color: status.color().to_string(),
        critical_count,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vitals(heartbeat: f64, bp: f64, temp: f64) -> Vitals {
        Vitals { heartbeat: Some(heartbeat), bp: Some(bp), temp: Some(temp) }
    }

    #[test]
    fn test_single_anomaly_is_light_red() {
        let status = classify(&vitals(130.0, 90.0, 37.0));
        assert_eq!(status.critical_count, 1);
        assert_eq!(status.status, HealthState::AlertLightRed);
        assert_eq!(status.color, COLOR_LIGHT_RED);
        assert!(status.message.contains("Heart rate 130 bpm is critically high"));
        assert!(!status.message.contains("Temperature"));
        assert!(!status.message.contains("Blood pressure"));
    }

    #[test]
    fn test_two_anomalies_are_critical() {
        let status = classify(&vitals(130.0, 150.0, 37.0));
        assert_eq!(status.critical_count, 2);
        assert_eq!(status.status, HealthState::CriticalRed);
        assert_eq!(status.color, COLOR_RED);
        assert_eq!(
            status.message,
            "Heart rate 130 bpm is critically high; Blood pressure 150 mmHg is severely high"
        );
    }

    #[test]
    fn test_all_three_anomalies() {
        let status = classify(&vitals(30.0, 60.0, 34.0));
        assert_eq!(status.critical_count, 3);
        assert_eq!(status.status, HealthState::CriticalRed);
        assert_eq!(status.message.split("; ").count(), 3);
    }

    #[test]
    fn test_normal_vitals() {
        let status = classify(&vitals(70.0, 110.0, 37.0));
        assert_eq!(status.critical_count, 0);
        assert_eq!(status.status, HealthState::Normal);
        assert_eq!(status.color, COLOR_GREEN);
        assert_eq!(status.message, NORMAL_MESSAGE);
        assert!(!status.is_alert());
    }

    #[test]
    fn test_heartbeat_boundaries() {
        assert_eq!(classify(&vitals(120.0, 110.0, 37.0)).critical_count, 0);
        assert_eq!(classify(&vitals(45.0, 110.0, 37.0)).critical_count, 0);
        assert_eq!(classify(&vitals(120.5, 110.0, 37.0)).critical_count, 1);
        let low = classify(&vitals(44.9, 110.0, 37.0));
        assert_eq!(low.critical_count, 1);
        assert!(low.message.contains("critically low"));
    }

    #[test]
    fn test_temperature_boundaries() {
        let fever = classify(&vitals(70.0, 110.0, 38.5));
        assert_eq!(fever.critical_count, 1);
        assert!(fever.message.contains("high (fever)"));
        assert_eq!(classify(&vitals(70.0, 110.0, 38.4)).critical_count, 0);
        assert_eq!(classify(&vitals(70.0, 110.0, 35.0)).critical_count, 0);
        let cold = classify(&vitals(70.0, 110.0, 34.9));
        assert!(cold.message.contains("Temperature 34.9°C is critically low"));
    }

    #[test]
    fn test_blood_pressure_boundaries() {
        assert_eq!(classify(&vitals(70.0, 140.0, 37.0)).critical_count, 0);
        assert_eq!(classify(&vitals(70.0, 80.0, 37.0)).critical_count, 0);
        assert!(classify(&vitals(70.0, 141.0, 37.0)).message.contains("severely high"));
        assert!(classify(&vitals(70.0, 79.0, 37.0)).message.contains("critically low"));
    }

    #[test]
    fn test_non_evaluable_readings_are_skipped() {
        let status = classify(&Vitals { heartbeat: Some(f64::NAN), bp: None, temp: Some(39.0) });
        assert_eq!(status.critical_count, 1);
        assert!(status.message.starts_with("Temperature"));

        let empty = classify(&Vitals::default());
        assert_eq!(empty.status, HealthState::Normal);

        let inf = classify(&Vitals { heartbeat: Some(f64::INFINITY), bp: Some(f64::NEG_INFINITY), temp: None });
        assert_eq!(inf.critical_count, 0);
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_value(HealthStatus::offline()).unwrap();
        assert_eq!(json["status"], "OFFLINE");
        assert_eq!(json["criticalCount"], 0);
        assert_eq!(json["message"], OFFLINE_MESSAGE);
        assert_eq!(HealthState::AlertLightRed.to_string(), "ALERT_LIGHT_RED");
    }
}
