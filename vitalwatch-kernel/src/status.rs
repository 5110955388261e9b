/**
 * AGRÉGATION DU STATUT SOLDAT
 *
 * RÔLE :
 * Combine le profil d'un soldat, sa fenêtre de déploiement, son dernier
 * échantillon de télémétrie et l'instant courant en une vue unique,
 * utilisée par la vue commandant et par la vue "live" du soldat.
 *
 * RÈGLES DE DÉPLOIEMENT :
 * - fenêtre absente → fenêtre par défaut (non déployé, sans dates)
 * - déployé + deux dates → actif ssi start <= now <= end (bornes incluses)
 * - now > end → la vue renvoie isDeployed=false (correction d'affichage
 *   uniquement, le document stocké n'est jamais réécrit par une lecture)
 * - fenêtre incomplète → jamais active, aucune erreur
 *
 * `now` est lu une seule fois par requête par l'appelant.
 */

use serde::Serialize;
use time::OffsetDateTime;

use crate::models::{DeploymentWindow, Soldier, TelemetrySample};
use crate::vitals::{classify, HealthState, HealthStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeploymentState {
    pub is_deployed: bool,
    pub is_currently_deployed: bool,
}

impl DeploymentWindow {
    pub fn evaluate(&self, now: OffsetDateTime) -> DeploymentState {
        let is_currently_deployed = match (self.is_deployed, self.start_time, self.end_time) {
            (true, Some(start), Some(end)) => now >= start && now <= end,
            _ => false,
        };
        let expired = self.end_time.is_some_and(|end| now > end);

        DeploymentState {
            is_deployed: self.is_deployed && !expired,
            is_currently_deployed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentView {
    pub is_deployed: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub start_time: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub end_time: Option<OffsetDateTime>,
}

/// Dernières constantes connues, ou `Unavailable` quand le bracelet n'a jamais émis.
/// Le formatage des placeholders ("--", "N/A") reste côté présentation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum VitalsReading {
    Available {
        heartbeat: Option<f64>,
        bp: Option<f64>,
        temp: Option<f64>,
        lat: Option<f64>,
        long: Option<f64>,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
    },
    Unavailable,
}

impl VitalsReading {
    fn from_sample(sample: Option<&TelemetrySample>) -> Self {
        match sample {
            Some(s) => VitalsReading::Available {
                heartbeat: s.heartbeat,
                bp: s.bp,
                temp: s.temp,
                lat: s.location.map(|l| l.latitude),
                long: s.location.map(|l| l.longitude),
                timestamp: s.timestamp,
            },
            None => VitalsReading::Unavailable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SoldierStatusView {
    pub service_number: String,
    pub full_name: String,
    pub deployment: DeploymentView,
    pub is_currently_deployed: bool,
    pub status: HealthState,
    pub color: String,
    pub critical_count: u8,
    pub message: String,
    pub vitals: VitalsReading,
}

pub fn aggregate(
    soldier: &Soldier,
    window: Option<&DeploymentWindow>,
    latest: Option<&TelemetrySample>,
    now: OffsetDateTime,
) -> SoldierStatusView {
    let default_window = DeploymentWindow::default();
    let window = window.unwrap_or(&default_window);
    let deployment = window.evaluate(now);

    let health = match latest {
        Some(sample) => classify(&sample.vitals()),
        None => HealthStatus::offline(),
    };

    SoldierStatusView {
        service_number: soldier.service_number.clone(),
        full_name: soldier.full_name.clone(),
        deployment: DeploymentView {
            is_deployed: deployment.is_deployed,
            start_time: window.start_time,
            end_time: window.end_time,
        },
        is_currently_deployed: deployment.is_currently_deployed,
        status: health.status,
        color: health.color,
        critical_count: health.critical_count,
        message: health.message,
        vitals: VitalsReading::from_sample(latest),
    }
}
