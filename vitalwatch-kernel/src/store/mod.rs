/**
 * STORE - Interface d'accès aux données VitalWatch
 *
 * RÔLE :
 * Capacité d'accès aux documents (soldats, télémétrie, alertes) injectée
 * dans les handlers via `AppState`. Aucun handle global : le noyau
 * classification/agrégation reste pur et testable sans base.
 *
 * FONCTIONNEMENT :
 * - `VitalsStore` = trait commun (lecture ponctuelle, écriture append-only)
 * - `JsonStore` = implémentation par défaut (cache mémoire + fichiers JSON)
 * - La télémétrie et les alertes ne sont jamais modifiées après écriture
 * - Un échantillon anormal et son alerte sont écrits ensemble, ou pas du tout
 * - Seule `set_deployment` réécrit la fenêtre de déploiement d'un soldat
 *
 * DERNIER ÉCHANTILLON :
 * max(timestamp), à timestamp égal le plus grand `seq` d'ingestion l'emporte.
 */

mod json;

pub use json::JsonStore;

use crate::models::{AlertRecord, DeploymentWindow, Soldier, TelemetrySample};

/// Erreurs possibles lors des opérations sur le store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub trait VitalsStore: Send + Sync {
    /// Enregistre un nouveau soldat (numéro de matricule et bracelet uniques)
    fn insert_soldier(&self, soldier: Soldier) -> Result<(), StoreError>;

    fn get_soldier(&self, service_number: &str) -> Result<Option<Soldier>, StoreError>;

    fn soldier_by_device(&self, device_id: &str) -> Result<Option<Soldier>, StoreError>;

    /// Tous les comptes, triés par matricule
    fn list_soldiers(&self) -> Result<Vec<Soldier>, StoreError>;

    /// Seul point d'écriture d'une fenêtre de déploiement (action commandant)
    fn set_deployment(&self, service_number: &str, window: DeploymentWindow) -> Result<(), StoreError>;

    /// Ajoute un échantillon et son alerte éventuelle en une seule opération.
    /// Le `seq` fourni est ignoré et réattribué, l'alerte reçoit le même.
    /// Si l'alerte ne peut pas être écrite, l'échantillon n'est pas conservé.
    fn append_telemetry(
        &self,
        sample: TelemetrySample,
        alert: Option<AlertRecord>,
    ) -> Result<(TelemetrySample, Option<AlertRecord>), StoreError>;

    fn latest_telemetry(&self, device_id: &str) -> Result<Option<TelemetrySample>, StoreError>;

    /// Historique d'un bracelet, du plus récent au plus ancien
    fn telemetry_history(&self, device_id: &str, limit: usize) -> Result<Vec<TelemetrySample>, StoreError>;

    fn latest_alert(&self, device_id: &str) -> Result<Option<AlertRecord>, StoreError>;

    fn recent_alerts(&self, limit: usize) -> Result<Vec<AlertRecord>, StoreError>;

    /// Compteurs pour /system/health : (soldats, échantillons, alertes)
    fn counts(&self) -> (usize, usize, usize);
}

/// Ordre "le plus récent d'abord" partagé par toutes les implémentations
pub(crate) fn newest_first(a: &TelemetrySample, b: &TelemetrySample) -> std::cmp::Ordering {
    (b.timestamp, b.seq).cmp(&(a.timestamp, a.seq))
}
