/**
 * JSON STORE - Stockage documentaire fichier pour VitalWatch
 *
 * FONCTIONNEMENT :
 * - Cache mémoire complet protégé par un Mutex
 * - soldiers.json : snapshot JSON réécrit à chaque changement de compte
 * - telemetry.jsonl / alerts.jsonl : une ligne JSON par document, append-only
 * - Sans répertoire (`in_memory`) rien n'est écrit sur disque (tests, dev)
 */

use super::{newest_first, StoreError, VitalsStore};
use crate::models::{AlertRecord, DeploymentWindow, Soldier, TelemetrySample};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

const SOLDIERS_FILE: &str = "soldiers.json";
const TELEMETRY_FILE: &str = "telemetry.jsonl";
const ALERTS_FILE: &str = "alerts.jsonl";

#[derive(Default)]
struct Collections {
    soldiers: BTreeMap<String, Soldier>,
    telemetry: Vec<TelemetrySample>,
    alerts: Vec<AlertRecord>,
    next_seq: u64,
}

pub struct JsonStore {
    data_dir: Option<PathBuf>,
    inner: Mutex<Collections>,
}

impl JsonStore {
    pub fn in_memory() -> Self {
        Self {
            data_dir: None,
            inner: Mutex::new(Collections { next_seq: 1, ..Default::default() }),
        }
    }

    /// Ouvre (ou crée) le répertoire de données et recharge les collections
    pub fn open<P: Into<PathBuf>>(data_dir: P) -> Result<Self, StoreError> {
        let dir = data_dir.into();
        fs::create_dir_all(&dir)?;

        let soldiers: Vec<Soldier> = read_snapshot(&dir.join(SOLDIERS_FILE))?;
        let telemetry: Vec<TelemetrySample> = read_lines(&dir.join(TELEMETRY_FILE))?;
        let alerts: Vec<AlertRecord> = read_lines(&dir.join(ALERTS_FILE))?;
        let next_seq = telemetry.iter().map(|s| s.seq).max().unwrap_or(0) + 1;

        info!(
            soldiers = soldiers.len(),
            samples = telemetry.len(),
            alerts = alerts.len(),
            "store loaded from {:?}",
            dir
        );

        Ok(Self {
            data_dir: Some(dir),
            inner: Mutex::new(Collections {
                soldiers: soldiers.into_iter().map(|s| (s.service_number.clone(), s)).collect(),
                telemetry,
                alerts,
                next_seq,
            }),
        })
    }

    fn save_soldiers(&self, soldiers: &BTreeMap<String, Soldier>) -> Result<(), StoreError> {
        let Some(dir) = &self.data_dir else { return Ok(()) };
        let list: Vec<&Soldier> = soldiers.values().collect();
        let json = serde_json::to_string_pretty(&list)?;
        fs::write(dir.join(SOLDIERS_FILE), json)?;
        Ok(())
    }

    /// Ajoute une ligne ; retourne la taille du fichier avant écriture
    fn append_line<T: Serialize>(&self, file: &str, doc: &T) -> Result<Option<u64>, StoreError> {
        let Some(dir) = &self.data_dir else { return Ok(None) };
        let mut line = serde_json::to_string(doc)?;
        line.push('\n');
        let mut f = OpenOptions::new().create(true).append(true).open(dir.join(file))?;
        let previous_len = f.metadata()?.len();
        f.write_all(line.as_bytes())?;
        Ok(Some(previous_len))
    }

    fn truncate_to(&self, file: &str, previous_len: Option<u64>) {
        let (Some(dir), Some(len)) = (&self.data_dir, previous_len) else { return };
        let result = OpenOptions::new()
            .write(true)
            .open(dir.join(file))
            .and_then(|f| f.set_len(len));
        if let Err(e) = result {
            error!("failed to roll back {file}: {e}");
        }
    }
}

fn read_snapshot<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&content)?)
}

fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)?;
    let mut docs = Vec::new();
    for (n, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(doc) => docs.push(doc),
            // ligne tronquée (arrêt brutal pendant l'écriture) : on l'ignore
            Err(e) => warn!("skipping corrupt line {} in {:?}: {}", n + 1, path, e),
        }
    }
    Ok(docs)
}

impl VitalsStore for JsonStore {
    fn insert_soldier(&self, soldier: Soldier) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.soldiers.contains_key(&soldier.service_number) {
            return Err(StoreError::Conflict(format!(
                "service number {} already registered",
                soldier.service_number
            )));
        }
        if inner.soldiers.values().any(|s| s.device_id == soldier.device_id) {
            return Err(StoreError::Conflict(format!(
                "device {} already assigned",
                soldier.device_id
            )));
        }

        let key = soldier.service_number.clone();
        inner.soldiers.insert(key.clone(), soldier);
        if let Err(e) = self.save_soldiers(&inner.soldiers) {
            inner.soldiers.remove(&key);
            return Err(e);
        }
        debug!("soldier {} stored", key);
        Ok(())
    }

    fn get_soldier(&self, service_number: &str) -> Result<Option<Soldier>, StoreError> {
        Ok(self.inner.lock().soldiers.get(service_number).cloned())
    }

    fn soldier_by_device(&self, device_id: &str) -> Result<Option<Soldier>, StoreError> {
        Ok(self
            .inner
            .lock()
            .soldiers
            .values()
            .find(|s| s.device_id == device_id)
            .cloned())
    }

    fn list_soldiers(&self) -> Result<Vec<Soldier>, StoreError> {
        Ok(self.inner.lock().soldiers.values().cloned().collect())
    }

    fn set_deployment(&self, service_number: &str, window: DeploymentWindow) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let soldier = inner
            .soldiers
            .get_mut(service_number)
            .ok_or_else(|| StoreError::NotFound(format!("soldier {service_number}")))?;
        let previous = soldier.deployment.replace(window);

        if let Err(e) = self.save_soldiers(&inner.soldiers) {
            if let Some(s) = inner.soldiers.get_mut(service_number) {
                s.deployment = previous;
            }
            return Err(e);
        }
        Ok(())
    }

    fn append_telemetry(
        &self,
        mut sample: TelemetrySample,
        mut alert: Option<AlertRecord>,
    ) -> Result<(TelemetrySample, Option<AlertRecord>), StoreError> {
        let mut inner = self.inner.lock();
        sample.seq = inner.next_seq;
        let telemetry_len = self.append_line(TELEMETRY_FILE, &sample)?;

        if let Some(alert) = alert.as_mut() {
            alert.sample_seq = sample.seq;
            if let Err(e) = self.append_line(ALERTS_FILE, &*alert) {
                // pas d'échantillon anormal sans son alerte
                self.truncate_to(TELEMETRY_FILE, telemetry_len);
                return Err(e);
            }
        }

        inner.next_seq += 1;
        inner.telemetry.push(sample.clone());
        if let Some(alert) = &alert {
            inner.alerts.push(alert.clone());
        }
        Ok((sample, alert))
    }

    fn latest_telemetry(&self, device_id: &str) -> Result<Option<TelemetrySample>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .telemetry
            .iter()
            .filter(|s| s.device_id == device_id)
            .min_by(|a, b| newest_first(a, b))
            .cloned())
    }

    fn telemetry_history(&self, device_id: &str, limit: usize) -> Result<Vec<TelemetrySample>, StoreError> {
        let inner = self.inner.lock();
        let mut samples: Vec<TelemetrySample> = inner
            .telemetry
            .iter()
            .filter(|s| s.device_id == device_id)
            .cloned()
            .collect();
        samples.sort_by(newest_first);
        samples.truncate(limit);
        Ok(samples)
    }

    fn latest_alert(&self, device_id: &str) -> Result<Option<AlertRecord>, StoreError> {
        // ordre d'insertion = ordre chronologique des alertes
        Ok(self
            .inner
            .lock()
            .alerts
            .iter()
            .rev()
            .find(|a| a.device_id == device_id)
            .cloned())
    }

    fn recent_alerts(&self, limit: usize) -> Result<Vec<AlertRecord>, StoreError> {
        Ok(self.inner.lock().alerts.iter().rev().take(limit).cloned().collect())
    }

    fn counts(&self) -> (usize, usize, usize) {
        let inner = self.inner.lock();
        (inner.soldiers.len(), inner.telemetry.len(), inner.alerts.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::vitals::classify;
    use time::macros::datetime;
    use time::OffsetDateTime;

    fn soldier(sn: &str, device: &str) -> Soldier {
        Soldier {
            service_number: sn.into(),
            full_name: format!("Soldier {sn}"),
            rank: None,
            unit: Some("2nd Recon".into()),
            device_id: device.into(),
            role: Role::Soldier,
            password_hash: "$argon2id$stub".into(),
            deployment: None,
            registered_at: datetime!(2026-01-01 00:00 UTC),
        }
    }

    fn sample(device: &str, heartbeat: f64, at: OffsetDateTime) -> TelemetrySample {
        TelemetrySample {
            seq: 0,
            device_id: device.into(),
            heartbeat: Some(heartbeat),
            bp: Some(110.0),
            temp: Some(36.8),
            location: None,
            timestamp: at,
        }
    }

    #[test]
    fn test_insert_conflicts() {
        let store = JsonStore::in_memory();
        store.insert_soldier(soldier("SN-1", "WR-1")).unwrap();
        assert!(matches!(store.insert_soldier(soldier("SN-1", "WR-9")), Err(StoreError::Conflict(_))));
        assert!(matches!(store.insert_soldier(soldier("SN-2", "WR-1")), Err(StoreError::Conflict(_))));
        assert_eq!(store.soldier_by_device("WR-1").unwrap().unwrap().service_number, "SN-1");
    }

    #[test]
    fn test_latest_telemetry_prefers_timestamp_then_seq() {
        let store = JsonStore::in_memory();
        let t = datetime!(2026-02-01 08:00 UTC);
        store.append_telemetry(sample("WR-1", 60.0, t), None).unwrap();
        store.append_telemetry(sample("WR-1", 61.0, t + time::Duration::minutes(5)), None).unwrap();
        // arrivé en retard avec un horodatage plus ancien
        store.append_telemetry(sample("WR-1", 62.0, t - time::Duration::minutes(5)), None).unwrap();
        store.append_telemetry(sample("WR-2", 99.0, t + time::Duration::hours(1)), None).unwrap();

        let latest = store.latest_telemetry("WR-1").unwrap().unwrap();
        assert_eq!(latest.heartbeat, Some(61.0));

        // égalité de timestamp : le dernier ingéré gagne
        store.append_telemetry(sample("WR-1", 63.0, t + time::Duration::minutes(5)), None).unwrap();
        let latest = store.latest_telemetry("WR-1").unwrap().unwrap();
        assert_eq!(latest.heartbeat, Some(63.0));
        assert_eq!(latest.seq, 5);

        assert!(store.latest_telemetry("WR-404").unwrap().is_none());
    }

    #[test]
    fn test_history_is_newest_first_and_limited() {
        let store = JsonStore::in_memory();
        let t = datetime!(2026-02-01 08:00 UTC);
        for i in 0..5 {
            store.append_telemetry(sample("WR-1", 60.0 + i as f64, t + time::Duration::minutes(i)), None).unwrap();
        }
        let history = store.telemetry_history("WR-1", 3).unwrap();
        let beats: Vec<_> = history.iter().filter_map(|s| s.heartbeat).collect();
        assert_eq!(beats, vec![64.0, 63.0, 62.0]);
    }

    #[test]
    fn test_set_deployment_unknown_soldier() {
        let store = JsonStore::in_memory();
        let err = store.set_deployment("SN-404", DeploymentWindow::default()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_persistence_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let t = datetime!(2026-02-01 08:00 UTC);
        {
            let store = JsonStore::open(dir.path()).unwrap();
            store.insert_soldier(soldier("SN-1", "WR-1")).unwrap();
            store
                .set_deployment(
                    "SN-1",
                    DeploymentWindow { is_deployed: true, start_time: Some(t), end_time: Some(t + time::Duration::days(2)) },
                )
                .unwrap();
            let abnormal = sample("WR-1", 130.0, t);
            let health = classify(&abnormal.vitals());
            let alert = AlertRecord::from_health(&abnormal, Some("SN-1".into()), &health, t);
            let (stored, alert) = store.append_telemetry(abnormal, Some(alert)).unwrap();
            assert_eq!(alert.map(|a| a.sample_seq), Some(stored.seq));
        }

        let reopened = JsonStore::open(dir.path()).unwrap();
        assert_eq!(reopened.counts(), (1, 1, 1));
        let s = reopened.get_soldier("SN-1").unwrap().unwrap();
        assert!(s.deployment.unwrap().is_deployed);
        assert_eq!(reopened.latest_alert("WR-1").unwrap().unwrap().critical_count, 1);

        // le compteur de séquence reprend après le dernier échantillon
        let (next, _) = reopened.append_telemetry(sample("WR-1", 70.0, t), None).unwrap();
        assert_eq!(next.seq, 2);
    }

    #[test]
    fn test_sample_is_rolled_back_when_alert_write_fails() {
        let dir = tempfile::tempdir().unwrap();
        let t = datetime!(2026-02-01 08:00 UTC);
        let store = JsonStore::open(dir.path()).unwrap();
        store.append_telemetry(sample("WR-1", 70.0, t), None).unwrap();

        // un répertoire à la place du fichier d'alertes : l'écriture échoue
        fs::create_dir(dir.path().join(ALERTS_FILE)).unwrap();
        let abnormal = sample("WR-1", 130.0, t + time::Duration::minutes(1));
        let health = classify(&abnormal.vitals());
        let alert = AlertRecord::from_health(&abnormal, None, &health, t);
        let err = store.append_telemetry(abnormal, Some(alert)).unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));

        assert_eq!(store.counts(), (0, 1, 0));
        assert_eq!(store.latest_telemetry("WR-1").unwrap().unwrap().heartbeat, Some(70.0));
        let on_disk = fs::read_to_string(dir.path().join(TELEMETRY_FILE)).unwrap();
        assert_eq!(on_disk.lines().count(), 1);

        // le seq de l'échantillon rejeté n'est pas consommé
        let (next, _) = store.append_telemetry(sample("WR-1", 72.0, t), None).unwrap();
        assert_eq!(next.seq, 2);
    }

    #[test]
    fn test_corrupt_trailing_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let t = datetime!(2026-02-01 08:00 UTC);
        {
            let store = JsonStore::open(dir.path()).unwrap();
            store.append_telemetry(sample("WR-1", 70.0, t), None).unwrap();
        }
        let mut f = OpenOptions::new().append(true).open(dir.path().join(TELEMETRY_FILE)).unwrap();
        f.write_all(b"{\"seq\": 2, \"devi").unwrap();

        let reopened = JsonStore::open(dir.path()).unwrap();
        assert_eq!(reopened.counts().1, 1);
    }
}
