/**
 * VITALWATCH KERNEL - Point d'entrée principal du serveur
 *
 * RÔLE : Orchestration des modules : config, store, MQTT, HTTP, health.
 * Bootstrap du système complet avec gestion d'erreurs et logging.
 *
 * ARCHITECTURE : API REST + ingestion MQTT optionnelle + store documentaire injecté.
 * UTILITÉ : Suivi des constantes vitales des soldats et vue agrégée du commandant.
 */

mod auth;
mod config;
mod error;
mod health;
mod http;
mod ingest;
mod models;
mod mqtt;
mod status;
mod store;
mod vitals;

use crate::config::load_config;
use crate::health::HealthTracker;
use crate::http::AppState;
use crate::store::{JsonStore, VitalsStore};

use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .init();

    let cfg = load_config().await;

    // store documentaire, injecté partout (pas de handle global)
    let store: Arc<dyn VitalsStore> = Arc::new(
        JsonStore::open(&cfg.storage.data_dir)
            .with_context(|| format!("failed to open data dir {:?}", cfg.storage.data_dir))?,
    );

    let health_tracker = HealthTracker::new(cfg.mqtt.is_some());

    match cfg.mqtt.clone() {
        Some(mqtt_cfg) => {
            mqtt::spawn_telemetry_listener(mqtt_cfg.clone(), store.clone(), health_tracker.clone());
            health_tracker.spawn_health_publisher(mqtt_cfg, store.clone());
        }
        None => info!("MQTT disabled, telemetry accepted over HTTP only"),
    }

    let bind = cfg.http.bind.clone();
    let app = http::build_router(AppState::new(store, cfg, health_tracker));

    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!("listening on http://{bind}");
    axum::serve(listener, app).await?;
    Ok(())
}
