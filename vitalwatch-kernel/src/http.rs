/**
 * API REST VITALWATCH - Serveur HTTP du kernel
 *
 * RÔLE :
 * Couche de routes fine au-dessus du store et du noyau classification/agrégation.
 * Pages statiques (login, inscription, tableaux de bord) + API JSON.
 *
 * FONCTIONNEMENT :
 * - Sessions par cookie `vitalwatch_sid` (inscription/login en formulaire)
 * - Upload télémétrie des bracelets, protégé par x-device-key si configuré
 * - Vue commandant : statut agrégé de tous les soldats + planification des déploiements
 * - `now` lu une seule fois par requête puis passé au noyau pur
 *
 * CODES :
 * 401 sans session, 403 mauvais rôle, 404 soldat inconnu, 400 validation, 500 store
 */

use axum::extract::{Query, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::task;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth::{self, Session, SessionStore, MIN_PASSWORD_LEN};
use crate::config::KernelConfig;
use crate::error::ApiError;
use crate::health::{HealthTracker, KernelHealth};
use crate::ingest::{ingest, IngestOutcome};
use crate::models::{AlertRecord, DeploymentWindow, Role, Soldier, TelemetryIn, TelemetrySample};
use crate::status::{aggregate, SoldierStatusView};
use crate::store::VitalsStore;
use crate::vitals::{classify, HealthStatus};

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn VitalsStore>,
    pub sessions: SessionStore,
    pub cfg: Arc<KernelConfig>,
    pub health_tracker: HealthTracker,
}

impl AppState {
    pub fn new(store: Arc<dyn VitalsStore>, cfg: KernelConfig, health_tracker: HealthTracker) -> Self {
        Self {
            store,
            sessions: SessionStore::new(cfg.auth.session_ttl()),
            cfg: Arc::new(cfg),
            health_tracker,
        }
    }

    fn require_session(&self, headers: &HeaderMap, now: OffsetDateTime) -> Result<Session, ApiError> {
        self.sessions.from_headers(headers, now).ok_or(ApiError::Unauthorized)
    }

    fn require_commander(&self, headers: &HeaderMap, now: OffsetDateTime) -> Result<Session, ApiError> {
        let session = self.require_session(headers, now)?;
        if session.role != Role::Commander {
            warn!("commander route denied for {}", session.service_number);
            return Err(ApiError::Forbidden);
        }
        Ok(session)
    }

    fn session_soldier(&self, session: &Session) -> Result<Soldier, ApiError> {
        self.store
            .get_soldier(&session.service_number)?
            .ok_or_else(|| ApiError::NotFound(format!("soldier {}", session.service_number)))
    }
}

async fn require_device_key(State(app): State<AppState>, req: Request, next: Next) -> Result<Response, ApiError> {
    let Some(expected) = app.cfg.ingest.device_key.as_deref() else {
        return Ok(next.run(req).await);
    };

    let ok = req
        .headers()
        .get("x-device-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false);

    if !ok {
        warn!("telemetry upload rejected: missing or wrong x-device-key");
        return Err(ApiError::Unauthorized);
    }
    Ok(next.run(req).await)
}

pub fn build_router(app_state: AppState) -> Router {
    let views = app_state.cfg.views_dir.clone();

    let upload = Router::new()
        .route("/api/iot/upload", post(upload_telemetry))
        .route_layer(middleware::from_fn_with_state(app_state.clone(), require_device_key));

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route_service("/", ServeFile::new(views.join("landing.html")))
        .route_service("/dashbord", ServeFile::new(views.join("dashbord.html")))
        .route_service("/commander", ServeFile::new(views.join("commander.html")))
        .route("/login", get_service_file(&views, "login.html").post(login))
        .route("/register", get_service_file(&views, "register.html").post(register))
        .route("/logout", post(logout))
        .merge(upload)
        .route("/api/vitals/live", get(live_vitals))
        .route("/api/soldier/me", get(my_status))
        .route("/api/soldier/history", get(my_history))
        .route("/api/commander/soldiers", get(commander_soldiers))
        .route("/api/commander/deploy", post(schedule_deployment))
        .route("/api/commander/recall", post(recall_deployment))
        .route("/api/commander/alerts", get(commander_alerts))
        .fallback_service(ServeDir::new(views))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
}

fn get_service_file(views: &std::path::Path, page: &str) -> axum::routing::MethodRouter<AppState> {
    axum::routing::get_service(ServeFile::new(views.join(page)))
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health_tracker.get_health(app.store.as_ref()))
}

// ===== Comptes =====

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterForm {
    service_number: String,
    full_name: String,
    password: String,
    device_id: String,
    #[serde(default)]
    rank: Option<String>,
    #[serde(default)]
    unit: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

// POST /register (formulaire)
async fn register(State(app): State<AppState>, Form(form): Form<RegisterForm>) -> Result<Redirect, ApiError> {
    let service_number = form.service_number.trim().to_string();
    let full_name = form.full_name.trim().to_string();
    let device_id = form.device_id.trim().to_string();

    if service_number.is_empty() || full_name.is_empty() || device_id.is_empty() {
        return Err(ApiError::BadRequest("serviceNumber, fullName and deviceId are required".into()));
    }
    if form.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let role = if app.cfg.is_commander(&service_number) { Role::Commander } else { Role::Soldier };
    let password = form.password;
    // Argon2 est coûteux en CPU : hors des workers async
    let password_hash = task::spawn_blocking(move || auth::hash_password(&password))
        .await
        .map_err(|e| ApiError::Internal(format!("hashing task failed: {e}")))??;
    let soldier = Soldier {
        service_number: service_number.clone(),
        full_name,
        rank: non_empty(form.rank),
        unit: non_empty(form.unit),
        device_id,
        role,
        password_hash,
        deployment: None,
        registered_at: OffsetDateTime::now_utc(),
    };
    app.store.insert_soldier(soldier)?;

    info!("registered {service_number} as {role:?}");
    Ok(Redirect::to("/login"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginForm {
    service_number: String,
    password: String,
}

// POST /login (formulaire)
async fn login(State(app): State<AppState>, Form(form): Form<LoginForm>) -> Result<Response, ApiError> {
    let now = OffsetDateTime::now_utc();
    let service_number = form.service_number.trim();

    let Some(soldier) = app.store.get_soldier(service_number)? else {
        warn!("login failed for unknown account");
        return Err(auth::AuthError::InvalidCredentials.into());
    };
    let password = form.password;
    let phc = soldier.password_hash.clone();
    let verified = task::spawn_blocking(move || auth::verify_password(&password, &phc))
        .await
        .map_err(|e| ApiError::Internal(format!("verification task failed: {e}")))?;
    if let Err(e) = verified {
        warn!("login failed for {}", soldier.service_number);
        return Err(e.into());
    }

    let token = app.sessions.open(&soldier.service_number, soldier.role, now);
    let target = match soldier.role {
        Role::Commander => "/commander",
        Role::Soldier => "/dashbord",
    };
    info!("{} logged in", soldier.service_number);

    let cookie = auth::session_cookie(&token, app.sessions.ttl());
    Ok(([(header::SET_COOKIE, cookie)], Redirect::to(target)).into_response())
}

// POST /logout
async fn logout(State(app): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = auth::session_token(&headers) {
        app.sessions.close(&token);
    }
    ([(header::SET_COOKIE, auth::clear_cookie())], Redirect::to("/")).into_response()
}

// ===== Télémétrie =====

// POST /api/iot/upload
async fn upload_telemetry(
    State(app): State<AppState>,
    Json(payload): Json<TelemetryIn>,
) -> Result<(StatusCode, Json<IngestOutcome>), ApiError> {
    let outcome = ingest(app.store.as_ref(), payload, OffsetDateTime::now_utc())?;
    app.health_tracker.record_sample(outcome.alert.is_some());
    Ok((StatusCode::CREATED, Json(outcome)))
}

#[derive(Debug, Serialize)]
#[serde(tag = "connection", rename_all = "lowercase")]
enum LiveVitals {
    Connected {
        health: HealthStatus,
        latest: Option<TelemetrySample>,
        alert: Option<AlertRecord>,
    },
    Disconnected,
}

// GET /api/vitals/live (vue live du soldat connecté)
async fn live_vitals(State(app): State<AppState>, headers: HeaderMap) -> Result<Json<LiveVitals>, ApiError> {
    let now = OffsetDateTime::now_utc();
    let Some(session) = app.sessions.from_headers(&headers, now) else {
        return Ok(Json(LiveVitals::Disconnected));
    };
    let soldier = app.session_soldier(&session)?;

    let latest = app.store.latest_telemetry(&soldier.device_id)?;
    let health = latest
        .as_ref()
        .map(|s| classify(&s.vitals()))
        .unwrap_or_else(HealthStatus::offline);
    let alert = app.store.latest_alert(&soldier.device_id)?;

    Ok(Json(LiveVitals::Connected { health, latest, alert }))
}

// GET /api/soldier/me
async fn my_status(State(app): State<AppState>, headers: HeaderMap) -> Result<Json<SoldierStatusView>, ApiError> {
    let now = OffsetDateTime::now_utc();
    let session = app.require_session(&headers, now)?;
    let soldier = app.session_soldier(&session)?;
    let latest = app.store.latest_telemetry(&soldier.device_id)?;
    Ok(Json(aggregate(&soldier, soldier.deployment.as_ref(), latest.as_ref(), now)))
}

#[derive(Debug, Deserialize)]
struct LimitParams {
    limit: Option<usize>,
}

impl LimitParams {
    fn resolve(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

// GET /api/soldier/history?limit=
async fn my_history(
    State(app): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<TelemetrySample>>, ApiError> {
    let session = app.require_session(&headers, OffsetDateTime::now_utc())?;
    let soldier = app.session_soldier(&session)?;
    Ok(Json(app.store.telemetry_history(&soldier.device_id, params.resolve())?))
}

// ===== Commandant =====

// GET /api/commander/soldiers
async fn commander_soldiers(
    State(app): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<SoldierStatusView>>, ApiError> {
    let now = OffsetDateTime::now_utc();
    app.require_commander(&headers, now)?;

    let mut views = Vec::new();
    for soldier in app.store.list_soldiers()? {
        if soldier.role != Role::Soldier {
            continue;
        }
        let latest = app.store.latest_telemetry(&soldier.device_id)?;
        views.push(aggregate(&soldier, soldier.deployment.as_ref(), latest.as_ref(), now));
    }
    Ok(Json(views))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeployRequest {
    service_number: String,
    #[serde(with = "time::serde::rfc3339")]
    start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    end_time: OffsetDateTime,
}

fn deployable_soldier(app: &AppState, service_number: &str) -> Result<Soldier, ApiError> {
    let soldier = app
        .store
        .get_soldier(service_number)?
        .ok_or_else(|| ApiError::NotFound(format!("soldier {service_number}")))?;
    if soldier.role != Role::Soldier {
        return Err(ApiError::BadRequest(format!("{service_number} is not a soldier account")));
    }
    Ok(soldier)
}

// POST /api/commander/deploy
async fn schedule_deployment(
    State(app): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<DeployRequest>,
) -> Result<Json<SoldierStatusView>, ApiError> {
    let now = OffsetDateTime::now_utc();
    let commander = app.require_commander(&headers, now)?;
    if req.start_time >= req.end_time {
        return Err(ApiError::BadRequest("startTime must be before endTime".into()));
    }

    let mut soldier = deployable_soldier(&app, &req.service_number)?;
    let window = DeploymentWindow {
        is_deployed: true,
        start_time: Some(req.start_time),
        end_time: Some(req.end_time),
    };
    app.store.set_deployment(&soldier.service_number, window.clone())?;
    soldier.deployment = Some(window);
    info!("{} scheduled deployment for {}", commander.service_number, soldier.service_number);

    let latest = app.store.latest_telemetry(&soldier.device_id)?;
    Ok(Json(aggregate(&soldier, soldier.deployment.as_ref(), latest.as_ref(), now)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecallRequest {
    service_number: String,
}

// POST /api/commander/recall
async fn recall_deployment(
    State(app): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RecallRequest>,
) -> Result<Json<SoldierStatusView>, ApiError> {
    let now = OffsetDateTime::now_utc();
    let commander = app.require_commander(&headers, now)?;

    let mut soldier = deployable_soldier(&app, &req.service_number)?;
    app.store.set_deployment(&soldier.service_number, DeploymentWindow::default())?;
    soldier.deployment = Some(DeploymentWindow::default());
    info!("{} recalled {}", commander.service_number, soldier.service_number);

    let latest = app.store.latest_telemetry(&soldier.device_id)?;
    Ok(Json(aggregate(&soldier, soldier.deployment.as_ref(), latest.as_ref(), now)))
}

// GET /api/commander/alerts?limit=
async fn commander_alerts(
    State(app): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<AlertRecord>>, ApiError> {
    app.require_commander(&headers, OffsetDateTime::now_utc())?;
    Ok(Json(app.store.recent_alerts(params.resolve())?))
}
