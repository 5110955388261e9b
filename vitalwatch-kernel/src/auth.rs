/**
 * AUTH - Comptes et sessions
 *
 * RÔLE :
 * - Hash/vérification des mots de passe (Argon2id, format PHC)
 * - Sessions en mémoire : token UUID v4 porté par le cookie `vitalwatch_sid`
 * - Rôle explicite (Soldier / Commander), plus de matricule sentinelle en dur
 *
 * SÉCURITÉ :
 * - Ni mot de passe ni token dans les logs
 * - Message d'échec de login générique (pas d'énumération des comptes)
 */

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::http::{header, HeaderMap};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::models::Role;

pub const SESSION_COOKIE: &str = "vitalwatch_sid";
pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid service number or password")]
    InvalidCredentials,
    #[error("password hashing failed: {0}")]
    Hashing(String),
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hashing(e.to_string()))
}

pub fn verify_password(password: &str, phc: &str) -> Result<(), AuthError> {
    let parsed = PasswordHash::new(phc).map_err(|_| AuthError::InvalidCredentials)?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[derive(Debug, Clone)]
pub struct Session {
    pub service_number: String,
    pub role: Role,
    pub expires_at: OffsetDateTime,
}

#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<String, Session>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    /// Ouvre une session et retourne le token à poser en cookie
    pub fn open(&self, service_number: &str, role: Role, now: OffsetDateTime) -> String {
        let token = Uuid::new_v4().to_string();
        let session = Session {
            service_number: service_number.to_string(),
            role,
            expires_at: now + self.ttl,
        };
        let mut sessions = self.sessions.lock();
        // purge opportuniste des sessions expirées
        sessions.retain(|_, s| s.expires_at > now);
        sessions.insert(token.clone(), session);
        token
    }

    pub fn get(&self, token: &str, now: OffsetDateTime) -> Option<Session> {
        let mut sessions = self.sessions.lock();
        match sessions.get(token) {
            Some(s) if s.expires_at > now => Some(s.clone()),
            Some(_) => {
                sessions.remove(token);
                None
            }
            None => None,
        }
    }

    pub fn close(&self, token: &str) -> bool {
        self.sessions.lock().remove(token).is_some()
    }

    /// Résout la session à partir des en-têtes Cookie de la requête
    pub fn from_headers(&self, headers: &HeaderMap, now: OffsetDateTime) -> Option<Session> {
        let token = session_token(headers)?;
        self.get(&token, now)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

pub fn session_cookie(token: &str, ttl: Duration) -> String {
    format!(
        "{SESSION_COOKIE}={token}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        ttl.whole_seconds()
    )
}

pub fn clear_cookie() -> String {
    format!("{SESSION_COOKIE}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0")
}
