//! Health-Check-Endpunkt fuer Raumzeit
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime und Listener-Zustand

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub signaling_aktiv: bool,
    pub discovery_aktiv: bool,
}

/// Geteilter Zustand fuer den Health-Check-Handler
///
/// Signaling ohne Listener ist `unhealthy`. Discovery ohne einen einzigen
/// gebundenen Multicast-Listener ist nur `degraded`, der Server laeuft weiter.
#[derive(Clone)]
pub struct HealthState {
    pub start_time: Arc<Instant>,
    signaling_aktiv: Arc<AtomicBool>,
    discovery_aktiv: Arc<AtomicBool>,
}

impl HealthState {
    pub fn neu() -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            signaling_aktiv: Arc::new(AtomicBool::new(false)),
            discovery_aktiv: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn signaling_setzen(&self, aktiv: bool) {
        self.signaling_aktiv.store(aktiv, Ordering::Relaxed);
    }

    pub fn discovery_setzen(&self, aktiv: bool) {
        self.discovery_aktiv.store(aktiv, Ordering::Relaxed);
    }

    /// Aktueller Gesamtstatus
    pub fn status(&self) -> HealthStatus {
        if !self.signaling_aktiv.load(Ordering::Relaxed) {
            HealthStatus::Unhealthy
        } else if !self.discovery_aktiv.load(Ordering::Relaxed) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    pub fn antwort(&self) -> HealthResponse {
        HealthResponse {
            status: self.status(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.uptime_seconds(),
            signaling_aktiv: self.signaling_aktiv.load(Ordering::Relaxed),
            discovery_aktiv: self.discovery_aktiv.load(Ordering::Relaxed),
        }
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::neu()
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// `GET /health` – gibt den Serverstatus zurueck
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let response = state.antwort();

    let http_status = match response.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::OK, // 200 auch bei degraded (Liveness-Check soll nicht failen)
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (http_status, Json(response))
}
