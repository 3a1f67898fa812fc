//! Inventar-API (nur lesend, plus Scan-Ausloeser)
//!
//! | Methode | Pfad               | Antwort                        |
//! |---------|--------------------|--------------------------------|
//! | GET     | /api/rooms         | Raum-Liste                     |
//! | GET     | /api/rooms/:id     | Raum + Mitglieder              |
//! | GET     | /api/devices       | Geraete-Inventar               |
//! | POST    | /api/devices/scan  | startet einen Discovery-Scan   |
//! | GET     | /api/stats         | Zaehler und aktuelle Groessen  |
//! | GET     | /metrics, /health  | aus raumzeit-observability     |

use axum::{
    extract::{Path, State},
    http::{HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;

use raumzeit_core::{FehlerKategorie, RaumzeitError};
use raumzeit_discovery::{DiscoveryEngine, Geraet};
use raumzeit_observability::{
    health_router, metrics_router, request_timing_layer, timing_middleware, HealthState,
    RaumzeitMetrics, Statistik,
};
use raumzeit_protocol::ErrorPayload;
use raumzeit_signaling::SignalingRelay;

/// Geteilter Zustand der API-Handler
#[derive(Clone)]
pub struct ApiState {
    pub server_name: String,
    pub relay: SignalingRelay,
    pub discovery: DiscoveryEngine,
    pub metriken: RaumzeitMetrics,
    pub health: HealthState,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeraeteAntwort {
    pub devices: Vec<Geraet>,
    pub count: usize,
    pub scanning: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanAntwort {
    /// `false` wenn bereits ein Scan lief oder kein Protokoll aktiv ist
    pub started: bool,
    pub scanning: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsAntwort {
    pub server: String,
    pub uptime_seconds: u64,
    pub connections: usize,
    pub rooms: usize,
    pub devices: usize,
    pub scanning: bool,
    pub zaehler: Statistik,
}

/// Erstellt den vollstaendigen Router inkl. `/metrics` und `/health`
pub fn router(state: ApiState, cors_origins: &[String]) -> Router {
    let metriken = state.metriken.clone();
    let health = state.health.clone();

    Router::new()
        .route("/api/rooms", get(raeume_auflisten))
        .route("/api/rooms/:id", get(raum_holen))
        .route("/api/devices", get(geraete_auflisten))
        .route("/api/devices/scan", post(scan_starten))
        .route("/api/stats", get(statistik))
        .with_state(state)
        .merge(metrics_router(metriken.clone()))
        .merge(health_router(health))
        .layer(middleware::from_fn_with_state(metriken, timing_middleware))
        .layer(request_timing_layer())
        .layer(cors_layer(cors_origins))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
}

/// HTTP-Status zur Fehlerkategorie
fn http_status(fehler: &RaumzeitError) -> StatusCode {
    match fehler.kategorie() {
        FehlerKategorie::Validation => StatusCode::BAD_REQUEST,
        FehlerKategorie::NotFound => StatusCode::NOT_FOUND,
        FehlerKategorie::CapacityExceeded | FehlerKategorie::Conflict => StatusCode::CONFLICT,
        FehlerKategorie::Forbidden => StatusCode::FORBIDDEN,
        FehlerKategorie::TransientNetwork => StatusCode::SERVICE_UNAVAILABLE,
        FehlerKategorie::Fatal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn fehler_antwort(fehler: &RaumzeitError) -> Response {
    (
        http_status(fehler),
        Json(json!({ "error": ErrorPayload::aus_fehler(fehler, None) })),
    )
        .into_response()
}

async fn raeume_auflisten(State(state): State<ApiState>) -> Response {
    Json(state.relay.raeume_auflisten()).into_response()
}

async fn raum_holen(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    match state.relay.raum_snapshot(&id) {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => fehler_antwort(&e),
    }
}

async fn geraete_auflisten(State(state): State<ApiState>) -> Json<GeraeteAntwort> {
    let devices = state.discovery.geraete_liste();
    Json(GeraeteAntwort {
        count: devices.len(),
        devices,
        scanning: state.discovery.ist_scanning(),
    })
}

async fn scan_starten(State(state): State<ApiState>) -> (StatusCode, Json<ScanAntwort>) {
    let started = state.discovery.scan_starten().await;
    (
        StatusCode::ACCEPTED,
        Json(ScanAntwort {
            started,
            scanning: state.discovery.ist_scanning(),
        }),
    )
}

async fn statistik(State(state): State<ApiState>) -> Json<StatsAntwort> {
    Json(StatsAntwort {
        server: state.server_name.clone(),
        uptime_seconds: state.health.uptime_seconds(),
        connections: state.relay.verbindungs_anzahl(),
        rooms: state.relay.raum_anzahl(),
        devices: state.discovery.geraete_anzahl(),
        scanning: state.discovery.ist_scanning(),
        zaehler: state.metriken.statistik(),
    })
}
