//! Prometheus-kompatible Metriken fuer Raumzeit
//!
//! Registrierte Metriken:
//! - `raumzeit_connections_active` – Gauge: Aktuell offene Signaling-Verbindungen
//! - `raumzeit_connections_total` – Counter: Jemals angenommene Verbindungen
//! - `raumzeit_messages_inbound_total` – Counter: Eingehende Events (event)
//! - `raumzeit_messages_relayed_total` – Counter: Zugestellte ausgehende Events
//! - `raumzeit_rooms_active` – Gauge: Existierende Raeume
//! - `raumzeit_rooms_created_total` – Counter: Erstellte Raeume
//! - `raumzeit_rooms_swept_total` – Counter: Wegen Leerlauf entfernte Raeume
//! - `raumzeit_devices` – Gauge: Geraete im Discovery-Inventar
//! - `raumzeit_discovery_scans_total` – Counter: Gestartete Scans
//! - `raumzeit_discovery_parse_errors_total` – Counter: Verworfene Datagramme (protokoll)
//! - `raumzeit_discovery_send_errors_total` – Counter: Nicht gesendete Anfragen (protokoll)
//! - `raumzeit_send_errors_total` – Counter: Fehlgeschlagene Zustellungen
//! - `raumzeit_http_requests_total` – Counter: HTTP-Anfragen (method, path, status)
//! - `raumzeit_http_request_duration_seconds` – Histogram: HTTP-Antwortzeit
//!
//! Die Metriken sind der Telemetrie-Sammler: Komponenten bekommen einen
//! Klon von [`RaumzeitMetrics`] und zaehlen selbst, gelesen wird nur ueber
//! [`RaumzeitMetrics::statistik`] und `/metrics`.

use anyhow::Result;
use axum::{extract::State, response::IntoResponse, routing::get, Router};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Discovery-Protokolle, fuer die Parse- und Sendefehler gezaehlt werden
pub const DISCOVERY_PROTOKOLLE: &[&str] = &["ssdp", "mdns"];

/// Alle Raumzeit-Prometheus-Metriken
#[derive(Clone)]
pub struct RaumzeitMetrics {
    pub registry: Arc<Registry>,

    // Signaling
    pub connections_active: IntGauge,
    pub connections_total: IntCounter,
    pub messages_inbound_total: IntCounterVec,
    pub messages_relayed_total: IntCounter,
    pub send_errors_total: IntCounter,

    // Raeume
    pub rooms_active: IntGauge,
    pub rooms_created_total: IntCounter,
    pub rooms_swept_total: IntCounter,

    // Discovery
    pub devices: IntGauge,
    pub discovery_scans_total: IntCounter,
    pub discovery_parse_errors_total: IntCounterVec,
    pub discovery_send_errors_total: IntCounterVec,

    // HTTP
    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,
}

/// Momentaufnahme aller Zaehler (fuer `/api/stats`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistik {
    pub connections_active: i64,
    pub connections_total: u64,
    pub messages_inbound: u64,
    pub messages_relayed: u64,
    pub send_errors: u64,
    pub rooms_active: i64,
    pub rooms_created: u64,
    pub rooms_swept: u64,
    pub devices: i64,
    pub discovery_scans: u64,
    pub parse_errors: u64,
    pub discovery_send_errors: u64,
}

fn registrieren<M>(registry: &Registry, metrik: M) -> Result<M>
where
    M: prometheus::core::Collector + Clone + 'static,
{
    registry.register(Box::new(metrik.clone()))?;
    Ok(metrik)
}

impl RaumzeitMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        // --- Signaling ---
        let connections_active = registrieren(
            &registry,
            IntGauge::with_opts(Opts::new(
                "raumzeit_connections_active",
                "Anzahl aktuell offener Signaling-Verbindungen",
            ))?,
        )?;

        let connections_total = registrieren(
            &registry,
            IntCounter::with_opts(Opts::new(
                "raumzeit_connections_total",
                "Gesamtanzahl angenommener Verbindungen",
            ))?,
        )?;

        let messages_inbound_total = registrieren(
            &registry,
            IntCounterVec::new(
                Opts::new(
                    "raumzeit_messages_inbound_total",
                    "Eingehende Events pro Event-Name",
                ),
                &["event"],
            )?,
        )?;

        let messages_relayed_total = registrieren(
            &registry,
            IntCounter::with_opts(Opts::new(
                "raumzeit_messages_relayed_total",
                "In Sende-Queues eingereihte ausgehende Events",
            ))?,
        )?;

        let send_errors_total = registrieren(
            &registry,
            IntCounter::with_opts(Opts::new(
                "raumzeit_send_errors_total",
                "Zustellungen, die an voller oder geschlossener Queue scheiterten",
            ))?,
        )?;

        // --- Raeume ---
        let rooms_active = registrieren(
            &registry,
            IntGauge::with_opts(Opts::new(
                "raumzeit_rooms_active",
                "Anzahl existierender Raeume",
            ))?,
        )?;

        let rooms_created_total = registrieren(
            &registry,
            IntCounter::with_opts(Opts::new(
                "raumzeit_rooms_created_total",
                "Gesamtanzahl erstellter Raeume",
            ))?,
        )?;

        let rooms_swept_total = registrieren(
            &registry,
            IntCounter::with_opts(Opts::new(
                "raumzeit_rooms_swept_total",
                "Wegen Leerlauf entfernte Raeume",
            ))?,
        )?;

        // --- Discovery ---
        let devices = registrieren(
            &registry,
            IntGauge::with_opts(Opts::new(
                "raumzeit_devices",
                "Geraete im Discovery-Inventar",
            ))?,
        )?;

        let discovery_scans_total = registrieren(
            &registry,
            IntCounter::with_opts(Opts::new(
                "raumzeit_discovery_scans_total",
                "Gestartete Discovery-Scans",
            ))?,
        )?;

        let discovery_parse_errors_total = registrieren(
            &registry,
            IntCounterVec::new(
                Opts::new(
                    "raumzeit_discovery_parse_errors_total",
                    "Verworfene Discovery-Datagramme",
                ),
                &["protokoll"],
            )?,
        )?;

        let discovery_send_errors_total = registrieren(
            &registry,
            IntCounterVec::new(
                Opts::new(
                    "raumzeit_discovery_send_errors_total",
                    "Discovery-Anfragen, deren Versand fehlschlug",
                ),
                &["protokoll"],
            )?,
        )?;
        for protokoll in DISCOVERY_PROTOKOLLE {
            discovery_parse_errors_total.with_label_values(&[*protokoll]);
            discovery_send_errors_total.with_label_values(&[*protokoll]);
        }

        // --- HTTP ---
        let http_requests_total = registrieren(
            &registry,
            IntCounterVec::new(
                Opts::new("raumzeit_http_requests_total", "Gesamtanzahl HTTP-Anfragen"),
                &["method", "path", "status"],
            )?,
        )?;

        let http_request_duration_seconds = registrieren(
            &registry,
            HistogramVec::new(
                HistogramOpts::new(
                    "raumzeit_http_request_duration_seconds",
                    "HTTP-Antwortzeit in Sekunden",
                )
                .buckets(vec![
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
                ]),
                &["method", "path"],
            )?,
        )?;

        Ok(Self {
            registry: Arc::new(registry),
            connections_active,
            connections_total,
            messages_inbound_total,
            messages_relayed_total,
            send_errors_total,
            rooms_active,
            rooms_created_total,
            rooms_swept_total,
            devices,
            discovery_scans_total,
            discovery_parse_errors_total,
            discovery_send_errors_total,
            http_requests_total,
            http_request_duration_seconds,
        })
    }

    /// Zaehlt ein eingehendes Event
    pub fn nachricht_empfangen(&self, event: &str) {
        self.messages_inbound_total.with_label_values(&[event]).inc();
    }

    /// Zaehlt ein verworfenes Discovery-Datagramm
    pub fn parse_fehler(&self, protokoll: &str) {
        self.discovery_parse_errors_total
            .with_label_values(&[protokoll])
            .inc();
    }

    /// Zaehlt eine Discovery-Anfrage, die nicht gesendet werden konnte
    pub fn discovery_sendefehler(&self, protokoll: &str) {
        self.discovery_send_errors_total
            .with_label_values(&[protokoll])
            .inc();
    }

    /// Liest alle Zaehler als Momentaufnahme
    pub fn statistik(&self) -> Statistik {
        let messages_inbound = self
            .registry
            .gather()
            .iter()
            .filter(|f| f.get_name() == "raumzeit_messages_inbound_total")
            .flat_map(|f| f.get_metric().iter())
            .map(|m| m.get_counter().get_value() as u64)
            .sum();

        let parse_errors = DISCOVERY_PROTOKOLLE
            .iter()
            .map(|p| self.discovery_parse_errors_total.with_label_values(&[*p]).get())
            .sum();
        let discovery_send_errors = DISCOVERY_PROTOKOLLE
            .iter()
            .map(|p| self.discovery_send_errors_total.with_label_values(&[*p]).get())
            .sum();

        Statistik {
            connections_active: self.connections_active.get(),
            connections_total: self.connections_total.get(),
            messages_inbound,
            messages_relayed: self.messages_relayed_total.get(),
            send_errors: self.send_errors_total.get(),
            rooms_active: self.rooms_active.get(),
            rooms_created: self.rooms_created_total.get(),
            rooms_swept: self.rooms_swept_total.get(),
            devices: self.devices.get(),
            discovery_scans: self.discovery_scans_total.get(),
            parse_errors,
            discovery_send_errors,
        }
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: RaumzeitMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<RaumzeitMetrics>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            axum::http::StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metriken_erstellen_erfolgreich() {
        let metriken = RaumzeitMetrics::neu().unwrap();
        assert!(!metriken.registry.gather().is_empty());
    }

    #[test]
    fn zwei_instanzen_kollidieren_nicht() {
        // Jede Instanz hat ihre eigene Registry
        let a = RaumzeitMetrics::neu().unwrap();
        let b = RaumzeitMetrics::neu().unwrap();
        a.connections_total.inc();
        assert_eq!(b.connections_total.get(), 0);
    }

    #[test]
    fn statistik_summiert_eingehende_events() {
        let metriken = RaumzeitMetrics::neu().unwrap();
        metriken.nachricht_empfangen("join-room");
        metriken.nachricht_empfangen("join-room");
        metriken.nachricht_empfangen("chat-message");
        metriken.parse_fehler("ssdp");
        metriken.parse_fehler("mdns");
        metriken.discovery_sendefehler("ssdp");
        metriken.rooms_active.set(3);

        let stats = metriken.statistik();
        assert_eq!(stats.messages_inbound, 3);
        assert_eq!(stats.parse_errors, 2);
        assert_eq!(stats.discovery_send_errors, 1);
        assert_eq!(stats.rooms_active, 3);
        assert_eq!(stats.devices, 0);
    }

    #[test]
    fn statistik_serialisierung_camel_case() {
        let json = serde_json::to_value(Statistik::default()).unwrap();
        assert!(json.get("connectionsActive").is_some());
        assert!(json.get("parseErrors").is_some());
    }

    #[test]
    fn metriken_export_prometheus_format() {
        let metriken = RaumzeitMetrics::neu().unwrap();
        metriken.connections_active.set(5);
        metriken.messages_relayed_total.inc();

        let output = metriken.exportieren().unwrap();
        assert!(output.contains("raumzeit_connections_active 5"));
        assert!(output.contains("raumzeit_messages_relayed_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn alle_metriken_in_registry_registriert() {
        let metriken = RaumzeitMetrics::neu().unwrap();

        // Vec-Metriken erscheinen in gather() erst nach dem ersten Label-Zugriff
        metriken.nachricht_empfangen("ping");
        metriken
            .http_requests_total
            .with_label_values(&["GET", "/test", "200"])
            .inc();
        metriken
            .http_request_duration_seconds
            .with_label_values(&["GET", "/test"])
            .observe(0.01);

        let families = metriken.registry.gather();
        let namen: Vec<&str> = families.iter().map(|f| f.get_name()).collect();

        for name in [
            "raumzeit_connections_active",
            "raumzeit_connections_total",
            "raumzeit_messages_inbound_total",
            "raumzeit_messages_relayed_total",
            "raumzeit_send_errors_total",
            "raumzeit_rooms_active",
            "raumzeit_rooms_created_total",
            "raumzeit_rooms_swept_total",
            "raumzeit_devices",
            "raumzeit_discovery_scans_total",
            "raumzeit_discovery_parse_errors_total",
            "raumzeit_discovery_send_errors_total",
            "raumzeit_http_requests_total",
            "raumzeit_http_request_duration_seconds",
        ] {
            assert!(namen.contains(&name), "{name} fehlt in der Registry");
        }
    }
}
