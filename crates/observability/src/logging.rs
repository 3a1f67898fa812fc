//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable (ueberschreibt die Konfigdatei):
//! - `RZ_LOG_LEVEL`: Log-Level oder EnvFilter-Direktive, Standard: info
//! - `RZ_LOG_FORMAT`: Format (text/json), Standard: text

use tracing_subscriber::{fmt, EnvFilter};

/// Name der Umgebungsvariable fuer den Log-Level
pub const LOG_LEVEL_ENV: &str = "RZ_LOG_LEVEL";
/// Name der Umgebungsvariable fuer das Log-Format
pub const LOG_FORMAT_ENV: &str = "RZ_LOG_FORMAT";

/// Initialisiert das Logging-System.
///
/// `level` und `format` kommen aus der Konfiguration, die Umgebung hat Vorrang.
/// Ein zweiter Aufruf im selben Prozess ist wirkungslos.
pub fn logging_initialisieren(level: &str, format: &str) {
    let filter = EnvFilter::try_from_env(LOG_LEVEL_ENV)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format_env = std::env::var(LOG_FORMAT_ENV).ok();
    let format = format_waehlen(format_env.as_deref(), format);

    let ergebnis = match format {
        "json" => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_current_span(true)
            .try_init(),
        _ => fmt().with_env_filter(filter).with_target(true).try_init(),
    };

    if ergebnis.is_err() {
        tracing::debug!("Logging war bereits initialisiert");
    }
}

/// Waehlt das Format: Umgebung vor Konfiguration, ungueltige Werte werden ignoriert
fn format_waehlen<'a>(aus_env: Option<&'a str>, aus_config: &'a str) -> &'a str {
    match aus_env {
        Some(f) if log_format_gueltig(f) => f,
        _ if log_format_gueltig(aus_config) => aus_config,
        _ => "text",
    }
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}
