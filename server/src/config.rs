//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use std::net::{IpAddr, SocketAddr};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use raumzeit_discovery::{mdns, ssdp, DiscoveryConfig};
use raumzeit_observability::logging::{log_format_gueltig, log_level_gueltig};
use raumzeit_signaling::SignalingConfig;

/// Umgebungsvariable fuer den Pfad der Konfigurationsdatei
pub const CONFIG_ENV: &str = "RAUMZEIT_CONFIG";
pub const STANDARD_CONFIG_PFAD: &str = "config.toml";

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerEinstellungen,
    pub netzwerk: NetzwerkEinstellungen,
    pub raeume: RaumEinstellungen,
    pub discovery: DiscoveryEinstellungen,
    pub logging: LoggingEinstellungen,
    pub observability: ObservabilityEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
    /// Maximale Anzahl gleichzeitiger Signaling-Verbindungen
    pub max_verbindungen: usize,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Raumzeit Server".into(),
            max_verbindungen: 1024,
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer Signaling und REST
    pub bind_adresse: String,
    /// Port fuer das Signaling (TCP, laengenpraefixiertes JSON)
    pub signaling_port: u16,
    /// Port fuer die Inventar-API
    pub api_port: u16,
    /// CORS-Origins fuer die API (leer = alle erlaubt)
    pub cors_origins: Vec<String>,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            signaling_port: 7400,
            api_port: 7480,
            cors_origins: vec![],
        }
    }
}

/// Raum- und Verbindungs-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RaumEinstellungen {
    /// Kapazitaet neuer Raeume ohne Angabe von `maxUsers`
    pub standard_kapazitaet: usize,
    /// Leere Raeume werden nach dieser Zeit entfernt
    pub leerlauf_sek: u64,
    /// Intervall der Raum-Bereinigung
    pub bereinigung_sek: u64,
    pub keepalive_sek: u64,
    pub verbindungs_timeout_sek: u64,
    /// Groesse der Send-Queue pro Verbindung
    pub send_queue_groesse: usize,
    pub max_frame_groesse: usize,
}

impl Default for RaumEinstellungen {
    fn default() -> Self {
        let signaling = SignalingConfig::default();
        Self {
            standard_kapazitaet: signaling.standard_kapazitaet,
            leerlauf_sek: signaling.leerlauf_schwelle_ms / 1000,
            bereinigung_sek: raumzeit_signaling::aufgaben::BEREINIGUNGS_INTERVALL.as_secs(),
            keepalive_sek: signaling.keepalive_sek,
            verbindungs_timeout_sek: signaling.verbindungs_timeout_sek,
            send_queue_groesse: signaling.send_queue_groesse,
            max_frame_groesse: signaling.max_frame_groesse,
        }
    }
}

/// Discovery-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryEinstellungen {
    pub ssdp_aktiv: bool,
    pub mdns_aktiv: bool,
    /// Dauer eines Scans
    pub scan_dauer_sek: u64,
    /// Geraete ohne Beobachtung seit dieser Zeit werden entfernt
    pub veraltet_sek: u64,
    /// Intervall der Geraete-Bereinigung
    pub bereinigung_sek: u64,
    pub ssdp_suchziele: Vec<String>,
    pub mdns_dienste: Vec<String>,
    pub mx: u8,
    /// Port des SSDP-Empfangs-Sockets (1900, wird mit anderen Diensten geteilt)
    pub ssdp_port: u16,
    /// Port des mDNS-Empfangs-Sockets (5353, wird mit anderen Diensten geteilt)
    pub mdns_port: u16,
    pub multicast_beitreten: bool,
    /// Direkt nach dem Start einen Scan ausloesen
    pub scan_beim_start: bool,
}

impl Default for DiscoveryEinstellungen {
    fn default() -> Self {
        Self {
            ssdp_aktiv: true,
            mdns_aktiv: true,
            scan_dauer_sek: 30,
            veraltet_sek: 300,
            bereinigung_sek: raumzeit_discovery::aufgaben::VERALTET_INTERVALL.as_secs(),
            ssdp_suchziele: ssdp::STANDARD_SUCHZIELE.iter().map(|s| s.to_string()).collect(),
            mdns_dienste: mdns::STANDARD_DIENSTE.iter().map(|s| s.to_string()).collect(),
            mx: ssdp::STANDARD_MX,
            ssdp_port: ssdp::SSDP_PORT,
            mdns_port: mdns::MDNS_PORT,
            multicast_beitreten: true,
            scan_beim_start: false,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert den separaten Observability-Server
    pub aktiviert: bool,
    /// Port fuer Metriken und Health
    pub port: u16,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            port: 9300,
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => Self::aus_toml(&inhalt)
                .with_context(|| format!("Konfigurationsfehler in '{pfad}'"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Konfigurationsdatei '{pfad}' nicht lesbar"))
            }
        };
        Ok(config)
    }

    /// Pfad aus `RAUMZEIT_CONFIG`, sonst `config.toml`
    pub fn pfad_aus_umgebung() -> String {
        std::env::var(CONFIG_ENV).unwrap_or_else(|_| STANDARD_CONFIG_PFAD.into())
    }

    /// Parst und validiert einen TOML-String
    pub fn aus_toml(inhalt: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(inhalt)?;
        config.validieren()?;
        Ok(config)
    }

    pub fn validieren(&self) -> anyhow::Result<()> {
        self.bind_ip()?;
        if self.raeume.standard_kapazitaet == 0 {
            bail!("raeume.standard_kapazitaet muss groesser 0 sein");
        }
        if self.raeume.keepalive_sek == 0 || self.raeume.bereinigung_sek == 0 {
            bail!("raeume: Intervalle muessen groesser 0 sein");
        }
        if self.raeume.verbindungs_timeout_sek <= self.raeume.keepalive_sek {
            bail!("raeume.verbindungs_timeout_sek muss groesser als keepalive_sek sein");
        }
        if self.discovery.bereinigung_sek == 0 || self.discovery.scan_dauer_sek == 0 {
            bail!("discovery: Intervalle muessen groesser 0 sein");
        }
        if !log_level_gueltig(&self.logging.level) {
            bail!("logging.level '{}' ist ungueltig", self.logging.level);
        }
        if !log_format_gueltig(&self.logging.format) {
            bail!("logging.format '{}' ist ungueltig", self.logging.format);
        }
        Ok(())
    }

    fn bind_ip(&self) -> anyhow::Result<IpAddr> {
        self.netzwerk
            .bind_adresse
            .parse()
            .with_context(|| format!("ungueltige Bind-Adresse '{}'", self.netzwerk.bind_adresse))
    }

    pub fn signaling_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        Ok(SocketAddr::new(self.bind_ip()?, self.netzwerk.signaling_port))
    }

    pub fn api_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        Ok(SocketAddr::new(self.bind_ip()?, self.netzwerk.api_port))
    }

    pub fn observability_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        Ok(SocketAddr::new(self.bind_ip()?, self.observability.port))
    }

    /// Einstellungen fuer Raeume und Verbindungen
    pub fn signaling_config(&self) -> SignalingConfig {
        SignalingConfig {
            max_verbindungen: self.server.max_verbindungen,
            standard_kapazitaet: self.raeume.standard_kapazitaet,
            leerlauf_schwelle_ms: self.raeume.leerlauf_sek * 1000,
            keepalive_sek: self.raeume.keepalive_sek,
            verbindungs_timeout_sek: self.raeume.verbindungs_timeout_sek,
            send_queue_groesse: self.raeume.send_queue_groesse,
            max_frame_groesse: self.raeume.max_frame_groesse,
        }
    }

    /// Einstellungen der Discovery-Engine
    pub fn discovery_config(&self) -> DiscoveryConfig {
        let d = &self.discovery;
        let unbestimmt = IpAddr::from([0, 0, 0, 0]);
        DiscoveryConfig {
            ssdp_aktiv: d.ssdp_aktiv,
            mdns_aktiv: d.mdns_aktiv,
            scan_dauer_ms: d.scan_dauer_sek * 1000,
            veraltet_ms: d.veraltet_sek * 1000,
            ssdp_suchziele: d.ssdp_suchziele.clone(),
            mdns_dienste: d.mdns_dienste.clone(),
            mx: d.mx,
            ssdp_bind: SocketAddr::new(unbestimmt, d.ssdp_port),
            mdns_bind: SocketAddr::new(unbestimmt, d.mdns_port),
            multicast_beitreten: d.multicast_beitreten,
            ..DiscoveryConfig::default()
        }
    }
}
