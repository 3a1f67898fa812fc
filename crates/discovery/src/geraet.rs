//! Geraete-Typen der Discovery

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};

/// Herkunftsprotokoll einer Beobachtung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protokoll {
    Ssdp,
    Mdns,
}

impl Protokoll {
    pub const ALLE: [Protokoll; 2] = [Protokoll::Ssdp, Protokoll::Mdns];

    /// Name fuer Logs und Metrik-Labels
    pub fn name(self) -> &'static str {
        match self {
            Protokoll::Ssdp => "ssdp",
            Protokoll::Mdns => "mdns",
        }
    }
}

impl std::fmt::Display for Protokoll {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Optionale Zusatzinformationen aus der Antwort
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeraeteAttribute {
    /// SSDP `LOCATION` (URL der Geraetebeschreibung)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// SSDP `SERVER`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    /// mDNS SRV-Ziel (Hostname)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// mDNS SRV-Port
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// mDNS A-Record des SRV-Ziels
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<Ipv4Addr>,
}

impl GeraeteAttribute {
    /// Uebernimmt alle gesetzten Felder von `neuer`
    pub fn auffrischen(&mut self, neuer: GeraeteAttribute) {
        if neuer.location.is_some() {
            self.location = neuer.location;
        }
        if neuer.server.is_some() {
            self.server = neuer.server;
        }
        if neuer.host.is_some() {
            self.host = neuer.host;
        }
        if neuer.port.is_some() {
            self.port = neuer.port;
        }
        if neuer.ipv4.is_some() {
            self.ipv4 = neuer.ipv4;
        }
    }
}

/// Ein geparstes Geraet aus genau einem Datagramm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Beobachtung {
    pub protokoll: Protokoll,
    /// USN bei SSDP, Instanzname bei mDNS
    pub kennung: String,
    pub name: String,
    pub typ: String,
    pub attribute: GeraeteAttribute,
}

/// Ein Eintrag im Geraete-Inventar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Geraet {
    /// Stabiler Schluessel: Quelladresse + Kennung
    pub id: String,
    pub kennung: String,
    pub name: String,
    pub typ: String,
    pub adresse: IpAddr,
    pub protokoll: Protokoll,
    pub first_seen: u64,
    pub last_seen: u64,
    pub attribute: GeraeteAttribute,
}

/// Schluessel eines Geraets
pub fn geraete_id(adresse: IpAddr, kennung: &str) -> String {
    format!("{adresse}|{kennung}")
}
