//! Fehlertypen fuer die Discovery
//!
//! Kein Discovery-Fehler ist fuer den Prozess fatal: ein Bind-Fehler
//! deaktiviert genau ein Protokoll, ein Parse-Fehler verwirft genau ein
//! Datagramm.

use std::net::{Ipv4Addr, SocketAddr};

use raumzeit_core::RaumzeitError;
use thiserror::Error;

use crate::geraet::Protokoll;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Socket konnte nicht gebunden werden
    #[error("{protokoll}: Bind auf {adresse} fehlgeschlagen: {quelle}")]
    Bind {
        protokoll: Protokoll,
        adresse: SocketAddr,
        #[source]
        quelle: std::io::Error,
    },

    /// Beitritt zur Multicast-Gruppe fehlgeschlagen
    #[error("{protokoll}: Multicast-Beitritt zu {gruppe} fehlgeschlagen: {quelle}")]
    Multicast {
        protokoll: Protokoll,
        gruppe: Ipv4Addr,
        #[source]
        quelle: std::io::Error,
    },

    /// Datagramm ist kaputt
    #[error("{protokoll}: ungueltiges Datagramm: {grund}")]
    Parse {
        protokoll: Protokoll,
        grund: String,
    },

    /// Ungueltiger Dienstname fuer eine mDNS-Anfrage
    #[error("ungueltiger Dienstname: {0}")]
    UngueltigerName(String),
}

impl DiscoveryError {
    pub(crate) fn ssdp(grund: impl Into<String>) -> Self {
        Self::Parse {
            protokoll: Protokoll::Ssdp,
            grund: grund.into(),
        }
    }

    pub(crate) fn mdns(grund: impl Into<String>) -> Self {
        Self::Parse {
            protokoll: Protokoll::Mdns,
            grund: grund.into(),
        }
    }
}

impl From<DiscoveryError> for RaumzeitError {
    fn from(fehler: DiscoveryError) -> Self {
        match fehler {
            DiscoveryError::Bind { .. } | DiscoveryError::Multicast { .. } => {
                RaumzeitError::ListenerFehler(fehler.to_string())
            }
            andere => RaumzeitError::Netzwerk(andere.to_string()),
        }
    }
}

pub type DiscoveryResult<T> = Result<T, DiscoveryError>;
