//! Gemeinsamer Zustand des Signaling-Service
//!
//! Room-Store und Connection-Registry liegen zusammen hinter genau einem
//! Mutex. Join, Leave und Disconnect aendern beide Strukturen in einem
//! einzigen kritischen Abschnitt, ein Leser sieht nie eine Verbindung in
//! einem Raum, in dem ihr User kein Mitglied ist.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::registry::ConnectionRegistry;
use crate::room_store::{RoomStore, STANDARD_KAPAZITAET};

/// Konfiguration fuer den Signaling-Service
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Maximale gleichzeitige Verbindungen
    pub max_verbindungen: usize,
    /// Standard-Kapazitaet neuer Raeume
    pub standard_kapazitaet: usize,
    /// Leere Raeume werden nach dieser Zeit entfernt (Millisekunden)
    pub leerlauf_schwelle_ms: u64,
    /// Keepalive-Intervall in Sekunden
    pub keepalive_sek: u64,
    /// Timeout fuer inaktive Verbindungen in Sekunden
    pub verbindungs_timeout_sek: u64,
    /// Groesse der Send-Queue pro Verbindung
    pub send_queue_groesse: usize,
    /// Maximale Frame-Groesse in Bytes
    pub max_frame_groesse: usize,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            max_verbindungen: 1024,
            standard_kapazitaet: STANDARD_KAPAZITAET,
            leerlauf_schwelle_ms: 5 * 60 * 1000,
            keepalive_sek: 30,
            verbindungs_timeout_sek: 90,
            send_queue_groesse: crate::broadcast::SEND_QUEUE_GROESSE,
            max_frame_groesse: raumzeit_protocol::wire::DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Raeume und Verbindungen, gemeinsam serialisiert
#[derive(Debug)]
pub struct SessionState {
    pub raeume: RoomStore,
    pub verbindungen: ConnectionRegistry,
}

impl SessionState {
    pub fn neu(standard_kapazitaet: usize) -> Self {
        Self {
            raeume: RoomStore::neu(standard_kapazitaet),
            verbindungen: ConnectionRegistry::neu(),
        }
    }
}

/// Geteilter Handle auf den Session-Zustand
pub type GeteilterZustand = Arc<Mutex<SessionState>>;

/// Erstellt einen neuen geteilten Zustand
pub fn zustand_erstellen(config: &SignalingConfig) -> GeteilterZustand {
    Arc::new(Mutex::new(SessionState::neu(config.standard_kapazitaet)))
}
