//! Fehlertypen fuer Raumzeit
//!
//! Zentraler Fehler-Enum fuer alle fachlichen Fehler der Session-Koordination.
//! Jeder Fehler gehoert zu genau einer `FehlerKategorie` und hat einen stabilen
//! Code, der unveraendert an den Client geht.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{RoomId, UserId};

/// Globaler Result-Alias fuer Raumzeit
pub type Result<T> = std::result::Result<T, RaumzeitError>;

/// Grobe Einordnung eines Fehlers (bestimmt Logging und Weitergabe)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FehlerKategorie {
    /// Ungueltige Eingabe, nur an den Aufrufer
    Validation,
    /// Raum oder User existiert nicht
    NotFound,
    /// Raum ist voll
    CapacityExceeded,
    /// Doppelte Raum-ID, Identitaet bereits gebunden
    Conflict,
    /// Aktion nur fuer den Raum-Ersteller erlaubt
    Forbidden,
    /// Multicast-Senden/Parsen fehlgeschlagen, nie fatal
    TransientNetwork,
    /// Listener konnte nicht gebunden werden
    Fatal,
}

/// Alle fachlichen Fehler im Raumzeit-System
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RaumzeitError {
    // --- Validierung ---
    #[error("Ungueltige Raum-ID: '{0}' (3-50 Zeichen, nur A-Z, a-z, 0-9, '-' und '_')")]
    UngueltigeRaumId(String),

    #[error("Ungueltige Identitaet: userId muss ein nicht-leerer String sein")]
    UngueltigeIdentitaet,

    #[error("Leere Nachricht")]
    LeereNachricht,

    #[error("Verbindung ist nicht registriert")]
    NichtRegistriert,

    #[error("Verbindung ist in keinem Raum")]
    NichtImRaum,

    #[error("Ungueltige Raum-Einstellungen: {0}")]
    UngueltigeEinstellungen(String),

    // --- Nicht gefunden ---
    #[error("Raum nicht gefunden: {0}")]
    RaumNichtGefunden(RoomId),

    #[error("Benutzer nicht gefunden: {0}")]
    BenutzerNichtGefunden(UserId),

    #[error("Verbindung nicht gefunden")]
    VerbindungNichtGefunden,

    // --- Kapazitaet ---
    #[error("Raum ist voll: {raum} (maximal {max} Teilnehmer)")]
    RaumVoll { raum: RoomId, max: usize },

    // --- Konflikte ---
    #[error("Raum existiert bereits: {0}")]
    RaumExistiert(RoomId),

    #[error("Benutzer {user} ist bereits Mitglied in {raum}")]
    BereitsMitglied { user: UserId, raum: RoomId },

    #[error("Verbindung ist bereits an Benutzer {0} gebunden")]
    BereitsGebunden(UserId),

    // --- Berechtigung ---
    #[error("Aktion nicht erlaubt: {0}")]
    ZugriffVerweigert(String),

    // --- Netzwerk ---
    #[error("Netzwerkfehler: {0}")]
    Netzwerk(String),

    #[error("Listener konnte nicht gestartet werden: {0}")]
    ListenerFehler(String),
}

impl RaumzeitError {
    /// Kategorie des Fehlers
    pub fn kategorie(&self) -> FehlerKategorie {
        match self {
            Self::UngueltigeRaumId(_)
            | Self::UngueltigeIdentitaet
            | Self::LeereNachricht
            | Self::NichtRegistriert
            | Self::NichtImRaum
            | Self::UngueltigeEinstellungen(_) => FehlerKategorie::Validation,
            Self::RaumNichtGefunden(_)
            | Self::BenutzerNichtGefunden(_)
            | Self::VerbindungNichtGefunden => FehlerKategorie::NotFound,
            Self::RaumVoll { .. } => FehlerKategorie::CapacityExceeded,
            Self::RaumExistiert(_) | Self::BereitsMitglied { .. } | Self::BereitsGebunden(_) => {
                FehlerKategorie::Conflict
            }
            Self::ZugriffVerweigert(_) => FehlerKategorie::Forbidden,
            Self::Netzwerk(_) => FehlerKategorie::TransientNetwork,
            Self::ListenerFehler(_) => FehlerKategorie::Fatal,
        }
    }

    /// Stabiler Fehler-Code fuer das Wire-Protokoll
    pub fn code(&self) -> &'static str {
        match self {
            Self::UngueltigeRaumId(_) => "INVALID_ROOM_ID",
            Self::UngueltigeIdentitaet => "INVALID_IDENTITY",
            Self::LeereNachricht => "EMPTY_MESSAGE",
            Self::NichtRegistriert => "NOT_REGISTERED",
            Self::NichtImRaum => "NOT_IN_ROOM",
            Self::UngueltigeEinstellungen(_) => "INVALID_SETTINGS",
            Self::RaumNichtGefunden(_) => "ROOM_NOT_FOUND",
            Self::BenutzerNichtGefunden(_) => "USER_NOT_FOUND",
            Self::VerbindungNichtGefunden => "CONNECTION_NOT_FOUND",
            Self::RaumVoll { .. } => "ROOM_FULL",
            Self::RaumExistiert(_) => "ROOM_EXISTS",
            Self::BereitsMitglied { .. } => "ALREADY_MEMBER",
            Self::BereitsGebunden(_) => "ALREADY_BOUND",
            Self::ZugriffVerweigert(_) => "FORBIDDEN",
            Self::Netzwerk(_) => "NETWORK_ERROR",
            Self::ListenerFehler(_) => "LISTENER_FAILED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = RaumzeitError::RaumNichtGefunden(RoomId::parsen("lobby-1").unwrap());
        assert_eq!(e.to_string(), "Raum nicht gefunden: lobby-1");
    }

    #[test]
    fn kategorien() {
        let raum = RoomId::parsen("lobby-1").unwrap();
        assert_eq!(
            RaumzeitError::RaumVoll {
                raum: raum.clone(),
                max: 2
            }
            .kategorie(),
            FehlerKategorie::CapacityExceeded
        );
        assert_eq!(
            RaumzeitError::RaumExistiert(raum).kategorie(),
            FehlerKategorie::Conflict
        );
        assert_eq!(
            RaumzeitError::LeereNachricht.kategorie(),
            FehlerKategorie::Validation
        );
        assert_eq!(
            RaumzeitError::Netzwerk("x".into()).kategorie(),
            FehlerKategorie::TransientNetwork
        );
    }

    #[test]
    fn kategorie_serialisierung() {
        let json = serde_json::to_string(&FehlerKategorie::CapacityExceeded).unwrap();
        assert_eq!(json, "\"capacity-exceeded\"");
    }
}
