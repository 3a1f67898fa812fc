//! Gemeinsame Identifikationstypen fuer Raumzeit
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! verschiedenen ID-Arten zur Compilezeit auszuschliessen. User- und
//! Raum-IDs kommen vom Client und sind deshalb Strings, Verbindungs-IDs
//! vergibt der Server.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RaumzeitError;

/// Minimale Laenge einer Raum-ID
pub const RAUM_ID_MIN_LAENGE: usize = 3;
/// Maximale Laenge einer Raum-ID
pub const RAUM_ID_MAX_LAENGE: usize = 50;

/// Eindeutige Verbindungs-ID (eine pro Transport-Session)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Erstellt eine neue zufaellige ConnectionId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}

/// Vom Client behauptete Benutzer-ID (keine Verifikation)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Prueft die Identitaet: leer oder nur Leerzeichen ist ungueltig
    pub fn parsen(roh: &str) -> Result<Self, RaumzeitError> {
        if roh.trim().is_empty() {
            return Err(RaumzeitError::UngueltigeIdentitaet);
        }
        Ok(Self(roh.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Raum-ID: 3–50 Zeichen, nur `[A-Za-z0-9_-]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Validiert Laenge und Zeichensatz
    pub fn parsen(roh: &str) -> Result<Self, RaumzeitError> {
        let laenge = roh.chars().count();
        if !(RAUM_ID_MIN_LAENGE..=RAUM_ID_MAX_LAENGE).contains(&laenge) {
            return Err(RaumzeitError::UngueltigeRaumId(roh.to_string()));
        }
        let erlaubt = roh
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !erlaubt {
            return Err(RaumzeitError::UngueltigeRaumId(roh.to_string()));
        }
        Ok(Self(roh.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Position im gemeinsamen Raum (Meter)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Orientierung als Quaternion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rotation {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Rotation {
    /// Identitaets-Quaternion
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_eindeutig() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b, "Zwei neue ConnectionIds muessen verschieden sein");
    }

    #[test]
    fn raum_id_gueltige_werte() {
        assert!(RoomId::parsen("abc").is_ok());
        assert!(RoomId::parsen("lobby-1").is_ok());
        assert!(RoomId::parsen("Raum_42").is_ok());
        assert!(RoomId::parsen(&"a".repeat(50)).is_ok());
    }

    #[test]
    fn raum_id_ungueltige_werte() {
        assert!(RoomId::parsen("ab").is_err());
        assert!(RoomId::parsen(&"a".repeat(51)).is_err());
        assert!(RoomId::parsen("mit leerzeichen").is_err());
        assert!(RoomId::parsen("raum/1").is_err());
        assert!(RoomId::parsen("küche").is_err());
        assert!(RoomId::parsen("").is_err());
    }

    #[test]
    fn user_id_leer_ist_ungueltig() {
        assert!(matches!(
            UserId::parsen("   "),
            Err(RaumzeitError::UngueltigeIdentitaet)
        ));
        assert_eq!(UserId::parsen("u1").unwrap().as_str(), "u1");
    }

    #[test]
    fn ids_sind_serde_transparent() {
        let rid = RoomId::parsen("lobby-1").unwrap();
        assert_eq!(serde_json::to_string(&rid).unwrap(), "\"lobby-1\"");
        let uid: UserId = serde_json::from_str("\"u7\"").unwrap();
        assert_eq!(uid, UserId::from("u7"));
    }

    #[test]
    fn rotation_standard_ist_identitaet() {
        let r = Rotation::default();
        assert_eq!(r.w, 1.0);
        assert_eq!(r.x, 0.0);
    }
}
