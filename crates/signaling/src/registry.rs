//! Connection-Registry – Verbindung -> Identitaet und aktueller Raum
//!
//! Reine Buchhaltung: die Registry schliesst keine Verbindungen und loest
//! keine Raum-Austritte aus. Pro User-ID ist genau eine Verbindung per
//! Lookup erreichbar; eine neuere Bindung verdraengt die aeltere, ohne sie
//! zu schliessen.

use std::collections::HashMap;

use raumzeit_core::{ConnectionId, RaumzeitError, Result, RoomId, UserId};
use raumzeit_protocol::events::UserData;

/// Zustand einer Verbindung (abgeleitet aus den Feldern)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbindungsZustand {
    /// Verbunden, noch keine Identitaet
    Unregistriert,
    /// Identitaet gebunden, in keinem Raum
    Registriert,
    /// Mitglied eines Raums
    ImRaum,
}

/// Eine offene Transport-Verbindung
#[derive(Debug, Clone)]
pub struct Verbindung {
    pub id: ConnectionId,
    pub user_id: Option<UserId>,
    pub raum_id: Option<RoomId>,
    /// Bei der Registrierung mitgeschickte Benutzerdaten
    pub user_daten: UserData,
    pub erstellt_ms: u64,
    pub aktiv: bool,
}

impl Verbindung {
    pub fn zustand(&self) -> VerbindungsZustand {
        match (&self.user_id, &self.raum_id) {
            (None, _) => VerbindungsZustand::Unregistriert,
            (Some(_), None) => VerbindungsZustand::Registriert,
            (Some(_), Some(_)) => VerbindungsZustand::ImRaum,
        }
    }
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    verbindungen: HashMap<ConnectionId, Verbindung>,
    nach_user: HashMap<UserId, ConnectionId>,
}

impl ConnectionRegistry {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Legt eine neue, unregistrierte Verbindung an
    pub fn registrieren(&mut self, id: ConnectionId, jetzt: u64) -> Verbindung {
        let verbindung = Verbindung {
            id,
            user_id: None,
            raum_id: None,
            user_daten: UserData::new(),
            erstellt_ms: jetzt,
            aktiv: true,
        };
        self.verbindungen.insert(id, verbindung.clone());
        verbindung
    }

    /// Bindet eine Identitaet an die Verbindung
    ///
    /// Dieselbe ID erneut zu binden ist erlaubt. Der Lookup fuer die User-ID
    /// zeigt danach immer auf diese Verbindung.
    ///
    /// Fehler: `INVALID_IDENTITY`, `ALREADY_BOUND`, `CONNECTION_NOT_FOUND`
    pub fn user_binden(&mut self, id: ConnectionId, roh_user_id: &str) -> Result<UserId> {
        let user_id = UserId::parsen(roh_user_id)?;
        let verbindung = self
            .verbindungen
            .get_mut(&id)
            .ok_or(RaumzeitError::VerbindungNichtGefunden)?;

        match &verbindung.user_id {
            Some(gebunden) if gebunden != &user_id => {
                return Err(RaumzeitError::BereitsGebunden(gebunden.clone()));
            }
            _ => verbindung.user_id = Some(user_id.clone()),
        }

        if let Some(alt) = self.nach_user.insert(user_id.clone(), id) {
            if alt != id {
                tracing::debug!(user_id = %user_id, alt = %alt, neu = %id, "User-Lookup verdraengt");
            }
        }
        Ok(user_id)
    }

    /// Merged Registrierungsdaten in die Verbindung
    pub fn daten_setzen(&mut self, id: ConnectionId, daten: &UserData) {
        if let Some(verbindung) = self.verbindungen.get_mut(&id) {
            for (k, v) in daten {
                verbindung.user_daten.insert(k.clone(), v.clone());
            }
        }
    }

    pub fn raum_setzen(&mut self, id: ConnectionId, raum_id: Option<RoomId>) -> bool {
        match self.verbindungen.get_mut(&id) {
            Some(verbindung) => {
                verbindung.raum_id = raum_id;
                true
            }
            None => false,
        }
    }

    /// Loescht den Raum auf allen Verbindungen, die an den User gebunden sind
    ///
    /// Noetig, weil eine verdraengte Verbindung noch auf einen Raum zeigen kann,
    /// in dem der User nicht mehr Mitglied ist.
    pub fn raum_fuer_user_loeschen(&mut self, user_id: &UserId) {
        for verbindung in self.verbindungen.values_mut() {
            if verbindung.user_id.as_ref() == Some(user_id) {
                verbindung.raum_id = None;
            }
        }
    }

    pub fn verbindung_von_user(&self, user_id: &UserId) -> Option<ConnectionId> {
        self.nach_user.get(user_id).copied()
    }

    pub fn verbindung(&self, id: &ConnectionId) -> Option<&Verbindung> {
        self.verbindungen.get(id)
    }

    /// Entfernt die Verbindung. Den Raum-Austritt erledigt der Aufrufer.
    pub fn entfernen(&mut self, id: ConnectionId) -> Option<Verbindung> {
        let mut verbindung = self.verbindungen.remove(&id)?;
        verbindung.aktiv = false;
        if let Some(user_id) = &verbindung.user_id {
            // Nur entfernen, wenn der Lookup noch auf diese Verbindung zeigt
            if self.nach_user.get(user_id) == Some(&id) {
                self.nach_user.remove(user_id);
            }
        }
        Some(verbindung)
    }

    pub fn anzahl(&self) -> usize {
        self.verbindungen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neue_verbindung_ist_unregistriert() {
        let mut registry = ConnectionRegistry::neu();
        let id = ConnectionId::new();
        let v = registry.registrieren(id, 5);
        assert_eq!(v.zustand(), VerbindungsZustand::Unregistriert);
        assert!(v.aktiv);
        assert_eq!(registry.anzahl(), 1);
    }

    #[test]
    fn binden_und_lookup() {
        let mut registry = ConnectionRegistry::neu();
        let id = ConnectionId::new();
        registry.registrieren(id, 0);

        let uid = registry.user_binden(id, "u1").unwrap();
        assert_eq!(registry.verbindung_von_user(&uid), Some(id));
        assert_eq!(
            registry.verbindung(&id).unwrap().zustand(),
            VerbindungsZustand::Registriert
        );

        // Gleiche ID erneut: erlaubt
        assert!(registry.user_binden(id, "u1").is_ok());
    }

    #[test]
    fn leere_identitaet_wird_abgelehnt() {
        let mut registry = ConnectionRegistry::neu();
        let id = ConnectionId::new();
        registry.registrieren(id, 0);
        assert!(matches!(
            registry.user_binden(id, "  "),
            Err(RaumzeitError::UngueltigeIdentitaet)
        ));
        assert!(registry.verbindung(&id).unwrap().user_id.is_none());
    }

    #[test]
    fn andere_identitaet_ist_konflikt() {
        let mut registry = ConnectionRegistry::neu();
        let id = ConnectionId::new();
        registry.registrieren(id, 0);
        registry.user_binden(id, "u1").unwrap();
        assert!(matches!(
            registry.user_binden(id, "u2"),
            Err(RaumzeitError::BereitsGebunden(_))
        ));
        assert!(registry.verbindung_von_user(&UserId::from("u2")).is_none());
    }

    #[test]
    fn unbekannte_verbindung() {
        let mut registry = ConnectionRegistry::neu();
        assert!(matches!(
            registry.user_binden(ConnectionId::new(), "u1"),
            Err(RaumzeitError::VerbindungNichtGefunden)
        ));
        assert!(!registry.raum_setzen(ConnectionId::new(), None));
    }

    #[test]
    fn neuere_bindung_verdraengt_lookup() {
        let mut registry = ConnectionRegistry::neu();
        let alt = ConnectionId::new();
        let neu = ConnectionId::new();
        registry.registrieren(alt, 0);
        registry.registrieren(neu, 1);
        registry.user_binden(alt, "u1").unwrap();
        let uid = registry.user_binden(neu, "u1").unwrap();

        assert_eq!(registry.verbindung_von_user(&uid), Some(neu));
        // Die alte Verbindung bleibt bestehen
        assert!(registry.verbindung(&alt).is_some());

        // Entfernen der alten Verbindung darf den Lookup nicht loeschen
        registry.entfernen(alt);
        assert_eq!(registry.verbindung_von_user(&uid), Some(neu));

        let entfernt = registry.entfernen(neu).unwrap();
        assert!(!entfernt.aktiv);
        assert!(registry.verbindung_von_user(&uid).is_none());
    }

    #[test]
    fn raum_fuer_user_loeschen_trifft_alle_verbindungen() {
        let mut registry = ConnectionRegistry::neu();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        registry.registrieren(a, 0);
        registry.registrieren(b, 0);
        let uid = registry.user_binden(a, "u1").unwrap();
        registry.user_binden(b, "u1").unwrap();
        let raum = RoomId::parsen("lobby-1").unwrap();
        registry.raum_setzen(a, Some(raum.clone()));
        registry.raum_setzen(b, Some(raum));

        registry.raum_fuer_user_loeschen(&uid);
        assert!(registry.verbindung(&a).unwrap().raum_id.is_none());
        assert!(registry.verbindung(&b).unwrap().raum_id.is_none());
    }

    #[test]
    fn daten_setzen_merged() {
        let mut registry = ConnectionRegistry::neu();
        let id = ConnectionId::new();
        registry.registrieren(id, 0);
        let mut d = UserData::new();
        d.insert("username".into(), "Ada".into());
        registry.daten_setzen(id, &d);
        let mut d2 = UserData::new();
        d2.insert("avatarColor".into(), "#fff".into());
        registry.daten_setzen(id, &d2);
        let daten = &registry.verbindung(&id).unwrap().user_daten;
        assert_eq!(daten["username"], "Ada");
        assert_eq!(daten["avatarColor"], "#fff");
    }
}
