//! Room-Store – Raeume und Mitgliedschaften
//!
//! Reiner In-Memory-Zustand ohne I/O. Der Store haelt die Invariante
//! "ein User ist hoechstens in einem Raum Mitglied" selbst ein: ein Beitritt
//! entfernt eine vorherige Mitgliedschaft im selben Schritt.
//!
//! Jede mutierende Operation aktualisiert `last_activity` des Raums.

use std::collections::HashMap;

use raumzeit_core::{Position, RaumzeitError, Result, RoomId, Rotation, UserId};
use raumzeit_protocol::events::{
    MemberInfo, RoomInfo, RoomOptions, RoomSettings, RoomStats, RoomSummary, UserData,
};
use serde_json::Value;

/// Standard-Kapazitaet eines Raums
pub const STANDARD_KAPAZITAET: usize = 50;

/// Feste Palette fuer Avatar-Farben ohne Vorgabe des Clients
pub const AVATAR_FARBEN: &[&str] = &[
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#96CEB4", "#FFEAA7", "#DDA0DD", "#98D8C8", "#F7DC6F",
];

/// Waehlt eine Avatar-Farbe deterministisch aus der User-ID
pub fn avatar_farbe(user_id: &UserId) -> &'static str {
    let hash = user_id
        .as_str()
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));
    AVATAR_FARBEN[hash as usize % AVATAR_FARBEN.len()]
}

// ---------------------------------------------------------------------------
// Mitgliedschaft
// ---------------------------------------------------------------------------

/// Mitgliedschaft eines Users in einem Raum
#[derive(Debug, Clone, PartialEq)]
pub struct Mitgliedschaft {
    pub user_id: UserId,
    pub username: String,
    pub avatar_color: String,
    pub capabilities: Vec<String>,
    /// Restliche, nicht interpretierte Benutzerdaten
    pub zusatzdaten: UserData,
    pub joined_at: u64,
    pub last_seen: u64,
    pub position: Position,
    pub rotation: Rotation,
    pub messages_sent: u64,
}

impl Mitgliedschaft {
    fn neu(user_id: UserId, daten: &UserData, jetzt: u64) -> Self {
        let mut mitglied = Self {
            username: user_id.to_string(),
            avatar_color: avatar_farbe(&user_id).to_string(),
            user_id,
            capabilities: Vec::new(),
            zusatzdaten: UserData::new(),
            joined_at: jetzt,
            last_seen: jetzt,
            position: Position::default(),
            rotation: Rotation::default(),
            messages_sent: 0,
        };
        mitglied.daten_mergen(daten);
        mitglied
    }

    /// Flaches Zusammenfuehren: bekannte Felder werden uebernommen, der Rest
    /// landet in `zusatzdaten`
    fn daten_mergen(&mut self, patch: &UserData) {
        for (schluessel, wert) in patch {
            match (schluessel.as_str(), wert) {
                ("username", Value::String(name)) if !name.trim().is_empty() => {
                    self.username = name.clone();
                }
                ("avatarColor", Value::String(farbe)) if !farbe.is_empty() => {
                    self.avatar_color = farbe.clone();
                }
                ("capabilities", Value::Array(liste)) => {
                    self.capabilities = liste
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect();
                }
                ("username" | "avatarColor" | "capabilities", _) => {}
                _ => {
                    self.zusatzdaten.insert(schluessel.clone(), wert.clone());
                }
            }
        }
    }

    pub fn info(&self) -> MemberInfo {
        MemberInfo {
            user_id: self.user_id.clone(),
            username: self.username.clone(),
            avatar_color: self.avatar_color.clone(),
            capabilities: self.capabilities.clone(),
            joined_at: self.joined_at,
            last_seen: self.last_seen,
            position: self.position,
            rotation: self.rotation,
            messages_sent: self.messages_sent,
        }
    }
}

// ---------------------------------------------------------------------------
// Raum
// ---------------------------------------------------------------------------

/// Ein Raum mit seinen Mitgliedern (in Beitrittsreihenfolge)
#[derive(Debug, Clone)]
pub struct Raum {
    pub id: RoomId,
    pub creator_id: UserId,
    pub is_public: bool,
    pub max_users: usize,
    pub created_at: u64,
    pub last_activity: u64,
    pub settings: RoomSettings,
    pub stats: RoomStats,
    mitglieder: Vec<Mitgliedschaft>,
}

impl Raum {
    pub fn mitglied(&self, user_id: &UserId) -> Option<&Mitgliedschaft> {
        self.mitglieder.iter().find(|m| &m.user_id == user_id)
    }

    fn mitglied_mut(&mut self, user_id: &UserId) -> Option<&mut Mitgliedschaft> {
        self.mitglieder.iter_mut().find(|m| &m.user_id == user_id)
    }

    pub fn ist_mitglied(&self, user_id: &UserId) -> bool {
        self.mitglied(user_id).is_some()
    }

    pub fn mitglieder(&self) -> &[Mitgliedschaft] {
        &self.mitglieder
    }

    pub fn user_ids(&self) -> Vec<UserId> {
        self.mitglieder.iter().map(|m| m.user_id.clone()).collect()
    }

    pub fn anzahl(&self) -> usize {
        self.mitglieder.len()
    }

    pub fn ist_leer(&self) -> bool {
        self.mitglieder.is_empty()
    }

    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            id: self.id.clone(),
            creator_id: self.creator_id.clone(),
            is_public: self.is_public,
            max_users: self.max_users,
            user_count: self.mitglieder.len(),
            created_at: self.created_at,
            last_activity: self.last_activity,
            settings: self.settings,
            stats: self.stats,
        }
    }

    pub fn mitglieder_infos(&self) -> Vec<MemberInfo> {
        self.mitglieder.iter().map(Mitgliedschaft::info).collect()
    }

    pub fn zusammenfassung(&self) -> RoomSummary {
        RoomSummary {
            id: self.id.clone(),
            user_count: self.mitglieder.len(),
            created_at: self.created_at,
            is_public: self.is_public,
        }
    }
}

/// Ergebnis eines Beitritts
#[derive(Debug, Clone)]
pub struct Beitritt {
    pub mitglied: MemberInfo,
    /// Raum, aus dem der User dabei entfernt wurde
    pub vorheriger_raum: Option<RoomId>,
}

fn kapazitaet_pruefen(max_users: usize) -> Result<usize> {
    if max_users == 0 {
        return Err(RaumzeitError::UngueltigeEinstellungen(
            "maxUsers muss mindestens 1 sein".into(),
        ));
    }
    Ok(max_users)
}

// ---------------------------------------------------------------------------
// RoomStore
// ---------------------------------------------------------------------------

/// Alle Raeume plus Index User -> Raum
#[derive(Debug)]
pub struct RoomStore {
    raeume: HashMap<RoomId, Raum>,
    user_index: HashMap<UserId, RoomId>,
    standard_kapazitaet: usize,
}

impl RoomStore {
    pub fn neu(standard_kapazitaet: usize) -> Self {
        Self {
            raeume: HashMap::new(),
            user_index: HashMap::new(),
            standard_kapazitaet: standard_kapazitaet.max(1),
        }
    }

    /// Erstellt einen leeren Raum
    ///
    /// Fehler: `INVALID_ROOM_ID`, `ROOM_EXISTS`, `INVALID_SETTINGS`
    pub fn raum_erstellen(
        &mut self,
        roh_id: &str,
        creator_id: UserId,
        optionen: &RoomOptions,
        jetzt: u64,
    ) -> Result<&Raum> {
        let id = RoomId::parsen(roh_id)?;
        if self.raeume.contains_key(&id) {
            return Err(RaumzeitError::RaumExistiert(id));
        }
        let max_users = kapazitaet_pruefen(optionen.max_users.unwrap_or(self.standard_kapazitaet))?;

        let mut settings = RoomSettings::default();
        if let Some(patch) = &optionen.settings {
            settings.anwenden(patch);
        }

        let raum = Raum {
            id: id.clone(),
            creator_id,
            is_public: optionen.is_public.unwrap_or(true),
            max_users,
            created_at: jetzt,
            last_activity: jetzt,
            settings,
            stats: RoomStats::default(),
            mitglieder: Vec::new(),
        };

        tracing::debug!(raum_id = %id, max_users, "Raum erstellt");
        Ok(&*self.raeume.entry(id).or_insert(raum))
    }

    pub fn raum(&self, id: &RoomId) -> Option<&Raum> {
        self.raeume.get(id)
    }

    /// Entfernt Raum und alle Mitgliedschaften, gibt den entfernten Raum zurueck
    pub fn raum_loeschen(&mut self, id: &RoomId) -> Option<Raum> {
        let raum = self.raeume.remove(id)?;
        for mitglied in &raum.mitglieder {
            self.user_index.remove(&mitglied.user_id);
        }
        tracing::debug!(raum_id = %id, "Raum geloescht");
        Some(raum)
    }

    /// Fuegt einen User hinzu
    ///
    /// Ist der User in einem anderen Raum, wird er dort erst nach allen
    /// Pruefungen entfernt. Schlaegt der Beitritt fehl, bleibt alles wie es war.
    ///
    /// Fehler: `ROOM_NOT_FOUND`, `ALREADY_MEMBER`, `ROOM_FULL`
    pub fn user_hinzufuegen(
        &mut self,
        raum_id: &RoomId,
        user_id: UserId,
        daten: &UserData,
        jetzt: u64,
    ) -> Result<Beitritt> {
        let raum = self
            .raeume
            .get(raum_id)
            .ok_or_else(|| RaumzeitError::RaumNichtGefunden(raum_id.clone()))?;
        if raum.ist_mitglied(&user_id) {
            return Err(RaumzeitError::BereitsMitglied {
                user: user_id,
                raum: raum_id.clone(),
            });
        }
        if raum.anzahl() >= raum.max_users {
            return Err(RaumzeitError::RaumVoll {
                raum: raum_id.clone(),
                max: raum.max_users,
            });
        }

        let vorheriger_raum = match self.user_index.get(&user_id).cloned() {
            Some(alt) => {
                self.user_entfernen(&alt, &user_id, jetzt);
                Some(alt)
            }
            None => None,
        };

        let mitglied = Mitgliedschaft::neu(user_id.clone(), daten, jetzt);
        let info = mitglied.info();

        let raum = self
            .raeume
            .get_mut(raum_id)
            .ok_or_else(|| RaumzeitError::RaumNichtGefunden(raum_id.clone()))?;
        raum.mitglieder.push(mitglied);
        raum.stats.total_joins += 1;
        raum.stats.peak_users = raum.stats.peak_users.max(raum.mitglieder.len());
        raum.last_activity = jetzt;
        self.user_index.insert(user_id, raum_id.clone());

        Ok(Beitritt {
            mitglied: info,
            vorheriger_raum,
        })
    }

    pub fn user_entfernen(&mut self, raum_id: &RoomId, user_id: &UserId, jetzt: u64) -> bool {
        let Some(raum) = self.raeume.get_mut(raum_id) else {
            return false;
        };
        let vorher = raum.mitglieder.len();
        raum.mitglieder.retain(|m| &m.user_id != user_id);
        if raum.mitglieder.len() == vorher {
            return false;
        }
        raum.last_activity = jetzt;
        if self.user_index.get(user_id) == Some(raum_id) {
            self.user_index.remove(user_id);
        }
        true
    }

    pub fn position_aktualisieren(
        &mut self,
        raum_id: &RoomId,
        user_id: &UserId,
        position: Position,
        rotation: Rotation,
        jetzt: u64,
    ) -> bool {
        self.mitglied_bearbeiten(raum_id, user_id, jetzt, |m| {
            m.position = position;
            m.rotation = rotation;
        })
    }

    /// Flaches Zusammenfuehren der Benutzerdaten
    pub fn userdaten_aktualisieren(
        &mut self,
        raum_id: &RoomId,
        user_id: &UserId,
        patch: &UserData,
        jetzt: u64,
    ) -> bool {
        self.mitglied_bearbeiten(raum_id, user_id, jetzt, |m| m.daten_mergen(patch))
    }

    /// Zaehlt eine weitergeleitete Nachricht fuer Raum und Absender
    pub fn nachricht_zaehlen(&mut self, raum_id: &RoomId, user_id: &UserId, jetzt: u64) -> bool {
        let gezaehlt = self.mitglied_bearbeiten(raum_id, user_id, jetzt, |m| m.messages_sent += 1);
        if let Some(raum) = self.raeume.get_mut(raum_id).filter(|_| gezaehlt) {
            raum.stats.messages_relayed += 1;
        }
        gezaehlt
    }

    /// Aktualisiert nur `last_seen` und die Raum-Aktivitaet
    pub fn beruehren(&mut self, raum_id: &RoomId, user_id: &UserId, jetzt: u64) -> bool {
        self.mitglied_bearbeiten(raum_id, user_id, jetzt, |_| {})
    }

    fn mitglied_bearbeiten(
        &mut self,
        raum_id: &RoomId,
        user_id: &UserId,
        jetzt: u64,
        aenderung: impl FnOnce(&mut Mitgliedschaft),
    ) -> bool {
        let Some(raum) = self.raeume.get_mut(raum_id) else {
            return false;
        };
        let Some(mitglied) = raum.mitglied_mut(user_id) else {
            return false;
        };
        aenderung(mitglied);
        mitglied.last_seen = jetzt;
        raum.last_activity = jetzt;
        true
    }

    /// Aendert Sichtbarkeit, Kapazitaet und Schalter
    ///
    /// Fehler: `ROOM_NOT_FOUND`, `INVALID_SETTINGS` (Kapazitaet unter aktueller Belegung)
    pub fn einstellungen_aktualisieren(
        &mut self,
        raum_id: &RoomId,
        optionen: &RoomOptions,
        jetzt: u64,
    ) -> Result<RoomInfo> {
        let raum = self
            .raeume
            .get_mut(raum_id)
            .ok_or_else(|| RaumzeitError::RaumNichtGefunden(raum_id.clone()))?;

        if let Some(max) = optionen.max_users {
            let max = kapazitaet_pruefen(max)?;
            if max < raum.mitglieder.len() {
                return Err(RaumzeitError::UngueltigeEinstellungen(format!(
                    "maxUsers {} liegt unter der aktuellen Belegung {}",
                    max,
                    raum.mitglieder.len()
                )));
            }
            raum.max_users = max;
        }
        if let Some(oeffentlich) = optionen.is_public {
            raum.is_public = oeffentlich;
        }
        if let Some(patch) = &optionen.settings {
            raum.settings.anwenden(patch);
        }
        raum.last_activity = jetzt;
        Ok(raum.info())
    }

    /// Loescht leere Raeume, deren letzte Aktivitaet aelter als die Schwelle ist
    pub fn leere_raeume_bereinigen(&mut self, jetzt: u64, schwelle_ms: u64) -> Vec<RoomId> {
        let abgelaufen: Vec<RoomId> = self
            .raeume
            .values()
            .filter(|r| r.ist_leer() && jetzt.saturating_sub(r.last_activity) > schwelle_ms)
            .map(|r| r.id.clone())
            .collect();

        for id in &abgelaufen {
            self.raeume.remove(id);
        }
        abgelaufen
    }

    /// Raum, in dem der User gerade Mitglied ist
    pub fn raum_von_user(&self, user_id: &UserId) -> Option<&RoomId> {
        self.user_index.get(user_id)
    }

    pub fn raeume(&self) -> impl Iterator<Item = &Raum> {
        self.raeume.values()
    }

    pub fn anzahl(&self) -> usize {
        self.raeume.len()
    }
}

impl Default for RoomStore {
    fn default() -> Self {
        Self::neu(STANDARD_KAPAZITAET)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn uid(s: &str) -> UserId {
        UserId::from(s)
    }

    fn rid(s: &str) -> RoomId {
        RoomId::parsen(s).unwrap()
    }

    fn daten(wert: Value) -> UserData {
        wert.as_object().cloned().unwrap_or_default()
    }

    fn store_mit_raum(id: &str, max: Option<usize>) -> RoomStore {
        let mut store = RoomStore::default();
        let optionen = RoomOptions {
            max_users: max,
            ..Default::default()
        };
        store.raum_erstellen(id, uid("ersteller"), &optionen, 1_000).unwrap();
        store
    }

    #[test]
    fn raum_erstellen_und_lesen() {
        let store = store_mit_raum("lobby-1", Some(8));
        let raum = store.raum(&rid("lobby-1")).unwrap();
        assert_eq!(raum.anzahl(), 0);
        assert_eq!(raum.max_users, 8);
        assert_eq!(raum.last_activity, 1_000);
        assert_eq!(raum.stats, RoomStats::default());
    }

    #[test]
    fn raum_standard_kapazitaet() {
        let store = store_mit_raum("lobby-1", None);
        assert_eq!(store.raum(&rid("lobby-1")).unwrap().max_users, STANDARD_KAPAZITAET);
    }

    #[test]
    fn raum_erstellen_fehler() {
        let mut store = store_mit_raum("lobby-1", None);
        let optionen = RoomOptions::default();
        assert!(matches!(
            store.raum_erstellen("lobby-1", uid("x"), &optionen, 0),
            Err(RaumzeitError::RaumExistiert(_))
        ));
        assert!(matches!(
            store.raum_erstellen("ab", uid("x"), &optionen, 0),
            Err(RaumzeitError::UngueltigeRaumId(_))
        ));
        let null = RoomOptions {
            max_users: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            store.raum_erstellen("leer-raum", uid("x"), &null, 0),
            Err(RaumzeitError::UngueltigeEinstellungen(_))
        ));
        assert_eq!(store.anzahl(), 1);
    }

    #[test]
    fn kapazitaet_wird_eingehalten() {
        let mut store = store_mit_raum("lobby-1", Some(2));
        let raum = rid("lobby-1");
        store.user_hinzufuegen(&raum, uid("u1"), &UserData::new(), 2).unwrap();
        store.user_hinzufuegen(&raum, uid("u2"), &UserData::new(), 3).unwrap();
        let voll = store.user_hinzufuegen(&raum, uid("u3"), &UserData::new(), 4);
        assert!(matches!(voll, Err(RaumzeitError::RaumVoll { max: 2, .. })));
        assert_eq!(store.raum(&raum).unwrap().anzahl(), 2);
        assert!(store.raum_von_user(&uid("u3")).is_none());
    }

    #[test]
    fn doppelter_beitritt_ist_konflikt() {
        let mut store = store_mit_raum("lobby-1", None);
        let raum = rid("lobby-1");
        store.user_hinzufuegen(&raum, uid("u1"), &UserData::new(), 2).unwrap();
        assert!(matches!(
            store.user_hinzufuegen(&raum, uid("u1"), &UserData::new(), 3),
            Err(RaumzeitError::BereitsMitglied { .. })
        ));
    }

    #[test]
    fn beitritt_in_unbekannten_raum() {
        let mut store = RoomStore::default();
        assert!(matches!(
            store.user_hinzufuegen(&rid("nirgends"), uid("u1"), &UserData::new(), 0),
            Err(RaumzeitError::RaumNichtGefunden(_))
        ));
    }

    #[test]
    fn wechsel_entfernt_alte_mitgliedschaft() {
        let mut store = store_mit_raum("raum-a", None);
        store
            .raum_erstellen("raum-b", uid("ersteller"), &RoomOptions::default(), 1_000)
            .unwrap();
        let (a, b) = (rid("raum-a"), rid("raum-b"));

        store.user_hinzufuegen(&a, uid("u1"), &UserData::new(), 2).unwrap();
        let beitritt = store.user_hinzufuegen(&b, uid("u1"), &UserData::new(), 3).unwrap();

        assert_eq!(beitritt.vorheriger_raum, Some(a.clone()));
        assert!(!store.raum(&a).unwrap().ist_mitglied(&uid("u1")));
        assert!(store.raum(&b).unwrap().ist_mitglied(&uid("u1")));
        assert_eq!(store.raum_von_user(&uid("u1")), Some(&b));
        assert_eq!(store.raum(&a).unwrap().last_activity, 3);
    }

    #[test]
    fn fehlgeschlagener_wechsel_aendert_nichts() {
        let mut store = store_mit_raum("raum-a", None);
        let optionen = RoomOptions {
            max_users: Some(1),
            ..Default::default()
        };
        store.raum_erstellen("raum-b", uid("ersteller"), &optionen, 1_000).unwrap();
        let (a, b) = (rid("raum-a"), rid("raum-b"));
        store.user_hinzufuegen(&b, uid("u9"), &UserData::new(), 2).unwrap();
        store.user_hinzufuegen(&a, uid("u1"), &UserData::new(), 2).unwrap();

        assert!(store.user_hinzufuegen(&b, uid("u1"), &UserData::new(), 3).is_err());
        assert!(store.raum(&a).unwrap().ist_mitglied(&uid("u1")));
        assert_eq!(store.raum_von_user(&uid("u1")), Some(&a));
    }

    #[test]
    fn peak_und_joins_zaehlen() {
        let mut store = store_mit_raum("lobby-1", None);
        let raum = rid("lobby-1");
        store.user_hinzufuegen(&raum, uid("u1"), &UserData::new(), 2).unwrap();
        store.user_hinzufuegen(&raum, uid("u2"), &UserData::new(), 3).unwrap();
        assert!(store.user_entfernen(&raum, &uid("u1"), 4));
        store.user_hinzufuegen(&raum, uid("u3"), &UserData::new(), 5).unwrap();

        let stats = store.raum(&raum).unwrap().stats;
        assert_eq!(stats.peak_users, 2);
        assert_eq!(stats.total_joins, 3);
    }

    #[test]
    fn user_entfernen_unbekannt() {
        let mut store = store_mit_raum("lobby-1", None);
        assert!(!store.user_entfernen(&rid("lobby-1"), &uid("niemand"), 2));
        assert!(!store.user_entfernen(&rid("nirgends"), &uid("u1"), 2));
    }

    #[test]
    fn userdaten_flach_mergen() {
        let mut store = store_mit_raum("lobby-1", None);
        let raum = rid("lobby-1");
        store
            .user_hinzufuegen(
                &raum,
                uid("u1"),
                &daten(json!({"username": "Ada", "capabilities": ["webrtc"], "hut": "rot"})),
                2,
            )
            .unwrap();

        assert!(store.userdaten_aktualisieren(
            &raum,
            &uid("u1"),
            &daten(json!({"avatarColor": "#000000", "hut": "blau"})),
            7
        ));

        let mitglied = store.raum(&raum).unwrap().mitglied(&uid("u1")).unwrap().clone();
        assert_eq!(mitglied.username, "Ada");
        assert_eq!(mitglied.avatar_color, "#000000");
        assert_eq!(mitglied.capabilities, vec!["webrtc".to_string()]);
        assert_eq!(mitglied.zusatzdaten["hut"], "blau");
        assert_eq!(mitglied.last_seen, 7);
    }

    #[test]
    fn standardwerte_fuer_mitglied() {
        let mut store = store_mit_raum("lobby-1", None);
        let beitritt = store
            .user_hinzufuegen(&rid("lobby-1"), uid("u1"), &UserData::new(), 2)
            .unwrap();
        assert_eq!(beitritt.mitglied.username, "u1");
        assert_eq!(beitritt.mitglied.avatar_color, avatar_farbe(&uid("u1")));
        assert_eq!(beitritt.mitglied.rotation, Rotation::default());
    }

    #[test]
    fn avatar_farbe_ist_deterministisch() {
        assert_eq!(avatar_farbe(&uid("alice")), avatar_farbe(&uid("alice")));
        assert!(AVATAR_FARBEN.contains(&avatar_farbe(&uid("bob"))));
    }

    #[test]
    fn position_aktualisieren() {
        let mut store = store_mit_raum("lobby-1", None);
        let raum = rid("lobby-1");
        store.user_hinzufuegen(&raum, uid("u1"), &UserData::new(), 2).unwrap();
        let pos = Position { x: 1.0, y: 2.0, z: 3.0 };
        assert!(store.position_aktualisieren(&raum, &uid("u1"), pos, Rotation::default(), 9));
        assert!(!store.position_aktualisieren(&raum, &uid("u2"), pos, Rotation::default(), 9));
        let mitglied = store.raum(&raum).unwrap().mitglied(&uid("u1")).unwrap();
        assert_eq!(mitglied.position, pos);
        assert_eq!(store.raum(&raum).unwrap().last_activity, 9);
    }

    #[test]
    fn nachricht_zaehlen_raum_und_mitglied() {
        let mut store = store_mit_raum("lobby-1", None);
        let raum = rid("lobby-1");
        store.user_hinzufuegen(&raum, uid("u1"), &UserData::new(), 2).unwrap();
        assert!(store.nachricht_zaehlen(&raum, &uid("u1"), 3));
        assert!(!store.nachricht_zaehlen(&raum, &uid("fremd"), 3));
        let r = store.raum(&raum).unwrap();
        assert_eq!(r.stats.messages_relayed, 1);
        assert_eq!(r.mitglied(&uid("u1")).unwrap().messages_sent, 1);
    }

    #[test]
    fn raum_loeschen_bereinigt_index() {
        let mut store = store_mit_raum("lobby-1", None);
        let raum = rid("lobby-1");
        store.user_hinzufuegen(&raum, uid("u1"), &UserData::new(), 2).unwrap();
        let entfernt = store.raum_loeschen(&raum).unwrap();
        assert_eq!(entfernt.user_ids(), vec![uid("u1")]);
        assert!(store.raum_von_user(&uid("u1")).is_none());
        assert!(store.raum_loeschen(&raum).is_none());
    }

    #[test]
    fn einstellungen_aktualisieren() {
        let mut store = store_mit_raum("lobby-1", None);
        let raum = rid("lobby-1");
        store.user_hinzufuegen(&raum, uid("u1"), &UserData::new(), 2).unwrap();
        store.user_hinzufuegen(&raum, uid("u2"), &UserData::new(), 2).unwrap();

        let zu_klein = RoomOptions {
            max_users: Some(1),
            ..Default::default()
        };
        assert!(matches!(
            store.einstellungen_aktualisieren(&raum, &zu_klein, 3),
            Err(RaumzeitError::UngueltigeEinstellungen(_))
        ));

        let neu = RoomOptions {
            is_public: Some(false),
            max_users: Some(4),
            settings: Some(raumzeit_protocol::events::RoomSettingsPatch {
                recording: Some(true),
                ..Default::default()
            }),
        };
        let info = store.einstellungen_aktualisieren(&raum, &neu, 4).unwrap();
        assert!(!info.is_public);
        assert_eq!(info.max_users, 4);
        assert!(info.settings.recording);
        assert!(info.settings.device_sharing);
    }

    #[test]
    fn leere_raeume_nach_schwelle_bereinigen() {
        let mut store = store_mit_raum("leer-raum", None);
        store
            .raum_erstellen("voller-raum", uid("x"), &RoomOptions::default(), 1_000)
            .unwrap();
        store
            .user_hinzufuegen(&rid("voller-raum"), uid("u1"), &UserData::new(), 1_000)
            .unwrap();

        // Genau auf der Schwelle bleibt der Raum
        assert!(store.leere_raeume_bereinigen(1_000 + 300_000, 300_000).is_empty());

        let entfernt = store.leere_raeume_bereinigen(1_000 + 300_001, 300_000);
        assert_eq!(entfernt, vec![rid("leer-raum")]);
        assert!(store.raum(&rid("voller-raum")).is_some());
        assert_eq!(store.anzahl(), 1);
    }
}
