//! Handler fuer alle Client-Events
//!
//! Jeder Handler ist ein Zustandsuebergang: er bekommt den gesperrten
//! `SessionState`, die Verbindung, das Event und die aktuelle Zeit und
//! liefert die auszuliefernden Events zurueck. Kein Handler sendet selbst.
//!
//! Ein `Err` geht ausschliesslich als `error`-Event an den Ausloeser. Handler
//! pruefen deshalb alles, bevor sie den Zustand aendern.

pub mod raum_handler;
pub mod signal_handler;
pub mod sitzung_handler;
pub mod zustand_handler;

use raumzeit_core::{ConnectionId, RaumzeitError, Result, RoomId, UserId};
use raumzeit_protocol::events::{LeaveReason, RoomLeftEvent, UserData, UserLeftEvent};
use raumzeit_protocol::ServerEvent;

use crate::registry::ConnectionRegistry;
use crate::room_store::Raum;
use crate::server_state::SessionState;

/// Ein auszulieferndes Event: Empfaenger-Verbindung + Event
pub type Zustellung = (ConnectionId, ServerEvent);

/// User-ID der Verbindung, `NOT_REGISTERED` ohne Registrierung
pub(crate) fn registrierter_user(z: &SessionState, id: ConnectionId) -> Result<UserId> {
    let verbindung = z
        .verbindungen
        .verbindung(&id)
        .ok_or(RaumzeitError::VerbindungNichtGefunden)?;
    verbindung
        .user_id
        .clone()
        .ok_or(RaumzeitError::NichtRegistriert)
}

/// User und Raum der Verbindung, falls sie in einem Raum ist
pub(crate) fn aktueller_raum(z: &SessionState, id: ConnectionId) -> Option<(UserId, RoomId)> {
    let verbindung = z.verbindungen.verbindung(&id)?;
    Some((verbindung.user_id.clone()?, verbindung.raum_id.clone()?))
}

/// Wie `aktueller_raum`, aber mit `NOT_REGISTERED` / `NOT_IN_ROOM`
pub(crate) fn raum_erforderlich(z: &SessionState, id: ConnectionId) -> Result<(UserId, RoomId)> {
    let user_id = registrierter_user(z, id)?;
    let raum_id = z
        .verbindungen
        .verbindung(&id)
        .and_then(|v| v.raum_id.clone())
        .ok_or(RaumzeitError::NichtImRaum)?;
    Ok((user_id, raum_id))
}

pub(crate) fn raum_holen<'a>(z: &'a SessionState, raum_id: &RoomId) -> Result<&'a Raum> {
    z.raeume
        .raum(raum_id)
        .ok_or_else(|| RaumzeitError::RaumNichtGefunden(raum_id.clone()))
}

/// Prueft, ob der User den Raum erstellt hat
pub(crate) fn ersteller_pruefen(raum: &Raum, user_id: &UserId, aktion: &str) -> Result<()> {
    if &raum.creator_id != user_id {
        return Err(RaumzeitError::ZugriffVerweigert(format!(
            "nur der Raum-Ersteller darf {aktion}"
        )));
    }
    Ok(())
}

/// Adressiert ein Event an alle Mitglieder eines Raums (optional ohne einen User)
///
/// Mitglieder werden ueber den User-Lookup aufgeloest. Mitglieder ohne
/// erreichbare Verbindung werden uebersprungen.
pub(crate) fn an_raum(
    verbindungen: &ConnectionRegistry,
    raum: &Raum,
    ausser: Option<&UserId>,
    event: ServerEvent,
) -> Vec<Zustellung> {
    raum.mitglieder()
        .iter()
        .filter(|m| Some(&m.user_id) != ausser)
        .filter_map(|m| verbindungen.verbindung_von_user(&m.user_id))
        .map(|ziel| (ziel, event.clone()))
        .collect()
}

/// Wie `an_raum`, aber ueber die Raum-ID (unbekannter Raum: niemand)
pub(crate) fn an_raum_id(
    z: &SessionState,
    raum_id: &RoomId,
    ausser: Option<&UserId>,
    event: ServerEvent,
) -> Vec<Zustellung> {
    match z.raeume.raum(raum_id) {
        Some(raum) => an_raum(&z.verbindungen, raum, ausser, event),
        None => Vec::new(),
    }
}

/// Bindet die Verbindung an einen Raum und loest alle anderen Verbindungen
/// desselben Users von ihrem Raum
pub(crate) fn verbindung_in_raum_setzen(
    z: &mut SessionState,
    id: ConnectionId,
    user_id: &UserId,
    raum_id: RoomId,
) {
    z.verbindungen.raum_fuer_user_loeschen(user_id);
    z.verbindungen.raum_setzen(id, Some(raum_id));
}

/// Meldet einen bereits vollzogenen Austritt
///
/// `room-left` an `aufrufer` (falls gesetzt), `user-left-room` an alle
/// verbliebenen Mitglieder.
pub(crate) fn austritt_melden(
    z: &SessionState,
    aufrufer: Option<ConnectionId>,
    user_id: &UserId,
    raum_id: &RoomId,
    grund: LeaveReason,
) -> Vec<Zustellung> {
    let mut ausgaben = Vec::new();
    if let Some(id) = aufrufer {
        ausgaben.push((
            id,
            ServerEvent::RoomLeft(RoomLeftEvent {
                room_id: raum_id.clone(),
            }),
        ));
    }
    ausgaben.extend(an_raum_id(
        z,
        raum_id,
        Some(user_id),
        ServerEvent::UserLeftRoom(UserLeftEvent {
            room_id: raum_id.clone(),
            user_id: user_id.clone(),
            reason: grund,
        }),
    ));
    ausgaben
}

/// Registrierungsdaten der Verbindung, ueberlagert von `extra`
pub(crate) fn beitrittsdaten(
    z: &SessionState,
    id: ConnectionId,
    extra: Option<&UserData>,
) -> UserData {
    let mut daten = z
        .verbindungen
        .verbindung(&id)
        .map(|v| v.user_daten.clone())
        .unwrap_or_default();
    if let Some(extra) = extra {
        for (k, v) in extra {
            daten.insert(k.clone(), v.clone());
        }
    }
    daten
}
