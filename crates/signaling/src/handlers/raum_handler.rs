//! Raum-Handler – Erstellen, Beitreten, Verlassen und Verwaltung
//!
//! Ein Wechsel in einen anderen Raum ist ein einziger Uebergang: die alte
//! Mitgliedschaft verschwindet im selben kritischen Abschnitt, in dem die
//! neue entsteht.

use raumzeit_core::{ConnectionId, RaumzeitError, Result, RoomId, UserId};
use raumzeit_protocol::events::{
    CreateRoomRequest, DeleteRoomRequest, JoinRoomRequest, KickUserRequest, KickedEvent,
    LeaveReason, LeaveRoomRequest, RoomDeletedEvent, RoomSnapshot, RoomUpdatedEvent,
    UpdateRoomSettingsRequest, UserJoinedEvent,
};
use raumzeit_protocol::ServerEvent;

use super::{
    aktueller_raum, an_raum, austritt_melden, beitrittsdaten, ersteller_pruefen,
    raum_erforderlich, raum_holen, registrierter_user, verbindung_in_raum_setzen, Zustellung,
};
use crate::room_store::Beitritt;
use crate::server_state::SessionState;

fn snapshot(z: &SessionState, raum_id: &RoomId) -> Result<RoomSnapshot> {
    let raum = raum_holen(z, raum_id)?;
    Ok(RoomSnapshot {
        room: raum.info(),
        users: raum.mitglieder_infos(),
    })
}

/// Bindet die Verbindung nach einem Beitritt und meldet den impliziten
/// Austritt aus dem vorherigen Raum
fn nach_beitritt(
    z: &mut SessionState,
    id: ConnectionId,
    user_id: &UserId,
    raum_id: &RoomId,
    beitritt: &Beitritt,
) -> Vec<Zustellung> {
    verbindung_in_raum_setzen(z, id, user_id, raum_id.clone());
    match &beitritt.vorheriger_raum {
        Some(alt) => {
            tracing::debug!(user_id = %user_id, von = %alt, nach = %raum_id, "Raumwechsel");
            austritt_melden(z, Some(id), user_id, alt, LeaveReason::Switched)
        }
        None => Vec::new(),
    }
}

/// `create-room`: erstellt den Raum und tritt ihm bei
pub fn handle_create_room(
    z: &mut SessionState,
    id: ConnectionId,
    req: CreateRoomRequest,
    jetzt: u64,
) -> Result<Vec<Zustellung>> {
    let user_id = registrierter_user(z, id)?;
    let optionen = req.room_data.unwrap_or_default();
    let raum_id = z
        .raeume
        .raum_erstellen(&req.room_id, user_id.clone(), &optionen, jetzt)?
        .id
        .clone();

    let daten = beitrittsdaten(z, id, None);
    let beitritt = match z.raeume.user_hinzufuegen(&raum_id, user_id.clone(), &daten, jetzt) {
        Ok(beitritt) => beitritt,
        Err(fehler) => {
            // Ohne Ersteller darf der Raum nicht stehen bleiben
            z.raeume.raum_loeschen(&raum_id);
            return Err(fehler);
        }
    };

    let mut ausgaben = nach_beitritt(z, id, &user_id, &raum_id, &beitritt);
    ausgaben.push((id, ServerEvent::RoomCreated(snapshot(z, &raum_id)?)));

    tracing::info!(user_id = %user_id, raum_id = %raum_id, "Raum erstellt");
    Ok(ausgaben)
}

/// `join-room`: Beitritt, ggf. mit implizitem Austritt aus dem alten Raum
pub fn handle_join_room(
    z: &mut SessionState,
    id: ConnectionId,
    req: JoinRoomRequest,
    jetzt: u64,
) -> Result<Vec<Zustellung>> {
    let user_id = registrierter_user(z, id)?;
    let raum_id = RoomId::parsen(&req.room_id)?;
    let daten = beitrittsdaten(z, id, req.user_data.as_ref());

    let beitritt = z
        .raeume
        .user_hinzufuegen(&raum_id, user_id.clone(), &daten, jetzt)?;

    let mut ausgaben = nach_beitritt(z, id, &user_id, &raum_id, &beitritt);
    ausgaben.push((id, ServerEvent::RoomJoined(snapshot(z, &raum_id)?)));

    let raum = raum_holen(z, &raum_id)?;
    ausgaben.extend(an_raum(
        &z.verbindungen,
        raum,
        Some(&user_id),
        ServerEvent::UserJoinedRoom(UserJoinedEvent {
            room_id: raum_id.clone(),
            user: beitritt.mitglied,
        }),
    ));

    tracing::info!(user_id = %user_id, raum_id = %raum_id, "Raum beigetreten");
    Ok(ausgaben)
}

/// `leave-room`: ausserhalb eines Raums (oder mit fremder roomId) ein No-op
pub fn handle_leave_room(
    z: &mut SessionState,
    id: ConnectionId,
    req: LeaveRoomRequest,
    jetzt: u64,
) -> Result<Vec<Zustellung>> {
    let Some((user_id, raum_id)) = aktueller_raum(z, id) else {
        return Ok(Vec::new());
    };
    if req.room_id.as_deref().is_some_and(|r| r != raum_id.as_str()) {
        return Ok(Vec::new());
    }

    z.raeume.user_entfernen(&raum_id, &user_id, jetzt);
    z.verbindungen.raum_fuer_user_loeschen(&user_id);

    tracing::info!(user_id = %user_id, raum_id = %raum_id, "Raum verlassen");
    Ok(austritt_melden(z, Some(id), &user_id, &raum_id, LeaveReason::Left))
}

/// `kick-user`: nur der Ersteller, nie sich selbst
pub fn handle_kick_user(
    z: &mut SessionState,
    id: ConnectionId,
    req: KickUserRequest,
    jetzt: u64,
) -> Result<Vec<Zustellung>> {
    let (user_id, raum_id) = raum_erforderlich(z, id)?;
    let raum = raum_holen(z, &raum_id)?;
    ersteller_pruefen(raum, &user_id, "Teilnehmer entfernen")?;

    let ziel = UserId::from(req.target_user_id.as_str());
    if ziel == user_id {
        return Err(RaumzeitError::ZugriffVerweigert(
            "der Ersteller kann sich nicht selbst entfernen".into(),
        ));
    }
    if !raum.ist_mitglied(&ziel) {
        return Err(RaumzeitError::BenutzerNichtGefunden(ziel));
    }

    z.raeume.user_entfernen(&raum_id, &ziel, jetzt);
    let ziel_verbindung = z.verbindungen.verbindung_von_user(&ziel);
    z.verbindungen.raum_fuer_user_loeschen(&ziel);

    let mut ausgaben = Vec::new();
    if let Some(ziel_verbindung) = ziel_verbindung {
        ausgaben.push((
            ziel_verbindung,
            ServerEvent::Kicked(KickedEvent {
                room_id: raum_id.clone(),
                by: user_id.clone(),
                reason: req.reason,
            }),
        ));
    }
    ausgaben.extend(austritt_melden(z, None, &ziel, &raum_id, LeaveReason::Kicked));

    tracing::info!(raum_id = %raum_id, von = %user_id, ziel = %ziel, "Teilnehmer entfernt");
    Ok(ausgaben)
}

/// `update-room-settings`: nur der Ersteller, alle Mitglieder bekommen den neuen Stand
pub fn handle_update_room_settings(
    z: &mut SessionState,
    id: ConnectionId,
    req: UpdateRoomSettingsRequest,
    jetzt: u64,
) -> Result<Vec<Zustellung>> {
    let (user_id, raum_id) = raum_erforderlich(z, id)?;
    ersteller_pruefen(raum_holen(z, &raum_id)?, &user_id, "Einstellungen aendern")?;

    let info = z
        .raeume
        .einstellungen_aktualisieren(&raum_id, &req.settings, jetzt)?;

    let raum = raum_holen(z, &raum_id)?;
    Ok(an_raum(
        &z.verbindungen,
        raum,
        None,
        ServerEvent::RoomUpdated(RoomUpdatedEvent { room: info }),
    ))
}

/// `delete-room`: nur der Ersteller, alle Mitglieder fallen auf "registriert" zurueck
pub fn handle_delete_room(
    z: &mut SessionState,
    id: ConnectionId,
    req: DeleteRoomRequest,
    _jetzt: u64,
) -> Result<Vec<Zustellung>> {
    let user_id = registrierter_user(z, id)?;
    let raum_id = match req.room_id {
        Some(roh) => RoomId::parsen(&roh)?,
        None => raum_erforderlich(z, id)?.1,
    };

    let raum = raum_holen(z, &raum_id)?;
    ersteller_pruefen(raum, &user_id, "den Raum loeschen")?;

    let event = ServerEvent::RoomDeleted(RoomDeletedEvent {
        room_id: raum_id.clone(),
    });
    // Empfaenger vor dem Loeschen bestimmen
    let mut ausgaben = an_raum(&z.verbindungen, raum, None, event.clone());
    if !ausgaben.iter().any(|(ziel, _)| *ziel == id) {
        ausgaben.push((id, event));
    }

    if let Some(entfernt) = z.raeume.raum_loeschen(&raum_id) {
        for mitglied in entfernt.mitglieder() {
            z.verbindungen.raum_fuer_user_loeschen(&mitglied.user_id);
        }
    }

    tracing::info!(raum_id = %raum_id, user_id = %user_id, "Raum geloescht");
    Ok(ausgaben)
}
