//! Zustands-Handler – Position, Geraete, Chat, Aktionen, Benutzerdaten
//!
//! Alles hier wird an den Raum verteilt. Spatial-, Geraete- und
//! Aktions-Updates ausserhalb eines Raums sind stille No-ops.

use raumzeit_core::{ConnectionId, RaumzeitError, Result};
use raumzeit_protocol::events::{
    ChatMessageEvent, ChatMessageRequest, DeviceUpdateEvent, DeviceUpdateRequest,
    SpatialUpdateEvent, SpatialUpdateRequest, UpdateUserDataRequest, UserActionEvent,
    UserActionRequest, UserUpdatedEvent,
};
use raumzeit_protocol::ServerEvent;
use uuid::Uuid;

use super::{aktueller_raum, an_raum, an_raum_id, raum_erforderlich, raum_holen, Zustellung};
use crate::server_state::SessionState;

/// Standard-Typ einer Chat-Nachricht
pub const CHAT_STANDARD_TYP: &str = "text";

/// `spatial-update`: an alle anderen Mitglieder
pub fn handle_spatial_update(
    z: &mut SessionState,
    id: ConnectionId,
    req: SpatialUpdateRequest,
    jetzt: u64,
) -> Result<Vec<Zustellung>> {
    let Some((user_id, raum_id)) = aktueller_raum(z, id) else {
        return Ok(Vec::new());
    };

    z.raeume
        .position_aktualisieren(&raum_id, &user_id, req.position, req.rotation, jetzt);
    z.raeume.nachricht_zaehlen(&raum_id, &user_id, jetzt);

    let event = ServerEvent::SpatialUpdate(SpatialUpdateEvent {
        user_id: user_id.clone(),
        position: req.position,
        rotation: req.rotation,
        spatial_data: req.spatial_data,
        timestamp: jetzt,
    });
    Ok(an_raum_id(z, &raum_id, Some(&user_id), event))
}

/// `device-update`: an alle anderen Mitglieder, sofern der Raum es erlaubt
pub fn handle_device_update(
    z: &mut SessionState,
    id: ConnectionId,
    req: DeviceUpdateRequest,
    jetzt: u64,
) -> Result<Vec<Zustellung>> {
    let Some((user_id, raum_id)) = aktueller_raum(z, id) else {
        return Ok(Vec::new());
    };
    if !raum_holen(z, &raum_id)?.settings.device_sharing {
        return Err(RaumzeitError::ZugriffVerweigert(
            "Geraete-Teilen ist in diesem Raum deaktiviert".into(),
        ));
    }

    z.raeume.nachricht_zaehlen(&raum_id, &user_id, jetzt);

    let event = ServerEvent::DeviceUpdate(DeviceUpdateEvent {
        user_id: user_id.clone(),
        devices: req.devices,
        action: req.action,
        timestamp: jetzt,
    });
    Ok(an_raum_id(z, &raum_id, Some(&user_id), event))
}

/// `chat-message`: an den ganzen Raum inklusive Absender, gleiche ID fuer alle
pub fn handle_chat_message(
    z: &mut SessionState,
    id: ConnectionId,
    req: ChatMessageRequest,
    jetzt: u64,
) -> Result<Vec<Zustellung>> {
    let (user_id, raum_id) = raum_erforderlich(z, id)?;
    if req.message.trim().is_empty() {
        return Err(RaumzeitError::LeereNachricht);
    }

    z.raeume.nachricht_zaehlen(&raum_id, &user_id, jetzt);
    let raum = raum_holen(z, &raum_id)?;
    let username = raum
        .mitglied(&user_id)
        .map(|m| m.username.clone())
        .unwrap_or_else(|| user_id.to_string());

    let event = ServerEvent::ChatMessage(ChatMessageEvent {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.clone(),
        username,
        message: req.message,
        kind: req.kind.unwrap_or_else(|| CHAT_STANDARD_TYP.to_string()),
        timestamp: jetzt,
        room_id: raum_id.clone(),
    });

    tracing::debug!(user_id = %user_id, raum_id = %raum_id, "Chat-Nachricht verteilt");
    Ok(an_raum(&z.verbindungen, raum, None, event))
}

/// `user-action`: an alle anderen Mitglieder
pub fn handle_user_action(
    z: &mut SessionState,
    id: ConnectionId,
    req: UserActionRequest,
    jetzt: u64,
) -> Result<Vec<Zustellung>> {
    let Some((user_id, raum_id)) = aktueller_raum(z, id) else {
        return Ok(Vec::new());
    };

    z.raeume.nachricht_zaehlen(&raum_id, &user_id, jetzt);

    let event = ServerEvent::UserAction(UserActionEvent {
        user_id: user_id.clone(),
        action: req.action,
        target_user_id: req.target_user_id,
        action_data: req.action_data,
        timestamp: jetzt,
    });
    Ok(an_raum_id(z, &raum_id, Some(&user_id), event))
}

/// `update-user-data`: flaches Merge in die Mitgliedschaft, `user-updated` an die anderen
pub fn handle_update_user_data(
    z: &mut SessionState,
    id: ConnectionId,
    req: UpdateUserDataRequest,
    jetzt: u64,
) -> Result<Vec<Zustellung>> {
    let (user_id, raum_id) = raum_erforderlich(z, id)?;

    z.verbindungen.daten_setzen(id, &req.user_data);
    z.raeume
        .userdaten_aktualisieren(&raum_id, &user_id, &req.user_data, jetzt);

    let raum = raum_holen(z, &raum_id)?;
    let mitglied = raum
        .mitglied(&user_id)
        .map(|m| m.info())
        .ok_or(RaumzeitError::NichtImRaum)?;

    Ok(an_raum(
        &z.verbindungen,
        raum,
        Some(&user_id),
        ServerEvent::UserUpdated(UserUpdatedEvent {
            room_id: raum_id.clone(),
            user: mitglied,
        }),
    ))
}
