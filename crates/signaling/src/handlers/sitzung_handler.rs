//! Sitzungs-Handler – Registrierung und Keepalive

use raumzeit_core::{ConnectionId, RaumzeitError, Result};
use raumzeit_protocol::events::{
    PingMessage, PongMessage, RegisterRequest, RegisteredEvent, SERVER_CAPABILITIES,
};
use raumzeit_protocol::ServerEvent;

use super::Zustellung;
use crate::server_state::SessionState;

/// `register`: bindet die Identitaet an die Verbindung
///
/// Nur ein nicht-leerer String ist eine gueltige userId.
pub fn handle_register(
    z: &mut SessionState,
    id: ConnectionId,
    req: RegisterRequest,
    jetzt: u64,
) -> Result<Vec<Zustellung>> {
    let roh = req
        .user_id
        .as_str()
        .ok_or(RaumzeitError::UngueltigeIdentitaet)?;
    let user_id = z.verbindungen.user_binden(id, roh)?;
    if let Some(daten) = &req.user_data {
        z.verbindungen.daten_setzen(id, daten);
    }

    tracing::info!(connection_id = %id, user_id = %user_id, "Verbindung registriert");

    Ok(vec![(
        id,
        ServerEvent::Registered(RegisteredEvent {
            user_id,
            capabilities: SERVER_CAPABILITIES.iter().map(|c| c.to_string()).collect(),
            server_time: jetzt,
        }),
    )])
}

/// `ping`: antwortet mit dem Original-Timestamp und der Serverzeit
pub fn handle_ping(id: ConnectionId, ping: PingMessage, jetzt: u64) -> Vec<Zustellung> {
    vec![(
        id,
        ServerEvent::Pong(PongMessage {
            timestamp: ping.timestamp,
            server_time: jetzt,
        }),
    )]
}
