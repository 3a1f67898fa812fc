//! Signal-Handler – Weiterleitung der WebRTC-Aushandlung
//!
//! Offer, Answer und ICE-Kandidaten werden unveraendert an genau einen
//! Ziel-User weitergereicht. Der Payload wird nie inspiziert.

use raumzeit_core::{ConnectionId, RaumzeitError, Result, UserId};
use raumzeit_protocol::events::{
    AnswerRequest, IceCandidateRequest, OfferRequest, RelayedAnswer, RelayedCandidate,
    RelayedOffer,
};
use raumzeit_protocol::ServerEvent;

use super::{raum_erforderlich, registrierter_user, Zustellung};
use crate::server_state::SessionState;

fn ziel_aufloesen(z: &SessionState, to: &str) -> Result<ConnectionId> {
    let ziel = UserId::from(to);
    z.verbindungen
        .verbindung_von_user(&ziel)
        .ok_or(RaumzeitError::BenutzerNichtGefunden(ziel))
}

/// `offer`: nur aus einem Raum heraus, unbekanntes Ziel ist ein Fehler
pub fn handle_offer(
    z: &mut SessionState,
    id: ConnectionId,
    req: OfferRequest,
) -> Result<Vec<Zustellung>> {
    let (from, _) = raum_erforderlich(z, id)?;
    let ziel = ziel_aufloesen(z, &req.to)?;
    Ok(vec![(
        ziel,
        ServerEvent::Offer(RelayedOffer {
            from,
            offer: req.offer,
        }),
    )])
}

/// `answer`: ohne Raum-Pruefung, unbekanntes Ziel ist ein Fehler
pub fn handle_answer(
    z: &mut SessionState,
    id: ConnectionId,
    req: AnswerRequest,
) -> Result<Vec<Zustellung>> {
    let from = registrierter_user(z, id)?;
    let ziel = ziel_aufloesen(z, &req.to)?;
    Ok(vec![(
        ziel,
        ServerEvent::Answer(RelayedAnswer {
            from,
            answer: req.answer,
        }),
    )])
}

/// `ice-candidate`: ohne Raum-Pruefung, unbekanntes Ziel wird still verworfen
pub fn handle_ice_candidate(
    z: &mut SessionState,
    id: ConnectionId,
    req: IceCandidateRequest,
) -> Result<Vec<Zustellung>> {
    let from = registrierter_user(z, id)?;
    match ziel_aufloesen(z, &req.to) {
        Ok(ziel) => Ok(vec![(
            ziel,
            ServerEvent::IceCandidate(RelayedCandidate {
                from,
                candidate: req.candidate,
            }),
        )]),
        Err(_) => {
            tracing::debug!(from = %from, to = %req.to, "ICE-Kandidat fuer unbekanntes Ziel verworfen");
            Ok(Vec::new())
        }
    }
}
