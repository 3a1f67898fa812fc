//! Signaling-Relay – zentrale Event-Verarbeitung
//!
//! Der Relay nimmt Client-Events entgegen, fuehrt den passenden Handler
//! unter dem Session-Lock aus und liefert die Ergebnisse ueber den
//! `EventBroadcaster` aus. Zustellung passiert noch unter dem Lock, damit
//! die Reihenfolge pro Absender und Empfaenger erhalten bleibt. `try_send`
//! blockiert dabei nie.
//!
//! ## Ablauf
//! ```text
//! ClientConnection ──ClientEvent──▶ SignalingRelay::verarbeiten
//!                                        │ lock(SessionState)
//!                                        ▼
//!                                   uebergang() ──▶ handlers::*
//!                                        │ Vec<Zustellung>
//!                                        ▼
//!                                   EventBroadcaster (try_send je Empfaenger)
//! ```

use std::sync::Arc;

use raumzeit_core::{ConnectionId, RaumzeitError, RoomId, Uhr};
use raumzeit_observability::RaumzeitMetrics;
use raumzeit_protocol::events::{ErrorPayload, LeaveReason, RoomSnapshot, RoomSummary};
use raumzeit_protocol::{ClientEvent, ServerEvent};
use tokio::sync::mpsc;

use crate::broadcast::EventBroadcaster;
use crate::handlers::{
    austritt_melden, raum_handler, signal_handler, sitzung_handler, zustand_handler, Zustellung,
};
use crate::server_state::{GeteilterZustand, SessionState};

/// Fuehrt ein Client-Event als reinen Zustandsuebergang aus
///
/// Ein Handler-Fehler wird zu genau einem `error`-Event an den Ausloeser.
/// Kommt ohne Transport und ohne Uhr aus und ist damit direkt testbar.
pub fn uebergang(
    z: &mut SessionState,
    id: ConnectionId,
    event: ClientEvent,
    jetzt: u64,
) -> Vec<Zustellung> {
    let name = event.name();
    let ergebnis = match event {
        ClientEvent::Register(req) => sitzung_handler::handle_register(z, id, req, jetzt),
        ClientEvent::CreateRoom(req) => raum_handler::handle_create_room(z, id, req, jetzt),
        ClientEvent::JoinRoom(req) => raum_handler::handle_join_room(z, id, req, jetzt),
        ClientEvent::LeaveRoom(req) => raum_handler::handle_leave_room(z, id, req, jetzt),
        ClientEvent::Offer(req) => signal_handler::handle_offer(z, id, req),
        ClientEvent::Answer(req) => signal_handler::handle_answer(z, id, req),
        ClientEvent::IceCandidate(req) => signal_handler::handle_ice_candidate(z, id, req),
        ClientEvent::SpatialUpdate(req) => {
            zustand_handler::handle_spatial_update(z, id, req, jetzt)
        }
        ClientEvent::DeviceUpdate(req) => zustand_handler::handle_device_update(z, id, req, jetzt),
        ClientEvent::ChatMessage(req) => zustand_handler::handle_chat_message(z, id, req, jetzt),
        ClientEvent::UserAction(req) => zustand_handler::handle_user_action(z, id, req, jetzt),
        ClientEvent::KickUser(req) => raum_handler::handle_kick_user(z, id, req, jetzt),
        ClientEvent::UpdateRoomSettings(req) => {
            raum_handler::handle_update_room_settings(z, id, req, jetzt)
        }
        ClientEvent::DeleteRoom(req) => raum_handler::handle_delete_room(z, id, req, jetzt),
        ClientEvent::UpdateUserData(req) => {
            zustand_handler::handle_update_user_data(z, id, req, jetzt)
        }
        ClientEvent::Ping(ping) => Ok(sitzung_handler::handle_ping(id, ping, jetzt)),
        // Antwort auf einen Server-Ping, die Verbindung hat den Empfang bereits vermerkt
        ClientEvent::Pong(_) => Ok(Vec::new()),
    };

    match ergebnis {
        Ok(ausgaben) => ausgaben,
        Err(fehler) => {
            tracing::debug!(
                connection_id = %id,
                event = name,
                code = fehler.code(),
                fehler = %fehler,
                "Event abgelehnt"
            );
            vec![(id, ServerEvent::fehler(&fehler, Some(name)))]
        }
    }
}

/// Austritt beim Verbindungsende
///
/// Entfernt die Verbindung aus der Registry und, falls sie in einem Raum
/// war, die Mitgliedschaft ihres Users. Die verbliebenen Mitglieder bekommen
/// `user-left-room` mit Grund `disconnected`.
pub fn verbindung_trennen(
    z: &mut SessionState,
    id: ConnectionId,
    jetzt: u64,
) -> Vec<Zustellung> {
    let Some(verbindung) = z.verbindungen.entfernen(id) else {
        return Vec::new();
    };
    let (Some(user_id), Some(raum_id)) = (verbindung.user_id, verbindung.raum_id) else {
        return Vec::new();
    };

    if !z.raeume.user_entfernen(&raum_id, &user_id, jetzt) {
        return Vec::new();
    }
    z.verbindungen.raum_fuer_user_loeschen(&user_id);
    tracing::info!(user_id = %user_id, raum_id = %raum_id, "Raum durch Verbindungsende verlassen");
    austritt_melden(z, None, &user_id, &raum_id, LeaveReason::Disconnected)
}

/// Der Signaling-Relay mit allen Abhaengigkeiten
///
/// Clone teilt Zustand, Broadcaster und Metriken.
#[derive(Clone)]
pub struct SignalingRelay {
    zustand: GeteilterZustand,
    broadcaster: EventBroadcaster,
    uhr: Arc<dyn Uhr>,
    metriken: RaumzeitMetrics,
}

impl SignalingRelay {
    pub fn neu(
        zustand: GeteilterZustand,
        broadcaster: EventBroadcaster,
        uhr: Arc<dyn Uhr>,
        metriken: RaumzeitMetrics,
    ) -> Self {
        Self {
            zustand,
            broadcaster,
            uhr,
            metriken,
        }
    }

    /// Legt eine neue Verbindung an und gibt ihre Send-Queue zurueck
    pub fn verbindung_oeffnen(&self, id: ConnectionId) -> mpsc::Receiver<ServerEvent> {
        let jetzt = self.uhr.jetzt_ms();
        let empfaenger = self.broadcaster.client_registrieren(id);
        self.zustand.lock().verbindungen.registrieren(id, jetzt);

        self.metriken.connections_total.inc();
        self.metriken.connections_active.inc();
        tracing::debug!(connection_id = %id, "Verbindung geoeffnet");
        empfaenger
    }

    /// Verarbeitet ein Client-Event vollstaendig
    pub fn verarbeiten(&self, id: ConnectionId, event: ClientEvent) {
        self.metriken.nachricht_empfangen(event.name());
        let jetzt = self.uhr.jetzt_ms();

        let mut zustand = self.zustand.lock();
        let ausgaben = uebergang(&mut zustand, id, event, jetzt);

        if ausgaben
            .iter()
            .any(|(_, e)| matches!(e, ServerEvent::RoomCreated(_)))
        {
            self.metriken.rooms_created_total.inc();
        }
        self.metriken.rooms_active.set(zustand.raeume.anzahl() as i64);

        self.zustellen(ausgaben);
    }

    /// Antwortet auf einen nicht lesbaren Frame
    pub fn ungueltige_nachricht(&self, id: ConnectionId, grund: impl Into<String>) {
        self.metriken.nachricht_empfangen("invalid");
        let event = ServerEvent::Error(ErrorPayload::ungueltige_nachricht(grund));
        self.zustellen(vec![(id, event)]);
    }

    /// Raeumt eine geschlossene Verbindung ab
    ///
    /// Laufende Timer werden dabei nicht angefasst.
    pub fn verbindung_schliessen(&self, id: ConnectionId) {
        let jetzt = self.uhr.jetzt_ms();
        {
            let mut zustand = self.zustand.lock();
            let ausgaben = verbindung_trennen(&mut zustand, id, jetzt);
            self.zustellen(ausgaben);
        }
        self.broadcaster.client_entfernen(&id);
        self.metriken.connections_active.dec();
        tracing::debug!(connection_id = %id, "Verbindung geschlossen");
    }

    fn zustellen(&self, ausgaben: Vec<Zustellung>) {
        for (ziel, event) in ausgaben {
            if self.broadcaster.an_verbindung_senden(&ziel, event) {
                self.metriken.messages_relayed_total.inc();
            } else {
                self.metriken.send_errors_total.inc();
            }
        }
    }

    /// Loescht leere Raeume, die laenger als `schwelle_ms` inaktiv sind
    pub fn leere_raeume_bereinigen(&self, jetzt: u64, schwelle_ms: u64) -> Vec<RoomId> {
        let mut zustand = self.zustand.lock();
        let entfernt = zustand.raeume.leere_raeume_bereinigen(jetzt, schwelle_ms);
        self.metriken.rooms_active.set(zustand.raeume.anzahl() as i64);
        self.metriken.rooms_swept_total.inc_by(entfernt.len() as u64);
        entfernt
    }

    // --- Lesezugriffe fuer das Inventar ---

    /// Alle Raeume, nach ID sortiert
    pub fn raeume_auflisten(&self) -> Vec<RoomSummary> {
        let zustand = self.zustand.lock();
        let mut raeume: Vec<RoomSummary> =
            zustand.raeume.raeume().map(|r| r.zusammenfassung()).collect();
        raeume.sort_by(|a, b| a.id.cmp(&b.id));
        raeume
    }

    /// Snapshot eines Raums, `Err` bei ungueltiger oder unbekannter ID
    pub fn raum_snapshot(&self, roh_id: &str) -> Result<RoomSnapshot, RaumzeitError> {
        let raum_id = RoomId::parsen(roh_id)?;
        let zustand = self.zustand.lock();
        let raum = zustand
            .raeume
            .raum(&raum_id)
            .ok_or(RaumzeitError::RaumNichtGefunden(raum_id))?;
        Ok(RoomSnapshot {
            room: raum.info(),
            users: raum.mitglieder_infos(),
        })
    }

    pub fn verbindungs_anzahl(&self) -> usize {
        self.zustand.lock().verbindungen.anzahl()
    }

    pub fn raum_anzahl(&self) -> usize {
        self.zustand.lock().raeume.anzahl()
    }

    pub fn zustand(&self) -> &GeteilterZustand {
        &self.zustand
    }

    pub fn metriken(&self) -> &RaumzeitMetrics {
        &self.metriken
    }

    pub fn uhr(&self) -> &Arc<dyn Uhr> {
        &self.uhr
    }
}
