//! Event-Broadcaster – Sende-Queues aller offenen Verbindungen
//!
//! Jede Verbindung bekommt eine begrenzte mpsc-Queue. Zustellung ist
//! fire-and-forget: eine volle oder geschlossene Queue verwirft das Event
//! fuer genau diesen Empfaenger, alle anderen sind nicht betroffen.
//!
//! Empfaenger werden hier nach `ConnectionId` adressiert. Welche
//! Verbindungen ein Raum-Event bekommen, entscheidet der Relay.

use dashmap::DashMap;
use raumzeit_core::ConnectionId;
use raumzeit_protocol::ServerEvent;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Standard-Groesse der Send-Queue pro Verbindung
pub const SEND_QUEUE_GROESSE: usize = 64;

// ---------------------------------------------------------------------------
// ClientSender
// ---------------------------------------------------------------------------

/// Handle auf die Send-Queue einer Verbindung
#[derive(Clone, Debug)]
pub struct ClientSender {
    pub connection_id: ConnectionId,
    pub tx: mpsc::Sender<ServerEvent>,
}

impl ClientSender {
    /// Sendet ein Event nicht-blockierend
    ///
    /// Gibt `false` zurueck wenn die Queue voll oder geschlossen ist.
    pub fn senden(&self, event: ServerEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(
                    connection_id = %self.connection_id,
                    event = event.name(),
                    "Send-Queue voll – Event verworfen"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(connection_id = %self.connection_id, "Send-Queue geschlossen (Verbindung getrennt)");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// EventBroadcaster
// ---------------------------------------------------------------------------

/// Zentrale Send-Queues aller Verbindungen
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct EventBroadcaster {
    inner: Arc<EventBroadcasterInner>,
}

struct EventBroadcasterInner {
    clients: DashMap<ConnectionId, ClientSender>,
    queue_groesse: usize,
}

impl EventBroadcaster {
    pub fn neu() -> Self {
        Self::mit_queue_groesse(SEND_QUEUE_GROESSE)
    }

    pub fn mit_queue_groesse(queue_groesse: usize) -> Self {
        Self {
            inner: Arc::new(EventBroadcasterInner {
                clients: DashMap::new(),
                queue_groesse: queue_groesse.max(1),
            }),
        }
    }

    /// Registriert eine Verbindung und gibt ihre Empfangs-Queue zurueck
    ///
    /// Die `ClientConnection` liest aus dieser Queue und schreibt auf den Socket.
    pub fn client_registrieren(&self, connection_id: ConnectionId) -> mpsc::Receiver<ServerEvent> {
        let (tx, rx) = mpsc::channel(self.inner.queue_groesse);
        let sender = ClientSender { connection_id, tx };
        self.inner.clients.insert(connection_id, sender);
        tracing::debug!(connection_id = %connection_id, "Verbindung im Broadcaster registriert");
        rx
    }

    pub fn client_entfernen(&self, connection_id: &ConnectionId) {
        self.inner.clients.remove(connection_id);
        tracing::debug!(connection_id = %connection_id, "Verbindung aus Broadcaster entfernt");
    }

    /// Sendet ein Event an eine einzelne Verbindung
    ///
    /// Gibt `true` zurueck wenn die Verbindung bekannt ist und das Event eingereiht wurde.
    pub fn an_verbindung_senden(&self, connection_id: &ConnectionId, event: ServerEvent) -> bool {
        match self.inner.clients.get(connection_id) {
            Some(sender) => sender.senden(event),
            None => {
                tracing::debug!(connection_id = %connection_id, "Senden an unbekannte Verbindung");
                false
            }
        }
    }

    pub fn client_anzahl(&self) -> usize {
        self.inner.clients.len()
    }

    pub fn ist_registriert(&self, connection_id: &ConnectionId) -> bool {
        self.inner.clients.contains_key(connection_id)
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
