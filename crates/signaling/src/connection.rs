//! Client-Connection – Verwaltet eine einzelne Transport-Verbindung
//!
//! Jede Verbindung bekommt eine `ClientConnection` in einem eigenen
//! tokio-Task. Der Task liest Frames, gibt sie an den Relay und schreibt
//! alles aus der Send-Queue der Verbindung auf den Socket.
//!
//! ## Keepalive
//! - Server sendet alle `keepalive_sek` einen `ping`
//! - Kommt laenger als `verbindungs_timeout_sek` kein Frame, wird getrennt
//!
//! Beim Ende (Client schliesst, Fehler, Timeout, Shutdown) raeumt der Relay
//! Registry und Mitgliedschaft ab.

use futures_util::{SinkExt, StreamExt};
use raumzeit_core::ConnectionId;
use raumzeit_protocol::events::PingMessage;
use raumzeit_protocol::{ServerCodec, ServerEvent};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::codec::Framed;

use crate::relay::SignalingRelay;
use crate::server_state::SignalingConfig;

/// Verarbeitet eine einzelne Verbindung
pub struct ClientConnection {
    relay: SignalingRelay,
    keepalive: Duration,
    timeout: Duration,
    max_frame_groesse: usize,
    peer: String,
}

impl ClientConnection {
    pub fn neu(relay: SignalingRelay, config: &SignalingConfig, peer: impl Into<String>) -> Self {
        Self {
            relay,
            keepalive: Duration::from_secs(config.keepalive_sek.max(1)),
            timeout: Duration::from_secs(config.verbindungs_timeout_sek.max(1)),
            max_frame_groesse: config.max_frame_groesse,
            peer: peer.into(),
        }
    }

    /// Startet die Verarbeitungsschleife
    ///
    /// Laeuft bis die Verbindung getrennt wird oder `shutdown_rx` `true` meldet.
    pub async fn verarbeiten<S>(self, stream: S, mut shutdown_rx: watch::Receiver<bool>)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let id = ConnectionId::new();
        let peer = self.peer.as_str();
        tracing::info!(connection_id = %id, peer, "Neue Verbindung");

        let mut framed = Framed::new(stream, ServerCodec::with_max_size(self.max_frame_groesse));
        let mut sende_rx = self.relay.verbindung_oeffnen(id);

        let mut letzter_empfang = Instant::now();
        let mut keepalive =
            tokio::time::interval_at(Instant::now() + self.keepalive, self.keepalive);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // Eingehender Frame vom Client
                frame = framed.next() => {
                    match frame {
                        Some(Ok(Ok(event))) => {
                            letzter_empfang = Instant::now();
                            tracing::trace!(connection_id = %id, event = event.name(), "Event empfangen");
                            self.relay.verarbeiten(id, event);
                        }
                        Some(Ok(Err(e))) => {
                            // Frame war vollstaendig, nur der Inhalt ist kaputt
                            letzter_empfang = Instant::now();
                            tracing::debug!(connection_id = %id, fehler = %e, "Ungueltige Nachricht");
                            self.relay.ungueltige_nachricht(id, e.to_string());
                        }
                        Some(Err(e)) => {
                            tracing::warn!(connection_id = %id, fehler = %e, "Frame-Lesefehler");
                            break;
                        }
                        None => {
                            tracing::info!(connection_id = %id, "Verbindung vom Client getrennt");
                            break;
                        }
                    }
                }

                // Ausgehende Events aus der Send-Queue
                Some(ausgehend) = sende_rx.recv() => {
                    if let Err(e) = framed.send(ausgehend).await {
                        tracing::warn!(connection_id = %id, fehler = %e, "Senden fehlgeschlagen");
                        break;
                    }
                }

                // Keepalive und Inaktivitaet
                _ = keepalive.tick() => {
                    if letzter_empfang.elapsed() > self.timeout {
                        tracing::warn!(connection_id = %id, "Verbindungs-Timeout");
                        break;
                    }
                    let ping = ServerEvent::Ping(PingMessage {
                        timestamp: self.relay.uhr().jetzt_ms(),
                    });
                    if let Err(e) = framed.send(ping).await {
                        tracing::warn!(connection_id = %id, fehler = %e, "Ping-Senden fehlgeschlagen");
                        break;
                    }
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(connection_id = %id, "Shutdown-Signal – Verbindung wird getrennt");
                        break;
                    }
                }
            }
        }

        self.relay.verbindung_schliessen(id);
        tracing::info!(connection_id = %id, peer, "Verbindungs-Task beendet");
    }
}
