//! TCP-Listener – Bindet Socket, akzeptiert Verbindungen
//!
//! Der `SignalingServer` bindet einen TCP-Socket und startet fuer jede
//! eingehende Verbindung einen eigenen tokio-Task mit einer `ClientConnection`.
//! Der gesamte Zustand ist `Send`, die Tasks laufen auf dem normalen
//! Multi-Thread-Runtime.

use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::connection::ClientConnection;
use crate::error::{SignalingError, SignalingResult};
use crate::relay::SignalingRelay;
use crate::server_state::SignalingConfig;

/// TCP-Signaling-Server
pub struct SignalingServer {
    relay: SignalingRelay,
    config: SignalingConfig,
    listener: TcpListener,
}

impl SignalingServer {
    /// Bindet den Listener
    ///
    /// Ein Bind-Fehler ist fatal fuer diesen Listener, nicht fuer den Prozess.
    pub async fn binden(
        relay: SignalingRelay,
        config: SignalingConfig,
        bind_addr: SocketAddr,
    ) -> SignalingResult<Self> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|quelle| SignalingError::Bind {
                adresse: bind_addr,
                quelle,
            })?;
        Ok(Self {
            relay,
            config,
            listener,
        })
    }

    /// Tatsaechlich gebundene Adresse (wichtig bei Port 0)
    pub fn lokale_adresse(&self) -> SignalingResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Akzeptiert Verbindungen bis `shutdown_rx` ein `true`-Signal empfaengt
    pub async fn starten(self, mut shutdown_rx: watch::Receiver<bool>) -> SignalingResult<()> {
        tracing::info!(adresse = %self.lokale_adresse()?, "TCP Signaling-Server gestartet");

        loop {
            tokio::select! {
                // Neue eingehende Verbindung
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            // Verbindungs-Limit pruefen
                            let offen = self.relay.verbindungs_anzahl();
                            if offen >= self.config.max_verbindungen {
                                tracing::warn!(
                                    peer = %peer_addr,
                                    max = self.config.max_verbindungen,
                                    "Server voll – Verbindung abgelehnt"
                                );
                                drop(stream);
                                continue;
                            }

                            if let Err(e) = stream.set_nodelay(true) {
                                tracing::debug!(peer = %peer_addr, fehler = %e, "TCP_NODELAY nicht gesetzt");
                            }

                            let verbindung = ClientConnection::neu(
                                self.relay.clone(),
                                &self.config,
                                peer_addr.to_string(),
                            );
                            let shutdown_rx_clone = shutdown_rx.clone();
                            tokio::spawn(async move {
                                verbindung.verarbeiten(stream, shutdown_rx_clone).await;
                            });
                        }
                        Err(e) => {
                            tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        }
                    }
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Signaling-Server: Shutdown-Signal empfangen");
                        break;
                    }
                }
            }
        }

        tracing::info!("TCP Signaling-Server gestoppt");
        Ok(())
    }
}
