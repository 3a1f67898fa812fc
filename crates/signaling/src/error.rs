//! Fehlertypen fuer den Signaling-Transport
//!
//! Fachliche Fehler (Raum voll, nicht registriert, ...) sind
//! `RaumzeitError` und gehen als `error`-Event an den Client. Hier landen
//! nur Fehler des TCP-Listeners selbst.

use std::net::SocketAddr;

use raumzeit_core::RaumzeitError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignalingError {
    /// IO-Fehler (TCP, Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Listener konnte nicht gebunden werden
    #[error("Bind auf {adresse} fehlgeschlagen: {quelle}")]
    Bind {
        adresse: SocketAddr,
        #[source]
        quelle: std::io::Error,
    },
}

impl From<SignalingError> for RaumzeitError {
    fn from(fehler: SignalingError) -> Self {
        RaumzeitError::ListenerFehler(fehler.to_string())
    }
}

/// Result-Typ fuer den Signaling-Transport
pub type SignalingResult<T> = Result<T, SignalingError>;
