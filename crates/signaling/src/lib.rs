//! raumzeit-signaling – Raeume, Verbindungen und Signaling-Relay
//!
//! Dieser Crate implementiert die Session-Koordination: wer ist verbunden,
//! wer ist in welchem Raum, und wie kommen WebRTC-Aushandlung, Positionen,
//! Geraete-Updates und Chat zu den richtigen Empfaengern.
//!
//! ## Architektur
//!
//! ```text
//! TCP Listener (SignalingServer)
//!     |
//!     v
//! ClientConnection (pro Verbindung ein Task)
//!     |  Unregistriert -> Registriert -> (ImRaum <-> Registriert) -> geschlossen
//!     |
//!     v
//! SignalingRelay ── lock(SessionState { RoomStore, ConnectionRegistry })
//!     |
//!     +-- sitzung_handler (register, ping)
//!     +-- raum_handler    (create, join, leave, kick, settings, delete)
//!     +-- signal_handler  (offer, answer, ice-candidate)
//!     +-- zustand_handler (spatial, device, chat, user-action, user-data)
//!
//! EventBroadcaster – Send-Queue pro Verbindung, fire-and-forget
//! LeereRaeumeAufgabe – entfernt leere Raeume nach der Leerlauf-Schwelle
//! ```

pub mod aufgaben;
pub mod broadcast;
pub mod connection;
pub mod error;
pub mod handlers;
pub mod registry;
pub mod relay;
pub mod room_store;
pub mod server_state;
pub mod tcp;

// Bequeme Re-Exporte
pub use aufgaben::LeereRaeumeAufgabe;
pub use broadcast::EventBroadcaster;
pub use connection::ClientConnection;
pub use error::{SignalingError, SignalingResult};
pub use registry::{ConnectionRegistry, VerbindungsZustand};
pub use relay::{uebergang, verbindung_trennen, SignalingRelay};
pub use room_store::RoomStore;
pub use server_state::{zustand_erstellen, GeteilterZustand, SessionState, SignalingConfig};
pub use tcp::SignalingServer;
