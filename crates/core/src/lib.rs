//! raumzeit-core – Gemeinsame Typen, Uhr und Fehlertypen
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen Raumzeit-Crates gemeinsam genutzt werden.

pub mod aufgabe;
pub mod error;
pub mod types;
pub mod uhr;

// Re-Exporte fuer bequemen Zugriff
pub use aufgabe::PeriodischeAufgabe;
pub use error::{FehlerKategorie, RaumzeitError, Result};
pub use types::{ConnectionId, Position, RoomId, Rotation, UserId};
pub use uhr::{SystemUhr, TestUhr, Uhr};
