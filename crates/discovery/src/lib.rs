//! raumzeit-discovery – Passive Geraete-Erkennung im lokalen Netz
//!
//! Zwei unabhaengige Protokolle:
//! - SSDP (UPnP): `M-SEARCH` an `239.255.255.250:1900`
//! - mDNS (DNS-SD): PTR-Anfragen an `224.0.0.251:5353`
//!
//! Antworten werden unabhaengig vom Scan-Zustand ausgewertet und im
//! `GeraeteInventar` gesammelt. Veraltete Geraete entfernt die
//! `VeralteteGeraeteAufgabe`, laufende Scans beendet die `ScanAblaufAufgabe`.

pub mod aufgaben;
pub mod engine;
pub mod error;
pub mod geraet;
pub mod inventory;
pub mod mdns;
pub mod ssdp;

pub use aufgaben::{ScanAblaufAufgabe, VeralteteGeraeteAufgabe};
pub use engine::{DiscoveryConfig, DiscoveryEngine};
pub use error::{DiscoveryError, DiscoveryResult};
pub use geraet::{Beobachtung, Geraet, GeraeteAttribute, Protokoll};
pub use inventory::GeraeteInventar;
