//! Periodische Aufgaben
//!
//! Zeitgesteuerte Bereinigung (leere Raeume, veraltete Geraete, Scan-Ablauf)
//! wird nicht ueber verstreute `sleep`-Callbacks erledigt, sondern als
//! Aufgabe modelliert, die ein Scheduler des Host-Prozesses regelmaessig
//! aufruft. Tests rufen `ausfuehren` direkt mit einer virtuellen Zeit auf.

use std::time::Duration;

/// Eine Aufgabe, die in festem Intervall ausgefuehrt wird
pub trait PeriodischeAufgabe: Send + Sync + 'static {
    /// Name fuer Logging
    fn name(&self) -> &'static str;

    /// Abstand zwischen zwei Ausfuehrungen
    fn intervall(&self) -> Duration;

    /// Fuehrt einen Durchlauf aus. `jetzt_ms` ist die Zeit der Uhr des Hosts.
    fn ausfuehren(&self, jetzt_ms: u64);
}
