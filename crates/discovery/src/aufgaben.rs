//! Periodische Aufgaben der Discovery

use std::time::Duration;

use raumzeit_core::PeriodischeAufgabe;

use crate::engine::DiscoveryEngine;

/// Standard-Intervall der Geraete-Bereinigung
pub const VERALTET_INTERVALL: Duration = Duration::from_secs(60);
/// Pruefintervall fuer abgelaufene Scans
pub const SCAN_ABLAUF_INTERVALL: Duration = Duration::from_secs(1);

/// Entfernt Geraete, die laenger als die Schwelle nicht gesehen wurden
pub struct VeralteteGeraeteAufgabe {
    engine: DiscoveryEngine,
    intervall: Duration,
}

impl VeralteteGeraeteAufgabe {
    pub fn neu(engine: DiscoveryEngine) -> Self {
        Self::mit_intervall(engine, VERALTET_INTERVALL)
    }

    pub fn mit_intervall(engine: DiscoveryEngine, intervall: Duration) -> Self {
        Self { engine, intervall }
    }
}

impl PeriodischeAufgabe for VeralteteGeraeteAufgabe {
    fn name(&self) -> &'static str {
        "veraltete-geraete"
    }

    fn intervall(&self) -> Duration {
        self.intervall
    }

    fn ausfuehren(&self, jetzt_ms: u64) {
        for id in self.engine.veraltete_entfernen(jetzt_ms) {
            tracing::debug!(geraet = %id, "Geraet veraltet");
        }
    }
}

/// Setzt Protokolle nach Ablauf der Scan-Dauer zurueck auf Idle
pub struct ScanAblaufAufgabe {
    engine: DiscoveryEngine,
}

impl ScanAblaufAufgabe {
    pub fn neu(engine: DiscoveryEngine) -> Self {
        Self { engine }
    }
}

impl PeriodischeAufgabe for ScanAblaufAufgabe {
    fn name(&self) -> &'static str {
        "scan-ablauf"
    }

    fn intervall(&self) -> Duration {
        SCAN_ABLAUF_INTERVALL
    }

    fn ausfuehren(&self, jetzt_ms: u64) {
        self.engine.scan_ablauf(jetzt_ms);
    }
}
