//! Periodische Aufgaben des Signaling-Service

use std::time::Duration;

use raumzeit_core::PeriodischeAufgabe;

use crate::relay::SignalingRelay;

/// Standard-Intervall der Raum-Bereinigung
pub const BEREINIGUNGS_INTERVALL: Duration = Duration::from_secs(30);

/// Entfernt leere Raeume nach Ablauf der Leerlauf-Schwelle
///
/// Ein Raum, der vor Ablauf wieder ein Mitglied bekommt, wird nie entfernt,
/// da jeder Beitritt die Aktivitaet auffrischt.
pub struct LeereRaeumeAufgabe {
    relay: SignalingRelay,
    schwelle_ms: u64,
    intervall: Duration,
}

impl LeereRaeumeAufgabe {
    pub fn neu(relay: SignalingRelay, schwelle_ms: u64) -> Self {
        Self::mit_intervall(relay, schwelle_ms, BEREINIGUNGS_INTERVALL)
    }

    pub fn mit_intervall(relay: SignalingRelay, schwelle_ms: u64, intervall: Duration) -> Self {
        Self {
            relay,
            schwelle_ms,
            intervall,
        }
    }
}

impl PeriodischeAufgabe for LeereRaeumeAufgabe {
    fn name(&self) -> &'static str {
        "leere-raeume"
    }

    fn intervall(&self) -> Duration {
        self.intervall
    }

    fn ausfuehren(&self, jetzt_ms: u64) {
        let entfernt = self.relay.leere_raeume_bereinigen(jetzt_ms, self.schwelle_ms);
        for raum_id in &entfernt {
            tracing::info!(raum_id = %raum_id, "Leerer Raum entfernt");
        }
    }
}
