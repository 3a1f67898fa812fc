//! Scheduler fuer periodische Aufgaben
//!
//! Jede Aufgabe bekommt einen eigenen Task mit `tokio::time::interval`.
//! Die Zeit kommt von der gemeinsamen Uhr, damit Handler und Aufgaben
//! dieselbe Zeitbasis haben.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use raumzeit_core::{PeriodischeAufgabe, Uhr};

pub struct Scheduler {
    uhr: Arc<dyn Uhr>,
    aufgaben: Vec<Arc<dyn PeriodischeAufgabe>>,
}

impl Scheduler {
    pub fn neu(uhr: Arc<dyn Uhr>) -> Self {
        Self {
            uhr,
            aufgaben: Vec::new(),
        }
    }

    pub fn hinzufuegen(&mut self, aufgabe: impl PeriodischeAufgabe) -> &mut Self {
        self.aufgaben.push(Arc::new(aufgabe));
        self
    }

    pub fn anzahl(&self) -> usize {
        self.aufgaben.len()
    }

    /// Startet alle Aufgaben. Sie laufen bis `shutdown_rx` `true` meldet.
    pub fn starten(self, shutdown_rx: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        self.aufgaben
            .into_iter()
            .map(|aufgabe| {
                let uhr = Arc::clone(&self.uhr);
                let mut shutdown_rx = shutdown_rx.clone();
                tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(aufgabe.intervall());
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    ticker.tick().await; // Ersten Tick ueberspringen
                    tracing::debug!(
                        aufgabe = aufgabe.name(),
                        intervall_ms = aufgabe.intervall().as_millis() as u64,
                        "Periodische Aufgabe gestartet"
                    );

                    loop {
                        tokio::select! {
                            _ = ticker.tick() => {
                                aufgabe.ausfuehren(uhr.jetzt_ms());
                            }
                            ergebnis = shutdown_rx.changed() => {
                                if ergebnis.is_err() || *shutdown_rx.borrow() {
                                    break;
                                }
                            }
                        }
                    }
                    tracing::debug!(aufgabe = aufgabe.name(), "Periodische Aufgabe beendet");
                })
            })
            .collect()
    }
}
