//! Uhr-Abstraktion
//!
//! Alle Zeitstempel im System sind Unix-Millisekunden. Produktiv liefert
//! `SystemUhr` die Wanduhrzeit, in Tests wird `TestUhr` manuell vorgestellt,
//! damit Timer-Logik (Idle-Raeume, veraltete Geraete, Scan-Dauer)
//! deterministisch pruefbar ist.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Zeitquelle in Unix-Millisekunden
pub trait Uhr: Send + Sync + 'static {
    fn jetzt_ms(&self) -> u64;
}

/// Wanduhr (chrono)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemUhr;

impl Uhr for SystemUhr {
    fn jetzt_ms(&self) -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }
}

/// Manuell gesteuerte Uhr fuer Tests
#[derive(Debug, Default)]
pub struct TestUhr {
    ms: AtomicU64,
}

impl TestUhr {
    /// Erstellt eine Uhr mit festem Startzeitpunkt
    pub fn neu(start_ms: u64) -> Self {
        Self {
            ms: AtomicU64::new(start_ms),
        }
    }

    /// Stellt die Uhr um `dauer` vor
    pub fn vorstellen(&self, dauer: Duration) {
        self.ms
            .fetch_add(dauer.as_millis() as u64, Ordering::SeqCst);
    }

    /// Setzt einen absoluten Zeitpunkt
    pub fn setzen(&self, ms: u64) {
        self.ms.store(ms, Ordering::SeqCst);
    }
}

impl Uhr for TestUhr {
    fn jetzt_ms(&self) -> u64 {
        self.ms.load(Ordering::SeqCst)
    }
}
