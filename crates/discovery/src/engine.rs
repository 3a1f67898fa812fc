//! Discovery-Engine – Scan-Zustand, Multicast-Sockets, Empfangs-Loops
//!
//! ## Ablauf
//!
//! ```text
//! scan_starten()
//!     |  SSDP: ein M-SEARCH pro Suchziel
//!     |  mDNS: eine PTR-Anfrage pro Dienstname
//!     v
//! Anfrage-Socket (ephemerer Port)      Empfangs-Socket (1900 / 5353, Gruppe)
//!     |  Unicast-Antworten                 |  NOTIFY, Ankuendigungen
//!     +----------------+-------------------+
//!                      v  recv_from, unabhaengig vom Scan-Zustand
//! ssdp::antwort_parsen / mdns::antwort_parsen
//!     |  Fehler -> Parse-Zaehler, Datagramm verworfen
//!     v
//! GeraeteInventar::aktualisieren()
//! ```
//!
//! Der Empfangs-Socket wird mit SO_REUSEADDR (und SO_REUSEPORT auf Unix)
//! gebunden und teilt sich den reservierten Port mit avahi oder minissdpd.
//!
//! Jedes Protokoll ist Idle oder Scanning. Ein Scan endet erst nach
//! `scan_dauer_ms` (geprueft von `ScanAblaufAufgabe`), ein erneuter
//! `scan_starten`-Aufruf waehrenddessen aendert nichts.

use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use raumzeit_core::Uhr;
use raumzeit_observability::RaumzeitMetrics;

use crate::error::{DiscoveryError, DiscoveryResult};
use crate::geraet::{Geraet, Protokoll};
use crate::inventory::GeraeteInventar;
use crate::{mdns, ssdp};

/// Groesser als jedes realistische SSDP/mDNS-Datagramm
const EMPFANGS_PUFFER: usize = 9000;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub ssdp_aktiv: bool,
    pub mdns_aktiv: bool,
    /// Dauer eines Scans (Millisekunden)
    pub scan_dauer_ms: u64,
    /// Geraete ohne Beobachtung seit dieser Zeit werden entfernt (Millisekunden)
    pub veraltet_ms: u64,
    pub ssdp_suchziele: Vec<String>,
    pub mdns_dienste: Vec<String>,
    pub mx: u8,
    /// Adressen der Empfangs-Sockets (Standard: reservierte Ports).
    /// Anfragen gehen ueber einen zweiten Socket auf derselben IP mit Port 0.
    pub ssdp_bind: SocketAddr,
    pub mdns_bind: SocketAddr,
    /// Ziele der Anfragen (Multicast-Gruppen, in Tests lokale Responder)
    pub ssdp_ziel: SocketAddr,
    pub mdns_ziel: SocketAddr,
    /// Multicast-Gruppe beim Binden beitreten
    pub multicast_beitreten: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        let unbestimmt = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
        Self {
            ssdp_aktiv: true,
            mdns_aktiv: true,
            scan_dauer_ms: 30_000,
            veraltet_ms: 5 * 60 * 1000,
            ssdp_suchziele: ssdp::STANDARD_SUCHZIELE
                .iter()
                .map(|s| s.to_string())
                .collect(),
            mdns_dienste: mdns::STANDARD_DIENSTE
                .iter()
                .map(|s| s.to_string())
                .collect(),
            mx: ssdp::STANDARD_MX,
            ssdp_bind: SocketAddr::new(unbestimmt, ssdp::SSDP_PORT),
            mdns_bind: SocketAddr::new(unbestimmt, mdns::MDNS_PORT),
            ssdp_ziel: ssdp::ssdp_ziel(),
            mdns_ziel: mdns::mdns_ziel(),
            multicast_beitreten: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy)]
struct ScanZustand {
    ssdp_seit: Option<u64>,
    mdns_seit: Option<u64>,
}

impl ScanZustand {
    fn seit(&mut self, protokoll: Protokoll) -> &mut Option<u64> {
        match protokoll {
            Protokoll::Ssdp => &mut self.ssdp_seit,
            Protokoll::Mdns => &mut self.mdns_seit,
        }
    }

    fn laeuft(&self) -> bool {
        self.ssdp_seit.is_some() || self.mdns_seit.is_some()
    }
}

struct ProtokollSockets {
    /// Reservierter Port mit Multicast-Gruppe
    empfang: Arc<UdpSocket>,
    /// Ephemerer Port fuer Anfragen und deren Unicast-Antworten
    anfrage: Arc<UdpSocket>,
}

struct EngineInner {
    config: DiscoveryConfig,
    inventar: GeraeteInventar,
    uhr: Arc<dyn Uhr>,
    metriken: RaumzeitMetrics,
    ssdp: Option<ProtokollSockets>,
    mdns: Option<ProtokollSockets>,
    scan: Mutex<ScanZustand>,
}

/// Passive Geraete-Erkennung ueber SSDP und mDNS
///
/// Clone ist guenstig (Arc).
#[derive(Clone)]
pub struct DiscoveryEngine {
    inner: Arc<EngineInner>,
}

impl DiscoveryEngine {
    /// Bindet die Sockets der aktivierten Protokolle
    ///
    /// Schlaegt Bind oder Multicast-Beitritt fehl, wird nur das betroffene
    /// Protokoll deaktiviert. Muss innerhalb einer Tokio-Runtime laufen.
    pub async fn binden(
        config: DiscoveryConfig,
        uhr: Arc<dyn Uhr>,
        metriken: RaumzeitMetrics,
    ) -> Self {
        let ssdp = if config.ssdp_aktiv {
            sockets_oeffnen(
                Protokoll::Ssdp,
                config.ssdp_bind,
                ssdp::SSDP_GRUPPE,
                config.multicast_beitreten,
            )
            .await
        } else {
            None
        };
        let mdns = if config.mdns_aktiv {
            sockets_oeffnen(
                Protokoll::Mdns,
                config.mdns_bind,
                mdns::MDNS_GRUPPE,
                config.multicast_beitreten,
            )
            .await
        } else {
            None
        };

        Self::mit_sockets(config, uhr, metriken, ssdp, mdns)
    }

    /// Engine ohne Sockets (nur Inventar und Scan-Zustand)
    pub fn ohne_sockets(config: DiscoveryConfig, uhr: Arc<dyn Uhr>, metriken: RaumzeitMetrics) -> Self {
        Self::mit_sockets(config, uhr, metriken, None, None)
    }

    fn mit_sockets(
        config: DiscoveryConfig,
        uhr: Arc<dyn Uhr>,
        metriken: RaumzeitMetrics,
        ssdp: Option<ProtokollSockets>,
        mdns: Option<ProtokollSockets>,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                config,
                inventar: GeraeteInventar::neu(),
                uhr,
                metriken,
                ssdp,
                mdns,
                scan: Mutex::new(ScanZustand::default()),
            }),
        }
    }

    fn sockets(&self, protokoll: Protokoll) -> Option<&ProtokollSockets> {
        match protokoll {
            Protokoll::Ssdp => self.inner.ssdp.as_ref(),
            Protokoll::Mdns => self.inner.mdns.as_ref(),
        }
    }

    /// Protokolle mit gebundenem Socket
    pub fn aktive_protokolle(&self) -> Vec<Protokoll> {
        Protokoll::ALLE
            .into_iter()
            .filter(|p| self.sockets(*p).is_some())
            .collect()
    }

    /// Lokale Adresse des Empfangs-Sockets eines Protokolls
    pub fn lokale_adresse(&self, protokoll: Protokoll) -> Option<SocketAddr> {
        self.sockets(protokoll)
            .and_then(|s| s.empfang.local_addr().ok())
    }

    /// Lokale Adresse, von der die Anfragen eines Protokolls ausgehen
    pub fn anfrage_adresse(&self, protokoll: Protokoll) -> Option<SocketAddr> {
        self.sockets(protokoll)
            .and_then(|s| s.anfrage.local_addr().ok())
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.inner.config
    }

    // -----------------------------------------------------------------------
    // Scan
    // -----------------------------------------------------------------------

    /// Startet einen Scan auf allen aktiven Protokollen
    ///
    /// Gibt `false` zurueck, wenn bereits ein Scan laeuft oder kein Protokoll
    /// aktiv ist.
    pub async fn scan_starten(&self) -> bool {
        let protokolle = self.aktive_protokolle();
        if protokolle.is_empty() {
            tracing::warn!("Scan angefordert, aber kein Discovery-Protokoll aktiv");
            return false;
        }

        let jetzt = self.inner.uhr.jetzt_ms();
        {
            let mut scan = self.inner.scan.lock();
            if scan.laeuft() {
                tracing::debug!("Scan laeuft bereits, Anforderung ignoriert");
                return false;
            }
            for protokoll in &protokolle {
                *scan.seit(*protokoll) = Some(jetzt);
            }
        }
        self.inner.metriken.discovery_scans_total.inc();
        tracing::info!(
            protokolle = ?protokolle,
            dauer_ms = self.inner.config.scan_dauer_ms,
            "Discovery-Scan gestartet"
        );

        for protokoll in protokolle {
            let gesendet = self.anfragen_senden(protokoll).await;
            tracing::debug!(protokoll = %protokoll, gesendet, "Anfragen gesendet");
        }
        true
    }

    /// Sendet eine Anfrage pro Suchziel bzw. Dienstname. Gibt die Zahl der
    /// gesendeten Anfragen zurueck.
    ///
    /// Ein fehlgeschlagener Versand wird gezaehlt und uebersprungen, die
    /// uebrigen Ziele werden trotzdem angefragt.
    async fn anfragen_senden(&self, protokoll: Protokoll) -> usize {
        let Some(sockets) = self.sockets(protokoll) else {
            return 0;
        };
        let socket = &sockets.anfrage;
        let config = &self.inner.config;
        let mut gesendet = 0;
        match protokoll {
            Protokoll::Ssdp => {
                for ziel in &config.ssdp_suchziele {
                    let anfrage = ssdp::m_search(ziel, config.mx);
                    if self
                        .senden(protokoll, socket, anfrage.as_bytes(), config.ssdp_ziel)
                        .await
                    {
                        gesendet += 1;
                        tracing::trace!(suchziel = %ziel, "M-SEARCH gesendet");
                    }
                }
            }
            Protokoll::Mdns => {
                for dienst in &config.mdns_dienste {
                    let anfrage = match mdns::anfrage_bauen(dienst) {
                        Ok(anfrage) => anfrage,
                        Err(e) => {
                            tracing::warn!(dienst = %dienst, fehler = %e, "Dienstname uebersprungen");
                            continue;
                        }
                    };
                    if self.senden(protokoll, socket, &anfrage, config.mdns_ziel).await {
                        gesendet += 1;
                        tracing::trace!(dienst = %dienst, "mDNS-Anfrage gesendet");
                    }
                }
            }
        }
        gesendet
    }

    async fn senden(
        &self,
        protokoll: Protokoll,
        socket: &UdpSocket,
        daten: &[u8],
        ziel: SocketAddr,
    ) -> bool {
        match socket.send_to(daten, ziel).await {
            Ok(_) => true,
            Err(e) => {
                self.inner.metriken.discovery_sendefehler(protokoll.name());
                tracing::warn!(
                    protokoll = %protokoll,
                    ziel = %ziel,
                    bytes = daten.len(),
                    fehler = %e,
                    "Anfrage nicht gesendet"
                );
                false
            }
        }
    }

    /// Beendet Scans, deren Dauer abgelaufen ist. Gibt die beendeten Protokolle zurueck.
    pub fn scan_ablauf(&self, jetzt_ms: u64) -> Vec<Protokoll> {
        let dauer = self.inner.config.scan_dauer_ms;
        let mut scan = self.inner.scan.lock();
        let mut beendet = Vec::new();
        for protokoll in Protokoll::ALLE {
            let seit = scan.seit(protokoll);
            if let Some(start) = *seit {
                if jetzt_ms.saturating_sub(start) >= dauer {
                    *seit = None;
                    beendet.push(protokoll);
                }
            }
        }
        drop(scan);

        for protokoll in &beendet {
            tracing::info!(
                protokoll = %protokoll,
                geraete = self.inner.inventar.anzahl(),
                "Discovery-Scan beendet"
            );
        }
        beendet
    }

    pub fn ist_scanning(&self) -> bool {
        self.inner.scan.lock().laeuft()
    }

    // -----------------------------------------------------------------------
    // Empfang
    // -----------------------------------------------------------------------

    /// Verarbeitet ein empfangenes Datagramm. Gibt die Zahl neuer Geraete zurueck.
    ///
    /// Kaputte Datagramme erhoehen nur den Parse-Zaehler.
    pub fn datagramm_verarbeiten(&self, protokoll: Protokoll, daten: &[u8], quelle: SocketAddr) -> usize {
        let ergebnis = match protokoll {
            Protokoll::Ssdp => ssdp::antwort_parsen(daten).map(|b| b.into_iter().collect()),
            Protokoll::Mdns => mdns::antwort_parsen(daten, &self.inner.config.mdns_dienste),
        };

        let beobachtungen: Vec<_> = match ergebnis {
            Ok(beobachtungen) => beobachtungen,
            Err(e) => {
                self.inner.metriken.parse_fehler(protokoll.name());
                tracing::debug!(
                    protokoll = %protokoll,
                    quelle = %quelle,
                    fehler = %e,
                    "Datagramm verworfen"
                );
                return 0;
            }
        };

        let jetzt = self.inner.uhr.jetzt_ms();
        let mut neu = 0;
        for beobachtung in beobachtungen {
            let name = beobachtung.name.clone();
            if self.inner.inventar.aktualisieren(beobachtung, quelle.ip(), jetzt) {
                neu += 1;
                tracing::info!(
                    protokoll = %protokoll,
                    adresse = %quelle.ip(),
                    name = %name,
                    "Neues Geraet entdeckt"
                );
            }
        }
        self.geraete_metrik_setzen();
        neu
    }

    /// Startet je eine Empfangs-Loop pro gebundenem Socket
    /// (Empfangs- und Anfrage-Socket jedes aktiven Protokolls)
    pub fn empfangs_loops_starten(&self, shutdown_rx: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut tasks = Vec::new();
        for protokoll in Protokoll::ALLE {
            let Some(sockets) = self.sockets(protokoll) else {
                continue;
            };
            for socket in [&sockets.empfang, &sockets.anfrage] {
                let socket = Arc::clone(socket);
                let engine = self.clone();
                let shutdown_rx = shutdown_rx.clone();
                tasks.push(tokio::spawn(async move {
                    engine.empfangs_loop(protokoll, socket, shutdown_rx).await;
                }));
            }
        }
        tasks
    }

    async fn empfangs_loop(
        &self,
        protokoll: Protokoll,
        socket: Arc<UdpSocket>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut puffer = vec![0u8; EMPFANGS_PUFFER];
        let adresse = socket.local_addr().ok();
        tracing::info!(protokoll = %protokoll, adresse = ?adresse, "Discovery-Empfangs-Loop gestartet");

        loop {
            tokio::select! {
                ergebnis = socket.recv_from(&mut puffer) => {
                    match ergebnis {
                        Ok((laenge, quelle)) => {
                            self.datagramm_verarbeiten(protokoll, &puffer[..laenge], quelle);
                        }
                        Err(e) => {
                            // z.B. ICMP port unreachable nach send_to
                            tracing::debug!(protokoll = %protokoll, fehler = %e, "UDP-Empfangsfehler");
                        }
                    }
                }
                ergebnis = shutdown_rx.changed() => {
                    if ergebnis.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!(protokoll = %protokoll, adresse = ?adresse, "Discovery-Empfangs-Loop beendet");
    }

    // -----------------------------------------------------------------------
    // Inventar
    // -----------------------------------------------------------------------

    /// Entfernt veraltete Geraete
    pub fn veraltete_entfernen(&self, jetzt_ms: u64) -> Vec<String> {
        let entfernt = self
            .inner
            .inventar
            .veraltete_entfernen(jetzt_ms, self.inner.config.veraltet_ms);
        if !entfernt.is_empty() {
            tracing::info!(anzahl = entfernt.len(), "Veraltete Geraete entfernt");
            self.geraete_metrik_setzen();
        }
        entfernt
    }

    pub fn geraete_liste(&self) -> Vec<Geraet> {
        self.inner.inventar.liste()
    }

    pub fn geraete_anzahl(&self) -> usize {
        self.inner.inventar.anzahl()
    }

    pub fn geraet(&self, id: &str) -> Option<Geraet> {
        self.inner.inventar.geraet(id)
    }

    fn geraete_metrik_setzen(&self) {
        self.inner
            .metriken
            .devices
            .set(self.inner.inventar.anzahl() as i64);
    }
}

async fn sockets_oeffnen(
    protokoll: Protokoll,
    adresse: SocketAddr,
    gruppe: Ipv4Addr,
    beitreten: bool,
) -> Option<ProtokollSockets> {
    match sockets_binden(protokoll, adresse, gruppe, beitreten).await {
        Ok(sockets) => {
            tracing::info!(
                protokoll = %protokoll,
                empfang = %sockets.empfang.local_addr().unwrap_or(adresse),
                anfrage = ?sockets.anfrage.local_addr().ok(),
                "Discovery-Sockets gebunden"
            );
            Some(sockets)
        }
        Err(e) => {
            tracing::warn!(fehler = %e, "Discovery-Protokoll deaktiviert");
            None
        }
    }
}

async fn sockets_binden(
    protokoll: Protokoll,
    adresse: SocketAddr,
    gruppe: Ipv4Addr,
    beitreten: bool,
) -> DiscoveryResult<ProtokollSockets> {
    let empfang = empfangs_socket_binden(protokoll, adresse, gruppe, beitreten)?;

    let anfrage_adresse = SocketAddr::new(adresse.ip(), 0);
    let anfrage = UdpSocket::bind(anfrage_adresse)
        .await
        .map_err(|quelle| DiscoveryError::Bind {
            protokoll,
            adresse: anfrage_adresse,
            quelle,
        })?;

    Ok(ProtokollSockets {
        empfang: Arc::new(empfang),
        anfrage: Arc::new(anfrage),
    })
}

/// Bindet den Empfangs-Socket auf dem (geteilten) reservierten Port
fn empfangs_socket_binden(
    protokoll: Protokoll,
    adresse: SocketAddr,
    gruppe: Ipv4Addr,
    beitreten: bool,
) -> DiscoveryResult<UdpSocket> {
    let bind_fehler = |quelle: std::io::Error| DiscoveryError::Bind {
        protokoll,
        adresse,
        quelle,
    };

    let socket = Socket::new(Domain::for_address(adresse), Type::DGRAM, Some(Protocol::UDP))
        .map_err(bind_fehler)?;
    socket.set_reuse_address(true).map_err(bind_fehler)?;
    #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
    {
        socket.set_reuse_port(true).map_err(bind_fehler)?;
    }
    socket.set_nonblocking(true).map_err(bind_fehler)?;
    socket.bind(&adresse.into()).map_err(bind_fehler)?;

    if beitreten {
        if let IpAddr::V4(lokal) = adresse.ip() {
            socket
                .join_multicast_v4(&gruppe, &lokal)
                .map_err(|quelle| DiscoveryError::Multicast {
                    protokoll,
                    gruppe,
                    quelle,
                })?;
        }
    }

    UdpSocket::from_std(socket.into()).map_err(bind_fehler)
}
