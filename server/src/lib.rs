//! raumzeit-server – Bibliotheks-Root
//!
//! Verdrahtet Signaling, Discovery, Scheduler und die Inventar-API.
//! Alle Zustandsobjekte werden hier explizit erzeugt und weitergereicht.

pub mod api;
pub mod config;
pub mod scheduler;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use config::ServerConfig;
use raumzeit_core::{SystemUhr, Uhr};
use raumzeit_discovery::{DiscoveryEngine, ScanAblaufAufgabe, VeralteteGeraeteAufgabe};
use raumzeit_observability::{observability_server_starten, HealthState, RaumzeitMetrics};
use raumzeit_signaling::{
    zustand_erstellen, EventBroadcaster, LeereRaeumeAufgabe, SignalingRelay, SignalingServer,
};
use scheduler::Scheduler;

/// Haelt den Server-Zustand vor dem Start zusammen
pub struct Server {
    pub config: ServerConfig,
    uhr: Arc<dyn Uhr>,
}

/// Ein gestarteter Server mit allen Hintergrund-Tasks
pub struct LaufenderServer {
    pub signaling_adresse: SocketAddr,
    pub api_adresse: SocketAddr,
    pub relay: SignalingRelay,
    pub discovery: DiscoveryEngine,
    pub metriken: RaumzeitMetrics,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    observability: Option<JoinHandle<()>>,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self::mit_uhr(config, Arc::new(SystemUhr))
    }

    pub fn mit_uhr(config: ServerConfig, uhr: Arc<dyn Uhr>) -> Self {
        Self { config, uhr }
    }

    /// Startet alle Subsysteme und laeuft bis Ctrl-C
    pub async fn starten(self) -> Result<()> {
        let laufend = self.binden().await?;
        tracing::info!("Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
        laufend.beenden().await;
        Ok(())
    }

    /// Bindet alle Listener und startet die Hintergrund-Tasks
    ///
    /// Reihenfolge:
    /// 1. Signaling-Listener (Fehler ist fatal)
    /// 2. Discovery-Sockets (Fehler deaktiviert nur das Protokoll)
    /// 3. Empfangs-Loops und periodische Aufgaben
    /// 4. Inventar-API und Observability-Server
    pub async fn binden(self) -> Result<LaufenderServer> {
        let config = self.config;
        config.validieren()?;
        let metriken = RaumzeitMetrics::neu().context("Metriken nicht initialisierbar")?;
        let health = HealthState::neu();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        tracing::info!(
            server_name = %config.server.name,
            signaling_port = config.netzwerk.signaling_port,
            api_port = config.netzwerk.api_port,
            "Server startet"
        );

        // Signaling
        let signaling_config = config.signaling_config();
        let relay = SignalingRelay::neu(
            zustand_erstellen(&signaling_config),
            EventBroadcaster::mit_queue_groesse(signaling_config.send_queue_groesse),
            Arc::clone(&self.uhr),
            metriken.clone(),
        );
        let signaling_server = SignalingServer::binden(
            relay.clone(),
            signaling_config.clone(),
            config.signaling_bind_adresse()?,
        )
        .await?;
        let signaling_adresse = signaling_server.lokale_adresse()?;
        health.signaling_setzen(true);
        {
            let shutdown_rx = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = signaling_server.starten(shutdown_rx).await {
                    tracing::error!(fehler = %e, "Signaling-Listener beendet");
                }
            }));
        }

        // Discovery
        let discovery =
            DiscoveryEngine::binden(config.discovery_config(), Arc::clone(&self.uhr), metriken.clone())
                .await;
        let protokolle = discovery.aktive_protokolle();
        health.discovery_setzen(!protokolle.is_empty());
        if protokolle.is_empty() {
            tracing::warn!("Discovery ohne aktives Protokoll, Server laeuft eingeschraenkt");
        }
        tasks.extend(discovery.empfangs_loops_starten(shutdown_rx.clone()));

        // Periodische Aufgaben
        let mut scheduler = Scheduler::neu(Arc::clone(&self.uhr));
        scheduler
            .hinzufuegen(LeereRaeumeAufgabe::mit_intervall(
                relay.clone(),
                signaling_config.leerlauf_schwelle_ms,
                Duration::from_secs(config.raeume.bereinigung_sek),
            ))
            .hinzufuegen(VeralteteGeraeteAufgabe::mit_intervall(
                discovery.clone(),
                Duration::from_secs(config.discovery.bereinigung_sek),
            ))
            .hinzufuegen(ScanAblaufAufgabe::neu(discovery.clone()));
        tasks.extend(scheduler.starten(shutdown_rx.clone()));

        if config.discovery.scan_beim_start {
            discovery.scan_starten().await;
        }

        // Inventar-API
        let api_state = api::ApiState {
            server_name: config.server.name.clone(),
            relay: relay.clone(),
            discovery: discovery.clone(),
            metriken: metriken.clone(),
            health: health.clone(),
        };
        let app = api::router(api_state, &config.netzwerk.cors_origins);
        let api_listener = tokio::net::TcpListener::bind(config.api_bind_adresse()?)
            .await
            .context("Inventar-API konnte nicht gebunden werden")?;
        let api_adresse = api_listener.local_addr()?;
        tracing::info!(addr = %api_adresse, "Inventar-API gestartet");
        {
            let mut shutdown_rx = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                let ergebnis = axum::serve(api_listener, app)
                    .with_graceful_shutdown(async move {
                        let _ = shutdown_rx.wait_for(|beendet| *beendet).await;
                    })
                    .await;
                if let Err(e) = ergebnis {
                    tracing::error!(fehler = %e, "Inventar-API beendet");
                }
            }));
        }

        // Observability (eigener Port)
        let observability = if config.observability.aktiviert {
            let adresse = config.observability_bind_adresse()?;
            let metriken = metriken.clone();
            let health = health.clone();
            Some(tokio::spawn(async move {
                if let Err(e) = observability_server_starten(adresse, metriken, health).await {
                    tracing::warn!(fehler = %e, "Observability-Server nicht verfuegbar");
                }
            }))
        } else {
            None
        };

        Ok(LaufenderServer {
            signaling_adresse,
            api_adresse,
            relay,
            discovery,
            metriken,
            shutdown_tx,
            tasks,
            observability,
        })
    }
}

impl LaufenderServer {
    /// Signalisiert Shutdown und wartet auf alle Tasks
    pub async fn beenden(self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(observability) = self.observability {
            observability.abort();
        }
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(fehler = %e, "Task nicht sauber beendet");
            }
        }
        tracing::info!("Server beendet");
    }
}
