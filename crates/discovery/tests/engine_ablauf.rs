//! Discovery-Engine gegen lokale Fake-Responder

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use raumzeit_core::{PeriodischeAufgabe, TestUhr, Uhr};
use raumzeit_discovery::{
    mdns, ssdp, DiscoveryConfig, DiscoveryEngine, Protokoll, ScanAblaufAufgabe,
    VeralteteGeraeteAufgabe,
};
use raumzeit_observability::RaumzeitMetrics;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::timeout;

const START_MS: u64 = 1_700_000_000_000;

fn lokal() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

struct Umgebung {
    engine: DiscoveryEngine,
    uhr: Arc<TestUhr>,
    metriken: RaumzeitMetrics,
    ssdp_responder: UdpSocket,
    mdns_responder: UdpSocket,
    _shutdown: watch::Sender<bool>,
}

async fn umgebung() -> Umgebung {
    umgebung_mit(|_| {}).await
}

async fn umgebung_mit(anpassen: impl FnOnce(&mut DiscoveryConfig)) -> Umgebung {
    let ssdp_responder = UdpSocket::bind(lokal()).await.unwrap();
    let mdns_responder = UdpSocket::bind(lokal()).await.unwrap();
    let mut config = DiscoveryConfig {
        ssdp_bind: lokal(),
        mdns_bind: lokal(),
        ssdp_ziel: ssdp_responder.local_addr().unwrap(),
        mdns_ziel: mdns_responder.local_addr().unwrap(),
        multicast_beitreten: false,
        ssdp_suchziele: vec!["ssdp:all".into(), "upnp:rootdevice".into()],
        mdns_dienste: vec!["_googlecast._tcp.local".into()],
        ..DiscoveryConfig::default()
    };
    anpassen(&mut config);
    let uhr = Arc::new(TestUhr::neu(START_MS));
    let metriken = RaumzeitMetrics::neu().unwrap();
    let engine = DiscoveryEngine::binden(config, uhr.clone(), metriken.clone()).await;
    let (shutdown, shutdown_rx) = watch::channel(false);
    engine.empfangs_loops_starten(shutdown_rx);

    Umgebung {
        engine,
        uhr,
        metriken,
        ssdp_responder,
        mdns_responder,
        _shutdown: shutdown,
    }
}

async fn empfangen(socket: &UdpSocket) -> (Vec<u8>, SocketAddr) {
    let mut puffer = vec![0u8; 2048];
    let (laenge, quelle) = timeout(Duration::from_secs(2), socket.recv_from(&mut puffer))
        .await
        .expect("keine Anfrage empfangen")
        .unwrap();
    puffer.truncate(laenge);
    (puffer, quelle)
}

async fn warten_auf_geraete(engine: &DiscoveryEngine, anzahl: usize) {
    timeout(Duration::from_secs(2), async {
        while engine.geraete_anzahl() < anzahl {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Geraete nicht rechtzeitig im Inventar");
}

#[tokio::test]
async fn scan_sendet_anfragen_und_sammelt_antworten() {
    let u = umgebung().await;
    assert_eq!(u.engine.aktive_protokolle(), vec![Protokoll::Ssdp, Protokoll::Mdns]);

    assert!(u.engine.scan_starten().await);
    assert!(u.engine.ist_scanning());

    // SSDP: ein M-SEARCH pro Suchziel
    let (erste, engine_ssdp) = empfangen(&u.ssdp_responder).await;
    let (zweite, _) = empfangen(&u.ssdp_responder).await;
    assert_eq!(u.engine.anfrage_adresse(Protokoll::Ssdp), Some(engine_ssdp));
    assert_ne!(u.engine.lokale_adresse(Protokoll::Ssdp), Some(engine_ssdp));
    let erste = String::from_utf8(erste).unwrap();
    let zweite = String::from_utf8(zweite).unwrap();
    assert!(erste.contains("ST: ssdp:all\r\n"));
    assert!(zweite.contains("ST: upnp:rootdevice\r\n"));

    let antwort = "HTTP/1.1 200 OK\r\n\
        LOCATION: http://127.0.0.1:8008/desc.xml\r\n\
        SERVER: Cast/1.0\r\n\
        ST: upnp:rootdevice\r\n\
        USN: uuid:tv::upnp:rootdevice\r\n\r\n";
    u.ssdp_responder
        .send_to(antwort.as_bytes(), engine_ssdp)
        .await
        .unwrap();

    // mDNS: eine PTR-Anfrage
    let (anfrage, engine_mdns) = empfangen(&u.mdns_responder).await;
    assert_eq!(anfrage, mdns::anfrage_bauen("_googlecast._tcp.local").unwrap());
    let antwort = mdns::antwort_bauen(
        "_googlecast._tcp.local",
        "Chromecast-1",
        "chromecast-1.local",
        8009,
        Ipv4Addr::new(192, 168, 1, 30),
        &["fn=Kueche"],
    )
    .unwrap();
    u.mdns_responder.send_to(&antwort, engine_mdns).await.unwrap();

    warten_auf_geraete(&u.engine, 2).await;
    let geraete = u.engine.geraete_liste();
    let cast = geraete
        .iter()
        .find(|g| g.protokoll == Protokoll::Mdns)
        .unwrap();
    assert_eq!(cast.name, "Kueche");
    assert_eq!(cast.typ, "googlecast");
    assert_eq!(cast.attribute.port, Some(8009));
    let tv = geraete
        .iter()
        .find(|g| g.protokoll == Protokoll::Ssdp)
        .unwrap();
    assert_eq!(tv.id, "127.0.0.1|uuid:tv::upnp:rootdevice");
    assert_eq!(tv.attribute.server.as_deref(), Some("Cast/1.0"));

    let statistik = u.metriken.statistik();
    assert_eq!(statistik.discovery_scans, 1);
    assert_eq!(statistik.devices, 2);
}

#[tokio::test]
async fn erneuter_scan_waehrend_scanning_ist_wirkungslos() {
    let u = umgebung().await;
    assert!(u.engine.scan_starten().await);
    assert!(!u.engine.scan_starten().await);
    assert_eq!(u.metriken.statistik().discovery_scans, 1);

    // Scan laeuft die volle Dauer
    let ablauf = ScanAblaufAufgabe::neu(u.engine.clone());
    u.uhr.vorstellen(Duration::from_millis(29_999));
    ablauf.ausfuehren(u.uhr.jetzt_ms());
    assert!(u.engine.ist_scanning());

    u.uhr.vorstellen(Duration::from_millis(1));
    ablauf.ausfuehren(u.uhr.jetzt_ms());
    assert!(!u.engine.ist_scanning());

    assert!(u.engine.scan_starten().await);
    assert_eq!(u.metriken.statistik().discovery_scans, 2);
}

#[tokio::test]
async fn antworten_ohne_scan_werden_ausgewertet() {
    let u = umgebung().await;
    let ziel = u.engine.lokale_adresse(Protokoll::Ssdp).unwrap();

    let notify = "NOTIFY * HTTP/1.1\r\nNT: urn:schemas-upnp-org:device:MediaRenderer:1\r\n\
        NTS: ssdp:alive\r\nUSN: uuid:renderer\r\n\r\n";
    u.ssdp_responder.send_to(notify.as_bytes(), ziel).await.unwrap();
    warten_auf_geraete(&u.engine, 1).await;
    assert!(!u.engine.ist_scanning());
    assert_eq!(u.engine.geraete_liste()[0].typ, "MediaRenderer");
}

#[tokio::test]
async fn reservierte_ports_empfangen_ankuendigungen_ohne_scan() {
    let config = DiscoveryConfig {
        ssdp_bind: SocketAddr::from(([127, 0, 0, 1], ssdp::SSDP_PORT)),
        mdns_bind: SocketAddr::from(([127, 0, 0, 1], mdns::MDNS_PORT)),
        multicast_beitreten: false,
        ..DiscoveryConfig::default()
    };
    let metriken = RaumzeitMetrics::neu().unwrap();
    let engine =
        DiscoveryEngine::binden(config, Arc::new(TestUhr::neu(START_MS)), metriken.clone()).await;
    let (_shutdown, shutdown_rx) = watch::channel(false);
    engine.empfangs_loops_starten(shutdown_rx);

    let ssdp_ziel = engine.lokale_adresse(Protokoll::Ssdp).unwrap();
    let mdns_ziel = engine.lokale_adresse(Protokoll::Mdns).unwrap();
    assert_eq!(ssdp_ziel.port(), 1900);
    assert_eq!(mdns_ziel.port(), 5353);

    // Ein Geraet meldet sich von selbst, ohne vorherige Anfrage
    let geraet = UdpSocket::bind(lokal()).await.unwrap();
    let notify = "NOTIFY * HTTP/1.1\r\n\
        HOST: 239.255.255.250:1900\r\n\
        NT: urn:schemas-upnp-org:device:MediaServer:1\r\n\
        NTS: ssdp:alive\r\n\
        USN: uuid:nas::urn:schemas-upnp-org:device:MediaServer:1\r\n\r\n";
    geraet.send_to(notify.as_bytes(), ssdp_ziel).await.unwrap();
    let ankuendigung = mdns::antwort_bauen(
        "_googlecast._tcp.local",
        "Chromecast-2",
        "chromecast-2.local",
        8009,
        Ipv4Addr::new(192, 168, 1, 31),
        &["fn=Wohnzimmer"],
    )
    .unwrap();
    geraet.send_to(&ankuendigung, mdns_ziel).await.unwrap();

    warten_auf_geraete(&engine, 2).await;
    assert!(!engine.ist_scanning());
    assert_eq!(metriken.statistik().discovery_scans, 0);
    let namen: Vec<String> = engine.geraete_liste().into_iter().map(|g| g.name).collect();
    assert!(namen.contains(&"Wohnzimmer".to_string()));
}

#[tokio::test]
async fn sendefehler_ueberspringt_nur_das_betroffene_ziel() {
    // Groesser als jedes UDP-Datagramm, send_to scheitert
    let riesig = "x".repeat(70_000);
    let u = umgebung_mit(move |config| {
        config.ssdp_suchziele = vec![riesig, "upnp:rootdevice".into(), "ssdp:all".into()];
    })
    .await;

    assert!(u.engine.scan_starten().await);
    let (erste, _) = empfangen(&u.ssdp_responder).await;
    let (zweite, _) = empfangen(&u.ssdp_responder).await;
    assert!(String::from_utf8(erste).unwrap().contains("ST: upnp:rootdevice\r\n"));
    assert!(String::from_utf8(zweite).unwrap().contains("ST: ssdp:all\r\n"));
    // mDNS ist davon nicht betroffen
    empfangen(&u.mdns_responder).await;

    assert_eq!(u.metriken.statistik().discovery_send_errors, 1);
    assert_eq!(
        u.metriken
            .discovery_send_errors_total
            .with_label_values(&["ssdp"])
            .get(),
        1
    );
}

#[tokio::test]
async fn kaputte_datagramme_werden_gezaehlt_nicht_propagiert() {
    let u = umgebung().await;
    let ssdp_ziel = u.engine.lokale_adresse(Protokoll::Ssdp).unwrap();
    let mdns_ziel = u.engine.lokale_adresse(Protokoll::Mdns).unwrap();

    u.ssdp_responder.send_to(b"GARBAGE\r\n\r\n", ssdp_ziel).await.unwrap();
    u.mdns_responder.send_to(&[0, 0, 0x84, 0], mdns_ziel).await.unwrap();

    timeout(Duration::from_secs(2), async {
        while u.metriken.statistik().parse_errors < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Parse-Fehler nicht gezaehlt");

    // Die Loops laufen weiter
    let antwort = "HTTP/1.1 200 OK\r\nST: upnp:rootdevice\r\nUSN: uuid:danach\r\n\r\n";
    u.ssdp_responder.send_to(antwort.as_bytes(), ssdp_ziel).await.unwrap();
    warten_auf_geraete(&u.engine, 1).await;
}

#[tokio::test]
async fn wiederholte_antwort_frischt_auf_und_veraltet() {
    let u = umgebung().await;
    let ziel = u.engine.lokale_adresse(Protokoll::Ssdp).unwrap();
    let antwort = "HTTP/1.1 200 OK\r\nST: upnp:rootdevice\r\nUSN: uuid:tv\r\n\r\n";

    u.ssdp_responder.send_to(antwort.as_bytes(), ziel).await.unwrap();
    warten_auf_geraete(&u.engine, 1).await;

    u.uhr.vorstellen(Duration::from_secs(200));
    u.ssdp_responder.send_to(antwort.as_bytes(), ziel).await.unwrap();
    timeout(Duration::from_secs(2), async {
        while u.engine.geraete_liste()[0].last_seen == START_MS {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("last_seen nicht aufgefrischt");
    assert_eq!(u.engine.geraete_anzahl(), 1);
    assert_eq!(u.engine.geraete_liste()[0].first_seen, START_MS);

    let aufgabe = VeralteteGeraeteAufgabe::neu(u.engine.clone());
    // 200 s + 300 s nach dem Start: letzte Beobachtung genau 300 s her
    u.uhr.vorstellen(Duration::from_secs(300));
    aufgabe.ausfuehren(u.uhr.jetzt_ms());
    assert_eq!(u.engine.geraete_anzahl(), 1);

    u.uhr.vorstellen(Duration::from_millis(1));
    aufgabe.ausfuehren(u.uhr.jetzt_ms());
    assert_eq!(u.engine.geraete_anzahl(), 0);
    assert_eq!(u.metriken.statistik().devices, 0);
}

#[tokio::test]
async fn bind_fehler_deaktiviert_nur_ein_protokoll() {
    // TEST-NET-1, keinem lokalen Interface zugewiesen
    let config = DiscoveryConfig {
        ssdp_bind: "192.0.2.1:0".parse().unwrap(),
        mdns_bind: lokal(),
        multicast_beitreten: false,
        ..DiscoveryConfig::default()
    };
    let engine = DiscoveryEngine::binden(
        config,
        Arc::new(TestUhr::neu(START_MS)),
        RaumzeitMetrics::neu().unwrap(),
    )
    .await;
    assert_eq!(engine.aktive_protokolle(), vec![Protokoll::Mdns]);
}

#[test]
fn geraet_serialisiert_camel_case() {
    let engine = DiscoveryEngine::ohne_sockets(
        DiscoveryConfig::default(),
        Arc::new(TestUhr::neu(START_MS)),
        RaumzeitMetrics::neu().unwrap(),
    );
    let antwort = b"HTTP/1.1 200 OK\r\nST: upnp:rootdevice\r\nUSN: uuid:tv\r\n\r\n";
    engine.datagramm_verarbeiten(Protokoll::Ssdp, antwort, "10.0.0.2:1900".parse().unwrap());

    let json = serde_json::to_value(&engine.geraete_liste()[0]).unwrap();
    assert_eq!(json["protokoll"], "ssdp");
    assert_eq!(json["firstSeen"], START_MS);
    assert_eq!(json["adresse"], "10.0.0.2");
    assert!(json["attribute"].get("location").is_none());
}
