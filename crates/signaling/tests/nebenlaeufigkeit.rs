//! Join, Leave und Disconnect aus mehreren Tasks gleichzeitig
//!
//! Nach beliebiger Verschraenkung muss der Zustand konsistent sein: jeder
//! User ist in hoechstens einem Raum, User-Index und Mitgliederlisten
//! stimmen ueberein, keine Verbindung zeigt auf einen fremden Raum.

use std::sync::Arc;

use raumzeit_core::{ConnectionId, RoomId, TestUhr, UserId};
use raumzeit_observability::RaumzeitMetrics;
use raumzeit_protocol::events::{
    CreateRoomRequest, JoinRoomRequest, LeaveRoomRequest, RegisterRequest,
};
use raumzeit_protocol::{ClientEvent, ServerEvent};
use raumzeit_signaling::{zustand_erstellen, EventBroadcaster, SignalingConfig, SignalingRelay};
use serde_json::json;
use tokio::sync::{mpsc, Barrier};

const START_MS: u64 = 1_700_000_000_000;
const RAEUME: [&str; 3] = ["raum-a", "raum-b", "raum-c"];
const SCHRITTE: usize = 300;

/// xorshift64, reproduzierbar pro Task
struct Zufall(u64);

impl Zufall {
    fn naechste(&mut self, grenze: u64) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0 % grenze
    }
}

fn relay() -> SignalingRelay {
    SignalingRelay::neu(
        zustand_erstellen(&SignalingConfig::default()),
        EventBroadcaster::neu(),
        Arc::new(TestUhr::neu(START_MS)),
        RaumzeitMetrics::neu().unwrap(),
    )
}

fn register(user: &str) -> ClientEvent {
    ClientEvent::Register(RegisterRequest {
        user_id: json!(user),
        user_data: None,
    })
}

fn join(raum: &str) -> ClientEvent {
    ClientEvent::JoinRoom(JoinRoomRequest {
        room_id: raum.into(),
        user_data: None,
    })
}

fn leave() -> ClientEvent {
    ClientEvent::LeaveRoom(LeaveRoomRequest::default())
}

fn oeffnen(relay: &SignalingRelay, user: &str) -> (ConnectionId, mpsc::Receiver<ServerEvent>) {
    let id = ConnectionId::new();
    let rx = relay.verbindung_oeffnen(id);
    relay.verarbeiten(id, register(user));
    (id, rx)
}

fn leeren(rx: &mut mpsc::Receiver<ServerEvent>) {
    while rx.try_recv().is_ok() {}
}

/// Fuehrt zufaellige Schritte aus und gibt die am Ende offene Verbindung zurueck
async fn treiben(
    relay: SignalingRelay,
    user: String,
    bevorzugt: Option<&'static str>,
    saat: u64,
    start: Arc<Barrier>,
) -> ConnectionId {
    let mut zufall = Zufall(saat);
    let (mut id, mut rx) = oeffnen(&relay, &user);
    start.wait().await;

    for _ in 0..SCHRITTE {
        match zufall.naechste(10) {
            0..=5 => {
                let raum = match bevorzugt {
                    Some(raum) if zufall.naechste(2) == 0 => raum,
                    _ => RAEUME[zufall.naechste(RAEUME.len() as u64) as usize],
                };
                relay.verarbeiten(id, join(raum));
            }
            6..=8 => relay.verarbeiten(id, leave()),
            _ => {
                relay.verbindung_schliessen(id);
                (id, rx) = oeffnen(&relay, &user);
            }
        }
        leeren(&mut rx);
        tokio::task::yield_now().await;
    }
    id
}

fn zustand_pruefen(relay: &SignalingRelay, users: &[UserId], offen: &[ConnectionId]) {
    let zustand = relay.zustand().lock();
    let raeume: Vec<RoomId> = RAEUME.iter().map(|r| RoomId::parsen(r).unwrap()).collect();

    // Mitgliederlisten -> User-Index
    for raum_id in &raeume {
        let raum = zustand.raeume.raum(raum_id).expect("Raum verschwunden");
        for user_id in raum.user_ids() {
            assert_eq!(
                zustand.raeume.raum_von_user(&user_id),
                Some(raum_id),
                "{user_id} steht in {raum_id}, der Index sagt etwas anderes"
            );
        }
    }

    // User-Index -> Mitgliederlisten, hoechstens eine Mitgliedschaft
    for user_id in users {
        let mitgliedschaften: Vec<&RoomId> = raeume
            .iter()
            .filter(|r| zustand.raeume.raum(r).is_some_and(|raum| raum.ist_mitglied(user_id)))
            .collect();
        assert!(mitgliedschaften.len() <= 1, "{user_id} in {mitgliedschaften:?}");
        assert_eq!(
            zustand.raeume.raum_von_user(user_id),
            mitgliedschaften.first().copied(),
            "Index von {user_id} weicht ab"
        );
    }

    // Verbindungen zeigen nur auf Raeume, in denen ihr User Mitglied ist
    for id in offen {
        let verbindung = zustand
            .verbindungen
            .verbindung(id)
            .expect("offene Verbindung fehlt");
        if let Some(raum_id) = &verbindung.raum_id {
            let user_id = verbindung.user_id.as_ref().expect("Raum ohne User");
            let raum = zustand.raeume.raum(raum_id).expect("Verbindung zeigt ins Leere");
            assert!(
                raum.ist_mitglied(user_id),
                "Verbindung {id} zeigt auf {raum_id}, {user_id} ist dort kein Mitglied"
            );
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn gleichzeitige_raumwechsel_bleiben_konsistent() {
    let relay = relay();

    // Die Raeume gehoeren einem Besitzer, der nie mitspielt
    let (besitzer, _besitzer_rx) = oeffnen(&relay, "besitzer");
    for raum in RAEUME {
        relay.verarbeiten(
            besitzer,
            ClientEvent::CreateRoom(CreateRoomRequest {
                room_id: raum.into(),
                room_data: None,
            }),
        );
    }
    relay.verarbeiten(besitzer, leave());

    // Zwei Verbindungen teilen sich eine User-ID: eine zieht nach A, die andere nach B
    let mut treiber: Vec<(String, Option<&'static str>)> = vec![
        ("zwilling".into(), Some("raum-a")),
        ("zwilling".into(), Some("raum-b")),
    ];
    treiber.extend((0..6).map(|i| (format!("user-{i}"), None)));

    for durchlauf in 0..5u64 {
        let start = Arc::new(Barrier::new(treiber.len()));
        let tasks: Vec<_> = treiber
            .iter()
            .enumerate()
            .map(|(i, (user, bevorzugt))| {
                let saat = 0x9e37_79b9_7f4a_7c15 ^ (durchlauf << 32) ^ (i as u64 + 1);
                tokio::spawn(treiben(
                    relay.clone(),
                    user.clone(),
                    *bevorzugt,
                    saat,
                    Arc::clone(&start),
                ))
            })
            .collect();

        let mut offen = vec![besitzer];
        for task in tasks {
            offen.push(task.await.unwrap());
        }

        let users: Vec<UserId> = treiber
            .iter()
            .map(|(user, _)| UserId::from(user.as_str()))
            .chain([UserId::from("besitzer")])
            .collect();
        zustand_pruefen(&relay, &users, &offen);

        // Naechster Durchlauf startet mit frischen Verbindungen
        for id in offen.iter().skip(1) {
            relay.verbindung_schliessen(*id);
        }
    }
    assert_eq!(relay.verbindungs_anzahl(), 1);
}
