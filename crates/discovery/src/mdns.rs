//! mDNS (DNS-SD) – binaere Anfragen und Antworten
//!
//! ## Nachrichtenformat (RFC 1035, Header = 12 Bytes)
//!
//! ```text
//! Offset  Len  Beschreibung
//! ------  ---  -----------
//!  0       2   ID (bei mDNS 0)
//!  2       2   Flags (Bit 15 = Antwort)
//!  4       2   Anzahl Fragen
//!  6       2   Anzahl Antworten
//!  8       2   Anzahl Authority-Records
//! 10       2   Anzahl Additional-Records
//! 12+      N   Fragen, dann Resource-Records
//! ```
//!
//! Pro Dienstname wird eine PTR-Frage gestellt. Aus einer Antwort werden
//! PTR (Dienst -> Instanz), SRV (Instanz -> Host + Port), TXT (`fn=`) und
//! A (Host -> IPv4) zusammengefuehrt. Namen duerfen komprimiert sein.

use bytes::{BufMut, BytesMut};
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use crate::error::{DiscoveryError, DiscoveryResult};
use crate::geraet::{Beobachtung, GeraeteAttribute, Protokoll};

pub const MDNS_GRUPPE: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);
pub const MDNS_PORT: u16 = 5353;

/// Standard-Dienstnamen
pub const STANDARD_DIENSTE: &[&str] = &[
    "_googlecast._tcp.local",
    "_airplay._tcp.local",
    "_raop._tcp.local",
    "_spotify-connect._tcp.local",
    "_http._tcp.local",
];

pub const TYP_A: u16 = 1;
pub const TYP_PTR: u16 = 12;
pub const TYP_TXT: u16 = 16;
pub const TYP_SRV: u16 = 33;
pub const KLASSE_IN: u16 = 1;

const HEADER_GROESSE: usize = 12;
const FLAG_ANTWORT: u16 = 0x8000;
const MAX_LABEL_LAENGE: usize = 63;
const MAX_NAMEN_LAENGE: usize = 255;
/// Schutz gegen Kompressions-Schleifen
const MAX_SPRUENGE: usize = 16;

pub fn mdns_ziel() -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(MDNS_GRUPPE, MDNS_PORT))
}

/// Vergleichsform eines DNS-Namens (ohne Punkt am Ende, klein)
pub fn name_normalisieren(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

fn name_schreiben(puffer: &mut BytesMut, name: &str) -> DiscoveryResult<()> {
    let name = name.trim_end_matches('.');
    if name.is_empty() || name.len() > MAX_NAMEN_LAENGE {
        return Err(DiscoveryError::UngueltigerName(name.to_string()));
    }
    for label in name.split('.') {
        if label.is_empty() || label.len() > MAX_LABEL_LAENGE {
            return Err(DiscoveryError::UngueltigerName(name.to_string()));
        }
        puffer.put_u8(label.len() as u8);
        puffer.put_slice(label.as_bytes());
    }
    puffer.put_u8(0);
    Ok(())
}

/// Baut eine PTR-Anfrage fuer einen Dienstnamen
pub fn anfrage_bauen(dienst: &str) -> DiscoveryResult<Vec<u8>> {
    let mut puffer = BytesMut::with_capacity(HEADER_GROESSE + dienst.len() + 6);
    puffer.put_u16(0); // ID
    puffer.put_u16(0); // Flags: Standard-Anfrage
    puffer.put_u16(1); // Fragen
    puffer.put_u16(0);
    puffer.put_u16(0);
    puffer.put_u16(0);
    name_schreiben(&mut puffer, dienst)?;
    puffer.put_u16(TYP_PTR);
    puffer.put_u16(KLASSE_IN);
    Ok(puffer.to_vec())
}

// ---------------------------------------------------------------------------
// Leser
// ---------------------------------------------------------------------------

struct Leser<'a> {
    daten: &'a [u8],
    pos: usize,
}

impl<'a> Leser<'a> {
    fn neu(daten: &'a [u8]) -> Self {
        Self { daten, pos: 0 }
    }

    fn bytes(&mut self, n: usize) -> DiscoveryResult<&'a [u8]> {
        let ende = self.pos.checked_add(n).filter(|e| *e <= self.daten.len());
        match ende {
            Some(ende) => {
                let teil = &self.daten[self.pos..ende];
                self.pos = ende;
                Ok(teil)
            }
            None => Err(DiscoveryError::mdns(format!(
                "Datagramm endet bei Offset {} (brauche {n} Bytes)",
                self.pos
            ))),
        }
    }

    fn u16(&mut self) -> DiscoveryResult<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> DiscoveryResult<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Liest einen (moeglicherweise komprimierten) Namen
    fn name(&mut self) -> DiscoveryResult<String> {
        let mut labels: Vec<String> = Vec::new();
        let mut laenge = 0usize;
        let mut pos = self.pos;
        let mut gesprungen = false;
        let mut spruenge = 0usize;

        loop {
            let byte = *self
                .daten
                .get(pos)
                .ok_or_else(|| DiscoveryError::mdns("Name ueber das Ende hinaus"))?;

            match byte & 0xC0 {
                0xC0 => {
                    let zweites = *self
                        .daten
                        .get(pos + 1)
                        .ok_or_else(|| DiscoveryError::mdns("abgeschnittener Zeiger"))?;
                    if !gesprungen {
                        self.pos = pos + 2;
                        gesprungen = true;
                    }
                    spruenge += 1;
                    if spruenge > MAX_SPRUENGE {
                        return Err(DiscoveryError::mdns("Kompressions-Schleife"));
                    }
                    pos = (((byte & 0x3F) as usize) << 8) | zweites as usize;
                }
                0x00 => {
                    let label_laenge = byte as usize;
                    if label_laenge == 0 {
                        if !gesprungen {
                            self.pos = pos + 1;
                        }
                        break;
                    }
                    let start = pos + 1;
                    let label = self
                        .daten
                        .get(start..start + label_laenge)
                        .ok_or_else(|| DiscoveryError::mdns("Label ueber das Ende hinaus"))?;
                    laenge += label_laenge + 1;
                    if laenge > MAX_NAMEN_LAENGE {
                        return Err(DiscoveryError::mdns("Name zu lang"));
                    }
                    labels.push(String::from_utf8_lossy(label).into_owned());
                    pos = start + label_laenge;
                }
                _ => return Err(DiscoveryError::mdns("reservierter Label-Typ")),
            }
        }

        Ok(labels.join("."))
    }
}

// ---------------------------------------------------------------------------
// Antwort
// ---------------------------------------------------------------------------

/// Die fuer die Discovery relevanten Records einer Antwort
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MdnsAntwort {
    /// (Dienst, Instanz)
    pub ptr: Vec<(String, String)>,
    /// Instanz -> (Ziel-Host, Port)
    pub srv: HashMap<String, (String, u16)>,
    /// Host -> IPv4
    pub a: HashMap<String, Ipv4Addr>,
    /// Instanz -> TXT-Eintraege
    pub txt: HashMap<String, Vec<String>>,
}

/// Liest alle Records einer mDNS-Nachricht
///
/// `Ok(None)` fuer Anfragen (auch die eigenen, per Multicast zurueckgespiegelt).
pub fn nachricht_lesen(daten: &[u8]) -> DiscoveryResult<Option<MdnsAntwort>> {
    let mut leser = Leser::neu(daten);
    if daten.len() < HEADER_GROESSE {
        return Err(DiscoveryError::mdns("kuerzer als der Header"));
    }
    let _id = leser.u16()?;
    let flags = leser.u16()?;
    let fragen = leser.u16()?;
    let antworten = leser.u16()?;
    let authority = leser.u16()?;
    let zusaetzlich = leser.u16()?;

    if flags & FLAG_ANTWORT == 0 {
        return Ok(None);
    }

    for _ in 0..fragen {
        leser.name()?;
        leser.bytes(4)?; // Typ + Klasse
    }

    let mut antwort = MdnsAntwort::default();
    let records = antworten as usize + authority as usize + zusaetzlich as usize;
    for _ in 0..records {
        let name = name_normalisieren(&leser.name()?);
        let typ = leser.u16()?;
        let _klasse = leser.u16()?;
        let _ttl = leser.u32()?;
        let rd_laenge = leser.u16()? as usize;
        let rd_start = leser.pos;
        // Gesamte RDATA muss vorhanden sein
        leser.bytes(rd_laenge)?;
        let rd_ende = leser.pos;
        leser.pos = rd_start;

        match typ {
            TYP_PTR => {
                let instanz = leser.name()?;
                antwort.ptr.push((name, instanz.trim_end_matches('.').to_string()));
            }
            TYP_SRV => {
                if rd_laenge < 7 {
                    return Err(DiscoveryError::mdns("SRV-Record zu kurz"));
                }
                let _prioritaet = leser.u16()?;
                let _gewicht = leser.u16()?;
                let port = leser.u16()?;
                let ziel = leser.name()?;
                antwort.srv.insert(name, (name_normalisieren(&ziel), port));
            }
            TYP_A => {
                if rd_laenge != 4 {
                    return Err(DiscoveryError::mdns("A-Record ohne 4 Bytes"));
                }
                let b = leser.bytes(4)?;
                antwort.a.insert(name, Ipv4Addr::new(b[0], b[1], b[2], b[3]));
            }
            TYP_TXT => {
                let mut eintraege = Vec::new();
                while leser.pos < rd_ende {
                    let laenge = leser.bytes(1)?[0] as usize;
                    let eintrag = leser.bytes(laenge)?;
                    if !eintrag.is_empty() {
                        eintraege.push(String::from_utf8_lossy(eintrag).into_owned());
                    }
                }
                antwort.txt.insert(name, eintraege);
            }
            _ => {}
        }
        if leser.pos > rd_ende {
            return Err(DiscoveryError::mdns("RDATA laenger als angegeben"));
        }
        leser.pos = rd_ende;
    }

    Ok(Some(antwort))
}

/// Parst eine Antwort zu Beobachtungen fuer die angefragten Dienste
///
/// PTR-Records fremder Dienste sind irrelevant und werden ignoriert.
pub fn antwort_parsen(daten: &[u8], dienste: &[String]) -> DiscoveryResult<Vec<Beobachtung>> {
    let Some(antwort) = nachricht_lesen(daten)? else {
        return Ok(Vec::new());
    };
    let gesucht: Vec<String> = dienste.iter().map(|d| name_normalisieren(d)).collect();

    let mut beobachtungen = Vec::new();
    for (dienst, instanz) in &antwort.ptr {
        if !gesucht.contains(dienst) {
            continue;
        }
        let schluessel = name_normalisieren(instanz);
        let srv = antwort.srv.get(&schluessel);
        let freundlicher_name = antwort
            .txt
            .get(&schluessel)
            .and_then(|eintraege| {
                eintraege
                    .iter()
                    .find_map(|e| e.strip_prefix("fn=").map(str::to_string))
            })
            .filter(|n| !n.is_empty());

        beobachtungen.push(Beobachtung {
            protokoll: Protokoll::Mdns,
            kennung: instanz.clone(),
            name: freundlicher_name.unwrap_or_else(|| instanz_name(instanz, dienst)),
            typ: dienst_typ(dienst),
            attribute: GeraeteAttribute {
                host: srv.map(|(ziel, _)| ziel.clone()),
                port: srv.map(|(_, port)| *port),
                ipv4: srv.and_then(|(ziel, _)| antwort.a.get(ziel).copied()),
                ..GeraeteAttribute::default()
            },
        });
    }
    Ok(beobachtungen)
}

/// `_googlecast._tcp.local` -> `googlecast`
pub fn dienst_typ(dienst: &str) -> String {
    dienst
        .split('.')
        .next()
        .unwrap_or(dienst)
        .trim_start_matches('_')
        .to_string()
}

/// `Wohnzimmer._googlecast._tcp.local` -> `Wohnzimmer`
fn instanz_name(instanz: &str, dienst: &str) -> String {
    let instanz = instanz.trim_end_matches('.');
    let laenge = instanz.len();
    if laenge > dienst.len() + 1 {
        let (kopf, rest) = instanz.split_at(laenge - dienst.len());
        if rest.eq_ignore_ascii_case(dienst) && kopf.ends_with('.') {
            return kopf.trim_end_matches('.').to_string();
        }
    }
    instanz.to_string()
}

// ---------------------------------------------------------------------------
// Test-Hilfen: Antworten bauen
// ---------------------------------------------------------------------------

/// Baut eine Antwort (PTR + SRV + TXT + A) wie ein Responder sie sendet
///
/// Wird von Tests und Integrationstests genutzt.
pub fn antwort_bauen(
    dienst: &str,
    instanz: &str,
    host: &str,
    port: u16,
    ipv4: Ipv4Addr,
    txt: &[&str],
) -> DiscoveryResult<Vec<u8>> {
    let instanz_voll = format!("{instanz}.{dienst}");
    let mut puffer = BytesMut::new();
    puffer.put_u16(0);
    puffer.put_u16(FLAG_ANTWORT | 0x0400); // Antwort, autoritativ
    puffer.put_u16(0);
    puffer.put_u16(1);
    puffer.put_u16(0);
    puffer.put_u16(3);

    // PTR: Dienst -> Instanz
    name_schreiben(&mut puffer, dienst)?;
    puffer.put_u16(TYP_PTR);
    puffer.put_u16(KLASSE_IN);
    puffer.put_u32(120);
    let mut rdata = BytesMut::new();
    name_schreiben(&mut rdata, &instanz_voll)?;
    puffer.put_u16(rdata.len() as u16);
    puffer.put_slice(&rdata);

    // SRV: Instanz -> Host + Port
    name_schreiben(&mut puffer, &instanz_voll)?;
    puffer.put_u16(TYP_SRV);
    puffer.put_u16(KLASSE_IN);
    puffer.put_u32(120);
    let mut rdata = BytesMut::new();
    rdata.put_u16(0);
    rdata.put_u16(0);
    rdata.put_u16(port);
    name_schreiben(&mut rdata, host)?;
    puffer.put_u16(rdata.len() as u16);
    puffer.put_slice(&rdata);

    // TXT
    name_schreiben(&mut puffer, &instanz_voll)?;
    puffer.put_u16(TYP_TXT);
    puffer.put_u16(KLASSE_IN);
    puffer.put_u32(120);
    let mut rdata = BytesMut::new();
    for eintrag in txt {
        rdata.put_u8(eintrag.len() as u8);
        rdata.put_slice(eintrag.as_bytes());
    }
    puffer.put_u16(rdata.len() as u16);
    puffer.put_slice(&rdata);

    // A: Host -> IPv4
    name_schreiben(&mut puffer, host)?;
    puffer.put_u16(TYP_A);
    puffer.put_u16(KLASSE_IN);
    puffer.put_u32(120);
    puffer.put_u16(4);
    puffer.put_slice(&ipv4.octets());

    Ok(puffer.to_vec())
}
