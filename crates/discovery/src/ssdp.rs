//! SSDP (UPnP) – Suchanfragen und Antworten
//!
//! ## Suchanfrage
//! ```text
//! M-SEARCH * HTTP/1.1
//! HOST: 239.255.255.250:1900
//! MAN: "ssdp:discover"
//! MX: 3
//! ST: <Suchziel>
//! <Leerzeile>
//! ```
//!
//! Ausgewertet werden Suchantworten (`HTTP/1.1 200 OK`) und Ankuendigungen
//! (`NOTIFY * HTTP/1.1` mit `ssdp:alive`). Fremde Suchanfragen und
//! `ssdp:byebye` sind irrelevant, aber kein Fehler.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use crate::error::{DiscoveryError, DiscoveryResult};
use crate::geraet::{Beobachtung, GeraeteAttribute, Protokoll};

pub const SSDP_GRUPPE: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);
pub const SSDP_PORT: u16 = 1900;

/// Standard-Suchziele
pub const STANDARD_SUCHZIELE: &[&str] = &[
    "ssdp:all",
    "upnp:rootdevice",
    "urn:dial-multiscreen-org:service:dial:1",
    "urn:schemas-upnp-org:device:MediaRenderer:1",
];

/// Standard-MX (maximale Antwortverzoegerung in Sekunden)
pub const STANDARD_MX: u8 = 3;

pub fn ssdp_ziel() -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(SSDP_GRUPPE, SSDP_PORT))
}

/// Baut eine M-SEARCH-Anfrage fuer ein Suchziel
pub fn m_search(suchziel: &str, mx: u8) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {SSDP_GRUPPE}:{SSDP_PORT}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: {mx}\r\n\
         ST: {suchziel}\r\n\
         \r\n"
    )
}

enum Nachricht {
    Antwort,
    Ankuendigung,
}

/// Parst ein SSDP-Datagramm
///
/// `Ok(None)`: irrelevant (fremde Suche, Abmeldung, Fehlerstatus).
/// `Err`: kaputtes Datagramm.
pub fn antwort_parsen(daten: &[u8]) -> DiscoveryResult<Option<Beobachtung>> {
    let text = std::str::from_utf8(daten).map_err(|_| DiscoveryError::ssdp("kein UTF-8"))?;
    let mut zeilen = text.lines();
    let startzeile = zeilen
        .next()
        .map(str::trim)
        .filter(|z| !z.is_empty())
        .ok_or_else(|| DiscoveryError::ssdp("leeres Datagramm"))?;

    let art = if startzeile.starts_with("M-SEARCH") {
        return Ok(None);
    } else if startzeile.starts_with("NOTIFY") {
        Nachricht::Ankuendigung
    } else if startzeile.starts_with("HTTP/") {
        let status = startzeile.split_whitespace().nth(1);
        if status != Some("200") {
            return Ok(None);
        }
        Nachricht::Antwort
    } else {
        return Err(DiscoveryError::ssdp(format!(
            "unbekannte Startzeile: {startzeile}"
        )));
    };

    let mut header: Vec<(String, String)> = Vec::new();
    for zeile in zeilen {
        if zeile.trim().is_empty() {
            break;
        }
        let (name, wert) = zeile
            .split_once(':')
            .ok_or_else(|| DiscoveryError::ssdp(format!("Zeile ohne Doppelpunkt: {zeile}")))?;
        header.push((name.trim().to_ascii_uppercase(), wert.trim().to_string()));
    }
    let feld = |name: &str| {
        header
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, w)| w.clone())
            .filter(|w| !w.is_empty())
    };

    let typ_roh = match art {
        Nachricht::Antwort => feld("ST"),
        Nachricht::Ankuendigung => {
            if feld("NTS").is_some_and(|nts| nts.eq_ignore_ascii_case("ssdp:byebye")) {
                return Ok(None);
            }
            feld("NT")
        }
    }
    .ok_or_else(|| DiscoveryError::ssdp("weder ST noch NT"))?;

    let location = feld("LOCATION");
    let server = feld("SERVER");
    let kennung = feld("USN")
        .or_else(|| location.clone())
        .ok_or_else(|| DiscoveryError::ssdp("weder USN noch LOCATION"))?;

    let typ = geraetetyp(&typ_roh);
    Ok(Some(Beobachtung {
        protokoll: Protokoll::Ssdp,
        kennung,
        name: server.clone().unwrap_or_else(|| typ.clone()),
        typ,
        attribute: GeraeteAttribute {
            location,
            server,
            ..GeraeteAttribute::default()
        },
    }))
}

/// Kurzer Typ aus ST/NT
///
/// `urn:schemas-upnp-org:device:MediaRenderer:1` -> `MediaRenderer`,
/// `upnp:rootdevice` -> `rootdevice`.
pub fn geraetetyp(roh: &str) -> String {
    let teile: Vec<&str> = roh.split(':').collect();
    if teile.first() == Some(&"urn") && teile.len() >= 4 {
        return teile[3].to_string();
    }
    if teile.first() == Some(&"uuid") {
        return "device".to_string();
    }
    teile.last().copied().unwrap_or(roh).to_string()
}
