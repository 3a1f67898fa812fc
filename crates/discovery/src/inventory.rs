//! Geraete-Inventar
//!
//! Schluessel ist `Quelladresse|Kennung`. Eine erneute Beobachtung frischt
//! `last_seen`, Name, Typ und Attribute auf, legt aber nie ein zweites
//! Geraet an.

use dashmap::DashMap;
use std::net::IpAddr;

use crate::geraet::{geraete_id, Beobachtung, Geraet};

#[derive(Debug, Default)]
pub struct GeraeteInventar {
    geraete: DashMap<String, Geraet>,
}

impl GeraeteInventar {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Fuegt ein Geraet ein oder frischt es auf. `true` wenn neu.
    pub fn aktualisieren(&self, beobachtung: Beobachtung, adresse: IpAddr, jetzt_ms: u64) -> bool {
        let id = geraete_id(adresse, &beobachtung.kennung);
        match self.geraete.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(mut eintrag) => {
                let geraet = eintrag.get_mut();
                geraet.last_seen = geraet.last_seen.max(jetzt_ms);
                geraet.name = beobachtung.name;
                geraet.typ = beobachtung.typ;
                geraet.protokoll = beobachtung.protokoll;
                geraet.attribute.auffrischen(beobachtung.attribute);
                false
            }
            dashmap::mapref::entry::Entry::Vacant(eintrag) => {
                let id = eintrag.key().clone();
                eintrag.insert(Geraet {
                    id,
                    kennung: beobachtung.kennung,
                    name: beobachtung.name,
                    typ: beobachtung.typ,
                    adresse,
                    protokoll: beobachtung.protokoll,
                    first_seen: jetzt_ms,
                    last_seen: jetzt_ms,
                    attribute: beobachtung.attribute,
                });
                true
            }
        }
    }

    /// Entfernt alle Geraete, deren `last_seen` mehr als `schwelle_ms` zurueckliegt
    pub fn veraltete_entfernen(&self, jetzt_ms: u64, schwelle_ms: u64) -> Vec<String> {
        let veraltet: Vec<String> = self
            .geraete
            .iter()
            .filter(|e| jetzt_ms.saturating_sub(e.last_seen) > schwelle_ms)
            .map(|e| e.key().clone())
            .collect();

        veraltet
            .into_iter()
            .filter(|id| {
                // Zwischenzeitlich neu gesehene Geraete bleiben
                self.geraete
                    .remove_if(id, |_, g| jetzt_ms.saturating_sub(g.last_seen) > schwelle_ms)
                    .is_some()
            })
            .collect()
    }

    /// Alle Geraete, zuletzt gesehene zuerst
    pub fn liste(&self) -> Vec<Geraet> {
        let mut liste: Vec<Geraet> = self.geraete.iter().map(|e| e.value().clone()).collect();
        liste.sort_by(|a, b| b.last_seen.cmp(&a.last_seen).then_with(|| a.id.cmp(&b.id)));
        liste
    }

    pub fn anzahl(&self) -> usize {
        self.geraete.len()
    }

    pub fn geraet(&self, id: &str) -> Option<Geraet> {
        self.geraete.get(id).map(|g| g.value().clone())
    }
}
