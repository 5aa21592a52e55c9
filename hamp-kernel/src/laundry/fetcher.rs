/**
 * FETCHER - Un cycle scrape + parse de la page upstream d'une laverie
 *
 * RÔLE :
 * Télécharge la page HTML d'une laverie et la transforme en liste de Machine.
 *
 * FONCTIONNEMENT :
 * - GET sur l'URL upstream de la laverie (template configurable)
 * - Statut non-2xx ou erreur réseau => UpstreamUnavailable
 * - Corps illisible comme document texte => ParseFailure
 * - Lignes `tbody tr` : les 2 premières sont des en-têtes, ignorées
 * - Cellules positionnelles (name, type, status, time), validées par classe CSS
 * - Ligne sans nom => ignorée (pas une erreur, c'est le cas normal upstream)
 */

use crate::config::{RoomConf, UpstreamConf};
use crate::models::{Machine, MachineKind, Remaining};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use time::OffsetDateTime;
use tracing::debug;

/// Lignes d'en-tête du tableau upstream (titre + libellés de colonnes)
const HEADER_ROWS: usize = 2;

/// Classe CSS attendue pour chaque colonne, dans l'ordre
const CELL_CLASSES: [&str; 4] = ["name", "type", "status", "time"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("Laundry room unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("Unparsable laundry page: {0}")]
    ParseFailure(String),
}

/// Source de l'état des machines d'une laverie
#[async_trait]
pub trait MachineSource: Send + Sync {
    async fn fetch(&self, room: &RoomConf) -> Result<Vec<Machine>, FetchError>;
}

/// Source réelle : scrape de laundrytrackerconnect.com
pub struct HttpMachineSource {
    http: reqwest::Client,
    upstream: UpstreamConf,
}

impl HttpMachineSource {
    pub fn new(upstream: UpstreamConf) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(upstream.timeout_secs.max(1)))
            .user_agent(upstream.user_agent.clone())
            .build()?;
        Ok(Self { http, upstream })
    }
}

#[async_trait]
impl MachineSource for HttpMachineSource {
    async fn fetch(&self, room: &RoomConf) -> Result<Vec<Machine>, FetchError> {
        let url = self.upstream.url_for(room);
        debug!("fetching {url}");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::UpstreamUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::UpstreamUnavailable(format!(
                "HTTP {} from {url}",
                response.status()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::UpstreamUnavailable(e.to_string()))?;
        let html = std::str::from_utf8(&body)
            .map_err(|e| FetchError::ParseFailure(format!("body is not text: {e}")))?;

        parse_machines(html, OffsetDateTime::now_utc())
    }
}

fn selector(css: &str) -> Result<Selector, FetchError> {
    Selector::parse(css).map_err(|e| FetchError::ParseFailure(e.to_string()))
}

/// Extrait les machines du tableau upstream.
/// `now` sert de base aux estimations de fin de cycle.
pub fn parse_machines(html: &str, now: OffsetDateTime) -> Result<Vec<Machine>, FetchError> {
    let row_selector = selector("tbody tr")?;
    let cell_selector = selector("td")?;
    let document = Html::parse_document(html);

    let mut machines = Vec::new();

    for row in document.select(&row_selector).skip(HEADER_ROWS) {
        let mut cells: [Option<String>; 4] = Default::default();
        for (i, cell) in row.select(&cell_selector).take(CELL_CLASSES.len()).enumerate() {
            if has_class(&cell, CELL_CLASSES[i]) {
                cells[i] = Some(cell.text().collect());
            }
        }
        let [name, kind, status, time_text] = cells;

        let Some(name) = name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()) else {
            continue;
        };

        machines.push(Machine {
            name,
            kind: kind.as_deref().and_then(MachineKind::from_label),
            status: status.map(|s| s.trim().to_string()).unwrap_or_default(),
            remaining: time_text.as_deref().and_then(|t| parse_remaining(t, now)),
        });
    }

    Ok(machines)
}

fn has_class(cell: &ElementRef<'_>, class: &str) -> bool {
    cell.value().classes().any(|c| c == class)
}

/// Texte de la colonne "time" : espaces insécables retirés, blancs normalisés.
/// `"<N> minutes left"` donne une estimation `now + N min`, tout autre texte
/// est conservé tel quel sans estimation, de même qu'une durée hors des
/// bornes représentables. Texte vide => None.
pub fn parse_remaining(raw: &str, now: OffsetDateTime) -> Option<Remaining> {
    let text = raw
        .replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if text.is_empty() {
        return None;
    }

    let estimated_completion =
        minutes_left(&text).and_then(|m| now.checked_add(time::Duration::minutes(m)));
    Some(Remaining {
        text,
        estimated_completion,
    })
}

fn minutes_left(text: &str) -> Option<i64> {
    let mut words = text.split_whitespace();
    let minutes: u32 = words.next()?.parse().ok()?;
    let unit = words.next()?.to_ascii_lowercase();
    let tail = words.next()?.to_ascii_lowercase();

    let known_unit = matches!(unit.as_str(), "minute" | "minutes" | "min" | "mins");
    if !known_unit || tail != "left" || words.next().is_some() {
        return None;
    }
    Some(i64::from(minutes))
}
