//! Hourly price resolution and the persisted day cache
//!
//! Prices come from the ESIOS archive 70 JSON, one document per
//! calendar date. Documents are cached verbatim on disk, one file per
//! date; a cached date is never re-fetched and never rewritten, so a
//! rerun of the same billing period works offline and reproduces the
//! same figures even if the operator later revises the series.

use crate::core::{Diagnostic, Error, PriceSeries, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;

/// Source of one raw archive document per date
///
/// A trait seam so tests and offline tooling can stand in for the HTTP
/// client.
pub trait PriceSource {
    fn fetch_day(&self, date: NaiveDate) -> Result<String>;
}

/// Blocking HTTP client for the ESIOS price archive
pub struct EsiosClient {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl EsiosClient {
    pub fn new(config: &crate::core::PriceSourceConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

impl PriceSource for EsiosClient {
    fn fetch_day(&self, date: NaiveDate) -> Result<String> {
        let url = format!("{}?locale=es&date={}", self.endpoint, date.format("%Y-%m-%d"));
        log::debug!("fetching prices: {}", url);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| Error::PriceUnavailable {
                date,
                reason: e.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(Error::PriceUnavailable {
                date,
                reason: format!("HTTP {}", response.status()),
            });
        }
        response.text().map_err(|e| Error::PriceUnavailable {
            date,
            reason: e.to_string(),
        })
    }
}

/// Per-kWh prices for one date, keyed by internal hour 0-23
pub type DayPrices = HashMap<u32, f64>;

/// Lazily populated, append-only price table
pub struct PriceCache {
    source: Box<dyn PriceSource>,
    /// None disables persistence (in-memory table only)
    cache_dir: Option<PathBuf>,
    table: HashMap<NaiveDate, DayPrices>,
}

impl PriceCache {
    /// Cache persisting one file per date under `cache_dir`
    pub fn new(source: Box<dyn PriceSource>, cache_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&cache_dir)?;
        Ok(Self {
            source,
            cache_dir: Some(cache_dir),
            table: HashMap::new(),
        })
    }

    /// Cache without a persisted store
    pub fn ephemeral(source: Box<dyn PriceSource>) -> Self {
        Self {
            source,
            cache_dir: None,
            table: HashMap::new(),
        }
    }

    /// Resolve one date's prices for a series
    ///
    /// Lookup order: in-memory table, persisted file, remote source.
    /// A remote fetch parses before persisting so a malformed payload
    /// is never cached.
    pub fn day_prices(
        &mut self,
        date: NaiveDate,
        series: PriceSeries,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<DayPrices> {
        if let Some(day) = self.table.get(&date) {
            return Ok(day.clone());
        }

        let day = match self.read_persisted(date)? {
            Some(raw) => {
                log::debug!("price cache hit for {}", date);
                parse_day(&raw, series).map_err(|reason| Error::PriceUnavailable { date, reason })?
            }
            None => {
                let raw = self.source.fetch_day(date)?;
                let day = parse_day(&raw, series)
                    .map_err(|reason| Error::PriceUnavailable { date, reason })?;
                self.persist(date, &raw)?;
                log::info!("fetched prices for {} ({})", date, series.field());
                diagnostics.push(Diagnostic::PriceDayFetched { date, series });
                day
            }
        };

        self.table.insert(date, day.clone());
        Ok(day)
    }

    fn day_file(&self, date: NaiveDate) -> Option<PathBuf> {
        self.cache_dir
            .as_ref()
            .map(|dir| dir.join(date.format("%Y-%m-%d").to_string()))
    }

    fn read_persisted(&self, date: NaiveDate) -> Result<Option<String>> {
        let Some(path) = self.day_file(date) else {
            return Ok(None);
        };
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the raw document verbatim; an existing file is left alone
    fn persist(&self, date: NaiveDate, raw: &str) -> Result<()> {
        let Some(path) = self.day_file(date) else {
            return Ok(());
        };
        match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                use std::io::Write;
                file.write_all(raw.as_bytes())?;
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ArchiveDoc {
    #[serde(rename = "PVPC", default)]
    pvpc: Vec<HourEntry>,
}

#[derive(Debug, Deserialize)]
struct HourEntry {
    #[serde(rename = "Hora")]
    hora: String,
    #[serde(rename = "PCB")]
    pcb: Option<String>,
    #[serde(rename = "CYM")]
    cym: Option<String>,
    #[serde(rename = "GEN")]
    gen: Option<String>,
    #[serde(rename = "NOC")]
    noc: Option<String>,
    #[serde(rename = "VHC")]
    vhc: Option<String>,
}

impl HourEntry {
    fn value_for(&self, series: PriceSeries) -> Option<&String> {
        match series {
            PriceSeries::Pcb => self.pcb.as_ref(),
            PriceSeries::Cym => self.cym.as_ref(),
            PriceSeries::Gen => self.gen.as_ref(),
            PriceSeries::Noc => self.noc.as_ref(),
            PriceSeries::Vhc => self.vhc.as_ref(),
        }
    }
}

/// Parse one archive document into per-kWh prices for a series
///
/// `Hora` carries ending-hour labels ("00-01" .. "23-24"); the end hour
/// minus one is the internal start-hour key. Values are decimal-comma
/// EUR/MWh strings. Hours whose entry lacks the requested series are
/// simply absent (the engine reports `PriceMissing` if one is needed).
fn parse_day(raw: &str, series: PriceSeries) -> std::result::Result<DayPrices, String> {
    let doc: ArchiveDoc =
        serde_json::from_str(raw).map_err(|e| format!("malformed archive JSON: {}", e))?;
    if doc.pvpc.is_empty() {
        return Err("archive document has no PVPC entries".to_string());
    }

    let mut day = DayPrices::new();
    for entry in &doc.pvpc {
        let end_label = entry
            .hora
            .split('-')
            .nth(1)
            .ok_or_else(|| format!("malformed Hora field '{}'", entry.hora))?;
        let end: u32 = end_label
            .trim()
            .parse()
            .map_err(|_| format!("malformed Hora field '{}'", entry.hora))?;
        if end == 0 || end > 24 {
            return Err(format!("Hora end {} out of range", end));
        }
        let Some(value) = entry.value_for(series) else {
            continue;
        };
        let per_mwh: f64 = value
            .replace('.', "")
            .replace(',', ".")
            .parse()
            .map_err(|_| format!("malformed {} price '{}'", series.field(), value))?;
        day.insert(end - 1, per_mwh / 1000.0);
    }
    Ok(day)
}
