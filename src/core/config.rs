//! Configuration management
//!
//! Every regulatory constant the engine applies (tax rates, VAT window,
//! power coefficients, subsidy caps, holiday list) lives here so a new
//! billing year or a decree change never touches engine logic.

use crate::core::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub billing: BillingConfig,
    #[serde(default)]
    pub power: PowerTermConfig,
    #[serde(default)]
    pub subsidy: SubsidyConfig,
    #[serde(default)]
    pub prices: PriceSourceConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
}

impl Config {
    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;

        let app_config_dir = config_dir.join("pvpc-billing");

        if !app_config_dir.exists() {
            fs::create_dir_all(&app_config_dir)?;
        }

        Ok(app_config_dir.join("config.toml"))
    }

    /// Load configuration from the default location, writing defaults
    /// on first run
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        Self::load_from(&path)
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// Invoice-level rates and the VAT promotional window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    /// Special electricity tax (IEE) applied to the taxable subtotal
    #[serde(default = "default_electricity_tax_rate")]
    pub electricity_tax_rate: f64,
    /// Meter rental, currency units per year
    #[serde(default = "default_meter_rental_per_year")]
    pub meter_rental_per_year: f64,
    /// Standard VAT rate
    #[serde(default = "default_vat_standard_rate")]
    pub vat_standard_rate: f64,
    /// Reduced VAT rate inside the promotional window
    #[serde(default = "default_vat_reduced_rate")]
    pub vat_reduced_rate: f64,
    /// First date of the reduced-VAT window, inclusive.
    /// RDL 12/2021 entered into force on 2021-06-26 but the reduction
    /// applies to all consumption from 2021-06-01; both dates circulate,
    /// which is why this is a setting and not a literal.
    #[serde(default = "default_vat_reduced_from")]
    pub vat_reduced_from: NaiveDate,
    /// Last date of the reduced-VAT window, inclusive
    #[serde(default = "default_vat_reduced_until")]
    pub vat_reduced_until: NaiveDate,
}

fn default_electricity_tax_rate() -> f64 { 0.0511269632 }
fn default_meter_rental_per_year() -> f64 { 9.72 }
fn default_vat_standard_rate() -> f64 { 0.21 }
fn default_vat_reduced_rate() -> f64 { 0.10 }
fn default_vat_reduced_from() -> NaiveDate { ymd(2021, 6, 1) }
fn default_vat_reduced_until() -> NaiveDate { ymd(2021, 12, 31) }

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            electricity_tax_rate: default_electricity_tax_rate(),
            meter_rental_per_year: default_meter_rental_per_year(),
            vat_standard_rate: default_vat_standard_rate(),
            vat_reduced_rate: default_vat_reduced_rate(),
            vat_reduced_from: default_vat_reduced_from(),
            vat_reduced_until: default_vat_reduced_until(),
        }
    }
}

/// Published per-kW-year coefficients of the contracted-power charge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerTermConfig {
    /// 2.0TD peak coefficient
    #[serde(default = "default_peak_per_kw_year")]
    pub peak_per_kw_year: f64,
    /// 2.0TD off-peak coefficient
    #[serde(default = "default_shoulder_per_kw_year")]
    pub shoulder_per_kw_year: f64,
    /// Commercialization margin, both eras
    #[serde(default = "default_margin_per_kw_year")]
    pub margin_per_kw_year: f64,
    /// Single pre-cutover coefficient
    #[serde(default = "default_legacy_per_kw_year")]
    pub legacy_per_kw_year: f64,
}

fn default_peak_per_kw_year() -> f64 { 30.67266 }
fn default_shoulder_per_kw_year() -> f64 { 1.4243591 }
fn default_margin_per_kw_year() -> f64 { 3.113 }
fn default_legacy_per_kw_year() -> f64 { 38.043426 }

impl Default for PowerTermConfig {
    fn default() -> Self {
        Self {
            peak_per_kw_year: default_peak_per_kw_year(),
            shoulder_per_kw_year: default_shoulder_per_kw_year(),
            margin_per_kw_year: default_margin_per_kw_year(),
            legacy_per_kw_year: default_legacy_per_kw_year(),
        }
    }
}

/// Bono social rates and annual consumption caps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubsidyConfig {
    /// Discount rate for vulnerable consumers
    #[serde(default = "default_subsidy_standard_rate")]
    pub standard_rate: f64,
    /// Discount rate for severely vulnerable consumers
    #[serde(default = "default_subsidy_severe_rate")]
    pub severe_rate: f64,
    /// Annual kWh caps by household tier; the discount on energy is
    /// limited to the prorated cap
    #[serde(default = "default_annual_caps_kwh")]
    pub annual_caps_kwh: Vec<f64>,
}

fn default_subsidy_standard_rate() -> f64 { 0.25 }
fn default_subsidy_severe_rate() -> f64 { 0.40 }
fn default_annual_caps_kwh() -> Vec<f64> { vec![1380.0, 1932.0, 2346.0, 4140.0] }

impl Default for SubsidyConfig {
    fn default() -> Self {
        Self {
            standard_rate: default_subsidy_standard_rate(),
            severe_rate: default_subsidy_severe_rate(),
            annual_caps_kwh: default_annual_caps_kwh(),
        }
    }
}

/// ESIOS archive endpoint and local cache location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSourceConfig {
    /// Archive 70 download endpoint; the date is appended per request
    #[serde(default = "default_price_endpoint")]
    pub endpoint: String,
    /// Cache directory override; defaults to the platform cache dir
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// Request timeout in seconds
    #[serde(default = "default_price_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_price_endpoint() -> String {
    "https://api.esios.ree.es/archives/70/download_json".to_string()
}
fn default_price_timeout_secs() -> u64 { 10 }

impl Default for PriceSourceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_price_endpoint(),
            cache_dir: None,
            timeout_secs: default_price_timeout_secs(),
        }
    }
}

impl PriceSourceConfig {
    /// Resolve the effective cache directory
    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| Error::Config("Could not determine cache directory".to_string()))?;
        Ok(cache_dir.join("pvpc-billing"))
    }
}

/// Holiday calendar, swappable per billing year
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// Spanish national holidays for the billing years in scope
    #[serde(default = "default_holidays")]
    pub holidays: Vec<NaiveDate>,
}

fn default_holidays() -> Vec<NaiveDate> {
    // National (non-substitutable) holidays, 2021
    vec![
        ymd(2021, 1, 1),
        ymd(2021, 1, 6),
        ymd(2021, 4, 2),
        ymd(2021, 5, 1),
        ymd(2021, 10, 12),
        ymd(2021, 11, 1),
        ymd(2021, 12, 6),
        ymd(2021, 12, 8),
        ymd(2021, 12, 25),
    ]
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            holidays: default_holidays(),
        }
    }
}

// Literal calendar dates are valid by construction.
fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_regulatory_constants() {
        let config = Config::default();
        assert!((config.billing.electricity_tax_rate - 0.0511269632).abs() < 1e-12);
        assert_eq!(config.subsidy.annual_caps_kwh.len(), 4);
        assert!(config.calendar.holidays.contains(&ymd(2021, 10, 12)));
        assert_eq!(config.billing.vat_reduced_from, ymd(2021, 6, 1));
    }

    #[test]
    fn partial_toml_fills_missing_sections() {
        let config: Config = toml::from_str("[billing]\nvat_standard_rate = 0.21\n")
            .expect("partial config should parse");
        assert!((config.subsidy.standard_rate - 0.25).abs() < 1e-12);
        assert_eq!(config.prices.endpoint, default_price_endpoint());
    }
}
