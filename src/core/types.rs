//! Common types used across the billing engine

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Contracted tariff scheme
///
/// The regulatory cutover of 2021-06-01 split the schemes into two
/// families: the legacy access tariffs (2.0A, 2.0DHA, 2.0DHS) and the
/// current three-period 2.0TD. A scheme from the wrong family for a
/// given date is auto-corrected by the classifier, never a hard error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TariffScheme {
    /// Resolve the era-appropriate default per date
    Auto,
    /// Legacy 2.0A, single period
    SinglePeriod,
    /// Legacy 2.0DHA, night discount
    TwoPeriodNight,
    /// Legacy 2.0DHS, night + supervalley
    ThreePeriodNight,
    /// Current 2.0TD, peninsular windows
    ThreePeriodStandard,
    /// Current 2.0TD with Ceuta/Melilla windows and price series
    ThreePeriodCeutaMelilla,
}

impl TariffScheme {
    /// Tariff code as it appears on a contract
    pub fn code(self) -> &'static str {
        match self {
            TariffScheme::Auto => "auto",
            TariffScheme::SinglePeriod => "2.0A",
            TariffScheme::TwoPeriodNight => "2.0DHA",
            TariffScheme::ThreePeriodNight => "2.0DHS",
            TariffScheme::ThreePeriodStandard => "2.0TD",
            TariffScheme::ThreePeriodCeutaMelilla => "2.0TD (Ceuta/Melilla)",
        }
    }

    /// Whether this scheme belongs to the post-cutover family
    ///
    /// `Auto` has no era of its own; it is resolved per date before this
    /// question is ever asked.
    pub fn is_post_cutover_scheme(self) -> bool {
        matches!(
            self,
            TariffScheme::ThreePeriodStandard | TariffScheme::ThreePeriodCeutaMelilla
        )
    }
}

impl std::str::FromStr for TariffScheme {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(TariffScheme::Auto),
            "2.0a" | "20a" => Ok(TariffScheme::SinglePeriod),
            "2.0dha" | "20dha" => Ok(TariffScheme::TwoPeriodNight),
            "2.0dhs" | "20dhs" => Ok(TariffScheme::ThreePeriodNight),
            "2.0td" | "20td" => Ok(TariffScheme::ThreePeriodStandard),
            other => Err(format!(
                "unknown tariff scheme '{other}', expected auto, 2.0A, 2.0DHA, 2.0DHS or 2.0TD"
            )),
        }
    }
}

/// Billing time-band under a multi-period scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Period {
    /// Peak
    P1,
    /// Shoulder
    P2,
    /// Off-peak
    P3,
}

impl Period {
    pub const ALL: [Period; 3] = [Period::P1, Period::P2, Period::P3];

    /// Stable index for fixed-size per-period storage
    pub fn index(self) -> usize {
        match self {
            Period::P1 => 0,
            Period::P2 => 1,
            Period::P3 => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Period::P1 => "P1 (peak)",
            Period::P2 => "P2 (shoulder)",
            Period::P3 => "P3 (off-peak)",
        }
    }
}

/// Named hourly price series published in the ESIOS archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceSeries {
    /// 2.0TD, peninsula / Canarias / Baleares
    Pcb,
    /// 2.0TD, Ceuta / Melilla
    Cym,
    /// Legacy 2.0A general
    Gen,
    /// Legacy 2.0DHA night discount
    Noc,
    /// Legacy 2.0DHS electric vehicle
    Vhc,
}

impl PriceSeries {
    /// Field name inside the archive JSON
    pub fn field(self) -> &'static str {
        match self {
            PriceSeries::Pcb => "PCB",
            PriceSeries::Cym => "CYM",
            PriceSeries::Gen => "GEN",
            PriceSeries::Noc => "NOC",
            PriceSeries::Vhc => "VHC",
        }
    }
}

/// One hour of metered consumption
///
/// `hour` is the internal 0-23 start-of-interval convention; raw export
/// labels (1-24, ending hour) are normalized at ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionRecord {
    pub date: NaiveDate,
    pub hour: u32,
    pub kwh: f64,
}

/// Bono social tier selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubsidyTier {
    /// No subsidy
    None,
    /// Annual consumption cap bucket (0-3)
    Tier(u8),
}

/// Per-period energy line of the invoice
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PeriodEnergy {
    pub period: Period,
    pub kwh: f64,
    pub cost: f64,
}

/// Components of the contracted-power charge
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PowerBreakdown {
    /// Peak-power term (legacy single coefficient lands here too)
    pub peak: f64,
    /// Off-peak power term, zero before the cutover
    pub shoulder: f64,
    /// Commercialization margin
    pub margin: f64,
}

impl PowerBreakdown {
    pub fn total(&self) -> f64 {
        self.peak + self.shoulder + self.margin
    }
}

/// The itemized billing result
///
/// Immutable once produced; every monetary field is already rounded to
/// 2 decimals per the settlement convention.
#[derive(Debug, Clone, Serialize)]
pub struct Invoice {
    /// Number of distinct calendar dates billed
    pub billing_days: u32,
    pub total_kwh: f64,
    /// Populated periods only; single-period schemes carry one entry
    pub energy_by_period: Vec<PeriodEnergy>,
    pub energy_subtotal: f64,
    pub power: PowerBreakdown,
    pub power_subtotal: f64,
    /// Bono social discount, zero when no tier applies
    pub subsidy_discount: f64,
    pub taxable_subtotal: f64,
    pub electricity_tax: f64,
    pub meter_rental: f64,
    pub pre_vat_total: f64,
    /// Arithmetic mean of the per-date VAT rate
    pub vat_rate: f64,
    pub vat_amount: f64,
    pub grand_total: f64,
}

/// Structured engine diagnostics
///
/// Returned alongside the invoice so the caller can render or discard
/// them; they never influence the computed amounts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Diagnostic {
    /// Requested scheme belongs to the wrong regulatory era for a date;
    /// the era default was billed instead
    SchemeEraMismatch {
        date: NaiveDate,
        requested: TariffScheme,
        substituted: TariffScheme,
    },
    /// A day of prices was resolved from the remote archive (cache miss)
    PriceDayFetched { date: NaiveDate, series: PriceSeries },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_parses_contract_codes() {
        assert_eq!("auto".parse::<TariffScheme>(), Ok(TariffScheme::Auto));
        assert_eq!("2.0A".parse::<TariffScheme>(), Ok(TariffScheme::SinglePeriod));
        assert_eq!("2.0dha".parse::<TariffScheme>(), Ok(TariffScheme::TwoPeriodNight));
        assert_eq!("2.0DHS".parse::<TariffScheme>(), Ok(TariffScheme::ThreePeriodNight));
        assert_eq!("2.0td".parse::<TariffScheme>(), Ok(TariffScheme::ThreePeriodStandard));
        assert!("3.0TD".parse::<TariffScheme>().is_err());
    }

    #[test]
    fn scheme_era_families() {
        assert!(TariffScheme::ThreePeriodStandard.is_post_cutover_scheme());
        assert!(TariffScheme::ThreePeriodCeutaMelilla.is_post_cutover_scheme());
        assert!(!TariffScheme::SinglePeriod.is_post_cutover_scheme());
        assert!(!TariffScheme::TwoPeriodNight.is_post_cutover_scheme());
        assert!(!TariffScheme::ThreePeriodNight.is_post_cutover_scheme());
    }

    #[test]
    fn period_indices_are_distinct() {
        let mut seen = [false; 3];
        for p in Period::ALL {
            assert!(!seen[p.index()]);
            seen[p.index()] = true;
        }
    }
}
