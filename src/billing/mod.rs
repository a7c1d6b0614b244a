//! Billing engine
//!
//! Turns classified hourly consumption into an itemized invoice:
//! per-period energy costs, the contracted-power charge, the bono
//! social discount, the electricity tax, meter rental and VAT.
//!
//! Rounding follows the settlement convention of the published
//! invoices: each hourly price is rounded to 6 decimals before
//! multiplication, every monetary line to 2 decimals at its final sum.

use crate::calendar;
use crate::core::{
    BillingConfig, Config, ConsumptionRecord, Diagnostic, Error, Invoice, Period, PeriodEnergy,
    PowerBreakdown, PowerTermConfig, Result, SubsidyConfig, SubsidyTier, TariffScheme,
};
use crate::prices::{DayPrices, PriceCache};
use crate::tariff::TariffClassifier;
use chrono::{Datelike, NaiveDate};
use std::collections::{BTreeMap, HashMap};

/// Per-run billing parameters from the contract
#[derive(Debug, Clone)]
pub struct BillingParams {
    pub scheme: TariffScheme,
    /// Contracted peak power, kW
    pub peak_power_kw: f64,
    /// Contracted off-peak power, kW; defaults to peak when None
    pub offpeak_power_kw: Option<f64>,
    pub subsidy: SubsidyTier,
    /// Severe-vulnerability rate instead of the standard one
    pub severe: bool,
    pub ceuta_melilla: bool,
}

/// Running kWh/cost sums for one period
#[derive(Debug, Clone, Copy, Default)]
pub struct PeriodAccumulator {
    pub kwh: f64,
    pub cost: f64,
}

/// Fixed-size accumulator set indexed by `Period`
#[derive(Debug, Clone, Default)]
pub struct PeriodTotals([PeriodAccumulator; 3]);

impl PeriodTotals {
    fn add(&mut self, period: Period, kwh: f64, cost: f64) {
        let acc = &mut self.0[period.index()];
        acc.kwh += kwh;
        acc.cost += cost;
    }

    pub fn get(&self, period: Period) -> PeriodAccumulator {
        self.0[period.index()]
    }

    pub fn total_kwh(&self) -> f64 {
        self.0.iter().map(|a| a.kwh).sum()
    }

    pub fn total_cost(&self) -> f64 {
        self.0.iter().map(|a| a.cost).sum()
    }
}

/// Auxiliary consumption aggregates for reporting; not financial data
#[derive(Debug, Clone, Default)]
pub struct ConsumptionStats {
    pub kwh_by_date: BTreeMap<NaiveDate, f64>,
    /// Indexed Monday = 0 .. Sunday = 6
    pub kwh_by_weekday: [f64; 7],
}

impl ConsumptionStats {
    fn add(&mut self, date: NaiveDate, kwh: f64) {
        *self.kwh_by_date.entry(date).or_insert(0.0) += kwh;
        self.kwh_by_weekday[date.weekday().num_days_from_monday() as usize] += kwh;
    }
}

/// Everything a billing run produces
#[derive(Debug)]
pub struct BillingOutcome {
    pub invoice: Invoice,
    pub stats: ConsumptionStats,
    pub diagnostics: Vec<Diagnostic>,
}

/// The billing engine for one run
pub struct BillingEngine {
    config: Config,
    params: BillingParams,
    cache: PriceCache,
    classifier: TariffClassifier,
}

impl BillingEngine {
    pub fn new(config: &Config, params: BillingParams, cache: PriceCache) -> Self {
        let classifier =
            TariffClassifier::new(config.calendar.holidays.clone(), params.ceuta_melilla);
        Self {
            config: config.clone(),
            params,
            cache,
            classifier,
        }
    }

    /// Compute the invoice for a consumption export
    ///
    /// Fatal on any missing price or out-of-range hour; a scheme/era
    /// mismatch only surfaces in the returned diagnostics.
    pub fn compute(&mut self, records: &[ConsumptionRecord]) -> Result<BillingOutcome> {
        if records.is_empty() {
            return Err(Error::EmptyExport);
        }

        let mut diagnostics = Vec::new();

        // One resolution and one price fetch per distinct date
        let mut dates: Vec<NaiveDate> = records.iter().map(|r| r.date).collect();
        dates.sort_unstable();
        dates.dedup();

        let mut resolved: HashMap<NaiveDate, TariffScheme> = HashMap::new();
        let mut prices: HashMap<NaiveDate, DayPrices> = HashMap::new();
        for &date in &dates {
            let scheme = self
                .classifier
                .resolve(self.params.scheme, date, &mut diagnostics);
            let series = self.classifier.series(scheme, date);
            let day = self.cache.day_prices(date, series, &mut diagnostics)?;
            resolved.insert(date, scheme);
            prices.insert(date, day);
        }

        let mut totals = PeriodTotals::default();
        let mut stats = ConsumptionStats::default();
        for record in records {
            let price = prices
                .get(&record.date)
                .and_then(|day| day.get(&record.hour))
                .copied()
                .ok_or(Error::PriceMissing {
                    date: record.date,
                    hour: record.hour,
                })?;
            let price = round6(price);
            let scheme = resolved
                .get(&record.date)
                .copied()
                .unwrap_or(self.params.scheme);
            let period = self.classifier.classify(scheme, record.date, record.hour)?;
            totals.add(period, record.kwh, price * record.kwh);
            stats.add(record.date, record.kwh);
        }

        let billing_days = dates.len() as u32;
        let total_kwh = totals.total_kwh();
        let energy_subtotal = round2(totals.total_cost());

        let power = power_term(
            &self.config.power,
            &dates,
            self.params.peak_power_kw,
            self.params.offpeak_power_kw,
        );
        let power_subtotal = round2(power.total());

        let subsidy_discount = subsidy_discount(
            &self.config.subsidy,
            self.params.subsidy,
            self.params.severe,
            billing_days,
            power_subtotal,
            energy_subtotal,
            total_kwh,
        )?;

        let taxable_subtotal = round2(power_subtotal + energy_subtotal - subsidy_discount);
        let electricity_tax = round2(taxable_subtotal * self.config.billing.electricity_tax_rate);
        let meter_rental =
            round2(self.config.billing.meter_rental_per_year * f64::from(billing_days) / 365.0);
        let pre_vat_total = round2(taxable_subtotal + electricity_tax + meter_rental);

        let vat_rate = effective_vat_rate(&self.config.billing, &dates);
        let vat_amount = round2(pre_vat_total * vat_rate);
        let grand_total = round2(pre_vat_total + vat_amount);

        let energy_by_period = Period::ALL
            .iter()
            .map(|&p| (p, totals.get(p)))
            .filter(|(_, acc)| acc.kwh > 0.0 || acc.cost > 0.0)
            .map(|(period, acc)| PeriodEnergy {
                period,
                kwh: acc.kwh,
                cost: acc.cost,
            })
            .collect();

        let invoice = Invoice {
            billing_days,
            total_kwh,
            energy_by_period,
            energy_subtotal,
            power,
            power_subtotal,
            subsidy_discount,
            taxable_subtotal,
            electricity_tax,
            meter_rental,
            pre_vat_total,
            vat_rate,
            vat_amount,
            grand_total,
        };

        Ok(BillingOutcome {
            invoice,
            stats,
            diagnostics,
        })
    }
}

/// Contracted-power charge, re-evaluated per distinct billing date
///
/// Each day contributes its own era's per-kW-year coefficients divided
/// by 365, so a billing period straddling the cutover prices each side
/// correctly.
pub fn power_term(
    config: &PowerTermConfig,
    dates: &[NaiveDate],
    peak_kw: f64,
    offpeak_kw: Option<f64>,
) -> PowerBreakdown {
    let offpeak_kw = offpeak_kw.unwrap_or(peak_kw);
    let mut breakdown = PowerBreakdown::default();
    for &date in dates {
        if calendar::is_post_cutover(date) {
            breakdown.peak += peak_kw * config.peak_per_kw_year / 365.0;
            breakdown.shoulder += offpeak_kw * config.shoulder_per_kw_year / 365.0;
        } else {
            breakdown.peak += peak_kw * config.legacy_per_kw_year / 365.0;
        }
        breakdown.margin += peak_kw * config.margin_per_kw_year / 365.0;
    }
    breakdown
}

/// Bono social discount
///
/// The energy share of the discount is limited by the tier's annual
/// kWh cap, prorated to the billed days; the power share is always
/// fully discounted. Never negative.
pub fn subsidy_discount(
    config: &SubsidyConfig,
    tier: SubsidyTier,
    severe: bool,
    billing_days: u32,
    power_subtotal: f64,
    energy_subtotal: f64,
    total_kwh: f64,
) -> Result<f64> {
    let SubsidyTier::Tier(index) = tier else {
        return Ok(0.0);
    };
    let cap = config
        .annual_caps_kwh
        .get(usize::from(index))
        .copied()
        .ok_or_else(|| Error::Config(format!("subsidy tier {} out of range", index)))?;

    let rate = if severe { config.severe_rate } else { config.standard_rate };
    let prorated_cap = cap * f64::from(billing_days) / 365.0;
    let cap_factor = if total_kwh > 0.0 {
        (prorated_cap / total_kwh).min(1.0)
    } else {
        1.0
    };
    let discount = round2(rate * (power_subtotal + cap_factor * energy_subtotal));
    Ok(if discount > 0.0 { discount } else { 0.0 })
}

/// VAT rate in force on one date
pub fn vat_rate_for(config: &BillingConfig, date: NaiveDate) -> f64 {
    if date >= config.vat_reduced_from && date <= config.vat_reduced_until {
        config.vat_reduced_rate
    } else {
        config.vat_standard_rate
    }
}

/// Arithmetic mean of the per-date VAT rate over the billed dates
pub fn effective_vat_rate(config: &BillingConfig, dates: &[NaiveDate]) -> f64 {
    if dates.is_empty() {
        return config.vat_standard_rate;
    }
    dates.iter().map(|&d| vat_rate_for(config, d)).sum::<f64>() / dates.len() as f64
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub(crate) fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prices::{PriceCache, PriceSource};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    /// Serves every date with a full 24-hour document at a flat price
    struct FlatSource {
        per_mwh: String,
    }

    impl FlatSource {
        fn new(per_mwh: &str) -> Self {
            Self {
                per_mwh: per_mwh.to_string(),
            }
        }
    }

    impl PriceSource for FlatSource {
        fn fetch_day(&self, _date: NaiveDate) -> Result<String> {
            let entries: Vec<String> = (0..24)
                .map(|h| {
                    format!(
                        r#"{{"Hora": "{:02}-{:02}", "PCB": "{p}", "CYM": "{p}", "GEN": "{p}", "NOC": "{p}", "VHC": "{p}"}}"#,
                        h,
                        h + 1,
                        p = self.per_mwh
                    )
                })
                .collect();
            Ok(format!(r#"{{"PVPC": [{}]}}"#, entries.join(",")))
        }
    }

    fn engine(params: BillingParams) -> BillingEngine {
        let cache = PriceCache::ephemeral(Box::new(FlatSource::new("100,00")));
        BillingEngine::new(&Config::default(), params, cache)
    }

    fn default_params() -> BillingParams {
        BillingParams {
            scheme: TariffScheme::ThreePeriodStandard,
            peak_power_kw: 4.6,
            offpeak_power_kw: None,
            subsidy: SubsidyTier::None,
            severe: false,
            ceuta_melilla: false,
        }
    }

    fn full_day(date: NaiveDate, kwh: f64) -> Vec<ConsumptionRecord> {
        (0..24)
            .map(|hour| ConsumptionRecord { date, hour, kwh })
            .collect()
    }

    #[test]
    fn single_day_flat_price_invoice() {
        let mut engine = engine(default_params());
        let outcome = engine.compute(&full_day(d(2021, 7, 1), 1.0)).unwrap();
        let invoice = &outcome.invoice;

        assert_eq!(invoice.billing_days, 1);
        assert!((invoice.total_kwh - 24.0).abs() < 1e-9);
        assert!((invoice.energy_subtotal - 2.40).abs() < 1e-9);

        // One post-cutover day of the power formula at 4.6 kW
        let expected_power = 4.6 * (30.67266 + 1.4243591 + 3.113) / 365.0;
        assert!((invoice.power_subtotal - round2(expected_power)).abs() < 1e-9);
        assert!((invoice.power_subtotal - 0.44).abs() < 1e-9);

        assert!((invoice.subsidy_discount - 0.0).abs() < 1e-9);
        assert!((invoice.taxable_subtotal - 2.84).abs() < 1e-9);
        assert!((invoice.electricity_tax - 0.15).abs() < 1e-9);
        assert!((invoice.meter_rental - 0.03).abs() < 1e-9);
        assert!((invoice.pre_vat_total - 3.02).abs() < 1e-9);

        // 2021-07-01 sits inside the reduced-VAT window
        assert!((invoice.vat_rate - 0.10).abs() < 1e-9);
        assert!((invoice.vat_amount - 0.30).abs() < 1e-9);
        assert!((invoice.grand_total - 3.32).abs() < 1e-9);

        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn period_kwh_sums_to_total() {
        let mut engine = engine(default_params());
        let outcome = engine.compute(&full_day(d(2021, 7, 1), 0.37)).unwrap();
        let by_period: f64 = outcome.invoice.energy_by_period.iter().map(|l| l.kwh).sum();
        assert!((by_period - outcome.invoice.total_kwh).abs() < 1e-9);
        // A 2.0TD working day populates all three bands
        assert_eq!(outcome.invoice.energy_by_period.len(), 3);
    }

    #[test]
    fn weekend_day_is_entirely_off_peak() {
        let mut engine = engine(default_params());
        let outcome = engine.compute(&full_day(d(2021, 7, 3), 1.0)).unwrap();
        assert_eq!(outcome.invoice.energy_by_period.len(), 1);
        assert_eq!(outcome.invoice.energy_by_period[0].period, Period::P3);
    }

    #[test]
    fn subsidy_below_cap_discounts_everything() {
        let mut params = default_params();
        params.subsidy = SubsidyTier::Tier(1);
        let mut engine = engine(params);
        // 2.4 kWh over one day, well under 1932/365
        let outcome = engine.compute(&full_day(d(2021, 7, 1), 0.1)).unwrap();
        let invoice = &outcome.invoice;
        let expected =
            round2(0.25 * (invoice.power_subtotal + invoice.energy_subtotal));
        assert!((invoice.subsidy_discount - expected).abs() < 1e-9);
    }

    #[test]
    fn era_mismatch_is_corrected_not_fatal() {
        let mut params = default_params();
        params.scheme = TariffScheme::TwoPeriodNight;
        let mut engine = engine(params);
        let outcome = engine.compute(&full_day(d(2021, 7, 1), 1.0)).unwrap();
        assert_eq!(
            outcome.diagnostics,
            vec![Diagnostic::SchemeEraMismatch {
                date: d(2021, 7, 1),
                requested: TariffScheme::TwoPeriodNight,
                substituted: TariffScheme::ThreePeriodStandard,
            }]
        );
        // The corrected scheme is what actually classified the hours
        assert_eq!(outcome.invoice.energy_by_period.len(), 3);
    }

    #[test]
    fn missing_hour_price_is_fatal() {
        struct GappySource;
        impl PriceSource for GappySource {
            fn fetch_day(&self, _date: NaiveDate) -> Result<String> {
                Ok(r#"{"PVPC": [{"Hora": "00-01", "PCB": "100,00"}]}"#.to_string())
            }
        }
        let cache = PriceCache::ephemeral(Box::new(GappySource));
        let mut engine = BillingEngine::new(&Config::default(), default_params(), cache);
        let records = vec![ConsumptionRecord {
            date: d(2021, 7, 1),
            hour: 5,
            kwh: 1.0,
        }];
        let err = engine.compute(&records).unwrap_err();
        assert!(matches!(err, Error::PriceMissing { hour: 5, .. }));
    }

    #[test]
    fn empty_export_is_rejected() {
        let mut engine = engine(default_params());
        assert!(matches!(engine.compute(&[]).unwrap_err(), Error::EmptyExport));
    }

    #[test]
    fn stats_track_days_and_weekdays() {
        let mut engine = engine(default_params());
        let mut records = full_day(d(2021, 7, 1), 1.0); // Thursday
        records.extend(full_day(d(2021, 7, 2), 0.5)); // Friday
        let outcome = engine.compute(&records).unwrap();
        assert!((outcome.stats.kwh_by_date[&d(2021, 7, 1)] - 24.0).abs() < 1e-9);
        assert!((outcome.stats.kwh_by_date[&d(2021, 7, 2)] - 12.0).abs() < 1e-9);
        assert!((outcome.stats.kwh_by_weekday[3] - 24.0).abs() < 1e-9);
        assert!((outcome.stats.kwh_by_weekday[4] - 12.0).abs() < 1e-9);
    }

    #[test]
    fn power_term_straddles_the_cutover() {
        let config = PowerTermConfig::default();
        let dates = [d(2021, 5, 31), d(2021, 6, 1)];
        let breakdown = power_term(&config, &dates, 4.6, None);
        let legacy_day = 4.6 * 38.043426 / 365.0;
        let modern_peak = 4.6 * 30.67266 / 365.0;
        let modern_shoulder = 4.6 * 1.4243591 / 365.0;
        let margin = 2.0 * 4.6 * 3.113 / 365.0;
        assert!((breakdown.peak - (legacy_day + modern_peak)).abs() < 1e-9);
        assert!((breakdown.shoulder - modern_shoulder).abs() < 1e-9);
        assert!((breakdown.margin - margin).abs() < 1e-9);
    }

    #[test]
    fn power_term_uses_offpeak_power_when_given() {
        let config = PowerTermConfig::default();
        let dates = [d(2021, 7, 1)];
        let breakdown = power_term(&config, &dates, 4.6, Some(3.45));
        assert!((breakdown.shoulder - 3.45 * 1.4243591 / 365.0).abs() < 1e-9);
        assert!((breakdown.peak - 4.6 * 30.67266 / 365.0).abs() < 1e-9);
    }

    #[test]
    fn discount_is_capped_but_never_shrinks_past_the_cap() {
        let config = SubsidyConfig::default();
        // Full-year proration: cap 1932 kWh
        let below = subsidy_discount(
            &config, SubsidyTier::Tier(1), false, 365, 10.0, 100.0, 1000.0,
        )
        .unwrap();
        let at_double = subsidy_discount(
            &config, SubsidyTier::Tier(1), false, 365, 10.0, 200.0, 3864.0,
        )
        .unwrap();
        assert!((below - round2(0.25 * 110.0)).abs() < 1e-9);
        // Twice the cap with twice the energy cost: the capped discount
        // equals the uncapped one at the cap
        assert!((at_double - below).abs() < 1e-9);
        assert!(at_double >= 0.0);
    }

    #[test]
    fn severe_tier_uses_the_higher_rate() {
        let config = SubsidyConfig::default();
        let standard =
            subsidy_discount(&config, SubsidyTier::Tier(0), false, 365, 10.0, 50.0, 100.0).unwrap();
        let severe =
            subsidy_discount(&config, SubsidyTier::Tier(0), true, 365, 10.0, 50.0, 100.0).unwrap();
        assert!((standard - round2(0.25 * 60.0)).abs() < 1e-9);
        assert!((severe - round2(0.40 * 60.0)).abs() < 1e-9);
    }

    #[test]
    fn unknown_subsidy_tier_is_a_config_error() {
        let config = SubsidyConfig::default();
        let err =
            subsidy_discount(&config, SubsidyTier::Tier(9), false, 30, 1.0, 1.0, 1.0).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn vat_window_boundaries() {
        let config = BillingConfig::default();
        assert!((vat_rate_for(&config, d(2021, 5, 31)) - 0.21).abs() < 1e-12);
        assert!((vat_rate_for(&config, d(2021, 6, 1)) - 0.10).abs() < 1e-12);
        assert!((vat_rate_for(&config, d(2021, 12, 31)) - 0.10).abs() < 1e-12);
        assert!((vat_rate_for(&config, d(2022, 1, 1)) - 0.21).abs() < 1e-12);
    }

    #[test]
    fn effective_vat_is_the_mean_over_dates() {
        let config = BillingConfig::default();
        let dates = [d(2021, 5, 31), d(2021, 6, 1)];
        assert!((effective_vat_rate(&config, &dates) - 0.155).abs() < 1e-12);
    }

    #[test]
    fn two_stage_rounding_matches_published_convention() {
        // Prices round to 6 decimals each, the sum to 2 at the end
        assert!((round6(0.1234564) - 0.123456).abs() < 1e-12);
        assert!((round6(0.1234567) - 0.123457).abs() < 1e-12);
        assert!((round2(2.404) - 2.40).abs() < 1e-12);
        assert!((round2(2.406) - 2.41).abs() < 1e-12);
    }
}
