//! Tariff-period classification
//!
//! Maps a (scheme, date, hour) triple to its billing period and picks
//! the price series the scheme settles against. Hours use the internal
//! 0-23 start-of-interval convention throughout.

use crate::calendar;
use crate::core::{Diagnostic, Error, Period, PriceSeries, Result, TariffScheme};
use chrono::NaiveDate;

/// Classifies hours into billing periods under the active scheme
///
/// Owns the holiday list and the region flag for the whole billing run;
/// everything else is a pure function of its inputs.
pub struct TariffClassifier {
    holidays: Vec<NaiveDate>,
    ceuta_melilla: bool,
}

impl TariffClassifier {
    pub fn new(holidays: Vec<NaiveDate>, ceuta_melilla: bool) -> Self {
        Self {
            holidays,
            ceuta_melilla,
        }
    }

    /// Era-appropriate default scheme for a date
    pub fn default_for(&self, date: NaiveDate) -> TariffScheme {
        if calendar::is_post_cutover(date) {
            if self.ceuta_melilla {
                TariffScheme::ThreePeriodCeutaMelilla
            } else {
                TariffScheme::ThreePeriodStandard
            }
        } else {
            TariffScheme::SinglePeriod
        }
    }

    /// Resolve the scheme actually billed on a date
    ///
    /// `Auto` picks the era default silently. An explicit scheme from
    /// the wrong era is substituted by the era default and recorded as
    /// a diagnostic; the run continues.
    pub fn resolve(
        &self,
        requested: TariffScheme,
        date: NaiveDate,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> TariffScheme {
        match requested {
            TariffScheme::Auto => self.default_for(date),
            scheme if scheme.is_post_cutover_scheme() != calendar::is_post_cutover(date) => {
                let substituted = self.default_for(date);
                log::warn!(
                    "scheme {} is not valid on {}, billing {} instead",
                    scheme.code(),
                    date,
                    substituted.code()
                );
                diagnostics.push(Diagnostic::SchemeEraMismatch {
                    date,
                    requested: scheme,
                    substituted,
                });
                substituted
            }
            scheme => scheme,
        }
    }

    /// Price series a resolved scheme settles against
    pub fn series(&self, scheme: TariffScheme, date: NaiveDate) -> PriceSeries {
        match scheme {
            TariffScheme::Auto => self.series(self.default_for(date), date),
            TariffScheme::ThreePeriodStandard => PriceSeries::Pcb,
            TariffScheme::ThreePeriodCeutaMelilla => PriceSeries::Cym,
            TariffScheme::SinglePeriod => PriceSeries::Gen,
            TariffScheme::TwoPeriodNight => PriceSeries::Noc,
            TariffScheme::ThreePeriodNight => PriceSeries::Vhc,
        }
    }

    /// Billing period for one hour under a resolved scheme
    pub fn classify(&self, scheme: TariffScheme, date: NaiveDate, hour: u32) -> Result<Period> {
        if hour > 23 {
            return Err(Error::InvalidHour(hour));
        }
        let period = match scheme {
            TariffScheme::Auto => return self.classify(self.default_for(date), date, hour),
            TariffScheme::ThreePeriodStandard | TariffScheme::ThreePeriodCeutaMelilla => {
                self.classify_td(scheme, date, hour)
            }
            TariffScheme::SinglePeriod => Period::P1,
            TariffScheme::TwoPeriodNight => {
                // Evening window shifts one hour during summer time
                let (start, end) = if calendar::is_dst(date) { (13, 22) } else { (12, 21) };
                if (start..=end).contains(&hour) {
                    Period::P1
                } else {
                    Period::P3
                }
            }
            TariffScheme::ThreePeriodNight => {
                if (13..=22).contains(&hour) {
                    Period::P1
                } else if (1..=6).contains(&hour) {
                    Period::P3
                } else {
                    // 7-12, 23 and the wrap-around hour 0
                    Period::P2
                }
            }
        };
        Ok(period)
    }

    fn classify_td(&self, scheme: TariffScheme, date: NaiveDate, hour: u32) -> Period {
        if hour <= 8 || calendar::is_off_peak_day(date, &self.holidays) {
            return Period::P3;
        }
        // Ceuta/Melilla runs the same shape one hour later
        let shift = if scheme == TariffScheme::ThreePeriodCeutaMelilla { 1 } else { 0 };
        let peak_morning = (10 + shift)..=(13 + shift);
        let peak_evening = (18 + shift)..=(21 + shift);
        if peak_morning.contains(&hour) || peak_evening.contains(&hour) {
            Period::P1
        } else {
            Period::P2
        }
    }
}
