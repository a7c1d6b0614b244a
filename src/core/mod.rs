//! Core module - configuration, errors, and domain types

mod config;
mod error;
mod types;

pub use config::{BillingConfig, CalendarConfig, Config, PowerTermConfig, PriceSourceConfig, SubsidyConfig};
pub use error::{Error, Result};
pub use types::{
    ConsumptionRecord, Diagnostic, Invoice, Period, PeriodEnergy, PowerBreakdown, PriceSeries,
    SubsidyTier, TariffScheme,
};
