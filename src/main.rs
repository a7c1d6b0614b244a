//! pvpc-billing - Main entry point
//!
//! Verify a PVPC electricity bill from an hourly smart-meter export:
//! fetch the day's reference prices, classify every hour into its
//! tariff period and print the itemized invoice.

use anyhow::{anyhow, Context};
use clap::Parser;
use pvpc_billing::billing::{BillingEngine, BillingParams};
use pvpc_billing::core::{Config, SubsidyTier, TariffScheme};
use pvpc_billing::prices::{EsiosClient, PriceCache};
use pvpc_billing::{ingest, report};
use std::path::PathBuf;

/// Compute a PVPC invoice from an hourly consumption export
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Hourly consumption CSV exported by the distributor
    consumption: PathBuf,

    /// Contracted peak power in kW
    #[arg(short = 'p', long, default_value_t = 4.6)]
    power: f64,

    /// Contracted off-peak power in kW (defaults to --power)
    #[arg(long)]
    power_valley: Option<f64>,

    /// Tariff scheme: auto, 2.0A, 2.0DHA, 2.0DHS or 2.0TD
    #[arg(short, long, default_value = "auto")]
    scheme: String,

    /// Bill with the Ceuta/Melilla windows and price series
    #[arg(long)]
    ceuta_melilla: bool,

    /// Bono social consumption cap tier (0-3)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=3))]
    subsidy: Option<u8>,

    /// Severe-vulnerability discount rate (40% instead of 25%)
    #[arg(long, requires = "subsidy")]
    severe: bool,

    /// Print per-day and per-weekday consumption tables
    #[arg(long)]
    stats: bool,

    /// Alternative configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::load().context("loading configuration")?,
    };

    let mut scheme: TariffScheme = args
        .scheme
        .parse()
        .map_err(|e: String| anyhow!(e))?;
    if scheme == TariffScheme::ThreePeriodStandard && args.ceuta_melilla {
        scheme = TariffScheme::ThreePeriodCeutaMelilla;
    }

    let records = ingest::read_consumption(&args.consumption)
        .with_context(|| format!("reading {}", args.consumption.display()))?;

    let source = EsiosClient::new(&config.prices)?;
    let cache = PriceCache::new(Box::new(source), config.prices.cache_dir()?)?;

    let params = BillingParams {
        scheme,
        peak_power_kw: args.power,
        offpeak_power_kw: args.power_valley,
        subsidy: match args.subsidy {
            Some(tier) => SubsidyTier::Tier(tier),
            None => SubsidyTier::None,
        },
        severe: args.severe,
        ceuta_melilla: args.ceuta_melilla,
    };

    let mut engine = BillingEngine::new(&config, params, cache);
    let outcome = engine.compute(&records).context("computing invoice")?;

    report::print_invoice(&outcome.invoice);
    if args.stats {
        report::print_stats(&outcome.stats);
    }

    Ok(())
}
