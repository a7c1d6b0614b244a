//! Console rendering of the invoice and the optional statistics
//!
//! Monetary lines print with 2 decimals, per-kWh prices with 6, and the
//! VAT percentage displays rounded to the nearest whole percent.

use crate::billing::ConsumptionStats;
use crate::core::Invoice;
use chrono::Weekday;

const WIDTH: usize = 46;

/// Print the itemized invoice
pub fn print_invoice(invoice: &Invoice) {
    println!("{}", "-".repeat(WIDTH));
    println!("  Billing days: {}    Energy: {:.3} kWh", invoice.billing_days, invoice.total_kwh);
    println!("{}", "-".repeat(WIDTH));

    for line in &invoice.energy_by_period {
        let avg = if line.kwh > 0.0 { line.cost / line.kwh } else { 0.0 };
        println!(
            "  {:<16} {:>9.3} kWh  @{:.6}  {:>8.2}",
            line.period.label(),
            line.kwh,
            avg,
            line.cost
        );
    }

    println!("  Energy subtotal{:>26.2}", invoice.energy_subtotal);
    println!("  Power term{:>31.2}", invoice.power_subtotal);
    if invoice.subsidy_discount > 0.0 {
        println!("  Bono social discount{:>21.2}", -invoice.subsidy_discount);
    }
    println!("  Subtotal{:>33.2}", invoice.taxable_subtotal);
    println!("  Electricity tax{:>26.2}", invoice.electricity_tax);
    println!("  Meter rental{:>29.2}", invoice.meter_rental);
    println!("  Total before VAT{:>25.2}", invoice.pre_vat_total);
    println!(
        "  VAT ({}%){:>32.2}",
        (invoice.vat_rate * 100.0).round() as i64,
        invoice.vat_amount
    );
    println!("{}", "-".repeat(WIDTH));
    println!("  TOTAL{:>36.2}", invoice.grand_total);
    println!("{}", "-".repeat(WIDTH));
}

/// Print per-day and per-weekday consumption tables
pub fn print_stats(stats: &ConsumptionStats) {
    println!();
    println!("  Consumption by day");
    for (date, kwh) in &stats.kwh_by_date {
        println!("    {}  {:>8.3} kWh", date, kwh);
    }

    println!();
    println!("  Consumption by weekday");
    let weekdays = [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ];
    for (index, weekday) in weekdays.iter().enumerate() {
        let kwh = stats.kwh_by_weekday[index];
        if kwh > 0.0 {
            println!("    {:<9} {:>8.3} kWh", weekday, kwh);
        }
    }
}
