//! Meter-export ingestion
//!
//! Distributor exports are semicolon-delimited CSV with a header row
//! and at least four columns: supply-point identifier (ignored), date
//! as `D/M/YY`, hour as an ending-hour label 1-24, and kWh with a
//! decimal comma. Hours are normalized here to the internal 0-23
//! start-of-interval convention (label 24 becomes hour 23 of the same
//! date), so nothing downstream ever sees the raw labels.

use crate::core::{ConsumptionRecord, Error, Result};
use chrono::NaiveDate;
use csv::ReaderBuilder;
use std::io::Read;
use std::path::Path;

/// Read a consumption export from a file
pub fn read_consumption<P: AsRef<Path>>(path: P) -> Result<Vec<ConsumptionRecord>> {
    let path = path.as_ref();
    log::info!("reading consumption export {}", path.display());
    let file = std::fs::File::open(path)?;
    read_consumption_from(file)
}

/// Read a consumption export from any reader
pub fn read_consumption_from<R: Read>(reader: R) -> Result<Vec<ConsumptionRecord>> {
    let mut csv_reader = ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut records = Vec::new();
    for row in csv_reader.records() {
        let row = row?;
        if row.len() < 4 {
            return Err(Error::MalformedRow(format!(
                "expected at least 4 fields, got {}",
                row.len()
            )));
        }
        records.push(ConsumptionRecord {
            date: parse_date(&row[1])?,
            hour: parse_hour(&row[2])?,
            kwh: parse_kwh(&row[3])?,
        });
    }
    log::debug!("parsed {} consumption records", records.len());
    Ok(records)
}

/// Parse a `D/M/YY` export date
pub fn parse_date(field: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(field.trim(), "%d/%m/%y")
        .map_err(|_| Error::InvalidDate(field.to_string()))
}

/// Normalize an ending-hour label (1-24) to the internal 0-23 hour
pub fn parse_hour(field: &str) -> Result<u32> {
    let label: u32 = field
        .trim()
        .parse()
        .map_err(|_| Error::MalformedRow(format!("unparsable hour '{}'", field)))?;
    if (1..=24).contains(&label) {
        Ok(label - 1)
    } else {
        Err(Error::InvalidHour(label))
    }
}

fn parse_kwh(field: &str) -> Result<f64> {
    let kwh: f64 = field
        .trim()
        .replace(',', ".")
        .parse()
        .map_err(|_| Error::MalformedRow(format!("unparsable consumption '{}'", field)))?;
    if kwh < 0.0 {
        return Err(Error::MalformedRow(format!(
            "negative consumption '{}'",
            field
        )));
    }
    Ok(kwh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const HEADER: &str = "CUPS;Fecha;Hora;Consumo_kWh;Metodo_obtencion\n";

    fn read(body: &str) -> Result<Vec<ConsumptionRecord>> {
        read_consumption_from(Cursor::new(format!("{}{}", HEADER, body)))
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn parses_export_rows() {
        let records = read("ES0021X;1/7/21;1;0,325;R\nES0021X;1/7/21;2;0,207;R\n").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].date, d(2021, 7, 1));
        assert_eq!(records[0].hour, 0);
        assert!((records[0].kwh - 0.325).abs() < 1e-12);
        assert_eq!(records[1].hour, 1);
    }

    #[test]
    fn hour_label_24_becomes_23_of_the_same_date() {
        let records = read("ES0021X;1/7/21;24;1,000;R\n").unwrap();
        assert_eq!(records[0].date, d(2021, 7, 1));
        assert_eq!(records[0].hour, 23);
    }

    #[test]
    fn hour_label_out_of_range_is_rejected() {
        assert!(matches!(
            read("ES0021X;1/7/21;0;1,0;R\n").unwrap_err(),
            Error::InvalidHour(0)
        ));
        assert!(matches!(
            read("ES0021X;1/7/21;25;1,0;R\n").unwrap_err(),
            Error::InvalidHour(25)
        ));
    }

    #[test]
    fn malformed_date_fails_before_any_price_lookup() {
        let err = read("ES0021X;31/13/21;1;1,0;R\n").unwrap_err();
        assert!(matches!(err, Error::InvalidDate(ref s) if s == "31/13/21"));
    }

    #[test]
    fn negative_or_garbled_consumption_is_rejected() {
        assert!(matches!(
            read("ES0021X;1/7/21;1;-0,5;R\n").unwrap_err(),
            Error::MalformedRow(_)
        ));
        assert!(matches!(
            read("ES0021X;1/7/21;1;n/a;R\n").unwrap_err(),
            Error::MalformedRow(_)
        ));
    }

    #[test]
    fn short_rows_are_rejected() {
        assert!(matches!(
            read("ES0021X;1/7/21;1\n").unwrap_err(),
            Error::MalformedRow(_)
        ));
    }

    #[test]
    fn two_digit_years_resolve_to_the_current_century() {
        assert_eq!(parse_date("31/12/20").unwrap(), d(2020, 12, 31));
        assert_eq!(parse_date("01/01/22").unwrap(), d(2022, 1, 1));
    }
}
