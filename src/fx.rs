// 💱 FX Rate Table - dated rates for normalization-time conversion
//
// Keyed by (from, to, basis, as_of). Spot rates are taken at period end for
// balance-sheet lines; average rates cover the reporting window for
// income-statement lines. There is no "latest rate" fallback: a missing key
// fails the record.

use crate::entities::{Currency, Frequency, ReportingPeriod, StatementKind};
use crate::error::NormalizeError;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

// ============================================================================
// RATE BASIS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RateBasis {
    /// Closing rate on the as-of date
    Spot,
    /// Average over the reporting window ending on the as-of date
    Average(WindowKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WindowKind {
    Quarter,
    Half,
    Year,
}

impl From<Frequency> for WindowKind {
    fn from(f: Frequency) -> Self {
        match f {
            Frequency::Quarterly => WindowKind::Quarter,
            Frequency::SemiAnnual => WindowKind::Half,
            Frequency::Annual => WindowKind::Year,
        }
    }
}

impl RateBasis {
    /// Basis a metric converts at for a period. Ratios have none.
    pub fn for_metric(kind: StatementKind, period: &ReportingPeriod) -> Option<RateBasis> {
        match kind {
            StatementKind::BalanceSheet => Some(RateBasis::Spot),
            StatementKind::IncomeStatement => Some(RateBasis::Average(period.frequency().into())),
            StatementKind::Ratio => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RateBasis::Spot => "spot",
            RateBasis::Average(WindowKind::Quarter) => "average-quarter",
            RateBasis::Average(WindowKind::Half) => "average-half",
            RateBasis::Average(WindowKind::Year) => "average-year",
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            RateBasis::Spot => "period-end spot rate",
            RateBasis::Average(_) => "period-average rate",
        }
    }
}

impl fmt::Display for RateBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RateBasis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "spot" => Ok(RateBasis::Spot),
            "average-quarter" => Ok(RateBasis::Average(WindowKind::Quarter)),
            "average-half" => Ok(RateBasis::Average(WindowKind::Half)),
            "average-year" => Ok(RateBasis::Average(WindowKind::Year)),
            other => Err(format!("Unknown rate basis: {}", other)),
        }
    }
}

impl TryFrom<String> for RateBasis {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RateBasis> for String {
    fn from(basis: RateBasis) -> Self {
        basis.as_str().to_string()
    }
}

// ============================================================================
// RATE TABLE
// ============================================================================

/// One row of the rate table (CSV shape)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FxRate {
    pub from: Currency,
    pub to: Currency,
    pub basis: RateBasis,
    pub as_of: NaiveDate,
    pub rate: Decimal,
}

type RateKey = (Currency, Currency, RateBasis, NaiveDate);

#[derive(Debug, Clone, Default)]
pub struct RateTable {
    rates: BTreeMap<RateKey, Decimal>,
}

impl RateTable {
    pub fn new() -> Self {
        RateTable { rates: BTreeMap::new() }
    }

    pub fn from_rates(rates: Vec<FxRate>) -> Self {
        let mut table = RateTable::new();
        for rate in rates {
            table.insert(rate);
        }
        table
    }

    /// Load rates from CSV with header `from,to,basis,as_of,rate`
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())
            .with_context(|| format!("Failed to open FX rate file: {:?}", path.as_ref()))?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::Reader::from_reader(reader);
        let mut rates = Vec::new();

        for (line, result) in rdr.deserialize().enumerate() {
            let rate: FxRate =
                result.with_context(|| format!("Failed to deserialize FX rate on row {}", line + 1))?;
            rates.push(rate);
        }

        Ok(Self::from_rates(rates))
    }

    /// USD/HKD rates for the periods the peer comparison covers
    pub fn hong_kong_default() -> Self {
        let row = |basis: RateBasis, (y, m, d): (i32, u32, u32), rate: Decimal| FxRate {
            from: Currency::USD,
            to: Currency::HKD,
            basis,
            as_of: NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MIN),
            rate,
        };
        let half = RateBasis::Average(WindowKind::Half);
        let year = RateBasis::Average(WindowKind::Year);

        Self::from_rates(vec![
            row(RateBasis::Spot, (2024, 6, 30), Decimal::new(78080, 4)),
            row(RateBasis::Spot, (2024, 12, 31), Decimal::new(77680, 4)),
            row(RateBasis::Spot, (2025, 6, 30), Decimal::new(78500, 4)),
            row(half, (2024, 6, 30), Decimal::new(78190, 4)),
            row(half, (2024, 12, 31), Decimal::new(77910, 4)),
            row(half, (2025, 6, 30), Decimal::new(78020, 4)),
            row(year, (2024, 12, 31), Decimal::new(78040, 4)),
        ])
    }

    pub fn insert(&mut self, rate: FxRate) {
        self.rates
            .insert((rate.from, rate.to, rate.basis, rate.as_of), rate.rate);
    }

    /// Exact lookup. Same-currency pairs are always 1.
    pub fn rate(
        &self,
        from: Currency,
        to: Currency,
        basis: RateBasis,
        as_of: NaiveDate,
    ) -> Result<Decimal, NormalizeError> {
        if from == to {
            return Ok(Decimal::ONE);
        }

        self.rates
            .get(&(from, to, basis, as_of))
            .copied()
            .ok_or(NormalizeError::MissingRate {
                from,
                to,
                kind: basis.as_str(),
                as_of,
            })
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    pub fn rows(&self) -> Vec<FxRate> {
        self.rates
            .iter()
            .map(|(&(from, to, basis, as_of), &rate)| FxRate {
                from,
                to,
                basis,
                as_of,
                rate,
            })
            .collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_same_currency_is_identity() {
        let table = RateTable::new();
        let rate = table
            .rate(Currency::HKD, Currency::HKD, RateBasis::Spot, date(2025, 6, 30))
            .unwrap();
        assert_eq!(rate, Decimal::ONE);
    }

    #[test]
    fn test_spot_and_average_are_distinct_keys() {
        let table = RateTable::hong_kong_default();
        let spot = table
            .rate(Currency::USD, Currency::HKD, RateBasis::Spot, date(2025, 6, 30))
            .unwrap();
        let avg = table
            .rate(
                Currency::USD,
                Currency::HKD,
                RateBasis::Average(WindowKind::Half),
                date(2025, 6, 30),
            )
            .unwrap();
        assert_eq!(spot, "7.85".parse::<Decimal>().unwrap());
        assert_eq!(avg, "7.802".parse::<Decimal>().unwrap());
    }

    #[test]
    fn test_missing_rate_is_an_error() {
        let table = RateTable::hong_kong_default();
        let err = table
            .rate(Currency::USD, Currency::HKD, RateBasis::Spot, date(2023, 6, 30))
            .unwrap_err();
        assert!(matches!(err, NormalizeError::MissingRate { .. }));

        // No inverse derivation
        assert!(table
            .rate(Currency::HKD, Currency::USD, RateBasis::Spot, date(2025, 6, 30))
            .is_err());
    }

    #[test]
    fn test_basis_for_metric_kind() {
        let h1: ReportingPeriod = "2025 1H".parse().unwrap();
        let fy: ReportingPeriod = "2024 FY".parse().unwrap();

        assert_eq!(RateBasis::for_metric(StatementKind::BalanceSheet, &h1), Some(RateBasis::Spot));
        assert_eq!(
            RateBasis::for_metric(StatementKind::IncomeStatement, &h1),
            Some(RateBasis::Average(WindowKind::Half))
        );
        assert_eq!(
            RateBasis::for_metric(StatementKind::IncomeStatement, &fy),
            Some(RateBasis::Average(WindowKind::Year))
        );
        assert_eq!(RateBasis::for_metric(StatementKind::Ratio, &h1), None);
    }

    #[test]
    fn test_shipped_csv_matches_built_in_defaults() {
        let csv = include_str!("../config/fx_rates.csv");
        let loaded = RateTable::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(loaded.rows(), RateTable::hong_kong_default().rows());
    }

    #[test]
    fn test_bad_csv_row_reports_context() {
        let csv = "from,to,basis,as_of,rate\nUSD,HKD,weekly,2025-06-30,7.8\n";
        let err = RateTable::from_reader(csv.as_bytes()).unwrap_err();
        assert!(format!("{:#}", err).contains("row 1"));
    }
}
