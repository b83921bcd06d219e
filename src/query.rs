// 🔎 Comparison Layer - period × segment × banks → grid of cited cells
//
// Display conversion happens here and only here: stored points stay in the
// currency of record. Percent values are never converted.

use crate::db::Store;
use crate::entities::metric::{CATALOGUE, UNIT_PERCENT};
use crate::entities::{Bank, Currency, GridSection, ReportingPeriod, StandardizedSegment};
use crate::error::QueryError;
use crate::format::{fixed, grouped};
use crate::model::StandardizedDataPoint;
use crate::reconciliation::{ReconciliationChecker, ReconciliationReport};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// DISPLAY RATES
// ============================================================================

/// Fixed presentation rates from the currency of record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayRates {
    pub base: Currency,
    pub rates: BTreeMap<Currency, Decimal>,
}

impl DisplayRates {
    pub fn new(base: Currency, rates: BTreeMap<Currency, Decimal>) -> Self {
        DisplayRates { base, rates }
    }

    pub fn rate(&self, to: Currency) -> Result<Decimal, QueryError> {
        if to == self.base {
            return Ok(Decimal::ONE);
        }
        self.rates
            .get(&to)
            .copied()
            .ok_or(QueryError::MissingDisplayRate { from: self.base, to })
    }

    /// Currencies the grid can be shown in
    pub fn currencies(&self) -> Vec<Currency> {
        let mut out = vec![self.base];
        out.extend(self.rates.keys().copied().filter(|c| *c != self.base));
        out
    }
}

impl Default for DisplayRates {
    fn default() -> Self {
        DisplayRates {
            base: Currency::HKD,
            rates: BTreeMap::from([
                (Currency::USD, Decimal::new(128, 3)),
                (Currency::GBP, Decimal::new(101, 3)),
            ]),
        }
    }
}

/// "%" → two decimals; monetary → symbol, separators, ≤ 1 decimal, unit; absent → "-"
pub fn format_display(value: Option<Decimal>, unit: &str, currency: Currency) -> String {
    let Some(value) = value else {
        return "-".to_string();
    };

    if unit == UNIT_PERCENT {
        return format!("{}%", fixed(value, 2));
    }

    let body = grouped(value, 1);
    match body.strip_prefix('-') {
        Some(abs) => format!("-{}{}{}", currency.display_symbol(), abs, unit),
        None => format!("{}{}{}", currency.display_symbol(), body, unit),
    }
}

// ============================================================================
// QUERY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonQuery {
    pub period: String,
    pub segment: StandardizedSegment,
    pub banks: Vec<Bank>,
    pub display_currency: Currency,
}

impl ComparisonQuery {
    pub fn new(period: &str, segment: StandardizedSegment, display_currency: Currency) -> Self {
        ComparisonQuery {
            period: period.to_string(),
            segment,
            banks: Bank::ALL.to_vec(),
            display_currency,
        }
    }

    /// Builder: restrict to a set of banks (kept in the standard bank order)
    pub fn with_banks(mut self, banks: &[Bank]) -> Self {
        if !banks.is_empty() {
            self.banks = Bank::ALL.iter().copied().filter(|b| banks.contains(b)).collect();
        }
        self
    }

    /// Add or remove a bank. Removing the last selected bank is refused.
    pub fn toggle_bank(&mut self, bank: Bank) -> bool {
        if self.banks.contains(&bank) {
            if self.banks.len() == 1 {
                return false;
            }
            self.banks.retain(|b| *b != bank);
        } else {
            self.banks.push(bank);
            self.banks.sort();
        }
        true
    }
}

impl Default for ComparisonQuery {
    fn default() -> Self {
        Self::new("2025 1H", StandardizedSegment::Group, Currency::HKD)
    }
}

// ============================================================================
// GRID
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub point_id: String,
    pub record_id: String,
    pub source_document_id: String,
    pub page_number: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    pub bank: Bank,
    /// Value in the display currency
    pub value: Decimal,
    pub display: String,
    pub unit: String,
    pub currency: Currency,
    /// Some step in the audit trail raised a warning
    pub has_warnings: bool,
    pub citation: Citation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridRow {
    pub metric: String,
    pub section: GridSection,
    pub unit: String,
    /// One entry per selected bank, in query order
    pub cells: Vec<Option<GridCell>>,
}

impl GridRow {
    /// Strings exactly as the grid shows them
    pub fn displayed(&self) -> Vec<String> {
        self.cells
            .iter()
            .map(|c| c.as_ref().map_or_else(|| "-".to_string(), |c| c.display.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonGrid {
    pub period: String,
    pub segment: StandardizedSegment,
    pub display_currency: Currency,
    pub banks: Vec<Bank>,
    pub rows: Vec<GridRow>,
}

impl ComparisonGrid {
    /// Build the grid from already-stored points
    pub fn build(
        query: &ComparisonQuery,
        points: &[StandardizedDataPoint],
        rates: &DisplayRates,
    ) -> Result<Self, QueryError> {
        let rate = rates.rate(query.display_currency)?;

        let rows = CATALOGUE
            .iter()
            .map(|def| {
                let cells = query
                    .banks
                    .iter()
                    .map(|bank| {
                        points
                            .iter()
                            .find(|p| {
                                p.bank == *bank
                                    && p.period == query.period
                                    && p.segment == query.segment
                                    && p.metric == def.name
                            })
                            .map(|p| cell_for(p, rate, query.display_currency))
                    })
                    .collect();

                GridRow {
                    metric: def.name.to_string(),
                    section: def.section,
                    unit: def.unit.to_string(),
                    cells,
                }
            })
            .collect();

        Ok(ComparisonGrid {
            period: query.period.clone(),
            segment: query.segment,
            display_currency: query.display_currency,
            banks: query.banks.clone(),
            rows,
        })
    }

    /// Rows grouped under their section headers, in layout order
    pub fn sections(&self) -> Vec<(GridSection, Vec<&GridRow>)> {
        let mut out: Vec<(GridSection, Vec<&GridRow>)> = Vec::new();
        for row in &self.rows {
            match out.last_mut() {
                Some((section, rows)) if *section == row.section => rows.push(row),
                _ => out.push((row.section, vec![row])),
            }
        }
        out
    }

    pub fn filled_cells(&self) -> usize {
        self.rows
            .iter()
            .map(|r| r.cells.iter().filter(|c| c.is_some()).count())
            .sum()
    }
}

fn cell_for(point: &StandardizedDataPoint, rate: Decimal, display_currency: Currency) -> GridCell {
    let value = if point.is_percent() {
        point.value
    } else {
        point.value * rate
    };

    GridCell {
        bank: point.bank,
        value,
        display: format_display(Some(value), &point.unit, display_currency),
        unit: point.unit.clone(),
        currency: display_currency,
        has_warnings: point.has_warnings(),
        citation: Citation {
            point_id: point.id.clone(),
            record_id: point.record_id.clone(),
            source_document_id: point.source_document_id.clone(),
            page_number: point.page_number,
        },
    }
}

// ============================================================================
// STORE-BACKED QUERIES
// ============================================================================

/// Run a comparison against the store
pub fn compare(store: &Store, query: &ComparisonQuery, rates: &DisplayRates) -> Result<ComparisonGrid, QueryError> {
    let period: ReportingPeriod = query
        .period
        .parse()
        .map_err(|_| QueryError::InvalidPeriod {
            raw: query.period.clone(),
        })?;
    let normalized = ComparisonQuery {
        period: period.label(),
        ..query.clone()
    };

    let points = store.points_for(&normalized.period, Some(normalized.segment))?;
    ComparisonGrid::build(&normalized, &points, rates)
}

/// Periods holding data, newest first
pub fn available_periods(store: &Store) -> Result<Vec<String>, QueryError> {
    let mut periods: Vec<ReportingPeriod> = store
        .periods()?
        .iter()
        .filter_map(|p| p.parse().ok())
        .collect();
    periods.sort();
    periods.dedup();
    Ok(periods.into_iter().rev().map(|p| p.label()).collect())
}

/// Reconciliation over one period (canonicalized like `compare`) or the whole store
pub fn reconcile(
    store: &Store,
    period: Option<&str>,
    checker: &ReconciliationChecker,
) -> Result<ReconciliationReport, QueryError> {
    let points = match period {
        Some(raw) => {
            let period: ReportingPeriod = raw.parse().map_err(|_| QueryError::InvalidPeriod {
                raw: raw.to_string(),
            })?;
            store.points_for(&period.label(), None)?
        }
        None => store.points()?,
    };
    Ok(checker.report(&points))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::metric::{CET1_RATIO, NET_INTEREST_INCOME, OPERATING_EXPENSES, TOTAL_LOANS};
    use crate::model::ExtractionRecord;
    use crate::pipeline::NormalizationPipeline;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn create_test_points() -> Vec<StandardizedDataPoint> {
        let pipeline = NormalizationPipeline::hong_kong_default();
        let records = vec![
            ExtractionRecord::new(Bank::BocHk, "2025 1H", NET_INTEREST_INCOME, "Group Total", "25,063", "m", "HKD", "doc-1", 8),
            ExtractionRecord::new(Bank::BocHk, "2025 1H", OPERATING_EXPENSES, "Group Total", "(18,018)", "m", "HKD", "doc-1", 8),
            ExtractionRecord::new(Bank::BocHk, "2025 1H", CET1_RATIO, "Group Total", "23.69", "%", "HKD", "doc-1", 14),
            ExtractionRecord::new(Bank::HangSeng, "2025 1H", TOTAL_LOANS, "Group Total", "803,356", "m", "HKD", "doc-2", 44),
        ];
        pipeline.normalize_batch(&records).points
    }

    #[test]
    fn test_format_display() {
        assert_eq!(format_display(None, "m", Currency::HKD), "-");
        assert_eq!(format_display(Some(d("1.6")), "%", Currency::USD), "1.60%");
        assert_eq!(format_display(Some(d("61214.04")), "m", Currency::HKD), "61,214m");
        assert_eq!(format_display(Some(d("-2306.304")), "m", Currency::USD), "-$2,306.3m");
        assert_eq!(format_display(Some(d("7835.5")), "m", Currency::USD), "$7,835.5m");
    }

    #[test]
    fn test_grid_layout_and_cells() {
        let points = create_test_points();
        let query = ComparisonQuery::default();
        let grid = ComparisonGrid::build(&query, &points, &DisplayRates::default()).unwrap();

        assert_eq!(grid.rows.len(), CATALOGUE.len());
        assert_eq!(grid.banks, Bank::ALL.to_vec());

        let sections = grid.sections();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].0, GridSection::ProfitAndLoss);
        assert_eq!(sections[1].0, GridSection::BalanceSheetAndRatios);

        let nii = grid.rows.iter().find(|r| r.metric == NET_INTEREST_INCOME).unwrap();
        assert_eq!(nii.displayed(), vec!["-", "-", "25,063m", "-"]);
        let cell = nii.cells[2].as_ref().unwrap();
        assert_eq!(cell.citation.page_number, 8);
        assert_eq!(cell.citation.source_document_id, "doc-1");
        assert_eq!(grid.filled_cells(), 4);
    }

    #[test]
    fn test_display_conversion_leaves_percent_alone() {
        let points = create_test_points();
        let query = ComparisonQuery::new("2025 1H", StandardizedSegment::Group, Currency::USD);
        let grid = ComparisonGrid::build(&query, &points, &DisplayRates::default()).unwrap();

        let opex = grid.rows.iter().find(|r| r.metric == OPERATING_EXPENSES).unwrap();
        // -18018 * 0.128 = -2306.304
        assert_eq!(opex.displayed()[2], "-$2,306.3m");

        let cet1 = grid.rows.iter().find(|r| r.metric == CET1_RATIO).unwrap();
        assert_eq!(cet1.displayed()[2], "23.69%");
        assert_eq!(cet1.cells[2].as_ref().unwrap().value, d("23.69"));

        // stored points untouched
        assert!(points.iter().all(|p| p.currency == Currency::HKD));
    }

    #[test]
    fn test_segment_filter() {
        let points = create_test_points();
        let query = ComparisonQuery::new("2025 1H", StandardizedSegment::RetailWealth, Currency::HKD);
        let grid = ComparisonGrid::build(&query, &points, &DisplayRates::default()).unwrap();
        assert_eq!(grid.filled_cells(), 0);
    }

    #[test]
    fn test_toggle_bank_keeps_at_least_one() {
        let mut query = ComparisonQuery::default().with_banks(&[Bank::HangSeng, Bank::BocHk]);
        assert_eq!(query.banks, vec![Bank::BocHk, Bank::HangSeng]);

        assert!(query.toggle_bank(Bank::BocHk));
        assert!(!query.toggle_bank(Bank::HangSeng));
        assert_eq!(query.banks, vec![Bank::HangSeng]);

        assert!(query.toggle_bank(Bank::HsbcHk));
        assert_eq!(query.banks, vec![Bank::HsbcHk, Bank::HangSeng]);
    }

    #[test]
    fn test_missing_display_rate() {
        let rates = DisplayRates::new(Currency::HKD, BTreeMap::new());
        let query = ComparisonQuery::new("2025 1H", StandardizedSegment::Group, Currency::GBP);
        assert!(matches!(
            ComparisonGrid::build(&query, &[], &rates),
            Err(QueryError::MissingDisplayRate { .. })
        ));
    }

    #[test]
    fn test_available_periods_newest_first() {
        let store = Store::open_in_memory().unwrap();
        let ingestor = crate::ingest::Ingestor::new(
            std::sync::Arc::new(store),
            NormalizationPipeline::hong_kong_default(),
            crate::reconciliation::ReconciliationChecker::new(),
            "2025 1H",
        );
        ingestor.ingest(b"", "boc_2024h2.pdf").unwrap();
        ingestor.ingest(b"", "boc_1H2025.pdf").unwrap();
        ingestor.ingest(b"", "hase_2024h1.pdf").unwrap();

        assert_eq!(
            available_periods(ingestor.store()).unwrap(),
            vec!["2025 1H", "2024 2H", "2024 1H"]
        );

        let grid = compare(ingestor.store(), &ComparisonQuery::new("1H 2025", StandardizedSegment::Group, Currency::HKD), &DisplayRates::default()).unwrap();
        assert_eq!(grid.period, "2025 1H");
        assert!(grid.filled_cells() > 0);
    }

    #[test]
    fn test_reconcile_canonicalizes_period() {
        let ingestor = crate::ingest::Ingestor::new(
            std::sync::Arc::new(Store::open_in_memory().unwrap()),
            NormalizationPipeline::hong_kong_default(),
            ReconciliationChecker::new(),
            "2025 1H",
        );
        ingestor.ingest(b"", "boc_1H2025.pdf").unwrap();
        let checker = ReconciliationChecker::new();

        let canonical = reconcile(ingestor.store(), Some("2025 1H"), &checker).unwrap();
        let reordered = reconcile(ingestor.store(), Some("1H 2025"), &checker).unwrap();
        assert!(canonical.checked > 0);
        assert_eq!(reordered.checked, canonical.checked);
        assert_eq!(reordered.flags, canonical.flags);

        assert!(matches!(
            reconcile(ingestor.store(), Some("first half"), &checker),
            Err(QueryError::InvalidPeriod { .. })
        ));
    }
}
