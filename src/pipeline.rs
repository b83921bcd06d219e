// ⚙️ Normalization Pipeline - raw disclosure → standardized data point
//
// Steps, each appending one entry to the audit trail:
//   1. Extraction          parse the disclosed figure, unit and period
//   2. Segment Mapping     taxonomy lookup, Unclassified + warning if unmapped
//   3. Geographic Filter   supranational disclosures need a slicing rule
//   4. Currency Conversion spot for balance sheet, average for P&L, never for %
//   5. Aggregation         (batch, Group only) derived lines = Σ normalized constituents
//
// normalize() is a pure function of the record, the loaded taxonomy and the
// rate table: same inputs, byte-identical output.

use crate::entities::metric::{self, UNIT_MILLIONS, UNIT_PERCENT};
use crate::entities::{Currency, ReportingPeriod, StandardizedSegment, StatementKind};
use crate::error::NormalizeError;
use crate::format::{grouped, round};
use crate::fx::{RateBasis, RateTable};
use crate::model::{
    ExtractionRecord, FailedExtraction, StandardizedDataPoint, StepName, StepStatus,
};
use crate::taxonomy::{normalize_label, GeoScope, TaxonomyRegistry};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Decimal places kept after converting a monetary value
const CONVERTED_DP: u32 = 1;

// ============================================================================
// OUTCOME
// ============================================================================

#[derive(Debug, Clone, Default, Serialize)]
pub struct NormalizationOutcome {
    pub points: Vec<StandardizedDataPoint>,
    pub failures: Vec<FailedExtraction>,
}

impl NormalizationOutcome {
    pub fn warning_count(&self) -> usize {
        self.points.iter().filter(|p| p.has_warnings()).count()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} normalized ({} with warnings), {} failed",
            self.points.len(),
            self.warning_count(),
            self.failures.len()
        )
    }
}

// ============================================================================
// VALUE PARSING
// ============================================================================

/// Parse a disclosed figure: "5,875", "(2,310)", "-864", "1.60", "−12.5"
pub fn parse_disclosed_value(raw: &str) -> Result<Decimal, NormalizeError> {
    let invalid = || NormalizeError::InvalidValue { raw: raw.to_string() };

    let mut text: String = raw
        .trim()
        .replace('\u{2212}', "-")
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();

    let mut negative = false;
    if text.starts_with('(') && text.ends_with(')') && text.len() > 2 {
        negative = true;
        text = text[1..text.len() - 1].to_string();
    }

    if text.is_empty() {
        return Err(invalid());
    }

    let value: Decimal = text.parse().map_err(|_| invalid())?;
    if negative {
        if value.is_sign_negative() {
            return Err(invalid());
        }
        Ok(-value)
    } else {
        Ok(value)
    }
}

/// Scale factor from a disclosed unit to the canonical unit
fn unit_scale(raw_unit: &str) -> Result<(Decimal, &'static str), NormalizeError> {
    match raw_unit.trim().to_lowercase().as_str() {
        "m" | "mn" | "million" | "millions" => Ok((Decimal::ONE, UNIT_MILLIONS)),
        "bn" | "b" | "billion" | "billions" => Ok((Decimal::ONE_THOUSAND, UNIT_MILLIONS)),
        "%" | "pct" | "percent" => Ok((Decimal::ONE, UNIT_PERCENT)),
        other => Err(NormalizeError::UnsupportedUnit {
            unit: other.to_string(),
        }),
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

#[derive(Debug, Clone)]
pub struct NormalizationPipeline {
    taxonomy: Arc<TaxonomyRegistry>,
    rates: Arc<RateTable>,
    target_currency: Currency,
}

impl NormalizationPipeline {
    pub fn new(taxonomy: Arc<TaxonomyRegistry>, rates: Arc<RateTable>, target_currency: Currency) -> Self {
        NormalizationPipeline {
            taxonomy,
            rates,
            target_currency,
        }
    }

    /// Default HK taxonomy and rate table, normalizing into HKD
    pub fn hong_kong_default() -> Self {
        Self::new(
            Arc::new(TaxonomyRegistry::hong_kong_default()),
            Arc::new(RateTable::hong_kong_default()),
            Currency::HKD,
        )
    }

    pub fn taxonomy(&self) -> &Arc<TaxonomyRegistry> {
        &self.taxonomy
    }

    pub fn rates(&self) -> &Arc<RateTable> {
        &self.rates
    }

    pub fn target_currency(&self) -> Currency {
        self.target_currency
    }

    /// Same rates and target, a whole new taxonomy revision
    pub fn with_taxonomy(&self, taxonomy: Arc<TaxonomyRegistry>) -> Self {
        NormalizationPipeline {
            taxonomy,
            rates: Arc::clone(&self.rates),
            target_currency: self.target_currency,
        }
    }

    /// Normalize one record. Record-level failures come back as FailedExtraction.
    pub fn normalize(&self, record: &ExtractionRecord) -> Result<StandardizedDataPoint, FailedExtraction> {
        self.try_normalize(record).map_err(|err| {
            warn!(record_id = %record.id, metric = %record.metric, error = %err, "record failed normalization");
            FailedExtraction {
                record_id: record.id.clone(),
                metric: record.metric.clone(),
                reason: err.to_string(),
            }
        })
    }

    /// Normalize a batch; failures never abort the rest of the batch.
    /// The first record to land on a (bank, period, metric, segment) slot keeps
    /// it; later ones fail as duplicates. Unclassified lines are told apart by
    /// their bank-native label. Derived Group lines are then re-aggregated from
    /// normalized constituents.
    pub fn normalize_batch(&self, records: &[ExtractionRecord]) -> NormalizationOutcome {
        let mut outcome = NormalizationOutcome::default();
        let mut taken: BTreeMap<(String, String, String, String, String), String> = BTreeMap::new();

        for record in records {
            let point = match self.normalize(record) {
                Ok(point) => point,
                Err(failure) => {
                    outcome.failures.push(failure);
                    continue;
                }
            };

            let label = if point.segment == StandardizedSegment::Unclassified {
                normalize_label(&point.original_segment)
            } else {
                String::new()
            };
            let key = (
                point.bank.code().to_string(),
                point.period.clone(),
                point.metric.clone(),
                point.segment.as_str().to_string(),
                label,
            );

            if let Some(first) = taken.get(&key) {
                let err = NormalizeError::DuplicateDisclosure {
                    metric: point.metric.clone(),
                    segment: point.segment.as_str().to_string(),
                    first_record_id: first.clone(),
                };
                warn!(record_id = %record.id, error = %err, "duplicate disclosure dropped");
                outcome.failures.push(FailedExtraction {
                    record_id: record.id.clone(),
                    metric: record.metric.clone(),
                    reason: err.to_string(),
                });
                continue;
            }

            taken.insert(key, record.id.clone());
            outcome.points.push(point);
        }

        aggregate_derived_lines(&mut outcome.points);

        debug!(summary = %outcome.summary(), "batch normalized");
        outcome
    }

    fn try_normalize(&self, record: &ExtractionRecord) -> Result<StandardizedDataPoint, NormalizeError> {
        // ---- Step 1: Extraction ------------------------------------------------
        let period: ReportingPeriod = record
            .period
            .parse()
            .map_err(|_| NormalizeError::InvalidPeriod {
                raw: record.period.clone(),
            })?;
        let raw_currency: Currency = record
            .raw_currency
            .parse()
            .map_err(|_| NormalizeError::UnsupportedCurrency {
                raw: record.raw_currency.clone(),
            })?;
        let (scale, unit) = unit_scale(&record.raw_unit)?;
        let disclosed = parse_disclosed_value(&record.raw_value)?;
        let definition = metric::lookup(&record.metric);

        if let Some(def) = definition {
            if def.is_ratio() != (unit == UNIT_PERCENT) {
                return Err(NormalizeError::UnsupportedUnit {
                    unit: format!("{} for metric {}", record.raw_unit, record.metric),
                });
            }
        }

        let mut value = disclosed * scale;
        let metric_name = definition.map_or_else(|| record.metric.clone(), |d| d.name.to_string());

        let mut point = StandardizedDataPoint {
            id: StandardizedDataPoint::id_for_record(&record.id),
            metric: metric_name,
            bank: record.bank,
            period: period.label(),
            year: period.year(),
            frequency: period.frequency(),
            segment: StandardizedSegment::Unclassified,
            original_segment: record.raw_segment_label.clone(),
            value,
            currency: self.target_currency,
            unit: unit.to_string(),
            record_id: record.id.clone(),
            source_document_id: record.source_document_id.clone(),
            page_number: record.page_number,
            taxonomy_version: self.taxonomy.version().to_string(),
            steps: Vec::new(),
        };

        point.push_step(
            StepName::Extraction,
            format!(
                "Extracted \"{}\" for segment \"{}\" on page {}.",
                record.metric, record.raw_segment_label, record.page_number
            ),
            Some((
                format!("{}{} {}", record.raw_value, record.raw_unit, record.raw_currency),
                format!("{}{} {}", grouped(value, 4), unit, raw_currency),
            )),
            StepStatus::Success,
        );

        // ---- Step 2: Segment Mapping ------------------------------------------
        match self.taxonomy.resolve(record.bank, &record.raw_segment_label) {
            Ok(resolution) => {
                point.segment = resolution.segment;
                let mut description = format!(
                    "Mapped \"{}\" to \"{}\" (rule {} v{}, taxonomy {}).",
                    record.raw_segment_label,
                    resolution.segment,
                    resolution.rule.id,
                    resolution.rule.version,
                    self.taxonomy.version()
                );
                if let Some(note) = resolution.note {
                    description.push_str(" Note: ");
                    description.push_str(note);
                }
                point.push_step(
                    StepName::SegmentMapping,
                    description,
                    Some((record.raw_segment_label.clone(), resolution.segment.to_string())),
                    StepStatus::Success,
                );
            }
            Err(err) => {
                debug!(record_id = %record.id, error = %err, "segment unmapped");
                point.push_step(
                    StepName::SegmentMapping,
                    format!(
                        "No taxonomy rule for \"{}\" at {} (taxonomy {}); classified as Unclassified.",
                        record.raw_segment_label,
                        record.bank.code(),
                        self.taxonomy.version()
                    ),
                    Some((
                        record.raw_segment_label.clone(),
                        StandardizedSegment::Unclassified.to_string(),
                    )),
                    StepStatus::Warning,
                );
            }
        }

        // ---- Step 3: Geographic Filtering -------------------------------------
        match self.taxonomy.geo_scope(record.bank) {
            GeoScope::Jurisdiction { code } => point.push_step(
                StepName::GeoFiltering,
                format!("Verified {} entity reporting scope.", code),
                None,
                StepStatus::Success,
            ),
            GeoScope::Supranational { region } => {
                match self.taxonomy.slicing_rule(record.bank, &record.metric) {
                    Some(rule) => point.push_step(
                        StepName::GeoFiltering,
                        format!("{} (rule {})", rule.description, rule.id),
                        None,
                        StepStatus::Success,
                    ),
                    None => point.push_step(
                        StepName::GeoFiltering,
                        format!(
                            "Disclosed at {} level with no slicing rule for \"{}\"; value passed through unadjusted.",
                            region, record.metric
                        ),
                        None,
                        StepStatus::Warning,
                    ),
                }
            }
        }

        // ---- Step 4: Currency Conversion --------------------------------------
        if unit == UNIT_PERCENT {
            point.push_step(
                StepName::CurrencyConversion,
                "Percentage value; no currency conversion applied.".to_string(),
                None,
                StepStatus::Success,
            );
        } else if raw_currency == self.target_currency {
            point.push_step(
                StepName::CurrencyConversion,
                format!("Verified reporting currency is {}.", self.target_currency),
                Some((raw_currency.to_string(), self.target_currency.to_string())),
                StepStatus::Success,
            );
        } else {
            let kind = definition
                .map(|d| d.kind)
                .ok_or_else(|| NormalizeError::UnknownRateBasis {
                    metric: record.metric.clone(),
                })?;
            let basis = RateBasis::for_metric(kind, &period).ok_or_else(|| {
                NormalizeError::UnknownRateBasis {
                    metric: record.metric.clone(),
                }
            })?;
            let as_of = period.end_date();
            let rate = self
                .rates
                .rate(raw_currency, self.target_currency, basis, as_of)?;

            let converted = round(value * rate, CONVERTED_DP);
            point.push_step(
                StepName::CurrencyConversion,
                format!(
                    "Converted {} to {} at {} {} as of {} ({}).",
                    raw_currency,
                    self.target_currency,
                    basis.describe(),
                    rate,
                    as_of,
                    if kind == StatementKind::BalanceSheet {
                        "balance sheet"
                    } else {
                        "income statement"
                    }
                ),
                Some((
                    format!("{}{} {}", grouped(value, 2), unit, raw_currency),
                    format!("{}{} {}", grouped(converted, 2), unit, self.target_currency),
                )),
                StepStatus::Success,
            );
            value = converted;
        }

        point.value = value;
        Ok(point)
    }
}

impl Default for NormalizationPipeline {
    fn default() -> Self {
        Self::hong_kong_default()
    }
}

// ============================================================================
// AGGREGATION (Group segment only)
// ============================================================================

/// Recompute derived Group lines from the already-normalized constituents of
/// the same bank/period, so displayed totals add up to displayed parts.
pub fn aggregate_derived_lines(points: &mut [StandardizedDataPoint]) {
    // (bank, period, metric) -> index of the Group point
    let mut group_index: BTreeMap<(String, String, String), usize> = BTreeMap::new();
    for (i, p) in points.iter().enumerate() {
        if p.segment == StandardizedSegment::Group {
            group_index
                .entry((p.bank.code().to_string(), p.period.clone(), p.metric.clone()))
                .or_insert(i);
        }
    }

    let keys: Vec<(String, String)> = group_index
        .keys()
        .map(|(bank, period, _)| (bank.clone(), period.clone()))
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();

    for (bank, period) in keys {
        for derived in metric::derived_metrics() {
            let key = (bank.clone(), period.clone(), derived.name.to_string());
            let Some(&target) = group_index.get(&key) else {
                continue;
            };

            let mut parts = Vec::new();
            let mut missing = Vec::new();
            for name in derived.derived_from {
                match group_index.get(&(bank.clone(), period.clone(), name.to_string())) {
                    Some(&i) => parts.push((*name, points[i].value)),
                    None => missing.push(*name),
                }
            }

            let point = &mut points[target];
            if !missing.is_empty() {
                point.push_step(
                    StepName::Aggregation,
                    format!(
                        "Cannot recompute {}: missing normalized {}; kept extracted value.",
                        derived.name,
                        missing.join(", ")
                    ),
                    None,
                    StepStatus::Warning,
                );
                continue;
            }

            let total: Decimal = parts.iter().map(|(_, v)| *v).sum();
            let formula = parts
                .iter()
                .map(|(name, v)| format!("{} ({})", name, grouped(*v, 2)))
                .collect::<Vec<_>>()
                .join(" + ");
            let previous = point.value;

            point.push_step(
                StepName::Aggregation,
                format!("Recomputed {} = {}.", derived.name, formula),
                Some((grouped(previous, 2), grouped(total, 2))),
                StepStatus::Success,
            );
            point.value = total;
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::metric::*;
    use crate::entities::Bank;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn record(bank: Bank, metric: &str, label: &str, value: &str, unit: &str, ccy: &str) -> ExtractionRecord {
        ExtractionRecord::new(bank, "2025 1H", metric, label, value, unit, ccy, "doc-test", 36)
    }

    #[test]
    fn test_parse_disclosed_value_formats() {
        assert_eq!(parse_disclosed_value("5,875").unwrap(), d("5875"));
        assert_eq!(parse_disclosed_value("(2,310)").unwrap(), d("-2310"));
        assert_eq!(parse_disclosed_value("-864").unwrap(), d("-864"));
        assert_eq!(parse_disclosed_value(" 1.60 ").unwrap(), d("1.60"));
        assert_eq!(parse_disclosed_value("\u{2212}12.5").unwrap(), d("-12.5"));
        assert!(parse_disclosed_value("n/a").is_err());
        assert!(parse_disclosed_value("").is_err());
        assert!(parse_disclosed_value("(-5)").is_err());
    }

    #[test]
    fn test_first_step_is_extraction_and_trail_is_complete() {
        let pipeline = NormalizationPipeline::hong_kong_default();
        let point = pipeline
            .normalize(&record(Bank::BocHk, NET_INTEREST_INCOME, "Group Total", "25,063", "m", "HKD"))
            .unwrap();

        let names: Vec<StepName> = point.steps.iter().map(|s| s.step_name).collect();
        assert_eq!(
            names,
            vec![
                StepName::Extraction,
                StepName::SegmentMapping,
                StepName::GeoFiltering,
                StepName::CurrencyConversion
            ]
        );
        assert!(point.is_well_formed());
        assert_eq!(point.segment, StandardizedSegment::Group);
        assert_eq!(point.value, d("25063"));
        assert_eq!(point.currency, Currency::HKD);
        assert!(!point.has_warnings());
    }

    #[test]
    fn test_income_statement_uses_average_rate() {
        let pipeline = NormalizationPipeline::hong_kong_default();
        let point = pipeline
            .normalize(&record(Bank::HsbcHk, NET_INTEREST_INCOME, "Hong Kong", "5,875", "m", "USD"))
            .unwrap();

        // 5875 * 7.802 = 45836.75 -> 45836.8
        assert_eq!(point.value, d("45836.8"));
        let fx = point.steps.last().unwrap();
        assert_eq!(fx.step_name, StepName::CurrencyConversion);
        assert!(fx.description.contains("period-average rate"));
    }

    #[test]
    fn test_balance_sheet_uses_spot_rate() {
        let pipeline = NormalizationPipeline::hong_kong_default();
        let point = pipeline
            .normalize(&record(Bank::HsbcHk, TOTAL_LOANS, "Hong Kong", "230,139", "m", "USD"))
            .unwrap();

        // 230139 * 7.85 = 1806591.15 -> 1806591.2
        assert_eq!(point.value, d("1806591.2"));
        assert!(point.steps.last().unwrap().description.contains("period-end spot rate"));
    }

    #[test]
    fn test_percent_values_are_never_converted() {
        let pipeline = NormalizationPipeline::hong_kong_default();
        let point = pipeline
            .normalize(&record(Bank::HsbcHk, CET1_RATIO, "Hong Kong", "16.2", "%", "USD"))
            .unwrap();

        assert_eq!(point.value, d("16.2"));
        assert_eq!(point.unit, "%");
        assert!(point.is_percent());
    }

    #[test]
    fn test_unmapped_segment_degrades_to_unclassified_with_warning() {
        let pipeline = NormalizationPipeline::hong_kong_default();
        let point = pipeline
            .normalize(&record(Bank::HangSeng, NET_INTEREST_INCOME, "Insurance Business", "1,200", "m", "HKD"))
            .unwrap();

        assert_eq!(point.segment, StandardizedSegment::Unclassified);
        let mapping = &point.steps[1];
        assert_eq!(mapping.step_name, StepName::SegmentMapping);
        assert_eq!(mapping.status, StepStatus::Warning);
    }

    #[test]
    fn test_supranational_without_slicing_rule_warns_and_passes_through() {
        let mut file = TaxonomyRegistry::hong_kong_default().to_file();
        file.slicing_rules.retain(|r| r.bank != Bank::ScHk);
        let taxonomy = TaxonomyRegistry::new(&file.version, file.rules, file.scopes, file.slicing_rules).unwrap();
        let pipeline = NormalizationPipeline::hong_kong_default().with_taxonomy(Arc::new(taxonomy));

        let point = pipeline
            .normalize(&record(Bank::ScHk, PROVISIONS, "Hong Kong", "(1,200)", "m", "HKD"))
            .unwrap();

        let geo = &point.steps[2];
        assert_eq!(geo.step_name, StepName::GeoFiltering);
        assert_eq!(geo.status, StepStatus::Warning);
        assert!(geo.description.contains("Asia"));
        assert_eq!(point.value, d("-1200"));
    }

    #[test]
    fn test_billions_rescale_to_millions() {
        let pipeline = NormalizationPipeline::hong_kong_default();
        let point = pipeline
            .normalize(&record(Bank::BocHk, TOTAL_DEPOSITS, "Group Total", "2,875.521", "bn", "HKD"))
            .unwrap();
        assert_eq!(point.value, d("2875521"));
        assert_eq!(point.unit, "m");
    }

    #[test]
    fn test_record_failures_are_reported_not_thrown() {
        let pipeline = NormalizationPipeline::hong_kong_default();

        let bad_value = record(Bank::BocHk, TOTAL_LOANS, "Group Total", "n/a", "m", "HKD");
        let failure = pipeline.normalize(&bad_value).unwrap_err();
        assert_eq!(failure.record_id, bad_value.id);
        assert!(failure.reason.contains("invalid numeric value"));

        let mut no_rate = record(Bank::HsbcHk, TOTAL_LOANS, "Hong Kong", "1", "m", "USD");
        no_rate.period = "2023 1H".to_string();
        let failure = pipeline.normalize(&no_rate).unwrap_err();
        assert!(failure.reason.contains("missing spot rate"));
    }

    #[test]
    fn test_unknown_metric_only_fails_when_conversion_needed() {
        let pipeline = NormalizationPipeline::hong_kong_default();

        let hkd = record(Bank::BocHk, "Insurance Premiums", "Group Total", "100", "m", "HKD");
        assert!(pipeline.normalize(&hkd).is_ok());

        let usd = record(Bank::HsbcHk, "Insurance Premiums", "Hong Kong", "100", "m", "USD");
        let failure = pipeline.normalize(&usd).unwrap_err();
        assert!(failure.reason.contains("FX basis"));
    }

    #[test]
    fn test_ratio_metric_with_monetary_unit_fails() {
        let pipeline = NormalizationPipeline::hong_kong_default();
        let bad = record(Bank::BocHk, NPL_RATIO, "Group Total", "1.02", "m", "HKD");
        assert!(pipeline.normalize(&bad).is_err());
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let pipeline = NormalizationPipeline::hong_kong_default();
        let r = record(Bank::HsbcHk, OPERATING_EXPENSES, "Commercial Banking", "(2,310)", "m", "USD");

        let a = serde_json::to_string(&pipeline.normalize(&r).unwrap()).unwrap();
        let b = serde_json::to_string(&pipeline.normalize(&r).unwrap()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_batch_continues_past_failures() {
        let pipeline = NormalizationPipeline::hong_kong_default();
        let records = vec![
            record(Bank::BocHk, NET_INTEREST_INCOME, "Group Total", "25,063", "m", "HKD"),
            record(Bank::BocHk, NON_INTEREST_INCOME, "Group Total", "oops", "m", "HKD"),
            record(Bank::BocHk, TOTAL_LOANS, "Group Total", "1,710,380", "m", "HKD"),
        ];

        let outcome = pipeline.normalize_batch(&records);
        assert_eq!(outcome.points.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].metric, NON_INTEREST_INCOME);
    }

    #[test]
    fn test_second_disclosure_for_same_slot_fails_as_duplicate() {
        let pipeline = NormalizationPipeline::hong_kong_default();
        let first = record(Bank::HsbcHk, NET_INTEREST_INCOME, "Wealth & Personal Banking", "2,000", "m", "HKD");
        let second = record(Bank::HsbcHk, NET_INTEREST_INCOME, "Wealth and Personal Banking", "2,100", "m", "HKD");
        assert_ne!(first.id, second.id);

        let outcome = pipeline.normalize_batch(&[first.clone(), second.clone()]);

        assert_eq!(outcome.points.len(), 1);
        assert_eq!(outcome.points[0].record_id, first.id);
        assert_eq!(outcome.points[0].value, d("2000"));
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].record_id, second.id);
        assert!(outcome.failures[0].reason.contains("duplicate disclosure"));
    }

    #[test]
    fn test_distinct_unmapped_labels_both_kept_as_unclassified() {
        let pipeline = NormalizationPipeline::hong_kong_default();
        let records = vec![
            record(Bank::HangSeng, NET_INTEREST_INCOME, "Insurance Business", "1,200", "m", "HKD"),
            record(Bank::HangSeng, NET_INTEREST_INCOME, "Property Holdings", "300", "m", "HKD"),
            record(Bank::HangSeng, NET_INTEREST_INCOME, "insurance  business", "1,250", "m", "HKD"),
        ];

        let outcome = pipeline.normalize_batch(&records);
        assert_eq!(outcome.points.len(), 2);
        assert!(outcome
            .points
            .iter()
            .all(|p| p.segment == StandardizedSegment::Unclassified));
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].record_id, records[2].id);
    }

    #[test]
    fn test_group_derived_lines_are_recomputed_from_constituents() {
        let pipeline = NormalizationPipeline::hong_kong_default();
        let g = "Group Total";
        let records = vec![
            record(Bank::BocHk, NET_INTEREST_INCOME, g, "25,063", "m", "HKD"),
            record(Bank::BocHk, NON_INTEREST_INCOME, g, "14,959", "m", "HKD"),
            record(Bank::BocHk, OTHER_INCOME, g, "1,496", "m", "HKD"),
            record(Bank::BocHk, OPERATING_EXPENSES, g, "(8,310)", "m", "HKD"),
            record(Bank::BocHk, PROVISIONS, g, "(3,318)", "m", "HKD"),
            // disclosed totals are off by one from the sum of parts
            record(Bank::BocHk, OPERATING_PROFIT, g, "33,209", "m", "HKD"),
            record(Bank::BocHk, PRETAX_EARNINGS, g, "29,891", "m", "HKD"),
        ];

        let outcome = pipeline.normalize_batch(&records);
        let find = |m: &str| outcome.points.iter().find(|p| p.metric == m).unwrap();

        let op = find(OPERATING_PROFIT);
        assert_eq!(op.value, d("33208"));
        assert_eq!(op.steps.last().unwrap().step_name, StepName::Aggregation);
        assert_eq!(op.steps.last().unwrap().status, StepStatus::Success);

        let pbt = find(PRETAX_EARNINGS);
        assert_eq!(pbt.value, d("29890"));
        assert!(pbt.is_well_formed());

        // constituents untouched
        assert_eq!(find(NET_INTEREST_INCOME).steps.len(), 4);
    }

    #[test]
    fn test_aggregation_warns_when_constituents_missing() {
        let pipeline = NormalizationPipeline::hong_kong_default();
        let records = vec![
            record(Bank::BocHk, NET_INTEREST_INCOME, "Group Total", "25,063", "m", "HKD"),
            record(Bank::BocHk, OPERATING_PROFIT, "Group Total", "33,209", "m", "HKD"),
        ];

        let outcome = pipeline.normalize_batch(&records);
        let op = outcome.points.iter().find(|p| p.metric == OPERATING_PROFIT).unwrap();
        assert_eq!(op.value, d("33209"));
        let last = op.steps.last().unwrap();
        assert_eq!(last.step_name, StepName::Aggregation);
        assert_eq!(last.status, StepStatus::Warning);
    }

    #[test]
    fn test_aggregation_skips_business_segments() {
        let pipeline = NormalizationPipeline::hong_kong_default();
        let records = vec![record(Bank::BocHk, OPERATING_PROFIT, "Personal Banking", "10,000", "m", "HKD")];

        let outcome = pipeline.normalize_batch(&records);
        assert!(outcome.points[0]
            .steps
            .iter()
            .all(|s| s.step_name != StepName::Aggregation));
    }
}
