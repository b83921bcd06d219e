// ⚖️ Reconciliation Checker - segment sums vs group totals
//
// Following the rule:
//   |Σ business segments - Group| / |Group| * 100 <= tolerance_pct
//
// Detective control only: flags are surfaced next to the data, they never
// block storage or querying.

use crate::entities::{Bank, StandardizedSegment};
use crate::model::StandardizedDataPoint;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Default tolerance: 2% of the group total
pub const DEFAULT_TOLERANCE_PCT: Decimal = Decimal::TWO;

// ============================================================================
// RECONCILIATION FLAG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationFlag {
    pub bank: Bank,
    pub period: String,
    pub metric: String,
    pub group_value: Decimal,
    pub segment_sum: Decimal,
    pub deviation_pct: Decimal,
    pub tolerance_pct: Decimal,
}

impl ReconciliationFlag {
    pub fn describe(&self) -> String {
        format!(
            "{} {} {}: segments sum to {} vs Group {} ({}% off, tolerance {}%)",
            self.bank.code(),
            self.period,
            self.metric,
            self.segment_sum,
            self.group_value,
            self.deviation_pct.round_dp(2),
            self.tolerance_pct
        )
    }
}

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub tolerance_pct: Decimal,
    /// (bank, period, metric) groups with a Group point and at least one segment
    pub checked: usize,
    /// Groups whose Group total is zero
    pub not_checkable: usize,
    pub flags: Vec<ReconciliationFlag>,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Reconciliation: {} checked, {} not checkable, {} flagged (tolerance {}%)",
            self.checked,
            self.not_checkable,
            self.flags.len(),
            self.tolerance_pct
        )
    }
}

// ============================================================================
// RECONCILIATION CHECKER
// ============================================================================

#[derive(Debug, Clone)]
pub struct ReconciliationChecker {
    /// Maximum allowed deviation, in percent of the group total
    pub tolerance_pct: Decimal,
}

enum Outcome {
    Within,
    Flagged(ReconciliationFlag),
    NotCheckable,
}

impl ReconciliationChecker {
    pub fn new() -> Self {
        ReconciliationChecker {
            tolerance_pct: DEFAULT_TOLERANCE_PCT,
        }
    }

    pub fn with_tolerance(tolerance_pct: Decimal) -> Self {
        ReconciliationChecker { tolerance_pct }
    }

    /// Flags for every (bank, period, metric) whose segments drift from Group
    pub fn check(&self, points: &[StandardizedDataPoint]) -> Vec<ReconciliationFlag> {
        self.report(points).flags
    }

    pub fn report(&self, points: &[StandardizedDataPoint]) -> ReconciliationReport {
        let mut report = ReconciliationReport {
            tolerance_pct: self.tolerance_pct,
            checked: 0,
            not_checkable: 0,
            flags: Vec::new(),
        };

        for ((bank, period, metric), group) in self.group_points(points) {
            let Some(group_value) = group.group else {
                continue;
            };
            if group.segments.is_empty() {
                continue;
            }

            let segment_sum: Decimal = group.segments.iter().sum();
            match self.evaluate(bank, &period, &metric, group_value, segment_sum) {
                Outcome::Within => report.checked += 1,
                Outcome::NotCheckable => report.not_checkable += 1,
                Outcome::Flagged(flag) => {
                    warn!(flag = %flag.describe(), "reconciliation flag");
                    report.checked += 1;
                    report.flags.push(flag);
                }
            }
        }

        report
    }

    fn evaluate(
        &self,
        bank: Bank,
        period: &str,
        metric: &str,
        group_value: Decimal,
        segment_sum: Decimal,
    ) -> Outcome {
        if group_value.is_zero() {
            return Outcome::NotCheckable;
        }

        let deviation_pct =
            (segment_sum - group_value).abs() / group_value.abs() * Decimal::ONE_HUNDRED;

        if deviation_pct > self.tolerance_pct {
            Outcome::Flagged(ReconciliationFlag {
                bank,
                period: period.to_string(),
                metric: metric.to_string(),
                group_value,
                segment_sum,
                deviation_pct,
                tolerance_pct: self.tolerance_pct,
            })
        } else {
            Outcome::Within
        }
    }

    /// Bucket monetary points by (bank, period, metric), skipping % and Unclassified
    fn group_points(&self, points: &[StandardizedDataPoint]) -> BTreeMap<(Bank, String, String), Bucket> {
        let mut buckets: BTreeMap<(Bank, String, String), Bucket> = BTreeMap::new();

        for point in points.iter().filter(|p| !p.is_percent()) {
            let key = (point.bank, point.period.clone(), point.metric.clone());
            match point.segment {
                StandardizedSegment::Group => {
                    buckets.entry(key).or_default().group = Some(point.value);
                }
                segment if segment.is_business_segment() => {
                    buckets.entry(key).or_default().segments.push(point.value);
                }
                _ => {}
            }
        }

        buckets
    }
}

#[derive(Default)]
struct Bucket {
    group: Option<Decimal>,
    segments: Vec<Decimal>,
}

impl Default for ReconciliationChecker {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Frequency;

    fn create_test_point(bank: Bank, metric: &str, segment: StandardizedSegment, value: i64, unit: &str) -> StandardizedDataPoint {
        StandardizedDataPoint {
            id: format!("sdp-{}-{}", metric, segment.code()),
            metric: metric.to_string(),
            bank,
            period: "2025 1H".to_string(),
            year: 2025,
            frequency: Frequency::SemiAnnual,
            segment,
            original_segment: segment.to_string(),
            value: Decimal::from(value),
            currency: crate::entities::Currency::HKD,
            unit: unit.to_string(),
            record_id: format!("rec-{}-{}", metric, segment.code()),
            source_document_id: "doc-test".to_string(),
            page_number: 1,
            taxonomy_version: "test".to_string(),
            steps: vec![],
        }
    }

    fn group_and_segments(group: i64, segments: &[i64]) -> Vec<StandardizedDataPoint> {
        let mut points = vec![create_test_point(
            Bank::BocHk,
            "Total Loans",
            StandardizedSegment::Group,
            group,
            "m",
        )];
        for (value, segment) in segments.iter().zip(StandardizedSegment::BUSINESS.iter()) {
            points.push(create_test_point(Bank::BocHk, "Total Loans", *segment, *value, "m"));
        }
        points
    }

    #[test]
    fn test_one_percent_deviation_vs_tolerance() {
        // Group = 100, segments sum to 101 -> 1% deviation
        let points = group_and_segments(100, &[50, 30, 21]);

        let strict = ReconciliationChecker::with_tolerance(Decimal::new(5, 1));
        let flags = strict.check(&points);
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].deviation_pct, Decimal::ONE);
        assert_eq!(flags[0].segment_sum, Decimal::from(101));

        let exact = ReconciliationChecker::with_tolerance(Decimal::ONE);
        assert!(exact.check(&points).is_empty());

        assert!(ReconciliationChecker::new().check(&points).is_empty());

        println!("✅ Test passed: {}", strict.report(&points).summary());
    }

    #[test]
    fn test_zero_group_is_not_checkable() {
        let points = group_and_segments(0, &[5]);
        let checker = ReconciliationChecker::new();

        let report = checker.report(&points);
        assert!(report.is_clean());
        assert_eq!(report.not_checkable, 1);
        assert_eq!(report.checked, 0);
    }

    #[test]
    fn test_negative_totals_use_absolute_group() {
        // Opex: Group -200, segments -100 + -90 = -190 -> 5%
        let points = group_and_segments(-200, &[-100, -90]);
        let flags = ReconciliationChecker::new().check(&points);
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].deviation_pct, Decimal::from(5));
    }

    #[test]
    fn test_percent_and_unclassified_points_are_excluded() {
        let mut points = group_and_segments(100, &[60, 40]);
        points.push(create_test_point(
            Bank::BocHk,
            "Total Loans",
            StandardizedSegment::Unclassified,
            500,
            "m",
        ));
        points.push(create_test_point(Bank::BocHk, "NPL Ratio", StandardizedSegment::Group, 1, "%"));
        points.push(create_test_point(
            Bank::BocHk,
            "NPL Ratio",
            StandardizedSegment::RetailWealth,
            9,
            "%",
        ));

        let report = ReconciliationChecker::new().report(&points);
        assert!(report.is_clean());
        assert_eq!(report.checked, 1);
    }

    #[test]
    fn test_group_without_segments_is_skipped() {
        let points = group_and_segments(100, &[]);
        let report = ReconciliationChecker::new().report(&points);
        assert_eq!(report.checked, 0);
        assert_eq!(report.not_checkable, 0);
    }

    #[test]
    fn test_groups_are_per_bank() {
        let mut points = group_and_segments(100, &[100]);
        points.push(create_test_point(
            Bank::HangSeng,
            "Total Loans",
            StandardizedSegment::RetailWealth,
            1,
            "m",
        ));

        let report = ReconciliationChecker::new().report(&points);
        assert_eq!(report.checked, 1);
        assert!(report.is_clean());
    }
}
