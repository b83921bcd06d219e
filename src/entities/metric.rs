// 📊 Metric Catalogue - what each disclosed line means
//
// Statement kind decides the FX basis: balance-sheet lines convert at the
// period-end spot rate, income-statement lines at the period-average rate,
// ratios are never converted.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatementKind {
    IncomeStatement,
    BalanceSheet,
    Ratio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridSection {
    #[serde(rename = "Profit & Loss")]
    ProfitAndLoss,
    #[serde(rename = "Balance Sheet & Ratios")]
    BalanceSheetAndRatios,
}

impl GridSection {
    pub fn title(&self) -> &'static str {
        match self {
            GridSection::ProfitAndLoss => "Profit & Loss",
            GridSection::BalanceSheetAndRatios => "Balance Sheet & Ratios",
        }
    }
}

/// Canonical unit for monetary values (millions)
pub const UNIT_MILLIONS: &str = "m";
/// Unit for ratio values
pub const UNIT_PERCENT: &str = "%";

#[derive(Debug, Clone, Serialize)]
pub struct MetricDefinition {
    pub name: &'static str,
    pub kind: StatementKind,
    pub unit: &'static str,
    pub section: GridSection,
    /// Constituent lines for derived metrics (empty for disclosed lines)
    pub derived_from: &'static [&'static str],
}

impl MetricDefinition {
    pub fn is_derived(&self) -> bool {
        !self.derived_from.is_empty()
    }

    pub fn is_ratio(&self) -> bool {
        self.kind == StatementKind::Ratio
    }
}

pub const NET_INTEREST_INCOME: &str = "Net Interest Income";
pub const NON_INTEREST_INCOME: &str = "Non-Interest Income";
pub const OTHER_INCOME: &str = "Other Income";
pub const OPERATING_EXPENSES: &str = "Operating Expenses";
pub const OPERATING_PROFIT: &str = "Operating Profit";
pub const PROVISIONS: &str = "Provisions";
pub const PRETAX_EARNINGS: &str = "Pretax Earnings";
pub const TOTAL_LOANS: &str = "Total Loans";
pub const TOTAL_DEPOSITS: &str = "Total Deposits";
pub const NPL_RATIO: &str = "NPL Ratio";
pub const CET1_RATIO: &str = "Common Equity Tier 1";

/// Catalogue in comparison-grid row order
pub static CATALOGUE: [MetricDefinition; 11] = [
    MetricDefinition {
        name: NET_INTEREST_INCOME,
        kind: StatementKind::IncomeStatement,
        unit: UNIT_MILLIONS,
        section: GridSection::ProfitAndLoss,
        derived_from: &[],
    },
    MetricDefinition {
        name: NON_INTEREST_INCOME,
        kind: StatementKind::IncomeStatement,
        unit: UNIT_MILLIONS,
        section: GridSection::ProfitAndLoss,
        derived_from: &[],
    },
    MetricDefinition {
        name: OTHER_INCOME,
        kind: StatementKind::IncomeStatement,
        unit: UNIT_MILLIONS,
        section: GridSection::ProfitAndLoss,
        derived_from: &[],
    },
    MetricDefinition {
        name: OPERATING_EXPENSES,
        kind: StatementKind::IncomeStatement,
        unit: UNIT_MILLIONS,
        section: GridSection::ProfitAndLoss,
        derived_from: &[],
    },
    MetricDefinition {
        name: OPERATING_PROFIT,
        kind: StatementKind::IncomeStatement,
        unit: UNIT_MILLIONS,
        section: GridSection::ProfitAndLoss,
        derived_from: &[
            NET_INTEREST_INCOME,
            NON_INTEREST_INCOME,
            OTHER_INCOME,
            OPERATING_EXPENSES,
        ],
    },
    MetricDefinition {
        name: PROVISIONS,
        kind: StatementKind::IncomeStatement,
        unit: UNIT_MILLIONS,
        section: GridSection::ProfitAndLoss,
        derived_from: &[],
    },
    MetricDefinition {
        name: PRETAX_EARNINGS,
        kind: StatementKind::IncomeStatement,
        unit: UNIT_MILLIONS,
        section: GridSection::ProfitAndLoss,
        derived_from: &[OPERATING_PROFIT, PROVISIONS],
    },
    MetricDefinition {
        name: TOTAL_LOANS,
        kind: StatementKind::BalanceSheet,
        unit: UNIT_MILLIONS,
        section: GridSection::BalanceSheetAndRatios,
        derived_from: &[],
    },
    MetricDefinition {
        name: TOTAL_DEPOSITS,
        kind: StatementKind::BalanceSheet,
        unit: UNIT_MILLIONS,
        section: GridSection::BalanceSheetAndRatios,
        derived_from: &[],
    },
    MetricDefinition {
        name: NPL_RATIO,
        kind: StatementKind::Ratio,
        unit: UNIT_PERCENT,
        section: GridSection::BalanceSheetAndRatios,
        derived_from: &[],
    },
    MetricDefinition {
        name: CET1_RATIO,
        kind: StatementKind::Ratio,
        unit: UNIT_PERCENT,
        section: GridSection::BalanceSheetAndRatios,
        derived_from: &[],
    },
];

/// Find a metric by name (case-insensitive)
pub fn lookup(name: &str) -> Option<&'static MetricDefinition> {
    let needle = name.trim();
    CATALOGUE
        .iter()
        .find(|m| m.name.eq_ignore_ascii_case(needle))
}

/// Derived metrics in dependency order (a derived line may feed a later one)
pub fn derived_metrics() -> impl Iterator<Item = &'static MetricDefinition> {
    CATALOGUE.iter().filter(|m| m.is_derived())
}
