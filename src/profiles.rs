// 🏦 Bank Profiles - deterministic disclosures for documents we cannot read
//
// Stands in for PDF text extraction: each profile holds a bank's 1H 2025
// headline figures in its own reporting currency, its native segment labels
// and the pages they are disclosed on. Records come out exactly as a filing
// would print them ("(2,310)", "5,875") and go through the real pipeline.

use crate::entities::metric::*;
use crate::entities::{Bank, Currency, StandardizedSegment};
use crate::format::{grouped, round};
use crate::model::ExtractionRecord;
use rust_decimal::Decimal;

/// Headline figures in millions of the reporting currency, ratios in percent
#[derive(Debug, Clone)]
pub struct BankProfile {
    pub bank: Bank,
    pub currency: Currency,
    /// Document the figures are taken from
    pub source_document: &'static str,
    pub income_page: u32,
    pub balance_page: u32,
    /// (segment, bank-native label) in disclosure order, Group first
    pub labels: [(StandardizedSegment, &'static str); 4],
    pub net_interest_income: Decimal,
    pub non_interest_income: Decimal,
    pub operating_expenses: Decimal,
    pub provisions: Decimal,
    pub total_loans: Decimal,
    pub total_deposits: Decimal,
    pub npl_ratio: Decimal,
    pub cet1_ratio: Decimal,
}

/// Periods the seed data covers, oldest first
pub const SEED_PERIODS: [&str; 3] = ["2024 1H", "2024 2H", "2025 1H"];

fn m(units: i64) -> Decimal {
    Decimal::from(units)
}

fn pct(hundredths: i64) -> Decimal {
    Decimal::new(hundredths, 2)
}

impl BankProfile {
    pub fn for_bank(bank: Bank) -> Self {
        use StandardizedSegment::*;

        match bank {
            // Data Pack 2Q 2025, Hong Kong business (USD)
            Bank::HsbcHk => BankProfile {
                bank,
                currency: Currency::USD,
                source_document: "HSBC Holdings plc Data Pack 2Q 2025.pdf",
                income_page: 36,
                balance_page: 37,
                labels: [
                    (Group, "Hong Kong"),
                    (RetailWealth, "Wealth and Personal Banking"),
                    (CorporateCommercial, "Commercial Banking"),
                    (MarketsTreasury, "Global Banking and Markets"),
                ],
                net_interest_income: m(5_875),
                non_interest_income: m(1_973),
                operating_expenses: m(-2_310),
                provisions: m(-864),
                total_loans: m(230_139),
                total_deposits: m(517_406),
                npl_ratio: pct(160),
                cet1_ratio: pct(1_620),
            },
            Bank::ScHk => BankProfile {
                bank,
                currency: Currency::HKD,
                source_document: "Standard Chartered PLC Half Year Report 2025.pdf",
                income_page: 52,
                balance_page: 58,
                labels: [
                    (Group, "Hong Kong"),
                    (RetailWealth, "Consumer, Private and Business Banking"),
                    (CorporateCommercial, "Corporate, Commercial and Institutional Banking"),
                    (MarketsTreasury, "CCIB Large Corporates and Financial Institutions"),
                ],
                net_interest_income: m(14_500),
                non_interest_income: m(9_500),
                operating_expenses: m(-11_000),
                provisions: m(-1_200),
                total_loans: m(950_000),
                total_deposits: m(1_250_000),
                npl_ratio: pct(150),
                cet1_ratio: pct(1_430),
            },
            Bank::BocHk => BankProfile {
                bank,
                currency: Currency::HKD,
                source_document: "BOC HONG KONG (HOLDINGS) LIMITED Data Pack 1H2025.pdf",
                income_page: 8,
                balance_page: 14,
                labels: [
                    (Group, "Group Total"),
                    (RetailWealth, "Personal Banking"),
                    (CorporateCommercial, "Corporate Banking"),
                    (MarketsTreasury, "Treasury"),
                ],
                net_interest_income: m(25_063),
                non_interest_income: m(14_959),
                operating_expenses: m(-8_310),
                provisions: m(-3_318),
                total_loans: m(1_710_380),
                total_deposits: m(2_875_521),
                npl_ratio: pct(102),
                cet1_ratio: pct(2_369),
            },
            Bank::HangSeng => BankProfile {
                bank,
                currency: Currency::HKD,
                source_document: "Hang Seng Bank 2025 Interim Report.pdf",
                income_page: 21,
                balance_page: 44,
                labels: [
                    (Group, "Group Total"),
                    (RetailWealth, "Wealth and Personal Banking"),
                    (CorporateCommercial, "Commercial Banking"),
                    (MarketsTreasury, "Global Banking and Markets"),
                ],
                net_interest_income: m(14_339),
                non_interest_income: m(6_636),
                operating_expenses: m(-7_565),
                provisions: m(-4_861),
                total_loans: m(803_356),
                total_deposits: m(1_299_986),
                npl_ratio: pct(285),
                cet1_ratio: pct(2_130),
            },
        }
    }

    /// Scale applied to 1H 2025 figures for earlier periods
    pub fn time_factor(period: &str) -> Decimal {
        match period {
            "2024 1H" => Decimal::new(92, 2),
            "2024 2H" => Decimal::new(96, 2),
            _ => Decimal::ONE,
        }
    }

    /// Share of the Group figure disclosed under a segment
    pub fn segment_weight(segment: StandardizedSegment) -> Decimal {
        match segment {
            StandardizedSegment::RetailWealth => Decimal::new(45, 2),
            StandardizedSegment::CorporateCommercial => Decimal::new(35, 2),
            StandardizedSegment::MarketsTreasury => Decimal::new(20, 2),
            _ => Decimal::ONE,
        }
    }

    /// Every record the bank's document discloses for `period`
    pub fn records(&self, period: &str, source_document_id: &str) -> Vec<ExtractionRecord> {
        let factor = Self::time_factor(period);
        let mut records = Vec::new();

        for (segment, label) in self.labels {
            let weight = Self::segment_weight(segment);
            let apply = |v: Decimal| round(v * factor * weight, 0);

            let nii = apply(self.net_interest_income);
            let non_nii = apply(self.non_interest_income);
            let opex = apply(self.operating_expenses);
            let provisions = apply(self.provisions);
            let other = apply(self.non_interest_income * Decimal::new(1, 1));
            let operating_profit = nii + non_nii + other + opex;
            let pretax = operating_profit + provisions;

            let lines = [
                (NET_INTEREST_INCOME, nii, self.income_page),
                (NON_INTEREST_INCOME, non_nii, self.income_page),
                (OTHER_INCOME, other, self.income_page),
                (OPERATING_EXPENSES, opex, self.income_page),
                (OPERATING_PROFIT, operating_profit, self.income_page),
                (PROVISIONS, provisions, self.income_page),
                (PRETAX_EARNINGS, pretax, self.income_page),
                (TOTAL_LOANS, apply(self.total_loans), self.balance_page),
                (TOTAL_DEPOSITS, apply(self.total_deposits), self.balance_page),
            ];

            for (metric, value, page) in lines {
                records.push(ExtractionRecord::new(
                    self.bank,
                    period,
                    metric,
                    label,
                    &disclosed(value),
                    UNIT_MILLIONS,
                    self.currency.code(),
                    source_document_id,
                    page,
                ));
            }

            // Ratios are only disclosed for the whole bank
            if segment == StandardizedSegment::Group {
                for (metric, value) in [(NPL_RATIO, self.npl_ratio), (CET1_RATIO, self.cet1_ratio)] {
                    records.push(ExtractionRecord::new(
                        self.bank,
                        period,
                        metric,
                        label,
                        &value.to_string(),
                        UNIT_PERCENT,
                        self.currency.code(),
                        source_document_id,
                        self.balance_page,
                    ));
                }
            }
        }

        records
    }
}

/// Figure the way a filing prints it: separators, negatives in parentheses
fn disclosed(value: Decimal) -> String {
    if value.is_sign_negative() && !value.is_zero() {
        format!("({})", grouped(value.abs(), 0))
    } else {
        grouped(value, 0)
    }
}
