// 📅 Reporting Period - "2025 1H", "2024 Q3", "2024 FY"
//
// The period-end date is the as-of date for FX lookups: spot rates are taken
// at period end, average rates are keyed by the period they average over.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Frequency {
    Quarterly,
    #[serde(rename = "Semi-Annual")]
    SemiAnnual,
    Annual,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Quarterly => "Quarterly",
            Frequency::SemiAnnual => "Semi-Annual",
            Frequency::Annual => "Annual",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum PeriodPart {
    Half(u8),
    Quarter(u8),
    FullYear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReportingPeriod {
    year: i32,
    part: PeriodPart,
}

impl ReportingPeriod {
    pub fn half(year: i32, half: u8) -> Option<Self> {
        matches!(half, 1 | 2).then_some(ReportingPeriod {
            year,
            part: PeriodPart::Half(half),
        })
    }

    pub fn quarter(year: i32, quarter: u8) -> Option<Self> {
        (1..=4).contains(&quarter).then_some(ReportingPeriod {
            year,
            part: PeriodPart::Quarter(quarter),
        })
    }

    pub fn full_year(year: i32) -> Self {
        ReportingPeriod {
            year,
            part: PeriodPart::FullYear,
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn frequency(&self) -> Frequency {
        match self.part {
            PeriodPart::Half(_) => Frequency::SemiAnnual,
            PeriodPart::Quarter(_) => Frequency::Quarterly,
            PeriodPart::FullYear => Frequency::Annual,
        }
    }

    /// Last calendar day of the period
    pub fn end_date(&self) -> NaiveDate {
        let (month, day) = match self.part {
            PeriodPart::Half(1) => (6, 30),
            PeriodPart::Half(_) => (12, 31),
            PeriodPart::Quarter(1) => (3, 31),
            PeriodPart::Quarter(2) => (6, 30),
            PeriodPart::Quarter(3) => (9, 30),
            PeriodPart::Quarter(_) => (12, 31),
            PeriodPart::FullYear => (12, 31),
        };
        // month/day pairs above are valid for every year
        NaiveDate::from_ymd_opt(self.year, month, day).unwrap_or(NaiveDate::MIN)
    }

    /// Canonical label, e.g. "2025 1H"
    pub fn label(&self) -> String {
        match self.part {
            PeriodPart::Half(h) => format!("{} {}H", self.year, h),
            PeriodPart::Quarter(q) => format!("{} Q{}", self.year, q),
            PeriodPart::FullYear => format!("{} FY", self.year),
        }
    }

    fn parse_part(token: &str) -> Option<PeriodPart> {
        let token = token.to_uppercase();
        match token.as_str() {
            "1H" | "H1" => Some(PeriodPart::Half(1)),
            "2H" | "H2" => Some(PeriodPart::Half(2)),
            "FY" | "ANNUAL" => Some(PeriodPart::FullYear),
            _ => {
                let digits = token.strip_prefix('Q').or_else(|| token.strip_suffix('Q'))?;
                match digits.parse::<u8>().ok()? {
                    q @ 1..=4 => Some(PeriodPart::Quarter(q)),
                    _ => None,
                }
            }
        }
    }
}

impl fmt::Display for ReportingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl FromStr for ReportingPeriod {
    type Err = String;

    /// Accepts "2025 1H", "1H 2025", "2025 Q2", "2Q 2025", "2024 FY"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = s.split_whitespace().collect();
        if tokens.len() != 2 {
            return Err(format!("Invalid period: {:?}", s));
        }

        let (year, part) = match (tokens[0].parse::<i32>(), tokens[1].parse::<i32>()) {
            (Ok(year), _) => (year, Self::parse_part(tokens[1])),
            (_, Ok(year)) => (year, Self::parse_part(tokens[0])),
            _ => return Err(format!("Invalid period: {:?}", s)),
        };

        if !(1900..=2999).contains(&year) {
            return Err(format!("Invalid period year: {:?}", s));
        }

        part.map(|part| ReportingPeriod { year, part })
            .ok_or_else(|| format!("Invalid period: {:?}", s))
    }
}

impl TryFrom<String> for ReportingPeriod {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ReportingPeriod> for String {
    fn from(period: ReportingPeriod) -> Self {
        period.label()
    }
}

impl Ord for ReportingPeriod {
    fn cmp(&self, other: &Self) -> Ordering {
        self.end_date()
            .cmp(&other.end_date())
            .then_with(|| self.label().cmp(&other.label()))
    }
}

impl PartialOrd for ReportingPeriod {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
