// 🧭 Standardized Segment - the common taxonomy every bank is mapped into

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StandardizedSegment {
    #[serde(rename = "Group (Total)")]
    Group,

    #[serde(rename = "Retail & Wealth")]
    RetailWealth,

    #[serde(rename = "Corporate & Commercial")]
    CorporateCommercial,

    #[serde(rename = "Global Markets / Treasury")]
    MarketsTreasury,

    /// Sentinel for labels the taxonomy has no rule for. Never a mapping target.
    #[serde(rename = "Unclassified")]
    Unclassified,
}

impl StandardizedSegment {
    /// Segments an analyst can select (the sentinel is excluded)
    pub const SELECTABLE: [StandardizedSegment; 4] = [
        StandardizedSegment::Group,
        StandardizedSegment::RetailWealth,
        StandardizedSegment::CorporateCommercial,
        StandardizedSegment::MarketsTreasury,
    ];

    /// Business segments whose sum should approximate the group total
    pub const BUSINESS: [StandardizedSegment; 3] = [
        StandardizedSegment::RetailWealth,
        StandardizedSegment::CorporateCommercial,
        StandardizedSegment::MarketsTreasury,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StandardizedSegment::Group => "Group (Total)",
            StandardizedSegment::RetailWealth => "Retail & Wealth",
            StandardizedSegment::CorporateCommercial => "Corporate & Commercial",
            StandardizedSegment::MarketsTreasury => "Global Markets / Treasury",
            StandardizedSegment::Unclassified => "Unclassified",
        }
    }

    /// Short code for CLI arguments and storage
    pub fn code(&self) -> &'static str {
        match self {
            StandardizedSegment::Group => "group",
            StandardizedSegment::RetailWealth => "retail",
            StandardizedSegment::CorporateCommercial => "corporate",
            StandardizedSegment::MarketsTreasury => "markets",
            StandardizedSegment::Unclassified => "unclassified",
        }
    }

    pub fn is_business_segment(&self) -> bool {
        StandardizedSegment::BUSINESS.contains(self)
    }
}

impl fmt::Display for StandardizedSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StandardizedSegment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        [
            StandardizedSegment::Group,
            StandardizedSegment::RetailWealth,
            StandardizedSegment::CorporateCommercial,
            StandardizedSegment::MarketsTreasury,
            StandardizedSegment::Unclassified,
        ]
        .into_iter()
        .find(|seg| seg.code() == needle || seg.as_str().to_lowercase() == needle)
        .ok_or_else(|| format!("Unknown segment: {}", s))
    }
}
