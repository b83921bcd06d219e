// 🏦 Bank Entity - Peer banks covered by the comparison
//
// The code (HSBC_HK, SC_HK, ...) is IDENTITY: it is what storage, rules and
// APIs key on. The display name is a VALUE shown to analysts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// BANK
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Bank {
    #[serde(rename = "HSBC_HK")]
    HsbcHk,

    #[serde(rename = "SC_HK")]
    ScHk,

    #[serde(rename = "BOC_HK")]
    BocHk,

    #[serde(rename = "HANG_SENG")]
    HangSeng,
}

impl Bank {
    /// All peer banks, in the order the comparison grid lists them
    pub const ALL: [Bank; 4] = [Bank::HsbcHk, Bank::ScHk, Bank::BocHk, Bank::HangSeng];

    /// Stable code used in storage and APIs
    pub fn code(&self) -> &'static str {
        match self {
            Bank::HsbcHk => "HSBC_HK",
            Bank::ScHk => "SC_HK",
            Bank::BocHk => "BOC_HK",
            Bank::HangSeng => "HANG_SENG",
        }
    }

    /// Human-readable name for display
    pub fn display_name(&self) -> &'static str {
        match self {
            Bank::HsbcHk => "HSBC Hong Kong",
            Bank::ScHk => "Standard Chartered HK",
            Bank::BocHk => "BOC Hong Kong",
            Bank::HangSeng => "Hang Seng Bank",
        }
    }

    /// Alternative names analysts and documents use for the bank
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Bank::HsbcHk => &["hsbc", "hongkong and shanghai banking"],
            Bank::ScHk => &["scb", "standard chartered", "stanchart"],
            Bank::BocHk => &["boc", "bochk", "bank of china"],
            Bank::HangSeng => &["hang seng", "hase"],
        }
    }
}

impl fmt::Display for Bank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Bank {
    type Err = String;

    /// Accepts the code, the display name or an alias (case-insensitive)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();

        Bank::ALL
            .iter()
            .copied()
            .find(|bank| {
                bank.code().to_lowercase() == needle
                    || bank.display_name().to_lowercase() == needle
                    || bank.aliases().iter().any(|alias| *alias == needle)
            })
            .ok_or_else(|| format!("Unknown bank: {}", s))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bank_parses_code_name_and_alias() {
        assert_eq!("HSBC_HK".parse::<Bank>().unwrap(), Bank::HsbcHk);
        assert_eq!("hang seng bank".parse::<Bank>().unwrap(), Bank::HangSeng);
        assert_eq!("BOCHK".parse::<Bank>().unwrap(), Bank::BocHk);
        assert_eq!("Standard Chartered".parse::<Bank>().unwrap(), Bank::ScHk);
        assert!("Chase".parse::<Bank>().is_err());
    }

    #[test]
    fn test_bank_serializes_as_code() {
        let json = serde_json::to_string(&Bank::ScHk).unwrap();
        assert_eq!(json, "\"SC_HK\"");

        let back: Bank = serde_json::from_str("\"HANG_SENG\"").unwrap();
        assert_eq!(back, Bank::HangSeng);
    }
}
