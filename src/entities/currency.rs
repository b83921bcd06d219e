// 💱 Currency - reporting and display currencies

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Currency {
    HKD,
    USD,
    GBP,
}

impl Currency {
    /// ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::HKD => "HKD",
            Currency::USD => "USD",
            Currency::GBP => "GBP",
        }
    }

    /// Prefix used in the comparison grid. HKD is the currency of record and shows bare.
    pub fn display_symbol(&self) -> &'static str {
        match self {
            Currency::HKD => "",
            Currency::USD => "$",
            Currency::GBP => "£",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "HKD" => Ok(Currency::HKD),
            "USD" => Ok(Currency::USD),
            "GBP" => Ok(Currency::GBP),
            other => Err(format!("Unsupported currency: {}", other)),
        }
    }
}
