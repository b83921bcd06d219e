// 🏷️ Taxonomy Registry - Rules as Data
// Maps each bank's native segment labels into the standardized segments,
// plus the geographic policy used to slice supranational disclosures.
//
// The registry is read-only once built. A taxonomy revision builds a whole
// new registry (code defaults or a JSON file) and swaps it in as one unit.

use crate::entities::{Bank, StandardizedSegment};
use crate::error::NormalizeError;
use anyhow::{bail, Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

// ============================================================================
// RULE DEFINITIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentMappingRule {
    /// Rule ID cited in the audit trail
    pub id: String,

    pub bank: Bank,

    /// Bank-native label as it appears in the filing
    pub raw_label: String,

    pub segment: StandardizedSegment,

    /// Classification caveat shown to analysts (e.g. SME allocation variance)
    #[serde(default)]
    pub note: Option<String>,

    #[serde(default = "default_rule_version")]
    pub version: u32,
}

fn default_rule_version() -> u32 {
    1
}

impl SegmentMappingRule {
    pub fn new(id: &str, bank: Bank, raw_label: &str, segment: StandardizedSegment) -> Self {
        SegmentMappingRule {
            id: id.to_string(),
            bank,
            raw_label: raw_label.to_string(),
            segment,
            note: None,
            version: 1,
        }
    }

    /// Builder: attach a classification caveat
    pub fn with_note(mut self, note: &str) -> Self {
        self.note = Some(note.to_string());
        self
    }

    /// Check if this rule covers the given bank-native label
    pub fn matches(&self, bank: Bank, label: &str) -> bool {
        self.bank == bank && normalize_label(&self.raw_label) == normalize_label(label)
    }
}

/// Level at which a bank discloses segment figures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "level", rename_all = "snake_case")]
pub enum GeoScope {
    /// Figures already cover only the target jurisdiction
    Jurisdiction { code: String },
    /// Figures cover a region wider than the target jurisdiction
    Supranational { region: String },
}

impl GeoScope {
    pub fn is_supranational(&self) -> bool {
        matches!(self, GeoScope::Supranational { .. })
    }
}

/// Documented way of obtaining the jurisdiction slice from a supranational disclosure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoSlicingRule {
    pub id: String,
    pub bank: Bank,
    /// None covers every metric for the bank
    #[serde(default)]
    pub metric: Option<String>,
    pub description: String,
}

impl GeoSlicingRule {
    pub fn covers(&self, bank: Bank, metric: &str) -> bool {
        self.bank == bank
            && self
                .metric
                .as_deref()
                .map_or(true, |m| m.eq_ignore_ascii_case(metric.trim()))
    }
}

/// Result of resolving a label
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentResolution<'a> {
    pub segment: StandardizedSegment,
    pub note: Option<&'a str>,
    pub rule: &'a SegmentMappingRule,
}

/// On-disk shape of a taxonomy revision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonomyFile {
    pub version: String,
    pub rules: Vec<SegmentMappingRule>,
    #[serde(default)]
    pub scopes: HashMap<Bank, GeoScope>,
    #[serde(default)]
    pub slicing_rules: Vec<GeoSlicingRule>,
}

/// Case, whitespace and "&"/"and" insensitive comparison key
pub fn normalize_label(label: &str) -> String {
    label
        .to_lowercase()
        .replace('&', " and ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// TAXONOMY REGISTRY
// ============================================================================

#[derive(Debug, Clone)]
pub struct TaxonomyRegistry {
    version: String,
    rules: Vec<SegmentMappingRule>,
    scopes: HashMap<Bank, GeoScope>,
    slicing_rules: Vec<GeoSlicingRule>,
}

impl TaxonomyRegistry {
    /// Build a registry, rejecting internally inconsistent rule sets
    pub fn new(
        version: &str,
        rules: Vec<SegmentMappingRule>,
        scopes: HashMap<Bank, GeoScope>,
        slicing_rules: Vec<GeoSlicingRule>,
    ) -> Result<Self> {
        if version.trim().is_empty() {
            bail!("Taxonomy version must not be empty");
        }

        let mut seen = HashSet::new();
        for rule in &rules {
            if rule.segment == StandardizedSegment::Unclassified {
                bail!("Rule {} maps to Unclassified, which is not a mapping target", rule.id);
            }
            if !seen.insert((rule.bank, normalize_label(&rule.raw_label))) {
                bail!(
                    "Duplicate rule for {} label {:?} (rule {})",
                    rule.bank.code(),
                    rule.raw_label,
                    rule.id
                );
            }
        }

        Ok(TaxonomyRegistry {
            version: version.to_string(),
            rules,
            scopes,
            slicing_rules,
        })
    }

    /// Load a taxonomy revision from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read taxonomy file: {:?}", path.as_ref()))?;

        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let file: TaxonomyFile =
            serde_json::from_str(content).context("Failed to parse taxonomy JSON")?;

        Self::new(&file.version, file.rules, file.scopes, file.slicing_rules)
    }

    /// Export this revision in the on-disk shape
    pub fn to_file(&self) -> TaxonomyFile {
        TaxonomyFile {
            version: self.version.clone(),
            rules: self.rules.clone(),
            scopes: self.scopes.clone(),
            slicing_rules: self.slicing_rules.clone(),
        }
    }

    /// The Hong Kong peer taxonomy: HSBC, Standard Chartered, BOC HK, Hang Seng
    pub fn hong_kong_default() -> Self {
        use StandardizedSegment::*;

        const SME_VARIANCE: &str = "SCB books Small Business in CPBB while HSBC books SMEs in CMB. \
                                    Slight variance in SME classification remains.";

        let rules = vec![
            // HSBC: Hong Kong geo slice of the Asia segment
            SegmentMappingRule::new("hsbc-group", Bank::HsbcHk, "Hong Kong", Group)
                .with_note("Uses the Hong Kong geo slice from the Data Pack, not global HSBC Holdings numbers."),
            SegmentMappingRule::new("hsbc-wpb", Bank::HsbcHk, "Wealth and Personal Banking", RetailWealth)
                .with_note("Private Banking included in WPB."),
            SegmentMappingRule::new("hsbc-cmb", Bank::HsbcHk, "Commercial Banking", CorporateCommercial)
                .with_note(SME_VARIANCE),
            SegmentMappingRule::new("hsbc-gbm", Bank::HsbcHk, "Global Banking and Markets", MarketsTreasury),
            // Standard Chartered
            SegmentMappingRule::new("scb-group", Bank::ScHk, "Hong Kong", Group),
            SegmentMappingRule::new("scb-cpbb", Bank::ScHk, "Consumer, Private and Business Banking", RetailWealth)
                .with_note(
                    "Private Banking explicitly mapped to Retail to match HSBC's WPB structure. \
                     SCB books Small Business in CPBB; slight variance in SME classification remains.",
                ),
            SegmentMappingRule::new(
                "scb-ccib-commercial",
                Bank::ScHk,
                "Corporate, Commercial and Institutional Banking",
                CorporateCommercial,
            )
            .with_note("Commercial portion only: clients with turnover below $500m."),
            SegmentMappingRule::new(
                "scb-ccib-large",
                Bank::ScHk,
                "CCIB Large Corporates and Financial Institutions",
                MarketsTreasury,
            )
            .with_note("Clients with turnover above $500m, where the breakdown is available."),
            // BOC Hong Kong
            SegmentMappingRule::new("boc-group", Bank::BocHk, "Group Total", Group),
            SegmentMappingRule::new("boc-personal", Bank::BocHk, "Personal Banking", RetailWealth),
            SegmentMappingRule::new("boc-corporate", Bank::BocHk, "Corporate Banking", CorporateCommercial)
                .with_note("Trade finance and cash management fully included."),
            SegmentMappingRule::new("boc-treasury", Bank::BocHk, "Treasury", MarketsTreasury)
                .with_note("Includes proprietary trading, balance sheet management and investment portfolios."),
            // Hang Seng
            SegmentMappingRule::new("hase-group", Bank::HangSeng, "Group Total", Group),
            SegmentMappingRule::new("hase-wpb", Bank::HangSeng, "Wealth and Personal Banking", RetailWealth),
            SegmentMappingRule::new("hase-cmb", Bank::HangSeng, "Commercial Banking", CorporateCommercial)
                .with_note(SME_VARIANCE),
            SegmentMappingRule::new("hase-gbm", Bank::HangSeng, "Global Banking and Markets", MarketsTreasury),
        ];

        let scopes = HashMap::from([
            (Bank::HsbcHk, GeoScope::Supranational { region: "Asia".to_string() }),
            (Bank::ScHk, GeoScope::Supranational { region: "Asia".to_string() }),
            (Bank::BocHk, GeoScope::Jurisdiction { code: "HK".to_string() }),
            (Bank::HangSeng, GeoScope::Jurisdiction { code: "HK".to_string() }),
        ]);

        let slicing_rules = vec![
            GeoSlicingRule {
                id: "hsbc-hk-geo".to_string(),
                bank: Bank::HsbcHk,
                metric: None,
                description: "Filtered for \"Hong Kong\" geo-code within Asia segment (Data Pack, Hong Kong business)."
                    .to_string(),
            },
            GeoSlicingRule {
                id: "scb-hk-geo".to_string(),
                bank: Bank::ScHk,
                metric: None,
                description: "Hong Kong geographic booking taken from the geographic segment note."
                    .to_string(),
            },
        ];

        // Rules above are unique and never target Unclassified
        TaxonomyRegistry {
            version: "HK-2025.1".to_string(),
            rules,
            scopes,
            slicing_rules,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Resolve a bank-native label. Never defaults: unmapped labels are an error.
    pub fn resolve(&self, bank: Bank, raw_label: &str) -> Result<SegmentResolution<'_>, NormalizeError> {
        self.rules
            .iter()
            .find(|rule| rule.matches(bank, raw_label))
            .map(|rule| SegmentResolution {
                segment: rule.segment,
                note: rule.note.as_deref(),
                rule,
            })
            .ok_or_else(|| NormalizeError::UnmappedSegment {
                bank,
                label: raw_label.to_string(),
            })
    }

    /// Disclosure level for the bank; banks without a scope report at jurisdiction level
    pub fn geo_scope(&self, bank: Bank) -> GeoScope {
        self.scopes
            .get(&bank)
            .cloned()
            .unwrap_or_else(|| GeoScope::Jurisdiction { code: "HK".to_string() })
    }

    /// Metric-specific rules win over bank-wide ones
    pub fn slicing_rule(&self, bank: Bank, metric: &str) -> Option<&GeoSlicingRule> {
        let covering = self.slicing_rules.iter().filter(|r| r.covers(bank, metric));
        let mut fallback = None;
        for rule in covering {
            if rule.metric.is_some() {
                return Some(rule);
            }
            fallback.get_or_insert(rule);
        }
        fallback
    }

    /// Rules for one bank (for the Rules & Logic view)
    pub fn rules_for(&self, bank: Bank) -> Vec<&SegmentMappingRule> {
        self.rules.iter().filter(|r| r.bank == bank).collect()
    }

    pub fn rules(&self) -> &[SegmentMappingRule] {
        &self.rules
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

impl Default for TaxonomyRegistry {
    fn default() -> Self {
        Self::hong_kong_default()
    }
}

// ============================================================================
// TESTS
// ============================================================================
