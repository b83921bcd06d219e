// 🏗️ Extractor Framework - document blob → extraction records
//
// DocumentExtractor is the only required interface. Adding a document
// format means adding an implementation; nothing downstream changes.
//
// Two formats today:
//   - CSV extraction sheet (analyst-keyed or exported from a data pack)
//   - Bank profile (deterministic stand-in for PDF text extraction)

use crate::model::{ExtractionRecord, IngestedDocument};
use crate::profiles::BankProfile;
use anyhow::{bail, Context, Result};
use serde::Deserialize;

// ============================================================================
// CORE TRAITS
// ============================================================================

pub trait DocumentExtractor: Send + Sync {
    /// Extract every disclosed figure. The document supplies bank, period and id.
    fn extract(&self, blob: &[u8], document: &IngestedDocument) -> Result<Vec<ExtractionRecord>>;

    /// Name used in logs and audit events
    fn name(&self) -> &'static str;

    fn version(&self) -> &str {
        "1.0"
    }
}

/// Optional capability: check if the extractor understands a blob
pub trait ContentSniffer {
    fn can_extract(&self, blob: &[u8]) -> bool;
}

// ============================================================================
// CSV EXTRACTION SHEET
// ============================================================================

/// Columns every extraction sheet must carry
pub const SHEET_COLUMNS: [&str; 6] = ["metric", "segment", "value", "unit", "currency", "page"];

#[derive(Debug, Deserialize)]
struct SheetRow {
    metric: String,
    segment: String,
    value: String,
    unit: String,
    currency: String,
    page: u32,
    #[serde(default)]
    snippet: Option<String>,
}

/// Reads `metric,segment,value,unit,currency,page[,snippet]` rows
pub struct CsvSheetExtractor;

impl ContentSniffer for CsvSheetExtractor {
    fn can_extract(&self, blob: &[u8]) -> bool {
        let first_line = blob
            .split(|b| *b == b'\n')
            .next()
            .map(|line| String::from_utf8_lossy(line).to_lowercase())
            .unwrap_or_default();
        let headers: Vec<&str> = first_line.split(',').map(|h| h.trim()).collect();

        SHEET_COLUMNS.iter().all(|col| headers.contains(col))
    }
}

impl DocumentExtractor for CsvSheetExtractor {
    fn extract(&self, blob: &[u8], document: &IngestedDocument) -> Result<Vec<ExtractionRecord>> {
        if !self.can_extract(blob) {
            bail!(
                "{} is not an extraction sheet (expected columns: {})",
                document.name,
                SHEET_COLUMNS.join(",")
            );
        }

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(blob);
        let headers: csv::StringRecord = rdr
            .headers()
            .context("Failed to read sheet header")?
            .iter()
            .map(|h| h.to_lowercase())
            .collect();
        rdr.set_headers(headers);

        let mut records = Vec::new();

        for (i, result) in rdr.deserialize().enumerate() {
            // Header is line 1
            let row: SheetRow =
                result.with_context(|| format!("Failed to read sheet row on line {}", i + 2))?;

            let mut record = ExtractionRecord::new(
                document.bank,
                &document.period,
                &row.metric,
                &row.segment,
                &row.value,
                &row.unit,
                &row.currency,
                &document.id,
                row.page,
            );
            if let Some(snippet) = row.snippet.filter(|s| !s.is_empty()) {
                record = record.with_snippet(&snippet);
            }
            records.push(record);
        }

        Ok(records)
    }

    fn name(&self) -> &'static str {
        "csv-sheet"
    }
}

// ============================================================================
// BANK PROFILE
// ============================================================================

/// Produces the bank's profile disclosures for the document's period
pub struct ProfileExtractor;

impl DocumentExtractor for ProfileExtractor {
    fn extract(&self, _blob: &[u8], document: &IngestedDocument) -> Result<Vec<ExtractionRecord>> {
        let profile = BankProfile::for_bank(document.bank);
        Ok(profile.records(&document.period, &document.id))
    }

    fn name(&self) -> &'static str {
        "bank-profile"
    }
}

// ============================================================================
// FACTORY
// ============================================================================

/// Pick the extractor for a blob: extraction sheets by header, everything else by profile
pub fn get_extractor(blob: &[u8]) -> Box<dyn DocumentExtractor> {
    if CsvSheetExtractor.can_extract(blob) {
        Box::new(CsvSheetExtractor)
    } else {
        Box::new(ProfileExtractor)
    }
}
