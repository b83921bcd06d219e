// 🧾 Records - raw facts, audit steps and standardized data points
//
// ExtractionRecord is the VALUE captured from a document: never mutated.
// StandardizedDataPoint is DERIVED from exactly one record and carries the
// full ordered list of steps that produced it.

use crate::entities::{Bank, Currency, Frequency, StandardizedSegment};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// EXTRACTION RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    /// Deterministic id: same fact from the same document -> same id
    pub id: String,
    pub metric: String,
    /// Figure exactly as disclosed, e.g. "5,875" or "(2,310)"
    pub raw_value: String,
    /// Scale as disclosed: "m", "bn" or "%"
    pub raw_unit: String,
    pub raw_currency: String,
    /// Bank-native segment label, e.g. "Wealth and Personal Banking"
    pub raw_segment_label: String,
    pub bank: Bank,
    pub period: String,
    pub source_document_id: String,
    pub page_number: u32,
    /// Verbatim text the figure was read from
    pub raw_snippet: String,
}

impl ExtractionRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bank: Bank,
        period: &str,
        metric: &str,
        raw_segment_label: &str,
        raw_value: &str,
        raw_unit: &str,
        raw_currency: &str,
        source_document_id: &str,
        page_number: u32,
    ) -> Self {
        let mut record = ExtractionRecord {
            id: String::new(),
            metric: metric.trim().to_string(),
            raw_value: raw_value.trim().to_string(),
            raw_unit: raw_unit.trim().to_string(),
            raw_currency: raw_currency.trim().to_string(),
            raw_segment_label: raw_segment_label.trim().to_string(),
            bank,
            period: period.trim().to_string(),
            source_document_id: source_document_id.to_string(),
            page_number,
            raw_snippet: String::new(),
        };
        record.id = record.compute_id();
        record.raw_snippet = format!("{} .................... {}", record.metric, record.raw_value);
        record
    }

    /// Builder: replace the default snippet with the verbatim source text
    pub fn with_snippet(mut self, snippet: &str) -> Self {
        self.raw_snippet = snippet.to_string();
        self
    }

    /// Compute the record id from the fact's identity, not its value.
    /// Re-extracting a corrected figure from the same document keeps the id.
    pub fn compute_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}|{}|{}|{}|{}",
            self.source_document_id,
            self.bank.code(),
            self.period,
            self.metric,
            self.raw_segment_label
        ));
        format!("rec-{:x}", hasher.finalize())
    }
}

// ============================================================================
// NORMALIZATION STEP
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepName {
    Extraction,
    SegmentMapping,
    GeoFiltering,
    CurrencyConversion,
    Aggregation,
}

impl StepName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::Extraction => "Extraction",
            StepName::SegmentMapping => "Segment Mapping",
            StepName::GeoFiltering => "Geographic Filtering",
            StepName::CurrencyConversion => "Currency Conversion",
            StepName::Aggregation => "Aggregation",
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationStep {
    /// 1-based position in the audit trail
    pub sequence: u32,
    pub step_name: StepName,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transformed_output: Option<String>,
    pub status: StepStatus,
}

impl NormalizationStep {
    pub fn is_warning(&self) -> bool {
        self.status == StepStatus::Warning
    }
}

// ============================================================================
// STANDARDIZED DATA POINT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardizedDataPoint {
    pub id: String,
    pub metric: String,
    pub bank: Bank,
    /// Canonical period label, e.g. "2025 1H"
    pub period: String,
    pub year: i32,
    pub frequency: Frequency,
    pub segment: StandardizedSegment,
    /// The bank-native label the segment was mapped from
    pub original_segment: String,
    pub value: Decimal,
    /// Always the target currency of record
    pub currency: Currency,
    pub unit: String,
    pub record_id: String,
    pub source_document_id: String,
    pub page_number: u32,
    pub taxonomy_version: String,
    pub steps: Vec<NormalizationStep>,
}

impl StandardizedDataPoint {
    /// Point id derived from the record it traces to
    pub fn id_for_record(record_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("point|{}", record_id));
        let digest = format!("{:x}", hasher.finalize());
        format!("sdp-{}", &digest[..24])
    }

    pub fn is_percent(&self) -> bool {
        self.unit == crate::entities::metric::UNIT_PERCENT
    }

    pub fn has_warnings(&self) -> bool {
        self.steps.iter().any(|s| s.is_warning())
    }

    /// Traceable, non-empty trail that starts with Extraction
    pub fn is_well_formed(&self) -> bool {
        !self.record_id.is_empty()
            && self
                .steps
                .first()
                .is_some_and(|s| s.step_name == StepName::Extraction)
            && self
                .steps
                .iter()
                .enumerate()
                .all(|(i, s)| s.sequence as usize == i + 1)
    }

    /// Append a step at the end of the trail
    pub fn push_step(
        &mut self,
        step_name: StepName,
        description: String,
        io: Option<(String, String)>,
        status: StepStatus,
    ) {
        let (raw_input, transformed_output) = match io {
            Some((input, output)) => (Some(input), Some(output)),
            None => (None, None),
        };
        self.steps.push(NormalizationStep {
            sequence: self.steps.len() as u32 + 1,
            step_name,
            description,
            raw_input,
            transformed_output,
            status,
        });
    }
}

// ============================================================================
// FAILED EXTRACTION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedExtraction {
    pub record_id: String,
    pub metric: String,
    pub reason: String,
}

impl fmt::Display for FailedExtraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.metric, self.record_id, self.reason)
    }
}

// ============================================================================
// INGESTED DOCUMENT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DocumentType {
    Pdf,
    Excel,
    Csv,
    Other,
}

impl DocumentType {
    pub fn from_filename(filename: &str) -> Self {
        let lower = filename.to_lowercase();
        if lower.ends_with(".pdf") {
            DocumentType::Pdf
        } else if lower.ends_with(".xlsx") || lower.ends_with(".xls") {
            DocumentType::Excel
        } else if lower.ends_with(".csv") {
            DocumentType::Csv
        } else {
            DocumentType::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Pdf => "PDF",
            DocumentType::Excel => "EXCEL",
            DocumentType::Csv => "CSV",
            DocumentType::Other => "OTHER",
        }
    }
}

impl FromStr for DocumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PDF" => Ok(DocumentType::Pdf),
            "EXCEL" => Ok(DocumentType::Excel),
            "CSV" => Ok(DocumentType::Csv),
            "OTHER" => Ok(DocumentType::Other),
            other => Err(format!("Unknown document type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Processing,
    Ready,
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Processing => "processing",
            DocumentStatus::Ready => "ready",
            DocumentStatus::Error => "error",
        }
    }
}

impl FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "processing" => Ok(DocumentStatus::Processing),
            "ready" => Ok(DocumentStatus::Ready),
            "error" => Ok(DocumentStatus::Error),
            other => Err(format!("Unknown document status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestedDocument {
    pub id: String,
    pub name: String,
    pub doc_type: DocumentType,
    pub size_bytes: u64,
    pub upload_date: chrono::NaiveDate,
    pub status: DocumentStatus,
    pub bank: Bank,
    pub period: String,
    /// Records that could not be normalized; never hidden behind "ready"
    #[serde(default)]
    pub failed_records: u32,
}

impl IngestedDocument {
    /// New document in the processing state, with a fresh id
    pub fn new(name: &str, size_bytes: u64, bank: Bank, period: &str) -> Self {
        IngestedDocument {
            id: format!("doc-{}", uuid::Uuid::new_v4()),
            name: name.to_string(),
            doc_type: DocumentType::from_filename(name),
            size_bytes,
            upload_date: chrono::Utc::now().date_naive(),
            status: DocumentStatus::Processing,
            bank,
            period: period.to_string(),
            failed_records: 0,
        }
    }

    /// Size the way the document list shows it, e.g. "18.5 MB"
    pub fn size_label(&self) -> String {
        format!("{:.1} MB", self.size_bytes as f64 / 1024.0 / 1024.0)
    }
}

// ============================================================================
// TESTS
// ============================================================================
