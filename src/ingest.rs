// 📥 Ingestion - document blob → committed standardized points
//
// Flow per document:
//   1. Infer bank and period from the filename
//   2. Pick an extractor (extraction sheet header, else bank profile)
//   3. Normalize the batch (record failures never abort it)
//   4. Replace the (bank, period) slice in one transaction
//   5. Run the reconciliation check over what was committed
//
// The report always carries the failure count next to the committed count.

use crate::db::{Event, Store};
use crate::entities::{Bank, ReportingPeriod};
use crate::extract::get_extractor;
use crate::model::{DocumentStatus, FailedExtraction, IngestedDocument};
use crate::pipeline::NormalizationPipeline;
use crate::profiles::{BankProfile, SEED_PERIODS};
use crate::reconciliation::{ReconciliationChecker, ReconciliationFlag};
use crate::taxonomy::TaxonomyRegistry;
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

// ============================================================================
// FILENAME INFERENCE
// ============================================================================

/// Bank from filename. Plain substring match; unknown names fall back to HSBC.
pub fn infer_bank(filename: &str) -> Bank {
    let name = filename.to_lowercase();

    if name.contains("scb") || name.contains("standard chartered") {
        Bank::ScHk
    } else if name.contains("boc") || name.contains("bank of china") {
        Bank::BocHk
    } else if name.contains("hang seng") || name.contains("hase") {
        Bank::HangSeng
    } else {
        // "hsbc" and anything unrecognised
        Bank::HsbcHk
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Marker {
    Half(u8),
    Quarter(u8),
    FullYear,
}

fn parse_marker(text: &str) -> Option<Marker> {
    match text {
        "1h" | "h1" => Some(Marker::Half(1)),
        "2h" | "h2" => Some(Marker::Half(2)),
        "1q" | "q1" => Some(Marker::Quarter(1)),
        "2q" | "q2" => Some(Marker::Quarter(2)),
        "3q" | "q3" => Some(Marker::Quarter(3)),
        "4q" | "q4" => Some(Marker::Quarter(4)),
        "fy" => Some(Marker::FullYear),
        _ => None,
    }
}

fn parse_year(text: &str) -> Option<i32> {
    if text.len() == 4 && text.chars().all(|c| c.is_ascii_digit()) {
        text.parse().ok().filter(|y| (2000..2100).contains(y))
    } else {
        None
    }
}

/// Split "1h2025" / "2025h1" into marker and year
fn split_token(token: &str) -> (Option<Marker>, Option<i32>) {
    if let Some(year) = parse_year(token) {
        return (None, Some(year));
    }
    if let Some(marker) = parse_marker(token) {
        return (Some(marker), None);
    }
    if token.len() > 4 && token.is_char_boundary(token.len() - 4) && token.is_char_boundary(4) {
        let (head, tail) = token.split_at(token.len() - 4);
        if let (Some(marker), Some(year)) = (parse_marker(head), parse_year(tail)) {
            return (Some(marker), Some(year));
        }
        let (head, tail) = token.split_at(4);
        if let (Some(year), Some(marker)) = (parse_year(head), parse_marker(tail)) {
            return (Some(marker), Some(year));
        }
    }
    (None, None)
}

/// Period from filename tokens: "1H2025", "2Q 2025", "Interim Report 2025",
/// "Annual Report 2024". Data packs for the second and fourth quarter carry
/// the half-year figures, so 2Q maps to 1H and 4Q to 2H.
pub fn infer_period(filename: &str) -> Option<ReportingPeriod> {
    let lower = filename.to_lowercase();
    let cleaned: String = lower
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();
    let tokens: Vec<&str> = cleaned.split_whitespace().collect();

    let mut marker = None;
    let mut year = None;
    for token in &tokens {
        let (m, y) = split_token(token);
        if marker.is_none() {
            marker = m;
        }
        if year.is_none() {
            year = y;
        }
    }

    if marker.is_none() {
        if tokens.iter().any(|t| *t == "interim" || *t == "half") {
            marker = Some(Marker::Half(1));
        } else if tokens.iter().any(|t| *t == "annual") {
            marker = Some(Marker::FullYear);
        }
    }

    let year = year?;
    match marker? {
        Marker::Half(h) => ReportingPeriod::half(year, h),
        Marker::Quarter(2) => ReportingPeriod::half(year, 1),
        Marker::Quarter(4) => ReportingPeriod::half(year, 2),
        Marker::Quarter(q) => ReportingPeriod::quarter(year, q),
        Marker::FullYear => Some(ReportingPeriod::full_year(year)),
    }
}

// ============================================================================
// INGEST REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub document: IngestedDocument,
    pub extractor: String,
    /// Points committed for the document's (bank, period)
    pub committed: usize,
    /// Points from earlier documents that the commit replaced
    pub replaced: usize,
    pub failures: Vec<FailedExtraction>,
    pub flags: Vec<ReconciliationFlag>,
}

impl IngestReport {
    pub fn summary(&self) -> String {
        format!(
            "{} [{} {}]: {} committed, {} failed, {} replaced, {} reconciliation flags",
            self.document.name,
            self.document.bank.code(),
            self.document.period,
            self.committed,
            self.failures.len(),
            self.replaced,
            self.flags.len()
        )
    }
}

// ============================================================================
// INGESTOR
// ============================================================================

pub struct Ingestor {
    store: Arc<Store>,
    pipeline: RwLock<Arc<NormalizationPipeline>>,
    checker: ReconciliationChecker,
    default_period: String,
}

impl Ingestor {
    pub fn new(
        store: Arc<Store>,
        pipeline: NormalizationPipeline,
        checker: ReconciliationChecker,
        default_period: &str,
    ) -> Self {
        Ingestor {
            store,
            pipeline: RwLock::new(Arc::new(pipeline)),
            checker,
            default_period: default_period.to_string(),
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn checker(&self) -> &ReconciliationChecker {
        &self.checker
    }

    /// Snapshot of the pipeline in use; in-flight ingests keep theirs
    pub fn pipeline(&self) -> Result<Arc<NormalizationPipeline>> {
        self.pipeline
            .read()
            .map(|p| Arc::clone(&p))
            .map_err(|_| anyhow!("pipeline lock poisoned"))
    }

    /// Swap in a whole new taxonomy revision. Stored points keep the version they were built with.
    pub fn replace_taxonomy(&self, taxonomy: TaxonomyRegistry) -> Result<()> {
        let mut guard = self
            .pipeline
            .write()
            .map_err(|_| anyhow!("pipeline lock poisoned"))?;
        let version = taxonomy.version().to_string();
        *guard = Arc::new(guard.with_taxonomy(Arc::new(taxonomy)));
        info!(version = %version, "taxonomy replaced");
        Ok(())
    }

    /// Ingest a document, inferring bank and period from its filename
    pub fn ingest(&self, blob: &[u8], filename: &str) -> Result<IngestReport> {
        self.ingest_with(blob, filename, None, None)
    }

    /// Ingest with optional overrides; whatever is not given is inferred from the filename
    pub fn ingest_with(
        &self,
        blob: &[u8],
        filename: &str,
        bank: Option<Bank>,
        period: Option<&str>,
    ) -> Result<IngestReport> {
        let bank = bank.unwrap_or_else(|| infer_bank(filename));
        let period = match period {
            Some(p) => p.to_string(),
            None => infer_period(filename)
                .map(|p| p.label())
                .unwrap_or_else(|| self.default_period.clone()),
        };

        self.ingest_as(blob, filename, bank, &period)
    }

    /// Ingest a document for an explicit bank and period. The period is stored
    /// under its canonical label ("1H 2025" becomes "2025 1H") so replacement
    /// hits the slice the points live in.
    pub fn ingest_as(&self, blob: &[u8], filename: &str, bank: Bank, period: &str) -> Result<IngestReport> {
        let period = period
            .parse::<ReportingPeriod>()
            .map_err(|e| anyhow!(e))
            .with_context(|| format!("Cannot ingest {}", filename))?
            .label();
        let period = period.as_str();

        let mut document = IngestedDocument::new(filename, blob.len() as u64, bank, period);
        let extractor = get_extractor(blob);
        info!(
            document = %document.name,
            bank = bank.code(),
            period,
            extractor = extractor.name(),
            "ingesting document"
        );

        let records = match extractor.extract(blob, &document) {
            Ok(records) => records,
            Err(err) => {
                document.status = DocumentStatus::Error;
                self.store.save_document(&document)?;
                return Err(err.context(format!("Failed to extract {}", filename)));
            }
        };

        let pipeline = self.pipeline()?;
        let outcome = pipeline.normalize_batch(&records);
        document.failed_records = outcome.failures.len() as u32;

        // A document with nothing usable never wipes the data already held
        if outcome.points.is_empty() {
            document.status = DocumentStatus::Error;
            self.store.save_document(&document)?;
            self.store.record_event(&Event::new(
                "document_rejected",
                "document",
                &document.id,
                serde_json::json!({ "records": records.len(), "failed_records": outcome.failures.len() }),
                "ingestor",
            ))?;
            warn!(document = %document.name, failed = outcome.failures.len(), "no records normalized");

            return Ok(IngestReport {
                document,
                extractor: extractor.name().to_string(),
                committed: 0,
                replaced: 0,
                failures: outcome.failures,
                flags: Vec::new(),
            });
        }

        document.status = DocumentStatus::Ready;
        let summary = self
            .store
            .replace_bank_period(&document, &records, &outcome.points, &outcome.failures)
            .with_context(|| format!("Failed to commit {}", filename))?;

        let flags = self.checker.check(&outcome.points);

        let report = IngestReport {
            document,
            extractor: extractor.name().to_string(),
            committed: summary.inserted_points,
            replaced: summary.removed_points,
            failures: outcome.failures,
            flags,
        };
        info!(summary = %report.summary(), "document ingested");
        Ok(report)
    }

    /// Ingest independent documents in parallel; one result per input, in order
    pub fn ingest_many(&self, documents: &[(Vec<u8>, String)]) -> Vec<Result<IngestReport>> {
        std::thread::scope(|scope| {
            let handles: Vec<_> = documents
                .iter()
                .map(|(blob, filename)| scope.spawn(move || self.ingest(blob, filename)))
                .collect();

            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err(anyhow!("ingest worker panicked")))
                })
                .collect()
        })
    }

    /// Load every bank's profile for the seed periods
    pub fn seed(&self) -> Result<Vec<IngestReport>> {
        let mut reports = Vec::new();
        for bank in Bank::ALL {
            let profile = BankProfile::for_bank(bank);
            for period in SEED_PERIODS {
                reports.push(self.ingest_as(&[], profile.source_document, bank, period)?);
            }
        }
        Ok(reports)
    }

    /// Back to the seeded baseline: uploaded documents and every other period go
    pub fn reset(&self) -> Result<Vec<IngestReport>> {
        let summary = self.store.reset("ingestor").context("Failed to reset store")?;
        info!(removed_points = summary.removed_points, "store cleared, reseeding");
        self.seed()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::StandardizedSegment;

    fn create_test_ingestor() -> Ingestor {
        Ingestor::new(
            Arc::new(Store::open_in_memory().unwrap()),
            NormalizationPipeline::hong_kong_default(),
            ReconciliationChecker::new(),
            "2025 1H",
        )
    }

    #[test]
    fn test_infer_bank() {
        assert_eq!(infer_bank("Standard Chartered PLC Half Year Report 2025.pdf"), Bank::ScHk);
        assert_eq!(infer_bank("scb_1h25.xlsx"), Bank::ScHk);
        assert_eq!(infer_bank("BOC HONG KONG (HOLDINGS) LIMITED Data Pack 1H2025.pdf"), Bank::BocHk);
        assert_eq!(infer_bank("Bank of China HK interim.pdf"), Bank::BocHk);
        assert_eq!(infer_bank("Hang Seng Bank 2025 Interim Report.pdf"), Bank::HangSeng);
        assert_eq!(infer_bank("HSBC Holdings plc Data Pack 2Q 2025.pdf"), Bank::HsbcHk);
        assert_eq!(infer_bank("quarterly results.pdf"), Bank::HsbcHk);
    }

    #[test]
    fn test_infer_period() {
        let label = |name: &str| infer_period(name).map(|p| p.label());

        assert_eq!(label("BOC HONG KONG (HOLDINGS) LIMITED Data Pack 1H2025.pdf").as_deref(), Some("2025 1H"));
        assert_eq!(label("HSBC Holdings plc Data Pack 2Q 2025.pdf").as_deref(), Some("2025 1H"));
        assert_eq!(label("Hang Seng Bank 2025 Interim Report.pdf").as_deref(), Some("2025 1H"));
        assert_eq!(label("Standard Chartered PLC Half Year Report 2025.pdf").as_deref(), Some("2025 1H"));
        assert_eq!(label("HSBC Annual Report 2024.pdf").as_deref(), Some("2024 FY"));
        assert_eq!(label("boc_2024h2.csv").as_deref(), Some("2024 2H"));
        assert_eq!(label("hase 3Q2024 update.pdf").as_deref(), Some("2024 Q3"));
        assert_eq!(label("hsbc-data-pack-4q-2024.pdf").as_deref(), Some("2024 2H"));
        assert_eq!(label("notes.pdf"), None);
        assert_eq!(label("interim report.pdf"), None);
    }

    #[test]
    fn test_ingest_profile_document() {
        let ingestor = create_test_ingestor();
        let report = ingestor
            .ingest(b"%PDF-1.7", "BOC HONG KONG (HOLDINGS) LIMITED Data Pack 1H2025.pdf")
            .unwrap();

        assert_eq!(report.document.bank, Bank::BocHk);
        assert_eq!(report.document.period, "2025 1H");
        assert_eq!(report.document.status, DocumentStatus::Ready);
        assert_eq!(report.extractor, "bank-profile");
        assert_eq!(report.committed, 38);
        assert!(report.failures.is_empty());
        assert!(report.flags.is_empty(), "{:?}", report.flags);
        assert_eq!(ingestor.store().count_points().unwrap(), 38);

        println!("✅ Test passed: {}", report.summary());
    }

    #[test]
    fn test_unknown_period_uses_default() {
        let ingestor = create_test_ingestor();
        let report = ingestor.ingest(b"", "hang seng results.pdf").unwrap();
        assert_eq!(report.document.period, "2025 1H");
        assert_eq!(report.document.bank, Bank::HangSeng);
    }

    #[test]
    fn test_overrides_beat_filename() {
        let ingestor = create_test_ingestor();
        let report = ingestor
            .ingest_with(b"", "hsbc_1H2025.pdf", Some(Bank::ScHk), None)
            .unwrap();
        assert_eq!(report.document.bank, Bank::ScHk);
        assert_eq!(report.document.period, "2025 1H");

        let report = ingestor
            .ingest_with(b"", "hsbc_1H2025.pdf", None, Some("2024 2H"))
            .unwrap();
        assert_eq!(report.document.bank, Bank::HsbcHk);
        assert_eq!(report.document.period, "2024 2H");
    }

    #[test]
    fn test_period_override_is_canonicalized_so_reingest_replaces() {
        let ingestor = create_test_ingestor();

        let first = ingestor.ingest_with(b"", "boc.pdf", None, Some("1H 2025")).unwrap();
        assert_eq!(first.document.period, "2025 1H");
        let after_first = ingestor.store().count_points().unwrap();

        let second = ingestor.ingest_with(b"", "boc.pdf", None, Some("1H 2025")).unwrap();
        let after_second = ingestor.store().count_points().unwrap();

        assert_eq!(after_second, after_first);
        assert_eq!(second.replaced, first.committed);
        assert_eq!(ingestor.store().records_for(Bank::BocHk, "2025 1H").unwrap().len(), after_first);
        assert_eq!(ingestor.store().periods().unwrap(), vec!["2025 1H".to_string()]);
    }

    #[test]
    fn test_reset_restores_seed_and_drops_uploads() {
        let ingestor = create_test_ingestor();
        ingestor.seed().unwrap();
        let seeded_points = ingestor.store().count_points().unwrap();
        let seeded_docs = ingestor.store().documents().unwrap().len();

        let sheet = "metric,segment,value,unit,currency,page
Total Loans,Group Total,\"1,710,380\",m,HKD,14
";
        ingestor.ingest(sheet.as_bytes(), "boc_2023h2.csv").unwrap();
        ingestor.ingest(sheet.as_bytes(), "boc_1H2025.csv").unwrap();
        assert_ne!(ingestor.store().count_points().unwrap(), seeded_points);

        let reports = ingestor.reset().unwrap();
        assert_eq!(reports.len(), seeded_docs);
        assert_eq!(ingestor.store().count_points().unwrap(), seeded_points);
        assert_eq!(ingestor.store().documents().unwrap().len(), seeded_docs);
        assert!(!ingestor
            .store()
            .periods()
            .unwrap()
            .contains(&"2023 2H".to_string()));
    }

    #[test]
    fn test_unparseable_period_override_is_rejected() {
        let ingestor = create_test_ingestor();
        let err = ingestor
            .ingest_with(b"", "boc.pdf", None, Some("sometime"))
            .unwrap_err();

        assert!(format!("{:#}", err).contains("Invalid period"));
        assert_eq!(ingestor.store().count_points().unwrap(), 0);
        assert!(ingestor.store().documents().unwrap().is_empty());
    }

    #[test]
    fn test_partial_failure_is_visible() {
        let ingestor = create_test_ingestor();
        let sheet = "metric,segment,value,unit,currency,page
Total Loans,Group Total,\"1,710,380\",m,HKD,14
Total Deposits,Group Total,n/a,m,HKD,14
";
        let report = ingestor.ingest(sheet.as_bytes(), "boc_1H2025.csv").unwrap();

        assert_eq!(report.committed, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.document.status, DocumentStatus::Ready);
        assert_eq!(report.document.failed_records, 1);
    }

    #[test]
    fn test_fully_failed_document_keeps_existing_data() {
        let ingestor = create_test_ingestor();
        ingestor.ingest(b"", "Hang Seng Bank 2025 Interim Report.pdf").unwrap();
        let before = ingestor.store().count_points().unwrap();

        let sheet = "metric,segment,value,unit,currency,page\nTotal Loans,Group Total,oops,m,HKD,1\n";
        let report = ingestor.ingest(sheet.as_bytes(), "hase_1H2025.csv").unwrap();

        assert_eq!(report.committed, 0);
        assert_eq!(report.document.status, DocumentStatus::Error);
        assert_eq!(ingestor.store().count_points().unwrap(), before);
    }

    #[test]
    fn test_unreadable_sheet_is_an_error_document() {
        let ingestor = create_test_ingestor();
        let sheet = "metric,segment,value,unit,currency,page\nTotal Loans,Group Total,1,m,HKD,page-one\n";
        assert!(ingestor.ingest(sheet.as_bytes(), "boc_1H2025.csv").is_err());

        let docs = ingestor.store().documents().unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].status, DocumentStatus::Error);
        assert_eq!(ingestor.store().count_points().unwrap(), 0);
    }

    #[test]
    fn test_replace_taxonomy_affects_later_ingests_only() {
        let ingestor = create_test_ingestor();
        ingestor.ingest(b"", "Hang Seng Bank 2025 Interim Report.pdf").unwrap();

        let mut file = TaxonomyRegistry::hong_kong_default().to_file();
        file.version = "HK-2025.2".to_string();
        file.rules.retain(|r| r.id != "boc-treasury");
        let revised = TaxonomyRegistry::new(&file.version, file.rules, file.scopes, file.slicing_rules).unwrap();
        ingestor.replace_taxonomy(revised).unwrap();

        let report = ingestor.ingest(b"", "BOC Data Pack 1H2025.pdf").unwrap();
        let points = ingestor.store().points().unwrap();

        assert!(points
            .iter()
            .filter(|p| p.bank == Bank::HangSeng)
            .all(|p| p.taxonomy_version == "HK-2025.1"));
        let boc: Vec<_> = points.iter().filter(|p| p.bank == Bank::BocHk).collect();
        assert!(boc.iter().all(|p| p.taxonomy_version == "HK-2025.2"));
        assert!(boc
            .iter()
            .any(|p| p.original_segment == "Treasury" && p.segment == StandardizedSegment::Unclassified));
        assert_eq!(report.committed, 38);
    }

    #[test]
    fn test_ingest_many_runs_documents_independently() {
        let ingestor = create_test_ingestor();
        let docs = vec![
            (Vec::new(), "HSBC Holdings plc Data Pack 2Q 2025.pdf".to_string()),
            (Vec::new(), "Hang Seng Bank 2025 Interim Report.pdf".to_string()),
            (
                b"metric,segment,value,unit,currency,page\nTotal Loans,Group Total,1,m,HKD,x\n".to_vec(),
                "boc_1H2025.csv".to_string(),
            ),
        ];

        let results = ingestor.ingest_many(&docs);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_ok());
        assert!(results[2].is_err());
        assert_eq!(ingestor.store().count_points().unwrap(), 76);
    }

    #[test]
    fn test_seed_loads_all_banks_and_periods() {
        let ingestor = create_test_ingestor();
        let reports = ingestor.seed().unwrap();

        assert_eq!(reports.len(), 12);
        assert!(reports.iter().all(|r| r.failures.is_empty()));
        assert_eq!(ingestor.store().count_points().unwrap(), 12 * 38);
    }
}
