// Peer Bank Normalizer - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod entities;       // Reference entities: bank, segment, currency, period, metrics
pub mod error;
pub mod format;
pub mod model;          // Extraction records, steps, standardized points, documents
pub mod taxonomy;       // Segment mapping + geographic slicing rules
pub mod fx;             // Dated FX rate table
pub mod db;             // SQLite store (WAL)
pub mod profiles;
pub mod extract;        // Document extractors
pub mod pipeline;       // Normalization pipeline
pub mod reconciliation; // Segment sum vs Group total
pub mod ingest;
pub mod query;          // Comparison grid
pub mod export;
pub mod credentials;
pub mod audit;
pub mod config;
pub mod logging;

// Re-export commonly used types
pub use db::{Event, ReplaceSummary, Store};
pub use entities::{
    Bank, Currency, Frequency, GridSection, MetricDefinition, ReportingPeriod,
    StandardizedSegment, StatementKind,
};
pub use error::{CredentialError, NormalizeError, QueryError, StoreError, StoreResult};
pub use model::{
    DocumentStatus, DocumentType, ExtractionRecord, FailedExtraction, IngestedDocument,
    NormalizationStep, StandardizedDataPoint, StepName, StepStatus,
};
pub use taxonomy::{GeoScope, GeoSlicingRule, SegmentMappingRule, TaxonomyRegistry};
pub use fx::{FxRate, RateBasis, RateTable};
pub use extract::{get_extractor, CsvSheetExtractor, DocumentExtractor, ProfileExtractor};
pub use pipeline::{NormalizationOutcome, NormalizationPipeline};
pub use reconciliation::{ReconciliationChecker, ReconciliationFlag, ReconciliationReport};
pub use ingest::{infer_bank, infer_period, IngestReport, Ingestor};
pub use query::{
    available_periods, compare, format_display, reconcile, Citation, ComparisonGrid, ComparisonQuery,
    DisplayRates, GridCell, GridRow,
};
pub use export::export_csv;
pub use credentials::CredentialStore;
pub use audit::AuditTrail;
pub use config::Config;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
