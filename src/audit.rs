// 🧭 Audit Trail - one grid cell back to the page it came from
//
// point → normalization steps → extraction record (raw value, snippet, page)
// → source document, plus any reconciliation flag on the same line.

use crate::db::Store;
use crate::error::StoreResult;
use crate::format::grouped;
use crate::model::{ExtractionRecord, IngestedDocument, StandardizedDataPoint, StepStatus};
use crate::reconciliation::{ReconciliationChecker, ReconciliationFlag};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct AuditTrail {
    pub point: StandardizedDataPoint,
    /// Missing only if the store was edited by hand
    pub record: Option<ExtractionRecord>,
    pub document: Option<IngestedDocument>,
    /// Flags raised for the point's (bank, period, metric)
    pub flags: Vec<ReconciliationFlag>,
}

impl AuditTrail {
    /// Load the trail for a point id; None if no such point
    pub fn load(store: &Store, point_id: &str, checker: &ReconciliationChecker) -> StoreResult<Option<Self>> {
        let Some(point) = store.point(point_id)? else {
            return Ok(None);
        };

        let record = store.record(&point.record_id)?;
        let document = store.document(&point.source_document_id)?;

        let peers: Vec<StandardizedDataPoint> = store
            .points_for(&point.period, None)?
            .into_iter()
            .filter(|p| p.bank == point.bank && p.metric == point.metric)
            .collect();
        let flags = checker.check(&peers);

        Ok(Some(AuditTrail {
            point,
            record,
            document,
            flags,
        }))
    }

    pub fn warning_count(&self) -> usize {
        self.point.steps.iter().filter(|s| s.is_warning()).count()
    }

    /// Plain-text rendering for the CLI
    pub fn render(&self) -> Vec<String> {
        let p = &self.point;
        let mut lines = vec![
            format!("{} | {} | {} | {}", p.bank, p.period, p.segment, p.metric),
            format!("Value: {} {}{}", p.currency.code(), grouped(p.value, 4), p.unit),
            format!("Taxonomy: {}", p.taxonomy_version),
        ];

        match &self.document {
            Some(doc) => lines.push(format!("Source: {} (p.{})", doc.name, p.page_number)),
            None => lines.push(format!("Source: {} (p.{})", p.source_document_id, p.page_number)),
        }
        if let Some(record) = &self.record {
            lines.push(format!("Extracted: \"{}\"", record.raw_snippet));
        }

        lines.push("Steps:".to_string());
        for step in &p.steps {
            let marker = match step.status {
                StepStatus::Success => "ok",
                StepStatus::Warning => "WARN",
            };
            lines.push(format!("  {}. [{}] {}: {}", step.sequence, marker, step.step_name, step.description));
            if let (Some(input), Some(output)) = (&step.raw_input, &step.transformed_output) {
                lines.push(format!("       {} -> {}", input, output));
            }
        }

        for flag in &self.flags {
            lines.push(format!("Reconciliation: {}", flag.describe()));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::Ingestor;
    use crate::pipeline::NormalizationPipeline;
    use rust_decimal::Decimal;
    use std::sync::Arc;

    fn create_test_ingestor(checker: ReconciliationChecker) -> Ingestor {
        Ingestor::new(
            Arc::new(Store::open_in_memory().unwrap()),
            NormalizationPipeline::hong_kong_default(),
            checker,
            "2025 1H",
        )
    }

    #[test]
    fn test_trail_reaches_document_and_snippet() {
        let ingestor = create_test_ingestor(ReconciliationChecker::new());
        ingestor.ingest(b"", "HSBC Holdings plc Data Pack 2Q 2025.pdf").unwrap();

        let point = ingestor
            .store()
            .points()
            .unwrap()
            .into_iter()
            .find(|p| p.metric == "Net Interest Income" && p.original_segment == "Hong Kong")
            .unwrap();

        let trail = AuditTrail::load(ingestor.store(), &point.id, ingestor.checker())
            .unwrap()
            .unwrap();

        assert_eq!(trail.document.as_ref().unwrap().name, "HSBC Holdings plc Data Pack 2Q 2025.pdf");
        assert_eq!(trail.record.as_ref().unwrap().raw_value, "5,875");
        assert_eq!(trail.warning_count(), 0);

        let text = trail.render();
        assert!(text.iter().any(|l| l.contains("(p.36)")));
        assert!(text.iter().any(|l| l.contains("1. [ok] Extraction")));
        assert!(text.iter().any(|l| l.contains("5,875m USD -> 45,836.8m HKD")));
    }

    #[test]
    fn test_trail_carries_reconciliation_flag() {
        let ingestor = create_test_ingestor(ReconciliationChecker::with_tolerance(Decimal::new(5, 1)));
        let sheet = "metric,segment,value,unit,currency,page
Total Loans,Group Total,100,m,HKD,14
Total Loans,Personal Banking,101,m,HKD,14
";
        ingestor.ingest(sheet.as_bytes(), "boc_1H2025.csv").unwrap();

        let group = ingestor
            .store()
            .points_for("2025 1H", Some(crate::entities::StandardizedSegment::Group))
            .unwrap()
            .remove(0);
        let trail = AuditTrail::load(ingestor.store(), &group.id, ingestor.checker())
            .unwrap()
            .unwrap();

        assert_eq!(trail.flags.len(), 1);
        assert!(trail.render().iter().any(|l| l.starts_with("Reconciliation:")));
    }

    #[test]
    fn test_unknown_point() {
        let ingestor = create_test_ingestor(ReconciliationChecker::new());
        assert!(AuditTrail::load(ingestor.store(), "sdp-nope", ingestor.checker())
            .unwrap()
            .is_none());
    }
}
