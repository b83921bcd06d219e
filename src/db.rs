// 🗄️ Store - extraction records, standardized points, documents, settings
//
// One SQLite connection (WAL) behind a mutex, shared by handle. Every write
// is a single SQL transaction: readers see the old (bank, period) slice or
// the new one, never a mix.

use crate::entities::{Bank, Currency, ReportingPeriod, StandardizedSegment};
use crate::error::{StoreError, StoreResult};
use crate::model::{
    DocumentStatus, DocumentType, ExtractionRecord, FailedExtraction, IngestedDocument,
    StandardizedDataPoint,
};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

/// Event for the audit trail: every ingest, replacement and setting change
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

/// What one atomic (bank, period) replacement did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ReplaceSummary {
    pub removed_records: usize,
    pub removed_points: usize,
    pub inserted_records: usize,
    pub inserted_points: usize,
}

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database file and ensure the schema
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        setup_database(&conn)?;
        Ok(Store {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    // ========================================================================
    // WRITES
    // ========================================================================

    /// Replace everything held for (bank, period) in one IMMEDIATE transaction:
    /// prior records, points and failures go, the new ones and the document land.
    pub fn replace_bank_period(
        &self,
        document: &IngestedDocument,
        records: &[ExtractionRecord],
        points: &[StandardizedDataPoint],
        failures: &[FailedExtraction],
    ) -> StoreResult<ReplaceSummary> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let bank = document.bank.code();
        let period = document.period.as_str();

        let mut summary = ReplaceSummary {
            removed_points: tx.execute(
                "DELETE FROM data_points WHERE bank = ?1 AND period = ?2",
                params![bank, period],
            )?,
            removed_records: tx.execute(
                "DELETE FROM extraction_records WHERE bank = ?1 AND period = ?2",
                params![bank, period],
            )?,
            ..ReplaceSummary::default()
        };
        tx.execute(
            "DELETE FROM failed_extractions WHERE bank = ?1 AND period = ?2",
            params![bank, period],
        )?;

        for record in records {
            summary.inserted_records += tx.execute(
                "INSERT OR REPLACE INTO extraction_records (
                    id, bank, period, metric, raw_value, raw_unit, raw_currency,
                    raw_segment_label, source_document_id, page_number, raw_snippet
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    record.id,
                    record.bank.code(),
                    record.period,
                    record.metric,
                    record.raw_value,
                    record.raw_unit,
                    record.raw_currency,
                    record.raw_segment_label,
                    record.source_document_id,
                    record.page_number,
                    record.raw_snippet,
                ],
            )?;
        }

        for point in points {
            let steps_json = serde_json::to_string(&point.steps)?;
            summary.inserted_points += tx.execute(
                "INSERT OR REPLACE INTO data_points (
                    id, record_id, bank, period, metric, segment, original_segment,
                    value, currency, unit, source_document_id, page_number,
                    taxonomy_version, steps
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    point.id,
                    point.record_id,
                    point.bank.code(),
                    point.period,
                    point.metric,
                    point.segment.as_str(),
                    point.original_segment,
                    point.value.to_string(),
                    point.currency.code(),
                    point.unit,
                    point.source_document_id,
                    point.page_number,
                    point.taxonomy_version,
                    steps_json,
                ],
            )?;
        }

        for failure in failures {
            tx.execute(
                "INSERT INTO failed_extractions (document_id, bank, period, record_id, metric, reason)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    document.id,
                    bank,
                    period,
                    failure.record_id,
                    failure.metric,
                    failure.reason,
                ],
            )?;
        }

        upsert_document(&tx, document)?;

        let event = Event::new(
            "bank_period_replaced",
            "document",
            &document.id,
            serde_json::json!({
                "bank": bank,
                "period": period,
                "removed_points": summary.removed_points,
                "inserted_points": summary.inserted_points,
                "failed_records": failures.len(),
            }),
            "ingestor",
        );
        insert_event(&tx, &event)?;

        tx.commit()?;

        info!(
            bank,
            period,
            removed = summary.removed_points,
            inserted = summary.inserted_points,
            "bank/period replaced"
        );
        Ok(summary)
    }

    /// Drop every record, point, failure and document in one transaction.
    /// Settings and the event log survive.
    pub fn reset(&self, actor: &str) -> StoreResult<ReplaceSummary> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let summary = ReplaceSummary {
            removed_points: tx.execute("DELETE FROM data_points", [])?,
            removed_records: tx.execute("DELETE FROM extraction_records", [])?,
            ..ReplaceSummary::default()
        };
        tx.execute("DELETE FROM failed_extractions", [])?;
        let removed_documents = tx.execute("DELETE FROM documents", [])?;

        let event = Event::new(
            "store_reset",
            "store",
            "all",
            serde_json::json!({
                "removed_points": summary.removed_points,
                "removed_records": summary.removed_records,
                "removed_documents": removed_documents,
            }),
            actor,
        );
        insert_event(&tx, &event)?;

        tx.commit()?;

        info!(
            removed_points = summary.removed_points,
            removed_documents,
            "store reset"
        );
        Ok(summary)
    }

    /// Record a document on its own (e.g. one that failed before any commit)
    pub fn save_document(&self, document: &IngestedDocument) -> StoreResult<()> {
        let conn = self.lock()?;
        upsert_document(&conn, document)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn record_event(&self, event: &Event) -> StoreResult<()> {
        let conn = self.lock()?;
        insert_event(&conn, event)
    }

    // ========================================================================
    // READS
    // ========================================================================

    pub fn setting(&self, key: &str) -> StoreResult<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    /// All points, ordered by bank, period, metric, segment
    pub fn points(&self) -> StoreResult<Vec<StandardizedDataPoint>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("{} ORDER BY bank, period, metric, segment", POINT_SELECT))?;
        let rows = stmt.query_map([], point_from_row)?.collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(finish_point).collect()
    }

    /// Points for one period, optionally one segment
    pub fn points_for(
        &self,
        period: &str,
        segment: Option<StandardizedSegment>,
    ) -> StoreResult<Vec<StandardizedDataPoint>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE period = ?1 AND (?2 IS NULL OR segment = ?2) ORDER BY bank, metric",
            POINT_SELECT
        ))?;
        let rows = stmt
            .query_map(params![period, segment.map(|s| s.as_str())], point_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(finish_point).collect()
    }

    pub fn point(&self, id: &str) -> StoreResult<Option<StandardizedDataPoint>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(&format!("{} WHERE id = ?1", POINT_SELECT), [id], point_from_row)
            .optional()?;
        row.map(finish_point).transpose()
    }

    pub fn record(&self, id: &str) -> StoreResult<Option<ExtractionRecord>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(&format!("{} WHERE id = ?1", RECORD_SELECT), [id], record_from_row)
            .optional()?;
        Ok(record)
    }

    pub fn records_for(&self, bank: Bank, period: &str) -> StoreResult<Vec<ExtractionRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE bank = ?1 AND period = ?2 ORDER BY metric, raw_segment_label",
            RECORD_SELECT
        ))?;
        let records = stmt
            .query_map(params![bank.code(), period], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn failures_for(&self, bank: Bank, period: &str) -> StoreResult<Vec<FailedExtraction>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT record_id, metric, reason FROM failed_extractions
             WHERE bank = ?1 AND period = ?2 ORDER BY id",
        )?;
        let failures = stmt
            .query_map(params![bank.code(), period], |row| {
                Ok(FailedExtraction {
                    record_id: row.get(0)?,
                    metric: row.get(1)?,
                    reason: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(failures)
    }

    pub fn count_points(&self) -> StoreResult<usize> {
        self.count("data_points")
    }

    pub fn count_records(&self) -> StoreResult<usize> {
        self.count("extraction_records")
    }

    fn count(&self, table: &'static str) -> StoreResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Distinct period labels that hold points (unordered)
    pub fn periods(&self) -> StoreResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT DISTINCT period FROM data_points")?;
        let periods = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(periods)
    }

    /// Documents, newest first
    pub fn documents(&self) -> StoreResult<Vec<IngestedDocument>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{} ORDER BY upload_date DESC, created_at DESC",
            DOCUMENT_SELECT
        ))?;
        let documents = stmt
            .query_map([], document_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(documents)
    }

    pub fn document(&self, id: &str) -> StoreResult<Option<IngestedDocument>> {
        let conn = self.lock()?;
        let document = conn
            .query_row(&format!("{} WHERE id = ?1", DOCUMENT_SELECT), [id], document_from_row)
            .optional()?;
        Ok(document)
    }

    /// Events for one entity, newest first
    pub fn events_for(&self, entity_type: &str, entity_id: &str) -> StoreResult<Vec<Event>> {
        let conn = self.lock()?;
        get_events_for_entity(&conn, entity_type, entity_id)
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> StoreResult<()> {
    // Enable WAL mode for crash recovery (in-memory databases stay "memory")
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS extraction_records (
            id TEXT PRIMARY KEY,
            bank TEXT NOT NULL,
            period TEXT NOT NULL,
            metric TEXT NOT NULL,
            raw_value TEXT NOT NULL,
            raw_unit TEXT NOT NULL,
            raw_currency TEXT NOT NULL,
            raw_segment_label TEXT NOT NULL,
            source_document_id TEXT NOT NULL,
            page_number INTEGER NOT NULL,
            raw_snippet TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS data_points (
            id TEXT PRIMARY KEY,
            record_id TEXT UNIQUE NOT NULL,
            bank TEXT NOT NULL,
            period TEXT NOT NULL,
            metric TEXT NOT NULL,
            segment TEXT NOT NULL,
            original_segment TEXT NOT NULL,
            value TEXT NOT NULL,
            currency TEXT NOT NULL,
            unit TEXT NOT NULL,
            source_document_id TEXT NOT NULL,
            page_number INTEGER NOT NULL,
            taxonomy_version TEXT NOT NULL,
            steps TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS failed_extractions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_id TEXT NOT NULL,
            bank TEXT NOT NULL,
            period TEXT NOT NULL,
            record_id TEXT NOT NULL,
            metric TEXT NOT NULL,
            reason TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            doc_type TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            upload_date TEXT NOT NULL,
            status TEXT NOT NULL,
            bank TEXT NOT NULL,
            period TEXT NOT NULL,
            failed_records INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX IF NOT EXISTS idx_records_bank_period ON extraction_records(bank, period);
        CREATE INDEX IF NOT EXISTS idx_points_bank_period ON data_points(bank, period);
        CREATE INDEX IF NOT EXISTS idx_points_period_segment ON data_points(period, segment);
        CREATE INDEX IF NOT EXISTS idx_failures_bank_period ON failed_extractions(bank, period);
        CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id);
        CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp);",
    )?;

    Ok(())
}

// ============================================================================
// ROW MAPPING
// ============================================================================

const RECORD_SELECT: &str = "SELECT id, metric, raw_value, raw_unit, raw_currency, raw_segment_label,
        bank, period, source_document_id, page_number, raw_snippet
     FROM extraction_records";

const POINT_SELECT: &str = "SELECT id, metric, bank, period, segment, original_segment, value,
        currency, unit, record_id, source_document_id, page_number, taxonomy_version, steps
     FROM data_points";

const DOCUMENT_SELECT: &str = "SELECT id, name, doc_type, size_bytes, upload_date, status, bank, period, failed_records
     FROM documents";

/// Parse a TEXT column through FromStr, surfacing failures as conversion errors
fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    let text: String = row.get(idx)?;
    text.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, format!("{:?}: {}", text, e).into())
    })
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ExtractionRecord> {
    Ok(ExtractionRecord {
        id: row.get(0)?,
        metric: row.get(1)?,
        raw_value: row.get(2)?,
        raw_unit: row.get(3)?,
        raw_currency: row.get(4)?,
        raw_segment_label: row.get(5)?,
        bank: parse_column::<Bank>(row, 6)?,
        period: row.get(7)?,
        source_document_id: row.get(8)?,
        page_number: row.get(9)?,
        raw_snippet: row.get(10)?,
    })
}

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<IngestedDocument> {
    Ok(IngestedDocument {
        id: row.get(0)?,
        name: row.get(1)?,
        doc_type: parse_column::<DocumentType>(row, 2)?,
        size_bytes: row.get::<_, i64>(3)? as u64,
        upload_date: parse_column::<NaiveDate>(row, 4)?,
        status: parse_column::<DocumentStatus>(row, 5)?,
        bank: parse_column::<Bank>(row, 6)?,
        period: row.get(7)?,
        failed_records: row.get(8)?,
    })
}

/// Point with its steps still as JSON text
struct PointRow {
    point: StandardizedDataPoint,
    steps_json: String,
}

fn point_from_row(row: &Row<'_>) -> rusqlite::Result<PointRow> {
    let period = parse_column::<ReportingPeriod>(row, 3)?;
    Ok(PointRow {
        point: StandardizedDataPoint {
            id: row.get(0)?,
            metric: row.get(1)?,
            bank: parse_column::<Bank>(row, 2)?,
            period: period.label(),
            year: period.year(),
            frequency: period.frequency(),
            segment: parse_column::<StandardizedSegment>(row, 4)?,
            original_segment: row.get(5)?,
            value: parse_column::<rust_decimal::Decimal>(row, 6)?,
            currency: parse_column::<Currency>(row, 7)?,
            unit: row.get(8)?,
            record_id: row.get(9)?,
            source_document_id: row.get(10)?,
            page_number: row.get(11)?,
            taxonomy_version: row.get(12)?,
            steps: Vec::new(),
        },
        steps_json: row.get(13)?,
    })
}

fn finish_point(row: PointRow) -> StoreResult<StandardizedDataPoint> {
    let mut point = row.point;
    point.steps = serde_json::from_str(&row.steps_json)?;
    if point.steps.is_empty() {
        return Err(StoreError::CorruptRow {
            table: "data_points",
            reason: format!("point {} has no normalization steps", point.id),
        });
    }
    Ok(point)
}

fn upsert_document(conn: &Connection, document: &IngestedDocument) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO documents (id, name, doc_type, size_bytes, upload_date, status, bank, period, failed_records)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(id) DO UPDATE SET
            status = excluded.status,
            failed_records = excluded.failed_records,
            bank = excluded.bank,
            period = excluded.period",
        params![
            document.id,
            document.name,
            document.doc_type.as_str(),
            document.size_bytes as i64,
            document.upload_date.to_string(),
            document.status.as_str(),
            document.bank.code(),
            document.period,
            document.failed_records,
        ],
    )?;
    Ok(())
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> StoreResult<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> StoreResult<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let data_json: String = row.get(5)?;
            Ok(Event {
                event_id: row.get(0)?,
                timestamp: parse_column::<DateTime<Utc>>(row, 1)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e))
                })?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

// ============================================================================
// TESTS
// ============================================================================
