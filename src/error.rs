//! Error types for normalization, storage and credentials.
//!
//! Record-level normalization errors never escape a batch: the pipeline turns
//! them into [`FailedExtraction`](crate::model::FailedExtraction) entries.

use crate::entities::{Bank, Currency};
use chrono::NaiveDate;
use thiserror::Error;

/// Errors raised while normalizing a single extraction record.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizeError {
    /// No taxonomy rule maps this bank-native label. Recoverable: degrades to Unclassified.
    #[error("no segment rule for {bank} label {label:?}")]
    UnmappedSegment { bank: Bank, label: String },

    /// No FX rate for the pair and date. Fails the record.
    #[error("missing {kind} rate {from}->{to} as of {as_of}")]
    MissingRate {
        from: Currency,
        to: Currency,
        kind: &'static str,
        as_of: NaiveDate,
    },

    /// The disclosed figure is not a number.
    #[error("invalid numeric value {raw:?}")]
    InvalidValue { raw: String },

    /// The disclosed unit is not one we know how to scale.
    #[error("unsupported unit {unit:?}")]
    UnsupportedUnit { unit: String },

    /// The period label cannot be parsed, so no FX date can be derived.
    #[error("invalid period {raw:?}")]
    InvalidPeriod { raw: String },

    /// The disclosed currency code is not supported.
    #[error("unsupported currency {raw:?}")]
    UnsupportedCurrency { raw: String },

    /// Conversion is needed but the metric is not in the catalogue, so spot vs average is unknown.
    #[error("cannot choose FX basis for unknown metric {metric:?}")]
    UnknownRateBasis { metric: String },

    /// A second record in the same batch landed on an occupied (bank, period, metric, segment) slot.
    #[error("duplicate disclosure for {metric} / {segment} (already taken by record {first_record_id})")]
    DuplicateDisclosure {
        metric: String,
        segment: String,
        first_record_id: String,
    },
}

/// Errors raised by the SQLite-backed stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt row in {table}: {reason}")]
    CorruptRow { table: &'static str, reason: String },

    #[error("store lock poisoned")]
    Poisoned,
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the credential boundary.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("API key must not be empty")]
    EmptyKey,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised while building a comparison grid.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("no display rate {from}->{to}")]
    MissingDisplayRate { from: Currency, to: Currency },

    #[error("invalid period {raw:?}")]
    InvalidPeriod { raw: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}
