// Reference Entities
// The fixed vocabulary every other module speaks: who reports (bank), into
// which bucket (segment), in what money (currency), when (period), and what
// the line means (metric catalogue).

pub mod bank;
pub mod currency;
pub mod metric;
pub mod period;
pub mod segment;

pub use bank::Bank;
pub use currency::Currency;
pub use metric::{GridSection, MetricDefinition, StatementKind};
pub use period::{Frequency, ReportingPeriod};
pub use segment::StandardizedSegment;
