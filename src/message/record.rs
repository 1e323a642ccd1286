use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::AppError;

/// How a record's timestamp was assigned by the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampKind {
    CreateTime,
    LogAppendTime,
}

/// Display rendering hint for a record key or value payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    Text,
    Json,
    Hex,
}

/// A named boolean predicate over record fields. Inactive expressions are
/// never compiled or evaluated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expression {
    pub name: String,
    pub code: String,
    pub active: bool,
}

impl Expression {
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            active: true,
        }
    }
}

/// One record header; the value may be absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    pub key: String,
    pub value: Option<String>,
}

/// A record that matched the scan filter, with both raw payloads and their
/// display renderings.
#[derive(Debug, Clone, Serialize)]
pub struct ScanRecord {
    pub partition: i32,
    pub offset: i64,
    pub timestamp: i64,
    pub timestamp_kind: TimestampKind,
    pub key_raw: Option<Bytes>,
    pub value_raw: Option<Bytes>,
    pub key: Option<String>,
    pub value: Option<String>,
    pub headers: Vec<Header>,
}

/// Item streamed to a scan consumer. `Last` is the end-of-stream sentinel:
/// emitted exactly once per scan, always as the final item.
#[derive(Debug, Clone, Serialize)]
pub enum ScanItem {
    Record(ScanRecord),
    Last,
}

impl ScanItem {
    pub fn is_last(&self) -> bool {
        matches!(self, ScanItem::Last)
    }
}

/// How a scan ended, reported out-of-band from the record stream so the
/// sentinel never has to carry two meanings.
#[derive(Debug)]
pub enum ScanOutcome {
    Completed,
    Cancelled,
    Failed(AppError),
}

impl ScanOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, ScanOutcome::Completed)
    }
}
