use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AppError, AppResult};

/// Offset positioning strategy, shared by the scan's `from` specification and
/// the offset recalculation request. The scan-time spellings `begin`, `end`
/// and `offset` are accepted as aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetStrategy {
    #[serde(alias = "begin")]
    Earliest,
    #[serde(alias = "end")]
    Latest,
    #[serde(alias = "offset")]
    Specific,
    Shift,
    Datetime,
    Timestamp,
}

/// Where a scan starts reading. `strategy` decides which of the optional
/// parameters is required.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FromSpec {
    pub strategy: OffsetStrategy,
    #[serde(default)]
    pub offset: Option<i64>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub datetime: Option<DateTime<Utc>>,
}

impl FromSpec {
    pub fn strategy(strategy: OffsetStrategy) -> Self {
        Self {
            strategy,
            offset: None,
            timestamp: None,
            datetime: None,
        }
    }

    pub fn at_offset(offset: i64) -> Self {
        Self {
            offset: Some(offset),
            ..Self::strategy(OffsetStrategy::Specific)
        }
    }

    pub fn at_timestamp(timestamp: i64) -> Self {
        Self {
            timestamp: Some(timestamp),
            ..Self::strategy(OffsetStrategy::Timestamp)
        }
    }

    pub fn at_datetime(datetime: DateTime<Utc>) -> Self {
        Self {
            datetime: Some(datetime),
            ..Self::strategy(OffsetStrategy::Datetime)
        }
    }

    pub(crate) fn validate_for_scan(&self) -> AppResult<()> {
        match self.strategy {
            OffsetStrategy::Earliest | OffsetStrategy::Latest => Ok(()),
            OffsetStrategy::Specific => self
                .offset
                .map(|_| ())
                .ok_or_else(|| AppError::InvalidArgument("offset strategy requires an offset".to_string())),
            OffsetStrategy::Datetime => self
                .datetime
                .map(|_| ())
                .ok_or_else(|| AppError::InvalidArgument("datetime strategy requires a datetime".to_string())),
            OffsetStrategy::Timestamp => self
                .timestamp
                .map(|_| ())
                .ok_or_else(|| AppError::InvalidArgument("timestamp strategy requires a timestamp".to_string())),
            OffsetStrategy::Shift => Err(AppError::InvalidArgument(
                "shift is not a scan start strategy".to_string(),
            )),
        }
    }

    /// Epoch milliseconds for the time-based strategies.
    pub(crate) fn effective_timestamp(&self) -> Option<i64> {
        self.timestamp
            .or_else(|| self.datetime.map(|dt| dt.timestamp_millis()))
    }
}

/// Per-partition offset window of a consumer group position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetWindow {
    pub current: i64,
    pub begin: i64,
    pub end: i64,
}

impl OffsetWindow {
    pub fn new(current: i64, begin: i64, end: i64) -> Self {
        Self {
            current,
            begin,
            end,
        }
    }

    /// Unread records relative to the current position.
    pub fn lag(&self) -> i64 {
        self.end - self.current
    }
}

/// A bulk offset change for a consumer group, previewed and applied per
/// partition by the recalculation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecalculateRequest {
    pub strategy: OffsetStrategy,
    #[serde(default)]
    pub offset: Option<i64>,
    #[serde(default)]
    pub shift: Option<i64>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub datetime: Option<DateTime<Utc>>,
}

impl RecalculateRequest {
    pub fn strategy(strategy: OffsetStrategy) -> Self {
        Self {
            strategy,
            offset: None,
            shift: None,
            timestamp: None,
            datetime: None,
        }
    }

    pub fn shift_by(delta: i64) -> Self {
        Self {
            shift: Some(delta),
            ..Self::strategy(OffsetStrategy::Shift)
        }
    }

    pub fn to_offset(offset: i64) -> Self {
        Self {
            offset: Some(offset),
            ..Self::strategy(OffsetStrategy::Specific)
        }
    }

    pub(crate) fn validate(&self) -> AppResult<()> {
        match self.strategy {
            OffsetStrategy::Earliest | OffsetStrategy::Latest => Ok(()),
            OffsetStrategy::Specific => self
                .offset
                .map(|_| ())
                .ok_or_else(|| AppError::InvalidArgument("specific strategy requires an offset".to_string())),
            OffsetStrategy::Shift => self
                .shift
                .map(|_| ())
                .ok_or_else(|| AppError::InvalidArgument("shift strategy requires a delta".to_string())),
            OffsetStrategy::Datetime => self
                .datetime
                .map(|_| ())
                .ok_or_else(|| AppError::InvalidArgument("datetime strategy requires a datetime".to_string())),
            OffsetStrategy::Timestamp => self
                .timestamp
                .map(|_| ())
                .ok_or_else(|| AppError::InvalidArgument("timestamp strategy requires a timestamp".to_string())),
        }
    }

    pub(crate) fn effective_timestamp(&self) -> Option<i64> {
        self.timestamp
            .or_else(|| self.datetime.map(|dt| dt.timestamp_millis()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_aliases_deserialize() {
        let begin: OffsetStrategy = serde_json::from_str("\"begin\"").unwrap();
        assert_eq!(begin, OffsetStrategy::Earliest);
        let end: OffsetStrategy = serde_json::from_str("\"end\"").unwrap();
        assert_eq!(end, OffsetStrategy::Latest);
        let offset: OffsetStrategy = serde_json::from_str("\"offset\"").unwrap();
        assert_eq!(offset, OffsetStrategy::Specific);
        let shift: OffsetStrategy = serde_json::from_str("\"shift\"").unwrap();
        assert_eq!(shift, OffsetStrategy::Shift);
    }

    #[test]
    fn test_from_spec_requires_parameters() {
        assert!(FromSpec::strategy(OffsetStrategy::Specific)
            .validate_for_scan()
            .is_err());
        assert!(FromSpec::strategy(OffsetStrategy::Timestamp)
            .validate_for_scan()
            .is_err());
        assert!(FromSpec::strategy(OffsetStrategy::Datetime)
            .validate_for_scan()
            .is_err());
        assert!(FromSpec::at_offset(42).validate_for_scan().is_ok());
        assert!(FromSpec::at_timestamp(1_700_000_000_000)
            .validate_for_scan()
            .is_ok());
    }

    #[test]
    fn test_shift_is_not_a_scan_strategy() {
        let err = FromSpec::strategy(OffsetStrategy::Shift)
            .validate_for_scan()
            .unwrap_err();
        assert!(matches!(err, crate::AppError::InvalidArgument(_)));
    }

    #[test]
    fn test_datetime_converts_to_millis() {
        let dt = DateTime::parse_from_rfc3339("2024-05-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let spec = FromSpec::at_datetime(dt);
        assert_eq!(spec.effective_timestamp(), Some(dt.timestamp_millis()));
    }

    #[test]
    fn test_offset_window_lag() {
        let window = OffsetWindow::new(100, 50, 200);
        assert_eq!(window.lag(), 100);
    }

    #[test]
    fn test_recalculate_request_requires_parameters() {
        assert!(RecalculateRequest::strategy(OffsetStrategy::Shift)
            .validate()
            .is_err());
        assert!(RecalculateRequest::shift_by(25).validate().is_ok());
        assert!(RecalculateRequest::strategy(OffsetStrategy::Specific)
            .validate()
            .is_err());
        assert!(RecalculateRequest::to_offset(10).validate().is_ok());
    }
}
