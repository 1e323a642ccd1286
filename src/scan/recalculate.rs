use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::cluster::ClusterClient;
use crate::message::{OffsetStrategy, OffsetWindow, RecalculateRequest, TopicPartition};
use crate::{AppError, AppResult};

/// Computes the new target offset per partition for a bulk consumer-group
/// offset change. Unlike scan resolution, the result always covers exactly
/// the input partitions: a partition the strategy cannot move keeps its
/// current offset.
pub async fn recalculate(
    cluster: &dyn ClusterClient,
    topic: &str,
    windows: &BTreeMap<i32, OffsetWindow>,
    request: &RecalculateRequest,
) -> AppResult<BTreeMap<i32, i64>> {
    request.validate()?;
    match request.strategy {
        OffsetStrategy::Earliest => Ok(windows.iter().map(|(id, w)| (*id, w.begin)).collect()),
        OffsetStrategy::Latest => Ok(windows.iter().map(|(id, w)| (*id, w.end)).collect()),
        OffsetStrategy::Specific => {
            let value = request.offset.ok_or_else(|| {
                AppError::InvalidArgument("specific strategy requires an offset".to_string())
            })?;
            Ok(windows
                .iter()
                .map(|(id, w)| (*id, specific_offset(w, value)))
                .collect())
        }
        OffsetStrategy::Shift => {
            let delta = request.shift.ok_or_else(|| {
                AppError::InvalidArgument("shift strategy requires a delta".to_string())
            })?;
            Ok(windows
                .iter()
                .map(|(id, w)| (*id, shifted_offset(w, delta)))
                .collect())
        }
        OffsetStrategy::Datetime | OffsetStrategy::Timestamp => {
            let timestamp = request.effective_timestamp().ok_or_else(|| {
                AppError::InvalidArgument("time strategy requires a timestamp".to_string())
            })?;
            recalculate_from_timestamp(cluster, topic, windows, timestamp).await
        }
    }
}

/// An out-of-range target leaves the partition at its current offset rather
/// than failing the whole request.
pub(crate) fn specific_offset(window: &OffsetWindow, value: i64) -> i64 {
    if value >= window.begin && value <= window.end {
        value
    } else {
        window.current
    }
}

/// Saturates at the end offset. There is intentionally no lower clamp to
/// `begin`; a large negative delta can land below it.
pub(crate) fn shifted_offset(window: &OffsetWindow, delta: i64) -> i64 {
    window.current.saturating_add(delta).min(window.end)
}

async fn recalculate_from_timestamp(
    cluster: &dyn ClusterClient,
    topic: &str,
    windows: &BTreeMap<i32, OffsetWindow>,
    timestamp: i64,
) -> AppResult<BTreeMap<i32, i64>> {
    let targets: BTreeMap<TopicPartition, i64> = windows
        .keys()
        .map(|id| (TopicPartition::new(topic.to_string(), *id), timestamp))
        .collect();

    let mut reader = cluster.reader().await?;
    let looked_up = reader.offsets_for_timestamp(&targets).await;
    if let Err(e) = reader.close().await {
        warn!(error = %e, "failed to close offset lookup connection");
    }
    let looked_up = looked_up?;

    let mut result = BTreeMap::new();
    for (id, window) in windows {
        let tp = TopicPartition::new(topic.to_string(), *id);
        let offset = match looked_up.get(&tp) {
            Some(Some(offset)) => *offset,
            _ => {
                debug!(
                    partition = id,
                    timestamp, "no offset at or after timestamp, keeping current"
                );
                window.current
            }
        };
        result.insert(*id, offset);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::cluster::InMemoryCluster;

    fn window() -> OffsetWindow {
        OffsetWindow::new(100, 50, 200)
    }

    #[rstest]
    #[case(25, 125)] // Scenario B: plain shift
    #[case(200, 200)] // Scenario B: clamped to end
    #[case(-30, 70)]
    #[case(-100, 0)] // below begin, intentionally not clamped
    fn test_shifted_offset(#[case] delta: i64, #[case] expected: i64) {
        assert_eq!(shifted_offset(&window(), delta), expected);
    }

    #[rstest]
    #[case(125, 125)]
    #[case(50, 50)] // begin is a valid target
    #[case(200, 200)] // end is a valid target
    #[case(300, 100)] // Scenario C: out of range keeps current
    #[case(10, 100)]
    fn test_specific_offset(#[case] value: i64, #[case] expected: i64) {
        assert_eq!(specific_offset(&window(), value), expected);
    }

    #[tokio::test]
    async fn test_earliest_and_latest_cover_all_partitions() {
        let cluster = InMemoryCluster::new();
        let windows = BTreeMap::from([
            (0, OffsetWindow::new(10, 0, 40)),
            (1, OffsetWindow::new(5, 2, 8)),
        ]);

        let earliest = recalculate(
            &cluster,
            "orders",
            &windows,
            &RecalculateRequest::strategy(OffsetStrategy::Earliest),
        )
        .await
        .unwrap();
        assert_eq!(earliest, BTreeMap::from([(0, 0), (1, 2)]));

        let latest = recalculate(
            &cluster,
            "orders",
            &windows,
            &RecalculateRequest::strategy(OffsetStrategy::Latest),
        )
        .await
        .unwrap();
        assert_eq!(latest, BTreeMap::from([(0, 40), (1, 8)]));
    }

    #[tokio::test]
    async fn test_missing_parameter_fails_before_any_lookup() {
        let cluster = InMemoryCluster::new();
        let windows = BTreeMap::from([(0, window())]);
        let err = recalculate(
            &cluster,
            "orders",
            &windows,
            &RecalculateRequest::strategy(OffsetStrategy::Timestamp),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_timestamp_lookup_falls_back_to_current() {
        let cluster = InMemoryCluster::new();
        cluster.create_topic("orders", 2);
        cluster.append_text("orders", 0, 1000, "a", "v").unwrap();
        cluster.append_text("orders", 0, 2000, "b", "v").unwrap();
        // partition 1 stays empty: no match, keeps current.

        let windows = BTreeMap::from([
            (0, OffsetWindow::new(0, 0, 2)),
            (1, OffsetWindow::new(7, 0, 7)),
        ]);
        let request = RecalculateRequest {
            timestamp: Some(1500),
            ..RecalculateRequest::strategy(OffsetStrategy::Timestamp)
        };

        let result = recalculate(&cluster, "orders", &windows, &request)
            .await
            .unwrap();
        assert_eq!(result, BTreeMap::from([(0, 1), (1, 7)]));
    }
}
