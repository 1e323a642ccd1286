use std::collections::BTreeMap;

use tracing::debug;

use crate::cluster::ReadConnection;
use crate::message::{FromSpec, OffsetStrategy, Partition, TopicPartition};
use crate::{AppError, AppResult};

/// Translates a `from` specification plus per-partition bounds into a
/// concrete starting offset per partition. Partitions that cannot satisfy
/// the strategy (offset outside their window, timestamp beyond their data)
/// are dropped from the result, not reported as errors. An empty result
/// means there is nothing to scan.
pub(crate) async fn resolve(
    topic: &str,
    partitions: &[Partition],
    from: &FromSpec,
    max_results: usize,
    reader: &mut dyn ReadConnection,
) -> AppResult<BTreeMap<i32, i64>> {
    from.validate_for_scan()?;
    match from.strategy {
        OffsetStrategy::Earliest => Ok(resolve_from_begin(partitions)),
        OffsetStrategy::Latest => Ok(resolve_from_end(partitions, max_results)),
        OffsetStrategy::Specific => {
            let offset = from.offset.ok_or_else(|| {
                AppError::InvalidArgument("offset strategy requires an offset".to_string())
            })?;
            Ok(resolve_from_offset(partitions, offset))
        }
        OffsetStrategy::Datetime | OffsetStrategy::Timestamp => {
            let timestamp = from.effective_timestamp().ok_or_else(|| {
                AppError::InvalidArgument("time strategy requires a timestamp".to_string())
            })?;
            resolve_from_timestamp(topic, partitions, timestamp, reader).await
        }
        OffsetStrategy::Shift => Err(AppError::InvalidArgument(
            "shift is not a scan start strategy".to_string(),
        )),
    }
}

pub(crate) fn resolve_from_begin(partitions: &[Partition]) -> BTreeMap<i32, i64> {
    partitions.iter().map(|p| (p.id, p.begin_offset)).collect()
}

/// Each partition contributes an equal share of `max_results` counted back
/// from its end offset. The integer division spreads the budget evenly even
/// when the data is not, a known limitation kept for fidelity with observed
/// behavior.
pub(crate) fn resolve_from_end(partitions: &[Partition], max_results: usize) -> BTreeMap<i32, i64> {
    if partitions.is_empty() {
        return BTreeMap::new();
    }
    let share = (max_results / partitions.len()) as i64;
    partitions
        .iter()
        .map(|p| (p.id, (p.end_offset - share).max(p.begin_offset)))
        .collect()
}

/// Only partitions whose window contains the offset take part in the scan.
pub(crate) fn resolve_from_offset(partitions: &[Partition], offset: i64) -> BTreeMap<i32, i64> {
    partitions
        .iter()
        .filter(|p| p.contains(offset))
        .map(|p| (p.id, offset))
        .collect()
}

async fn resolve_from_timestamp(
    topic: &str,
    partitions: &[Partition],
    timestamp: i64,
    reader: &mut dyn ReadConnection,
) -> AppResult<BTreeMap<i32, i64>> {
    let targets: BTreeMap<TopicPartition, i64> = partitions
        .iter()
        .map(|p| (TopicPartition::new(topic.to_string(), p.id), timestamp))
        .collect();
    let looked_up = reader.offsets_for_timestamp(&targets).await?;

    let mut starts = BTreeMap::new();
    for p in partitions {
        let tp = TopicPartition::new(topic.to_string(), p.id);
        match looked_up.get(&tp) {
            Some(Some(offset)) => {
                starts.insert(p.id, *offset);
            }
            _ => {
                debug!(
                    partition = p.id,
                    timestamp, "no offset at or after timestamp, dropping partition"
                );
            }
        }
    }
    Ok(starts)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn partition(id: i32, begin: i64, end: i64) -> Partition {
        Partition::new(id, begin, end, vec![0])
    }

    #[test]
    fn test_begin_uses_begin_offset() {
        let partitions = vec![partition(0, 0, 200), partition(1, 50, 120)];
        let starts = resolve_from_begin(&partitions);
        assert_eq!(starts[&0], 0);
        assert_eq!(starts[&1], 50);
    }

    #[rstest]
    #[case(100, 150)] // share 50, end 200 -> 150
    #[case(1000, 0)] // share exceeds window -> clamped to begin
    #[case(0, 200)] // zero budget -> starts at end
    fn test_end_share_computation(#[case] max_results: usize, #[case] expected: i64) {
        let partitions = vec![partition(0, 0, 200), partition(1, 0, 200)];
        let starts = resolve_from_end(&partitions, max_results);
        assert_eq!(starts[&0], expected);
        assert_eq!(starts[&1], expected);
    }

    #[test]
    fn test_end_share_clamps_to_begin() {
        let partitions = vec![partition(0, 180, 200)];
        let starts = resolve_from_end(&partitions, 100);
        assert_eq!(starts[&0], 180);
    }

    #[test]
    fn test_offset_drops_partitions_outside_window() {
        // Scenario E: only the partition whose window contains 50 remains.
        let partitions = vec![partition(0, 0, 100), partition(1, 200, 300)];
        let starts = resolve_from_offset(&partitions, 50);
        assert_eq!(starts.len(), 1);
        assert_eq!(starts[&0], 50);
    }

    #[test]
    fn test_offset_can_drop_every_partition() {
        let partitions = vec![partition(0, 0, 10)];
        assert!(resolve_from_offset(&partitions, 500).is_empty());
    }

    #[test]
    fn test_pure_strategies_are_deterministic() {
        let partitions = vec![partition(0, 10, 90), partition(1, 0, 40)];
        assert_eq!(
            resolve_from_begin(&partitions),
            resolve_from_begin(&partitions)
        );
        assert_eq!(
            resolve_from_end(&partitions, 30),
            resolve_from_end(&partitions, 30)
        );
        assert_eq!(
            resolve_from_offset(&partitions, 20),
            resolve_from_offset(&partitions, 20)
        );
    }
}
