use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use crate::cluster::{ClusterClient, RawHeader, RawRecord, ReadConnection, TopicMetadataProvider};
use crate::message::{Partition, TimestampKind, Topic, TopicPartition};
use crate::{AppError, AppResult};

const MAX_POLL_RECORDS: usize = 500;

/// An embeddable, deterministic cluster holding partitioned logs in memory.
/// Implements the same collaborator contracts a real cluster client would,
/// which makes it the reference implementation used by the test suite.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCluster {
    topics: Arc<DashMap<String, MemoryTopic>>,
}

#[derive(Debug)]
struct MemoryTopic {
    internal: bool,
    partitions: Vec<MemoryPartition>,
}

#[derive(Debug, Default)]
struct MemoryPartition {
    begin_offset: i64,
    records: Vec<MemoryRecord>,
}

impl MemoryPartition {
    fn end_offset(&self) -> i64 {
        self.begin_offset + self.records.len() as i64
    }
}

/// A record stored in an in-memory partition. Offsets are assigned on append.
#[derive(Debug, Clone)]
pub struct MemoryRecord {
    pub timestamp: i64,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
    pub headers: Vec<RawHeader>,
}

impl MemoryRecord {
    pub fn text(timestamp: i64, key: &str, value: &str) -> Self {
        Self {
            timestamp,
            key: Some(Bytes::copy_from_slice(key.as_bytes())),
            value: Some(Bytes::copy_from_slice(value.as_bytes())),
            headers: vec![],
        }
    }
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_topic(&self, name: &str, partitions: usize) {
        self.topics.insert(
            name.to_string(),
            MemoryTopic {
                internal: false,
                partitions: (0..partitions).map(|_| MemoryPartition::default()).collect(),
            },
        );
    }

    /// Creates a topic whose partitions start at the given begin offsets, as
    /// if older data had already been truncated away.
    pub fn create_topic_with_begin_offsets(&self, name: &str, begin_offsets: &[i64]) {
        self.topics.insert(
            name.to_string(),
            MemoryTopic {
                internal: false,
                partitions: begin_offsets
                    .iter()
                    .map(|begin| MemoryPartition {
                        begin_offset: *begin,
                        records: vec![],
                    })
                    .collect(),
            },
        );
    }

    /// Appends a record and returns the offset it was assigned.
    pub fn append(&self, topic: &str, partition: i32, record: MemoryRecord) -> AppResult<i64> {
        let mut entry = self
            .topics
            .get_mut(topic)
            .ok_or_else(|| AppError::ClusterError(format!("unknown topic: {topic}")))?;
        let partition = entry
            .partitions
            .get_mut(partition as usize)
            .ok_or_else(|| AppError::ClusterError(format!("unknown partition: {partition}")))?;
        let offset = partition.end_offset();
        partition.records.push(record);
        Ok(offset)
    }

    pub fn append_text(
        &self,
        topic: &str,
        partition: i32,
        timestamp: i64,
        key: &str,
        value: &str,
    ) -> AppResult<i64> {
        self.append(topic, partition, MemoryRecord::text(timestamp, key, value))
    }
}

#[async_trait]
impl TopicMetadataProvider for InMemoryCluster {
    async fn topic(&self, name: &str) -> AppResult<Topic> {
        let entry = self
            .topics
            .get(name)
            .ok_or_else(|| AppError::ClusterError(format!("unknown topic: {name}")))?;
        let partitions = entry
            .partitions
            .iter()
            .enumerate()
            .map(|(id, p)| Partition::new(id as i32, p.begin_offset, p.end_offset(), vec![0]))
            .collect();
        Ok(Topic::new(name.to_string(), entry.internal, partitions))
    }
}

#[async_trait]
impl ClusterClient for InMemoryCluster {
    async fn reader(&self) -> AppResult<Box<dyn ReadConnection>> {
        Ok(Box::new(MemoryReadConnection {
            topics: self.topics.clone(),
            assigned: vec![],
            positions: HashMap::new(),
            closed: false,
        }))
    }
}

#[derive(Debug)]
struct MemoryReadConnection {
    topics: Arc<DashMap<String, MemoryTopic>>,
    assigned: Vec<TopicPartition>,
    positions: HashMap<TopicPartition, i64>,
    closed: bool,
}

impl MemoryReadConnection {
    fn ensure_open(&self) -> AppResult<()> {
        if self.closed {
            return Err(AppError::IllegalStateError(
                "read connection already closed".to_string(),
            ));
        }
        Ok(())
    }

    fn fetch(&mut self) -> Vec<RawRecord> {
        let mut batch = Vec::new();
        for tp in &self.assigned {
            if batch.len() >= MAX_POLL_RECORDS {
                break;
            }
            let Some(topic) = self.topics.get(&tp.topic) else {
                continue;
            };
            let Some(partition) = topic.partitions.get(tp.partition as usize) else {
                continue;
            };
            let mut position = self
                .positions
                .get(tp)
                .copied()
                .unwrap_or(partition.begin_offset)
                .max(partition.begin_offset);
            while position < partition.end_offset() && batch.len() < MAX_POLL_RECORDS {
                let record = &partition.records[(position - partition.begin_offset) as usize];
                batch.push(RawRecord {
                    partition: tp.partition,
                    offset: position,
                    timestamp: record.timestamp,
                    timestamp_kind: TimestampKind::CreateTime,
                    key: record.key.clone(),
                    value: record.value.clone(),
                    headers: record.headers.clone(),
                });
                position += 1;
            }
            self.positions.insert(tp.clone(), position);
        }
        batch
    }
}

#[async_trait]
impl ReadConnection for MemoryReadConnection {
    async fn assign(&mut self, partitions: &[TopicPartition]) -> AppResult<()> {
        self.ensure_open()?;
        self.assigned = partitions.to_vec();
        self.positions.clear();
        Ok(())
    }

    async fn seek(&mut self, partition: &TopicPartition, offset: i64) -> AppResult<()> {
        self.ensure_open()?;
        if !self.assigned.contains(partition) {
            return Err(AppError::IllegalStateError(format!(
                "seek on unassigned partition: {partition}"
            )));
        }
        self.positions.insert(partition.clone(), offset);
        Ok(())
    }

    async fn poll(&mut self, timeout: Duration) -> AppResult<Vec<RawRecord>> {
        self.ensure_open()?;
        let batch = self.fetch();
        if !batch.is_empty() {
            return Ok(batch);
        }
        // Bounded wait, then one more look, mirroring a real poll call.
        tokio::time::sleep(timeout).await;
        Ok(self.fetch())
    }

    async fn offsets_for_timestamp(
        &mut self,
        targets: &BTreeMap<TopicPartition, i64>,
    ) -> AppResult<BTreeMap<TopicPartition, Option<i64>>> {
        self.ensure_open()?;
        let mut resolved = BTreeMap::new();
        for (tp, probe) in targets {
            let offset = self.topics.get(&tp.topic).and_then(|topic| {
                let partition = topic.partitions.get(tp.partition as usize)?;
                partition
                    .records
                    .iter()
                    .position(|r| r.timestamp >= *probe)
                    .map(|index| partition.begin_offset + index as i64)
            });
            resolved.insert(tp.clone(), offset);
        }
        Ok(resolved)
    }

    async fn close(&mut self) -> AppResult<()> {
        self.closed = true;
        self.assigned.clear();
        self.positions.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tp(topic: &str, partition: i32) -> TopicPartition {
        TopicPartition::new(topic.to_string(), partition)
    }

    #[tokio::test]
    async fn test_topic_snapshot_tracks_appends() {
        let cluster = InMemoryCluster::new();
        cluster.create_topic("orders", 2);
        cluster.append_text("orders", 0, 1000, "k1", "v1").unwrap();
        cluster.append_text("orders", 0, 1001, "k2", "v2").unwrap();

        let topic = cluster.topic("orders").await.unwrap();
        assert_eq!(topic.partitions.len(), 2);
        assert_eq!(topic.partition(0).unwrap().end_offset, 2);
        assert_eq!(topic.partition(1).unwrap().end_offset, 0);
    }

    #[tokio::test]
    async fn test_unknown_topic_is_a_cluster_error() {
        let cluster = InMemoryCluster::new();
        let err = cluster.topic("missing").await.unwrap_err();
        assert!(matches!(err, AppError::ClusterError(_)));
    }

    #[tokio::test]
    async fn test_poll_respects_seek_position() {
        let cluster = InMemoryCluster::new();
        cluster.create_topic("orders", 1);
        for i in 0..5 {
            cluster
                .append_text("orders", 0, 1000 + i, &format!("k{i}"), "v")
                .unwrap();
        }

        let mut reader = cluster.reader().await.unwrap();
        reader.assign(&[tp("orders", 0)]).await.unwrap();
        reader.seek(&tp("orders", 0), 3).await.unwrap();

        let batch = reader.poll(Duration::from_millis(10)).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].offset, 3);
        assert_eq!(batch[1].offset, 4);

        let empty = reader.poll(Duration::from_millis(10)).await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_seek_requires_assignment() {
        let cluster = InMemoryCluster::new();
        cluster.create_topic("orders", 1);
        let mut reader = cluster.reader().await.unwrap();
        let err = reader.seek(&tp("orders", 0), 0).await.unwrap_err();
        assert!(matches!(err, AppError::IllegalStateError(_)));
    }

    #[tokio::test]
    async fn test_offsets_for_timestamp() {
        let cluster = InMemoryCluster::new();
        cluster.create_topic("orders", 1);
        cluster.append_text("orders", 0, 1000, "a", "v").unwrap();
        cluster.append_text("orders", 0, 2000, "b", "v").unwrap();
        cluster.append_text("orders", 0, 3000, "c", "v").unwrap();

        let mut reader = cluster.reader().await.unwrap();
        let targets = BTreeMap::from([(tp("orders", 0), 1500)]);
        let resolved = reader.offsets_for_timestamp(&targets).await.unwrap();
        assert_eq!(resolved[&tp("orders", 0)], Some(1));

        let beyond = BTreeMap::from([(tp("orders", 0), 9000)]);
        let resolved = reader.offsets_for_timestamp(&beyond).await.unwrap();
        assert_eq!(resolved[&tp("orders", 0)], None);
    }

    #[tokio::test]
    async fn test_closed_connection_rejects_polls() {
        let cluster = InMemoryCluster::new();
        cluster.create_topic("orders", 1);
        let mut reader = cluster.reader().await.unwrap();
        reader.close().await.unwrap();
        let err = reader.poll(Duration::from_millis(1)).await.unwrap_err();
        assert!(matches!(err, AppError::IllegalStateError(_)));
    }
}
