use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::message::{Expression, FromSpec, PayloadFormat};
use crate::{AppError, AppResult};

/// Immutable snapshot of a topic and its partition bounds, fetched once per
/// scan and never mutated by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub name: String,
    pub internal: bool,
    pub partitions: Vec<Partition>,
}

impl Topic {
    pub fn new(name: String, internal: bool, partitions: Vec<Partition>) -> Self {
        Self {
            name,
            internal,
            partitions,
        }
    }

    pub fn partition(&self, id: i32) -> Option<&Partition> {
        self.partitions.iter().find(|p| p.id == id)
    }
}

/// One partition of a topic at snapshot time. `end_offset` is the exclusive
/// upper bound of available data; invariant: `begin_offset <= end_offset`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partition {
    pub id: i32,
    pub begin_offset: i64,
    pub end_offset: i64,
    pub replicas: Vec<i32>,
}

impl Partition {
    pub fn new(id: i32, begin_offset: i64, end_offset: i64, replicas: Vec<i32>) -> Self {
        debug_assert!(begin_offset <= end_offset);
        Self {
            id,
            begin_offset,
            end_offset,
            replicas,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.begin_offset == self.end_offset
    }

    /// Whether `offset` falls inside the `[begin_offset, end_offset)` window.
    pub fn contains(&self, offset: i64) -> bool {
        offset >= self.begin_offset && offset < self.end_offset
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
}

impl Display for TopicPartition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

impl TopicPartition {
    pub fn new(topic: String, partition: i32) -> Self {
        Self { topic, partition }
    }
}

/// A scan request: where to start, how much to return, which partitions to
/// read and how to render and filter the records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumeFilter {
    pub from: FromSpec,
    pub max_results: usize,
    #[serde(default)]
    pub partitions: Vec<i32>,
    #[serde(default)]
    pub key_format: Option<PayloadFormat>,
    #[serde(default)]
    pub value_format: Option<PayloadFormat>,
    #[serde(default)]
    pub expressions: Vec<Expression>,
}

impl ConsumeFilter {
    /// Validates the request and returns the effective result cap. Fails
    /// before any network call so malformed requests never reach the cluster.
    pub fn validate(&self, cap: usize) -> AppResult<usize> {
        if self.max_results == 0 {
            return Err(AppError::InvalidArgument(
                "max_results must be positive".to_string(),
            ));
        }
        self.from.validate_for_scan()?;
        Ok(self.max_results.min(cap))
    }

    /// Whether `partition` passes the request's partition subset filter.
    pub fn wants_partition(&self, partition: i32) -> bool {
        self.partitions.is_empty() || self.partitions.contains(&partition)
    }
}
