//! A bounded, multi-partition, filterable scan engine for partitioned log
//! topics, plus a bulk offset recalculation engine sharing the same
//! offset-resolution vocabulary. In-process library: administrative and UI
//! layers bring their own cluster client by implementing the traits in
//! [`ClusterClient`] and friends, or embed [`InMemoryCluster`].

mod cluster;
mod codec;
mod message;
mod scan;
mod service;
mod utils;

pub use cluster::{
    ClusterClient, InMemoryCluster, MemoryRecord, RawHeader, RawRecord, ReadConnection,
    TopicMetadataProvider,
};
pub use codec::{DeserializeError, DisplayDeserializer, RecordDeserializer};
pub use message::{
    ConsumeFilter, Expression, FromSpec, Header, OffsetStrategy, OffsetWindow, Partition,
    PayloadFormat, RecalculateRequest, ScanItem, ScanOutcome, ScanRecord, TimestampKind, Topic,
    TopicPartition,
};
pub use scan::{recalculate, FilterEngine, ScanHandle, ScanStream};
pub use service::{
    setup_local_tracing, setup_tracing, AppError, AppResult, Engine, EngineConfig, ScanConfig,
    ScanPoolConfig, Shutdown,
};
pub use utils::{PoolHandler, WorkerPool, WorkerPoolConfig};
