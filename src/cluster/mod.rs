pub use client::{ClusterClient, RawHeader, RawRecord, ReadConnection, TopicMetadataProvider};
pub use memory::{InMemoryCluster, MemoryRecord};

mod client;
mod memory;
