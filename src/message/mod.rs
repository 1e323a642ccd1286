pub use offset::{FromSpec, OffsetStrategy, OffsetWindow, RecalculateRequest};
pub use record::{
    Expression, Header, PayloadFormat, ScanItem, ScanOutcome, ScanRecord, TimestampKind,
};
pub use topic_partition::{ConsumeFilter, Partition, Topic, TopicPartition};

mod offset;
mod record;
mod topic_partition;
