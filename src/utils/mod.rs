pub use worker_pool::{PoolHandler, WorkerPool, WorkerPoolConfig};

mod worker_pool;
