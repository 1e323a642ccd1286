// Copyright 2025 the loglens authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::info;
use uuid::Uuid;

use crate::cluster::ClusterClient;
use crate::codec::{DisplayDeserializer, RecordDeserializer};
use crate::message::{ConsumeFilter, OffsetWindow, RecalculateRequest};
use crate::scan::{recalculate, ScanCoordinator, ScanHandle, ScanJob};
use crate::service::{EngineConfig, Shutdown};
use crate::utils::{PoolHandler, WorkerPool, WorkerPoolConfig};
use crate::AppResult;

/// Front door of the scan engine. Owns the cluster client, the record
/// deserializer and a bounded pool of scan workers; each scan runs
/// independently on its own read connection and may proceed concurrently
/// with any other.
pub struct Engine {
    cluster: Arc<dyn ClusterClient>,
    config: Arc<EngineConfig>,
    scan_pool: WorkerPool<ScanJob>,
    next_channel: AtomicUsize,
    notify_shutdown: broadcast::Sender<()>,
    shutdown_complete_tx: mpsc::Sender<()>,
    shutdown_complete_rx: mpsc::Receiver<()>,
}

#[derive(Clone)]
struct ScanJobHandler {
    coordinator: Arc<ScanCoordinator>,
}

impl PoolHandler<ScanJob> for ScanJobHandler {
    fn handle(&self, job: ScanJob) -> impl Future<Output = ()> + Send {
        let coordinator = self.coordinator.clone();
        async move { coordinator.run(job).await }
    }
}

impl Engine {
    pub fn new(cluster: Arc<dyn ClusterClient>, config: EngineConfig) -> Self {
        Self::with_deserializer(cluster, Arc::new(DisplayDeserializer), config)
    }

    pub fn with_deserializer(
        cluster: Arc<dyn ClusterClient>,
        deserializer: Arc<dyn RecordDeserializer>,
        config: EngineConfig,
    ) -> Self {
        let config = Arc::new(config);
        let (notify_shutdown, _) = broadcast::channel(1);
        let (shutdown_complete_tx, shutdown_complete_rx) = mpsc::channel(1);

        let coordinator = Arc::new(ScanCoordinator::new(
            cluster.clone(),
            deserializer,
            config.scan.clone(),
        ));
        let pool_config = WorkerPoolConfig {
            channel_capacity: config.scan_pool.channel_capacity,
            num_channels: config.scan_pool.num_channels,
            monitor_interval: config.scan_pool.monitor_interval(),
            worker_check_timeout: config.scan_pool.worker_check_timeout(),
        };
        let scan_pool = WorkerPool::new(
            notify_shutdown.clone(),
            shutdown_complete_tx.clone(),
            ScanJobHandler { coordinator },
            pool_config,
        );

        Self {
            cluster,
            config,
            scan_pool,
            next_channel: AtomicUsize::new(0),
            notify_shutdown,
            shutdown_complete_tx,
            shutdown_complete_rx,
        }
    }

    /// Validates the request and dispatches a scan job. The returned handle
    /// streams at most `max_results` records followed by the sentinel;
    /// malformed requests fail here, before any cluster call.
    pub async fn scan(&self, topic: &str, filter: ConsumeFilter) -> AppResult<ScanHandle> {
        let max_results = filter.validate(self.config.scan.max_results_cap)?;
        let scan_id = Uuid::new_v4();

        let (items_tx, items_rx) = mpsc::channel(max_results);
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (cancel_tx, cancel_rx) = broadcast::channel(1);

        let job = ScanJob {
            scan_id,
            topic: topic.to_string(),
            filter,
            max_results,
            items: items_tx,
            cancel: Shutdown::new(cancel_rx),
            outcome: outcome_tx,
        };
        let channel = self.next_channel.fetch_add(1, Ordering::Relaxed)
            % self.scan_pool.channel_count();
        self.scan_pool
            .send(job, channel as i8)
            .await
            .map_err(|e| crate::AppError::ChannelSendError(e.to_string()))?;

        Ok(ScanHandle::new(
            scan_id,
            items_rx,
            cancel_tx,
            outcome_rx,
            self.config.scan.read_timeout(),
        ))
    }

    /// Previews a bulk offset change for a consumer group: one target offset
    /// per input partition, never fewer.
    pub async fn recalculate_offsets(
        &self,
        topic: &str,
        windows: &BTreeMap<i32, OffsetWindow>,
        request: &RecalculateRequest,
    ) -> AppResult<BTreeMap<i32, i64>> {
        recalculate(self.cluster.as_ref(), topic, windows, request).await
    }

    /// Stops the scan workers and waits until in-flight scans have drained.
    pub async fn shutdown(self) {
        let Engine {
            scan_pool,
            notify_shutdown,
            shutdown_complete_tx,
            mut shutdown_complete_rx,
            ..
        } = self;
        let _ = notify_shutdown.send(());
        drop(notify_shutdown);
        drop(scan_pool);
        drop(shutdown_complete_tx);
        let _ = shutdown_complete_rx.recv().await;
        info!("scan engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::InMemoryCluster;
    use crate::message::{FromSpec, OffsetStrategy};

    fn quick_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.scan.poll_timeout_ms = 10;
        config.scan_pool.num_channels = 2;
        config
    }

    #[tokio::test]
    async fn test_invalid_request_fails_before_dispatch() {
        let cluster = InMemoryCluster::new();
        let engine = Engine::new(Arc::new(cluster), quick_config());

        let filter = ConsumeFilter {
            from: FromSpec::strategy(OffsetStrategy::Specific),
            max_results: 10,
            partitions: vec![],
            key_format: None,
            value_format: None,
            expressions: vec![],
        };
        let err = engine.scan("orders", filter).await.unwrap_err();
        assert!(matches!(err, crate::AppError::InvalidArgument(_)));
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_scan_round_trip_through_the_pool() {
        let cluster = InMemoryCluster::new();
        cluster.create_topic("orders", 1);
        cluster.append_text("orders", 0, 1000, "k", "v").unwrap();
        let engine = Engine::new(Arc::new(cluster), quick_config());

        let filter = ConsumeFilter {
            from: FromSpec::strategy(OffsetStrategy::Earliest),
            max_results: 10,
            partitions: vec![],
            key_format: None,
            value_format: None,
            expressions: vec![],
        };
        let mut handle = engine.scan("orders", filter).await.unwrap();
        let records = handle.drain().await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(handle.outcome().await.unwrap().is_completed());
        engine.shutdown().await;
    }
}
