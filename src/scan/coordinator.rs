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
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::cluster::{ClusterClient, RawRecord, ReadConnection};
use crate::codec::RecordDeserializer;
use crate::message::{
    ConsumeFilter, Header, Partition, PayloadFormat, ScanItem, ScanOutcome, ScanRecord, Topic,
    TopicPartition,
};
use crate::scan::filter::FilterEngine;
use crate::scan::offset_resolver;
use crate::service::ScanConfig;
use crate::{AppResult, Shutdown};

/// One scan to execute: the request plus the channels that connect the
/// polling side to its consumer.
pub(crate) struct ScanJob {
    pub scan_id: Uuid,
    pub topic: String,
    pub filter: ConsumeFilter,
    pub max_results: usize,
    pub items: mpsc::Sender<ScanItem>,
    pub cancel: Shutdown,
    pub outcome: oneshot::Sender<ScanOutcome>,
}

impl fmt::Debug for ScanJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanJob")
            .field("scan_id", &self.scan_id)
            .field("topic", &self.topic)
            .field("max_results", &self.max_results)
            .finish()
    }
}

enum ScanExit {
    Completed,
    Cancelled,
}

/// Orchestrates one scan: partition snapshot, offset resolution, assignment,
/// the bounded polling loop with deserialize/filter/emit per record, and the
/// termination guarantees around the `Last` sentinel.
pub(crate) struct ScanCoordinator {
    cluster: Arc<dyn ClusterClient>,
    deserializer: Arc<dyn RecordDeserializer>,
    config: ScanConfig,
}

impl ScanCoordinator {
    pub(crate) fn new(
        cluster: Arc<dyn ClusterClient>,
        deserializer: Arc<dyn RecordDeserializer>,
        config: ScanConfig,
    ) -> Self {
        Self {
            cluster,
            deserializer,
            config,
        }
    }

    /// Runs a scan to completion. The sentinel is emitted on every exit path
    /// except cancellation, where the caller already knows the stream is
    /// over; failures still emit the sentinel first so no consumer is left
    /// waiting, then surface through the outcome channel.
    pub(crate) async fn run(&self, job: ScanJob) {
        let ScanJob {
            scan_id,
            topic,
            filter,
            max_results,
            items,
            mut cancel,
            outcome,
        } = job;
        debug!(%scan_id, %topic, max_results, "scan started");

        let result = self
            .run_scan(&topic, &filter, max_results, &items, &mut cancel)
            .await;
        let outcome_value = match result {
            Ok(ScanExit::Completed) => {
                let _ = items.send(ScanItem::Last).await;
                debug!(%scan_id, "scan completed");
                ScanOutcome::Completed
            }
            Ok(ScanExit::Cancelled) => {
                debug!(%scan_id, "scan cancelled");
                ScanOutcome::Cancelled
            }
            Err(e) => {
                error!(%scan_id, error = %e, "scan failed");
                let _ = items.send(ScanItem::Last).await;
                ScanOutcome::Failed(e)
            }
        };
        if outcome.send(outcome_value).is_err() {
            debug!(%scan_id, "scan outcome receiver dropped");
        }
    }

    async fn run_scan(
        &self,
        topic_name: &str,
        filter: &ConsumeFilter,
        max_results: usize,
        items: &mpsc::Sender<ScanItem>,
        cancel: &mut Shutdown,
    ) -> AppResult<ScanExit> {
        let topic = self.cluster.topic(topic_name).await?;
        let candidates: Vec<Partition> = topic
            .partitions
            .iter()
            .filter(|p| filter.wants_partition(p.id))
            .filter(|p| !p.is_empty())
            .cloned()
            .collect();
        if candidates.is_empty() {
            debug!(topic = topic_name, "no partitions with data to scan");
            return Ok(ScanExit::Completed);
        }

        let mut reader = self.cluster.reader().await?;
        let exit = self
            .poll_partitions(
                &topic,
                &candidates,
                filter,
                max_results,
                reader.as_mut(),
                items,
                cancel,
            )
            .await;
        if let Err(e) = reader.close().await {
            warn!(error = %e, "failed to release scan connection");
        }
        exit
    }

    #[allow(clippy::too_many_arguments)]
    async fn poll_partitions(
        &self,
        topic: &Topic,
        candidates: &[Partition],
        filter: &ConsumeFilter,
        max_results: usize,
        reader: &mut dyn ReadConnection,
        items: &mpsc::Sender<ScanItem>,
        cancel: &mut Shutdown,
    ) -> AppResult<ScanExit> {
        let starts =
            offset_resolver::resolve(&topic.name, candidates, &filter.from, max_results, reader)
                .await?;
        if starts.is_empty() {
            debug!(topic = %topic.name, "offset resolution left nothing to scan");
            return Ok(ScanExit::Completed);
        }

        let assigned: Vec<TopicPartition> = starts
            .keys()
            .map(|id| TopicPartition::new(topic.name.clone(), *id))
            .collect();
        reader.assign(&assigned).await?;
        for tp in &assigned {
            reader.seek(tp, starts[&tp.partition]).await?;
        }

        let engine = FilterEngine::compile(&filter.expressions)?;
        let end_offsets: BTreeMap<i32, i64> = candidates
            .iter()
            .filter(|p| starts.contains_key(&p.id))
            .map(|p| (p.id, p.end_offset))
            .collect();

        let mut cursors = starts;
        let mut emitted = 0usize;
        let mut consecutive_empty = 0u32;
        let mut rounds = 0u32;

        loop {
            if cancel.check() {
                return Ok(ScanExit::Cancelled);
            }
            rounds += 1;
            let batch = tokio::select! {
                _ = cancel.recv() => return Ok(ScanExit::Cancelled),
                polled = reader.poll(self.config.poll_timeout()) => polled?,
            };
            let batch_was_empty = batch.is_empty();
            if batch_was_empty {
                consecutive_empty += 1;
            } else {
                consecutive_empty = 0;
            }

            for raw in batch {
                cursors.insert(raw.partition, raw.offset + 1);
                if emitted >= max_results {
                    continue;
                }
                let record = self.build_record(&topic.name, filter, raw);
                if engine.matches(&record) {
                    if items.send(ScanItem::Record(record)).await.is_err() {
                        debug!("scan consumer dropped its receiver");
                        return Ok(ScanExit::Cancelled);
                    }
                    emitted += 1;
                }
            }

            let behind = cursors
                .iter()
                .any(|(id, position)| end_offsets.get(id).is_some_and(|end| *position < *end));
            if emitted >= max_results || !(behind || batch_was_empty) {
                debug!(emitted, rounds, "scan reached its budget or its snapshot bounds");
                break;
            }
            if consecutive_empty >= self.config.max_empty_polls {
                debug!(consecutive_empty, rounds, "stopping after consecutive empty polls");
                break;
            }
            // Safety valve over the continuation heuristic, not a
            // correctness mechanism.
            if rounds >= self.config.max_poll_rounds {
                warn!(rounds, "forced stop: poll round cap reached");
                break;
            }
        }
        Ok(ScanExit::Completed)
    }

    fn build_record(&self, topic: &str, filter: &ConsumeFilter, raw: RawRecord) -> ScanRecord {
        let key = self.display_field(topic, &raw, raw.key.clone(), filter.key_format);
        let value = self.display_field(topic, &raw, raw.value.clone(), filter.value_format);
        let headers = raw
            .headers
            .iter()
            .map(|h| Header {
                key: h.key.clone(),
                value: h
                    .value
                    .as_ref()
                    .map(|bytes| String::from_utf8_lossy(bytes).into_owned()),
            })
            .collect();
        ScanRecord {
            partition: raw.partition,
            offset: raw.offset,
            timestamp: raw.timestamp,
            timestamp_kind: raw.timestamp_kind,
            key_raw: raw.key,
            value_raw: raw.value,
            key,
            value,
            headers,
        }
    }

    /// Deserialization failures never abort the scan; the error message
    /// stands in as the displayed value.
    fn display_field(
        &self,
        topic: &str,
        raw: &RawRecord,
        payload: Option<Bytes>,
        format: Option<PayloadFormat>,
    ) -> Option<String> {
        payload.map(|bytes| {
            self.deserializer
                .deserialize(topic, &raw.headers, &bytes, format)
                .unwrap_or_else(|e| e.to_string())
        })
    }
}
