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

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, trace, warn};

use crate::Shutdown;

/// Handler invoked by pool workers for each submitted task.
pub trait PoolHandler<T>: Clone + Send + Sync + 'static {
    fn handle(&self, task: T) -> impl Future<Output = ()> + Send;
}

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub channel_capacity: usize,
    pub num_channels: i8,
    pub monitor_interval: Duration,
    pub worker_check_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            num_channels: 4,
            monitor_interval: Duration::from_secs(5),
            worker_check_timeout: Duration::from_millis(200),
        }
    }
}

/// A bounded executor with multiple independent task channels, each drained
/// by a dedicated worker so tasks on one channel process sequentially. A
/// monitor restarts any worker that dies from a panic. Workers hold a clone
/// of the shutdown-complete sender, so draining the paired receiver waits
/// for in-flight tasks to finish.
#[derive(Debug)]
pub struct WorkerPool<T> {
    channels: Arc<HashMap<i8, TaskChannel<T>>>,
    num_channels: i8,
}

#[derive(Debug)]
struct TaskChannel<T> {
    sender: async_channel::Sender<T>,
    receiver: async_channel::Receiver<T>,
}

struct Worker {
    id: i8,
    handle: JoinHandle<()>,
}

impl<T: Send + Debug + 'static> WorkerPool<T> {
    pub fn new<H: PoolHandler<T>>(
        notify_shutdown: broadcast::Sender<()>,
        shutdown_complete_tx: mpsc::Sender<()>,
        handler: H,
        config: WorkerPoolConfig,
    ) -> Self {
        let num_channels = config.num_channels.max(1);
        let mut workers = Vec::with_capacity(num_channels as usize);
        let mut channels = HashMap::with_capacity(num_channels as usize);

        for id in 0..num_channels {
            let (sender, receiver) = async_channel::bounded(config.channel_capacity);
            let worker = Self::spawn_worker(
                id,
                handler.clone(),
                notify_shutdown.clone(),
                shutdown_complete_tx.clone(),
                receiver.clone(),
            );
            workers.push(worker);
            channels.insert(id, TaskChannel { sender, receiver });
        }

        let channels = Arc::new(channels);
        Self::spawn_monitor(
            workers,
            channels.clone(),
            notify_shutdown,
            shutdown_complete_tx,
            handler,
            config,
        );

        Self {
            channels,
            num_channels,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.num_channels as usize
    }

    pub async fn send(&self, task: T, channel_id: i8) -> Result<(), async_channel::SendError<T>> {
        let channel = &self.channels[&(channel_id.rem_euclid(self.num_channels))];
        channel.sender.send(task).await
    }

    fn spawn_worker<H: PoolHandler<T>>(
        id: i8,
        handler: H,
        notify_shutdown: broadcast::Sender<()>,
        shutdown_complete_tx: mpsc::Sender<()>,
        receiver: async_channel::Receiver<T>,
    ) -> Worker {
        let mut shutdown = Shutdown::new(notify_shutdown.subscribe());

        let handle = tokio::spawn(async move {
            let _shutdown_complete = shutdown_complete_tx;
            debug!("worker {id} started");
            loop {
                tokio::select! {
                    task = receiver.recv() => match task {
                        Ok(task) => handler.handle(task).await,
                        Err(_) => {
                            debug!("worker {id} channel closed");
                            break;
                        }
                    },
                    _ = shutdown.recv() => {
                        debug!("worker {id} shutting down");
                        break;
                    }
                }
            }
        });

        Worker { id, handle }
    }

    fn spawn_monitor<H: PoolHandler<T>>(
        mut workers: Vec<Worker>,
        channels: Arc<HashMap<i8, TaskChannel<T>>>,
        notify_shutdown: broadcast::Sender<()>,
        shutdown_complete_tx: mpsc::Sender<()>,
        handler: H,
        config: WorkerPoolConfig,
    ) {
        tokio::spawn(async move {
            let _shutdown_complete = shutdown_complete_tx.clone();
            let mut interval = time::interval(config.monitor_interval);
            let mut shutdown = Shutdown::new(notify_shutdown.subscribe());

            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        debug!("worker monitor received shutdown signal");
                        break;
                    }
                    _ = interval.tick() => {
                        for worker in &mut workers {
                            match time::timeout(config.worker_check_timeout, &mut worker.handle).await {
                                Ok(Ok(_)) => {
                                    warn!("worker {} exited, restarting", worker.id);
                                    *worker = Self::restart(worker.id, &handler, &notify_shutdown, &shutdown_complete_tx, &channels);
                                }
                                Ok(Err(join_error)) => {
                                    if join_error.is_panic() {
                                        error!("worker {} panicked: {join_error}", worker.id);
                                    } else {
                                        error!("worker {} failed: {join_error}", worker.id);
                                    }
                                    *worker = Self::restart(worker.id, &handler, &notify_shutdown, &shutdown_complete_tx, &channels);
                                }
                                Err(_) => {
                                    trace!("worker {} is running", worker.id);
                                }
                            }
                        }
                    }
                }
            }
            debug!("worker monitor exiting");
        });
    }

    fn restart<H: PoolHandler<T>>(
        id: i8,
        handler: &H,
        notify_shutdown: &broadcast::Sender<()>,
        shutdown_complete_tx: &mpsc::Sender<()>,
        channels: &HashMap<i8, TaskChannel<T>>,
    ) -> Worker {
        let worker = Self::spawn_worker(
            id,
            handler.clone(),
            notify_shutdown.clone(),
            shutdown_complete_tx.clone(),
            channels[&id].receiver.clone(),
        );
        debug!("worker {id} restarted");
        worker
    }
}
