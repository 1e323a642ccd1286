use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use uuid::Uuid;

use crate::message::{ScanItem, ScanOutcome, ScanRecord};
use crate::{AppError, AppResult};

/// Consumer side of a running scan: receives records and the terminal
/// sentinel, can cancel the scan, and reports how it ended. Dropping the
/// handle cancels the scan.
#[derive(Debug)]
pub struct ScanHandle {
    scan_id: Uuid,
    items: mpsc::Receiver<ScanItem>,
    cancel: broadcast::Sender<()>,
    outcome: oneshot::Receiver<ScanOutcome>,
    read_timeout: Duration,
}

impl ScanHandle {
    pub(crate) fn new(
        scan_id: Uuid,
        items: mpsc::Receiver<ScanItem>,
        cancel: broadcast::Sender<()>,
        outcome: oneshot::Receiver<ScanOutcome>,
        read_timeout: Duration,
    ) -> Self {
        Self {
            scan_id,
            items,
            cancel,
            outcome,
            read_timeout,
        }
    }

    pub fn scan_id(&self) -> Uuid {
        self.scan_id
    }

    /// Requests cooperative cancellation. The scan stops within one poll
    /// timeout; no further items (and no sentinel) follow.
    pub fn cancel(&self) {
        let _ = self.cancel.send(());
    }

    /// Next item from the scan. `None` means the stream closed without a
    /// sentinel, which only happens on cancellation. Waiting longer than the
    /// read timeout means the producer stalled and surfaces an error instead
    /// of blocking forever.
    pub async fn next(&mut self) -> AppResult<Option<ScanItem>> {
        match tokio::time::timeout(self.read_timeout, self.items.recv()).await {
            Ok(item) => Ok(item),
            Err(_) => Err(AppError::StalledScan(self.read_timeout)),
        }
    }

    /// Collects records until the sentinel (or, on cancellation, until the
    /// stream closes).
    pub async fn drain(&mut self) -> AppResult<Vec<ScanRecord>> {
        let mut records = Vec::new();
        loop {
            match self.next().await? {
                Some(ScanItem::Record(record)) => records.push(record),
                Some(ScanItem::Last) | None => return Ok(records),
            }
        }
    }

    /// How the scan ended, reported out-of-band from the record stream.
    /// Consume the stream first; dropping the receiver early reads as
    /// cancellation to the producer.
    pub async fn outcome(self) -> AppResult<ScanOutcome> {
        self.outcome
            .await
            .map_err(|e| AppError::ChannelRecvError(e.to_string()))
    }

    /// The record stream as a `Stream`, for consumers that speak
    /// `tokio_stream`. The scan keeps running; dropping the stream cancels
    /// it.
    pub fn into_stream(self) -> ScanStream {
        ScanStream {
            inner: ReceiverStream::new(self.items),
            _cancel: self.cancel,
        }
    }
}

pub struct ScanStream {
    inner: ReceiverStream<ScanItem>,
    _cancel: broadcast::Sender<()>,
}

impl Stream for ScanStream {
    type Item = ScanItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
