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

use tokio::sync::broadcast;

/// Receiver side of a one-shot stop signal, used both for engine shutdown
/// and per-scan cancellation. The signal also fires when every sender is
/// dropped, so an abandoned scan handle cancels its scan.
#[derive(Debug)]
pub struct Shutdown {
    is_shutdown: bool,
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    pub fn new(notify: broadcast::Receiver<()>) -> Shutdown {
        Shutdown {
            is_shutdown: false,
            notify,
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown
    }

    /// Non-blocking check for a signal that already arrived.
    pub fn check(&mut self) -> bool {
        if !self.is_shutdown {
            match self.notify.try_recv() {
                Ok(()) | Err(broadcast::error::TryRecvError::Closed) => self.is_shutdown = true,
                Err(_) => {}
            }
        }
        self.is_shutdown
    }

    /// Waits for the signal; returns immediately once it has been seen.
    pub async fn recv(&mut self) {
        if self.is_shutdown {
            return;
        }
        let _ = self.notify.recv().await;
        self.is_shutdown = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_check_sees_signal() {
        let (tx, rx) = broadcast::channel(1);
        let mut shutdown = Shutdown::new(rx);
        assert!(!shutdown.check());
        tx.send(()).unwrap();
        assert!(shutdown.check());
        assert!(shutdown.is_shutdown());
    }

    #[tokio::test]
    async fn test_recv_is_sticky() {
        let (tx, rx) = broadcast::channel(1);
        let mut shutdown = Shutdown::new(rx);
        tx.send(()).unwrap();
        shutdown.recv().await;
        shutdown.recv().await;
        assert!(shutdown.is_shutdown());
    }
}
