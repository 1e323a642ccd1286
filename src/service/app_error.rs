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

use std::time::Duration;

pub type AppResult<T> = Result<T, AppError>;

/// Scan-level failures. Per-expression compile/eval failures and per-field
/// deserialization failures are deliberately not represented here; they are
/// isolated at their call sites and never abort a scan.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// malformed or missing request parameters, raised before any I/O
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("illegal state: {0}")]
    IllegalStateError(String),

    /// transient cluster failure: metadata fetch, assignment or a poll call
    #[error("cluster error: {0}")]
    ClusterError(String),

    /// the consumer waited this long without receiving an item or the sentinel
    #[error("scan stalled: no item within {0:?}")]
    StalledScan(Duration),

    #[error("channel send error: {0}")]
    ChannelSendError(String),

    #[error("channel recv error: {0}")]
    ChannelRecvError(String),

    #[error("config file error: {0}")]
    ConfigFileError(#[from] config::ConfigError),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}
