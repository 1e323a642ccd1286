use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::AppResult;

/// Scan loop tuning. The defaults carry the engine's documented behavior:
/// one-second bounded polls, stop after three consecutive empty polls, a
/// ten-round hard cap, and a five-second consumer read timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub poll_timeout_ms: u64,
    pub max_empty_polls: u32,
    pub max_poll_rounds: u32,
    pub read_timeout_ms: u64,
    pub max_results_cap: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: 1000,
            max_empty_polls: 3,
            max_poll_rounds: 10,
            read_timeout_ms: 5000,
            max_results_cap: 1000,
        }
    }
}

impl ScanConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Sizing for the pool of workers that execute scan jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanPoolConfig {
    pub channel_capacity: usize,
    pub num_channels: i8,
    pub monitor_interval_ms: u64,
    pub worker_check_timeout_ms: u64,
}

impl Default for ScanPoolConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            num_channels: num_cpus::get().min(4) as i8,
            monitor_interval_ms: 5000,
            worker_check_timeout_ms: 200,
        }
    }
}

impl ScanPoolConfig {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    pub fn worker_check_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_check_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scan: ScanConfig,
    pub scan_pool: ScanPoolConfig,
}

impl EngineConfig {
    pub fn set_up_config<P: AsRef<Path>>(path: P) -> AppResult<EngineConfig> {
        let path_str = path.as_ref().to_string_lossy();
        let config = config::Config::builder()
            .add_source(config::File::with_name(&path_str))
            .build()?;
        Ok(config.try_deserialize()?)
    }
}
