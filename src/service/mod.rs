pub use app_error::{AppError, AppResult};
pub use config::{EngineConfig, ScanConfig, ScanPoolConfig};
pub use engine::Engine;
pub use shutdown::Shutdown;
pub use tracing_config::{setup_local_tracing, setup_tracing};

mod app_error;
mod config;
mod engine;
mod shutdown;
mod tracing_config;
