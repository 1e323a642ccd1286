use dotenv::dotenv;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use super::AppResult;

fn timer() -> ChronoLocal {
    ChronoLocal::new("%Y-%m-%d %H:%M:%S%.6f".to_string())
}

/// Console-only tracing for development and tests. Level selection comes
/// from `RUST_LOG` (a `.env` file is honored).
pub fn setup_local_tracing() -> AppResult<()> {
    dotenv().ok();
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_timer(timer())
        .with_target(true)
        .with_thread_names(true)
        .with_line_number(true);
    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    Ok(())
}

/// Console plus hourly-rolling file output. The returned guard must be held
/// for the lifetime of the process or buffered log lines are lost.
pub fn setup_tracing(log_dir: &str) -> AppResult<WorkerGuard> {
    dotenv().ok();
    let file_appender = tracing_appender::rolling::hourly(log_dir, "loglens.log");
    let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
    let writer = non_blocking.and(std::io::stdout);

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_timer(timer())
        .with_target(true)
        .with_thread_names(true)
        .with_line_number(true)
        .with_ansi(true)
        .with_writer(writer);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    Ok(worker_guard)
}
