use std::panic;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use coderunner_web::config::{Config, ConfigError};
use coderunner_web::constants::SHUTDOWN_TIMEOUT;
use coderunner_web::http;
use coderunner_web::pool::RunnerPool;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    set_panic_hook();

    let config = match Config::load() {
        Err(ConfigError::Parse(e)) => e.exit(),
        loaded => loaded?,
    };
    tracing::info!(
        "Using interpreter {:?}, max_concurrent={}, timeout={:?}",
        config.executable_path,
        config.max_concurrent(),
        config.timeout()
    );

    let pool = Arc::new(RunnerPool::new(
        config.runner_config(),
        config.max_concurrent(),
    ));
    let router = http::router(pool.clone(), config.static_dir())?;
    let listener = http::bind(config.bind_addr()).await?;

    http::serve(listener, router, http::shutdown_signal()).await?;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, pool.drain())
        .await
        .is_err()
    {
        tracing::warn!("Runner pool did not drain within {:?}", SHUTDOWN_TIMEOUT);
    }

    tracing::info!("Server stopped");
    Ok(())
}

fn set_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        tracing::error!(
            message = "panic occurred",
            panic = %panic_info
        );
    }));
}
