//! tailserve entry point: parses CLI, sets up logging and starts the
//! single-threaded runtime in `app`.

mod app;
mod cli;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = cli::parse()?;
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();
    app::run(config).await
}
