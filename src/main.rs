use std::sync::Arc;

use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::EnvFilter;

use spendtrack::config::{CliArgs, Config};
use spendtrack::convert::CurrencyConverter;
use spendtrack::routes::{self, AppState};
use spendtrack_core::StorageBackend;
use spendtrack_memory::InMemoryStorage;
use spendtrack_sqlite::SqliteStorage;

#[tokio::main]
async fn main() {
    let cli = CliArgs::parse();
    let config = Config::load(&cli);
    init_tracing(&config);

    let storage: Arc<dyn StorageBackend> = match config.storage.backend.as_str() {
        "memory" => Arc::new(InMemoryStorage::new()),
        "sqlite" => match SqliteStorage::new(&config.storage.data_dir) {
            Ok(s) => Arc::new(s),
            Err(e) => {
                tracing::error!(error = %e, data_dir = %config.storage.data_dir, "Failed to open storage");
                std::process::exit(1);
            }
        },
        other => {
            tracing::error!(backend = other, "Unknown storage backend, expected sqlite or memory");
            std::process::exit(1);
        }
    };

    let converter = match CurrencyConverter::from_config(&config.currency) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            tracing::error!(error = %e, "Currency converter setup failed");
            std::process::exit(1);
        }
    };

    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install metrics recorder");

    let app = routes::router(
        AppState { storage, converter },
        Arc::new(config.auth.clone()),
        metrics_handle,
    );

    let addr = config.listen_addr();
    tracing::info!(%addr, backend = %config.storage.backend, "API listening");

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .expect("Server error");
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
