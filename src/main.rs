//! catalog-cache - Fetch catalog entities through a persistent cache
//!
//! Resolves one entity by kind and handle, serving it from the persisted
//! cache when fresh and from the catalog API otherwise, and prints it as JSON.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use catalog_cache::cache::{CacheCoordinator, NoopDriver, PersistentDriver, StorageDriver};
use catalog_cache::catalog::CatalogClient;
use catalog_cache::cli::{Cli, Persistence, Settings};

/// Installs a stderr log subscriber; `RUST_LOG` overrides the default filter
fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "catalog_cache=debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Picks the storage driver for the configured persistence
fn storage_driver(settings: &Settings) -> Arc<dyn StorageDriver> {
    match settings.file_store() {
        Some(store) => {
            tracing::debug!(dir = %store.dir().display(), "persisting cache to disk");
            Arc::new(PersistentDriver::new(store, settings.options))
        }
        None => {
            if settings.persistence != Persistence::Disabled {
                tracing::warn!("no cache directory available, keeping cache in memory");
            }
            Arc::new(NoopDriver)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = match Settings::from_cli(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(2);
        }
    };

    let coordinator = CacheCoordinator::builder()
        .options(settings.options)
        .storage_driver(storage_driver(&settings))
        .build();
    coordinator.warm().await;

    let client = CatalogClient::new(settings.base_url.as_str());
    let result = coordinator
        .resolve_entity(settings.kind, &settings.handle, &client)
        .await;

    // Background persistence would be dropped with the runtime
    coordinator.flush().await;

    match result {
        Ok(Some(payload)) => match serde_json::to_string_pretty(&payload) {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: {}", e);
                ExitCode::FAILURE
            }
        },
        Ok(None) => {
            eprintln!("No {} found for handle '{}'", settings.kind, settings.handle);
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(2)
        }
    }
}
