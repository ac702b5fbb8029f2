//! liveupdate - obtain feature flags and properties from a live update service
//!
//! Obtains one configuration, serving it from the local disk cache while it is
//! fresh, and prints it or the requested features and properties.

use std::process;
use std::sync::Arc;

use clap::Parser;
use reqwest::Client;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use liveupdate::cache::RecordStore;
use liveupdate::cli::{render_record, Cli, Settings};
use liveupdate::fetch::HttpFetcher;
use liveupdate::manager::ConfigurationManager;

/// Initializes logging to stderr, filtered by `RUST_LOG` (default: warn)
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let cli = Cli::parse();
    let settings = match Settings::from_cli(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(2);
        }
    };

    let store = match settings.cache_dir.clone() {
        Some(dir) => RecordStore::with_dir(dir),
        None => RecordStore::new().ok_or("cannot determine cache directory; use --cache-dir")?,
    };

    let http_client = Client::builder().timeout(settings.timeout).build()?;
    let fetcher = HttpFetcher::with_client(http_client, settings.service_url.clone())
        .with_token(settings.token.clone());
    let manager = ConfigurationManager::new(Arc::new(fetcher), store);

    match manager.obtain(&settings.request, settings.use_cache).await {
        Ok(record) => {
            let output = render_record(
                &record,
                settings.list,
                &settings.features,
                &settings.properties,
            )?;
            if !output.is_empty() {
                println!("{}", output);
            }
            Ok(())
        }
        Err(failure) => {
            eprintln!("{}", failure.to_json());
            process::exit(1);
        }
    }
}
