#![allow(non_snake_case)]

use std::env;
use std::net::SocketAddr;
use std::process;

use drvynServer::cli;
use drvynServer::config::{AppConfig, LogFormat, Settings};
use drvynServer::runtime::{self, AppState};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat, filter: Option<String>) {
    let filter = filter
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() {
    let (config, config_error) = match env::var("CONFIG_FILE") {
        Ok(path) => match AppConfig::from_file(&path) {
            Ok(config) => (config, None),
            Err(e) => (AppConfig::default(), Some(e)),
        },
        Err(_) => (AppConfig::default(), None),
    };

    let get_prop = |key: &str| -> Option<String> {
        config.get(key).or_else(|| env::var(key).ok())
    };

    let settings = match Settings::from_lookup(&get_prop) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            process::exit(2);
        }
    };
    init_tracing(settings.log_format, get_prop("RUST_LOG"));
    if let Some(e) = config_error {
        warn!(error = %e, "config file ignored, using environment only");
    }

    match settings.run_mode.as_str() {
        "api" => {
            let state = match AppState::load(&settings) {
                Ok(state) => state,
                Err(e) => {
                    error!(error = %e, location = %settings.db_location, "unable to load database");
                    process::exit(1);
                }
            };
            runtime::run_api(state, SocketAddr::new(settings.bind_addr, settings.port)).await;
        }
        "cli" => cli::cli(&settings, &get_prop).await,
        other => error!(run_mode = other, "Invalid run mode"),
    }
}
