pub mod admin;
pub mod aggregate;
pub mod config;
pub mod errors;
pub mod fetcher;
pub mod filters;
pub mod http_client;
pub mod metrics_defs;
pub mod pipeline;
pub mod planner;
pub mod service;
pub mod token;

#[cfg(test)]
mod testutils;

use crate::admin::AdminService;
use crate::config::Config;
use crate::errors::ServiceError;
use crate::pipeline::Collector;
use crate::service::CollectorService;
use shared::http::{bind_listener, serve};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Serves the aggregation endpoint and the admin probes until either listener
/// fails or the process receives Ctrl-C.
pub async fn run(config: Config) -> Result<(), ServiceError> {
    let config = Arc::new(config);
    let collector = Arc::new(Collector::new(config.clone())?);
    let ready = Arc::new(AtomicBool::new(false));

    let admin_listener =
        bind_listener(&config.admin_listener.host, config.admin_listener.port).await?;
    let listener = bind_listener(&config.listener.host, config.listener.port).await?;

    let service = CollectorService::new(collector, &config);
    let admin = AdminService::new(ready.clone());
    ready.store(true, Ordering::Relaxed);

    tokio::select! {
        result = async {
            tokio::try_join!(serve(listener, service), serve(admin_listener, admin))
        } => {
            ready.store(false, Ordering::Relaxed);
            result.map(|_| ())
        }
        signal = tokio::signal::ctrl_c() => {
            ready.store(false, Ordering::Relaxed);
            tracing::info!("received shutdown signal");
            signal.map_err(ServiceError::from)
        }
    }
}
