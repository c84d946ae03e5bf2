pub mod api;
pub mod cli;
pub mod config;
pub mod db;
pub mod requests;

pub use db::DbPool;

use config::Config;
use metrics_exporter_prometheus::PrometheusHandle;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: Config, db: DbPool) -> Self {
        Self {
            config,
            db,
            metrics_handle: None,
        }
    }

    /// Set the Prometheus metrics handle
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}
