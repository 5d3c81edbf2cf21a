//! Export service façade and bootstrap helpers.
//!
//! This crate wires the host implementations (SQLite pool, `reqwest` HTTP
//! client, platform connectors) into the export core. A process typically
//! calls [`ExportService::bootstrap`] once and then hands a shutdown token to
//! [`ExportService::run_worker`].

pub mod error;
mod worker;

pub use error::{Result, ServiceError};

use std::sync::Arc;

use bridge_desktop::ReqwestHttpClient;
use bridge_traits::http::HttpClient;
use core_auth::SqliteCredentialProvider;
use core_export::{
    ExportConfig, ExportCoordinator, ExportJob, ExportJobId, ExportRequest, HealthReport,
    PlatformRegistry, SqliteExportJobStore, StartResult,
};
use core_library::db::{create_pool, DatabaseConfig};
use core_library::{SqliteTrackIdentityCache, SqliteTrackSource};
use core_runtime::config::CoreConfig;
use core_runtime::events::EventBus;
use provider_spotify::SpotifyApi;
use provider_youtube::YouTubeApi;
use sqlx::SqlitePool;
use tracing::info;

/// Connections kept beyond one per running job, for status polls and
/// cache write-back.
const SPARE_CONNECTIONS: u32 = 2;

/// Primary façade exposed to the worker binary and request handlers.
#[derive(Clone)]
pub struct ExportService {
    config: Arc<CoreConfig>,
    coordinator: ExportCoordinator,
    pool: SqlitePool,
}

impl ExportService {
    /// Open the database, build the HTTP client and register every
    /// platform connector.
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let max_connections = u32::try_from(config.max_concurrent_jobs)
            .unwrap_or(u32::MAX)
            .saturating_mul(2)
            .saturating_add(SPARE_CONNECTIONS);
        let pool = create_pool(
            DatabaseConfig::new(config.database_path.clone()).max_connections(max_connections),
        )
        .await?;

        let http = ReqwestHttpClient::with_timeout(config.http_timeout)
            .map_err(|e| ServiceError::InitializationFailed(e.to_string()))?;

        info!(
            database = %config.database_path.display(),
            max_concurrent_jobs = config.max_concurrent_jobs,
            "Export service bootstrapped"
        );

        Self::with_components(config, pool, Arc::new(http), ExportConfig::default())
    }

    /// Assemble a service from an existing pool and HTTP client.
    pub fn with_components(
        config: CoreConfig,
        pool: SqlitePool,
        http: Arc<dyn HttpClient>,
        export_config: ExportConfig,
    ) -> Result<Self> {
        config.validate()?;

        let platforms = PlatformRegistry::new()
            .register(Arc::new(SpotifyApi::new()))
            .register(Arc::new(YouTubeApi::new()));

        let coordinator = ExportCoordinator::new(
            Arc::new(SqliteExportJobStore::new(pool.clone())),
            Arc::new(SqliteCredentialProvider::new(pool.clone())),
            Arc::new(SqliteTrackSource::new(pool.clone())),
            Arc::new(SqliteTrackIdentityCache::new(pool.clone())),
            platforms,
            http,
            export_config,
        )?;

        Ok(Self {
            config: Arc::new(config),
            coordinator,
            pool,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &ExportCoordinator {
        &self.coordinator
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn events(&self) -> &EventBus {
        self.coordinator.events()
    }

    pub async fn enqueue(&self, request: ExportRequest) -> Result<ExportJob> {
        Ok(self.coordinator.enqueue(request).await?)
    }

    pub async fn start_processing(&self, job_id: Option<&ExportJobId>) -> Result<StartResult> {
        Ok(self.coordinator.start_processing(job_id).await?)
    }

    pub async fn query_health(&self) -> Result<HealthReport> {
        Ok(self.coordinator.query_health().await?)
    }

    pub async fn cancel(&self, job_id: &ExportJobId) -> Result<bool> {
        Ok(self.coordinator.cancel(job_id).await?)
    }
}
