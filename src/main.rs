use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

use adql_gateway::api;
use adql_gateway::config::Config;
use adql_gateway::services::database::default_backends;
use adql_gateway::services::{
    ExecutionContext, JobManager, MetaservCatalog, MysqlMetaserv, QueryService,
    ServiceAccountConnections,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    tokio::fs::create_dir_all(&config.jobs.base_path).await?;
    info!("Query results stored under {}", config.jobs.base_path.display());

    let catalog: Arc<dyn MetaservCatalog> = Arc::new(MysqlMetaserv::new(&config.metaserv.url).map_err(|e| {
        error!("Invalid metaserv configuration: {}", e);
        e
    })?);

    let credentials = match &config.credentials.password_store {
        Some(path) => ServiceAccountConnections::from_file(path).await.map_err(|e| {
            error!("Failed to load credentials from {}: {}", path.display(), e);
            e
        })?,
        None => ServiceAccountConnections::default(),
    };
    info!("Loaded {} service account credentials", credentials.len());

    let context = ExecutionContext {
        catalog: catalog.clone(),
        credentials: Arc::new(credentials),
        backends: default_backends(),
        base_path: config.jobs.base_path.clone(),
        fetch_size: config.jobs.fetch_size,
    };
    let jobs = Arc::new(JobManager::new(context, config.job_settings()));
    let _retention = jobs.start_retention_task();

    let query_service = Arc::new(QueryService::new(catalog, jobs, config.engine.scheme.clone()));
    let app = api::routes::create_router(query_service);

    // Start server
    let addr: SocketAddr = config.server_address().parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
