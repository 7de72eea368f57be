use std::{collections::HashSet, env, net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use dotenvy::dotenv;
use futures::future::join_all;
use tokio::{net::TcpListener, signal};
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use kg_runtime::{
    AppState,
    ai::ResponsesClient,
    config::{AppConfig, load_config},
    graph::{
        ConsolidationTrigger, Consolidator, GraphStore, GraphWriter, MemoryGraphStore,
        MemoryGraphStoreConfig, ReviewService, spawn_consolidation_loop,
    },
    jobs::{
        JobDispatcher, JobQueue, JobStore, JobTracker, JsonJobStore, JsonJobStoreConfig,
        LocalQueue, LocalQueueConfig, spawn_workers,
    },
    pipeline::{DefaultDocumentDecoder, IngestConfig, IngestService, LlmTripletExtractor},
    routes,
    storage::StorageManager,
};

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        for (depth, cause) in err.chain().enumerate() {
            error!(cause_depth = depth, error = %cause, "Runtime crashed");
        }
        eprintln!("Runtime crashed: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    if let Err(err) = dotenv() {
        warn!(error = %err, "No .env file loaded");
    }
    let api_key = env::var("OPENAI_API_KEY").context("OPENAI_API_KEY not set")?;

    let config = load_config()
        .await
        .context("Failed to load application configuration")?;
    let working_dir = PathBuf::from(&config.working_dir);
    let workspace = config.resolved_workspace();

    let graph_store: Arc<dyn GraphStore> =
        Arc::new(MemoryGraphStore::new(MemoryGraphStoreConfig {
            working_dir: working_dir.clone(),
            namespace: "knowledge_graph".into(),
            workspace: workspace.clone(),
        }));
    let job_store: Arc<dyn JobStore> = Arc::new(JsonJobStore::new(JsonJobStoreConfig {
        working_dir: working_dir.clone(),
        namespace: "ingest_jobs".into(),
        workspace: workspace.clone(),
        ttl: chrono::Duration::seconds(config.jobs.ttl_secs as i64),
    }));
    let queue: Arc<dyn JobQueue> = Arc::new(LocalQueue::new(LocalQueueConfig {
        working_dir: working_dir.clone(),
        name: "triplet_ingest".into(),
        workspace: workspace.clone(),
    }));

    let mut storage_manager = StorageManager::new();
    storage_manager.register_graph(graph_store.clone());
    storage_manager.register_jobs(job_store.clone());
    storage_manager.register_queue(queue.clone());
    storage_manager.initialize_all().await?;

    let shutdown = CancellationToken::new();

    let consolidator = Arc::new(Consolidator::new(graph_store.clone()));
    let (trigger, consolidation_handle) = if config.consolidation.enabled {
        let (trigger, handle) = spawn_consolidation_loop(consolidator.clone(), shutdown.clone());
        (trigger, Some(handle))
    } else {
        info!("Background consolidation disabled");
        (ConsolidationTrigger::disabled(), None)
    };

    let ai_client = Arc::new(
        ResponsesClient::new(
            api_key,
            config.extraction.base_url.clone(),
            Duration::from_secs(config.extraction.timeout_secs),
        )
        .context("Failed to build LLM client")?,
    );
    let extractor = Arc::new(LlmTripletExtractor::new(
        ai_client,
        config.extraction.model.clone(),
    ));
    let writer = GraphWriter::new(
        graph_store.clone(),
        Duration::from_secs(config.graph.transaction_timeout_secs),
    );
    let ingest = Arc::new(IngestService::new(
        Arc::new(DefaultDocumentDecoder::default()),
        extractor,
        writer,
        trigger,
        IngestConfig {
            extraction_timeout: Duration::from_secs(config.extraction.timeout_secs),
            max_triplets: config.extraction.max_triplets,
        },
    ));

    let tracker = JobTracker::new(job_store.clone());
    let dispatcher = JobDispatcher::new(tracker.clone(), queue.clone());
    let worker_handles = spawn_workers(
        config.worker.workers,
        queue.clone(),
        tracker.clone(),
        ingest.clone(),
        shutdown.clone(),
    );
    let review = Arc::new(ReviewService::new(
        graph_store.clone(),
        config.review.admins.iter().cloned().collect::<HashSet<_>>(),
    ));

    let state = Arc::new(AppState {
        ingest,
        dispatcher,
        tracker,
        review,
        consolidator,
        graph: graph_store,
        max_upload_bytes: config.server.max_upload_bytes,
    });

    let addr = server_addr(&config)?;
    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind TCP listener on {addr}"))?;
    info!(%addr, workers = worker_handles.len(), "Runtime listening");

    let server_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    shutdown.cancel();
    for result in join_all(worker_handles).await {
        if let Err(err) = result {
            warn!(error = %err, "Worker task ended abnormally");
        }
    }
    if let Some(handle) = consolidation_handle {
        if let Err(err) = handle.await {
            warn!(error = %err, "Consolidation task ended abnormally");
        }
    }

    if let Err(err) = storage_manager.finalize_all().await {
        warn!(error = %err, "Failed to finalize storages");
    }

    server_result.context("Server encountered a fatal error")?;
    Ok(())
}

fn server_addr(config: &AppConfig) -> Result<SocketAddr> {
    let addr_string = format!("{}:{}", config.server.host, config.server.port);
    let addr = addr_string
        .parse::<SocketAddr>()
        .with_context(|| format!("Invalid server address: {addr_string}"))?;
    info!(host = %config.server.host, port = config.server.port, "Loaded configuration");
    Ok(addr)
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received termination signal (Ctrl+C)"),
        _ = terminate => info!("Received termination signal (SIGTERM)"),
    }
}
