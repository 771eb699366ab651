//! `shieldflow` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`    — start the API server, worker pool, and trigger supervisors.
//! - `worker`   — start a standalone worker pool.
//! - `validate` — validate a workflow graph JSON file.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use blocks::BlockRegistry;
use clients::{
    ChainRpc, NilaiClient, NilccClient, NildbClient, SocialApiClient, SocialFeed, ZcashRpcClient,
};
use engine::Executor;
use queue::{JobQueue, QueueConfig, WorkerPool};
use store::{SecretBox, Store};

#[derive(Parser)]
#[command(
    name = "shieldflow",
    about = "Privacy-oriented workflow orchestration engine",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the API server, workers, and trigger supervisors.
    Serve {
        #[arg(long, default_value = "0.0.0.0:8080", env = "BIND_ADDR")]
        bind: String,
        #[arg(long, default_value_t = queue::worker::DEFAULT_CONCURRENCY, env = "WORKER_CONCURRENCY")]
        concurrency: usize,
    },
    /// Start a standalone worker pool processing queued runs.
    Worker {
        #[arg(long, default_value_t = queue::worker::DEFAULT_CONCURRENCY, env = "WORKER_CONCURRENCY")]
        concurrency: usize,
    },
    /// Validate a workflow graph JSON file.
    Validate {
        /// Path to the graph JSON file.
        path: std::path::PathBuf,
    },
}

/// Everything a running node needs, assembled from the environment.
struct Runtime {
    store: Store,
    secret_box: SecretBox,
    queue: JobQueue,
    executor: Arc<Executor>,
    chain: Arc<dyn ChainRpc>,
    social: Arc<dyn SocialFeed>,
}

fn build_runtime() -> Runtime {
    let store_path =
        std::env::var("STORE_PATH").unwrap_or_else(|_| "./data/shieldflow".to_owned());
    let store = Store::open(&store_path).expect("failed to open document store");

    let encryption_key = std::env::var("ENCRYPTION_KEY").unwrap_or_else(|_| {
        warn!("ENCRYPTION_KEY not set; using an insecure development key");
        "insecure-dev-key".to_owned()
    });
    let secret_box = SecretBox::new(&encryption_key);

    let chain: Arc<dyn ChainRpc> =
        Arc::new(ZcashRpcClient::new(clients::chain::ZcashConfig::from_env()));
    let vault = Arc::new(NildbClient::new(clients::vault::VaultConfig::from_env()));
    let compute = Arc::new(NilccClient::new(clients::compute::ComputeConfig::from_env()));
    let llm = Arc::new(NilaiClient::new(clients::llm::LlmConfig::from_env()));
    let social: Arc<dyn SocialFeed> =
        Arc::new(SocialApiClient::new(clients::social::SocialConfig::from_env()));

    let registry = BlockRegistry::with_clients(chain.clone(), vault, compute, llm);
    let executor = Arc::new(Executor::new(store.clone(), secret_box.clone(), registry));
    let queue = JobQueue::new(store.clone(), QueueConfig::default());

    Runtime {
        store,
        secret_box,
        queue,
        executor,
        chain,
        social,
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { bind, concurrency } => {
            info!("Starting shieldflow node on {bind}");
            let runtime = build_runtime();
            let (shutdown_tx, shutdown_rx) = watch::channel(false);

            let pool = WorkerPool::new(
                runtime.queue.clone(),
                runtime.executor.clone(),
                concurrency,
            );
            let worker_handles = pool.start(shutdown_rx.clone());

            let supervisor_handles = triggers::spawn_all(
                runtime.store.clone(),
                runtime.queue.clone(),
                runtime.secret_box.clone(),
                runtime.chain.clone(),
                runtime.social.clone(),
                shutdown_rx,
            );

            let state = api::AppState {
                store: runtime.store,
                secret_box: runtime.secret_box,
                queue: runtime.queue,
                public_url: std::env::var("PUBLIC_URL").ok(),
            };

            tokio::select! {
                result = api::serve(&bind, state) => {
                    if let Err(err) = result {
                        warn!("server exited: {err}");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown signal received");
                }
            }

            let _ = shutdown_tx.send(true);
            for handle in worker_handles.into_iter().chain(supervisor_handles) {
                let _ = handle.await;
            }
        }

        Command::Worker { concurrency } => {
            info!("Starting worker pool (concurrency={concurrency})");
            let runtime = build_runtime();
            let (shutdown_tx, shutdown_rx) = watch::channel(false);

            let pool = WorkerPool::new(runtime.queue, runtime.executor, concurrency);
            let handles = pool.start(shutdown_rx);

            tokio::signal::ctrl_c().await.expect("signal handler");
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
            for handle in handles {
                let _ = handle.await;
            }
        }

        Command::Validate { path } => {
            let content = std::fs::read_to_string(&path)
                .unwrap_or_else(|e| panic!("cannot read file {}: {e}", path.display()));
            let value: serde_json::Value = serde_json::from_str(&content)
                .unwrap_or_else(|e| panic!("invalid JSON: {e}"));

            let graph = match engine::Graph::from_value(&value) {
                Ok(graph) => graph,
                Err(e) => {
                    eprintln!("invalid graph: {e}");
                    std::process::exit(1);
                }
            };
            match engine::validate_graph(&graph) {
                Ok(order) => {
                    println!("graph is valid; execution order: {order:?}");
                }
                Err(e) => {
                    eprintln!("validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
    }
}
