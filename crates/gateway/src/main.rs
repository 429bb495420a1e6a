use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use foreman_domain::config::Config;
use foreman_gateway::api;
use foreman_gateway::bootstrap::build_app_state;
use foreman_gateway::cli::{Cli, Command, QueueCommand};
use foreman_queue::QueueWorker;
use foreman_store::Pool;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            let (config, _path) = foreman_gateway::cli::load_config()?;
            run_server(Arc::new(config)).await
        }
        Some(Command::Migrate) => {
            init_tracing();
            let (config, _path) = foreman_gateway::cli::load_config()?;
            let pool = Pool::connect(&config.store).await.context("running migrations")?;
            tracing::info!(dialect = ?pool.dialect(), "migrations applied");
            Ok(())
        }
        Some(Command::Queue {
            command: QueueCommand::Worker { worker_id },
        }) => {
            init_tracing();
            let (config, _path) = foreman_gateway::cli::load_config()?;
            run_queue_worker(Arc::new(config), worker_id).await
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,foreman_gateway=debug")),
        )
        .json()
        .init();
}

/// Start the gateway's HTTP/WS server.
async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("foreman gateway starting");

    let state = build_app_state(config.clone()).await?;

    if let Some(scheduler) = state.scheduler.clone() {
        scheduler.backfill().await.context("backfilling schedules")?;
        let sched = scheduler.clone();
        tokio::spawn(async move {
            sched.run_forever(tokio_util::sync::CancellationToken::new()).await;
        });
        tracing::info!("schedule scanner started");
    }

    // Periodically requeue runs stuck waiting on a job whose runner
    // connection died without ever reporting a result.
    {
        let runs = state.runs.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                interval.tick().await;
                match runs.find_stuck_waiting(600).await {
                    Ok(stuck) => {
                        for run in stuck {
                            tracing::warn!(run_id = run.id, "run stuck waiting on job past threshold");
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "stuck-run sweep failed"),
                }
            }
        });
    }

    let cors_layer = build_cors_layer(&config.server.cors);

    let max_concurrent = std::env::var("FOREMAN_MAX_CONCURRENT_REQUESTS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(256);

    let governor_layer = config.server.rate_limit.as_ref().map(|rl| {
        use tower_governor::governor::GovernorConfigBuilder;
        use tower_governor::GovernorLayer;

        let gov_config = GovernorConfigBuilder::default()
            .per_second(rl.requests_per_second as u64)
            .burst_size(rl.burst_size)
            .finish()
            .expect("rate_limit: requests_per_second and burst_size must be > 0");

        tracing::info!(
            requests_per_second = rl.requests_per_second,
            burst_size = rl.burst_size,
            "per-IP rate limiting enabled"
        );

        GovernorLayer {
            config: Arc::new(gov_config),
        }
    });
    if governor_layer.is_none() {
        tracing::info!("per-IP rate limiting disabled (no [server.rate_limit] in config)");
    }

    let router = api::router(state.clone())
        .layer(cors_layer)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_concurrent));
    let app = if let Some(gov) = governor_layer {
        router.layer(gov).with_state(state)
    } else {
        router.with_state(state)
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "foreman gateway listening");

    axum::serve(listener, app).await.context("axum server error")?;

    Ok(())
}

/// Run a standalone queue worker process (no HTTP server).
async fn run_queue_worker(config: Arc<Config>, worker_id: Option<String>) -> anyhow::Result<()> {
    let pool = Pool::connect(&config.store).await.context("connecting to store")?;
    let queue = foreman_store::QueueStore::new(pool);

    let worker_id = worker_id.unwrap_or_else(|| {
        let host = hostname();
        format!("{host}-{}", std::process::id())
    });
    tracing::info!(worker_id = %worker_id, "queue worker starting");

    let worker = Arc::new(QueueWorker::new(queue, config.queue.clone(), worker_id));

    let cancel = tokio_util::sync::CancellationToken::new();
    let reclaim = worker.clone();
    let reclaim_cancel = cancel.clone();
    tokio::spawn(async move {
        reclaim.run_reclaim_sweep(reclaim_cancel).await;
    });

    worker.run_forever(cancel).await;
    Ok(())
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "worker".to_string())
}

/// Build a [`CorsLayer`] from the configured allowed origins.
///
/// Origins may contain a trailing `*` wildcard for the port segment
/// (e.g. `http://localhost:*`). A literal `"*"` allows all origins.
fn build_cors_layer(cors: &foreman_domain::config::CorsConfig) -> CorsLayer {
    use axum::http::header;

    if cors.allowed_origins.len() == 1 && cors.allowed_origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard \"*\" — all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut wildcard_prefixes: Vec<String> = Vec::new();

    for origin in &cors.allowed_origins {
        if origin.ends_with(":*") {
            wildcard_prefixes.push(origin.trim_end_matches('*').to_owned());
        } else if let Ok(hv) = origin.parse::<HeaderValue>() {
            exact.push(hv);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    let allow_origin = if wildcard_prefixes.is_empty() {
        AllowOrigin::list(exact)
    } else {
        AllowOrigin::predicate(move |origin, _| {
            let origin_str = origin.to_str().unwrap_or("");
            if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
                return true;
            }
            wildcard_prefixes.iter().any(|prefix| {
                origin_str
                    .strip_prefix(prefix.as_str())
                    .map(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
                    .unwrap_or(false)
            })
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
