// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context as _, Result};
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use clap::Parser;
use futures::StreamExt;
use k8s_openapi::api::networking::v1::Ingress;
use kube::{
    runtime::{controller::Action, watcher::Config, Controller},
    Api, Client, ResourceExt,
};
use kube_dns_manager::{
    constants::{
        DEFAULT_CLOUDFLARE_API_URL, DEFAULT_CONFIG_MAP_NAME, DEFAULT_CONFIG_MAP_NAMESPACE,
        ERROR_REQUEUE_DURATION_SECS, HEALTH_SERVER_PATH, KIND_INGRESS,
        METRICS_SERVER_BIND_ADDRESS, METRICS_SERVER_PATH, SUCCESS_REQUEUE_DURATION_SECS,
        TOKIO_WORKER_THREADS,
    },
    context::{Context, Settings},
    metrics,
    reconcilers::{ingress::error_reason, reconcile_ingress},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
struct ReconcileError(#[from] anyhow::Error);

/// Keeps Ingress hostnames in sync with Cloudflare or BIND DNS zones
#[derive(Debug, Parser)]
#[command(name = "kube-dns-manager", version, about)]
struct Args {
    /// Name of the ConfigMap holding controller settings
    #[arg(long, env = "CONFIG_MAP_NAME", default_value = DEFAULT_CONFIG_MAP_NAME)]
    config_map_name: String,

    /// Namespace of the settings ConfigMap and of every DNS configuration source
    #[arg(long, env = "CONFIG_MAP_NAMESPACE", default_value = DEFAULT_CONFIG_MAP_NAMESPACE)]
    config_map_namespace: String,

    /// Address the metrics and health endpoints listen on
    #[arg(long, env = "METRICS_BIND_ADDRESS", default_value = METRICS_SERVER_BIND_ADDRESS)]
    metrics_bind_address: SocketAddr,

    /// Base URL of the Cloudflare v4 API
    #[arg(long, env = "CLOUDFLARE_API_URL", default_value = DEFAULT_CLOUDFLARE_API_URL)]
    cloudflare_api_url: String,
}

impl Args {
    fn settings(&self) -> Settings {
        Settings {
            config_map_name: self.config_map_name.clone(),
            config_map_namespace: self.config_map_namespace.clone(),
            cloudflare_api_url: self.cloudflare_api_url.clone(),
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("kube-dns-manager")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<()> {
    // Respects RUST_LOG if set, otherwise defaults to INFO level.
    // RUST_LOG_FORMAT=json switches to JSON output.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    info!(
        config_map = %args.config_map_name,
        namespace = %args.config_map_namespace,
        "Starting Ingress DNS controller"
    );

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;
    debug!("Kubernetes client initialized successfully");

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")?;

    let context = Arc::new(Context::from_client(client.clone(), http_client, &args.settings()));

    // The controller and the metrics server should never exit on their own
    tokio::select! {
        result = run_ingress_controller(client, context) => {
            error!("CRITICAL: Ingress controller exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("Ingress controller exited unexpectedly without error")
        }
        result = run_metrics_server(args.metrics_bind_address) => {
            error!("CRITICAL: Metrics server exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("Metrics server exited unexpectedly without error")
        }
        result = shutdown_signal() => {
            result?;
            info!("Graceful shutdown completed successfully");
            Ok(())
        }
    }
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received SIGINT, initiating graceful shutdown...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM (pod termination), initiating graceful shutdown...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C, initiating graceful shutdown...");
    }

    Ok(())
}

/// Run the Ingress controller
async fn run_ingress_controller(client: Client, context: Arc<Context>) -> Result<()> {
    info!("Starting Ingress controller");
    debug!("Initializing Ingress controller with cluster-wide watch");

    let api = Api::<Ingress>::all(client);

    Controller::new(api, Config::default())
        .run(reconcile_ingress_wrapper, error_policy, context)
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

/// Reconcile wrapper for `Ingress`
///
/// Reduces the object to its identity; the reconciler reads everything fresh.
async fn reconcile_ingress_wrapper(
    ingress: Arc<Ingress>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();
    let namespace = ingress.namespace().unwrap_or_default();
    let name = ingress.name_any();

    match reconcile_ingress(&ctx, &namespace, &name).await {
        Ok(outcome) => {
            metrics::record_reconciliation_success(KIND_INGRESS, start.elapsed());
            info!(namespace, name, outcome = ?outcome, "Successfully reconciled Ingress");
            Ok(success_action())
        }
        Err(e) => {
            metrics::record_reconciliation_error(KIND_INGRESS, start.elapsed());
            metrics::record_error(KIND_INGRESS, error_reason(&e));
            error!(namespace, name, "Failed to reconcile Ingress: {:#}", e);
            Err(e.into())
        }
    }
}

/// Periodic requeue that heals DNS drift.
fn success_action() -> Action {
    Action::requeue(Duration::from_secs(SUCCESS_REQUEUE_DURATION_SECS))
}

/// Error policy for controller
fn error_policy(_resource: Arc<Ingress>, err: &ReconcileError, _ctx: Arc<Context>) -> Action {
    warn!(error = %err, "Requeueing Ingress after reconciliation error");
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_DURATION_SECS))
}

/// Serve Prometheus metrics and a liveness probe.
async fn run_metrics_server(address: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .with_context(|| format!("Failed to bind metrics server to {address}"))?;
    info!(%address, "Metrics server listening");

    axum::serve(listener, router()).await?;
    Ok(())
}

fn router() -> Router {
    Router::new()
        .route(METRICS_SERVER_PATH, get(metrics_handler))
        .route(HEALTH_SERVER_PATH, get(health_handler))
}

async fn metrics_handler() -> Response {
    match metrics::gather_metrics() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn health_handler() -> &'static str {
    "ok"
}
