//! Scale controller service entry point.

use std::net::SocketAddr;

use kube::Client;
use reflex_controller::{leader::Leadership, Cli, Config, LoopManager};
use reflex_controller::secrets::SecretStore;
use reflex_metrics::registry::PolicyRegistry;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    if dotenvy::dotenv().is_ok() {
        info!("loaded .env file");
    }

    let cli = Cli::parse_args();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!("{},reflex_controller=debug,reflex_metrics=debug", cli.log_level).into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from(&cli);

    info!(
        namespace = %config.namespace,
        metrics_bind_address = %config.metrics_bind_address,
        leader_election = config.leader_election,
        "starting reflex-controller"
    );

    let client = match Client::try_default().await {
        Ok(client) => client,
        Err(err) => {
            error!(error = %err, "failed to build Kubernetes client");
            std::process::exit(1);
        }
    };

    let socket_addr: SocketAddr = match config.metrics_bind_address.parse() {
        Ok(addr) => addr,
        Err(err) => {
            error!(error = %err, address = %config.metrics_bind_address, "invalid metrics bind address");
            std::process::exit(1);
        }
    };

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received ctrl-c, shutting down");
            shutdown_signal.cancel();
        }
    });

    if config.leader_election {
        let identity = std::env::var("POD_NAME").unwrap_or_else(|_| uuid::Uuid::new_v4().to_string());
        let leadership = Leadership::new(
            client.clone(),
            &config.namespace,
            "reflex-controller-leader",
            identity,
        );
        if let Err(err) = leadership.acquire().await {
            error!(error = %err, "failed to acquire leader lease");
            std::process::exit(1);
        }
        let renew_shutdown = shutdown.clone();
        let lost = shutdown.clone();
        tokio::spawn(async move {
            if let Err(err) = leadership.run(&renew_shutdown).await {
                error!(error = %err, "leadership lost, shutting down");
                lost.cancel();
                std::process::exit(2);
            }
        });
    }

    let secrets = Arc::new(SecretStore::new());
    let metrics_registry = PolicyRegistry::new();
    let mut loop_manager = LoopManager::new(
        client,
        config.http_timeout,
        Arc::clone(&secrets),
        metrics_registry.clone(),
    );

    let metrics_config = reflex_metrics::Config::new(config.http_timeout);
    let app_state = reflex_metrics::AppState::new(metrics_registry, metrics_config);
    let app = reflex_metrics::api::create_router(app_state);

    let listener = match tokio::net::TcpListener::bind(socket_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, address = %socket_addr, "failed to bind metrics server");
            std::process::exit(1);
        }
    };

    let namespace = config.namespace.clone();
    let loop_shutdown = shutdown.clone();
    let serve_shutdown = shutdown.clone();

    tokio::select! {
        () = async move { loop_manager.run(&namespace, loop_shutdown).await } => {
            info!("scale loop manager exited");
        }
        result = axum::serve(listener, app).with_graceful_shutdown(async move {
            serve_shutdown.cancelled().await;
        }) => {
            if let Err(err) = result {
                error!(error = %err, "metrics server error");
                std::process::exit(1);
            }
        }
    }

    info!("reflex-controller stopped");
}
