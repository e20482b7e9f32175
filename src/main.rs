use std::sync::Arc;

use anyhow::Result;
use chrono::Duration;
use rumqttc::{AsyncClient, MqttOptions};
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use motor_monitor::{
    api,
    config::Config,
    db,
    ingest::{self, messages::TopicMap, router::IngestionRouter},
    repo::{postgres::PgRepository, Repository},
    state::AppState,
    ws::Broadcaster,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env (ignore error if file absent — env vars may be set externally)
    let _ = dotenvy::dotenv();

    // Initialise tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    // Load config
    let config = Config::from_env()?;

    // Connect to DB and run migrations
    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    info!("Database ready");

    let repo: Arc<dyn Repository> = Arc::new(PgRepository::new(pool));
    let broadcaster = Broadcaster::new();

    // Spawn the MQTT ingestion pipeline
    {
        let topic_map = TopicMap::new(&config.topics);
        let topics = topic_map.topics();
        let router = IngestionRouter::new(
            repo.clone(),
            broadcaster.clone(),
            topic_map,
            config.deviation_threshold_percent,
            config.prediction_error_threshold,
            Duration::seconds(config.freshness_threshold_secs as i64),
        );

        let mut options = MqttOptions::new(
            config.mqtt_client_id.clone(),
            config.mqtt_host.clone(),
            config.mqtt_port,
        );
        options.set_keep_alive(std::time::Duration::from_secs(30));
        let (client, eventloop) = AsyncClient::new(options, 64);

        info!(
            host = %config.mqtt_host,
            port = config.mqtt_port,
            topics = topics.len(),
            "MQTT ingestion starting"
        );
        tokio::spawn(ingest::run(client, eventloop, topics, router));
    }

    // Start HTTP server (REST + WebSocket)
    let state = AppState { repo, broadcaster };
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
