use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use http::header::HeaderName;
use tokio::signal;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info};

use opsline_api as api;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config().context("failed to load configuration")?;
    api::config::init_tracing(&cfg.log_level, cfg.log_json);

    let db = Arc::new(
        api::db::establish_connection(&cfg)
            .await
            .context("failed to connect to database")?,
    );

    if cfg.auto_migrate {
        api::migrate::run_migrations(&db).await.map_err(|e| {
            error!("failed running schema revisions: {}", e);
            anyhow::anyhow!(e)
        })?;
    }

    // Process-wide resources: the object store backing and the event channel.
    let outbound = reqwest::Client::new();
    let store = api::object_store::build_object_store(&cfg.object_store, outbound)
        .map_err(|e| anyhow::anyhow!("failed to build object store: {e}"))?;

    let (event_sender, event_rx) = api::events::channel();
    tokio::spawn(api::events::process_events(event_rx));

    let fulfillment = api::services::fulfillment::FulfillmentService::new(
        db.clone(),
        store.clone(),
        Some(event_sender.clone()),
        cfg.object_store.max_document_bytes,
        cfg.upload_deadline(),
    );
    let directory = api::services::directory::DirectoryService::new(db.clone());
    let scopes = api::scope::ScopeFactory::new(db.clone(), store);

    let state = api::AppState {
        db,
        config: cfg.clone(),
        event_sender,
        fulfillment,
        directory,
        scopes,
    };

    let request_id_header = HeaderName::from_static("x-request-id");
    let app = api::app_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            cfg.request_deadline_secs,
        )))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid));

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;
    info!("opsline-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind listener")?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
