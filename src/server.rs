use crate::{
    listener::{DowngradingListener, Listener},
    metrics::{IDENTITY_EXPIRY_DAYS, encode_metrics},
    tls::{CertificateMetadata, MinVersion, TlsPolicy, ensure_crypto_provider, ensure_identity},
};
use anyhow::Context;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::{net::IpAddr, path::PathBuf, sync::Arc, time::Duration};
use tokio::{net::TcpListener, task};
use tracing::{error, info};

/// Everything `serve` needs, as parsed from the command line
#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub listen: Option<IpAddr>,
    pub port: u16,
    pub cert: PathBuf,
    pub key: PathBuf,
    pub common_name: String,
    pub lifetime_days: u32,
    pub renew_within_days: u32,
    pub min_version: MinVersion,
    pub sniff_timeout: Duration,
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct Health {
    status: String,
    time: String,
    version: String,
    common_name: String,
    expiry_days: i64,
    not_after: String,
}

#[derive(Debug)]
struct AppState {
    common_name: String,
    metadata: CertificateMetadata,
}

/// Start the node: load or issue its identity and serve HTTP and HTTPS on one port
///
/// # Errors
///
/// Returns an error if the identity cannot be issued or loaded, the TLS
/// configuration is rejected, or the port cannot be bound
pub async fn start(options: ServeOptions) -> anyhow::Result<()> {
    ensure_crypto_provider();

    let identity = {
        let cert = options.cert.clone();
        let key = options.key.clone();
        let common_name = options.common_name.clone();
        let (lifetime, renew) = (options.lifetime_days, options.renew_within_days);
        task::spawn_blocking(move || ensure_identity(&cert, &key, &common_name, lifetime, renew))
            .await
            .context("identity task failed")??
    };

    let metadata = identity.metadata()?;
    IDENTITY_EXPIRY_DAYS.set(metadata.expiry_days());
    info!(
        common_name = %options.common_name,
        not_after = %metadata.not_after,
        serial = %metadata.serial,
        "node identity ready"
    );

    let policy = TlsPolicy::for_min_version(options.min_version);
    let config = policy
        .server_config(&identity)
        .context("failed to build TLS server configuration")?;

    let (tcp, bind_addr) = bind(options.listen, options.port).await?;
    let listener =
        DowngradingListener::new(tcp, Arc::new(config)).with_sniff_timeout(options.sniff_timeout);

    info!(
        "Listening on {bind_addr}, min TLS version: {:?}, sniff timeout: {}ms",
        options.min_version,
        options.sniff_timeout.as_millis()
    );

    let state = Arc::new(AppState {
        common_name: options.common_name,
        metadata,
    });

    serve(listener, state).await
}

async fn serve<L>(listener: DowngradingListener<L>, state: Arc<AppState>) -> anyhow::Result<()>
where
    L: Listener,
{
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("failed to listen for shutdown signal: {e}");
            }
            info!("shutting down");
        })
        .await?;

    Ok(())
}

/// Bind to `listen:port`, or to `[::]:port` falling back to `0.0.0.0:port`
async fn bind(listen: Option<IpAddr>, port: u16) -> anyhow::Result<(TcpListener, String)> {
    if let Some(addr) = listen {
        let socket_addr = format!("{addr}:{port}");
        let listener = TcpListener::bind(&socket_addr)
            .await
            .with_context(|| format!("failed to bind {socket_addr}"))?;
        return Ok((listener, socket_addr));
    }

    if let Ok(listener) = TcpListener::bind(format!("::0:{port}")).await {
        return Ok((listener, format!("[::]:{port}")));
    }

    let socket_addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&socket_addr)
        .await
        .with_context(|| format!("failed to bind {socket_addr}"))?;
    Ok((listener, socket_addr))
}

async fn metrics_handler() -> impl IntoResponse {
    match encode_metrics() {
        Ok(buffer) => (StatusCode::OK, buffer),
        Err(e) => {
            error!("{e}");
            (StatusCode::INTERNAL_SERVER_ERROR, Vec::new())
        }
    }
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let expiry_days = state.metadata.expiry_days();
    IDENTITY_EXPIRY_DAYS.set(expiry_days);

    let (code, status) = if expiry_days < 0 {
        (StatusCode::SERVICE_UNAVAILABLE, "expired")
    } else {
        (StatusCode::OK, "ok")
    };

    let health = Health {
        status: status.to_string(),
        time: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        version: env!("CARGO_PKG_VERSION").to_string(),
        common_name: state.common_name.clone(),
        expiry_days,
        not_after: state
            .metadata
            .not_after
            .to_rfc3339_opts(SecondsFormat::Secs, true),
    };

    (code, Json(health))
}
