use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use route_planner::api;
use route_planner::config::{Config, GeocoderBackend};
use route_planner::error::AppError;
use route_planner::services::email::{EmailSender, HttpEmailSender, LogEmailSender};
use route_planner::services::geocoding::{Geocoder, GoogleGeocoder, MockGeocoder};
use route_planner::services::persistence::{InMemoryRepository, Repository, RestRepository};
use route_planner::services::vrp::RoutificClient;
use route_planner::state::{AppState, PlannerSettings, Services};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let services = build_services(&config)?;
    let app_state = AppState::new(
        services,
        PlannerSettings::from_config(&config),
        config.depot.clone(),
        config.event_buffer_size,
    );
    let shared_state = Arc::new(app_state);

    if let Err(err) = shared_state.bootstrap().await {
        tracing::error!(error = %err, "failed to load drivers and deliveries; starting empty");
    }

    let app = api::rest::router(shared_state.clone());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shared_state))
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

fn build_services(config: &Config) -> Result<Services, AppError> {
    let repository: Arc<dyn Repository> = match &config.persistence_url {
        Some(url) => {
            tracing::info!(url = %url, "using rest persistence");
            Arc::new(RestRepository::new(url.clone(), config.http_timeout)?)
        }
        None => {
            tracing::warn!("PERSISTENCE_URL not set; data lives in memory only");
            Arc::new(InMemoryRepository::new())
        }
    };

    let geocoder: Arc<dyn Geocoder> = match config.geocoder.backend {
        GeocoderBackend::Mock => Arc::new(MockGeocoder::new(config.depot.clone())),
        GeocoderBackend::Google => {
            let key = config.geocoder.google_api_key.clone().ok_or_else(|| {
                AppError::Internal("GOOGLE_MAPS_API_KEY is required for the google geocoder".to_string())
            })?;
            Arc::new(GoogleGeocoder::new(key, config.geocoder.timeout)?)
        }
    };
    tracing::info!(geocoder = geocoder.name(), "geocoder ready");

    if config.vrp.api_key.is_none() {
        tracing::warn!("ROUTIFIC_API_KEY not set; optimization requests will fail");
    }
    let vrp = Arc::new(RoutificClient::new(
        config.vrp.base_url.clone(),
        config.vrp.api_key.clone(),
        config.vrp.request_timeout,
    )?);

    let email: Arc<dyn EmailSender> = match (&config.email.api_url, &config.email.api_key) {
        (Some(url), Some(key)) => Arc::new(HttpEmailSender::new(
            url.clone(),
            key.clone(),
            config.email.from.clone(),
            config.http_timeout,
        )?),
        _ => Arc::new(LogEmailSender),
    };

    Ok(Services {
        repository,
        geocoder,
        vrp,
        email,
    })
}

async fn shutdown_signal(state: Arc<AppState>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
    state.cancel_active_run().await;
}
