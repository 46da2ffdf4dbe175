//! # Server Configuration
//!
//! This module contains the server setup and wiring for the alerting API.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::approvers::ApproverRegistry;
use crate::config::AppConfig;
use crate::handlers;
use crate::notifications::{
    ContactDirectory, DisabledWeatherProvider, DispatchCollaborators, KmaWeatherProvider,
    LayoutDirectory, LogOnlyTransport, MessageComposer, NotificationDispatcher,
    SheetsContactDirectory, SiteScoringRecommender, SmsTransport, SolapiTransport,
    StaticContactDirectory, WeatherProvider,
};
use crate::repositories::{InMemoryIncidentRepository, IncidentRepository};
use crate::seeds::seed_demo_incidents;
use crate::services::IncidentService;
use crate::telemetry::trace_context_middleware;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub service: Arc<IncidentService>,
    pub approvers: Arc<ApproverRegistry>,
}

/// Fully wired application: router state plus the dispatcher whose
/// background follow-ups must be drained on shutdown.
pub struct Application {
    pub state: AppState,
    pub dispatcher: Arc<NotificationDispatcher>,
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route(
            "/incidents",
            get(handlers::incidents::list_incidents).post(handlers::incidents::report_incident),
        )
        .route(
            "/incidents/{id}",
            get(handlers::incidents::get_incident).delete(handlers::incidents::delete_incident),
        )
        .route(
            "/incidents/{id}/approve",
            post(handlers::incidents::approve_incident),
        )
        .route(
            "/incidents/{id}/complete-action",
            post(handlers::incidents::complete_action),
        )
        .route(
            "/incidents/{id}/end-training",
            post(handlers::incidents::end_training),
        )
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(trace_context_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            },
        ))
}

fn build_collaborators(config: &AppConfig) -> anyhow::Result<DispatchCollaborators> {
    let timeout = config.dispatch.upstream_timeout();

    let transport: Arc<dyn SmsTransport> = if config.sms.is_configured() {
        Arc::new(SolapiTransport::new(&config.sms, timeout)?)
    } else {
        warn!("SOLAPI credentials missing; alerts will only be logged");
        Arc::new(LogOnlyTransport)
    };

    let contacts: Arc<dyn ContactDirectory> = if config.contacts.sheets_api_key.is_some()
        && config.contacts.employee_spreadsheet_id.is_some()
    {
        Arc::new(SheetsContactDirectory::new(&config.contacts, timeout)?)
    } else {
        warn!("Contact sheet not configured; alerts go to the fallback contacts");
        Arc::new(StaticContactDirectory::default())
    };

    let weather: Arc<dyn WeatherProvider> = if config.weather.kma_api_key.is_some() {
        Arc::new(KmaWeatherProvider::new(&config.weather, timeout)?)
    } else {
        warn!("KMA API key missing; alerts are sent without weather");
        Arc::new(DisabledWeatherProvider)
    };

    Ok(DispatchCollaborators {
        contacts,
        weather,
        recommender: Arc::new(SiteScoringRecommender),
        transport,
    })
}

/// Builds the application from configuration. The `local` profile starts
/// with demo incidents.
pub async fn build_application(config: AppConfig) -> anyhow::Result<Application> {
    let composer = MessageComposer::new(
        config.org_name.clone(),
        config.emergency_room_phone.clone(),
        LayoutDirectory::new(&config.location_layout_urls),
    );
    let dispatcher = Arc::new(NotificationDispatcher::new(
        build_collaborators(&config)?,
        composer,
        &config.dispatch,
    ));

    let repository: Arc<dyn IncidentRepository> = Arc::new(InMemoryIncidentRepository::new());
    if config.profile == "local" {
        seed_demo_incidents(repository.as_ref())
            .await
            .context("failed to seed demo incidents")?;
    }

    let service = Arc::new(IncidentService::new(repository, dispatcher.clone()));
    let approvers = Arc::new(ApproverRegistry::new(config.approvers.clone()));

    Ok(Application {
        state: AppState {
            config: Arc::new(config),
            service,
            approvers,
        },
        dispatcher,
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

/// Starts the server with the given configuration
pub async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    let addr = config
        .bind_addr()
        .with_context(|| format!("invalid server address: {}", config.api_bind_addr))?;
    let profile = config.profile.clone();

    let Application { state, dispatcher } = build_application(config).await?;
    let service = state.service.clone();
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, %profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Waiting for in-flight approvals and scheduled follow-up messages");
    service.shutdown().await;
    dispatcher.shutdown().await;
    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::incidents::list_incidents,
        crate::handlers::incidents::report_incident,
        crate::handlers::incidents::get_incident,
        crate::handlers::incidents::delete_incident,
        crate::handlers::incidents::approve_incident,
        crate::handlers::incidents::complete_action,
        crate::handlers::incidents::end_training,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::models::Incident,
            crate::models::CreateIncidentRequest,
            crate::models::ApprovalEdits,
            crate::models::AlarmCriteria,
            crate::models::AlertLevel,
            crate::models::IncidentStatus,
            crate::handlers::incidents::IncidentResponse,
            crate::handlers::incidents::IncidentListResponse,
            crate::handlers::incidents::ApproveIncidentRequest,
            crate::handlers::incidents::ModifiedIncident,
            crate::handlers::incidents::ApproveIncidentResponse,
            crate::handlers::incidents::DeleteIncidentRequest,
            crate::handlers::incidents::DeleteIncidentResponse,
            crate::handlers::incidents::CompleteActionRequest,
            crate::handlers::incidents::EndTrainingRequest,
            crate::error::ApiError,
        )
    ),
    tags(
        (name = "root", description = "Service information"),
        (name = "incidents", description = "Incident lifecycle and alert dispatch")
    ),
    info(
        title = "Emergency Alerting API",
        description = "Incident reporting, approval and SMS alert dispatch",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
