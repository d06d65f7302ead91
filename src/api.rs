mod v0;

use crate::domain::AccountRepository;
use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use opentelemetry::{global, propagation::Extractor, trace::TraceContextExt};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use thiserror::Error;
use tokio::{
    net::TcpListener,
    signal::unix::{signal, SignalKind},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, field, info, info_span, warn, Span};
use tracing_opentelemetry::OpenTelemetrySpanExt;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    addr: IpAddr,
    port: u16,
}

#[derive(Debug, OpenApi)]
#[openapi(components(schemas(ErrorResponse)))]
pub struct ApiDoc;

/// Serve the API until SIGTERM or Ctrl-C is received.
pub async fn serve<R>(config: Config, account_repository: R) -> Result<()>
where
    R: AccountRepository,
{
    let Config { addr, port } = config;

    let listener = TcpListener::bind((addr, port))
        .await
        .context("bind TcpListener")?;
    info!(%addr, port, "listening");

    axum::serve(listener, app(account_repository).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("run server")
}

fn app<R>(account_repository: R) -> Router
where
    R: AccountRepository,
{
    let app_state = AppState { account_repository };

    let mut api_doc = ApiDoc::openapi();
    api_doc.merge(v0::ApiDoc::openapi());

    Router::new()
        .route("/", get(ready))
        .nest("/v0", v0::app())
        .with_state(app_state)
        .merge(SwaggerUi::new("/api-doc").url("/openapi.json", api_doc))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(CorsLayer::permissive())
                .map_request(accept_trace)
                .map_request(record_trace_id),
        )
}

#[derive(Clone)]
struct AppState<R> {
    account_repository: R,
}

/// Errors of API handlers, rendered as JSON [ErrorResponse]s.
#[derive(Debug, Error)]
enum Error {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    UnprocessableEntity(String),

    #[error("internal error")]
    Internal,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    error: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match self {
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::UnprocessableEntity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let response = ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(response)).into_response()
    }
}

async fn ready() -> StatusCode {
    StatusCode::OK
}

async fn shutdown_signal() {
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(error) => {
                error!(%error, "cannot install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = terminate => {}
        _ = tokio::signal::ctrl_c() => {}
    }
    info!("shutting down");
}

fn make_span(request: &Request<Body>) -> Span {
    let headers = request.headers();
    let method = request.method().as_str();
    let path = request.uri().path();
    info_span!("incoming request", method, path, ?headers, trace_id = field::Empty)
}

struct HeaderExtractor<'a>(&'a HeaderMap);

impl<'a> Extractor for HeaderExtractor<'a> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| {
            value
                .to_str()
                .inspect_err(|error| warn!(%error, ?value, "cannot convert header value to ASCII"))
                .ok()
        })
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|key| key.as_str()).collect()
    }
}

/// Continue a trace propagated via W3C trace context headers, if any.
fn accept_trace(request: Request<Body>) -> Request<Body> {
    let parent_context = global::get_text_map_propagator(|propagator| {
        propagator.extract(&HeaderExtractor(request.headers()))
    });
    Span::current().set_parent(parent_context);

    request
}

fn record_trace_id(request: Request<Body>) -> Request<Body> {
    let span = Span::current();

    let trace_id = span.context().span().span_context().trace_id();
    span.record("trace_id", trace_id.to_string());

    request
}
