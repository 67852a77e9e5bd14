//! HTTP boundary: router, middleware stack, and server startup.

use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::{MatchedPath, Request},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE, ORIGIN},
        HeaderName, HeaderValue, Method, StatusCode,
    },
    middleware::{self, Next},
    routing::{get, post},
    Extension, Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, warn, Span};
use ulid::Ulid;
use url::Url;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod email;
pub mod handlers;
mod openapi;

use handlers::auth::{self, AuthConfig, AuthState};
use handlers::health;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

/// Build the application router with the full middleware stack.
///
/// # Errors
/// Returns an error when the configured base origin cannot be parsed.
pub fn app(auth_state: Arc<AuthState>) -> Result<Router> {
    let allowed_origin = frontend_origin(auth_state.config().base_origin())?;

    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(AllowOrigin::exact(allowed_origin.clone()))
        .allow_credentials(true);

    // Browsers always attach Origin to cross-site and POST requests; anything
    // claiming a different origin is rejected outright. Requests without the
    // header (same-origin GETs, curl) pass through.
    let origin_guard = middleware::from_fn(move |request: Request, next: Next| {
        let allowed = allowed_origin.clone();
        async move {
            if let Some(origin) = request.headers().get(ORIGIN) {
                if origin != &allowed {
                    warn!(origin = ?origin, "request from unexpected origin rejected");
                    return handlers::auth::error_response(
                        StatusCode::FORBIDDEN,
                        "origin_not_allowed",
                    );
                }
            }
            next.run(request).await
        }
    });

    let auth_routes = Router::new()
        .route("/signup", post(auth::signup::signup))
        .route("/signin", post(auth::signin::signin))
        .route("/signout", post(auth::session::signout))
        .route("/session", get(auth::session::session))
        .route("/verify-email", post(auth::verification::verify_email))
        .route(
            "/request-password-reset",
            post(auth::verification::request_password_reset),
        )
        .route("/reset-password", post(auth::verification::reset_password))
        .layer(origin_guard);

    let router = Router::new()
        .route("/health", get(health::health))
        .nest(auth_state.config().auth_base_path(), auth_routes)
        .merge(
            SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()),
        )
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(auth_state)),
        );

    Ok(router)
}

/// Connect the configured store backend and run the server until shutdown.
///
/// A `memory:` DSN runs entirely in-process, which is enough for local dev
/// against a frontend; anything else is treated as a Postgres DSN.
///
/// # Errors
/// Returns an error if the store is unreachable or the listener cannot bind.
pub async fn new(port: u16, dsn: String, auth_config: AuthConfig) -> Result<()> {
    let auth_state = if dsn.starts_with("memory:") {
        info!("Using in-memory stores");
        AuthState::new(
            auth_config,
            crate::store::memory::MemoryUserStore::new(),
            crate::store::memory::MemorySessionStore::new(),
            crate::store::memory::MemoryEmailTokenStore::new(),
            Arc::new(email::LogEmailHooks),
        )?
    } else {
        let pool = crate::store::postgres::connect(&dsn).await?;
        AuthState::new(
            auth_config,
            Arc::new(crate::store::postgres::PgUserStore::new(pool.clone())),
            Arc::new(crate::store::postgres::PgSessionStore::new(pool.clone())),
            Arc::new(crate::store::postgres::PgEmailTokenStore::new(pool)),
            Arc::new(email::LogEmailHooks),
        )?
    };

    serve(port, Arc::new(auth_state)).await
}

async fn serve(port: u16, auth_state: Arc<AuthState>) -> Result<()> {
    let app = app(auth_state)?;

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

/// Reduce the configured base URL to a bare origin header value.
fn frontend_origin(base_origin: &str) -> Result<HeaderValue> {
    let parsed =
        Url::parse(base_origin).with_context(|| format!("Invalid base origin: {base_origin}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("Base origin must include a valid host: {base_origin}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build origin header")
}
