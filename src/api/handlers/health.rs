use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};
use utoipa::ToSchema;

use super::auth::AuthState;
use crate::api::GIT_COMMIT_HASH;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    database: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses (
        (status = 200, description = "Store is reachable", body = [Health]),
        (status = 503, description = "Store is unreachable", body = [Health])
    ),
    tag = "health"
)]
pub async fn health(method: Method, auth_state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    let result = match auth_state.users().ping().await {
        Ok(()) => Ok(()),
        Err(err) => {
            error!("Failed to ping store: {err}");
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    };

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: if result.is_ok() {
            "ok".to_string()
        } else {
            "error".to_string()
        },
    };

    // HEAD requests share the route; skip the body for them.
    let body = if method == Method::GET {
        Json(&health).into_response()
    } else {
        Body::empty().into_response()
    };

    let short_hash = if health.commit.len() > 7 {
        &health.commit[0..7]
    } else {
        ""
    };

    let headers = format!("{}:{}:{}", health.name, health.version, short_hash)
        .parse::<HeaderValue>()
        .map(|x_app_header_value| {
            debug!("X-App header: {:?}", x_app_header_value);

            let mut headers = HeaderMap::new();

            headers.insert("X-App", x_app_header_value);

            headers
        })
        .map_err(|err| {
            error!("Failed to parse X-App header: {}", err);
        });

    let headers = headers.unwrap_or_else(|()| HeaderMap::new());

    if result.is_ok() {
        (StatusCode::OK, headers, body)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, headers, body)
    }
}
