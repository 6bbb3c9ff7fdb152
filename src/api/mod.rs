// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::state::AppState;

pub mod health;
pub mod reload;
pub mod status;

pub fn router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/", get(status::index))
        .route("/reload", get(reload::reload))
        .route("/reloadAll", get(reload::reload_all))
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state);

    Router::new()
        .merge(routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        status::index,
        reload::reload,
        reload::reload_all,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            status::TransactionView,
            status::StatusResponse,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Status", description = "Cards on file and batch history"),
        (name = "Reload", description = "Balance reload batches"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
struct ApiDoc;
