// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use balance_reloader::api::router;
use balance_reloader::automation::WebDriverConnector;
use balance_reloader::batch::BatchRunner;
use balance_reloader::config::{Config, ALIAS_CACHE_CAPACITY};
use balance_reloader::secrets::SecretStore;
use balance_reloader::session::{AccessSession, ComputeSession, MockSession, SessionProvider};
use balance_reloader::state::AppState;
use balance_reloader::storage::{AliasCache, Database};
use balance_reloader::telemetry::init_tracing;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    init_tracing(config.log_format);

    let database = Arc::new(
        Database::open(&config.database_path()).expect("Failed to open database"),
    );
    let secrets = SecretStore::new(
        database.clone(),
        Arc::new(AliasCache::new(ALIAS_CACHE_CAPACITY)),
    );

    // Managed hosting reaches the WebDriver instance through the firewall;
    // anywhere else a locally reachable hub is assumed.
    let session = if config.managed_infrastructure {
        SessionProvider::Compute(
            ComputeSession::new(config.compute_config()).expect("Failed to create HTTP client"),
        )
    } else {
        SessionProvider::Mock(MockSession::new(config.mock_remote_address.clone()))
    };
    info!(
        remote_session = session.is_remote(),
        target_tag = %config.remote_network_tag,
        headless = config.webdriver_headless,
        "Access session configured"
    );

    let runner = BatchRunner::new(
        secrets,
        database.clone(),
        Arc::new(session),
        WebDriverConnector::new(config.webdriver_headless),
        config.remote_network_tag.clone(),
        config.managed_infrastructure,
    );
    let app = router(AppState::new(runner, database));

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .expect("Failed to bind server address");
    info!(%address, "Balance reloader listening (docs at /docs)");

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                trigger.cancel();
            }
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }
    });

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
    {
        error!(error = %e, "Server failed");
    }
}
