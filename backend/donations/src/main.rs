//! Charity donation backend — entry point.
//!
//! Wires the SQLite-backed donation store, the outbound mail and payment
//! gateway clients, and the Axum REST API consumed by the public site and
//! the admin console.

mod api;
mod config;
mod db;
mod errors;
mod mailer;
mod models;
mod payments;
mod workflow;

use std::sync::Arc;

use axum::routing::{get, patch, post};
use axum::Router;
use reqwest::Client;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use mailer::Mailer;
use payments::PaymentClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    // Load config from environment.
    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url).await?;

    // HTTP client shared by the mail and payment gateway clients.
    let client = Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;

    let state = Arc::new(api::AppState {
        pool,
        mailer: Mailer::new(client.clone(), config.mail.clone()),
        payments: PaymentClient::new(client, config.payment.clone()),
        operator_email: config.operator_email.clone(),
    });

    let app = Router::new()
        .route("/health", get(api::health))
        .route(
            "/donations",
            post(api::create_donation)
                .get(api::list_donations)
                .delete(api::clear_donations),
        )
        .route("/donations/:reference", get(api::get_donation))
        .route("/donations/:reference/approve", post(api::approve_donation))
        .route("/donations/:reference/reject", post(api::reject_donation))
        .route(
            "/donations/:reference/verification",
            patch(api::set_verification),
        )
        .route("/categories", get(api::get_categories))
        .route("/cycle/status", get(api::cycle_status))
        .route("/cycle/reset", post(api::reset_cycle))
        .route("/payments/order", post(api::create_payment_order))
        .route("/payments/verify", post(api::verify_payment))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
