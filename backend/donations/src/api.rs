//! Axum REST API handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::db;
use crate::errors::{AppError, Result};
use crate::mailer::Mailer;
use crate::models::{Donation, DonationStatus, NewDonation};
use crate::payments::PaymentClient;
use crate::workflow::{self, CategoryProgress, CycleStatus, ResetOutcome};

pub struct AppState {
    pub pool: SqlitePool,
    pub mailer: Mailer,
    pub payments: PaymentClient,
    pub operator_email: Option<String>,
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct DonationCreatedResponse {
    pub reference: String,
    pub status: DonationStatus,
}

#[derive(Serialize)]
pub struct DonationsResponse {
    pub count: usize,
    pub donations: Vec<Donation>,
}

#[derive(Serialize)]
pub struct ApproveResponse {
    pub ok: bool,
    pub reference: String,
    pub already_approved: bool,
    pub skipped_items: Vec<String>,
}

#[derive(Serialize)]
pub struct RejectResponse {
    pub ok: bool,
    pub reference: String,
}

#[derive(Serialize)]
pub struct VerificationResponse {
    pub ok: bool,
    pub reference: String,
}

#[derive(Serialize)]
pub struct ClearResponse {
    pub deleted: u64,
}

#[derive(Serialize)]
pub struct CategoriesResponse {
    pub count: usize,
    pub categories: Vec<CategoryProgress>,
}

#[derive(Serialize)]
pub struct OrderCreatedResponse {
    pub order_id: String,
    pub amount: i64,
    pub currency: String,
}

#[derive(Serialize)]
pub struct PaymentVerifiedResponse {
    pub valid: bool,
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct VerificationRequest {
    pub bank_verified: bool,
    #[serde(default)]
    pub bank_note: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    /// Amount in major currency units; converted to minor units for the gateway.
    pub amount: f64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub receipt: Option<String>,
}

#[derive(Deserialize)]
pub struct VerifyPaymentRequest {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
}

// ─────────────────────────────────────────────────────────
// Handlers — donations
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `POST /donations`
pub async fn create_donation(
    State(state): State<Arc<AppState>>,
    Json(new): Json<NewDonation>,
) -> Result<impl IntoResponse> {
    let donation = workflow::create_donation(
        &state.pool,
        &state.mailer,
        state.operator_email.as_deref(),
        new,
    )
    .await?;
    Ok((
        StatusCode::CREATED,
        Json(DonationCreatedResponse {
            reference: donation.reference,
            status: donation.status,
        }),
    ))
}

/// `GET /donations?status=pending`
pub async fn list_donations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<DonationsResponse>> {
    let status = query
        .status
        .as_deref()
        .map(|s| {
            DonationStatus::parse(s)
                .ok_or_else(|| AppError::Validation(format!("unknown status '{s}'")))
        })
        .transpose()?;
    let donations = db::list_donations(&state.pool, status).await?;
    Ok(Json(DonationsResponse {
        count: donations.len(),
        donations,
    }))
}

/// `GET /donations/:reference`
pub async fn get_donation(
    State(state): State<Arc<AppState>>,
    Path(reference): Path<String>,
) -> Result<Json<Donation>> {
    let donation = db::get_donation(&state.pool, &reference)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no donation with reference '{reference}'")))?;
    Ok(Json(donation))
}

/// `POST /donations/:reference/approve`
pub async fn approve_donation(
    State(state): State<Arc<AppState>>,
    Path(reference): Path<String>,
) -> Result<Json<ApproveResponse>> {
    let outcome = workflow::approve_donation(&state.pool, &state.mailer, &reference).await?;
    Ok(Json(ApproveResponse {
        ok: true,
        reference: outcome.donation.reference,
        already_approved: outcome.already_approved,
        skipped_items: outcome.skipped_items,
    }))
}

/// `POST /donations/:reference/reject`
pub async fn reject_donation(
    State(state): State<Arc<AppState>>,
    Path(reference): Path<String>,
) -> Result<Json<RejectResponse>> {
    let donation = workflow::reject_donation(&state.pool, &state.mailer, &reference).await?;
    Ok(Json(RejectResponse {
        ok: true,
        reference: donation.reference,
    }))
}

/// `PATCH /donations/:reference/verification`
///
/// Operator bank-verification annotation; independent of the status
/// transitions.
pub async fn set_verification(
    State(state): State<Arc<AppState>>,
    Path(reference): Path<String>,
    Json(request): Json<VerificationRequest>,
) -> Result<Json<VerificationResponse>> {
    let found = db::set_bank_verification(
        &state.pool,
        &reference,
        request.bank_verified,
        request.bank_note.as_deref(),
    )
    .await?;
    if !found {
        return Err(AppError::NotFound(format!(
            "no donation with reference '{reference}'"
        )));
    }
    Ok(Json(VerificationResponse {
        ok: true,
        reference,
    }))
}

/// `DELETE /donations`
///
/// Administrative escape hatch: clears every donation record.
pub async fn clear_donations(State(state): State<Arc<AppState>>) -> Result<Json<ClearResponse>> {
    let deleted = db::clear_donations(&state.pool).await?;
    Ok(Json(ClearResponse { deleted }))
}

// ─────────────────────────────────────────────────────────
// Handlers — ledger & cycle
// ─────────────────────────────────────────────────────────

/// `GET /categories`
pub async fn get_categories(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CategoriesResponse>> {
    let categories: Vec<CategoryProgress> = db::active_categories(&state.pool)
        .await?
        .into_iter()
        .map(|category| CategoryProgress {
            progress_percentage: category.progress_percentage(),
            target_reached: category.target_reached(),
            category,
        })
        .collect();
    Ok(Json(CategoriesResponse {
        count: categories.len(),
        categories,
    }))
}

/// `GET /cycle/status`
pub async fn cycle_status(State(state): State<Arc<AppState>>) -> Result<Json<CycleStatus>> {
    Ok(Json(workflow::cycle_status(&state.pool).await?))
}

/// `POST /cycle/reset`
pub async fn reset_cycle(State(state): State<Arc<AppState>>) -> Result<Json<ResetOutcome>> {
    Ok(Json(workflow::reset_cycle(&state.pool).await?))
}

// ─────────────────────────────────────────────────────────
// Handlers — payment gateway
// ─────────────────────────────────────────────────────────

/// `POST /payments/order`
pub async fn create_payment_order(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<Json<OrderCreatedResponse>> {
    if request.amount <= 0.0 {
        return Err(AppError::Validation("amount must be positive".to_string()));
    }
    let amount = (request.amount * 100.0).round() as i64;
    let currency = request.currency.as_deref().unwrap_or("INR");
    let order_id = state
        .payments
        .create_order(amount, currency, request.receipt.as_deref())
        .await?;
    Ok(Json(OrderCreatedResponse {
        order_id,
        amount,
        currency: currency.to_string(),
    }))
}

/// `POST /payments/verify`
pub async fn verify_payment(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<Json<PaymentVerifiedResponse>> {
    let valid = state
        .payments
        .verify_payment(&request.order_id, &request.payment_id, &request.signature)
        .await?;
    Ok(Json(PaymentVerifiedResponse { valid }))
}
