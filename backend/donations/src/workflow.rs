//! Donation lifecycle core — intake, the approval/rejection workflow, and
//! the funding-cycle reset.
//!
//! State machine: `pending --approve--> approved`, `pending --reject-->
//! rejected`. Approval is the only path that credits the category ledger;
//! rejection never touches it; the reset zeroes it once every active
//! category has met its target.

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use sqlx::SqlitePool;
use tracing::warn;

use crate::db;
use crate::errors::{AppError, Result};
use crate::mailer::Mailer;
use crate::models::{Category, CategoryRef, Donation, DonationStatus, LineItem, NewDonation};

// ─────────────────────────────────────────────────────────
// Operation results
// ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ApprovalOutcome {
    pub donation: Donation,
    pub already_approved: bool,
    /// Category references that resolved to nothing; the ledger was not
    /// credited for these items.
    pub skipped_items: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ResetOutcome {
    pub cycle_number: i64,
    pub total_donations_snapshot: f64,
    pub reset_category_count: usize,
}

#[derive(Debug, Serialize)]
pub struct CategoryProgress {
    #[serde(flatten)]
    pub category: Category,
    pub progress_percentage: u32,
    pub target_reached: bool,
}

#[derive(Debug, Serialize)]
pub struct CycleStatus {
    pub current_cycle: i64,
    pub total_resets: i64,
    pub last_reset_at: Option<i64>,
    pub all_targets_reached: bool,
    pub total_donations: f64,
    pub categories: Vec<CategoryProgress>,
}

// ─────────────────────────────────────────────────────────
// Intake
// ─────────────────────────────────────────────────────────

/// Validate and persist a new pending donation.
///
/// The ledger is not touched here; only an approval credits categories.
/// The operator notification is fire-and-forget.
pub async fn create_donation(
    pool: &SqlitePool,
    mailer: &Mailer,
    operator_email: Option<&str>,
    new: NewDonation,
) -> Result<Donation> {
    validate_intake(&new)?;

    let now = Utc::now();
    let donation = Donation {
        id: 0,
        reference: make_reference(now.timestamp_millis()),
        donor_name: new.donor_name,
        donor_email: new.donor_email,
        donor_phone: new.donor_phone,
        donor_social: new.donor_social,
        message: new.message,
        is_anonymous: new.is_anonymous,
        items: new.items,
        total_amount: new.total_amount,
        status: DonationStatus::Pending,
        approved_at: None,
        bank_verified: false,
        bank_note: None,
        created_at: now.timestamp(),
    };
    let id = db::insert_donation(pool, &donation).await?;
    let donation = Donation { id, ..donation };

    if let Some(operator) = operator_email {
        mailer.send_detached(
            operator.to_string(),
            "New donation received".to_string(),
            json!({
                "reference": donation.reference,
                "donor_name": donation.donor_name,
                "total_amount": donation.total_amount,
                "item_count": donation.items.len(),
            }),
        );
    }

    Ok(donation)
}

fn validate_intake(new: &NewDonation) -> Result<()> {
    if new.items.is_empty() {
        return Err(AppError::Validation(
            "at least one line item is required".to_string(),
        ));
    }
    if new.items.iter().any(|item| item.quantity < 1) {
        return Err(AppError::Validation(
            "line item quantities must be at least 1".to_string(),
        ));
    }
    if new.donor_name.trim().is_empty() {
        return Err(AppError::Validation("donor name is required".to_string()));
    }
    if !valid_email(&new.donor_email) {
        return Err(AppError::Validation(
            "a valid donor email is required".to_string(),
        ));
    }
    Ok(())
}

/// Basic shape check only: an `@` with a dot-containing domain segment.
fn valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    }
}

/// Time-based human-facing token. Uniqueness is enforced by the database
/// index, not by construction.
fn make_reference(millis: i64) -> String {
    format!("DON-{millis}")
}

// ─────────────────────────────────────────────────────────
// Approval / rejection
// ─────────────────────────────────────────────────────────

/// Approve a pending donation and credit the category ledger.
///
/// Re-approving an already approved donation returns success without
/// repeating any side effect. A line item whose category resolves to
/// nothing is skipped: logged, reported in `skipped_items`, and the rest
/// of the approval proceeds.
pub async fn approve_donation(
    pool: &SqlitePool,
    mailer: &Mailer,
    reference: &str,
) -> Result<ApprovalOutcome> {
    let donation = db::get_donation(pool, reference)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no donation with reference '{reference}'")))?;

    // Idempotency guard: a second approval must not re-credit the ledger.
    if donation.status == DonationStatus::Approved {
        return Ok(ApprovalOutcome {
            donation,
            already_approved: true,
            skipped_items: Vec::new(),
        });
    }

    let mut skipped_items = Vec::new();
    for item in &donation.items {
        match credit_category(pool, item).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(
                    "donation {reference}: category '{}' not found, item skipped",
                    item.category
                );
                skipped_items.push(item.category.clone());
            }
            Err(e) => {
                warn!(
                    "donation {reference}: crediting category '{}' failed: {e}",
                    item.category
                );
                skipped_items.push(item.category.clone());
            }
        }
    }

    let approved_at = Utc::now().timestamp();
    db::mark_approved(pool, reference, approved_at).await?;

    mailer.send_detached(
        donation.donor_email.clone(),
        "Your donation has been confirmed".to_string(),
        json!({
            "reference": donation.reference,
            "donor_name": donation.donor_name,
            "total_amount": donation.total_amount,
        }),
    );

    let donation = Donation {
        status: DonationStatus::Approved,
        approved_at: Some(approved_at),
        ..donation
    };
    Ok(ApprovalOutcome {
        donation,
        already_approved: false,
        skipped_items,
    })
}

/// Resolve the item's category reference — slug first, raw numeric id as a
/// fallback — and apply its atomic funding increment.
async fn credit_category(pool: &SqlitePool, item: &LineItem) -> Result<bool> {
    let by_slug = CategoryRef::Slug(item.category.clone());
    if db::increment_category(pool, &by_slug, item.quantity).await? {
        return Ok(true);
    }
    if let Ok(id) = item.category.parse::<i64>() {
        return db::increment_category(pool, &CategoryRef::Id(id), item.quantity).await;
    }
    Ok(false)
}

/// Reject a donation. The ledger is never mutated on this path.
pub async fn reject_donation(
    pool: &SqlitePool,
    mailer: &Mailer,
    reference: &str,
) -> Result<Donation> {
    let donation = db::get_donation(pool, reference)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no donation with reference '{reference}'")))?;

    db::mark_rejected(pool, reference).await?;

    mailer.send_detached(
        donation.donor_email.clone(),
        "Update on your donation".to_string(),
        json!({
            "reference": donation.reference,
            "donor_name": donation.donor_name,
        }),
    );

    Ok(Donation {
        status: DonationStatus::Rejected,
        ..donation
    })
}

// ─────────────────────────────────────────────────────────
// Cycle reset & dashboard
// ─────────────────────────────────────────────────────────

/// Zero the ledger and advance the funding cycle.
///
/// Callable only when every active category has met its target; otherwise
/// fails without mutating anything. One transaction spans
/// read-check-zero-bump so a reset cannot publish a half-zeroed ledger.
pub async fn reset_cycle(pool: &SqlitePool) -> Result<ResetOutcome> {
    let mut tx = pool.begin().await?;

    let categories = db::active_categories(&mut *tx).await?;
    if categories.is_empty() {
        return Err(AppError::NoActiveCategories);
    }
    if let Some(unmet) = categories.iter().find(|c| !c.target_reached()) {
        return Err(AppError::PreconditionFailed(format!(
            "category '{}' is at {}/{} units",
            unmet.slug, unmet.current_funded, unmet.target_goal
        )));
    }

    // Reporting-only snapshot of the finished cycle's takings.
    let total_donations_snapshot: f64 = categories
        .iter()
        .map(|c| c.current_funded as f64 * c.unit_price)
        .sum();

    db::zero_active_categories(&mut *tx).await?;
    let counter = db::advance_cycle(&mut tx, Utc::now().timestamp()).await?;
    tx.commit().await?;

    Ok(ResetOutcome {
        cycle_number: counter.current_cycle,
        total_donations_snapshot,
        reset_category_count: categories.len(),
    })
}

/// Dashboard read: cycle counter plus per-category progress.
pub async fn cycle_status(pool: &SqlitePool) -> Result<CycleStatus> {
    let categories = db::active_categories(pool).await?;
    let counter = db::cycle_counter(pool).await?;

    let all_targets_reached =
        !categories.is_empty() && categories.iter().all(Category::target_reached);
    let total_donations = categories
        .iter()
        .map(|c| c.current_funded as f64 * c.unit_price)
        .sum();

    let categories = categories
        .into_iter()
        .map(|category| CategoryProgress {
            progress_percentage: category.progress_percentage(),
            target_reached: category.target_reached(),
            category,
        })
        .collect();

    Ok(CycleStatus {
        current_cycle: counter.current_cycle,
        total_resets: counter.total_resets,
        last_reset_at: counter.last_reset_at,
        all_targets_reached,
        total_donations,
        categories,
    })
}

// ─────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────
