//! Database layer — migrations, donation queries, the category ledger, and
//! the cycle-counter singleton.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{SqliteConnection, SqliteExecutor, SqlitePool};
use tracing::info;

use crate::errors::Result;
use crate::models::{Category, CategoryRef, CycleCounter, Donation, DonationRow, DonationStatus};

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    // Make sure the file is created if it doesn't exist yet.
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };

    let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

// ─────────────────────────────────────────────────────────
// Donation writes
// ─────────────────────────────────────────────────────────

/// Persist a new donation record. Returns the row id.
pub async fn insert_donation(pool: &SqlitePool, d: &Donation) -> Result<i64> {
    let items = serde_json::to_string(&d.items)?;
    let result = sqlx::query(
        r#"
        INSERT INTO donations
            (reference, donor_name, donor_email, donor_phone, donor_social,
             message, is_anonymous, items, total_amount, status, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
    )
    .bind(&d.reference)
    .bind(&d.donor_name)
    .bind(&d.donor_email)
    .bind(&d.donor_phone)
    .bind(&d.donor_social)
    .bind(&d.message)
    .bind(d.is_anonymous)
    .bind(&items)
    .bind(d.total_amount)
    .bind(d.status.as_str())
    .bind(d.created_at)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Transition a donation to `approved` and stamp `approved_at`.
pub async fn mark_approved(pool: &SqlitePool, reference: &str, approved_at: i64) -> Result<()> {
    sqlx::query("UPDATE donations SET status = 'approved', approved_at = ?1 WHERE reference = ?2")
        .bind(approved_at)
        .bind(reference)
        .execute(pool)
        .await?;
    Ok(())
}

/// Transition a donation to `rejected`. The ledger is never touched here.
pub async fn mark_rejected(pool: &SqlitePool, reference: &str) -> Result<()> {
    sqlx::query("UPDATE donations SET status = 'rejected' WHERE reference = ?1")
        .bind(reference)
        .execute(pool)
        .await?;
    Ok(())
}

/// Record the operator's bank verification annotation.
///
/// Independent of the status transitions; returns `false` when no donation
/// matches the reference.
pub async fn set_bank_verification(
    pool: &SqlitePool,
    reference: &str,
    verified: bool,
    note: Option<&str>,
) -> Result<bool> {
    let result =
        sqlx::query("UPDATE donations SET bank_verified = ?1, bank_note = ?2 WHERE reference = ?3")
            .bind(verified)
            .bind(note)
            .bind(reference)
            .execute(pool)
            .await?;
    Ok(result.rows_affected() > 0)
}

/// Administrative escape hatch: delete every donation record.
pub async fn clear_donations(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM donations").execute(pool).await?;
    Ok(result.rows_affected())
}

// ─────────────────────────────────────────────────────────
// Donation reads
// ─────────────────────────────────────────────────────────

/// Fetch a single donation by its human-facing reference.
pub async fn get_donation(pool: &SqlitePool, reference: &str) -> Result<Option<Donation>> {
    let row = sqlx::query_as::<_, DonationRow>(
        r#"
        SELECT id, reference, donor_name, donor_email, donor_phone, donor_social,
               message, is_anonymous, items, total_amount, status, approved_at,
               bank_verified, bank_note, created_at
        FROM   donations
        WHERE  reference = ?1
        "#,
    )
    .bind(reference)
    .fetch_optional(pool)
    .await?;
    row.map(DonationRow::decode).transpose()
}

/// Fetch all donations, newest first, optionally filtered by status.
pub async fn list_donations(
    pool: &SqlitePool,
    status: Option<DonationStatus>,
) -> Result<Vec<Donation>> {
    let rows = match status {
        Some(status) => {
            sqlx::query_as::<_, DonationRow>(
                r#"
                SELECT id, reference, donor_name, donor_email, donor_phone, donor_social,
                       message, is_anonymous, items, total_amount, status, approved_at,
                       bank_verified, bank_note, created_at
                FROM   donations
                WHERE  status = ?1
                ORDER  BY created_at DESC, id DESC
                "#,
            )
            .bind(status.as_str())
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, DonationRow>(
                r#"
                SELECT id, reference, donor_name, donor_email, donor_phone, donor_social,
                       message, is_anonymous, items, total_amount, status, approved_at,
                       bank_verified, bank_note, created_at
                FROM   donations
                ORDER  BY created_at DESC, id DESC
                "#,
            )
            .fetch_all(pool)
            .await?
        }
    };
    rows.into_iter().map(DonationRow::decode).collect()
}

// ─────────────────────────────────────────────────────────
// Category ledger
// ─────────────────────────────────────────────────────────

/// Fetch all active categories in display order.
pub async fn active_categories(ex: impl SqliteExecutor<'_>) -> Result<Vec<Category>> {
    let rows = sqlx::query_as::<_, Category>(
        r#"
        SELECT id, slug, name, unit_label, unit_price, target_goal,
               current_funded, donors, is_active, display_order
        FROM   categories
        WHERE  is_active = 1
        ORDER  BY display_order ASC, id ASC
        "#,
    )
    .fetch_all(ex)
    .await?;
    Ok(rows)
}

/// Apply one funding increment to a category: `current_funded += quantity`
/// and `donors += 1`, as a single atomic storage-level update.
///
/// Returns `false` when the key matches no category.
pub async fn increment_category(
    ex: impl SqliteExecutor<'_>,
    key: &CategoryRef,
    quantity: i64,
) -> Result<bool> {
    let result = match key {
        CategoryRef::Slug(slug) => {
            sqlx::query(
                "UPDATE categories
                 SET current_funded = current_funded + ?1, donors = donors + 1
                 WHERE slug = ?2",
            )
            .bind(quantity)
            .bind(slug)
            .execute(ex)
            .await?
        }
        CategoryRef::Id(id) => {
            sqlx::query(
                "UPDATE categories
                 SET current_funded = current_funded + ?1, donors = donors + 1
                 WHERE id = ?2",
            )
            .bind(quantity)
            .bind(id)
            .execute(ex)
            .await?
        }
    };
    Ok(result.rows_affected() > 0)
}

/// Zero `current_funded` and `donors` on every active category.
/// `target_goal` and `unit_price` are untouched.
pub async fn zero_active_categories(ex: impl SqliteExecutor<'_>) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE categories SET current_funded = 0, donors = 0 WHERE is_active = 1",
    )
    .execute(ex)
    .await?;
    Ok(result.rows_affected())
}

// ─────────────────────────────────────────────────────────
// Cycle counter (singleton row, id = 1)
// ─────────────────────────────────────────────────────────

const ENSURE_COUNTER: &str =
    "INSERT OR IGNORE INTO cycle_counter (id, current_cycle, total_resets) VALUES (1, 1, 0)";

const READ_COUNTER: &str =
    "SELECT current_cycle, total_resets, last_reset_at FROM cycle_counter WHERE id = 1";

/// Read the cycle counter, creating the singleton row on first access.
pub async fn cycle_counter(pool: &SqlitePool) -> Result<CycleCounter> {
    sqlx::query(ENSURE_COUNTER).execute(pool).await?;
    let counter = sqlx::query_as::<_, CycleCounter>(READ_COUNTER)
        .fetch_one(pool)
        .await?;
    Ok(counter)
}

/// Advance the cycle counter by one reset and stamp `last_reset_at`.
/// Takes a connection so callers can run it inside a transaction.
pub async fn advance_cycle(conn: &mut SqliteConnection, now: i64) -> Result<CycleCounter> {
    sqlx::query(ENSURE_COUNTER).execute(&mut *conn).await?;
    sqlx::query(
        "UPDATE cycle_counter
         SET current_cycle = current_cycle + 1, total_resets = total_resets + 1,
             last_reset_at = ?1
         WHERE id = 1",
    )
    .bind(now)
    .execute(&mut *conn)
    .await?;
    let counter = sqlx::query_as::<_, CycleCounter>(READ_COUNTER)
        .fetch_one(&mut *conn)
        .await?;
    Ok(counter)
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    async fn seed_category(pool: &SqlitePool, slug: &str, price: f64, goal: i64) -> i64 {
        let result = sqlx::query(
            "INSERT INTO categories (slug, name, unit_label, unit_price, target_goal)
             VALUES (?1, ?2, 'units', ?3, ?4)",
        )
        .bind(slug)
        .bind(slug)
        .bind(price)
        .bind(goal)
        .execute(pool)
        .await
        .unwrap();
        result.last_insert_rowid()
    }

    #[tokio::test]
    async fn cycle_counter_is_created_lazily() {
        let pool = test_pool().await;

        // No row exists until the first read.
        let rows: Option<(i64,)> = sqlx::query_as("SELECT id FROM cycle_counter")
            .fetch_optional(&pool)
            .await
            .unwrap();
        assert!(rows.is_none());

        let counter = cycle_counter(&pool).await.unwrap();
        assert_eq!(counter.current_cycle, 1);
        assert_eq!(counter.total_resets, 0);
        assert_eq!(counter.last_reset_at, None);

        // A second read sees the same row, not a fresh one.
        let counter = cycle_counter(&pool).await.unwrap();
        assert_eq!(counter.current_cycle, 1);
    }

    #[tokio::test]
    async fn advance_cycle_bumps_both_fields() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let counter = advance_cycle(&mut conn, 1_700_000_000).await.unwrap();
        assert_eq!(counter.current_cycle, 2);
        assert_eq!(counter.total_resets, 1);
        assert_eq!(counter.last_reset_at, Some(1_700_000_000));
        assert_eq!(counter.total_resets, counter.current_cycle - 1);
    }

    #[tokio::test]
    async fn increment_resolves_slug_and_id() {
        let pool = test_pool().await;
        let id = seed_category(&pool, "meals", 50.0, 10).await;

        let hit = increment_category(&pool, &CategoryRef::Slug("meals".to_string()), 3)
            .await
            .unwrap();
        assert!(hit);

        let hit = increment_category(&pool, &CategoryRef::Id(id), 2).await.unwrap();
        assert!(hit);

        let miss = increment_category(&pool, &CategoryRef::Slug("nope".to_string()), 1)
            .await
            .unwrap();
        assert!(!miss);

        let categories = active_categories(&pool).await.unwrap();
        assert_eq!(categories[0].current_funded, 5);
        assert_eq!(categories[0].donors, 2);
    }

    #[tokio::test]
    async fn zeroing_preserves_goal_and_price() {
        let pool = test_pool().await;
        seed_category(&pool, "books", 100.0, 4).await;
        increment_category(&pool, &CategoryRef::Slug("books".to_string()), 4)
            .await
            .unwrap();

        let zeroed = zero_active_categories(&pool).await.unwrap();
        assert_eq!(zeroed, 1);

        let categories = active_categories(&pool).await.unwrap();
        assert_eq!(categories[0].current_funded, 0);
        assert_eq!(categories[0].donors, 0);
        assert_eq!(categories[0].target_goal, 4);
        assert_eq!(categories[0].unit_price, 100.0);
    }

    #[tokio::test]
    async fn bank_verification_is_independent_of_status() {
        let pool = test_pool().await;
        sqlx::query(
            "INSERT INTO donations (reference, donor_name, donor_email, items,
                                    total_amount, created_at)
             VALUES ('DON-7', 'A', 'a@example.org', '[]', 0, 0)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let found = set_bank_verification(&pool, "DON-7", true, Some("UTR 4411"))
            .await
            .unwrap();
        assert!(found);

        let donation = get_donation(&pool, "DON-7").await.unwrap().unwrap();
        assert!(donation.bank_verified);
        assert_eq!(donation.bank_note.as_deref(), Some("UTR 4411"));
        assert_eq!(donation.status, DonationStatus::Pending);

        assert!(!set_bank_verification(&pool, "DON-0", true, None).await.unwrap());
    }

    #[tokio::test]
    async fn clear_donations_reports_count() {
        let pool = test_pool().await;
        for i in 0..3 {
            sqlx::query(
                "INSERT INTO donations (reference, donor_name, donor_email, items,
                                        total_amount, created_at)
                 VALUES (?1, 'A', 'a@example.org', '[]', 0, 0)",
            )
            .bind(format!("DON-{i}"))
            .execute(&pool)
            .await
            .unwrap();
        }
        assert_eq!(clear_donations(&pool).await.unwrap(), 3);
        assert!(list_donations(&pool, None).await.unwrap().is_empty());
    }
}
