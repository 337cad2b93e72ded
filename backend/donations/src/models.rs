//! Domain types for the donation lifecycle.
//!
//! A donation is stored as one row with its line items embedded as a JSON
//! document; [`DonationRow`] is the raw stored shape and [`Donation`] the
//! decoded one handed to the workflow and API layers.

use serde::{Deserialize, Serialize};

use crate::errors::{AppError, Result};

/// Lifecycle status of a donation.
///
/// Transitions are one-way: `pending → approved` or `pending → rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DonationStatus {
    Pending,
    Approved,
    Rejected,
}

impl DonationStatus {
    /// Short identifier string as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Parse the stored identifier back into a status.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// One (category, quantity) pairing within a donation.
///
/// Category name, unit label, and unit price are snapshots taken at intake
/// so the record stays auditable after the category changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    /// Category reference — the slug, or a raw numeric id for legacy callers.
    pub category: String,
    pub category_name: String,
    pub unit_label: String,
    pub unit_price: f64,
    pub quantity: i64,
    pub line_total: f64,
}

/// Intake payload for a new donation.
#[derive(Debug, Clone, Deserialize)]
pub struct NewDonation {
    pub donor_name: String,
    pub donor_email: String,
    #[serde(default)]
    pub donor_phone: Option<String>,
    #[serde(default)]
    pub donor_social: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
    pub items: Vec<LineItem>,
    /// Caller-computed total, persisted redundantly for audit.
    pub total_amount: f64,
}

/// A fully decoded donation record.
#[derive(Debug, Clone, Serialize)]
pub struct Donation {
    pub id: i64,
    /// Human-facing reference, unique and immutable.
    pub reference: String,
    pub donor_name: String,
    pub donor_email: String,
    pub donor_phone: Option<String>,
    pub donor_social: Option<String>,
    pub message: Option<String>,
    pub is_anonymous: bool,
    pub items: Vec<LineItem>,
    pub total_amount: f64,
    pub status: DonationStatus,
    /// Set exactly once, on the pending → approved transition.
    pub approved_at: Option<i64>,
    pub bank_verified: bool,
    pub bank_note: Option<String>,
    pub created_at: i64,
}

/// A donation row as stored in / read from the database.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DonationRow {
    pub id: i64,
    pub reference: String,
    pub donor_name: String,
    pub donor_email: String,
    pub donor_phone: Option<String>,
    pub donor_social: Option<String>,
    pub message: Option<String>,
    pub is_anonymous: bool,
    /// JSON-encoded line item list.
    pub items: String,
    pub total_amount: f64,
    pub status: String,
    pub approved_at: Option<i64>,
    pub bank_verified: bool,
    pub bank_note: Option<String>,
    pub created_at: i64,
}

impl DonationRow {
    /// Decode the stored row into a [`Donation`].
    pub fn decode(self) -> Result<Donation> {
        let items: Vec<LineItem> = serde_json::from_str(&self.items)?;
        let status = DonationStatus::parse(&self.status).ok_or_else(|| {
            AppError::Decode(format!(
                "donation {} has unknown status '{}'",
                self.reference, self.status
            ))
        })?;
        Ok(Donation {
            id: self.id,
            reference: self.reference,
            donor_name: self.donor_name,
            donor_email: self.donor_email,
            donor_phone: self.donor_phone,
            donor_social: self.donor_social,
            message: self.message,
            is_anonymous: self.is_anonymous,
            items,
            total_amount: self.total_amount,
            status,
            approved_at: self.approved_at,
            bank_verified: self.bank_verified,
            bank_note: self.bank_note,
            created_at: self.created_at,
        })
    }
}

/// A fundable category in the ledger.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Category {
    pub id: i64,
    /// Primary external key.
    pub slug: String,
    pub name: String,
    pub unit_label: String,
    pub unit_price: f64,
    /// Funding target, in units. Always >= 1.
    pub target_goal: i64,
    /// Units funded this cycle. Increases only via approval, zeroed on reset.
    pub current_funded: i64,
    pub donors: i64,
    pub is_active: bool,
    pub display_order: i64,
}

impl Category {
    /// Derived progress, recomputed on every read and never persisted.
    pub fn progress_percentage(&self) -> u32 {
        if self.target_goal <= 0 {
            return 0;
        }
        let pct = (self.current_funded as f64 / self.target_goal as f64 * 100.0).round();
        (pct as i64).clamp(0, 100) as u32
    }

    pub fn target_reached(&self) -> bool {
        self.current_funded >= self.target_goal
    }
}

/// Tagged lookup key for category resolution.
///
/// The slug is the primary external key; the numeric id is kept as a
/// fallback for legacy references embedded in old donation records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryRef {
    Slug(String),
    Id(i64),
}

/// The funding-cycle counter singleton (row id = 1).
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CycleCounter {
    pub current_cycle: i64,
    pub total_resets: i64,
    pub last_reset_at: Option<i64>,
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn category(funded: i64, goal: i64) -> Category {
        Category {
            id: 1,
            slug: "education".to_string(),
            name: "Education".to_string(),
            unit_label: "books".to_string(),
            unit_price: 100.0,
            target_goal: goal,
            current_funded: funded,
            donors: 0,
            is_active: true,
            display_order: 0,
        }
    }

    #[test]
    fn status_round_trip() {
        for status in [
            DonationStatus::Pending,
            DonationStatus::Approved,
            DonationStatus::Rejected,
        ] {
            assert_eq!(DonationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(DonationStatus::parse("cancelled"), None);
    }

    #[test]
    fn progress_rounds_and_caps_at_100() {
        assert_eq!(category(0, 10).progress_percentage(), 0);
        assert_eq!(category(1, 3).progress_percentage(), 33);
        assert_eq!(category(2, 3).progress_percentage(), 67);
        assert_eq!(category(10, 10).progress_percentage(), 100);
        assert_eq!(category(25, 10).progress_percentage(), 100);
    }

    #[test]
    fn progress_is_zero_for_zero_goal() {
        assert_eq!(category(5, 0).progress_percentage(), 0);
    }

    #[test]
    fn decode_rejects_unknown_status() {
        let row = DonationRow {
            id: 1,
            reference: "DON-1".to_string(),
            donor_name: "A".to_string(),
            donor_email: "a@example.org".to_string(),
            donor_phone: None,
            donor_social: None,
            message: None,
            is_anonymous: false,
            items: "[]".to_string(),
            total_amount: 0.0,
            status: "limbo".to_string(),
            approved_at: None,
            bank_verified: false,
            bank_note: None,
            created_at: 0,
        };
        assert!(row.decode().is_err());
    }
}
