//! Membership record structures supplied by the record source

use serde::{Deserialize, Serialize};

use crate::calendar::years_between;

/// A single member's membership dates as of the snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipRecord {
    /// Unique member identifier
    pub member_id: u64,

    /// Join instant, seconds since epoch
    pub join_timestamp: i64,

    /// End instant, seconds since epoch (None = still active or unknown)
    #[serde(default)]
    pub end_timestamp: Option<i64>,

    /// Whether the member currently holds an active-membership role
    #[serde(default)]
    pub has_active_role: bool,

    /// Membership plan or category label
    #[serde(default)]
    pub membership_type: Option<String>,
}

impl MembershipRecord {
    pub fn new(member_id: u64, join_timestamp: i64, end_timestamp: Option<i64>, has_active_role: bool) -> Self {
        Self {
            member_id,
            join_timestamp,
            end_timestamp,
            has_active_role,
            membership_type: None,
        }
    }

    /// Builder-style membership type
    pub fn with_type(mut self, membership_type: impl Into<String>) -> Self {
        self.membership_type = Some(membership_type.into());
        self
    }

    /// Records with no end date and no active role have an ambiguous status
    /// and are left out of cohort and churn computation
    pub fn is_eligible(&self) -> bool {
        self.end_timestamp.is_some() || self.has_active_role
    }

    /// Eligible, joined by `now`, and not ending before the join
    pub fn is_observed_at(&self, now: i64) -> bool {
        self.is_eligible()
            && self.join_timestamp <= now
            && self.end_timestamp.map_or(true, |end| end >= self.join_timestamp)
    }

    /// Whether the member is active at `now`
    pub fn is_current(&self, now: i64) -> bool {
        self.has_active_role && self.end_timestamp.map_or(true, |end| end > now)
    }

    /// Whether the membership had ended by `now`
    pub fn has_ended(&self, now: i64) -> bool {
        self.end_timestamp.map_or(false, |end| end <= now)
    }

    /// End instant if ended, otherwise `now`; scheduled future ends are capped at `now`
    pub fn effective_end(&self, now: i64) -> i64 {
        self.end_timestamp.map_or(now, |end| end.min(now))
    }

    /// Tenure so far (or final tenure if ended), in years
    pub fn tenure_years(&self, now: i64) -> f64 {
        years_between(self.join_timestamp, self.effective_end(now))
    }

    /// Membership type label with the dashboard's fallback
    pub fn type_label(&self) -> &str {
        type_label(self.membership_type.as_deref())
    }
}

/// Label used when a membership type is missing or blank
pub const UNKNOWN_TYPE: &str = "Unknown";

pub(crate) fn type_label(membership_type: Option<&str>) -> &str {
    match membership_type.map(str::trim) {
        Some(t) if !t.is_empty() => t,
        _ => UNKNOWN_TYPE,
    }
}

/// Per-member input to the lifetime value projection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberPayment {
    pub member_id: u64,

    /// Tenure in years at the reference instant
    pub tenure_years: f64,

    /// Recurring monthly payment; only positive amounts are projected
    #[serde(default)]
    pub monthly_payment: Option<f64>,

    #[serde(default)]
    pub membership_type: Option<String>,
}

impl MemberPayment {
    pub fn new(member_id: u64, tenure_years: f64, monthly_payment: Option<f64>) -> Self {
        Self {
            member_id,
            tenure_years,
            monthly_payment,
            membership_type: None,
        }
    }

    /// Derive a payment row from a record, measuring tenure to `now`
    pub fn from_record(record: &MembershipRecord, monthly_payment: Option<f64>, now: i64) -> Self {
        Self {
            member_id: record.member_id,
            tenure_years: record.tenure_years(now),
            monthly_payment,
            membership_type: record.membership_type.clone(),
        }
    }

    /// The payment amount if it qualifies for projection
    pub fn qualifying_payment(&self) -> Option<f64> {
        self.monthly_payment
            .filter(|p| p.is_finite() && *p > 0.0)
            .filter(|_| self.tenure_years.is_finite() && self.tenure_years >= 0.0)
    }
}

/// Everything the engine needs for one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MembershipSnapshot {
    /// The "as of" instant for the whole run
    pub reference_instant: i64,

    pub records: Vec<MembershipRecord>,

    #[serde(default)]
    pub payments: Vec<MemberPayment>,
}

impl MembershipSnapshot {
    pub fn new(reference_instant: i64, records: Vec<MembershipRecord>, payments: Vec<MemberPayment>) -> Self {
        Self {
            reference_instant,
            records,
            payments,
        }
    }
}
