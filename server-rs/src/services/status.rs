//! Membership status derivation.
//!
//! Rules, first match wins:
//! 1. `isActive == false`            -> inactive (manual override)
//! 2. no payments                    -> unpaid
//! 3. last payment <= 30 days ago    -> active
//! 4. last payment <= 45 days ago    -> warning
//! 5. otherwise                      -> inactive (elapsed)
//!
//! Everything here is pure; "today" always comes from the caller.

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{Member, MemberStatus, MemberView};
use crate::services::ledger;

pub const ACTIVE_WINDOW_DAYS: i64 = 30;
pub const WARNING_WINDOW_DAYS: i64 = 45;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StandingReason {
    ManualOverride,
    NoPayments,
    PaymentRecency,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Standing {
    pub status: MemberStatus,
    pub reason: StandingReason,
    pub days_since_last_payment: Option<i64>,
}

/// Whole days from `date` to `today`. Negative for future dates.
pub fn days_since(date: NaiveDate, today: NaiveDate) -> i64 {
    (today - date).num_days()
}

pub fn classify_days(days: i64) -> MemberStatus {
    if days <= ACTIVE_WINDOW_DAYS {
        MemberStatus::Active
    } else if days <= WARNING_WINDOW_DAYS {
        MemberStatus::Warning
    } else {
        MemberStatus::Inactive
    }
}

pub fn derive_standing(member: &Member, today: NaiveDate) -> Standing {
    let days = ledger::most_recent(&member.payments).map(|p| days_since(p.date, today));

    let (status, reason) = match (member.is_active, days) {
        (false, _) => (MemberStatus::Inactive, StandingReason::ManualOverride),
        (true, None) => (MemberStatus::Unpaid, StandingReason::NoPayments),
        (true, Some(days)) => (classify_days(days), StandingReason::PaymentRecency),
    };

    Standing {
        status,
        reason,
        days_since_last_payment: days,
    }
}

pub fn derive_status(member: &Member, today: NaiveDate) -> MemberStatus {
    derive_standing(member, today).status
}

pub fn view(member: Member, today: NaiveDate) -> MemberView {
    let standing = derive_standing(&member, today);
    MemberView {
        status: standing.status,
        total_paid: ledger::total_paid(&member.payments),
        payment_count: member.payments.len(),
        last_payment: ledger::most_recent(&member.payments).cloned(),
        days_since_last_payment: standing.days_since_last_payment,
        history: ledger::history(&member.payments),
        member,
    }
}
