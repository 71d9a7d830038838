//! A member's payment ledger. Append-only: entries are never edited or
//! removed once recorded.

use chrono::NaiveDate;

use crate::models::{BillingPeriod, Payment};

/// A validated payment that has not been given an id yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    pub date: NaiveDate,
    pub amount: i64,
    pub period: BillingPeriod,
    pub note: String,
}

/// Latest payment by date. Among payments sharing the latest date the one
/// with the highest id wins.
pub fn most_recent(payments: &[Payment]) -> Option<&Payment> {
    payments
        .iter()
        .max_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)))
}

pub fn next_id(payments: &[Payment]) -> i64 {
    payments.iter().map(|p| p.id).max().map_or(1, |max| max + 1)
}

/// Returns a new ledger with `entry` appended under the next free id.
pub fn append(payments: &[Payment], entry: NewPayment) -> Vec<Payment> {
    let mut ledger = Vec::with_capacity(payments.len() + 1);
    ledger.extend_from_slice(payments);
    ledger.push(Payment {
        id: next_id(payments),
        date: entry.date,
        amount: entry.amount,
        period: entry.period,
        note: entry.note,
    });
    ledger
}

/// Sum of all amounts, saturating at `i64::MAX`.
pub fn total_paid(payments: &[Payment]) -> i64 {
    payments
        .iter()
        .fold(0i64, |total, p| total.saturating_add(p.amount))
}

/// Total after adding `amount`, or `None` if it no longer fits.
pub fn checked_total_with(payments: &[Payment], amount: i64) -> Option<i64> {
    payments
        .iter()
        .try_fold(amount, |total, p| total.checked_add(p.amount))
}

/// Newest first: date descending, then id descending.
pub fn history(payments: &[Payment]) -> Vec<Payment> {
    let mut sorted = payments.to_vec();
    sorted.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn payment(id: i64, date: NaiveDate, amount: i64) -> Payment {
        Payment {
            id,
            date,
            amount,
            period: BillingPeriod::parse(&date.format("%Y-%m").to_string()).unwrap(),
            note: String::new(),
        }
    }

    fn entry(date: NaiveDate, amount: i64) -> NewPayment {
        NewPayment {
            date,
            amount,
            period: BillingPeriod::parse("2025-03").unwrap(),
            note: "cash".into(),
        }
    }

    #[test]
    fn empty_ledger_has_no_recent_payment_and_zero_total() {
        assert!(most_recent(&[]).is_none());
        assert_eq!(total_paid(&[]), 0);
    }

    #[test]
    fn most_recent_picks_latest_date_regardless_of_order() {
        let ledger = vec![
            payment(1, day(2025, 1, 5), 1000),
            payment(2, day(2025, 3, 1), 1000),
            payment(3, day(2025, 2, 10), 1000),
        ];
        assert_eq!(most_recent(&ledger).unwrap().id, 2);
    }

    #[test]
    fn same_day_tie_goes_to_highest_id() {
        let ledger = vec![
            payment(4, day(2025, 3, 1), 500),
            payment(2, day(2025, 3, 1), 700),
            payment(3, day(2025, 2, 1), 900),
        ];
        assert_eq!(most_recent(&ledger).unwrap().id, 4);
    }

    #[test]
    fn append_assigns_one_then_max_plus_one() {
        let first = append(&[], entry(day(2025, 3, 1), 1000));
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id, 1);

        let gappy = vec![payment(2, day(2025, 1, 1), 1), payment(9, day(2025, 2, 1), 1)];
        let next = append(&gappy, entry(day(2025, 3, 1), 1000));
        assert_eq!(next.last().unwrap().id, 10);
        assert_eq!(gappy.len(), 2, "input ledger is left untouched");
    }

    #[test]
    fn appended_latest_payment_becomes_most_recent() {
        let ledger = vec![payment(1, day(2025, 1, 1), 1000)];
        let ledger = append(&ledger, entry(day(2025, 3, 15), 1200));
        let latest = most_recent(&ledger).unwrap();
        assert_eq!(latest.id, 2);
        assert_eq!(latest.amount, 1200);
        assert_eq!(latest.note, "cash");
    }

    #[test]
    fn totals_never_overflow() {
        let ledger = vec![
            payment(1, day(2025, 1, 1), i64::MAX),
            payment(2, day(2025, 2, 1), 1),
        ];
        assert_eq!(total_paid(&ledger), i64::MAX);

        assert_eq!(checked_total_with(&ledger[..1], 1), None);
        assert_eq!(checked_total_with(&ledger[1..], 41), Some(42));
        assert_eq!(checked_total_with(&[], 7), Some(7));
    }

    #[test]
    fn total_is_independent_of_order() {
        let ledger = vec![
            payment(1, day(2025, 1, 1), 1000),
            payment(2, day(2025, 2, 1), 750),
            payment(3, day(2025, 3, 1), 1250),
        ];
        let mut reversed = ledger.clone();
        reversed.reverse();
        assert_eq!(total_paid(&ledger), 3000);
        assert_eq!(total_paid(&ledger), total_paid(&reversed));
    }

    #[test]
    fn history_is_newest_first() {
        let ledger = vec![
            payment(1, day(2025, 1, 1), 1),
            payment(2, day(2025, 3, 1), 1),
            payment(3, day(2025, 3, 1), 1),
        ];
        let ids: Vec<i64> = history(&ledger).iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }
}
