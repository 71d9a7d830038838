use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::models::{BillingPeriod, Member, MemberInput, MemberView, PaymentInput, Role};
use crate::services::clock::Clock;
use crate::services::ledger::{self, NewPayment};
use crate::services::roster::{self, RosterFilter, RosterSummary};
use crate::services::status::{self, Standing};
use crate::store::{self, Collection, RecordStore};

pub const MEMBERS: &str = "members";
/// Single-record collection holding the next member id.
pub const MEMBER_IDS: &str = "member-ids";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdSequence {
    next_id: i64,
}

/// A result paired with the collection version it was read or written at.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub value: T,
    pub version: String,
}

/// Roster operations over the member collection.
///
/// Every write is load, change in memory, then replace the whole collection
/// guarded by the version read at load time. `expected_version` lets a
/// caller also pin the version it last saw.
#[derive(Clone)]
pub struct MemberService {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
}

impl MemberService {
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    async fn load(&self, expected_version: Option<&str>) -> AppResult<Collection<Member>> {
        let collection = store::load_typed::<Member>(self.store.as_ref(), MEMBERS).await?;
        if let Some(expected) = expected_version {
            if expected != collection.version {
                return Err(AppError::Conflict(
                    "Member list changed since it was read; reload and retry".into(),
                ));
            }
        }
        Ok(collection)
    }

    /// Takes the next member id from the persisted high-water mark, so ids
    /// freed by a delete are never handed out again. An id reserved by a
    /// create that then fails stays unused.
    async fn reserve_id(&self, floor: i64) -> AppResult<i64> {
        let sequence = store::load_typed::<IdSequence>(self.store.as_ref(), MEMBER_IDS).await?;
        let id = sequence
            .records
            .first()
            .map_or(1, |s| s.next_id)
            .max(floor);
        store::save_typed(
            self.store.as_ref(),
            MEMBER_IDS,
            &[IdSequence { next_id: id + 1 }],
            Some(&sequence.version),
        )
        .await?;
        Ok(id)
    }

    async fn commit(&self, members: &[Member], read_version: &str) -> AppResult<String> {
        Ok(store::save_typed(self.store.as_ref(), MEMBERS, members, Some(read_version)).await?)
    }

    pub async fn list(&self, filter: &RosterFilter) -> AppResult<Versioned<Vec<MemberView>>> {
        let collection = self.load(None).await?;
        let today = self.today();
        let value = roster::filter(&collection.records, filter, today)
            .into_iter()
            .map(|m| status::view(m.clone(), today))
            .collect();
        Ok(Versioned {
            value,
            version: collection.version,
        })
    }

    pub async fn get(&self, id: i64) -> AppResult<Versioned<MemberView>> {
        let collection = self.load(None).await?;
        let member = find(&collection.records, id)?.clone();
        Ok(Versioned {
            value: status::view(member, self.today()),
            version: collection.version,
        })
    }

    pub async fn standing(&self, id: i64) -> AppResult<Standing> {
        let collection = self.load(None).await?;
        let member = find(&collection.records, id)?;
        Ok(status::derive_standing(member, self.today()))
    }

    pub async fn summary(&self, recent_n: usize) -> AppResult<Versioned<RosterSummary>> {
        let collection = self.load(None).await?;
        Ok(Versioned {
            value: roster::aggregate(&collection.records, self.today(), recent_n),
            version: collection.version,
        })
    }

    pub async fn create(
        &self,
        actor: Role,
        input: MemberInput,
        expected_version: Option<&str>,
    ) -> AppResult<Versioned<MemberView>> {
        let fields = ContactFields::validate(&input)?;
        let is_active = input.is_active.unwrap_or(true);
        if !is_active && !actor.at_least(Role::Admin) {
            return Err(AppError::Forbidden(
                "Only admins can register a member as inactive".into(),
            ));
        }

        let mut collection = self.load(expected_version).await?;
        let floor = collection
            .records
            .iter()
            .map(|m| m.id)
            .max()
            .map_or(1, |max| max + 1);
        let id = self.reserve_id(floor).await?;

        let member = Member {
            id,
            first_name: fields.first_name,
            last_name: fields.last_name,
            phone: fields.phone,
            level: input.level.unwrap_or_default(),
            registration_date: input.registration_date.unwrap_or_else(|| self.today()),
            is_active,
            notes: input.notes.unwrap_or_default(),
            payments: Vec::new(),
        };
        collection.records.push(member.clone());

        let version = self.commit(&collection.records, &collection.version).await?;
        tracing::info!(member_id = id, role = %actor, "Member created");

        Ok(Versioned {
            value: status::view(member, self.today()),
            version,
        })
    }

    /// Replaces a member's profile fields. The payment ledger is never
    /// touched here; absent optional fields keep their stored values.
    pub async fn update(
        &self,
        actor: Role,
        id: i64,
        input: MemberInput,
        expected_version: Option<&str>,
    ) -> AppResult<Versioned<MemberView>> {
        let fields = ContactFields::validate(&input)?;

        let mut collection = self.load(expected_version).await?;
        let member = find_mut(&mut collection.records, id)?;

        if let Some(is_active) = input.is_active {
            if is_active != member.is_active && !actor.at_least(Role::Admin) {
                return Err(AppError::Forbidden(
                    "Only admins can change a member's active flag".into(),
                ));
            }
            member.is_active = is_active;
        }
        member.first_name = fields.first_name;
        member.last_name = fields.last_name;
        member.phone = fields.phone;
        if let Some(level) = input.level {
            member.level = level;
        }
        if let Some(date) = input.registration_date {
            member.registration_date = date;
        }
        if let Some(notes) = input.notes {
            member.notes = notes;
        }
        let updated = member.clone();

        let version = self.commit(&collection.records, &collection.version).await?;
        tracing::info!(member_id = id, role = %actor, "Member updated");

        Ok(Versioned {
            value: status::view(updated, self.today()),
            version,
        })
    }

    pub async fn delete(
        &self,
        actor: Role,
        id: i64,
        expected_version: Option<&str>,
    ) -> AppResult<String> {
        if !actor.at_least(Role::Admin) {
            return Err(AppError::Forbidden("Only admins can delete members".into()));
        }

        let mut collection = self.load(expected_version).await?;
        find(&collection.records, id)?;
        collection.records.retain(|m| m.id != id);

        let version = self.commit(&collection.records, &collection.version).await?;
        tracing::info!(member_id = id, role = %actor, "Member deleted");
        Ok(version)
    }

    pub async fn add_payment(
        &self,
        actor: Role,
        member_id: i64,
        input: PaymentInput,
        expected_version: Option<&str>,
    ) -> AppResult<Versioned<MemberView>> {
        let entry = validate_payment(input, self.today())?;

        let mut collection = self.load(expected_version).await?;
        let member = find_mut(&mut collection.records, member_id)?;
        if ledger::checked_total_with(&member.payments, entry.amount).is_none() {
            return Err(AppError::validation(
                "amount",
                "amount would push the member's total paid out of range",
            ));
        }
        member.payments = ledger::append(&member.payments, entry);
        let updated = member.clone();

        let version = self.commit(&collection.records, &collection.version).await?;
        tracing::info!(
            member_id,
            payment_id = updated.payments.last().map(|p| p.id),
            role = %actor,
            "Payment recorded"
        );

        Ok(Versioned {
            value: status::view(updated, self.today()),
            version,
        })
    }
}

fn find(members: &[Member], id: i64) -> AppResult<&Member> {
    members
        .iter()
        .find(|m| m.id == id)
        .ok_or_else(|| AppError::NotFound(format!("Member {id} not found")))
}

fn find_mut(members: &mut [Member], id: i64) -> AppResult<&mut Member> {
    members
        .iter_mut()
        .find(|m| m.id == id)
        .ok_or_else(|| AppError::NotFound(format!("Member {id} not found")))
}

struct ContactFields {
    first_name: String,
    last_name: String,
    phone: String,
}

impl ContactFields {
    fn validate(input: &MemberInput) -> AppResult<Self> {
        Ok(Self {
            first_name: required("firstName", &input.first_name)?,
            last_name: required("lastName", &input.last_name)?,
            phone: required("phone", &input.phone)?,
        })
    }
}

fn required(field: &'static str, value: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::validation(field, format!("{field} is required")));
    }
    Ok(value.to_string())
}

fn validate_payment(input: PaymentInput, today: NaiveDate) -> AppResult<NewPayment> {
    let amount = match input.amount {
        Some(amount) if amount > 0 => amount,
        Some(_) => return Err(AppError::validation("amount", "amount must be positive")),
        None => return Err(AppError::validation("amount", "amount is required")),
    };
    if input.period.trim().is_empty() {
        return Err(AppError::validation("period", "period is required"));
    }
    let period =
        BillingPeriod::parse(&input.period).map_err(|e| AppError::validation("period", e))?;

    Ok(NewPayment {
        date: input.date.unwrap_or(today),
        amount,
        period,
        note: input.note.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Level, MemberStatus};
    use crate::services::clock::FixedClock;
    use crate::store::MemoryStore;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn service() -> (MemberService, FixedClock, MemoryStore) {
        let clock = FixedClock::new(day(2025, 3, 1));
        let store = MemoryStore::new();
        let svc = MemberService::new(Arc::new(store.clone()), Arc::new(clock.clone()));
        (svc, clock, store)
    }

    fn input(first: &str) -> MemberInput {
        MemberInput {
            first_name: first.into(),
            last_name: "Demir".into(),
            phone: "0555 123 45 67".into(),
            ..Default::default()
        }
    }

    fn payment(period: &str) -> PaymentInput {
        PaymentInput {
            amount: Some(1000),
            period: period.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn lifecycle_follows_payment_recency_and_override() {
        let (svc, clock, _) = service();
        let a = svc.create(Role::Admin, input("Ali"), None).await.unwrap().value;
        assert_eq!(a.status, MemberStatus::Unpaid);
        assert_eq!(a.member.registration_date, day(2025, 3, 1));

        let paid = svc
            .add_payment(Role::Admin, a.member.id, payment("2025-03"), None)
            .await
            .unwrap()
            .value;
        assert_eq!(paid.status, MemberStatus::Active);
        assert_eq!(paid.member.payments[0].date, day(2025, 3, 1));

        clock.advance_days(35);
        assert_eq!(svc.get(a.member.id).await.unwrap().value.status, MemberStatus::Warning);

        clock.advance_days(15);
        assert_eq!(svc.get(a.member.id).await.unwrap().value.status, MemberStatus::Inactive);

        let mut deactivate = input("Ali");
        deactivate.is_active = Some(false);
        let off = svc.update(Role::Admin, a.member.id, deactivate, None).await.unwrap().value;
        assert_eq!(off.status, MemberStatus::Inactive);
        assert_eq!(off.member.payments.len(), 1, "update keeps the ledger");

        let standing = svc.standing(a.member.id).await.unwrap();
        assert_eq!(standing.reason, status::StandingReason::ManualOverride);
        assert_eq!(standing.days_since_last_payment, Some(50));
    }

    #[tokio::test]
    async fn ids_skip_over_deleted_members() {
        let (svc, _, _) = service();
        for name in ["A", "B", "C"] {
            svc.create(Role::Admin, input(name), None).await.unwrap();
        }
        svc.delete(Role::Admin, 2, None).await.unwrap();
        let d = svc.create(Role::Admin, input("D"), None).await.unwrap().value;
        assert_eq!(d.member.id, 4);
    }

    #[tokio::test]
    async fn deleting_the_newest_member_does_not_free_its_id() {
        let (svc, _, _) = service();
        svc.create(Role::Admin, input("A"), None).await.unwrap();
        let b = svc.create(Role::Admin, input("B"), None).await.unwrap().value;
        assert_eq!(b.member.id, 2);

        svc.delete(Role::Admin, 2, None).await.unwrap();
        let c = svc.create(Role::Admin, input("C"), None).await.unwrap().value;
        assert_eq!(c.member.id, 3);

        svc.delete(Role::Admin, 1, None).await.unwrap();
        svc.delete(Role::Admin, 3, None).await.unwrap();
        let d = svc.create(Role::Admin, input("D"), None).await.unwrap().value;
        assert_eq!(d.member.id, 4);
    }

    #[tokio::test]
    async fn ids_continue_above_members_written_without_a_sequence() {
        let (svc, _, store) = service();
        let legacy = serde_json::json!({
            "id": 7,
            "firstName": "Eski",
            "lastName": "Kayit",
            "phone": "1",
            "registrationDate": "2024-01-01",
        });
        store.save(MEMBERS, vec![legacy], None).await.unwrap();

        let next = svc.create(Role::Admin, input("Yeni"), None).await.unwrap().value;
        assert_eq!(next.member.id, 8);
    }

    #[tokio::test]
    async fn payment_that_would_overflow_the_total_is_rejected() {
        let (svc, _, _) = service();
        let id = svc.create(Role::Admin, input("Ali"), None).await.unwrap().value.member.id;

        let mut huge = payment("2025-03");
        huge.amount = Some(i64::MAX);
        svc.add_payment(Role::Admin, id, huge, None).await.unwrap();

        assert!(matches!(
            svc.add_payment(Role::Admin, id, payment("2025-04"), None).await,
            Err(AppError::Validation { field: "amount", .. })
        ));

        let view = svc.get(id).await.unwrap().value;
        assert_eq!(view.payment_count, 1);
        assert_eq!(view.total_paid, i64::MAX);
        let summary = svc.summary(5).await.unwrap().value;
        assert_eq!(summary.total_collected, i64::MAX);
    }

    #[tokio::test]
    async fn blank_required_fields_are_rejected_per_field() {
        let (svc, _, store) = service();
        let mut bad = input("Ali");
        bad.phone = "   ".into();

        match svc.create(Role::Admin, bad, None).await {
            Err(AppError::Validation { field, .. }) => assert_eq!(field, "phone"),
            other => panic!("expected validation error, got {other:?}"),
        }
        assert!(store.load(MEMBERS).await.unwrap().records.is_empty());
    }

    #[tokio::test]
    async fn payment_validation() {
        let (svc, _, _) = service();
        let id = svc.create(Role::Admin, input("Ali"), None).await.unwrap().value.member.id;

        let mut zero = payment("2025-03");
        zero.amount = Some(0);
        assert!(matches!(
            svc.add_payment(Role::Admin, id, zero, None).await,
            Err(AppError::Validation { field: "amount", .. })
        ));
        assert!(matches!(
            svc.add_payment(Role::Admin, id, payment(""), None).await,
            Err(AppError::Validation { field: "period", .. })
        ));
        assert!(matches!(
            svc.add_payment(Role::Admin, id, payment("03/2025"), None).await,
            Err(AppError::Validation { field: "period", .. })
        ));
    }

    #[tokio::test]
    async fn unknown_member_is_not_found() {
        let (svc, _, _) = service();
        assert!(matches!(svc.get(9).await, Err(AppError::NotFound(_))));
        assert!(matches!(
            svc.update(Role::Admin, 9, input("X"), None).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            svc.delete(Role::Admin, 9, None).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            svc.add_payment(Role::Admin, 9, payment("2025-03"), None).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn member_manager_cannot_override_or_delete() {
        let (svc, _, _) = service();
        let id = svc.create(Role::MemberManager, input("Ali"), None).await.unwrap().value.member.id;

        let mut inactive = input("Veli");
        inactive.is_active = Some(false);
        assert!(matches!(
            svc.create(Role::MemberManager, inactive.clone(), None).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            svc.update(Role::MemberManager, id, inactive, None).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            svc.delete(Role::MemberManager, id, None).await,
            Err(AppError::Forbidden(_))
        ));

        let mut same_flag = input("Ali");
        same_flag.is_active = Some(true);
        same_flag.level = Some(Level::Intermediate);
        let updated = svc.update(Role::MemberManager, id, same_flag, None).await.unwrap();
        assert_eq!(updated.value.member.level, Level::Intermediate);

        svc.add_payment(Role::MemberManager, id, payment("2025-03"), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn stale_version_is_a_conflict_and_nothing_is_written() {
        let (svc, _, store) = service();
        let first = svc.create(Role::Admin, input("Ali"), None).await.unwrap();
        svc.create(Role::Admin, input("Veli"), Some(&first.version)).await.unwrap();

        let result = svc.create(Role::Admin, input("Ayşe"), Some(&first.version)).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(store.load(MEMBERS).await.unwrap().records.len(), 2);
    }

    #[tokio::test]
    async fn store_outage_surfaces_and_leaves_data_unchanged() {
        let (svc, _, store) = service();
        let id = svc.create(Role::Admin, input("Ali"), None).await.unwrap().value.member.id;

        store.set_unavailable(true);
        let result = svc.add_payment(Role::Admin, id, payment("2025-03"), None).await;
        assert!(matches!(result, Err(AppError::StoreUnavailable(_))));

        store.set_unavailable(false);
        assert!(svc.get(id).await.unwrap().value.member.payments.is_empty());
    }

    #[tokio::test]
    async fn list_and_summary_reflect_filters() {
        let (svc, _, _) = service();
        let a = svc.create(Role::Admin, input("Ali"), None).await.unwrap().value.member.id;
        svc.create(Role::Admin, input("Veli"), None).await.unwrap();
        svc.add_payment(Role::Admin, a, payment("2025-03"), None).await.unwrap();

        let active = RosterFilter::from_query(None, None, Some("active")).unwrap();
        let listed = svc.list(&active).await.unwrap().value;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].member.first_name, "Ali");

        let summary = svc.summary(5).await.unwrap().value;
        assert_eq!(summary.total, 2);
        assert_eq!(summary.counts_by_status.active, 1);
        assert_eq!(summary.counts_by_status.unpaid, 1);
        assert_eq!(summary.total_collected, 1000);
    }
}
