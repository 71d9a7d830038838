//! Collection-level views over the roster: filtering, counts and recency.
//! Nothing here mutates the members it is given.

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{Level, Member, MemberStatus, MemberView};
use crate::services::{ledger, status};

/// Conjunctive roster filter. `None` means "all".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RosterFilter {
    pub search: String,
    pub level: Option<Level>,
    pub status: Option<MemberStatus>,
}

impl RosterFilter {
    /// Builds a filter from raw query values, where `all` or an empty value
    /// disables that predicate. The search term is matched as given,
    /// surrounding whitespace included.
    pub fn from_query(
        search: Option<&str>,
        level: Option<&str>,
        status: Option<&str>,
    ) -> Result<Self, String> {
        fn selected(raw: Option<&str>) -> Option<&str> {
            raw.map(str::trim)
                .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("all"))
        }

        Ok(Self {
            search: search.unwrap_or_default().to_string(),
            level: selected(level).map(str::parse).transpose()?,
            status: selected(status).map(str::parse).transpose()?,
        })
    }

    pub fn matches(&self, member: &Member, today: NaiveDate) -> bool {
        self.matches_search(member)
            && self.level.map_or(true, |level| member.level == level)
            && self
                .status
                .map_or(true, |wanted| status::derive_status(member, today) == wanted)
    }

    fn matches_search(&self, member: &Member) -> bool {
        if self.search.is_empty() {
            return true;
        }
        let needle = self.search.to_lowercase();
        [&member.first_name, &member.last_name, &member.phone]
            .iter()
            .any(|field| field.to_lowercase().contains(&needle))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub active: usize,
    pub warning: usize,
    pub inactive: usize,
    pub unpaid: usize,
}

impl StatusCounts {
    fn bump(&mut self, status: MemberStatus) {
        match status {
            MemberStatus::Active => self.active += 1,
            MemberStatus::Warning => self.warning += 1,
            MemberStatus::Inactive => self.inactive += 1,
            MemberStatus::Unpaid => self.unpaid += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LevelCounts {
    #[serde(rename = "Başlangıç")]
    pub beginner: usize,
    #[serde(rename = "Orta")]
    pub intermediate: usize,
    #[serde(rename = "İleri")]
    pub advanced: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterSummary {
    pub total: usize,
    pub counts_by_status: StatusCounts,
    pub counts_by_level: LevelCounts,
    pub manually_active: usize,
    pub total_collected: i64,
    pub recent: Vec<MemberView>,
}

pub fn filter<'a>(members: &'a [Member], filter: &RosterFilter, today: NaiveDate) -> Vec<&'a Member> {
    members.iter().filter(|m| filter.matches(m, today)).collect()
}

pub fn count_by_status(members: &[Member], today: NaiveDate) -> StatusCounts {
    members.iter().fold(StatusCounts::default(), |mut counts, m| {
        counts.bump(status::derive_status(m, today));
        counts
    })
}

pub fn count_by_level(members: &[Member]) -> LevelCounts {
    members.iter().fold(LevelCounts::default(), |mut counts, m| {
        match m.level {
            Level::Beginner => counts.beginner += 1,
            Level::Intermediate => counts.intermediate += 1,
            Level::Advanced => counts.advanced += 1,
        }
        counts
    })
}

/// Newest registrations first. Equal dates keep their collection order.
pub fn recent(members: &[Member], n: usize) -> Vec<&Member> {
    let mut sorted: Vec<&Member> = members.iter().collect();
    sorted.sort_by(|a, b| b.registration_date.cmp(&a.registration_date));
    sorted.truncate(n);
    sorted
}

pub fn aggregate(members: &[Member], today: NaiveDate, recent_n: usize) -> RosterSummary {
    RosterSummary {
        total: members.len(),
        counts_by_status: count_by_status(members, today),
        counts_by_level: count_by_level(members),
        manually_active: members.iter().filter(|m| m.is_active).count(),
        total_collected: members
            .iter()
            .fold(0i64, |total, m| total.saturating_add(ledger::total_paid(&m.payments))),
        recent: recent(members, recent_n)
            .into_iter()
            .map(|m| status::view(m.clone(), today))
            .collect(),
    }
}
