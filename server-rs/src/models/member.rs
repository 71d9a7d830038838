use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    #[serde(default)]
    pub level: Level,
    #[serde(with = "calendar_date")]
    pub registration_date: NaiveDate,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub notes: String,
    #[serde(default)]
    pub payments: Vec<Payment>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: i64,
    #[serde(with = "calendar_date")]
    pub date: NaiveDate,
    pub amount: i64,
    pub period: BillingPeriod,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub note: String,
}

fn default_active() -> bool {
    true
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Level {
    #[default]
    #[serde(rename = "Başlangıç", alias = "Beginner", alias = "beginner")]
    Beginner,
    #[serde(rename = "Orta", alias = "Intermediate", alias = "intermediate")]
    Intermediate,
    #[serde(rename = "İleri", alias = "Advanced", alias = "advanced")]
    Advanced,
}

impl Level {
    pub fn label(&self) -> &'static str {
        match self {
            Level::Beginner => "Başlangıç",
            Level::Intermediate => "Orta",
            Level::Advanced => "İleri",
        }
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Başlangıç" | "Beginner" | "beginner" => Ok(Level::Beginner),
            "Orta" | "Intermediate" | "intermediate" => Ok(Level::Intermediate),
            "İleri" | "Advanced" | "advanced" => Ok(Level::Advanced),
            other => Err(format!("unknown level `{other}`")),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Derived standing of a member. See `services::status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Active,
    Warning,
    Inactive,
    Unpaid,
}

impl MemberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberStatus::Active => "active",
            MemberStatus::Warning => "warning",
            MemberStatus::Inactive => "inactive",
            MemberStatus::Unpaid => "unpaid",
        }
    }
}

impl FromStr for MemberStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(MemberStatus::Active),
            "warning" => Ok(MemberStatus::Warning),
            "inactive" => Ok(MemberStatus::Inactive),
            "unpaid" => Ok(MemberStatus::Unpaid),
            other => Err(format!("unknown status `{other}`")),
        }
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Year-month a payment covers, `YYYY-MM`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BillingPeriod(String);

impl BillingPeriod {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        let well_formed = raw.len() == 7
            && raw.as_bytes()[4] == b'-'
            && NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d").is_ok();
        if well_formed {
            Ok(Self(raw.to_string()))
        } else {
            Err(format!("`{raw}` is not a YYYY-MM period"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BillingPeriod {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<BillingPeriod> for String {
    fn from(period: BillingPeriod) -> Self {
        period.0
    }
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Body of create and update requests.
///
/// On update, absent optional fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberInput {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub phone: String,
    pub level: Option<Level>,
    #[serde(default, deserialize_with = "calendar_date::option::deserialize")]
    pub registration_date: Option<NaiveDate>,
    pub is_active: Option<bool>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInput {
    #[serde(default, deserialize_with = "calendar_date::option::deserialize")]
    pub date: Option<NaiveDate>,
    pub amount: Option<i64>,
    #[serde(default)]
    pub period: String,
    pub note: Option<String>,
}

/// A member as returned by the API: the stored record plus its derived
/// standing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberView {
    #[serde(flatten)]
    pub member: Member,
    pub status: MemberStatus,
    pub total_paid: i64,
    pub payment_count: usize,
    pub last_payment: Option<Payment>,
    pub days_since_last_payment: Option<i64>,
    /// Payments newest first. `payments` keeps the recorded order.
    pub history: Vec<Payment>,
}

/// `YYYY-MM-DD` dates. RFC 3339 timestamps are accepted on input and cut to
/// their calendar date.
pub mod calendar_date {
    use chrono::{DateTime, NaiveDate};
    use serde::{de, Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d";

    pub fn parse(raw: &str) -> Result<NaiveDate, String> {
        let raw = raw.trim();
        NaiveDate::parse_from_str(raw, FORMAT)
            .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.date_naive()))
            .map_err(|_| format!("`{raw}` is not a YYYY-MM-DD date"))
    }

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&date.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(de::Error::custom)
    }

    pub mod option {
        use chrono::NaiveDate;
        use serde::{de, Deserialize, Deserializer};

        use super::parse;

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<NaiveDate>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) if raw.trim().is_empty() => Ok(None),
                Some(raw) => parse(&raw).map(Some).map_err(de::Error::custom),
                None => Ok(None),
            }
        }
    }
}
