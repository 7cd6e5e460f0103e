use crate::gate::lenient_bool;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ---- Session ----

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResumeStatus {
    #[default]
    Unset,
    Uploaded,
}

impl<'de> Deserialize<'de> for ResumeStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Value::deserialize(deserializer)?;
        Ok(match raw {
            Value::String(text) if text.trim().eq_ignore_ascii_case("uploaded") => Self::Uploaded,
            _ => Self::Unset,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub has_resume: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub resume_uploaded: bool,
    #[serde(default)]
    pub resume_status: ResumeStatus,
    #[serde(
        default,
        deserialize_with = "lenient_bool",
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub authenticated: bool,
    /// Remaining profile fields, kept verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl UserProfile {
    /// The user recorded right after OTP verification, before any profile fetch.
    pub fn minimal(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            authenticated: true,
            ..Self::default()
        }
    }

    pub fn mark_resume_uploaded(&mut self) {
        self.has_resume = true;
        self.resume_uploaded = true;
        self.resume_status = ResumeStatus::Uploaded;
    }
}

/// Bearer token plus cached profile, as persisted between runs.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub token: Option<String>,
    pub user: Option<UserProfile>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mob_no: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.mob_no.is_none()
    }
}

// ---- Email logs ----

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum EmailStatus {
    #[serde(rename = "EMAIL_SENT")]
    EmailSent,
    #[serde(rename = "EMAIL_RECEIVED")]
    EmailReceived,
    #[serde(rename = "CONTACTED_ON_PHONE")]
    ContactedOnPhone,
    #[serde(rename = "Interview_Scheduled")]
    InterviewScheduled,
    #[serde(rename = "HIRED")]
    Hired,
    #[serde(rename = "REJECTED")]
    Rejected,
    #[default]
    #[serde(rename = "UNKNOWN", other)]
    Unknown,
}

impl EmailStatus {
    /// Statuses a user may assign, in display order.
    pub const ASSIGNABLE: [EmailStatus; 6] = [
        EmailStatus::EmailSent,
        EmailStatus::EmailReceived,
        EmailStatus::ContactedOnPhone,
        EmailStatus::InterviewScheduled,
        EmailStatus::Rejected,
        EmailStatus::Hired,
    ];

    pub fn as_api_str(self) -> &'static str {
        match self {
            Self::EmailSent => "EMAIL_SENT",
            Self::EmailReceived => "EMAIL_RECEIVED",
            Self::ContactedOnPhone => "CONTACTED_ON_PHONE",
            Self::InterviewScheduled => "Interview_Scheduled",
            Self::Hired => "HIRED",
            Self::Rejected => "REJECTED",
            Self::Unknown => "UNKNOWN",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::EmailSent => "Email Sent",
            Self::EmailReceived => "Email Received",
            Self::ContactedOnPhone => "Contacted On Phone",
            Self::InterviewScheduled => "Interview Scheduled",
            Self::Hired => "Hired",
            Self::Rejected => "Rejected",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for EmailStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for EmailStatus {
    type Err = String;

    /// Accepts the wire code or the display label, ignoring case, spaces and underscores.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = fold_status(raw);
        Self::ASSIGNABLE
            .into_iter()
            .find(|status| {
                fold_status(status.as_api_str()) == wanted || fold_status(status.label()) == wanted
            })
            .ok_or_else(|| format!("unknown email status `{raw}`"))
    }
}

fn fold_status(raw: &str) -> String {
    raw.chars()
        .filter(|ch| ch.is_ascii_alphanumeric())
        .map(|ch| ch.to_ascii_lowercase())
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmailLogEntry {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: String,
    #[serde(default, alias = "email", alias = "to")]
    pub recipient_email: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub status: EmailStatus,
    #[serde(default, alias = "timestamp", deserialize_with = "lenient_timestamp")]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mob_no: Option<String>,
    /// Fields the viewer shows in its raw section (message body and so on).
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

fn lenient_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        _ => String::new(),
    })
}

/// The backend emits both RFC 3339 and zone-less local timestamps; the latter are read as UTC.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::String(raw) = Value::deserialize(deserializer)? else {
        return Ok(None);
    };
    Ok(parse_timestamp(&raw))
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

/// Column the email-log table is ordered by.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogSortField {
    #[default]
    SentAt,
    Recipient,
    Subject,
    Status,
}

impl LogSortField {
    pub const ALL: [LogSortField; 4] = [Self::SentAt, Self::Recipient, Self::Subject, Self::Status];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SentAt => "sent_at",
            Self::Recipient => "recipient",
            Self::Subject => "subject",
            Self::Status => "status",
        }
    }
}

impl FromStr for LogSortField {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim().replace('-', "_").to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|field| field.as_str() == wanted)
            .ok_or_else(|| format!("unknown sort field `{raw}`"))
    }
}

/// One HR contact row as the bulk-send, add and status-update endpoints expect it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct HrDetails {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default)]
    pub mob_no: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<EmailStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HrDetailsBatch {
    pub hr_details: Vec<HrDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuickSendRequest {
    pub recipient_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl QuickSendRequest {
    pub fn to(recipient_email: impl Into<String>) -> Self {
        Self {
            recipient_email: recipient_email.into(),
            subject: None,
            message: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IntentEmailRequest {
    pub recipient_email: String,
    pub subject: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
}

impl IntentEmailRequest {
    /// The single-row bulk payload used when the intent endpoint rejects a send.
    pub fn as_bulk_fallback(&self) -> HrDetailsBatch {
        HrDetailsBatch {
            hr_details: vec![HrDetails {
                email: self.recipient_email.clone(),
                name: self.name.clone(),
                company: self.company.clone(),
                mob_no: String::new(),
                subject: Some(self.subject.clone()),
                message: Some(self.message.clone()),
                status: Some(EmailStatus::EmailSent),
            }],
        }
    }
}

// ---- Dashboard ----

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardStats {
    pub total_emails: u64,
    pub total_emails_growth: String,
    pub sent_today: u64,
    pub sent_today_growth: String,
    pub response_rate: f64,
    pub response_rate_growth: String,
    pub active_campaigns: u64,
    pub active_campaigns_growth: String,
}

impl Default for DashboardStats {
    fn default() -> Self {
        Self {
            total_emails: 0,
            total_emails_growth: "+0%".to_string(),
            sent_today: 0,
            sent_today_growth: "+0%".to_string(),
            response_rate: 0.0,
            response_rate_growth: "+0%".to_string(),
            active_campaigns: 0,
            active_campaigns_growth: "+0%".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DetailedStats {
    pub status_breakdown: BTreeMap<String, u64>,
    pub unique_companies: u64,
    pub average_response_time: String,
    pub total_responses: u64,
    pub sent_this_week: u64,
    pub sent_this_month: u64,
}

impl Default for DetailedStats {
    fn default() -> Self {
        Self {
            status_breakdown: BTreeMap::new(),
            unique_companies: 0,
            average_response_time: "0 days".to_string(),
            total_responses: 0,
            sent_this_week: 0,
            sent_this_month: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct DashboardSummary {
    pub dashboard: DashboardStats,
    pub detailed: DetailedStats,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StatsPeriod {
    Today,
    Week,
    #[default]
    Month,
    Year,
}

impl StatsPeriod {
    pub const ALL: [StatsPeriod; 4] = [Self::Today, Self::Week, Self::Month, Self::Year];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Today => "Today",
            Self::Week => "This Week",
            Self::Month => "This Month",
            Self::Year => "This Year",
        }
    }
}

impl FromStr for StatsPeriod {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        Self::ALL
            .into_iter()
            .find(|period| period.as_str().eq_ignore_ascii_case(raw))
            .ok_or_else(|| format!("unknown period `{raw}` (expected today, week, month or year)"))
    }
}

// ---- Intents ----

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct IntentCategory {
    #[serde(default, alias = "code")]
    pub category_code: String,
    #[serde(default, alias = "categoryName")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct IntentCode {
    #[serde(default, alias = "code")]
    pub intent_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, alias = "body", alias = "template", skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn log_entry_accepts_numeric_ids_and_local_timestamps() {
        let entry: EmailLogEntry = serde_json::from_value(json!({
            "id": 42,
            "recipientEmail": "hr@acme.io",
            "subject": "Application",
            "status": "Interview_Scheduled",
            "sentAt": "2024-05-02T09:30:00",
            "mobNo": "555"
        }))
        .expect("entry parses");

        assert_eq!(entry.id, "42");
        assert_eq!(entry.status, EmailStatus::InterviewScheduled);
        assert_eq!(
            entry.sent_at.map(|at| at.to_rfc3339()),
            Some("2024-05-02T09:30:00+00:00".to_string())
        );
        assert_eq!(entry.mob_no.as_deref(), Some("555"));
    }

    #[test]
    fn unknown_status_does_not_fail_the_row() {
        let entry: EmailLogEntry =
            serde_json::from_value(json!({"email": "x@y.io", "status": "BOUNCED"}))
                .expect("entry parses");
        assert_eq!(entry.status, EmailStatus::Unknown);
        assert_eq!(entry.recipient_email, "x@y.io");
    }

    #[test]
    fn status_parses_codes_and_labels() {
        assert_eq!("hired".parse::<EmailStatus>(), Ok(EmailStatus::Hired));
        assert_eq!(
            "Interview Scheduled".parse::<EmailStatus>(),
            Ok(EmailStatus::InterviewScheduled)
        );
        assert_eq!(
            "contacted_on_phone".parse::<EmailStatus>(),
            Ok(EmailStatus::ContactedOnPhone)
        );
        assert!("unknown".parse::<EmailStatus>().is_err());
    }

    #[test]
    fn minimal_user_serializes_authenticated_flag() {
        let value = serde_json::to_value(UserProfile::minimal("a@b.com")).expect("serialize");
        assert_eq!(value["email"], "a@b.com");
        assert_eq!(value["authenticated"], true);
        assert_eq!(value["resumeStatus"], "unset");
    }

    #[test]
    fn profile_keeps_unmodelled_fields() {
        let user: UserProfile = serde_json::from_value(json!({
            "email": "a@b.com",
            "mobNo": "123",
            "resumeStatus": null
        }))
        .expect("profile parses");
        assert_eq!(user.resume_status, ResumeStatus::Unset);
        assert_eq!(user.extra.get("mobNo"), Some(&json!("123")));
    }

    #[test]
    fn session_debug_redacts_token() {
        let session = Session {
            token: Some("secret-token".to_string()),
            user: None,
        };
        let rendered = format!("{session:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn bulk_fallback_marks_row_as_sent() {
        let request = IntentEmailRequest {
            recipient_email: "hr@acme.io".to_string(),
            subject: "Hello".to_string(),
            message: "Body".to_string(),
            name: None,
            company: Some("Acme".to_string()),
        };
        let batch = request.as_bulk_fallback();
        assert_eq!(batch.hr_details.len(), 1);
        assert_eq!(batch.hr_details[0].status, Some(EmailStatus::EmailSent));
        let wire = serde_json::to_value(&batch).expect("serialize");
        assert_eq!(wire["hrDetails"][0]["status"], "EMAIL_SENT");
        assert_eq!(wire["hrDetails"][0]["mobNo"], "");
    }
}
