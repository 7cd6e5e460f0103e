//! Resume gate derivation.
//!
//! The backend reports "resume present" through three overlapping fields
//! (`hasResume`, `resumeUploaded`, `resumeStatus`). Every consumer goes
//! through [`has_resume`] so the OR of the three is computed in one place.

use crate::{ResumeStatus, UserProfile};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// True iff the current user has at least one truthy resume indicator.
/// No user means no resume.
pub fn has_resume(user: Option<&UserProfile>) -> bool {
    user.is_some_and(UserProfile::resume_indicator)
}

impl UserProfile {
    pub fn resume_indicator(&self) -> bool {
        self.has_resume || self.resume_uploaded || self.resume_status == ResumeStatus::Uploaded
    }
}

/// Lenient truthiness for flags the backend encodes inconsistently.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => matches!(
            text.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes"
        ),
        Value::Null | Value::Array(_) | Value::Object(_) => false,
    }
}

/// `deserialize_with` adapter that accepts any JSON value and applies [`is_truthy`].
pub fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(is_truthy(&raw))
}
