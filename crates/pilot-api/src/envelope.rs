//! Canonical reading of the backend's response envelope.
//!
//! The server answers with loosely shaped JSON: sometimes `{code, message, data}`,
//! sometimes `{status, ...}`, sometimes a bare array or a bare string. Every
//! caller reads success, tokens, resume flags and messages through this type.

use pilot_core::{is_truthy, UserProfile};
use serde::de::DeserializeOwned;
use serde_json::Value;

const ENVELOPE_MARKERS: [&str; 6] = ["code", "status", "success", "message", "error", "data"];

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ApiEnvelope {
    body: Value,
}

impl ApiEnvelope {
    pub fn from_value(body: Value) -> Self {
        Self { body }
    }

    /// Non-JSON bodies are kept as a plain string; an empty body reads as `null`.
    pub fn from_body(bytes: &[u8]) -> Self {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Self::default();
        }
        match serde_json::from_slice(bytes) {
            Ok(body) => Self { body },
            Err(_) => Self {
                body: Value::String(String::from_utf8_lossy(bytes).trim().to_string()),
            },
        }
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn into_body(self) -> Value {
        self.body
    }

    /// The `data` member, or the body itself when the body is a bare array.
    pub fn data(&self) -> Option<&Value> {
        match &self.body {
            Value::Array(_) => Some(&self.body),
            Value::Object(map) => map.get("data").filter(|data| !data.is_null()),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        if self.body.is_array() {
            return true;
        }
        let code_ok = self.body.get("code").is_some_and(is_one);
        let status_ok = self.body.get("status").is_some_and(|status| {
            is_one(status)
                || status.as_str().is_some_and(|text| {
                    let text = text.trim();
                    text.eq_ignore_ascii_case("success") || text.eq_ignore_ascii_case("ok")
                })
        });
        let flag_ok = self.body.get("success").is_some_and(is_truthy);
        let nested_ok = self
            .data()
            .and_then(|data| data.get("success"))
            .is_some_and(is_truthy);
        code_ok || status_ok || flag_ok || nested_ok
    }

    /// `data.token`, then `token`, then a `data` string shaped like a compact JWS.
    pub fn token(&self) -> Option<String> {
        let data = self.data();
        data.and_then(|data| data.get("token"))
            .and_then(non_empty_str)
            .or_else(|| self.body.get("token").and_then(non_empty_str))
            .or_else(|| {
                data.and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|text| looks_like_jws(text))
            })
            .map(str::to_string)
    }

    /// The user from a profile reply. The reply counts when the request
    /// succeeded or `data` is an object; the user is `data` when it is an
    /// object and the body otherwise, minus the envelope markers.
    pub fn profile(&self) -> Option<UserProfile> {
        let candidate = match self.data() {
            Some(data @ Value::Object(_)) => data.clone(),
            _ if self.is_success() => {
                let mut body = self.body.clone();
                if let Value::Object(map) = &mut body {
                    for marker in ENVELOPE_MARKERS {
                        map.remove(marker);
                    }
                }
                body
            }
            _ => return None,
        };
        match serde_json::from_value(candidate) {
            Ok(profile) => Some(profile),
            Err(err) => {
                tracing::warn!("profile payload did not decode: {err}");
                None
            }
        }
    }

    /// Whether the response positively reports a stored resume.
    /// A bare success code says nothing about the resume.
    pub fn resume_indicator(&self) -> bool {
        let data = self.data();
        let flag = |value: Option<&Value>| value.and_then(|v| v.get("hasResume")).is_some_and(is_truthy);
        let uploaded = |value: Option<&Value>, key: &str| {
            value
                .and_then(|v| v.get(key))
                .and_then(Value::as_str)
                .is_some_and(|text| text.trim().eq_ignore_ascii_case("uploaded"))
        };

        flag(Some(&self.body))
            || flag(data)
            || uploaded(Some(&self.body), "resumeStatus")
            || uploaded(Some(&self.body), "status")
            || uploaded(data, "resumeStatus")
            || matches!(data, Some(Value::Bool(true)))
    }

    /// Server-provided explanation, if any: a string `data`, then `message`,
    /// `error`, `details`, then a bare string body.
    pub fn message(&self) -> Option<String> {
        self.data()
            .and_then(non_empty_str)
            .or_else(|| {
                ["message", "error", "details"]
                    .into_iter()
                    .find_map(|key| self.body.get(key).and_then(non_empty_str))
            })
            .or_else(|| non_empty_str(&self.body))
            .map(str::to_string)
    }

    pub fn failure_message(&self, fallback: &str) -> String {
        self.message().unwrap_or_else(|| fallback.to_string())
    }

    /// Items of a list payload. Rows that do not decode are skipped.
    /// `None` when the response carries no list at all.
    pub fn list<T: DeserializeOwned>(&self) -> Option<Vec<T>> {
        let items = self.data()?.as_array()?;
        let mut parsed = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            match serde_json::from_value(item.clone()) {
                Ok(row) => parsed.push(row),
                Err(err) => tracing::warn!(index, "skipping undecodable list row: {err}"),
            }
        }
        Some(parsed)
    }

    /// A single record: `data` when present, otherwise the body itself when
    /// it is an object without envelope markers.
    pub fn record<T: DeserializeOwned>(&self) -> Option<T> {
        let candidate = match self.data() {
            Some(data) => data,
            None if self.body.is_object()
                && self.body.get("code").is_none()
                && self.body.get("status").is_none() =>
            {
                &self.body
            }
            None => return None,
        };
        serde_json::from_value(candidate.clone()).ok()
    }
}

fn is_one(value: &Value) -> bool {
    match value {
        Value::String(text) => text.trim() == "1",
        Value::Number(number) => number.as_i64() == Some(1),
        _ => false,
    }
}

fn non_empty_str(value: &Value) -> Option<&str> {
    value.as_str().map(str::trim).filter(|text| !text.is_empty())
}

fn looks_like_jws(text: &str) -> bool {
    let segments: Vec<&str> = text.split('.').collect();
    segments.len() == 3
        && segments.iter().all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '='))
        })
}
