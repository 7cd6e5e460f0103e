use crate::{ApiEnvelope, ApiError};
use async_trait::async_trait;
use chrono::NaiveDate;
use pilot_core::{
    HrDetailsBatch, IntentEmailRequest, ProfileUpdate, QuickSendRequest, StatsPeriod,
};
use reqwest::{header, Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use url::Url;

/// Shared slot holding the bearer token attached to authenticated requests.
///
/// The session controller is the only writer; the HTTP backend reads it on
/// every request.
#[derive(Clone, Default)]
pub struct BearerToken {
    inner: Arc<RwLock<Option<String>>>,
}

impl BearerToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, token: Option<String>) {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = token;
    }

    pub fn get(&self) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_set(&self) -> bool {
        self.get().is_some()
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerToken")
            .field("token", &self.get().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub base_url: Url,
    pub timeout: Option<Duration>,
    pub user_agent: String,
}

/// A resume file ready for the multipart upload.
#[derive(Clone)]
pub struct ResumeUpload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for ResumeUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResumeUpload")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn send_otp(&self, email: &str) -> Result<ApiEnvelope, ApiError>;

    async fn verify_otp(&self, email: &str, otp: &str) -> Result<ApiEnvelope, ApiError>;

    /// Server-side invalidation of the current bearer token.
    async fn logout(&self) -> Result<ApiEnvelope, ApiError>;
}

#[async_trait]
pub trait UserApi: Send + Sync {
    async fn get_profile(&self) -> Result<ApiEnvelope, ApiError>;

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<ApiEnvelope, ApiError>;

    async fn upload_resume(&self, upload: ResumeUpload) -> Result<ApiEnvelope, ApiError>;

    async fn resume_status(&self) -> Result<ApiEnvelope, ApiError>;
}

/// Everything the session controller talks to.
pub trait AccountApi: AuthApi + UserApi {}

impl<T: AuthApi + UserApi> AccountApi for T {}

#[async_trait]
pub trait EmailApi: Send + Sync {
    async fn send_emails(&self, batch: &HrDetailsBatch) -> Result<ApiEnvelope, ApiError>;

    async fn send_intent_email(&self, request: &IntentEmailRequest)
        -> Result<ApiEnvelope, ApiError>;

    async fn quick_send(&self, request: &QuickSendRequest) -> Result<ApiEnvelope, ApiError>;

    async fn fetch_all_emails(&self) -> Result<ApiEnvelope, ApiError>;

    async fn fetch_email(&self, id: &str) -> Result<ApiEnvelope, ApiError>;

    async fn delete_email(&self, id: &str) -> Result<ApiEnvelope, ApiError>;

    async fn update_email_status(&self, batch: &HrDetailsBatch) -> Result<ApiEnvelope, ApiError>;

    async fn add_hr_details(&self, batch: &HrDetailsBatch) -> Result<ApiEnvelope, ApiError>;

    /// Raw spreadsheet bytes of every log entry.
    async fn generate_excel(&self) -> Result<Vec<u8>, ApiError>;
}

#[async_trait]
pub trait DashboardApi: Send + Sync {
    async fn dashboard_stats(&self) -> Result<ApiEnvelope, ApiError>;

    async fn detailed_stats(&self) -> Result<ApiEnvelope, ApiError>;

    async fn stats_by_range(&self, start: NaiveDate, end: NaiveDate)
        -> Result<ApiEnvelope, ApiError>;

    async fn stats_by_period(&self, period: StatsPeriod) -> Result<ApiEnvelope, ApiError>;

    async fn dashboard_summary(&self) -> Result<ApiEnvelope, ApiError>;

    async fn quick_stats(&self) -> Result<ApiEnvelope, ApiError>;
}

#[async_trait]
pub trait IntentApi: Send + Sync {
    async fn create_category(&self, category: &Value) -> Result<ApiEnvelope, ApiError>;

    async fn create_intent_code(&self, intent: &Value) -> Result<ApiEnvelope, ApiError>;

    async fn all_categories(&self) -> Result<ApiEnvelope, ApiError>;

    async fn intents_by_category(&self, category_code: &str) -> Result<ApiEnvelope, ApiError>;

    async fn fetch_intent_code(&self, intent_code: &str) -> Result<ApiEnvelope, ApiError>;
}

/// REST client for the Mail Pilot backend.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: Url,
    bearer: BearerToken,
}

impl HttpBackend {
    pub fn new(settings: &HttpSettings, bearer: BearerToken) -> Result<Self, ApiError> {
        let mut builder = reqwest::Client::builder().user_agent(settings.user_agent.clone());
        if let Some(timeout) = settings.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
            base_url: settings.base_url.clone(),
            bearer,
        })
    }

    pub fn bearer(&self) -> &BearerToken {
        &self.bearer
    }

    /// `path` is absolute below the base URL; the backend mixes `/api/...`
    /// routes with unprefixed ones.
    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{}", path.trim_start_matches('/')))?)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.http.request(method, url);
        match self.bearer.get() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn call(&self, method: Method, path: &str) -> Result<ApiEnvelope, ApiError> {
        let url = self.endpoint(path)?;
        self.execute(method.clone(), path, self.request(method, url)).await
    }

    async fn call_json<B: Serialize + ?Sized + Sync>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<ApiEnvelope, ApiError> {
        let url = self.endpoint(path)?;
        let request = self.request(method.clone(), url).json(body);
        self.execute(method, path, request).await
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        request: RequestBuilder,
    ) -> Result<ApiEnvelope, ApiError> {
        tracing::debug!(%method, path, authorized = self.bearer.is_set(), "api request");
        let response = request
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| {
                tracing::warn!(%method, path, "api request failed: {err}");
                ApiError::Http(err)
            })?;
        let status = response.status();
        let body = response.bytes().await?;
        let envelope = ApiEnvelope::from_body(&body);
        tracing::debug!(%method, path, status = status.as_u16(), "api response");
        check_status(status, envelope)
    }
}

fn check_status(status: StatusCode, envelope: ApiEnvelope) -> Result<ApiEnvelope, ApiError> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ApiError::Unauthorized {
            message: envelope.failure_message("Your session has expired. Please sign in again."),
        });
    }
    if !status.is_success() {
        return Err(ApiError::Status {
            status: status.as_u16(),
            message: envelope.failure_message(
                status
                    .canonical_reason()
                    .unwrap_or("The server rejected the request."),
            ),
        });
    }
    Ok(envelope)
}

#[async_trait]
impl AuthApi for HttpBackend {
    async fn send_otp(&self, email: &str) -> Result<ApiEnvelope, ApiError> {
        self.call_json(Method::POST, "/api/auth/send-otp", &json!({ "email": email }))
            .await
    }

    async fn verify_otp(&self, email: &str, otp: &str) -> Result<ApiEnvelope, ApiError> {
        self.call_json(
            Method::POST,
            "/api/auth/verify-otp",
            &json!({ "email": email, "otp": otp }),
        )
        .await
    }

    async fn logout(&self) -> Result<ApiEnvelope, ApiError> {
        self.call(Method::PUT, "/api/user/logout").await
    }
}

#[async_trait]
impl UserApi for HttpBackend {
    async fn get_profile(&self) -> Result<ApiEnvelope, ApiError> {
        self.call(Method::GET, "/api/user/profile").await
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<ApiEnvelope, ApiError> {
        self.call_json(Method::PUT, "/api/user/profile/update", update).await
    }

    async fn upload_resume(&self, upload: ResumeUpload) -> Result<ApiEnvelope, ApiError> {
        let path = "/resume/upload";
        let part = reqwest::multipart::Part::bytes(upload.bytes)
            .file_name(upload.file_name)
            .mime_str(&upload.mime_type)?;
        let form = reqwest::multipart::Form::new().part("file", part);
        let request = self.request(Method::POST, self.endpoint(path)?).multipart(form);
        self.execute(Method::POST, path, request).await
    }

    async fn resume_status(&self) -> Result<ApiEnvelope, ApiError> {
        self.call(Method::GET, "/resume/status").await
    }
}

#[async_trait]
impl EmailApi for HttpBackend {
    async fn send_emails(&self, batch: &HrDetailsBatch) -> Result<ApiEnvelope, ApiError> {
        self.call_json(Method::POST, "/email/send", batch).await
    }

    async fn send_intent_email(
        &self,
        request: &IntentEmailRequest,
    ) -> Result<ApiEnvelope, ApiError> {
        self.call_json(Method::POST, "/email/send/intent-email", request)
            .await
    }

    async fn quick_send(&self, request: &QuickSendRequest) -> Result<ApiEnvelope, ApiError> {
        self.call_json(Method::POST, "/email/quick-send", request).await
    }

    async fn fetch_all_emails(&self) -> Result<ApiEnvelope, ApiError> {
        self.call(Method::GET, "/email/fetch/all").await
    }

    async fn fetch_email(&self, id: &str) -> Result<ApiEnvelope, ApiError> {
        self.call(Method::GET, &format!("/email/fetch/{}", encode_segment(id)))
            .await
    }

    async fn delete_email(&self, id: &str) -> Result<ApiEnvelope, ApiError> {
        self.call(Method::DELETE, &format!("/email/delete/{}", encode_segment(id)))
            .await
    }

    async fn update_email_status(&self, batch: &HrDetailsBatch) -> Result<ApiEnvelope, ApiError> {
        self.call_json(Method::PUT, "/email/update/status", batch).await
    }

    async fn add_hr_details(&self, batch: &HrDetailsBatch) -> Result<ApiEnvelope, ApiError> {
        self.call_json(Method::POST, "/email/add/hrDetails", batch)
            .await
    }

    async fn generate_excel(&self) -> Result<Vec<u8>, ApiError> {
        let path = "/email/generate/excel";
        let request = self
            .request(Method::GET, self.endpoint(path)?)
            .header(
                header::ACCEPT,
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            );
        tracing::debug!(path, "api request");
        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            check_status(status, ApiEnvelope::from_body(&body))?;
        }
        if body.is_empty() {
            return Err(ApiError::Data("the server returned an empty spreadsheet".to_string()));
        }
        Ok(body.to_vec())
    }
}

#[async_trait]
impl DashboardApi for HttpBackend {
    async fn dashboard_stats(&self) -> Result<ApiEnvelope, ApiError> {
        self.call(Method::GET, "/api/dashboard/stats").await
    }

    async fn detailed_stats(&self) -> Result<ApiEnvelope, ApiError> {
        self.call(Method::GET, "/api/dashboard/stats/detailed").await
    }

    async fn stats_by_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<ApiEnvelope, ApiError> {
        let path = "/api/dashboard/stats/range";
        let mut url = self.endpoint(path)?;
        url.query_pairs_mut()
            .append_pair("startDate", &start.format("%Y-%m-%d").to_string())
            .append_pair("endDate", &end.format("%Y-%m-%d").to_string());
        self.execute(Method::GET, path, self.request(Method::GET, url))
            .await
    }

    async fn stats_by_period(&self, period: StatsPeriod) -> Result<ApiEnvelope, ApiError> {
        self.call(Method::GET, &format!("/api/dashboard/stats/period/{}", period.as_str()))
            .await
    }

    async fn dashboard_summary(&self) -> Result<ApiEnvelope, ApiError> {
        self.call(Method::GET, "/api/dashboard/summary").await
    }

    async fn quick_stats(&self) -> Result<ApiEnvelope, ApiError> {
        self.call(Method::GET, "/api/dashboard/quick-stats").await
    }
}

#[async_trait]
impl IntentApi for HttpBackend {
    async fn create_category(&self, category: &Value) -> Result<ApiEnvelope, ApiError> {
        self.call_json(Method::POST, "/create/category", category).await
    }

    async fn create_intent_code(&self, intent: &Value) -> Result<ApiEnvelope, ApiError> {
        self.call_json(Method::POST, "/create/intent-code", intent).await
    }

    async fn all_categories(&self) -> Result<ApiEnvelope, ApiError> {
        self.call(Method::GET, "/fetch/category/all").await
    }

    async fn intents_by_category(&self, category_code: &str) -> Result<ApiEnvelope, ApiError> {
        self.call(
            Method::GET,
            &format!("/fetch/intents/byCategoryCode/{}", encode_segment(category_code)),
        )
        .await
    }

    async fn fetch_intent_code(&self, intent_code: &str) -> Result<ApiEnvelope, ApiError> {
        self.call(
            Method::GET,
            &format!("/fetch/intentCode/{}", encode_segment(intent_code)),
        )
        .await
    }
}

/// Percent-encodes a single path segment.
fn encode_segment(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
