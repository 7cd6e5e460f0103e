mod backend;
mod envelope;
mod error;

pub use backend::{
    AccountApi, AuthApi, BearerToken, DashboardApi, EmailApi, HttpBackend, HttpSettings,
    IntentApi, ResumeUpload, UserApi,
};
pub use envelope::ApiEnvelope;
pub use error::ApiError;
