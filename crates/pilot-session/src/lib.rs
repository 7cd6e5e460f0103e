mod controller;
mod otp;
pub mod validate;

pub use controller::{AuthController, OpResult, SessionPhase, SessionSnapshot};
pub use otp::OtpInput;
pub use validate::{FieldError, ResumeFile, MAX_RESUME_BYTES, OTP_LEN};
