//! Field checks that run before any network call.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

pub const OTP_LEN: usize = 6;

/// Largest resume the backend accepts.
pub const MAX_RESUME_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("Email is required")]
    EmailRequired,
    #[error("Please enter a valid email address")]
    EmailInvalid,
    #[error("OTP is required")]
    OtpRequired,
    #[error("OTP must be 6 digits")]
    OtpLength,
    #[error("No resume file found at {}", .0.display())]
    FileMissing(PathBuf),
    #[error("Unsupported resume type `{0}`: upload a PDF, DOC or DOCX file")]
    FileType(String),
    #[error("Resume is {} MB; the limit is 5 MB", megabytes(.0))]
    FileTooLarge(u64),
    #[error("{0} is required")]
    Required(&'static str),
}

fn megabytes(len: &u64) -> String {
    format!("{:.1}", *len as f64 / (1024.0 * 1024.0))
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"))
}

/// Returns the trimmed address.
pub fn email(raw: &str) -> Result<String, FieldError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(FieldError::EmailRequired);
    }
    if !email_pattern().is_match(trimmed) {
        return Err(FieldError::EmailInvalid);
    }
    Ok(trimmed.to_string())
}

/// Returns the six digits with whitespace removed.
pub fn otp(raw: &str) -> Result<String, FieldError> {
    let code: String = raw.chars().filter(|ch| !ch.is_whitespace()).collect();
    if code.is_empty() {
        return Err(FieldError::OtpRequired);
    }
    if code.len() != OTP_LEN || !code.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(FieldError::OtpLength);
    }
    Ok(code)
}

pub fn required<'a>(field: &'static str, value: &'a str) -> Result<&'a str, FieldError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(FieldError::Required(field));
    }
    Ok(trimmed)
}

/// A resume that passed the local checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeFile {
    pub path: PathBuf,
    pub file_name: String,
    pub mime_type: &'static str,
    pub len: u64,
}

pub fn resume_mime_type(path: &Path) -> Result<&'static str, FieldError> {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => Ok("application/pdf"),
        "doc" => Ok("application/msword"),
        "docx" => Ok("application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
        _ => Err(FieldError::FileType(ext)),
    }
}

pub fn resume_file(path: &Path) -> Result<ResumeFile, FieldError> {
    let mime_type = resume_mime_type(path)?;
    let metadata = std::fs::metadata(path)
        .ok()
        .filter(|metadata| metadata.is_file())
        .ok_or_else(|| FieldError::FileMissing(path.to_path_buf()))?;
    if metadata.len() > MAX_RESUME_BYTES {
        return Err(FieldError::FileTooLarge(metadata.len()));
    }
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("resume")
        .to_string();
    Ok(ResumeFile {
        path: path.to_path_buf(),
        file_name,
        mime_type,
        len: metadata.len(),
    })
}
