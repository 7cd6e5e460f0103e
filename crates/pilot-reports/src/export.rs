use crate::ReportError;
use chrono::{NaiveDate, SecondsFormat};
use pilot_core::EmailLogEntry;
use std::fs;
use std::path::Path;

pub const CSV_HEADER: &str = "Recipient Email,Subject,Status,Date & Time,Name,Company,Mobile";

pub fn csv_file_name(date: NaiveDate) -> String {
    format!("email_logs_{}.csv", date.format("%Y-%m-%d"))
}

pub fn excel_file_name(date: NaiveDate) -> String {
    format!("email_logs_{}.xlsx", date.format("%Y-%m-%d"))
}

/// Every field is quoted; embedded quotes are doubled.
pub fn to_csv<'a>(entries: impl IntoIterator<Item = &'a EmailLogEntry>) -> String {
    let mut lines = vec![CSV_HEADER.to_string()];
    for entry in entries {
        let sent_at = entry
            .sent_at
            .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_default();
        let fields = [
            entry.recipient_email.as_str(),
            entry.subject.as_str(),
            entry.status.as_api_str(),
            sent_at.as_str(),
            entry.name.as_deref().unwrap_or_default(),
            entry.company.as_deref().unwrap_or_default(),
            entry.mob_no.as_deref().unwrap_or_default(),
        ];
        let row: Vec<String> = fields.iter().map(|field| quote(field)).collect();
        lines.push(row.join(","));
    }
    lines.join("\n")
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

pub fn write_csv<'a>(
    path: &Path,
    entries: impl IntoIterator<Item = &'a EmailLogEntry>,
) -> Result<(), ReportError> {
    write_file(path, to_csv(entries).as_bytes())?;
    tracing::info!(path = %path.display(), "csv report written");
    Ok(())
}

/// Saves the server-built spreadsheet as-is. A JSON error body that slipped
/// through with a success status is reported instead of being saved.
pub fn save_excel(path: &Path, bytes: &[u8]) -> Result<(), ReportError> {
    if bytes.is_empty() {
        return Err(ReportError::Data("the spreadsheet is empty".to_string()));
    }
    if let Some(message) = json_error(bytes) {
        return Err(ReportError::Data(message));
    }
    write_file(path, bytes)?;
    tracing::info!(path = %path.display(), len = bytes.len(), "excel report written");
    Ok(())
}

fn json_error(bytes: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(bytes).ok()?;
    ["message", "data", "error"]
        .into_iter()
        .find_map(|key| value.get(key).and_then(serde_json::Value::as_str))
        .map(str::to_string)
        .or_else(|| Some("Excel generation failed".to_string()))
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), ReportError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilot_core::{parse_timestamp, EmailStatus};
    use std::collections::BTreeMap;

    fn log() -> EmailLogEntry {
        EmailLogEntry {
            id: "1".to_string(),
            recipient_email: "hr@acme.io".to_string(),
            subject: "Re: \"Senior\" role, remote".to_string(),
            status: EmailStatus::InterviewScheduled,
            sent_at: parse_timestamp("2024-05-02T09:30:00"),
            name: Some("Dana".to_string()),
            company: None,
            mob_no: Some("555".to_string()),
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn csv_quotes_every_field() {
        let entry = log();
        let csv = to_csv([&entry]);
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some(CSV_HEADER));
        assert_eq!(
            lines.next(),
            Some(
                "\"hr@acme.io\",\"Re: \"\"Senior\"\" role, remote\",\"Interview_Scheduled\",\
                 \"2024-05-02T09:30:00Z\",\"Dana\",\"\",\"555\""
            )
        );
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn default_names_carry_the_date() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 2).expect("date");
        assert_eq!(csv_file_name(date), "email_logs_2024-05-02.csv");
        assert_eq!(excel_file_name(date), "email_logs_2024-05-02.xlsx");
    }

    #[test]
    fn excel_bytes_are_saved_verbatim() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out/report.xlsx");
        let bytes = b"PK\x03\x04rest-of-zip";

        save_excel(&path, bytes).expect("save");
        assert_eq!(fs::read(&path).expect("read"), bytes);
    }

    #[test]
    fn excel_json_error_is_not_saved() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("report.xlsx");

        let err = save_excel(&path, br#"{"code":"0","message":"No emails found"}"#)
            .expect_err("json body");
        assert_eq!(err.to_string(), "report error: No emails found");
        assert!(!path.exists());
        assert!(save_excel(&path, b"").is_err());
    }

    #[test]
    fn csv_file_is_written() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("logs.csv");
        let entry = log();
        write_csv(&path, [&entry]).expect("write");
        let text = fs::read_to_string(&path).expect("read");
        assert!(text.starts_with(CSV_HEADER));
    }
}
