use crate::cli::{
    Command, DashboardArgs, ExportCommand, HrCommand, IntentsCommand, LogFilter, LoginArgs,
    LogsCommand, ProfileCommand, QuickSendArgs, ResumeCommand, SendArgs,
};
use crate::state::AppState;
use anyhow::{bail, Context};
use chrono::Local;
use pilot_api::{ApiEnvelope, DashboardApi, EmailApi, IntentApi};
use pilot_core::{
    DashboardStats, DashboardSummary, DetailedStats, EmailLogEntry, EmailStatus, HrDetails,
    HrDetailsBatch, IntentCategory, IntentCode, IntentEmailRequest, ProfileUpdate,
    QuickSendRequest, UserProfile,
};
use pilot_reports::{LogQuery, StatusCounts};
use pilot_session::{validate, OtpInput};
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

const MAX_OTP_ATTEMPTS: usize = 3;
const RECENT_ACTIVITY: usize = 5;

pub async fn run(state: &AppState, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Login(args) => login(state, args).await,
        Command::Logout => logout(state).await,
        Command::Whoami => whoami(state),
        Command::Profile(command) => profile(state, command).await,
        Command::Resume(command) => resume(state, command).await,
        Command::Send(args) => send(state, args).await,
        Command::QuickSend(args) => quick_send(state, args).await,
        Command::BulkSend { file } => bulk_send(state, &file).await,
        Command::Hr(HrCommand::Add { file }) => add_hr(state, &file).await,
        Command::Logs(command) => logs(state, command).await,
        Command::Dashboard(args) => dashboard(state, args).await,
        Command::Intents(command) => intents(state, command).await,
    }
}

// ---- Session views ----

async fn login(state: &AppState, args: LoginArgs) -> anyhow::Result<()> {
    if let Some(user) = state.session.current_user().filter(|_| state.session.is_authenticated()) {
        println!("Already signed in as {}. Run `mail-pilot logout` first.", user.email);
        return Ok(());
    }

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let email = match args.email {
        Some(email) => email,
        None => prompt(&mut input, "Email: ").await?,
    };
    let email = validate::email(&email)?;

    let sent = state.session.send_otp(&email).await;
    if !sent.success {
        bail!("{}", sent.message());
    }
    println!("{}", sent.message());

    let mut preset = args.otp;
    let mut otp = OtpInput::new();
    for _ in 0..MAX_OTP_ATTEMPTS {
        let raw = match preset.take() {
            Some(code) => code,
            None => prompt(&mut input, "Enter the 6-digit code (r to resend): ").await?,
        };
        if raw.trim().eq_ignore_ascii_case("r") {
            otp.clear();
            let resent = state.session.send_otp(&email).await;
            println!("{}", resent.message());
            continue;
        }

        let Some(code) = read_code(&mut otp, &raw) else {
            continue;
        };

        let result = state.session.login(&email, &code).await;
        if result.success {
            state.session.settle().await;
            println!("{}", result.message());
            print_user(state.session.current_user().as_ref(), state.session.check_resume_status_sync());
            return Ok(());
        }
        otp.clear();
        println!("{}", result.message());
    }
    bail!("too many failed attempts; run `mail-pilot login` to try again")
}

/// Validates a typed code before it goes through the cell model, so extra
/// digits are rejected instead of cut off.
fn read_code(otp: &mut OtpInput, raw: &str) -> Option<String> {
    otp.clear();
    match validate::otp(raw) {
        Ok(code) => {
            otp.paste(&code);
            otp.value()
        }
        Err(err) => {
            println!("{err}");
            None
        }
    }
}

async fn prompt(input: &mut Lines<BufReader<Stdin>>, label: &str) -> anyhow::Result<String> {
    print!("{label}");
    std::io::stdout().flush()?;
    input
        .next_line()
        .await?
        .context("no input on stdin")
}

async fn logout(state: &AppState) -> anyhow::Result<()> {
    let result = state.session.logout().await;
    println!("{}", result.message());
    Ok(())
}

fn whoami(state: &AppState) -> anyhow::Result<()> {
    require_session(state)?;
    print_user(
        state.session.current_user().as_ref(),
        state.session.check_resume_status_sync(),
    );
    println!("Server:  {}", state.config.api.base_url);
    println!("Config:  {}", state.config_manager.config_path().display());
    Ok(())
}

fn print_user(user: Option<&UserProfile>, has_resume: bool) {
    let Some(user) = user else {
        println!("Signed in (profile not loaded)");
        return;
    };
    match &user.name {
        Some(name) => println!("Signed in as {name} <{}>", user.email),
        None => println!("Signed in as {}", user.email),
    }
    println!(
        "Resume:  {}",
        if has_resume { "on file" } else { "missing, run `mail-pilot resume upload <file>`" }
    );
}

fn require_session(state: &AppState) -> anyhow::Result<()> {
    if !state.session.is_authenticated() {
        bail!("not signed in; run `mail-pilot login` first");
    }
    Ok(())
}

/// Sends are blocked until the backend or the cached profile confirms a resume.
async fn require_resume(state: &AppState) -> anyhow::Result<()> {
    require_session(state)?;
    if !state.session.check_resume_status().await {
        bail!("please upload your resume before sending emails: `mail-pilot resume upload <file>`");
    }
    Ok(())
}

async fn profile(state: &AppState, command: ProfileCommand) -> anyhow::Result<()> {
    require_session(state)?;
    match command {
        ProfileCommand::Show => {
            let user = state.session.current_user().context("no cached profile")?;
            println!("{}", serde_json::to_string_pretty(&user)?);
            Ok(())
        }
        ProfileCommand::Update {
            name,
            email,
            mob_no,
        } => {
            let update = ProfileUpdate {
                name,
                email,
                mob_no,
            };
            report(state.session.update_profile(update).await)
        }
        ProfileCommand::Refresh => report(state.session.refresh_profile().await),
    }
}

async fn resume(state: &AppState, command: ResumeCommand) -> anyhow::Result<()> {
    require_session(state)?;
    match command {
        ResumeCommand::Upload { file } => report(state.session.upload_resume(&file).await),
        ResumeCommand::Status { offline } => {
            let present = if offline {
                state.session.check_resume_status_sync()
            } else {
                state.session.check_resume_status().await
            };
            println!("Resume: {}", if present { "on file" } else { "missing" });
            Ok(())
        }
    }
}

fn report(result: pilot_session::OpResult) -> anyhow::Result<()> {
    if !result.success {
        bail!("{}", result.message());
    }
    println!("{}", result.message());
    Ok(())
}

// ---- Sending ----

async fn send(state: &AppState, args: SendArgs) -> anyhow::Result<()> {
    let request = IntentEmailRequest {
        recipient_email: validate::email(&args.to)?,
        subject: validate::required("Subject", &args.subject)?.to_string(),
        message: validate::required("Message", &args.message)?.to_string(),
        name: args.name,
        company: args.company,
    };
    require_resume(state).await?;

    let envelope = match state.backend.send_intent_email(&request).await {
        Ok(envelope) => envelope,
        Err(err) => {
            tracing::warn!("intent send failed, retrying as a bulk send: {err}");
            state
                .backend
                .send_emails(&request.as_bulk_fallback())
                .await
                .map_err(|err| anyhow::anyhow!(err.user_message()))?
        }
    };
    expect_success(&envelope, "Failed to send email")?;
    println!("Email sent to {}", request.recipient_email);
    Ok(())
}

async fn quick_send(state: &AppState, args: QuickSendArgs) -> anyhow::Result<()> {
    let request = QuickSendRequest {
        recipient_email: validate::email(&args.recipient)?,
        subject: args.subject.filter(|subject| !subject.trim().is_empty()),
        message: args.message.filter(|message| !message.trim().is_empty()),
    };
    require_resume(state).await?;

    let envelope = state
        .backend
        .quick_send(&request)
        .await
        .map_err(|err| anyhow::anyhow!(err.user_message()))?;
    expect_success(&envelope, "Failed to send quick message")?;
    println!("Quick message sent to {}", request.recipient_email);
    Ok(())
}

async fn bulk_send(state: &AppState, file: &Path) -> anyhow::Result<()> {
    let contacts = read_hr_file(file)?;
    require_resume(state).await?;

    let count = contacts.len();
    let envelope = state
        .backend
        .send_emails(&HrDetailsBatch {
            hr_details: contacts,
        })
        .await
        .map_err(|err| anyhow::anyhow!(err.user_message()))?;
    expect_success(&envelope, "Failed to send emails")?;
    println!("Queued {count} email(s)");
    Ok(())
}

async fn add_hr(state: &AppState, file: &Path) -> anyhow::Result<()> {
    require_session(state)?;
    let contacts = read_hr_file(file)?;
    let count = contacts.len();
    let envelope = state
        .backend
        .add_hr_details(&HrDetailsBatch {
            hr_details: contacts,
        })
        .await
        .map_err(|err| anyhow::anyhow!(err.user_message()))?;
    expect_success(&envelope, "Failed to add HR details")?;
    println!("Added {count} contact(s)");
    Ok(())
}

/// Accepts a bare array or `{ "hrDetails": [...] }`; every email must be valid.
fn read_hr_file(path: &Path) -> anyhow::Result<Vec<HrDetails>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read {}", path.display()))?;
    let value: Value =
        serde_json::from_str(&text).with_context(|| format!("parse {}", path.display()))?;
    let contacts: Vec<HrDetails> = if value.is_array() {
        serde_json::from_value(value).context("read contact list")?
    } else {
        serde_json::from_value::<HrDetailsBatch>(value)
            .context("expected an array of contacts or an object with `hrDetails`")?
            .hr_details
    };
    if contacts.is_empty() {
        bail!("{} lists no contacts", path.display());
    }
    contacts
        .into_iter()
        .enumerate()
        .map(|(index, mut contact)| {
            contact.email = validate::email(&contact.email)
                .with_context(|| format!("contact {}", index + 1))?;
            Ok(contact)
        })
        .collect()
}

fn expect_success(envelope: &ApiEnvelope, fallback: &str) -> anyhow::Result<()> {
    if !envelope.is_success() {
        bail!("{}", envelope.failure_message(fallback));
    }
    Ok(())
}

// ---- Email logs ----

async fn fetch_logs(state: &AppState) -> anyhow::Result<Vec<EmailLogEntry>> {
    let envelope = state
        .backend
        .fetch_all_emails()
        .await
        .map_err(|err| anyhow::anyhow!(err.user_message()))?;
    match envelope.list() {
        Some(entries) => Ok(entries),
        None => {
            if !envelope.is_success() {
                bail!("{}", envelope.failure_message("Failed to fetch email logs"));
            }
            Ok(Vec::new())
        }
    }
}

fn log_query(state: &AppState, filter: &LogFilter) -> LogQuery {
    LogQuery {
        search: filter.search.clone().unwrap_or_default(),
        status: filter.status,
        sort: state.config.logs.default_sort,
        descending: true,
        page: 1,
        page_size: state.config.logs.page_size,
    }
}

async fn logs(state: &AppState, command: LogsCommand) -> anyhow::Result<()> {
    require_session(state)?;
    match command {
        LogsCommand::List {
            filter,
            sort,
            asc,
            page,
        } => {
            let entries = fetch_logs(state).await?;
            let query = LogQuery {
                sort: sort.unwrap_or(state.config.logs.default_sort),
                descending: !asc,
                page,
                ..log_query(state, &filter)
            };
            print_log_page(&entries, &query);
            Ok(())
        }
        LogsCommand::Show { id } => show_log(state, &id).await,
        LogsCommand::Delete { id, yes } => delete_log(state, &id, yes).await,
        LogsCommand::Status { id, status } => update_status(state, &id, status).await,
        LogsCommand::Export(ExportCommand::Csv { filter, out }) => {
            let entries = fetch_logs(state).await?;
            let rows: Vec<&EmailLogEntry> = log_query(state, &filter)
                .apply(&entries)
                .into_iter()
                .map(|(_, entry)| entry)
                .collect();
            let path = out.unwrap_or_else(|| {
                PathBuf::from(pilot_reports::csv_file_name(Local::now().date_naive()))
            });
            pilot_reports::write_csv(&path, rows.iter().copied())?;
            println!("Exported {} email(s) to {}", rows.len(), path.display());
            Ok(())
        }
        LogsCommand::Export(ExportCommand::Excel { out }) => {
            let bytes = state
                .backend
                .generate_excel()
                .await
                .map_err(|err| anyhow::anyhow!(err.user_message()))?;
            let path = out.unwrap_or_else(|| {
                PathBuf::from(pilot_reports::excel_file_name(Local::now().date_naive()))
            });
            pilot_reports::save_excel(&path, &bytes)?;
            println!("Saved spreadsheet to {}", path.display());
            Ok(())
        }
    }
}

fn print_log_page(entries: &[EmailLogEntry], query: &LogQuery) {
    if entries.is_empty() {
        println!("No email logs found.");
        return;
    }
    let counts = StatusCounts::from_entries(entries);
    let page = query.page(entries);
    if page.rows.is_empty() {
        println!("No emails match the current search or filter.");
        return;
    }

    println!(
        "{:<10} {:<32} {:<40} {:<20} {}",
        "ID", "RECIPIENT", "SUBJECT", "STATUS", "SENT"
    );
    for (index, entry) in &page.rows {
        println!(
            "{:<10} {:<32} {:<40} {:<20} {}",
            pilot_reports::display_id(entry, *index),
            truncate(&entry.recipient_email, 32),
            truncate(&entry.subject, 40),
            entry.status.label(),
            format_sent_at(entry),
        );
    }

    let window: Vec<String> = page
        .window()
        .into_iter()
        .map(|number| {
            if number == page.page {
                format!("[{number}]")
            } else {
                number.to_string()
            }
        })
        .collect();
    println!();
    println!(
        "Showing {} of {} emails, page {} of {}  {}",
        page.rows.len(),
        page.total_matches,
        page.page,
        page.total_pages.max(1),
        window.join(" ")
    );
    println!(
        "Total {}  sent {}  hired {}  rejected {}",
        counts.total,
        counts.get(EmailStatus::EmailSent),
        counts.get(EmailStatus::Hired),
        counts.get(EmailStatus::Rejected)
    );
}

fn format_sent_at(entry: &EmailLogEntry) -> String {
    entry
        .sent_at
        .map(|at| {
            at.with_timezone(&Local)
                .format("%b %d, %Y %I:%M %p")
                .to_string()
        })
        .unwrap_or_else(|| "-".to_string())
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

/// Resolves `id` against the full log; synthetic `email-N` ids only exist there.
async fn find_log(state: &AppState, id: &str) -> anyhow::Result<EmailLogEntry> {
    let entries = fetch_logs(state).await?;
    pilot_reports::resolve_log(&entries, id)
        .cloned()
        .with_context(|| format!("no email with id {id}"))
}

async fn show_log(state: &AppState, id: &str) -> anyhow::Result<()> {
    let direct = if id.starts_with("email-") {
        None
    } else {
        match state.backend.fetch_email(id).await {
            Ok(envelope) => envelope.record::<EmailLogEntry>(),
            Err(err) => {
                tracing::debug!("direct fetch of {id} failed, searching the full log: {err}");
                None
            }
        }
    };
    let entry = match direct {
        Some(entry) => entry,
        None => find_log(state, id).await?,
    };

    println!("To:       {}", entry.recipient_email);
    println!("Subject:  {}", entry.subject);
    println!("Status:   {}", entry.status.label());
    println!("Sent:     {}", format_sent_at(&entry));
    if let Some(name) = &entry.name {
        println!("Name:     {name}");
    }
    if let Some(company) = &entry.company {
        println!("Company:  {company}");
    }
    if let Some(mobile) = &entry.mob_no {
        println!("Mobile:   {mobile}");
    }
    if let Some(Value::String(body)) = entry.extra.get("message").or_else(|| entry.extra.get("body")) {
        println!();
        println!("{body}");
    }
    Ok(())
}

async fn delete_log(state: &AppState, id: &str, yes: bool) -> anyhow::Result<()> {
    if id.starts_with("email-") {
        bail!("{id} has no server id and cannot be deleted");
    }
    if !yes {
        let mut input = BufReader::new(tokio::io::stdin()).lines();
        let answer = prompt(&mut input, &format!("Delete email {id}? [y/N] ")).await?;
        if !matches!(answer.trim(), "y" | "Y" | "yes") {
            println!("Cancelled");
            return Ok(());
        }
    }
    let envelope = state
        .backend
        .delete_email(id)
        .await
        .map_err(|err| anyhow::anyhow!(err.user_message()))?;
    expect_success(&envelope, "Failed to delete email")?;
    println!("Deleted email {id}");
    Ok(())
}

async fn update_status(state: &AppState, id: &str, status: EmailStatus) -> anyhow::Result<()> {
    let entry = find_log(state, id).await?;
    let batch = HrDetailsBatch {
        hr_details: vec![HrDetails {
            email: entry.recipient_email.clone(),
            mob_no: entry.mob_no.clone().unwrap_or_default(),
            status: Some(status),
            ..HrDetails::default()
        }],
    };
    let envelope = state
        .backend
        .update_email_status(&batch)
        .await
        .map_err(|err| anyhow::anyhow!(err.user_message()))?;
    expect_success(&envelope, "Failed to update status")?;
    println!("{} is now {}", entry.recipient_email, status.label());
    Ok(())
}

// ---- Dashboard ----

async fn dashboard(state: &AppState, args: DashboardArgs) -> anyhow::Result<()> {
    require_session(state)?;

    let (heading, stats, detailed) = match (args.period, args.from.zip(args.to)) {
        (Some(period), _) => {
            let envelope = state.backend.stats_by_period(period).await;
            (period.label().to_string(), stats_or_default(envelope), None)
        }
        (None, Some((from, to))) => {
            let envelope = state.backend.stats_by_range(from, to).await;
            (format!("{from} to {to}"), stats_or_default(envelope), None)
        }
        (None, None) => {
            let summary = match state.backend.dashboard_summary().await {
                Ok(envelope) => envelope.record::<DashboardSummary>().unwrap_or_default(),
                Err(err) => {
                    tracing::warn!("dashboard summary unavailable: {err}");
                    DashboardSummary::default()
                }
            };
            ("Overview".to_string(), summary.dashboard, Some(summary.detailed))
        }
    };

    println!("{heading}");
    println!("  Total emails      {:>8}  {}", stats.total_emails, stats.total_emails_growth);
    println!("  Sent today        {:>8}  {}", stats.sent_today, stats.sent_today_growth);
    println!(
        "  Response rate     {:>7.1}%  {}",
        stats.response_rate, stats.response_rate_growth
    );
    println!(
        "  Active campaigns  {:>8}  {}",
        stats.active_campaigns, stats.active_campaigns_growth
    );

    if let Some(detailed) = detailed {
        print_detailed(&detailed);
    }

    match fetch_logs(state).await {
        Ok(entries) => {
            println!();
            println!("Recent activity");
            let recent = pilot_reports::recent(&entries, RECENT_ACTIVITY);
            if recent.is_empty() {
                println!("  No emails sent yet.");
            }
            for entry in recent {
                println!(
                    "  {:<32} {:<20} {}",
                    truncate(&entry.recipient_email, 32),
                    entry.status.label(),
                    format_sent_at(entry)
                );
            }
        }
        Err(err) => tracing::warn!("recent activity unavailable: {err:#}"),
    }
    Ok(())
}

fn stats_or_default(
    envelope: Result<ApiEnvelope, pilot_api::ApiError>,
) -> DashboardStats {
    match envelope {
        Ok(envelope) => envelope.record().unwrap_or_default(),
        Err(err) => {
            tracing::warn!("dashboard stats unavailable: {err}");
            DashboardStats::default()
        }
    }
}

fn print_detailed(detailed: &DetailedStats) {
    println!();
    println!("Status breakdown");
    let rows = pilot_reports::breakdown(&detailed.status_breakdown);
    if rows.is_empty() {
        println!("  No data yet.");
    }
    for row in rows {
        let label = row
            .status
            .parse::<EmailStatus>()
            .map(|status| status.label().to_string())
            .unwrap_or(row.status);
        println!("  {:<22} {:>6}  {:>3}%", label, row.count, row.percentage);
    }
    println!();
    println!("  Unique companies       {}", detailed.unique_companies);
    println!("  Total responses        {}", detailed.total_responses);
    println!("  Average response time  {}", detailed.average_response_time);
    println!("  Sent this week         {}", detailed.sent_this_week);
    println!("  Sent this month        {}", detailed.sent_this_month);
}

// ---- Intents ----

async fn intents(state: &AppState, command: IntentsCommand) -> anyhow::Result<()> {
    require_session(state)?;
    let map_err = |err: pilot_api::ApiError| anyhow::anyhow!(err.user_message());
    match command {
        IntentsCommand::Categories => {
            let envelope = state.backend.all_categories().await.map_err(map_err)?;
            let categories: Vec<IntentCategory> = envelope.list().unwrap_or_default();
            if categories.is_empty() {
                println!("No categories found.");
            }
            for category in categories {
                println!("{:<16} {}", category.category_code, category.name);
            }
        }
        IntentsCommand::ByCategory { code } => {
            let envelope = state.backend.intents_by_category(&code).await.map_err(map_err)?;
            let intents: Vec<IntentCode> = envelope.list().unwrap_or_default();
            if intents.is_empty() {
                println!("No intents in category {code}.");
            }
            for intent in intents {
                println!(
                    "{:<16} {}",
                    intent.intent_code,
                    intent.subject.as_deref().unwrap_or_default()
                );
            }
        }
        IntentsCommand::Show { code } => {
            let envelope = state.backend.fetch_intent_code(&code).await.map_err(map_err)?;
            let intent: IntentCode = envelope
                .record()
                .with_context(|| envelope.failure_message("Intent not found"))?;
            println!("{}", serde_json::to_string_pretty(&intent)?);
        }
        IntentsCommand::CreateCategory { json } => {
            let body = parse_object(&json)?;
            let envelope = state.backend.create_category(&body).await.map_err(map_err)?;
            expect_success(&envelope, "Failed to create category")?;
            println!("Category created");
        }
        IntentsCommand::CreateCode { json } => {
            let body = parse_object(&json)?;
            let envelope = state.backend.create_intent_code(&body).await.map_err(map_err)?;
            expect_success(&envelope, "Failed to create intent code")?;
            println!("Intent code created");
        }
    }
    Ok(())
}

fn parse_object(json: &str) -> anyhow::Result<Value> {
    let value: Value = serde_json::from_str(json).context("parse JSON argument")?;
    if !value.is_object() {
        bail!("expected a JSON object");
    }
    Ok(value)
}
