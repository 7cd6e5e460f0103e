use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use pilot_core::{EmailStatus, LogSortField, StatsPeriod};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mail-pilot")]
#[command(version)]
#[command(about = "Send and track job-application emails through the Mail Pilot service")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase log output on stderr (-v debug, -vv trace). RUST_LOG wins when set.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sign in with a one-time code sent to your email
    Login(LoginArgs),
    /// Sign out and forget the stored session
    Logout,
    /// Show the signed-in user and whether a resume is on file
    Whoami,
    /// View or edit your profile
    #[command(subcommand)]
    Profile(ProfileCommand),
    /// Upload your resume or check its status
    #[command(subcommand)]
    Resume(ResumeCommand),
    /// Send a custom email to one recipient
    Send(SendArgs),
    /// Send the standard application email to one recipient
    QuickSend(QuickSendArgs),
    /// Send to every HR contact listed in a JSON file
    BulkSend {
        /// JSON array of contacts, or an object with an `hrDetails` array
        file: PathBuf,
    },
    /// Manage HR contacts
    #[command(subcommand)]
    Hr(HrCommand),
    /// Browse, update and export the email log
    #[command(subcommand)]
    Logs(LogsCommand),
    /// Summary cards, status breakdown and recent activity
    Dashboard(DashboardArgs),
    /// Browse the intent template catalogue
    #[command(subcommand)]
    Intents(IntentsCommand),
}

#[derive(Args, Debug)]
pub struct LoginArgs {
    #[arg(long)]
    pub email: Option<String>,
    /// Skip the prompt and use this code for the first attempt
    #[arg(long)]
    pub otp: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum ProfileCommand {
    Show,
    Update {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long = "mobile")]
        mob_no: Option<String>,
    },
    /// Re-read the profile from the server
    Refresh,
}

#[derive(Subcommand, Debug)]
pub enum ResumeCommand {
    /// Upload a PDF, DOC or DOCX file (5 MB max)
    Upload { file: PathBuf },
    Status {
        /// Answer from the cached profile without asking the server
        #[arg(long)]
        offline: bool,
    },
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[arg(long)]
    pub to: String,
    #[arg(long)]
    pub subject: String,
    #[arg(long)]
    pub message: String,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub company: Option<String>,
}

#[derive(Args, Debug)]
pub struct QuickSendArgs {
    pub recipient: String,
    #[arg(long)]
    pub subject: Option<String>,
    #[arg(long)]
    pub message: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum HrCommand {
    /// Register contacts from a JSON file without sending
    Add { file: PathBuf },
}

#[derive(Args, Debug, Clone, Default)]
pub struct LogFilter {
    /// Match recipient or subject, ignoring case
    #[arg(long)]
    pub search: Option<String>,
    /// Only this status (code or label, e.g. HIRED or "Interview Scheduled")
    #[arg(long)]
    pub status: Option<EmailStatus>,
}

#[derive(Subcommand, Debug)]
pub enum LogsCommand {
    List {
        #[command(flatten)]
        filter: LogFilter,
        /// sent_at, recipient, subject or status
        #[arg(long)]
        sort: Option<LogSortField>,
        /// Oldest or A-Z first
        #[arg(long)]
        asc: bool,
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    Show { id: String },
    Delete {
        id: String,
        /// Do not ask for confirmation
        #[arg(long)]
        yes: bool,
    },
    /// Set the status of one entry
    Status { id: String, status: EmailStatus },
    #[command(subcommand)]
    Export(ExportCommand),
}

#[derive(Subcommand, Debug)]
pub enum ExportCommand {
    /// Filtered log as CSV
    Csv {
        #[command(flatten)]
        filter: LogFilter,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Server-built spreadsheet of the whole log
    Excel {
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
pub struct DashboardArgs {
    #[arg(long, conflicts_with_all = ["from", "to"])]
    pub period: Option<StatsPeriod>,
    #[arg(long, requires = "to")]
    pub from: Option<NaiveDate>,
    #[arg(long, requires = "from")]
    pub to: Option<NaiveDate>,
}

#[derive(Subcommand, Debug)]
pub enum IntentsCommand {
    Categories,
    ByCategory { code: String },
    Show { code: String },
    /// Create a category from a JSON object
    CreateCategory { json: String },
    /// Create an intent code from a JSON object
    CreateCode { json: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_requires_subcommand() {
        let err = match Cli::try_parse_from(["mail-pilot"]) {
            Ok(_) => panic!("expected missing subcommand parse error"),
            Err(err) => err,
        };
        assert_eq!(
            err.kind(),
            ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
        );
    }

    #[test]
    fn logs_list_parses_filters() {
        let cli = Cli::try_parse_from([
            "mail-pilot",
            "logs",
            "list",
            "--status",
            "interview scheduled",
            "--sort",
            "recipient",
            "--page",
            "3",
            "-v",
        ])
        .expect("parse");
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Command::Logs(LogsCommand::List {
                filter,
                sort,
                asc,
                page,
            }) => {
                assert_eq!(filter.status, Some(EmailStatus::InterviewScheduled));
                assert_eq!(sort, Some(LogSortField::Recipient));
                assert!(!asc);
                assert_eq!(page, 3);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        let err = Cli::try_parse_from(["mail-pilot", "logs", "status", "7", "bounced"])
            .expect_err("invalid status");
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn dashboard_range_needs_both_ends() {
        let err = Cli::try_parse_from(["mail-pilot", "dashboard", "--from", "2024-01-01"])
            .expect_err("missing --to");
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);

        let cli = Cli::try_parse_from(["mail-pilot", "dashboard", "--period", "week"])
            .expect("parse");
        match cli.command {
            Command::Dashboard(args) => assert_eq!(args.period, Some(StatsPeriod::Week)),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn send_requires_subject_and_message() {
        let err = Cli::try_parse_from(["mail-pilot", "send", "--to", "hr@acme.io"])
            .expect_err("missing fields");
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }
}
