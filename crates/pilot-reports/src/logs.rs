//! Email-log table logic: search, status filter, sorting, pagination and
//! the dashboard's status breakdown.

use pilot_core::{EmailLogEntry, EmailStatus, LogSortField};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// How many page numbers the pager shows at once.
pub const PAGE_WINDOW: usize = 5;

/// Prefix of the ids given to rows the backend returned without one.
const SYNTHETIC_ID_PREFIX: &str = "email-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub search: String,
    /// `None` means every status.
    pub status: Option<EmailStatus>,
    pub sort: LogSortField,
    pub descending: bool,
    pub page: usize,
    pub page_size: usize,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            search: String::new(),
            status: None,
            sort: LogSortField::SentAt,
            descending: true,
            page: 1,
            page_size: 10,
        }
    }
}

impl LogQuery {
    pub fn matches(&self, entry: &EmailLogEntry) -> bool {
        let needle = self.search.trim().to_lowercase();
        let search_ok = needle.is_empty()
            || entry.recipient_email.to_lowercase().contains(&needle)
            || entry.subject.to_lowercase().contains(&needle);
        let status_ok = self.status.map_or(true, |status| entry.status == status);
        search_ok && status_ok
    }

    /// Matching rows in display order, paired with their index in `entries`.
    pub fn apply<'a>(&self, entries: &'a [EmailLogEntry]) -> Vec<(usize, &'a EmailLogEntry)> {
        let mut rows: Vec<(usize, &EmailLogEntry)> = entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| self.matches(entry))
            .collect();
        rows.sort_by(|(_, a), (_, b)| {
            let ordering = compare(self.sort, a, b);
            if self.descending {
                ordering.reverse()
            } else {
                ordering
            }
        });
        rows
    }

    pub fn page<'a>(&self, entries: &'a [EmailLogEntry]) -> LogPage<'a> {
        LogPage::new(self.apply(entries), self.page, self.page_size)
    }
}

fn compare(field: LogSortField, a: &EmailLogEntry, b: &EmailLogEntry) -> Ordering {
    match field {
        // Rows without a timestamp sort as the oldest.
        LogSortField::SentAt => a.sent_at.cmp(&b.sent_at),
        LogSortField::Recipient => a
            .recipient_email
            .to_lowercase()
            .cmp(&b.recipient_email.to_lowercase()),
        LogSortField::Subject => a.subject.to_lowercase().cmp(&b.subject.to_lowercase()),
        LogSortField::Status => a.status.label().cmp(b.status.label()),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogPage<'a> {
    pub rows: Vec<(usize, &'a EmailLogEntry)>,
    pub page: usize,
    pub total_pages: usize,
    pub total_matches: usize,
}

impl<'a> LogPage<'a> {
    /// `page` is clamped into `1..=max(total_pages, 1)`.
    pub fn new(matches: Vec<(usize, &'a EmailLogEntry)>, page: usize, page_size: usize) -> Self {
        let page_size = page_size.max(1);
        let total_matches = matches.len();
        let total_pages = total_matches.div_ceil(page_size);
        let page = page.clamp(1, total_pages.max(1));
        let rows = matches
            .into_iter()
            .skip((page - 1) * page_size)
            .take(page_size)
            .collect();
        Self {
            rows,
            page,
            total_pages,
            total_matches,
        }
    }

    pub fn window(&self) -> Vec<usize> {
        page_window(self.page, self.total_pages)
    }
}

/// Up to [`PAGE_WINDOW`] page numbers around `current`: the first five near
/// the start, the last five near the end, centred otherwise.
pub fn page_window(current: usize, total_pages: usize) -> Vec<usize> {
    if total_pages <= PAGE_WINDOW {
        return (1..=total_pages).collect();
    }
    let half = PAGE_WINDOW / 2;
    let first = if current <= half + 1 {
        1
    } else if current + half >= total_pages {
        total_pages + 1 - PAGE_WINDOW
    } else {
        current - half
    };
    (first..first + PAGE_WINDOW).collect()
}

/// The id shown for a row; rows without one get `email-{index}`.
pub fn display_id(entry: &EmailLogEntry, index: usize) -> String {
    if entry.id.trim().is_empty() {
        format!("{SYNTHETIC_ID_PREFIX}{index}")
    } else {
        entry.id.clone()
    }
}

/// Finds a row by its displayed id, including synthetic `email-{index}` ids.
pub fn resolve_log<'a>(entries: &'a [EmailLogEntry], id: &str) -> Option<&'a EmailLogEntry> {
    let id = id.trim();
    if let Some(found) = entries.iter().find(|entry| !entry.id.is_empty() && entry.id == id) {
        return Some(found);
    }
    let index: usize = id.strip_prefix(SYNTHETIC_ID_PREFIX)?.parse().ok()?;
    entries.get(index).filter(|entry| entry.id.trim().is_empty())
}

/// The most recently sent rows, newest first.
pub fn recent(entries: &[EmailLogEntry], limit: usize) -> Vec<&EmailLogEntry> {
    let mut rows: Vec<&EmailLogEntry> = entries.iter().collect();
    rows.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
    rows.truncate(limit);
    rows
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusCounts {
    pub total: usize,
    pub by_status: BTreeMap<EmailStatus, usize>,
}

impl StatusCounts {
    pub fn from_entries(entries: &[EmailLogEntry]) -> Self {
        let mut counts = Self::default();
        for entry in entries {
            counts.total += 1;
            *counts.by_status.entry(entry.status).or_default() += 1;
        }
        counts
    }

    pub fn get(&self, status: EmailStatus) -> usize {
        self.by_status.get(&status).copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakdownRow {
    pub status: String,
    pub count: u64,
    pub percentage: u64,
}

/// Share of each status in the total, rounded to whole percent.
pub fn breakdown(status_breakdown: &BTreeMap<String, u64>) -> Vec<BreakdownRow> {
    let total: u64 = status_breakdown.values().sum();
    status_breakdown
        .iter()
        .map(|(status, count)| BreakdownRow {
            status: status.clone(),
            count: *count,
            percentage: if total == 0 {
                0
            } else {
                (*count as f64 / total as f64 * 100.0).round() as u64
            },
        })
        .collect()
}
