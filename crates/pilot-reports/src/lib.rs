mod error;
mod export;
mod logs;

pub use error::ReportError;
pub use export::{csv_file_name, excel_file_name, save_excel, to_csv, write_csv, CSV_HEADER};
pub use logs::{
    breakdown, display_id, page_window, recent, resolve_log, BreakdownRow, LogPage, LogQuery,
    StatusCounts, PAGE_WINDOW,
};
