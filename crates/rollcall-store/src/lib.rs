//! rollcall-store — Persistent students, attendance, and sessions.
//!
//! SQLite is the source of truth for "marked today": the
//! `UNIQUE(student_id, date)` constraint makes marking idempotent no
//! matter how many processes or restarts touch the same file.

pub mod error;
pub mod export;
pub mod models;
pub mod recorder;
pub mod schema;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use export::{build_workbook, record_row, write_csv, write_json, write_records, write_xlsx, ExportFormat, HEADERS};
pub use models::{
    AttendanceMark, AttendanceRecord, AttendanceStats, DailyCount, NewStudent, SessionRecord,
    Student, StudentUpdate,
};
pub use recorder::SqliteRecorder;
pub use store::AttendanceStore;
