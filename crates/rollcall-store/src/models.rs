use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rollcall_core::AttendanceStatus;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Student {
    pub student_id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub department: Option<String>,
    pub batch: Option<String>,
    pub registered_at: String,
    pub active: bool,
}

/// Fields for registering a student.
#[derive(Debug, Clone, Default)]
pub struct NewStudent {
    pub student_id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub department: Option<String>,
    pub batch: Option<String>,
}

/// Partial update; `None` leaves the column unchanged.
#[derive(Debug, Clone, Default)]
pub struct StudentUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub department: Option<String>,
    pub batch: Option<String>,
}

impl StudentUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.department.is_none()
            && self.batch.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceRecord {
    pub student_id: String,
    pub name: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub status: AttendanceStatus,
    pub confidence: Option<f32>,
    pub late_minutes: i64,
    pub session_id: Option<String>,
}

/// One attendance event to persist.
#[derive(Debug, Clone)]
pub struct AttendanceMark<'a> {
    pub label: &'a str,
    pub at: NaiveDateTime,
    pub confidence: Option<f32>,
    pub session_id: Option<&'a str>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AttendanceStats {
    pub today: i64,
    pub this_week: i64,
    pub this_month: i64,
    pub total: i64,
    pub late_today: i64,
    pub unique_students: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub start_time: String,
    pub end_time: Option<String>,
    pub total_recognized: i64,
    pub total_unknown: i64,
    pub notes: Option<String>,
}
