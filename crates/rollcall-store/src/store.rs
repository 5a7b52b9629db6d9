//! SQLite-backed students, attendance, and session bookkeeping.

use crate::error::{StoreError, StoreResult};
use crate::models::{
    AttendanceMark, AttendanceRecord, AttendanceStats, DailyCount, NewStudent, SessionRecord,
    Student, StudentUpdate,
};
use crate::schema::init_schema;
use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use rollcall_core::{student_id_for, AttendanceStatus, LatePolicy, RecordOutcome, UnregisteredPolicy};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::time::Duration;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct AttendanceStore {
    conn: Connection,
}

impl AttendanceStore {
    /// Open (or create) the database file and ensure the schema exists.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        init_schema(&conn)?;
        tracing::debug!(path = %path.display(), "attendance store opened");
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    // --- Students ---

    pub fn add_student(&self, student: &NewStudent) -> StoreResult<()> {
        let inserted = self.conn.execute(
            "INSERT INTO students (student_id, name, email, phone, department, batch)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(student_id) DO NOTHING",
            params![
                student.student_id,
                student.name,
                student.email,
                student.phone,
                student.department,
                student.batch
            ],
        )?;
        if inserted == 0 {
            return Err(StoreError::StudentExists(student.student_id.clone()));
        }
        tracing::info!(student_id = %student.student_id, "student registered");
        Ok(())
    }

    pub fn get_student(&self, student_id: &str) -> StoreResult<Option<Student>> {
        let student = self
            .conn
            .query_row(
                "SELECT * FROM students WHERE student_id = ?1",
                [student_id],
                map_student,
            )
            .optional()?;
        Ok(student)
    }

    /// Active students ordered by name.
    pub fn list_students(&self) -> StoreResult<Vec<Student>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM students WHERE is_active = 1 ORDER BY name")?;
        let rows = stmt.query_map([], map_student)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Apply a partial update. Returns whether the student exists.
    pub fn update_student(&self, student_id: &str, update: &StudentUpdate) -> StoreResult<bool> {
        if update.is_empty() {
            return Ok(self.get_student(student_id)?.is_some());
        }
        let changed = self.conn.execute(
            "UPDATE students SET
                name = COALESCE(?2, name),
                email = COALESCE(?3, email),
                phone = COALESCE(?4, phone),
                department = COALESCE(?5, department),
                batch = COALESCE(?6, batch)
             WHERE student_id = ?1",
            params![
                student_id,
                update.name,
                update.email,
                update.phone,
                update.department,
                update.batch
            ],
        )?;
        Ok(changed > 0)
    }

    /// Soft delete: the student stays in history but leaves the active list.
    pub fn deactivate_student(&self, student_id: &str) -> StoreResult<bool> {
        let changed = self.conn.execute(
            "UPDATE students SET is_active = 0 WHERE student_id = ?1",
            [student_id],
        )?;
        Ok(changed > 0)
    }

    // --- Attendance ---

    /// Persist the first sighting of a label today.
    ///
    /// Runs in one transaction: resolve (or auto-register) the student,
    /// then insert. A conflict on `(student_id, date)` means the student
    /// was already marked and yields `AlreadyMarked`.
    pub fn mark_attendance(
        &mut self,
        mark: &AttendanceMark<'_>,
        policy: &LatePolicy,
        unregistered: UnregisteredPolicy,
    ) -> StoreResult<RecordOutcome> {
        let student_id = student_id_for(mark.label);
        let date = mark.at.date().format(DATE_FORMAT).to_string();
        let time = mark.at.time().format(TIME_FORMAT).to_string();
        let (status, late_minutes) = policy.evaluate(mark.at.time());

        let tx = self.conn.transaction()?;

        let registered: Option<(String, bool)> = tx
            .query_row(
                "SELECT name, is_active FROM students WHERE student_id = ?1",
                [&student_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let name = match (registered, unregistered) {
            (Some((name, true)), _) => name,
            (Some((_, false)), _) | (None, UnregisteredPolicy::Reject) => {
                return Err(StoreError::Unregistered(student_id));
            }
            (None, UnregisteredPolicy::Register) => {
                tx.execute(
                    "INSERT INTO students (student_id, name) VALUES (?1, ?2)",
                    params![student_id, mark.label],
                )?;
                tracing::info!(student_id = %student_id, label = mark.label, "auto-registered student");
                mark.label.to_string()
            }
        };

        let inserted = tx.execute(
            "INSERT INTO attendance
                (student_id, name, date, time, status, confidence, late_minutes, session_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(student_id, date) DO NOTHING",
            params![
                student_id,
                name,
                date,
                time,
                status.as_str(),
                mark.confidence,
                late_minutes,
                mark.session_id
            ],
        )?;
        tx.commit()?;

        if inserted == 0 {
            tracing::debug!(student_id = %student_id, date = %date, "already marked");
            return Ok(RecordOutcome::AlreadyMarked);
        }
        tracing::info!(student_id = %student_id, %status, late_minutes, "attendance recorded");
        Ok(RecordOutcome::Recorded {
            status,
            late_minutes,
        })
    }

    pub fn attendance_by_date(&self, date: NaiveDate) -> StoreResult<Vec<AttendanceRecord>> {
        self.query_attendance(
            "SELECT * FROM attendance WHERE date = ?1 ORDER BY time",
            params![date.format(DATE_FORMAT).to_string()],
        )
    }

    /// Inclusive range, newest first.
    pub fn attendance_range(&self, start: NaiveDate, end: NaiveDate) -> StoreResult<Vec<AttendanceRecord>> {
        self.query_attendance(
            "SELECT * FROM attendance WHERE date BETWEEN ?1 AND ?2 ORDER BY date DESC, time DESC",
            params![
                start.format(DATE_FORMAT).to_string(),
                end.format(DATE_FORMAT).to_string()
            ],
        )
    }

    pub fn student_attendance(&self, student_id: &str, limit: Option<usize>) -> StoreResult<Vec<AttendanceRecord>> {
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        self.query_attendance(
            "SELECT * FROM attendance WHERE student_id = ?1 ORDER BY date DESC, time DESC LIMIT ?2",
            params![student_id, limit],
        )
    }

    fn query_attendance(&self, sql: &str, params: impl rusqlite::Params) -> StoreResult<Vec<AttendanceRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, map_attendance)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Headline counts relative to `today`.
    pub fn stats(&self, today: NaiveDate) -> StoreResult<AttendanceStats> {
        let day = |d: NaiveDate| d.format(DATE_FORMAT).to_string();
        let today_s = day(today);
        let week_ago = day(today.checked_sub_days(Days::new(7)).unwrap_or(today));
        let month_ago = day(today.checked_sub_days(Days::new(30)).unwrap_or(today));

        let count = |sql: &str, p: &[&dyn rusqlite::ToSql]| -> StoreResult<i64> {
            Ok(self.conn.query_row(sql, p, |row| row.get(0))?)
        };

        Ok(AttendanceStats {
            today: count("SELECT COUNT(*) FROM attendance WHERE date = ?1", &[&today_s])?,
            this_week: count("SELECT COUNT(*) FROM attendance WHERE date >= ?1", &[&week_ago])?,
            this_month: count("SELECT COUNT(*) FROM attendance WHERE date >= ?1", &[&month_ago])?,
            total: count("SELECT COUNT(*) FROM attendance", &[])?,
            late_today: count(
                "SELECT COUNT(*) FROM attendance WHERE date = ?1 AND status = 'Late'",
                &[&today_s],
            )?,
            unique_students: count("SELECT COUNT(DISTINCT student_id) FROM attendance", &[])?,
        })
    }

    /// Per-day counts for the last `days` days, oldest first.
    pub fn daily_counts(&self, today: NaiveDate, days: u64) -> StoreResult<Vec<DailyCount>> {
        let start = today.checked_sub_days(Days::new(days)).unwrap_or(today);
        let mut stmt = self.conn.prepare(
            "SELECT date, COUNT(*) FROM attendance WHERE date >= ?1 GROUP BY date ORDER BY date",
        )?;
        let rows = stmt.query_map([start.format(DATE_FORMAT).to_string()], |row| {
            Ok(DailyCount {
                date: parse_date(&row.get::<_, String>(0)?)?,
                count: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // --- Sessions ---

    /// Open a session row and return its id.
    pub fn create_session(&self, now: NaiveDateTime) -> StoreResult<String> {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let session_id = format!("SESSION_{}_{}", now.format("%Y%m%d_%H%M%S"), &suffix[..8]);
        self.conn.execute(
            "INSERT INTO sessions (session_id, start_time) VALUES (?1, ?2)",
            params![session_id, now.format(TIMESTAMP_FORMAT).to_string()],
        )?;
        tracing::info!(session_id = %session_id, "session started");
        Ok(session_id)
    }

    pub fn end_session(
        &self,
        session_id: &str,
        now: NaiveDateTime,
        total_recognized: u64,
        total_unknown: u64,
        notes: Option<&str>,
    ) -> StoreResult<bool> {
        let changed = self.conn.execute(
            "UPDATE sessions
             SET end_time = ?2, total_recognized = ?3, total_unknown = ?4, notes = ?5
             WHERE session_id = ?1",
            params![
                session_id,
                now.format(TIMESTAMP_FORMAT).to_string(),
                total_recognized as i64,
                total_unknown as i64,
                notes
            ],
        )?;
        Ok(changed > 0)
    }

    /// Most recent sessions first.
    pub fn list_sessions(&self, limit: usize) -> StoreResult<Vec<SessionRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT session_id, start_time, end_time, total_recognized, total_unknown, notes
             FROM sessions ORDER BY start_time DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], |row| {
            Ok(SessionRecord {
                session_id: row.get(0)?,
                start_time: row.get(1)?,
                end_time: row.get(2)?,
                total_recognized: row.get(3)?,
                total_unknown: row.get(4)?,
                notes: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn conversion_error(msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(StoreError::InvalidRow(msg)),
    )
}

fn parse_date(s: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|_| conversion_error(format!("invalid date: {s}")))
}

fn map_student(row: &Row) -> rusqlite::Result<Student> {
    Ok(Student {
        student_id: row.get("student_id")?,
        name: row.get("name")?,
        email: row.get("email")?,
        phone: row.get("phone")?,
        department: row.get("department")?,
        batch: row.get("batch")?,
        registered_at: row.get("registered_date")?,
        active: row.get("is_active")?,
    })
}

fn map_attendance(row: &Row) -> rusqlite::Result<AttendanceRecord> {
    let time_str: String = row.get("time")?;
    let time = NaiveTime::parse_from_str(&time_str, TIME_FORMAT)
        .map_err(|_| conversion_error(format!("invalid time: {time_str}")))?;
    let status_str: String = row.get("status")?;
    let status = AttendanceStatus::from_db_str(&status_str)
        .ok_or_else(|| conversion_error(format!("invalid status: {status_str}")))?;

    Ok(AttendanceRecord {
        student_id: row.get("student_id")?,
        name: row.get("name")?,
        date: parse_date(&row.get::<_, String>("date")?)?,
        time,
        status,
        confidence: row.get::<_, Option<f64>>("confidence")?.map(|c| c as f32),
        late_minutes: row.get("late_minutes")?,
        session_id: row.get("session_id")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(date: &str, time: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(&format!("{date} {time}"), TIMESTAMP_FORMAT).unwrap()
    }

    fn mark<'a>(label: &'a str, when: NaiveDateTime) -> AttendanceMark<'a> {
        AttendanceMark {
            label,
            at: when,
            confidence: Some(0.8),
            session_id: Some("SESSION_TEST"),
        }
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    #[test]
    fn test_mark_twice_same_day_is_idempotent() {
        let mut store = AttendanceStore::open_in_memory().unwrap();
        let policy = LatePolicy::default();

        let first = store
            .mark_attendance(&mark("Ada", at("2025-03-03", "09:02:00")), &policy, UnregisteredPolicy::Register)
            .unwrap();
        assert_eq!(
            first,
            RecordOutcome::Recorded { status: AttendanceStatus::Present, late_minutes: 0 }
        );

        let second = store
            .mark_attendance(&mark("Ada", at("2025-03-03", "11:00:00")), &policy, UnregisteredPolicy::Register)
            .unwrap();
        assert_eq!(second, RecordOutcome::AlreadyMarked);

        let rows = store.attendance_by_date(d("2025-03-03")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].time, NaiveTime::from_hms_opt(9, 2, 0).unwrap());
    }

    #[test]
    fn test_next_day_records_again() {
        let mut store = AttendanceStore::open_in_memory().unwrap();
        let policy = LatePolicy::default();
        for date in ["2025-03-03", "2025-03-04"] {
            let outcome = store
                .mark_attendance(&mark("ada", at(date, "08:55:00")), &policy, UnregisteredPolicy::Register)
                .unwrap();
            assert!(matches!(outcome, RecordOutcome::Recorded { .. }));
        }
        assert_eq!(store.student_attendance("ada", None).unwrap().len(), 2);
        assert_eq!(store.student_attendance("ada", Some(1)).unwrap()[0].date, d("2025-03-04"));
    }

    #[test]
    fn test_late_status_persisted() {
        let mut store = AttendanceStore::open_in_memory().unwrap();
        let outcome = store
            .mark_attendance(
                &mark("Grace Hopper", at("2025-03-03", "09:20:00")),
                &LatePolicy::default(),
                UnregisteredPolicy::Register,
            )
            .unwrap();
        assert_eq!(outcome, RecordOutcome::Recorded { status: AttendanceStatus::Late, late_minutes: 20 });

        let rows = store.attendance_by_date(d("2025-03-03")).unwrap();
        assert_eq!(rows[0].student_id, "grace_hopper");
        assert_eq!(rows[0].status, AttendanceStatus::Late);
        assert_eq!(rows[0].late_minutes, 20);
        assert_eq!(rows[0].session_id.as_deref(), Some("SESSION_TEST"));
        assert!((rows[0].confidence.unwrap() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_auto_register_uses_label_as_name() {
        let mut store = AttendanceStore::open_in_memory().unwrap();
        store
            .mark_attendance(&mark("Ada Lovelace", at("2025-03-03", "09:00:00")), &LatePolicy::default(), UnregisteredPolicy::Register)
            .unwrap();
        let student = store.get_student("ada_lovelace").unwrap().unwrap();
        assert_eq!(student.name, "Ada Lovelace");
        assert!(student.active);
    }

    #[test]
    fn test_reject_unregistered() {
        let mut store = AttendanceStore::open_in_memory().unwrap();
        let err = store
            .mark_attendance(&mark("stranger", at("2025-03-03", "09:00:00")), &LatePolicy::default(), UnregisteredPolicy::Reject)
            .unwrap_err();
        assert!(matches!(err, StoreError::Unregistered(id) if id == "stranger"));
        assert!(store.attendance_by_date(d("2025-03-03")).unwrap().is_empty());
        assert!(store.get_student("stranger").unwrap().is_none());
    }

    #[test]
    fn test_registered_name_used_under_reject() {
        let mut store = AttendanceStore::open_in_memory().unwrap();
        store
            .add_student(&NewStudent {
                student_id: "ada".into(),
                name: "Ada L.".into(),
                ..Default::default()
            })
            .unwrap();
        store
            .mark_attendance(&mark("Ada", at("2025-03-03", "09:00:00")), &LatePolicy::default(), UnregisteredPolicy::Reject)
            .unwrap();
        assert_eq!(store.attendance_by_date(d("2025-03-03")).unwrap()[0].name, "Ada L.");
    }

    #[test]
    fn test_deactivated_student_cannot_be_marked() {
        let mut store = AttendanceStore::open_in_memory().unwrap();
        store
            .add_student(&NewStudent { student_id: "ada".into(), name: "Ada".into(), ..Default::default() })
            .unwrap();
        assert!(store.deactivate_student("ada").unwrap());
        let err = store
            .mark_attendance(&mark("ada", at("2025-03-03", "09:00:00")), &LatePolicy::default(), UnregisteredPolicy::Register)
            .unwrap_err();
        assert!(matches!(err, StoreError::Unregistered(_)));
    }

    #[test]
    fn test_student_crud() {
        let store = AttendanceStore::open_in_memory().unwrap();
        let ada = NewStudent {
            student_id: "ada".into(),
            name: "Ada".into(),
            department: Some("Maths".into()),
            ..Default::default()
        };
        store.add_student(&ada).unwrap();
        assert!(matches!(store.add_student(&ada), Err(StoreError::StudentExists(_))));
        store
            .add_student(&NewStudent { student_id: "alan".into(), name: "Alan".into(), ..Default::default() })
            .unwrap();

        let names: Vec<_> = store.list_students().unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["Ada", "Alan"]);

        let update = StudentUpdate { email: Some("ada@example.org".into()), ..Default::default() };
        assert!(store.update_student("ada", &update).unwrap());
        assert!(!store.update_student("nobody", &update).unwrap());
        let ada = store.get_student("ada").unwrap().unwrap();
        assert_eq!(ada.email.as_deref(), Some("ada@example.org"));
        assert_eq!(ada.department.as_deref(), Some("Maths"));

        store.deactivate_student("alan").unwrap();
        assert_eq!(store.list_students().unwrap().len(), 1);
    }

    #[test]
    fn test_stats_and_daily_counts() {
        let mut store = AttendanceStore::open_in_memory().unwrap();
        let policy = LatePolicy::default();
        let reg = UnregisteredPolicy::Register;
        store.mark_attendance(&mark("ada", at("2025-03-10", "09:00:00")), &policy, reg).unwrap();
        store.mark_attendance(&mark("alan", at("2025-03-10", "09:30:00")), &policy, reg).unwrap();
        store.mark_attendance(&mark("ada", at("2025-03-07", "09:00:00")), &policy, reg).unwrap();
        store.mark_attendance(&mark("ada", at("2025-01-01", "09:00:00")), &policy, reg).unwrap();

        let stats = store.stats(d("2025-03-10")).unwrap();
        assert_eq!(
            stats,
            AttendanceStats {
                today: 2,
                this_week: 3,
                this_month: 3,
                total: 4,
                late_today: 1,
                unique_students: 2,
            }
        );

        let daily = store.daily_counts(d("2025-03-10"), 30).unwrap();
        assert_eq!(
            daily,
            vec![
                DailyCount { date: d("2025-03-07"), count: 1 },
                DailyCount { date: d("2025-03-10"), count: 2 },
            ]
        );

        let range = store.attendance_range(d("2025-03-01"), d("2025-03-10")).unwrap();
        assert_eq!(range.len(), 3);
        assert_eq!(range[0].date, d("2025-03-10"));
    }

    #[test]
    fn test_session_lifecycle() {
        let store = AttendanceStore::open_in_memory().unwrap();
        let id = store.create_session(at("2025-03-03", "08:45:00")).unwrap();
        assert!(id.starts_with("SESSION_20250303_084500_"));

        assert!(store.end_session(&id, at("2025-03-03", "10:00:00"), 12, 3, None).unwrap());
        assert!(!store.end_session("SESSION_missing", at("2025-03-03", "10:00:00"), 0, 0, None).unwrap());

        let sessions = store.list_sessions(10).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].total_recognized, 12);
        assert_eq!(sessions[0].total_unknown, 3);
        assert_eq!(sessions[0].end_time.as_deref(), Some("2025-03-03 10:00:00"));
    }
}
