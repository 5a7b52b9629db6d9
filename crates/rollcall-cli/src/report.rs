//! Plain-text tables for the report commands.

use rollcall_store::{AttendanceRecord, AttendanceStats, DailyCount, SessionRecord, Student};

pub fn attendance_table(records: &[AttendanceRecord]) -> String {
    if records.is_empty() {
        return "No attendance records.\n".to_string();
    }
    let mut out = format!(
        "{:<12} {:<20} {:<24} {:<10} {:<8} {:>5} {:>6}\n",
        "DATE", "STUDENT", "NAME", "TIME", "STATUS", "LATE", "CONF"
    );
    for rec in records {
        let confidence = rec
            .confidence
            .map(|c| format!("{:.0}%", c * 100.0))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:<12} {:<20} {:<24} {:<10} {:<8} {:>5} {:>6}\n",
            rec.date.to_string(),
            rec.student_id,
            rec.name,
            rec.time.format("%H:%M:%S").to_string(),
            rec.status.as_str(),
            rec.late_minutes,
            confidence
        ));
    }
    out
}

pub fn student_table(students: &[Student]) -> String {
    if students.is_empty() {
        return "No students registered.\n".to_string();
    }
    let mut out = format!("{:<20} {:<24} {:<16} {:<10}\n", "ID", "NAME", "DEPARTMENT", "BATCH");
    for s in students {
        out.push_str(&format!(
            "{:<20} {:<24} {:<16} {:<10}\n",
            s.student_id,
            s.name,
            s.department.as_deref().unwrap_or("-"),
            s.batch.as_deref().unwrap_or("-")
        ));
    }
    out
}

pub fn student_detail(student: &Student) -> String {
    let field = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
    format!(
        "ID:         {}\nName:       {}\nEmail:      {}\nPhone:      {}\nDepartment: {}\nBatch:      {}\nRegistered: {}\nActive:     {}\n",
        student.student_id,
        student.name,
        field(&student.email),
        field(&student.phone),
        field(&student.department),
        field(&student.batch),
        student.registered_at,
        if student.active { "yes" } else { "no" }
    )
}

pub fn stats_summary(stats: &AttendanceStats) -> String {
    format!(
        "Today:           {}\nLate today:      {}\nLast 7 days:     {}\nLast 30 days:    {}\nTotal records:   {}\nUnique students: {}\n",
        stats.today, stats.late_today, stats.this_week, stats.this_month, stats.total, stats.unique_students
    )
}

pub fn daily_chart(counts: &[DailyCount]) -> String {
    if counts.is_empty() {
        return "No attendance in this period.\n".to_string();
    }
    counts
        .iter()
        .map(|d| format!("{}  {:>4}  {}\n", d.date, d.count, "#".repeat(d.count.clamp(0, 60) as usize)))
        .collect()
}

pub fn session_table(sessions: &[SessionRecord]) -> String {
    if sessions.is_empty() {
        return "No sessions recorded.\n".to_string();
    }
    let mut out = format!(
        "{:<36} {:<20} {:<20} {:>10} {:>8}\n",
        "SESSION", "STARTED", "ENDED", "RECOGNIZED", "UNKNOWN"
    );
    for s in sessions {
        out.push_str(&format!(
            "{:<36} {:<20} {:<20} {:>10} {:>8}\n",
            s.session_id,
            s.start_time,
            s.end_time.as_deref().unwrap_or("(running)"),
            s.total_recognized,
            s.total_unknown
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_daily_chart_bars() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        let chart = daily_chart(&[DailyCount { date, count: 3 }]);
        assert_eq!(chart, "2025-03-03     3  ###\n");
    }

    #[test]
    fn test_empty_tables_have_messages() {
        assert_eq!(attendance_table(&[]), "No attendance records.\n");
        assert_eq!(session_table(&[]), "No sessions recorded.\n");
    }

    #[test]
    fn test_unfinished_session_shown_as_running() {
        let table = session_table(&[SessionRecord {
            session_id: "SESSION_20250303_084500_abcd1234".into(),
            start_time: "2025-03-03 08:45:00".into(),
            end_time: None,
            total_recognized: 0,
            total_unknown: 0,
            notes: None,
        }]);
        assert!(table.contains("(running)"));
    }
}
