use rusqlite::Connection;

/// Create every table idempotently.
///
/// `UNIQUE(student_id, date)` on `attendance` is what guarantees one
/// row per student per day, across restarts and across processes.
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS students (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id      TEXT UNIQUE NOT NULL,
            name            TEXT NOT NULL,
            email           TEXT,
            phone           TEXT,
            department      TEXT,
            batch           TEXT,
            registered_date TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            is_active       INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS attendance (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id   TEXT NOT NULL,
            name         TEXT NOT NULL,
            date         TEXT NOT NULL,
            time         TEXT NOT NULL,
            status       TEXT NOT NULL DEFAULT 'Present' CHECK(status IN ('Present','Late')),
            confidence   REAL,
            late_minutes INTEGER NOT NULL DEFAULT 0,
            session_id   TEXT,
            created_at   TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(student_id, date)
        );

        CREATE INDEX IF NOT EXISTS idx_attendance_date ON attendance(date);

        CREATE TABLE IF NOT EXISTS sessions (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id       TEXT UNIQUE NOT NULL,
            start_time       TEXT NOT NULL,
            end_time         TEXT,
            total_recognized INTEGER NOT NULL DEFAULT 0,
            total_unknown    INTEGER NOT NULL DEFAULT 0,
            notes            TEXT
        );
        "#,
    )
}
