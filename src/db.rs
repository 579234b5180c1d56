use crate::{auth, validate};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE: &str = "students.sqlite3";

pub const DEFAULT_ADMIN_USER: &str = "admin";
pub const DEFAULT_ADMIN_PASSWORD: &str = "1234";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT UNIQUE NOT NULL,
            password_hash TEXT NOT NULL,
            salt TEXT NOT NULL DEFAULT '',
            created_at TEXT DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_name TEXT NOT NULL,
            date_of_birth TEXT NOT NULL,
            gender TEXT NOT NULL,
            address TEXT NOT NULL,
            guardian_name TEXT NOT NULL,
            guardian_nic TEXT NOT NULL,
            guardian_contact TEXT NOT NULL,
            image_path TEXT,
            registration_date TEXT NOT NULL DEFAULT '',
            grade TEXT NOT NULL DEFAULT 'Grade 1',
            created_at TEXT DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_name ON students(student_name)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exam_results(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL,
            exam_name TEXT NOT NULL,
            exam_year INTEGER NOT NULL,
            marks_obtained REAL NOT NULL,
            grade TEXT NOT NULL,
            created_at TEXT DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_exam_results_student ON exam_results(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_notes(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL UNIQUE,
            notes TEXT NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS certificates(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL,
            certificate_image_path TEXT NOT NULL,
            note TEXT,
            created_at TEXT DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_certificates_student ON certificates(student_id)",
        [],
    )?;

    // Databases created by earlier revisions need their shape brought forward
    // before anything queries them.
    ensure_students_registration_columns(&conn)?;
    ensure_users_salt(&conn)?;
    migrate_exam_results_shape(&conn)?;

    seed_admin_user(&conn)?;

    Ok(conn)
}

/// The students table originally ended at image_path; registration_date and
/// grade arrived later. Add and backfill with safe defaults.
fn ensure_students_registration_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "students", "registration_date")? {
        conn.execute(
            "ALTER TABLE students ADD COLUMN registration_date TEXT NOT NULL DEFAULT ''",
            [],
        )?;
        // Backfill from the row's creation date so the report's promotion
        // arithmetic has a year to work from.
        conn.execute(
            "UPDATE students SET registration_date = substr(COALESCE(created_at, ''), 1, 10)
             WHERE registration_date = ''",
            [],
        )?;
    }
    if !table_has_column(conn, "students", "grade")? {
        conn.execute(
            "ALTER TABLE students ADD COLUMN grade TEXT NOT NULL DEFAULT 'Grade 1'",
            [],
        )?;
    }
    Ok(())
}

/// Pre-salt databases stored a bare SHA-256 digest. An empty salt marks those
/// rows; they verify with the legacy digest and are upgraded on login.
fn ensure_users_salt(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "users", "salt")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE users ADD COLUMN salt TEXT NOT NULL DEFAULT ''",
        [],
    )?;
    Ok(())
}

/// The exam_results table had an incompatible earlier shape:
/// (subject, exam_name free-text, exam_date, marks_obtained, total_marks).
/// Rebuild into the year-based shape: the year comes from exam_date, marks
/// are rescaled to a 0-100 percentage, and the letter grade is recomputed
/// from the threshold table.
fn migrate_exam_results_shape(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "exam_results", "exam_date")? {
        return Ok(());
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "CREATE TABLE exam_results_v2(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL,
            exam_name TEXT NOT NULL,
            exam_year INTEGER NOT NULL,
            marks_obtained REAL NOT NULL,
            grade TEXT NOT NULL,
            created_at TEXT DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    tx.execute(
        "INSERT INTO exam_results_v2(id, student_id, exam_name, exam_year, marks_obtained, grade, created_at)
         SELECT id, student_id, exam_name,
                CAST(substr(exam_date, 1, 4) AS INTEGER),
                CASE WHEN total_marks > 0
                     THEN marks_obtained * 100.0 / total_marks
                     ELSE marks_obtained END,
                '',
                created_at
         FROM exam_results",
        [],
    )?;
    tx.execute("DROP TABLE exam_results", [])?;
    tx.execute("ALTER TABLE exam_results_v2 RENAME TO exam_results", [])?;
    tx.execute(
        "CREATE INDEX IF NOT EXISTS idx_exam_results_student ON exam_results(student_id)",
        [],
    )?;

    // Recompute letter grades from the rescaled marks.
    {
        let mut stmt = tx.prepare("SELECT id, marks_obtained FROM exam_results")?;
        let rows = stmt
            .query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, f64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        for (id, marks) in rows {
            let grade = validate::letter_grade_value(marks);
            tx.execute(
                "UPDATE exam_results SET grade = ? WHERE id = ?",
                (grade, id),
            )?;
        }
    }

    tx.commit()?;
    tracing::info!("migrated exam_results to the year-based shape");
    Ok(())
}

fn seed_admin_user(conn: &Connection) -> anyhow::Result<()> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM users WHERE username = ?",
            [DEFAULT_ADMIN_USER],
            |r| r.get(0),
        )
        .optional()?;
    if exists.is_some() {
        return Ok(());
    }
    let salt = auth::new_salt();
    let hash = auth::hash_password(DEFAULT_ADMIN_PASSWORD, &salt);
    conn.execute(
        "INSERT INTO users(username, password_hash, salt) VALUES(?, ?, ?)",
        (DEFAULT_ADMIN_USER, &hash, &salt),
    )?;
    tracing::info!("seeded default admin user");
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
