use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    loose_string, optional_i64_loose, optional_str, required_i64, required_str, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::validate;
use rusqlite::{params_from_iter, Connection, OptionalExtension, ToSql};
use serde_json::json;

fn student_exists(conn: &Connection, student_id: i64) -> Result<bool, HandlerErr> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
            r.get(0)
        })
        .optional()?;
    Ok(found.is_some())
}

/// Inserts one exam result. The letter grade is derived from the marks when
/// the caller does not supply one.
fn add(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_i64(params, "studentId")?;
    let exam_name = required_str(params, "examName")?.trim().to_string();
    let exam_year = loose_string(params, "examYear")
        .ok_or_else(|| HandlerErr::new("bad_params", "missing examYear"))?;
    let marks = loose_string(params, "marksObtained")
        .ok_or_else(|| HandlerErr::new("bad_params", "missing marksObtained"))?;

    if let Err(reason) = validate::validate_exam_name(&exam_name) {
        return Err(HandlerErr::validation("examName", reason));
    }
    if let Err(reason) = validate::validate_exam_year(&exam_year) {
        return Err(HandlerErr::validation("examYear", reason));
    }
    if let Err(reason) = validate::validate_marks_obtained(&marks) {
        return Err(HandlerErr::validation("marksObtained", reason));
    }
    if !student_exists(conn, student_id)? {
        return Err(HandlerErr::not_found("student"));
    }

    let year: i64 = exam_year
        .trim()
        .parse()
        .map_err(|_| HandlerErr::new("bad_params", "examYear is not a number"))?;
    let marks_value: f64 = marks
        .trim()
        .parse()
        .map_err(|_| HandlerErr::new("bad_params", "marksObtained is not a number"))?;
    let grade = match optional_str(params, "grade") {
        Some(g) => g,
        None => validate::letter_grade(&marks).to_string(),
    };

    conn.execute(
        "INSERT INTO exam_results(student_id, exam_name, exam_year, marks_obtained, grade)
         VALUES(?, ?, ?, ?, ?)",
        (student_id, &exam_name, year, marks_value, &grade),
    )
    .map_err(|e| HandlerErr::new("db_insert_failed", e.to_string()))?;

    Ok(json!({
        "resultId": conn.last_insert_rowid(),
        "grade": grade,
    }))
}

/// One student's results, newest exam year first, optionally narrowed by
/// exam name and/or year.
fn list_for_student(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_i64(params, "studentId")?;
    if !student_exists(conn, student_id)? {
        return Err(HandlerErr::not_found("student"));
    }

    let mut sql = String::from(
        "SELECT id, student_id, exam_name, exam_year, marks_obtained, grade, created_at
         FROM exam_results WHERE student_id = ?",
    );
    let mut binds: Vec<Box<dyn ToSql>> = vec![Box::new(student_id)];
    if let Some(name) = optional_str(params, "examName") {
        sql.push_str(" AND exam_name = ?");
        binds.push(Box::new(name));
    }
    if let Some(year) = optional_i64_loose(params, "examYear")? {
        sql.push_str(" AND exam_year = ?");
        binds.push(Box::new(year));
    }
    sql.push_str(" ORDER BY exam_year DESC, id");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(binds.iter().map(|b| b.as_ref())), |r| {
            Ok(json!({
                "id": r.get::<_, i64>(0)?,
                "studentId": r.get::<_, i64>(1)?,
                "examName": r.get::<_, String>(2)?,
                "examYear": r.get::<_, i64>(3)?,
                "marksObtained": r.get::<_, f64>(4)?,
                "grade": r.get::<_, String>(5)?,
                "createdAt": r.get::<_, Option<String>>(6)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "results": rows }))
}

/// All results joined with student names. Filters are independently
/// optional and AND-combined: substring match on the text fields, exact on
/// the year.
fn list_all(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let mut sql = String::from(
        "SELECT er.id, s.id, s.student_name, er.exam_name, er.exam_year, er.marks_obtained,
                er.grade, er.created_at
         FROM exam_results er
         JOIN students s ON er.student_id = s.id
         WHERE 1=1",
    );
    let mut binds: Vec<Box<dyn ToSql>> = Vec::new();
    if let Some(name) = optional_str(params, "studentName") {
        sql.push_str(" AND s.student_name LIKE ?");
        binds.push(Box::new(format!("%{}%", name)));
    }
    if let Some(exam) = optional_str(params, "examName") {
        sql.push_str(" AND er.exam_name LIKE ?");
        binds.push(Box::new(format!("%{}%", exam)));
    }
    if let Some(year) = optional_i64_loose(params, "examYear")? {
        sql.push_str(" AND er.exam_year = ?");
        binds.push(Box::new(year));
    }
    sql.push_str(" ORDER BY er.exam_year DESC, s.student_name");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(binds.iter().map(|b| b.as_ref())), |r| {
            Ok(json!({
                "id": r.get::<_, i64>(0)?,
                "studentId": r.get::<_, i64>(1)?,
                "studentName": r.get::<_, String>(2)?,
                "examName": r.get::<_, String>(3)?,
                "examYear": r.get::<_, i64>(4)?,
                "marksObtained": r.get::<_, f64>(5)?,
                "grade": r.get::<_, String>(6)?,
                "createdAt": r.get::<_, Option<String>>(7)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "results": rows }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let outcome = match req.method.as_str() {
        "examResults.add" | "examResults.listForStudent" | "examResults.list" => {
            let Some(conn) = state.db.as_ref() else {
                return Some(err(&req.id, "no_workspace", "select a workspace first", None));
            };
            match req.method.as_str() {
                "examResults.add" => add(conn, &req.params),
                "examResults.listForStudent" => list_for_student(conn, &req.params),
                "examResults.list" => list_all(conn, &req.params),
                _ => unreachable!(),
            }
        }
        _ => return None,
    };
    Some(match outcome {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    })
}
