use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{required_i64, HandlerErr};
use crate::ipc::types::{AppState, Request};
use chrono::Local;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

fn get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_i64(params, "studentId")?;
    let row: Option<(String, Option<String>)> = conn
        .query_row(
            "SELECT notes, updated_at FROM student_notes WHERE student_id = ?",
            [student_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    match row {
        Some((notes, updated_at)) => Ok(json!({ "notes": notes, "updatedAt": updated_at })),
        None => Ok(json!({ "notes": null, "updatedAt": null })),
    }
}

/// At most one note record per student: insert on first save, overwrite
/// afterwards.
fn save(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_i64(params, "studentId")?;
    let Some(notes) = params.get("notes").and_then(|v| v.as_str()) else {
        return Err(HandlerErr::new("bad_params", "missing notes"));
    };

    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
            r.get(0)
        })
        .optional()?;
    if exists.is_none() {
        return Err(HandlerErr::not_found("student"));
    }

    let updated_at = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    conn.execute(
        "INSERT INTO student_notes(student_id, notes, updated_at) VALUES(?, ?, ?)
         ON CONFLICT(student_id) DO UPDATE SET notes = excluded.notes, updated_at = excluded.updated_at",
        (student_id, notes, &updated_at),
    )
    .map_err(|e| HandlerErr::new("db_insert_failed", e.to_string()))?;

    Ok(json!({ "message": "Notes saved successfully", "updatedAt": updated_at }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let outcome = match req.method.as_str() {
        "notes.get" | "notes.save" => {
            let Some(conn) = state.db.as_ref() else {
                return Some(err(&req.id, "no_workspace", "select a workspace first", None));
            };
            match req.method.as_str() {
                "notes.get" => get(conn, &req.params),
                "notes.save" => save(conn, &req.params),
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
