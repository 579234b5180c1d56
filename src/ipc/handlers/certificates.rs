use crate::assets;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{optional_str, required_i64, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::path::Path;

fn add(
    conn: &Connection,
    workspace: &Path,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_i64(params, "studentId")?;
    let source = required_str(params, "sourcePath")?;
    let note = optional_str(params, "note");

    let student_name: Option<String> = conn
        .query_row(
            "SELECT student_name FROM students WHERE id = ?",
            [student_id],
            |r| r.get(0),
        )
        .optional()?;
    let Some(student_name) = student_name else {
        return Err(HandlerErr::not_found("student"));
    };

    let dest = assets::save_certificate(
        workspace,
        Path::new(&source),
        &student_name,
        student_id,
        note.as_deref(),
    )
    .map_err(|e| HandlerErr::new("file_copy_failed", e.to_string()))?;
    let dest = dest.to_string_lossy().to_string();

    conn.execute(
        "INSERT INTO certificates(student_id, certificate_image_path, note) VALUES(?, ?, ?)",
        (student_id, &dest, &note),
    )
    .map_err(|e| HandlerErr::new("db_insert_failed", e.to_string()))?;

    Ok(json!({
        "certificateId": conn.last_insert_rowid(),
        "certificateImagePath": dest,
    }))
}

fn list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_i64(params, "studentId")?;
    let mut stmt = conn.prepare(
        "SELECT id, student_id, certificate_image_path, note, created_at
         FROM certificates WHERE student_id = ? ORDER BY created_at DESC, id DESC",
    )?;
    let rows = stmt
        .query_map([student_id], |r| {
            Ok(json!({
                "id": r.get::<_, i64>(0)?,
                "studentId": r.get::<_, i64>(1)?,
                "certificateImagePath": r.get::<_, String>(2)?,
                "note": r.get::<_, Option<String>>(3)?,
                "createdAt": r.get::<_, Option<String>>(4)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "certificates": rows }))
}

/// Removes the row, then the backing file. The row removal wins: a stuck
/// file comes back as a warning rather than resurrecting the record.
fn delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let certificate_id = required_i64(params, "certificateId")?;
    let path: Option<String> = conn
        .query_row(
            "SELECT certificate_image_path FROM certificates WHERE id = ?",
            [certificate_id],
            |r| r.get(0),
        )
        .optional()?;
    let Some(path) = path else {
        return Err(HandlerErr::not_found("certificate"));
    };

    conn.execute("DELETE FROM certificates WHERE id = ?", [certificate_id])
        .map_err(|e| HandlerErr::new("db_delete_failed", e.to_string()))?;

    let mut file_warnings: Vec<String> = Vec::new();
    if !assets::delete_file(Path::new(&path)) {
        file_warnings.push(format!("file was not removed: {}", path));
    }

    Ok(json!({
        "message": "Certificate deleted successfully",
        "fileWarnings": file_warnings,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let outcome = match req.method.as_str() {
        "certificates.add" | "certificates.list" | "certificates.delete" => {
            let (Some(workspace), Some(conn)) = (state.workspace.clone(), state.db.as_ref())
            else {
                return Some(err(&req.id, "no_workspace", "select a workspace first", None));
            };
            match req.method.as_str() {
                "certificates.add" => add(conn, &workspace, &req.params),
                "certificates.list" => list(conn, &req.params),
                "certificates.delete" => delete(conn, &req.params),
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
