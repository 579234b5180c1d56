use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{optional_str, required_i64, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::{assets, validate};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::path::{Path, PathBuf};

const STUDENT_COLUMNS: &str = "id, student_name, date_of_birth, gender, address, guardian_name,
     guardian_nic, guardian_contact, image_path, registration_date, grade, created_at";

struct StudentFields {
    name: String,
    date_of_birth: String,
    gender: String,
    address: String,
    guardian_name: String,
    guardian_nic: String,
    guardian_contact: String,
    registration_date: String,
    grade: String,
}

/// Pulls and validates the full student field set. Validation failures carry
/// the offending field name so the frontend can place the message.
fn parse_student_fields(params: &serde_json::Value) -> Result<StudentFields, HandlerErr> {
    let fields = StudentFields {
        name: required_str(params, "studentName")?.trim().to_string(),
        date_of_birth: required_str(params, "dateOfBirth")?.trim().to_string(),
        gender: required_str(params, "gender")?.trim().to_string(),
        address: required_str(params, "address")?.trim().to_string(),
        guardian_name: required_str(params, "guardianName")?.trim().to_string(),
        guardian_nic: required_str(params, "guardianNic")?.trim().to_string(),
        guardian_contact: required_str(params, "guardianContact")?.trim().to_string(),
        registration_date: required_str(params, "registrationDate")?.trim().to_string(),
        grade: required_str(params, "grade")?.trim().to_string(),
    };

    let checks: [(&str, Result<(), String>); 9] = [
        ("studentName", validate::validate_student_name(&fields.name)),
        ("dateOfBirth", validate::validate_date_of_birth(&fields.date_of_birth)),
        ("gender", validate::validate_gender(&fields.gender)),
        ("address", validate::validate_address(&fields.address)),
        ("guardianName", validate::validate_guardian_name(&fields.guardian_name)),
        ("guardianNic", validate::validate_guardian_nic(&fields.guardian_nic)),
        (
            "guardianContact",
            validate::validate_guardian_contact(&fields.guardian_contact),
        ),
        (
            "registrationDate",
            validate::validate_registration_date(&fields.registration_date),
        ),
        ("grade", validate::validate_grade_level(&fields.grade)),
    ];
    for (field, check) in checks {
        if let Err(reason) = check {
            return Err(HandlerErr::validation(field, reason));
        }
    }
    Ok(fields)
}

fn student_json(r: &rusqlite::Row) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": r.get::<_, i64>(0)?,
        "studentName": r.get::<_, String>(1)?,
        "dateOfBirth": r.get::<_, String>(2)?,
        "gender": r.get::<_, String>(3)?,
        "address": r.get::<_, String>(4)?,
        "guardianName": r.get::<_, String>(5)?,
        "guardianNic": r.get::<_, String>(6)?,
        "guardianContact": r.get::<_, String>(7)?,
        "imagePath": r.get::<_, Option<String>>(8)?,
        "registrationDate": r.get::<_, String>(9)?,
        "grade": r.get::<_, String>(10)?,
        "createdAt": r.get::<_, Option<String>>(11)?,
    }))
}

fn certificate_attachments(params: &serde_json::Value) -> Vec<(String, Option<String>)> {
    params
        .get("certificates")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let path = item.get("path").and_then(|v| v.as_str())?.to_string();
                    let note = item
                        .get("note")
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string())
                        .filter(|s| !s.trim().is_empty());
                    Some((path, note))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Registration is one transaction: the student row and its certificate rows
/// commit together. File copies are best-effort; a failed copy downgrades to
/// a warning instead of losing the textual record.
fn register(
    conn: &Connection,
    workspace: &Path,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let fields = parse_student_fields(params)?;
    let image_source = optional_str(params, "imagePath");
    let attachments = certificate_attachments(params);

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

    tx.execute(
        "INSERT INTO students(student_name, date_of_birth, gender, address, guardian_name,
             guardian_nic, guardian_contact, image_path, registration_date, grade)
         VALUES(?, ?, ?, ?, ?, ?, ?, NULL, ?, ?)",
        (
            &fields.name,
            &fields.date_of_birth,
            &fields.gender,
            &fields.address,
            &fields.guardian_name,
            &fields.guardian_nic,
            &fields.guardian_contact,
            &fields.registration_date,
            &fields.grade,
        ),
    )
    .map_err(|e| HandlerErr::new("db_insert_failed", e.to_string()))?;
    let student_id = tx.last_insert_rowid();

    let mut warnings: Vec<String> = Vec::new();
    let mut image_path: Option<String> = None;

    if let Some(src) = image_source {
        match assets::save_profile_image(workspace, Path::new(&src), &fields.name, student_id) {
            Ok(dest) => {
                let dest = dest.to_string_lossy().to_string();
                tx.execute(
                    "UPDATE students SET image_path = ? WHERE id = ?",
                    (&dest, student_id),
                )
                .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
                image_path = Some(dest);
            }
            Err(e) => warnings.push(format!("profile image was not saved: {}", e)),
        }
    }

    let mut certificate_ids: Vec<i64> = Vec::new();
    for (src, note) in &attachments {
        match assets::save_certificate(
            workspace,
            Path::new(src),
            &fields.name,
            student_id,
            note.as_deref(),
        ) {
            Ok(dest) => {
                tx.execute(
                    "INSERT INTO certificates(student_id, certificate_image_path, note)
                     VALUES(?, ?, ?)",
                    (student_id, dest.to_string_lossy().to_string(), note),
                )
                .map_err(|e| HandlerErr::new("db_insert_failed", e.to_string()))?;
                certificate_ids.push(tx.last_insert_rowid());
            }
            Err(e) => warnings.push(format!("certificate was not saved: {}", e)),
        }
    }

    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    Ok(json!({
        "studentId": student_id,
        "imagePath": image_path,
        "certificateIds": certificate_ids,
        "warnings": warnings,
    }))
}

fn list(conn: &Connection, search: Option<&str>) -> Result<serde_json::Value, HandlerErr> {
    let sql = format!(
        "SELECT {} FROM students {} ORDER BY student_name",
        STUDENT_COLUMNS,
        if search.is_some() {
            "WHERE student_name LIKE ?"
        } else {
            ""
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = match search {
        Some(term) => stmt
            .query_map([format!("%{}%", term)], student_json)?
            .collect::<Result<Vec<_>, _>>()?,
        None => stmt
            .query_map([], student_json)?
            .collect::<Result<Vec<_>, _>>()?,
    };
    Ok(json!({ "students": rows }))
}

fn get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_i64(params, "studentId")?;
    let sql = format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLUMNS);
    let row = conn
        .query_row(&sql, [student_id], student_json)
        .optional()?;
    match row {
        Some(student) => Ok(json!({ "student": student })),
        None => Err(HandlerErr::not_found("student")),
    }
}

fn update(
    conn: &Connection,
    workspace: &Path,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_i64(params, "studentId")?;
    let fields = parse_student_fields(params)?;

    let existing: Option<(String, Option<String>)> = conn
        .query_row(
            "SELECT student_name, image_path FROM students WHERE id = ?",
            [student_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((old_name, mut old_image)) = existing else {
        return Err(HandlerErr::not_found("student"));
    };

    let mut warnings: Vec<String> = Vec::new();

    // A rename moves the asset folder with the student and re-points the
    // stored paths, so later deletes and exports find everything under the
    // current derivation.
    let old_folder = assets::student_folder_path(workspace, &old_name, student_id);
    let new_folder = assets::student_folder_path(workspace, &fields.name, student_id);
    if old_folder != new_folder && old_folder.exists() {
        match std::fs::rename(&old_folder, &new_folder) {
            Ok(()) => {
                let from = old_folder.to_string_lossy().to_string();
                let to = new_folder.to_string_lossy().to_string();
                conn.execute(
                    "UPDATE certificates
                     SET certificate_image_path = REPLACE(certificate_image_path, ?, ?)
                     WHERE student_id = ?",
                    (&from, &to, student_id),
                )
                .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
                if let Some(img) = old_image.take() {
                    old_image = Some(img.replace(&from, &to));
                }
            }
            Err(e) => warnings.push(format!("student folder was not renamed: {}", e)),
        }
    }

    let mut image_path = old_image.clone();

    if let Some(src) = optional_str(params, "imagePath") {
        match assets::save_profile_image(workspace, Path::new(&src), &fields.name, student_id) {
            Ok(dest) => {
                if let Some(old) = &old_image {
                    if !assets::delete_file(Path::new(old)) {
                        warnings.push("previous profile image was not removed".to_string());
                    }
                }
                image_path = Some(dest.to_string_lossy().to_string());
            }
            Err(e) => warnings.push(format!("profile image was not saved: {}", e)),
        }
    }

    conn.execute(
        "UPDATE students
         SET student_name = ?, date_of_birth = ?, gender = ?, address = ?, guardian_name = ?,
             guardian_nic = ?, guardian_contact = ?, image_path = ?, registration_date = ?, grade = ?
         WHERE id = ?",
        (
            &fields.name,
            &fields.date_of_birth,
            &fields.gender,
            &fields.address,
            &fields.guardian_name,
            &fields.guardian_nic,
            &fields.guardian_contact,
            &image_path,
            &fields.registration_date,
            &fields.grade,
            student_id,
        ),
    )
    .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;

    Ok(json!({
        "message": "Student updated successfully",
        "imagePath": image_path,
        "warnings": warnings,
    }))
}

/// Cascade delete: exam results, certificates and the note go in the same
/// transaction as the student row (the schema declares no ON DELETE
/// CASCADE). Asset cleanup happens after commit and its failures are
/// reported, not swallowed.
fn delete(
    conn: &Connection,
    workspace: &Path,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_i64(params, "studentId")?;

    let row: Option<(String, Option<String>)> = conn
        .query_row(
            "SELECT student_name, image_path FROM students WHERE id = ?",
            [student_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((student_name, image_path)) = row else {
        return Err(HandlerErr::not_found("student"));
    };

    let mut stmt =
        conn.prepare("SELECT certificate_image_path FROM certificates WHERE student_id = ?")?;
    let cert_paths: Vec<String> = stmt
        .query_map([student_id], |r| r.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    drop(stmt);

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    for (table, sql) in [
        ("exam_results", "DELETE FROM exam_results WHERE student_id = ?"),
        ("certificates", "DELETE FROM certificates WHERE student_id = ?"),
        ("student_notes", "DELETE FROM student_notes WHERE student_id = ?"),
        ("students", "DELETE FROM students WHERE id = ?"),
    ] {
        if let Err(e) = tx.execute(sql, [student_id]) {
            let _ = tx.rollback();
            return Err(HandlerErr {
                code: "db_delete_failed",
                message: e.to_string(),
                details: Some(json!({ "table": table })),
            });
        }
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    let mut file_warnings: Vec<String> = Vec::new();
    if let Err(e) = assets::remove_student_folder(workspace, &student_name, student_id) {
        file_warnings.push(e.to_string());
    }
    // Rows migrated from the flat-directory era can point outside the
    // student folder; sweep those up individually.
    let folder = assets::student_folder_path(workspace, &student_name, student_id);
    let stragglers = image_path.into_iter().chain(cert_paths);
    for path in stragglers {
        let p = PathBuf::from(&path);
        if !p.starts_with(&folder) && p.exists() && !assets::delete_file(&p) {
            file_warnings.push(format!("file was not removed: {}", path));
        }
    }

    Ok(json!({
        "message": "Student deleted successfully",
        "fileWarnings": file_warnings,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let outcome = match req.method.as_str() {
        "students.register" | "students.update" | "students.delete" | "students.list"
        | "students.search" | "students.get" => {
            let (Some(workspace), Some(conn)) = (state.workspace.clone(), state.db.as_ref())
            else {
                return Some(err(&req.id, "no_workspace", "select a workspace first", None));
            };
            match req.method.as_str() {
                "students.register" => register(conn, &workspace, &req.params),
                "students.update" => update(conn, &workspace, &req.params),
                "students.delete" => delete(conn, &workspace, &req.params),
                "students.list" => {
                    let search = optional_str(&req.params, "search");
                    list(conn, search.as_deref())
                }
                "students.search" => match required_str(&req.params, "term") {
                    Ok(term) => list(conn, Some(&term)),
                    Err(e) => Err(e),
                },
                "students.get" => get(conn, &req.params),
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
