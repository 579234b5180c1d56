use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{optional_i64_loose, optional_str, required_i64, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::report::{self, ExamRow, ReportFilters, StudentInfo};
use rusqlite::{params_from_iter, Connection, OptionalExtension, ToSql};
use serde_json::json;
use std::path::Path;

/// Exports the filtered per-student results table as a PDF into the
/// student's asset folder. Mirrors the on-screen filter semantics so the
/// export always matches what the user is looking at.
fn export_exam_results(
    conn: &Connection,
    workspace: &Path,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_i64(params, "studentId")?;
    let filters = ReportFilters {
        exam_name: optional_str(params, "examName"),
        exam_year: optional_i64_loose(params, "examYear")?,
    };

    let student: Option<StudentInfo> = conn
        .query_row(
            "SELECT id, student_name, grade, registration_date FROM students WHERE id = ?",
            [student_id],
            |r| {
                Ok(StudentInfo {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    grade: r.get(2)?,
                    registration_date: r.get(3)?,
                })
            },
        )
        .optional()?;
    let Some(student) = student else {
        return Err(HandlerErr::not_found("student"));
    };

    let mut sql = String::from(
        "SELECT exam_name, exam_year, marks_obtained, grade
         FROM exam_results WHERE student_id = ?",
    );
    let mut binds: Vec<Box<dyn ToSql>> = vec![Box::new(student_id)];
    if let Some(name) = &filters.exam_name {
        sql.push_str(" AND exam_name = ?");
        binds.push(Box::new(name.clone()));
    }
    if let Some(year) = filters.exam_year {
        sql.push_str(" AND exam_year = ?");
        binds.push(Box::new(year));
    }
    sql.push_str(" ORDER BY exam_year DESC, id");

    let mut stmt = conn.prepare(&sql)?;
    let rows: Vec<ExamRow> = stmt
        .query_map(params_from_iter(binds.iter().map(|b| b.as_ref())), |r| {
            Ok(ExamRow {
                exam_name: r.get(0)?,
                exam_year: r.get(1)?,
                marks_obtained: r.get(2)?,
                grade: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    if rows.is_empty() {
        return Err(HandlerErr::new(
            "no_results",
            "No exam results to export with current filters",
        ));
    }

    match report::generate_exam_results_pdf(workspace, &student, &rows, &filters) {
        Ok(path) => {
            tracing::info!(path = %path.display(), "exported exam results report");
            Ok(json!({
                "path": path.to_string_lossy().to_string(),
                "resultCount": rows.len(),
            }))
        }
        Err(e) => Err(HandlerErr::new("export_failed", e.to_string())),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.exportExamResults" => {
            let (Some(workspace), Some(conn)) = (state.workspace.clone(), state.db.as_ref())
            else {
                return Some(err(&req.id, "no_workspace", "select a workspace first", None));
            };
            Some(match export_exam_results(conn, &workspace, &req.params) {
                Ok(result) => ok(&req.id, result),
                Err(e) => e.response(&req.id),
            })
        }
        _ => None,
    }
}
