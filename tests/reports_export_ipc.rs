use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_studentd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn studentd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    serde_json::from_str(line.trim()).expect("parse response json")
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

fn register_student(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    name: &str,
) -> i64 {
    let result = request_ok(
        stdin,
        reader,
        id,
        "students.register",
        json!({
            "studentName": name,
            "dateOfBirth": "2007-11-02",
            "gender": "Male",
            "address": "21 Main Street",
            "guardianName": "Report Guardian",
            "guardianNic": "197012345678",
            "guardianContact": "0761234567",
            "registrationDate": "2020-01-20",
            "grade": "Grade 6"
        }),
    );
    result.get("studentId").and_then(|v| v.as_i64()).expect("studentId")
}

fn add_result(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    student_id: i64,
    exam_name: &str,
    year: i64,
    marks: f64,
) {
    let _ = request_ok(
        stdin,
        reader,
        id,
        "examResults.add",
        json!({
            "studentId": student_id,
            "examName": exam_name,
            "examYear": year,
            "marksObtained": marks
        }),
    );
}

#[test]
fn export_writes_a_pdf_into_the_student_folder() {
    let workspace = temp_dir("studentd-report");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let student_id = register_student(&mut stdin, &mut reader, "2", "Report Kid");
    add_result(&mut stdin, &mut reader, "3", student_id, "First Term", 2023, 81.0);
    add_result(&mut stdin, &mut reader, "4", student_id, "Second Term", 2023, 64.0);

    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "reports.exportExamResults",
        json!({ "studentId": student_id }),
    );
    assert_eq!(exported.get("resultCount").and_then(|v| v.as_i64()), Some(2));
    let path = PathBuf::from(
        exported
            .get("path")
            .and_then(|v| v.as_str())
            .expect("report path"),
    );
    assert!(path.starts_with(
        workspace
            .join("students")
            .join(format!("Report_Kid_{}", student_id))
    ));
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("pdf"));

    let bytes = std::fs::read(&path).expect("read exported pdf");
    assert!(bytes.starts_with(b"%PDF"), "exported file is not a pdf");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn export_respects_exam_and_year_filters() {
    let workspace = temp_dir("studentd-report");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let student_id = register_student(&mut stdin, &mut reader, "2", "Filtered Report");
    add_result(&mut stdin, &mut reader, "3", student_id, "First Term", 2023, 50.0);
    add_result(&mut stdin, &mut reader, "4", student_id, "First Term", 2024, 55.0);
    add_result(&mut stdin, &mut reader, "5", student_id, "Third Term", 2024, 60.0);

    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "reports.exportExamResults",
        json!({ "studentId": student_id, "examName": "First Term", "examYear": 2024 }),
    );
    assert_eq!(exported.get("resultCount").and_then(|v| v.as_i64()), Some(1));

    // The year filter binds when it arrives as a string too.
    let string_year = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "reports.exportExamResults",
        json!({ "studentId": student_id, "examYear": "2024" }),
    );
    assert_eq!(string_year.get("resultCount").and_then(|v| v.as_i64()), Some(2));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn export_with_no_matching_rows_fails_without_writing() {
    let workspace = temp_dir("studentd-report");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let student_id = register_student(&mut stdin, &mut reader, "2", "Empty Report");

    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "reports.exportExamResults",
        json!({ "studentId": student_id }),
    );
    assert_eq!(error_code(&resp), "no_results");

    // No asset folder should appear for a failed export.
    let folder = workspace
        .join("students")
        .join(format!("Empty_Report_{}", student_id));
    assert!(!folder.exists());

    let unknown = request(
        &mut stdin,
        &mut reader,
        "4",
        "reports.exportExamResults",
        json!({ "studentId": 9999 }),
    );
    assert_eq!(error_code(&unknown), "not_found");

    let _ = std::fs::remove_dir_all(workspace);
}
