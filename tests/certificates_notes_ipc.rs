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
            "dateOfBirth": "2009-04-12",
            "gender": "Female",
            "address": "3 Flower Road",
            "guardianName": "Some Guardian",
            "guardianNic": "197512345678",
            "guardianContact": "0751234567",
            "registrationDate": "2021-02-01",
            "grade": "Grade 2"
        }),
    );
    result.get("studentId").and_then(|v| v.as_i64()).expect("studentId")
}

#[test]
fn certificate_add_list_delete_manages_the_backing_file() {
    let workspace = temp_dir("studentd-certs");
    let uploads = temp_dir("studentd-certs-uploads");
    let scan = uploads.join("scan.png");
    std::fs::write(&scan, b"certificate scan bytes").expect("write scan");

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let student_id = register_student(&mut stdin, &mut reader, "2", "Cert Holder");

    let added = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "certificates.add",
        json!({
            "studentId": student_id,
            "sourcePath": scan.to_string_lossy(),
            "note": "Chess Champion"
        }),
    );
    let cert_id = added
        .get("certificateId")
        .and_then(|v| v.as_i64())
        .expect("certificateId");
    let copied = PathBuf::from(
        added
            .get("certificateImagePath")
            .and_then(|v| v.as_str())
            .expect("path"),
    );
    let folder = workspace
        .join("students")
        .join(format!("Cert_Holder_{}", student_id));
    assert!(copied.starts_with(&folder));
    assert!(copied
        .file_name()
        .unwrap()
        .to_string_lossy()
        .contains("Chess_Champion"));
    assert_eq!(std::fs::read(&copied).unwrap(), b"certificate scan bytes");
    // The source upload stays where it was.
    assert!(scan.exists());

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "certificates.list",
        json!({ "studentId": student_id }),
    );
    let certs = listed.get("certificates").and_then(|v| v.as_array()).unwrap();
    assert_eq!(certs.len(), 1);
    assert_eq!(certs[0].get("id").and_then(|v| v.as_i64()), Some(cert_id));
    assert_eq!(
        certs[0].get("note").and_then(|v| v.as_str()),
        Some("Chess Champion")
    );

    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "certificates.delete",
        json!({ "certificateId": cert_id }),
    );
    assert_eq!(
        deleted
            .get("fileWarnings")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(0)
    );
    assert!(!copied.exists());

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "certificates.list",
        json!({ "studentId": student_id }),
    );
    assert_eq!(
        listed
            .get("certificates")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(0)
    );

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(uploads);
}

#[test]
fn back_to_back_adds_with_one_note_keep_separate_files() {
    let workspace = temp_dir("studentd-certs");
    let uploads = temp_dir("studentd-certs-uploads");
    let first = uploads.join("first.jpg");
    let second = uploads.join("second.jpg");
    std::fs::write(&first, b"first scan").expect("write first");
    std::fs::write(&second, b"second scan").expect("write second");

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let student_id = register_student(&mut stdin, &mut reader, "2", "Twin Scans");

    // Same note, same second-resolution timestamp.
    let added_a = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "certificates.add",
        json!({
            "studentId": student_id,
            "sourcePath": first.to_string_lossy(),
            "note": "Best Speaker"
        }),
    );
    let added_b = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "certificates.add",
        json!({
            "studentId": student_id,
            "sourcePath": second.to_string_lossy(),
            "note": "Best Speaker"
        }),
    );
    let path_a = added_a
        .get("certificateImagePath")
        .and_then(|v| v.as_str())
        .unwrap()
        .to_string();
    let path_b = added_b
        .get("certificateImagePath")
        .and_then(|v| v.as_str())
        .unwrap()
        .to_string();
    assert_ne!(path_a, path_b, "both certificate rows point at the same file");
    assert_eq!(std::fs::read(&path_a).unwrap(), b"first scan");
    assert_eq!(std::fs::read(&path_b).unwrap(), b"second scan");

    // Deleting one row must not touch the other's backing file.
    let cert_a = added_a.get("certificateId").and_then(|v| v.as_i64()).unwrap();
    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "certificates.delete",
        json!({ "certificateId": cert_a }),
    );
    assert_eq!(
        deleted
            .get("fileWarnings")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(0)
    );
    assert!(!PathBuf::from(&path_a).exists());
    assert_eq!(std::fs::read(&path_b).unwrap(), b"second scan");

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(uploads);
}

#[test]
fn certificate_delete_surfaces_missing_file_as_warning() {
    let workspace = temp_dir("studentd-certs");
    let uploads = temp_dir("studentd-certs-uploads");
    let scan = uploads.join("scan.png");
    std::fs::write(&scan, b"bytes").expect("write scan");

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let student_id = register_student(&mut stdin, &mut reader, "2", "Warning Case");

    let added = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "certificates.add",
        json!({ "studentId": student_id, "sourcePath": scan.to_string_lossy() }),
    );
    let cert_id = added.get("certificateId").and_then(|v| v.as_i64()).unwrap();
    let copied = added
        .get("certificateImagePath")
        .and_then(|v| v.as_str())
        .unwrap()
        .to_string();
    std::fs::remove_file(&copied).expect("remove backing file out of band");

    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "certificates.delete",
        json!({ "certificateId": cert_id }),
    );
    let warnings = deleted
        .get("fileWarnings")
        .and_then(|v| v.as_array())
        .unwrap();
    assert_eq!(warnings.len(), 1, "missing file must be reported");

    let missing = request(
        &mut stdin,
        &mut reader,
        "5",
        "certificates.delete",
        json!({ "certificateId": cert_id }),
    );
    assert_eq!(error_code(&missing), "not_found");

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(uploads);
}

#[test]
fn notes_upsert_keeps_one_record_per_student() {
    let workspace = temp_dir("studentd-notes");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let student_id = register_student(&mut stdin, &mut reader, "2", "Note Subject");

    let empty = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "notes.get",
        json!({ "studentId": student_id }),
    );
    assert!(empty.get("notes").map(|v| v.is_null()).unwrap_or(false));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "notes.save",
        json!({ "studentId": student_id, "notes": "first draft" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "notes.save",
        json!({ "studentId": student_id, "notes": "second draft" }),
    );

    let fetched = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "notes.get",
        json!({ "studentId": student_id }),
    );
    assert_eq!(
        fetched.get("notes").and_then(|v| v.as_str()),
        Some("second draft")
    );
    assert!(fetched.get("updatedAt").and_then(|v| v.as_str()).is_some());

    let no_student = request(
        &mut stdin,
        &mut reader,
        "7",
        "notes.save",
        json!({ "studentId": 9999, "notes": "nobody" }),
    );
    assert_eq!(error_code(&no_student), "not_found");

    let _ = std::fs::remove_dir_all(workspace);
}
