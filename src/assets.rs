//! Per-student asset folders: profile images, certificate scans and exported
//! reports all live under `students/<SanitizedName>_<id>/` in the workspace.
//! The id suffix keeps folders unique even when two students share a name.

use anyhow::Context;
use chrono::Local;
use std::path::{Path, PathBuf};

pub const STUDENTS_DIR: &str = "students";

/// Spaces become underscores, everything outside `[A-Za-z0-9_]` is dropped.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c == ' ' { '_' } else { c })
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}

pub fn student_folder_name(student_name: &str, student_id: i64) -> String {
    format!("{}_{}", sanitize_name(student_name), student_id)
}

pub fn student_folder_path(workspace: &Path, student_name: &str, student_id: i64) -> PathBuf {
    workspace
        .join(STUDENTS_DIR)
        .join(student_folder_name(student_name, student_id))
}

pub fn ensure_student_folder(
    workspace: &Path,
    student_name: &str,
    student_id: i64,
) -> anyhow::Result<PathBuf> {
    let folder = student_folder_path(workspace, student_name, student_id);
    std::fs::create_dir_all(&folder)
        .with_context(|| format!("failed to create student folder {}", folder.display()))?;
    Ok(folder)
}

fn file_extension(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default()
}

fn timestamp_compact() -> String {
    Local::now().format("%Y%m%d%H%M%S").to_string()
}

/// Copy a profile image into the student folder as
/// `profile_<YYYYMMDDHHMMSS><ext>`. Returns the destination path.
pub fn save_profile_image(
    workspace: &Path,
    source: &Path,
    student_name: &str,
    student_id: i64,
) -> anyhow::Result<PathBuf> {
    let folder = ensure_student_folder(workspace, student_name, student_id)?;
    let dest = folder.join(format!(
        "profile_{}{}",
        timestamp_compact(),
        file_extension(source)
    ));
    std::fs::copy(source, &dest)
        .with_context(|| format!("failed to copy image {}", source.display()))?;
    Ok(dest)
}

/// Copy a certificate into the student folder as
/// `<SafeName>_certificate[_<SafeNote>]_<ts>[_<seq>]<ext>`. The timestamp is
/// second-resolution, so a numeric suffix is appended until the destination
/// is free; copies landing within the same second never overwrite each other.
pub fn save_certificate(
    workspace: &Path,
    source: &Path,
    student_name: &str,
    student_id: i64,
    note: Option<&str>,
) -> anyhow::Result<PathBuf> {
    let folder = ensure_student_folder(workspace, student_name, student_id)?;
    let safe_name = sanitize_name(student_name);
    let ts = timestamp_compact();
    let stem = match note.map(str::trim).filter(|n| !n.is_empty()) {
        Some(n) => format!("{}_certificate_{}_{}", safe_name, sanitize_name(n), ts),
        None => format!("{}_certificate_{}", safe_name, ts),
    };
    let ext = file_extension(source);
    let mut dest = folder.join(format!("{}{}", stem, ext));
    let mut seq = 0usize;
    while dest.exists() {
        seq += 1;
        dest = folder.join(format!("{}_{}{}", stem, seq, ext));
    }
    std::fs::copy(source, &dest)
        .with_context(|| format!("failed to copy certificate {}", source.display()))?;
    Ok(dest)
}

/// Best-effort removal of a single asset file. A missing file counts as
/// failure so callers can tell the user the cleanup did not happen.
pub fn delete_file(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "asset delete failed");
            false
        }
    }
}

/// Removes the whole asset folder when a student record is deleted. The
/// folder may legitimately not exist (student never had attachments).
pub fn remove_student_folder(
    workspace: &Path,
    student_name: &str,
    student_id: i64,
) -> anyhow::Result<()> {
    let folder = student_folder_path(workspace, student_name, student_id);
    if !folder.exists() {
        return Ok(());
    }
    std::fs::remove_dir_all(&folder)
        .with_context(|| format!("failed to remove student folder {}", folder.display()))
}

/// Destination for an exported results report, inside the student folder.
pub fn report_path(workspace: &Path, student_name: &str, student_id: i64) -> PathBuf {
    let ts = Local::now().format("%Y%m%d_%H%M%S");
    student_folder_path(workspace, student_name, student_id).join(format!(
        "{}_{}_exam_results_{}.pdf",
        sanitize_name(student_name),
        student_id,
        ts
    ))
}
