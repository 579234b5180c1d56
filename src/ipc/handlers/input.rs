use crate::format;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

/// Keystroke formatting for the frontend: `input.format` takes the raw field
/// text and returns the normalized form to put back in the entry.
fn handle_format(req: &Request) -> serde_json::Value {
    let Some(kind) = req.params.get("kind").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing kind", None);
    };
    let Some(text) = req.params.get("text").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing text", None);
    };

    let formatted = match kind {
        "date" => format::format_date(text),
        "contact" => format::format_contact(text),
        "nic" => format::format_nic(text),
        "name" => format::format_name(text),
        "year" => format::format_year(text),
        "marks" => format::format_marks(text),
        other => {
            return err(
                &req.id,
                "bad_params",
                format!("unknown format kind: {}", other),
                None,
            )
        }
    };
    ok(&req.id, json!({ "formatted": formatted }))
}

pub fn try_handle(_state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "input.format" => Some(handle_format(req)),
        _ => None,
    }
}
