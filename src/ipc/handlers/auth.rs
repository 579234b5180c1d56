use crate::auth;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;

fn handle_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let username = match req.params.get("username").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing username", None),
    };
    let Some(password) = req.params.get("password").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing password", None);
    };

    let row: Option<(i64, String, String)> = match conn
        .query_row(
            "SELECT id, password_hash, salt FROM users WHERE username = ?",
            [&username],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    // Same failure message whether the username or the password was wrong.
    let Some((user_id, stored_hash, salt)) = row else {
        return err(&req.id, "auth_failed", "Invalid username or password", None);
    };
    if !auth::verify_password(password, &salt, &stored_hash) {
        return err(&req.id, "auth_failed", "Invalid username or password", None);
    }

    // Rows from pre-salt databases get re-hashed now that we know the
    // cleartext verifies.
    if salt.is_empty() {
        let new_salt = auth::new_salt();
        let new_hash = auth::hash_password(password, &new_salt);
        if let Err(e) = conn.execute(
            "UPDATE users SET password_hash = ?, salt = ? WHERE id = ?",
            (&new_hash, &new_salt, user_id),
        ) {
            tracing::warn!(error = %e, "failed to upgrade legacy password hash");
        } else {
            tracing::info!(username = %username, "upgraded legacy password hash");
        }
    }

    state.current_user = Some(username.clone());
    ok(&req.id, json!({ "username": username }))
}

fn handle_logout(state: &mut AppState, req: &Request) -> serde_json::Value {
    state.current_user = None;
    ok(&req.id, json!({ "loggedOut": true }))
}

fn handle_session(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, json!({ "currentUser": state.current_user }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.login" => Some(handle_login(state, req)),
        "auth.logout" => Some(handle_logout(state, req)),
        "auth.session" => Some(handle_session(state, req)),
        _ => None,
    }
}
