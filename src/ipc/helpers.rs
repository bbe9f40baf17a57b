use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::policy::Viewer;
use crate::session::Session;
use rusqlite::Connection;

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

/// Resolve the active viewer. `Loading` is reported as its own state so a
/// client never mistakes the pre-hydration window for being signed out.
pub fn require_viewer(state: &AppState, req: &Request) -> Result<Viewer, serde_json::Value> {
    match &state.session {
        Session::Loading => Err(err(
            &req.id,
            "session_loading",
            "session not hydrated yet",
            None,
        )),
        Session::Anonymous => Err(err(&req.id, "not_signed_in", "sign in first", None)),
        Session::Authenticated(user) => Ok(user.viewer()),
    }
}

/// Course ids of the viewer's own children, for the familia material and
/// course scoping rules.
pub fn child_course_ids(conn: &Connection, parent_id: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT DISTINCT course_id FROM students WHERE parent_id = ?")?;
    let ids = stmt
        .query_map([parent_id], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Month keys arrive as `YYYY-MM`; reject anything else before it reaches a
/// LIKE-style date prefix match.
pub fn validate_month_key(req: &Request, month: &str) -> Result<(), serde_json::Value> {
    let valid = chrono::NaiveDate::parse_from_str(&format!("{}-01", month), "%Y-%m-%d").is_ok()
        && month.len() == 7;
    if valid {
        Ok(())
    } else {
        Err(err(
            &req.id,
            "bad_params",
            "month must be YYYY-MM",
            None,
        ))
    }
}

pub fn validate_date(req: &Request, date: &str) -> Result<(), serde_json::Value> {
    if chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok() {
        Ok(())
    } else {
        Err(err(&req.id, "bad_params", "date must be YYYY-MM-DD", None))
    }
}

pub fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

pub fn now_stamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
