use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, require_viewer};
use crate::ipc::types::{AppState, Request};
use crate::policy::Role;
use serde_json::json;

fn db_err(req: &Request, e: rusqlite::Error) -> serde_json::Value {
    err(&req.id, "db_query_failed", e.to_string(), None)
}

/// Per-role headline counts for the landing panel. Notification and event
/// counts are the same for every role: what landed in your inbox, and the
/// shared calendar.
fn dashboard_stats(
    state: &AppState,
    req: &Request,
) -> Result<serde_json::Value, serde_json::Value> {
    let conn = db_conn(state, req)?;
    let viewer = require_viewer(state, req)?;

    let count =
        |sql: &str, params: &[&dyn rusqlite::ToSql]| -> Result<i64, serde_json::Value> {
            conn.query_row(sql, params, |r| r.get::<_, i64>(0))
                .map_err(|e| db_err(req, e))
        };

    let students = match viewer.role {
        Role::Director => count("SELECT COUNT(*) FROM students", &[])?,
        Role::Docente => count(
            "SELECT COUNT(*) FROM students s
             JOIN courses c ON c.id = s.course_id
             WHERE c.teacher_id = ?",
            &[&viewer.id],
        )?,
        Role::Familia => count(
            "SELECT COUNT(*) FROM students WHERE parent_id = ?",
            &[&viewer.id],
        )?,
    };

    let courses = match viewer.role {
        Role::Director => count("SELECT COUNT(*) FROM courses", &[])?,
        Role::Docente => count(
            "SELECT COUNT(*) FROM courses WHERE teacher_id = ?",
            &[&viewer.id],
        )?,
        Role::Familia => count(
            "SELECT COUNT(DISTINCT course_id) FROM students WHERE parent_id = ?",
            &[&viewer.id],
        )?,
    };

    let notifications = count(
        "SELECT COUNT(*) FROM notifications WHERE recipient_id = ?",
        &[&viewer.id],
    )?;
    let unread_notifications = count(
        "SELECT COUNT(*) FROM notifications WHERE recipient_id = ? AND read = 0",
        &[&viewer.id],
    )?;
    let events = count("SELECT COUNT(*) FROM events", &[])?;

    Ok(json!({
        "students": students,
        "courses": courses,
        "notifications": notifications,
        "unreadNotifications": unread_notifications,
        "events": events
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "dashboard.stats" => Some(
            dashboard_stats(state, req)
                .map(|r| ok(&req.id, r))
                .unwrap_or_else(|e| e),
        ),
        _ => None,
    }
}
