use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{now_stamp, require_viewer};
use crate::ipc::types::{AppState, Request};
use crate::policy::{self, Action, Role, Viewer};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::HashSet;
use uuid::Uuid;

struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl HandlerErr {
    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }

    fn db(e: rusqlite::Error) -> HandlerErr {
        HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        }
    }
}

fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: format!("missing {}", key),
            details: None,
        })
}

#[derive(Debug, Clone)]
struct NotificationRow {
    id: String,
    title: String,
    message: String,
    sender_id: String,
    recipient_id: String,
    read: bool,
    created_at: Option<String>,
    sender_name: String,
    recipient_name: String,
}

fn notification_json(n: &NotificationRow) -> serde_json::Value {
    json!({
        "id": n.id,
        "title": n.title,
        "message": n.message,
        "senderId": n.sender_id,
        "recipientId": n.recipient_id,
        "read": n.read,
        "createdAt": n.created_at,
        "sender": { "id": n.sender_id, "fullName": n.sender_name },
        "recipient": { "id": n.recipient_id, "fullName": n.recipient_name }
    })
}

const NOTIFICATION_SELECT: &str = "SELECT n.id, n.title, n.message, n.sender_id, n.recipient_id,
        n.read, n.created_at, su.full_name, ru.full_name
 FROM notifications n
 JOIN users su ON su.id = n.sender_id
 JOIN users ru ON ru.id = n.recipient_id";

fn map_notification_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<NotificationRow> {
    Ok(NotificationRow {
        id: r.get(0)?,
        title: r.get(1)?,
        message: r.get(2)?,
        sender_id: r.get(3)?,
        recipient_id: r.get(4)?,
        read: r.get::<_, i64>(5)? != 0,
        created_at: r.get(6)?,
        sender_name: r.get(7)?,
        recipient_name: r.get(8)?,
    })
}

fn notifications_list(
    conn: &Connection,
    viewer: &Viewer,
    _params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare(&format!(
            "{} ORDER BY n.created_at DESC",
            NOTIFICATION_SELECT
        ))
        .map_err(HandlerErr::db)?;
    let mut rows = stmt
        .query_map([], map_notification_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;

    rows.retain(|n| policy::notification_visible(viewer, &n.recipient_id));

    let notifications: Vec<serde_json::Value> = rows.iter().map(notification_json).collect();
    Ok(json!({ "notifications": notifications }))
}

/// Parents reachable by a teacher: parents of students in courses it owns.
fn reachable_parents(conn: &Connection, teacher_id: &str) -> Result<HashSet<String>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT DISTINCT s.parent_id
             FROM students s
             JOIN courses c ON c.id = s.course_id
             WHERE c.teacher_id = ?",
        )
        .map_err(HandlerErr::db)?;
    stmt.query_map([teacher_id], |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<HashSet<_>, _>>())
        .map_err(HandlerErr::db)
}

fn notifications_send(
    conn: &Connection,
    viewer: &Viewer,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    if !policy::permits(viewer.role, Action::SendNotification) {
        return Err(HandlerErr {
            code: "forbidden",
            message: "role may not send notifications".to_string(),
            details: None,
        });
    }
    let title = get_required_str(params, "title")?;
    let message = get_required_str(params, "message")?;
    let Some(recipients_json) = params.get("recipientIds").and_then(|v| v.as_array()) else {
        return Err(HandlerErr {
            code: "bad_params",
            message: "missing recipientIds".to_string(),
            details: None,
        });
    };
    let recipient_ids: Vec<String> = recipients_json
        .iter()
        .filter_map(|v| v.as_str().map(|s| s.to_string()))
        .collect();
    if recipient_ids.is_empty() {
        return Err(HandlerErr {
            code: "bad_params",
            message: "recipientIds must not be empty".to_string(),
            details: None,
        });
    }

    let teacher_scope = if viewer.role == Role::Docente {
        Some(reachable_parents(conn, &viewer.id)?)
    } else {
        None
    };

    // One independent insert per recipient, deliberately not a transaction:
    // partial delivery is possible and the response says exactly who got what.
    let mut sent: Vec<serde_json::Value> = Vec::new();
    let mut failed: Vec<serde_json::Value> = Vec::new();
    for recipient_id in recipient_ids {
        if let Some(scope) = &teacher_scope {
            if !scope.contains(&recipient_id) {
                failed.push(json!({
                    "recipientId": recipient_id,
                    "code": "forbidden",
                    "message": "recipient is not a parent of this teacher's students"
                }));
                continue;
            }
        }
        let recipient_exists = conn
            .query_row("SELECT 1 FROM users WHERE id = ?", [&recipient_id], |r| {
                r.get::<_, i64>(0)
            })
            .optional()
            .map_err(HandlerErr::db)?
            .is_some();
        if !recipient_exists {
            failed.push(json!({
                "recipientId": recipient_id,
                "code": "not_found",
                "message": "recipient not found"
            }));
            continue;
        }

        let id = Uuid::new_v4().to_string();
        let insert = conn.execute(
            "INSERT INTO notifications(id, title, message, sender_id, recipient_id, read, created_at)
             VALUES(?, ?, ?, ?, ?, 0, ?)",
            (&id, &title, &message, &viewer.id, &recipient_id, now_stamp()),
        );
        match insert {
            Ok(_) => {
                let row = conn
                    .query_row(
                        &format!("{} WHERE n.id = ?", NOTIFICATION_SELECT),
                        [&id],
                        map_notification_row,
                    )
                    .map_err(HandlerErr::db)?;
                sent.push(notification_json(&row));
            }
            Err(e) => failed.push(json!({
                "recipientId": recipient_id,
                "code": "db_insert_failed",
                "message": e.to_string()
            })),
        }
    }

    Ok(json!({ "sent": sent, "failed": failed }))
}

fn notifications_mark_read(
    conn: &Connection,
    viewer: &Viewer,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let notification_id = get_required_str(params, "notificationId")?;
    let row = conn
        .query_row(
            &format!("{} WHERE n.id = ?", NOTIFICATION_SELECT),
            [&notification_id],
            map_notification_row,
        )
        .optional()
        .map_err(HandlerErr::db)?;
    let Some(row) = row else {
        return Err(HandlerErr {
            code: "not_found",
            message: "notification not found".to_string(),
            details: None,
        });
    };
    if !policy::may_mark_read(viewer, &row.recipient_id) {
        return Err(HandlerErr {
            code: "forbidden",
            message: "only the recipient may mark a notification read".to_string(),
            details: None,
        });
    }

    conn.execute(
        "UPDATE notifications SET read = 1 WHERE id = ?",
        [&notification_id],
    )
    .map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "notifications" })),
    })?;

    let updated = conn
        .query_row(
            &format!("{} WHERE n.id = ?", NOTIFICATION_SELECT),
            [&notification_id],
            map_notification_row,
        )
        .map_err(HandlerErr::db)?;
    Ok(json!({ "notification": notification_json(&updated) }))
}

fn dispatch(
    state: &mut AppState,
    req: &Request,
    f: fn(&Connection, &Viewer, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let viewer = match require_viewer(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    match f(conn, &viewer, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "notifications.list" => Some(dispatch(state, req, notifications_list)),
        "notifications.send" => Some(dispatch(state, req, notifications_send)),
        "notifications.markRead" => Some(dispatch(state, req, notifications_mark_read)),
        _ => None,
    }
}
