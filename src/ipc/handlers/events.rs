use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_conn, now_stamp, require_viewer, required_str, validate_date, validate_month_key,
};
use crate::ipc::types::{AppState, Request};
use crate::policy::{self, Action};
use serde_json::json;
use uuid::Uuid;

fn db_err(req: &Request, e: rusqlite::Error) -> serde_json::Value {
    err(&req.id, "db_query_failed", e.to_string(), None)
}

fn events_list(state: &AppState, req: &Request) -> Result<serde_json::Value, serde_json::Value> {
    let conn = db_conn(state, req)?;
    let viewer = require_viewer(state, req)?;

    let month = req
        .params
        .get("month")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    if let Some(m) = &month {
        validate_month_key(req, m)?;
    }

    let mut stmt = conn
        .prepare(
            "SELECT e.id, e.title, e.description, e.date, e.time, e.created_by, u.full_name
             FROM events e
             JOIN users u ON u.id = e.created_by
             ORDER BY e.date, e.time",
        )
        .map_err(|e| db_err(req, e))?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, String>(4)?,
                r.get::<_, String>(5)?,
                r.get::<_, String>(6)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| db_err(req, e))?;

    let events: Vec<serde_json::Value> = rows
        .iter()
        .filter(|_| policy::event_visible(&viewer))
        .filter(|(_, _, _, date, _, _, _)| match &month {
            Some(m) => date.starts_with(m.as_str()),
            None => true,
        })
        .map(|(id, title, description, date, time, created_by, creator_name)| {
            json!({
                "id": id,
                "title": title,
                "description": description,
                "date": date,
                "time": time,
                "createdBy": created_by,
                "creator": { "id": created_by, "fullName": creator_name }
            })
        })
        .collect();

    Ok(json!({ "events": events }))
}

fn events_create(state: &AppState, req: &Request) -> Result<serde_json::Value, serde_json::Value> {
    let conn = db_conn(state, req)?;
    let viewer = require_viewer(state, req)?;
    if !policy::permits(viewer.role, Action::CreateEvent) {
        return Err(err(&req.id, "forbidden", "role may not create events", None));
    }

    let title = required_str(req, "title")?;
    let description = required_str(req, "description")?;
    let date = required_str(req, "date")?;
    validate_date(req, &date)?;
    let time = required_str(req, "time")?;

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO events(id, title, description, date, time, created_by, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &title,
            &description,
            &date,
            &time,
            &viewer.id,
            now_stamp(),
        ),
    )
    .map_err(|e| err(&req.id, "db_insert_failed", e.to_string(), None))?;

    let event = conn
        .query_row(
            "SELECT e.id, e.title, e.description, e.date, e.time, e.created_by, u.full_name
             FROM events e JOIN users u ON u.id = e.created_by WHERE e.id = ?",
            [&id],
            |r| {
                Ok(json!({
                    "id": r.get::<_, String>(0)?,
                    "title": r.get::<_, String>(1)?,
                    "description": r.get::<_, String>(2)?,
                    "date": r.get::<_, String>(3)?,
                    "time": r.get::<_, String>(4)?,
                    "createdBy": r.get::<_, String>(5)?,
                    "creator": { "id": r.get::<_, String>(5)?, "fullName": r.get::<_, String>(6)? }
                }))
            },
        )
        .map_err(|e| db_err(req, e))?;

    Ok(json!({ "event": event }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "events.list" => Some(
            events_list(state, req)
                .map(|r| ok(&req.id, r))
                .unwrap_or_else(|e| e),
        ),
        "events.create" => Some(
            events_create(state, req)
                .map(|r| ok(&req.id, r))
                .unwrap_or_else(|e| e),
        ),
        _ => None,
    }
}
