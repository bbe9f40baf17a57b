use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{now_stamp, require_viewer};
use crate::ipc::types::{AppState, Request};
use crate::policy::{self, Action, Role, Viewer};
use crate::reports::AttendanceStatus;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
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

    fn bad_params(message: impl Into<String>) -> HandlerErr {
        HandlerErr {
            code: "bad_params",
            message: message.into(),
            details: None,
        }
    }
}

fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

fn get_month_key(params: &serde_json::Value) -> Result<String, HandlerErr> {
    let month = get_required_str(params, "month")?;
    let valid = month.len() == 7
        && chrono::NaiveDate::parse_from_str(&format!("{}-01", month), "%Y-%m-%d").is_ok();
    if !valid {
        return Err(HandlerErr::bad_params("month must be YYYY-MM"));
    }
    Ok(month)
}

#[derive(Debug, Clone)]
struct AttendanceRow {
    id: String,
    student_id: String,
    subject_id: String,
    date: String,
    status: String,
    student_name: String,
    student_parent_id: String,
    subject_name: String,
    subject_teacher_id: String,
}

fn attendance_json(a: &AttendanceRow) -> serde_json::Value {
    json!({
        "id": a.id,
        "studentId": a.student_id,
        "subjectId": a.subject_id,
        "date": a.date,
        "status": a.status,
        "student": { "id": a.student_id, "fullName": a.student_name, "parentId": a.student_parent_id },
        "subject": { "id": a.subject_id, "name": a.subject_name, "teacherId": a.subject_teacher_id }
    })
}

const ATTENDANCE_SELECT: &str = "SELECT a.id, a.student_id, a.subject_id, a.date, a.status,
        s.full_name, s.parent_id, sub.name, sub.teacher_id
 FROM attendance a
 JOIN students s ON s.id = a.student_id
 JOIN subjects sub ON sub.id = a.subject_id";

fn map_attendance_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<AttendanceRow> {
    Ok(AttendanceRow {
        id: r.get(0)?,
        student_id: r.get(1)?,
        subject_id: r.get(2)?,
        date: r.get(3)?,
        status: r.get(4)?,
        student_name: r.get(5)?,
        student_parent_id: r.get(6)?,
        subject_name: r.get(7)?,
        subject_teacher_id: r.get(8)?,
    })
}

fn attendance_list(
    conn: &Connection,
    viewer: &Viewer,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    // The month bounds the candidate set before any role scoping.
    let month = get_month_key(params)?;
    let mut stmt = conn
        .prepare(&format!(
            "{} WHERE substr(a.date, 1, 7) = ? ORDER BY a.date, s.full_name",
            ATTENDANCE_SELECT
        ))
        .map_err(HandlerErr::db)?;
    let mut rows = stmt
        .query_map([&month], map_attendance_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;

    rows.retain(|a| {
        policy::attendance_visible(viewer, &a.subject_teacher_id, &a.student_parent_id)
    });

    if let Some(student_id) = params.get("studentId").and_then(|v| v.as_str()) {
        rows.retain(|a| a.student_id == student_id);
    }

    let records: Vec<serde_json::Value> = rows.iter().map(attendance_json).collect();
    Ok(json!({ "records": records }))
}

fn attendance_create(
    conn: &Connection,
    viewer: &Viewer,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    if !policy::permits(viewer.role, Action::RecordAttendance) {
        return Err(HandlerErr {
            code: "forbidden",
            message: "role may not record attendance".to_string(),
            details: None,
        });
    }
    let student_id = get_required_str(params, "studentId")?;
    let subject_id = get_required_str(params, "subjectId")?;
    let date = get_required_str(params, "date")?;
    if chrono::NaiveDate::parse_from_str(&date, "%Y-%m-%d").is_err() {
        return Err(HandlerErr::bad_params("date must be YYYY-MM-DD"));
    }
    let status_raw = get_required_str(params, "status")?;
    let Some(status) = AttendanceStatus::parse(&status_raw) else {
        return Err(HandlerErr::bad_params(
            "status must be one of: presente, ausente, tardanza",
        ));
    };

    let subject_teacher: Option<String> = conn
        .query_row(
            "SELECT teacher_id FROM subjects WHERE id = ?",
            [&subject_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::db)?;
    let Some(subject_teacher) = subject_teacher else {
        return Err(HandlerErr {
            code: "not_found",
            message: "subject not found".to_string(),
            details: None,
        });
    };
    if viewer.role == Role::Docente && subject_teacher != viewer.id {
        return Err(HandlerErr {
            code: "forbidden",
            message: "subject is taught by another teacher".to_string(),
            details: None,
        });
    }
    let student_exists = conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [&student_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()
        .map_err(HandlerErr::db)?
        .is_some();
    if !student_exists {
        return Err(HandlerErr {
            code: "not_found",
            message: "student not found".to_string(),
            details: None,
        });
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO attendance(id, student_id, subject_id, date, status, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &id,
            &student_id,
            &subject_id,
            &date,
            status.as_str(),
            now_stamp(),
        ),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "attendance" })),
    })?;

    let row = conn
        .query_row(
            &format!("{} WHERE a.id = ?", ATTENDANCE_SELECT),
            [&id],
            map_attendance_row,
        )
        .map_err(HandlerErr::db)?;
    Ok(json!({ "record": attendance_json(&row) }))
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
        "attendance.list" => Some(dispatch(state, req, attendance_list)),
        "attendance.create" => Some(dispatch(state, req, attendance_create)),
        _ => None,
    }
}
