use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{now_stamp, require_viewer};
use crate::ipc::types::{AppState, Request};
use crate::policy::{self, Action, Role, Viewer};
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

fn get_trimester(params: &serde_json::Value) -> Result<i64, HandlerErr> {
    let t = params
        .get("trimester")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::bad_params("missing trimester"))?;
    if !(1..=3).contains(&t) {
        return Err(HandlerErr::bad_params("trimester must be 1, 2 or 3"));
    }
    Ok(t)
}

#[derive(Debug, Clone)]
struct GradeRow {
    id: String,
    student_id: String,
    subject_id: String,
    grade: f64,
    trimester: i64,
    date: String,
    student_name: String,
    student_parent_id: String,
    subject_name: String,
    subject_teacher_id: String,
}

fn grade_json(g: &GradeRow) -> serde_json::Value {
    json!({
        "id": g.id,
        "studentId": g.student_id,
        "subjectId": g.subject_id,
        "grade": g.grade,
        "trimester": g.trimester,
        "date": g.date,
        "student": { "id": g.student_id, "fullName": g.student_name, "parentId": g.student_parent_id },
        "subject": { "id": g.subject_id, "name": g.subject_name, "teacherId": g.subject_teacher_id }
    })
}

const GRADE_SELECT: &str = "SELECT g.id, g.student_id, g.subject_id, g.grade, g.trimester, g.date,
        s.full_name, s.parent_id, sub.name, sub.teacher_id
 FROM grades g
 JOIN students s ON s.id = g.student_id
 JOIN subjects sub ON sub.id = g.subject_id";

fn map_grade_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<GradeRow> {
    Ok(GradeRow {
        id: r.get(0)?,
        student_id: r.get(1)?,
        subject_id: r.get(2)?,
        grade: r.get(3)?,
        trimester: r.get(4)?,
        date: r.get(5)?,
        student_name: r.get(6)?,
        student_parent_id: r.get(7)?,
        subject_name: r.get(8)?,
        subject_teacher_id: r.get(9)?,
    })
}

fn grades_list(
    conn: &Connection,
    viewer: &Viewer,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    // The trimester bounds the candidate set before any role scoping.
    let trimester = get_trimester(params)?;
    let mut stmt = conn
        .prepare(&format!(
            "{} WHERE g.trimester = ? ORDER BY g.date, s.full_name",
            GRADE_SELECT
        ))
        .map_err(HandlerErr::db)?;
    let mut rows = stmt
        .query_map([trimester], map_grade_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;

    rows.retain(|g| policy::grade_visible(viewer, &g.subject_teacher_id, &g.student_parent_id));

    // A selected student narrows the role-visible set, never widens it.
    if let Some(student_id) = params.get("studentId").and_then(|v| v.as_str()) {
        rows.retain(|g| g.student_id == student_id);
    }

    let grades: Vec<serde_json::Value> = rows.iter().map(grade_json).collect();
    Ok(json!({ "grades": grades }))
}

fn grades_create(
    conn: &Connection,
    viewer: &Viewer,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    if !policy::permits(viewer.role, Action::RecordGrade) {
        return Err(HandlerErr {
            code: "forbidden",
            message: "role may not record grades".to_string(),
            details: None,
        });
    }
    let student_id = get_required_str(params, "studentId")?;
    let subject_id = get_required_str(params, "subjectId")?;
    let date = get_required_str(params, "date")?;
    let trimester = get_trimester(params)?;
    let grade = params
        .get("grade")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| HandlerErr::bad_params("missing grade"))?;

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
    // A teacher only grades its own subjects; the director is unrestricted.
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
        "INSERT INTO grades(id, student_id, subject_id, grade, trimester, date, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &student_id,
            &subject_id,
            grade,
            trimester,
            &date,
            now_stamp(),
        ),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "grades" })),
    })?;

    let row = conn
        .query_row(
            &format!("{} WHERE g.id = ?", GRADE_SELECT),
            [&id],
            map_grade_row,
        )
        .map_err(HandlerErr::db)?;
    Ok(json!({ "grade": grade_json(&row) }))
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
        "grades.list" => Some(dispatch(state, req, grades_list)),
        "grades.create" => Some(dispatch(state, req, grades_create)),
        _ => None,
    }
}
