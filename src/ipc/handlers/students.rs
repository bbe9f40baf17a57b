use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{now_stamp, require_viewer};
use crate::ipc::types::{AppState, Request};
use crate::policy::{self, Action, Viewer};
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
struct StudentRow {
    id: String,
    full_name: String,
    dni: String,
    birth_date: String,
    course_id: String,
    parent_id: String,
    course_name: String,
    course_year: i64,
    course_division: String,
    course_teacher_id: String,
}

fn student_json(s: &StudentRow) -> serde_json::Value {
    json!({
        "id": s.id,
        "fullName": s.full_name,
        "dni": s.dni,
        "birthDate": s.birth_date,
        "courseId": s.course_id,
        "parentId": s.parent_id,
        "course": {
            "id": s.course_id,
            "name": s.course_name,
            "year": s.course_year,
            "division": s.course_division,
            "teacherId": s.course_teacher_id
        }
    })
}

const STUDENT_SELECT: &str = "SELECT s.id, s.full_name, s.dni, s.birth_date, s.course_id,
        s.parent_id, c.name, c.year, c.division, c.teacher_id
 FROM students s
 JOIN courses c ON c.id = s.course_id";

fn map_student_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<StudentRow> {
    Ok(StudentRow {
        id: r.get(0)?,
        full_name: r.get(1)?,
        dni: r.get(2)?,
        birth_date: r.get(3)?,
        course_id: r.get(4)?,
        parent_id: r.get(5)?,
        course_name: r.get(6)?,
        course_year: r.get(7)?,
        course_division: r.get(8)?,
        course_teacher_id: r.get(9)?,
    })
}

fn fetch_student(conn: &Connection, student_id: &str) -> Result<Option<StudentRow>, HandlerErr> {
    conn.query_row(
        &format!("{} WHERE s.id = ?", STUDENT_SELECT),
        [student_id],
        map_student_row,
    )
    .optional()
    .map_err(HandlerErr::db)
}

fn students_list(
    conn: &Connection,
    viewer: &Viewer,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare(&format!("{} ORDER BY s.full_name", STUDENT_SELECT))
        .map_err(HandlerErr::db)?;
    let mut rows = stmt
        .query_map([], map_student_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;

    // Role filter first and unconditionally; the search term only narrows.
    rows.retain(|s| policy::student_visible(viewer, &s.parent_id, &s.course_teacher_id));

    if let Some(search) = params.get("search").and_then(|v| v.as_str()) {
        let needle = search.to_lowercase();
        if !needle.is_empty() {
            rows.retain(|s| s.full_name.to_lowercase().contains(&needle) || s.dni.contains(search));
        }
    }

    let students: Vec<serde_json::Value> = rows.iter().map(student_json).collect();
    Ok(json!({ "students": students }))
}

fn students_create(
    conn: &Connection,
    viewer: &Viewer,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    if !policy::permits(viewer.role, Action::ManageStudents) {
        return Err(HandlerErr {
            code: "forbidden",
            message: "role may not manage students".to_string(),
            details: None,
        });
    }
    let full_name = get_required_str(params, "fullName")?;
    let dni = get_required_str(params, "dni")?;
    let birth_date = get_required_str(params, "birthDate")?;
    let course_id = get_required_str(params, "courseId")?;
    let parent_id = get_required_str(params, "parentId")?;

    let course_exists = conn
        .query_row("SELECT 1 FROM courses WHERE id = ?", [&course_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()
        .map_err(HandlerErr::db)?
        .is_some();
    if !course_exists {
        return Err(HandlerErr {
            code: "not_found",
            message: "course not found".to_string(),
            details: None,
        });
    }
    let parent_exists = conn
        .query_row("SELECT 1 FROM users WHERE id = ?", [&parent_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()
        .map_err(HandlerErr::db)?
        .is_some();
    if !parent_exists {
        return Err(HandlerErr {
            code: "not_found",
            message: "parent user not found".to_string(),
            details: None,
        });
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, full_name, dni, birth_date, course_id, parent_id, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &full_name,
            &dni,
            &birth_date,
            &course_id,
            &parent_id,
            now_stamp(),
        ),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "students" })),
    })?;

    let row = fetch_student(conn, &id)?.ok_or_else(|| HandlerErr {
        code: "db_query_failed",
        message: "inserted student missing".to_string(),
        details: None,
    })?;
    Ok(json!({ "student": student_json(&row) }))
}

fn students_update(
    conn: &Connection,
    viewer: &Viewer,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    if !policy::permits(viewer.role, Action::ManageStudents) {
        return Err(HandlerErr {
            code: "forbidden",
            message: "role may not manage students".to_string(),
            details: None,
        });
    }
    let student_id = get_required_str(params, "studentId")?;
    let existing = fetch_student(conn, &student_id)?.ok_or_else(|| HandlerErr {
        code: "not_found",
        message: "student not found".to_string(),
        details: None,
    })?;

    let pick = |key: &str, fallback: &str| -> String {
        params
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| fallback.to_string())
    };
    let full_name = pick("fullName", &existing.full_name);
    let dni = pick("dni", &existing.dni);
    let birth_date = pick("birthDate", &existing.birth_date);
    let course_id = pick("courseId", &existing.course_id);
    let parent_id = pick("parentId", &existing.parent_id);

    conn.execute(
        "UPDATE students SET full_name = ?, dni = ?, birth_date = ?, course_id = ?, parent_id = ?
         WHERE id = ?",
        (
            &full_name,
            &dni,
            &birth_date,
            &course_id,
            &parent_id,
            &student_id,
        ),
    )
    .map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "students" })),
    })?;

    let row = fetch_student(conn, &student_id)?.ok_or_else(|| HandlerErr {
        code: "db_query_failed",
        message: "updated student missing".to_string(),
        details: None,
    })?;
    Ok(json!({ "student": student_json(&row) }))
}

fn students_delete(
    conn: &Connection,
    viewer: &Viewer,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    if !policy::permits(viewer.role, Action::ManageStudents) {
        return Err(HandlerErr {
            code: "forbidden",
            message: "role may not manage students".to_string(),
            details: None,
        });
    }
    let student_id = get_required_str(params, "studentId")?;
    let changed = conn
        .execute("DELETE FROM students WHERE id = ?", [&student_id])
        .map_err(|e| HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "students" })),
        })?;
    if changed == 0 {
        return Err(HandlerErr {
            code: "not_found",
            message: "student not found".to_string(),
            details: None,
        });
    }
    Ok(json!({ "deleted": true }))
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
        "students.list" => Some(dispatch(state, req, students_list)),
        "students.create" => Some(dispatch(state, req, students_create)),
        "students.update" => Some(dispatch(state, req, students_update)),
        "students.delete" => Some(dispatch(state, req, students_delete)),
        _ => None,
    }
}
