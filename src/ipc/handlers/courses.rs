use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{child_course_ids, db_conn, require_viewer};
use crate::ipc::types::{AppState, Request};
use crate::policy::{self, Role};
use serde_json::json;

fn db_err(req: &Request, e: rusqlite::Error) -> serde_json::Value {
    err(&req.id, "db_query_failed", e.to_string(), None)
}

fn courses_list(state: &AppState, req: &Request) -> Result<serde_json::Value, serde_json::Value> {
    let conn = db_conn(state, req)?;
    let viewer = require_viewer(state, req)?;

    let child_courses = if viewer.role == Role::Familia {
        child_course_ids(conn, &viewer.id).map_err(|e| db_err(req, e))?
    } else {
        Vec::new()
    };

    let mut stmt = conn
        .prepare(
            "SELECT c.id, c.name, c.year, c.division, c.teacher_id, u.full_name
             FROM courses c
             JOIN users u ON u.id = c.teacher_id
             ORDER BY c.year, c.division, c.name",
        )
        .map_err(|e| db_err(req, e))?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, i64>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, String>(4)?,
                r.get::<_, String>(5)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| db_err(req, e))?;

    let courses: Vec<serde_json::Value> = rows
        .iter()
        .filter(|(id, _, _, _, teacher_id, _)| {
            let has_own_child = child_courses.iter().any(|c| c == id);
            policy::course_visible(&viewer, teacher_id, has_own_child)
        })
        .map(|(id, name, year, division, teacher_id, teacher_name)| {
            json!({
                "id": id,
                "name": name,
                "year": year,
                "division": division,
                "teacherId": teacher_id,
                "teacher": { "id": teacher_id, "fullName": teacher_name }
            })
        })
        .collect();

    Ok(json!({ "courses": courses }))
}

fn subjects_list(state: &AppState, req: &Request) -> Result<serde_json::Value, serde_json::Value> {
    let conn = db_conn(state, req)?;
    let viewer = require_viewer(state, req)?;

    let mut stmt = conn
        .prepare(
            "SELECT s.id, s.name, s.course_id, s.teacher_id
             FROM subjects s
             ORDER BY s.name",
        )
        .map_err(|e| db_err(req, e))?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| db_err(req, e))?;

    let subjects: Vec<serde_json::Value> = rows
        .iter()
        .filter(|(_, _, _, teacher_id)| policy::subject_visible(&viewer, teacher_id))
        .map(|(id, name, course_id, teacher_id)| {
            json!({
                "id": id,
                "name": name,
                "courseId": course_id,
                "teacherId": teacher_id
            })
        })
        .collect();

    Ok(json!({ "subjects": subjects }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "courses.list" => Some(
            courses_list(state, req)
                .map(|r| ok(&req.id, r))
                .unwrap_or_else(|e| e),
        ),
        "subjects.list" => Some(
            subjects_list(state, req)
                .map(|r| ok(&req.id, r))
                .unwrap_or_else(|e| e),
        ),
        _ => None,
    }
}
