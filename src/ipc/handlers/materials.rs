use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{child_course_ids, db_conn, now_stamp, require_viewer, required_str};
use crate::ipc::types::{AppState, Request};
use crate::policy::{self, Action, Role};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn db_err(req: &Request, e: rusqlite::Error) -> serde_json::Value {
    err(&req.id, "db_query_failed", e.to_string(), None)
}

#[derive(Debug, Clone)]
struct MaterialRow {
    id: String,
    title: String,
    description: String,
    file_url: String,
    course_id: String,
    uploaded_by: String,
    course_name: String,
    uploader_name: String,
}

fn material_json(m: &MaterialRow) -> serde_json::Value {
    json!({
        "id": m.id,
        "title": m.title,
        "description": m.description,
        "fileUrl": m.file_url,
        "courseId": m.course_id,
        "uploadedBy": m.uploaded_by,
        "course": { "id": m.course_id, "name": m.course_name },
        "uploader": { "id": m.uploaded_by, "fullName": m.uploader_name }
    })
}

const MATERIAL_SELECT: &str = "SELECT m.id, m.title, m.description, m.file_url, m.course_id,
        m.uploaded_by, c.name, u.full_name
 FROM materials m
 JOIN courses c ON c.id = m.course_id
 JOIN users u ON u.id = m.uploaded_by";

fn map_material_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<MaterialRow> {
    Ok(MaterialRow {
        id: r.get(0)?,
        title: r.get(1)?,
        description: r.get(2)?,
        file_url: r.get(3)?,
        course_id: r.get(4)?,
        uploaded_by: r.get(5)?,
        course_name: r.get(6)?,
        uploader_name: r.get(7)?,
    })
}

fn materials_list(state: &AppState, req: &Request) -> Result<serde_json::Value, serde_json::Value> {
    let conn = db_conn(state, req)?;
    let viewer = require_viewer(state, req)?;

    let child_courses = if viewer.role == Role::Familia {
        child_course_ids(conn, &viewer.id).map_err(|e| db_err(req, e))?
    } else {
        Vec::new()
    };

    let mut stmt = conn
        .prepare(&format!("{} ORDER BY m.created_at DESC", MATERIAL_SELECT))
        .map_err(|e| db_err(req, e))?;
    let mut rows = stmt
        .query_map([], map_material_row)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| db_err(req, e))?;

    rows.retain(|m| policy::material_visible(&viewer, &m.uploaded_by, &m.course_id, &child_courses));

    if let Some(search) = req.params.get("search").and_then(|v| v.as_str()) {
        let needle = search.to_lowercase();
        if !needle.is_empty() {
            rows.retain(|m| {
                m.title.to_lowercase().contains(&needle)
                    || m.description.to_lowercase().contains(&needle)
            });
        }
    }

    let materials: Vec<serde_json::Value> = rows.iter().map(material_json).collect();
    Ok(json!({ "materials": materials }))
}

fn materials_create(
    state: &AppState,
    req: &Request,
) -> Result<serde_json::Value, serde_json::Value> {
    let conn = db_conn(state, req)?;
    let viewer = require_viewer(state, req)?;
    if !policy::permits(viewer.role, Action::UploadMaterial) {
        return Err(err(
            &req.id,
            "forbidden",
            "role may not upload materials",
            None,
        ));
    }

    let title = required_str(req, "title")?;
    let description = required_str(req, "description")?;
    let file_url = required_str(req, "fileUrl")?;
    let course_id = required_str(req, "courseId")?;

    let course_exists = conn
        .query_row("SELECT 1 FROM courses WHERE id = ?", [&course_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()
        .map_err(|e| db_err(req, e))?
        .is_some();
    if !course_exists {
        return Err(err(&req.id, "not_found", "course not found", None));
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO materials(id, title, description, file_url, course_id, uploaded_by, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &title,
            &description,
            &file_url,
            &course_id,
            &viewer.id,
            now_stamp(),
        ),
    )
    .map_err(|e| err(&req.id, "db_insert_failed", e.to_string(), None))?;

    let row = conn
        .query_row(
            &format!("{} WHERE m.id = ?", MATERIAL_SELECT),
            [&id],
            map_material_row,
        )
        .map_err(|e| db_err(req, e))?;
    Ok(json!({ "material": material_json(&row) }))
}

fn materials_delete(
    state: &AppState,
    req: &Request,
) -> Result<serde_json::Value, serde_json::Value> {
    let conn = db_conn(state, req)?;
    let viewer = require_viewer(state, req)?;
    let material_id = required_str(req, "materialId")?;

    let uploaded_by: Option<String> = conn
        .query_row(
            "SELECT uploaded_by FROM materials WHERE id = ?",
            [&material_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| db_err(req, e))?;
    let Some(uploaded_by) = uploaded_by else {
        return Err(err(&req.id, "not_found", "material not found", None));
    };

    // The director may delete anything; a teacher only what it uploaded.
    let allowed = policy::permits(viewer.role, Action::DeleteMaterial)
        || (viewer.role == Role::Docente && uploaded_by == viewer.id);
    if !allowed {
        return Err(err(
            &req.id,
            "forbidden",
            "role may not delete this material",
            None,
        ));
    }

    conn.execute("DELETE FROM materials WHERE id = ?", [&material_id])
        .map_err(|e| err(&req.id, "db_update_failed", e.to_string(), None))?;
    Ok(json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "materials.list" => Some(
            materials_list(state, req)
                .map(|r| ok(&req.id, r))
                .unwrap_or_else(|e| e),
        ),
        "materials.create" => Some(
            materials_create(state, req)
                .map(|r| ok(&req.id, r))
                .unwrap_or_else(|e| e),
        ),
        "materials.delete" => Some(
            materials_delete(state, req)
                .map(|r| ok(&req.id, r))
                .unwrap_or_else(|e| e),
        ),
        _ => None,
    }
}
