use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, require_viewer, required_str, today, validate_month_key};
use crate::ipc::types::{AppState, Request};
use crate::policy::{self, Viewer};
use crate::reports::{self, AttendanceStatus};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

fn db_err(req: &Request, e: rusqlite::Error) -> serde_json::Value {
    err(&req.id, "db_query_failed", e.to_string(), None)
}

struct StudentHead {
    full_name: String,
    dni: String,
    parent_id: String,
    course_teacher_id: String,
}

/// A student outside the viewer's scope answers `not_found`, same as a
/// student that does not exist.
fn visible_student(
    conn: &Connection,
    req: &Request,
    viewer: &Viewer,
    student_id: &str,
) -> Result<StudentHead, serde_json::Value> {
    let head = conn
        .query_row(
            "SELECT s.full_name, s.dni, s.parent_id, c.teacher_id
             FROM students s
             JOIN courses c ON c.id = s.course_id
             WHERE s.id = ?",
            [student_id],
            |r| {
                Ok(StudentHead {
                    full_name: r.get(0)?,
                    dni: r.get(1)?,
                    parent_id: r.get(2)?,
                    course_teacher_id: r.get(3)?,
                })
            },
        )
        .optional()
        .map_err(|e| db_err(req, e))?;
    match head {
        Some(h) if policy::student_visible(viewer, &h.parent_id, &h.course_teacher_id) => Ok(h),
        _ => Err(err(&req.id, "not_found", "student not found", None)),
    }
}

fn report_card(state: &AppState, req: &Request) -> Result<serde_json::Value, serde_json::Value> {
    let conn = db_conn(state, req)?;
    let viewer = require_viewer(state, req)?;
    let student_id = required_str(req, "studentId")?;
    let trimester = req
        .params
        .get("trimester")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| err(&req.id, "bad_params", "missing trimester", None))?;
    if !(1..=3).contains(&trimester) {
        return Err(err(
            &req.id,
            "bad_params",
            "trimester must be 1, 2 or 3",
            None,
        ));
    }

    let student = visible_student(conn, req, &viewer, &student_id)?;

    let mut stmt = conn
        .prepare(
            "SELECT sub.name, sub.teacher_id, g.grade
             FROM grades g
             JOIN subjects sub ON sub.id = g.subject_id
             WHERE g.student_id = ? AND g.trimester = ?
             ORDER BY g.date",
        )
        .map_err(|e| db_err(req, e))?;
    let rows = stmt
        .query_map((&student_id, trimester), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, f64>(2)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| db_err(req, e))?;

    // Only the grades the viewer could see in the list view make it onto
    // the document.
    let grade_rows: Vec<(String, f64)> = rows
        .into_iter()
        .filter(|(_, teacher_id, _)| {
            policy::grade_visible(&viewer, teacher_id, &student.parent_id)
        })
        .map(|(subject, _, grade)| (subject, grade))
        .collect();

    let doc = reports::report_card(
        &student.full_name,
        &student.dni,
        trimester,
        &today(),
        &grade_rows,
    );
    let grades: Vec<f64> = grade_rows.iter().map(|(_, g)| *g).collect();
    let average = reports::grade_average(&grades).map(reports::format_average);

    let doc_json = serde_json::to_value(&doc)
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?;
    Ok(json!({ "document": doc_json, "average": average }))
}

fn attendance_summary(
    state: &AppState,
    req: &Request,
) -> Result<serde_json::Value, serde_json::Value> {
    let conn = db_conn(state, req)?;
    let viewer = require_viewer(state, req)?;
    let student_id = required_str(req, "studentId")?;
    let month = required_str(req, "month")?;
    validate_month_key(req, &month)?;

    let student = visible_student(conn, req, &viewer, &student_id)?;

    let mut stmt = conn
        .prepare(
            "SELECT a.date, sub.name, sub.teacher_id, a.status
             FROM attendance a
             JOIN subjects sub ON sub.id = a.subject_id
             WHERE a.student_id = ? AND substr(a.date, 1, 7) = ?
             ORDER BY a.date",
        )
        .map_err(|e| db_err(req, e))?;
    let rows = stmt
        .query_map((&student_id, &month), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| db_err(req, e))?;

    let records: Vec<(String, String, AttendanceStatus)> = rows
        .into_iter()
        .filter(|(_, _, teacher_id, _)| {
            policy::attendance_visible(&viewer, teacher_id, &student.parent_id)
        })
        .filter_map(|(date, subject, _, status)| {
            AttendanceStatus::parse(&status).map(|s| (date, subject, s))
        })
        .collect();

    let stats =
        reports::AttendanceStats::from_statuses(records.iter().map(|(_, _, s)| *s));
    let doc = reports::attendance_report(
        &student.full_name,
        &student.dni,
        &month,
        &today(),
        &records,
    );

    let doc_json = serde_json::to_value(&doc)
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?;
    Ok(json!({
        "document": doc_json,
        "stats": {
            "totalDays": stats.total_days,
            "presentDays": stats.present_days,
            "absentDays": stats.absent_days,
            "lateDays": stats.late_days,
            "attendanceRate": stats.rate_percent()
        }
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.reportCard" => Some(
            report_card(state, req)
                .map(|r| ok(&req.id, r))
                .unwrap_or_else(|e| e),
        ),
        "reports.attendanceSummary" => Some(
            attendance_summary(state, req)
                .map(|r| ok(&req.id, r))
                .unwrap_or_else(|e| e),
        ),
        _ => None,
    }
}
