use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_daemon() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_escuelad");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn escuelad");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|c| c.as_str())
        .unwrap_or("")
}

fn open_demo_workspace(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &PathBuf,
) {
    let _ = request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(stdin, reader, "seed", "workspace.seedDemo", json!({}));
}

fn sign_in(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, email: &str, password: &str) {
    let _ = request_ok(
        stdin,
        reader,
        "signin",
        "auth.signIn",
        json!({ "email": email, "password": password }),
    );
}

const JUAN: &str = "dddddddd-dddd-dddd-dddd-dddddddddddd";
const DIRECTOR: &str = "11111111-1111-1111-1111-111111111111";
const CURSO_LENGUA: &str = "cccccccc-cccc-cccc-cccc-cccccccccccc";

#[test]
fn report_card_carries_the_viewer_visible_grades_only() {
    let workspace = temp_dir("escuelad-report-card");
    let (_child, mut stdin, mut reader) = spawn_daemon();
    open_demo_workspace(&mut stdin, &mut reader, &workspace);

    // The parent sees every grade of its child, whoever teaches the subject.
    sign_in(&mut stdin, &mut reader, "familia@instituto.edu", "familia123");
    let result = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "reports.reportCard",
        json!({ "studentId": JUAN, "trimester": 1 }),
    );
    assert_eq!(result.get("average").and_then(|v| v.as_str()), Some("8.00"));
    let document = result.get("document").expect("document");
    assert_eq!(
        document.get("title").and_then(|v| v.as_str()),
        Some("Boletín de Calificaciones")
    );
    assert_eq!(
        document.get("fileName").and_then(|v| v.as_str()),
        Some("boletin_Juan Martínez_trimestre_1.pdf")
    );
    let rows = document
        .get("table")
        .and_then(|t| t.get("rows"))
        .and_then(|v| v.as_array())
        .expect("table rows");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0], json!(["Matemáticas", "8"]));
    let header = document
        .get("headerLines")
        .and_then(|v| v.as_array())
        .expect("header lines");
    assert_eq!(header[0], json!("Estudiante: Juan Martínez"));
    assert_eq!(header[1], json!("DNI: 12345678"));

    // The same card built for the teacher omits another teacher's subject,
    // moving the average.
    sign_in(&mut stdin, &mut reader, "docente@instituto.edu", "docente123");
    let result = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "reports.reportCard",
        json!({ "studentId": JUAN, "trimester": 1 }),
    );
    assert_eq!(result.get("average").and_then(|v| v.as_str()), Some("8.50"));
    let rows = result
        .get("document")
        .and_then(|d| d.get("table"))
        .and_then(|t| t.get("rows"))
        .and_then(|v| v.as_array())
        .expect("table rows");
    assert_eq!(rows.len(), 2);
}

#[test]
fn an_empty_trimester_yields_a_card_without_average() {
    let workspace = temp_dir("escuelad-report-card-empty");
    let (_child, mut stdin, mut reader) = spawn_daemon();
    open_demo_workspace(&mut stdin, &mut reader, &workspace);
    sign_in(&mut stdin, &mut reader, "familia@instituto.edu", "familia123");

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "reports.reportCard",
        json!({ "studentId": JUAN, "trimester": 3 }),
    );
    assert!(result.get("average").map(|v| v.is_null()).unwrap_or(false));
    let summary = result
        .get("document")
        .and_then(|d| d.get("summaryLines"))
        .and_then(|v| v.as_array())
        .expect("summary lines");
    assert_eq!(summary, &vec![json!("Sin calificaciones en el período")]);

    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "reports.reportCard",
        json!({ "studentId": JUAN, "trimester": 0 }),
    );
    assert_eq!(error_code(&resp), "bad_params");
}

#[test]
fn attendance_summary_counts_and_rate() {
    let workspace = temp_dir("escuelad-attendance-summary");
    let (_child, mut stdin, mut reader) = spawn_daemon();
    open_demo_workspace(&mut stdin, &mut reader, &workspace);
    sign_in(&mut stdin, &mut reader, "familia@instituto.edu", "familia123");

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "reports.attendanceSummary",
        json!({ "studentId": JUAN, "month": "2024-11" }),
    );
    let stats = result.get("stats").expect("stats");
    assert_eq!(stats.get("totalDays").and_then(|v| v.as_u64()), Some(3));
    assert_eq!(stats.get("presentDays").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(stats.get("absentDays").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(stats.get("lateDays").and_then(|v| v.as_u64()), Some(0));
    assert_eq!(
        stats.get("attendanceRate").and_then(|v| v.as_str()),
        Some("66.7")
    );
    let document = result.get("document").expect("document");
    assert_eq!(
        document.get("fileName").and_then(|v| v.as_str()),
        Some("asistencia_Juan Martínez_2024-11.pdf")
    );
    assert_eq!(
        document.get("title").and_then(|v| v.as_str()),
        Some("Reporte de Asistencias")
    );

    // A month with no records still produces a document, with a zero rate.
    let result = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "reports.attendanceSummary",
        json!({ "studentId": JUAN, "month": "2024-10" }),
    );
    let stats = result.get("stats").expect("stats");
    assert_eq!(stats.get("totalDays").and_then(|v| v.as_u64()), Some(0));
    assert_eq!(
        stats.get("attendanceRate").and_then(|v| v.as_str()),
        Some("0")
    );

    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "reports.attendanceSummary",
        json!({ "studentId": JUAN, "month": "11-2024" }),
    );
    assert_eq!(error_code(&resp), "bad_params");
}

#[test]
fn an_out_of_scope_student_reads_as_missing() {
    let workspace = temp_dir("escuelad-report-scope");
    let (_child, mut stdin, mut reader) = spawn_daemon();
    open_demo_workspace(&mut stdin, &mut reader, &workspace);

    sign_in(&mut stdin, &mut reader, "director@instituto.edu", "director123");
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "students.create",
        json!({
            "fullName": "Lucía Fernández",
            "dni": "99887766",
            "birthDate": "2011-03-02",
            "courseId": CURSO_LENGUA,
            "parentId": DIRECTOR
        }),
    );
    let lucia = created
        .get("student")
        .and_then(|s| s.get("id"))
        .and_then(|v| v.as_str())
        .expect("created student id")
        .to_string();

    sign_in(&mut stdin, &mut reader, "familia@instituto.edu", "familia123");
    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "reports.reportCard",
        json!({ "studentId": lucia, "trimester": 1 }),
    );
    assert_eq!(error_code(&resp), "not_found");

    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "reports.attendanceSummary",
        json!({ "studentId": "no-such-student", "month": "2024-11" }),
    );
    assert_eq!(error_code(&resp), "not_found");
}
