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

const DIRECTOR: &str = "11111111-1111-1111-1111-111111111111";
const FAMILIA: &str = "33333333-3333-3333-3333-333333333333";

#[test]
fn familia_sees_only_its_inbox_newest_first() {
    let workspace = temp_dir("escuelad-notif-inbox");
    let (_child, mut stdin, mut reader) = spawn_daemon();
    open_demo_workspace(&mut stdin, &mut reader, &workspace);
    sign_in(&mut stdin, &mut reader, "familia@instituto.edu", "familia123");

    let result = request_ok(&mut stdin, &mut reader, "1", "notifications.list", json!({}));
    let notifications = result
        .get("notifications")
        .and_then(|v| v.as_array())
        .expect("notifications array");
    let ids: Vec<&str> = notifications
        .iter()
        .map(|n| n.get("id").and_then(|v| v.as_str()).expect("id"))
        .collect();
    assert_eq!(ids, vec!["notif-3", "notif-1", "notif-2"]);
    let reads: Vec<bool> = notifications
        .iter()
        .map(|n| n.get("read").and_then(|v| v.as_bool()).expect("read"))
        .collect();
    assert_eq!(reads, vec![false, false, true]);
}

#[test]
fn sending_reports_each_recipient_independently() {
    let workspace = temp_dir("escuelad-notif-send");
    let (_child, mut stdin, mut reader) = spawn_daemon();
    open_demo_workspace(&mut stdin, &mut reader, &workspace);

    sign_in(&mut stdin, &mut reader, "director@instituto.edu", "director123");
    let result = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "notifications.send",
        json!({
            "title": "Suspensión de Clases",
            "message": "No habrá clases el viernes por jornada docente.",
            "recipientIds": [FAMILIA, "no-such-user"]
        }),
    );
    let sent = result.get("sent").and_then(|v| v.as_array()).expect("sent");
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].get("recipientId").and_then(|v| v.as_str()),
        Some(FAMILIA)
    );
    assert_eq!(sent[0].get("read").and_then(|v| v.as_bool()), Some(false));
    let failed = result
        .get("failed")
        .and_then(|v| v.as_array())
        .expect("failed");
    assert_eq!(failed.len(), 1);
    assert_eq!(
        failed[0].get("recipientId").and_then(|v| v.as_str()),
        Some("no-such-user")
    );
    assert_eq!(
        failed[0].get("code").and_then(|v| v.as_str()),
        Some("not_found")
    );

    // The delivered half of the batch is durable despite the failure.
    sign_in(&mut stdin, &mut reader, "familia@instituto.edu", "familia123");
    let result = request_ok(&mut stdin, &mut reader, "2", "notifications.list", json!({}));
    let count = result
        .get("notifications")
        .and_then(|v| v.as_array())
        .map(|a| a.len());
    assert_eq!(count, Some(4));
}

#[test]
fn a_teacher_reaches_only_parents_of_its_own_students() {
    let workspace = temp_dir("escuelad-notif-scope");
    let (_child, mut stdin, mut reader) = spawn_daemon();
    open_demo_workspace(&mut stdin, &mut reader, &workspace);
    sign_in(&mut stdin, &mut reader, "docente@instituto.edu", "docente123");

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "notifications.send",
        json!({
            "title": "Tarea Pendiente",
            "message": "Recordar entregar la tarea de matemáticas.",
            "recipientIds": [FAMILIA, DIRECTOR]
        }),
    );
    assert_eq!(
        result.get("sent").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(1)
    );
    let failed = result
        .get("failed")
        .and_then(|v| v.as_array())
        .expect("failed");
    assert_eq!(failed.len(), 1);
    assert_eq!(
        failed[0].get("recipientId").and_then(|v| v.as_str()),
        Some(DIRECTOR)
    );
    assert_eq!(
        failed[0].get("code").and_then(|v| v.as_str()),
        Some("forbidden")
    );
}

#[test]
fn familia_may_not_send_at_all() {
    let workspace = temp_dir("escuelad-notif-familia-send");
    let (_child, mut stdin, mut reader) = spawn_daemon();
    open_demo_workspace(&mut stdin, &mut reader, &workspace);
    sign_in(&mut stdin, &mut reader, "familia@instituto.edu", "familia123");

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "notifications.send",
        json!({
            "title": "Consulta",
            "message": "¿Puedo pasar a retirar el boletín?",
            "recipientIds": [DIRECTOR]
        }),
    );
    assert_eq!(error_code(&resp), "forbidden");
}

#[test]
fn only_the_recipient_marks_a_notification_read() {
    let workspace = temp_dir("escuelad-notif-mark-read");
    let (_child, mut stdin, mut reader) = spawn_daemon();
    open_demo_workspace(&mut stdin, &mut reader, &workspace);

    sign_in(&mut stdin, &mut reader, "docente@instituto.edu", "docente123");
    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "notifications.markRead",
        json!({ "notificationId": "notif-1" }),
    );
    assert_eq!(error_code(&resp), "forbidden");

    sign_in(&mut stdin, &mut reader, "familia@instituto.edu", "familia123");
    let result = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "notifications.markRead",
        json!({ "notificationId": "notif-1" }),
    );
    assert_eq!(
        result
            .get("notification")
            .and_then(|n| n.get("read"))
            .and_then(|v| v.as_bool()),
        Some(true)
    );

    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "notifications.markRead",
        json!({ "notificationId": "notif-99" }),
    );
    assert_eq!(error_code(&resp), "not_found");
}
