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

#[test]
fn session_is_loading_before_a_workspace_is_selected() {
    let (_child, mut stdin, mut reader) = spawn_daemon();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health.get("session").and_then(|v| v.as_str()), Some("loading"));

    let current = request_ok(&mut stdin, &mut reader, "2", "auth.current", json!({}));
    assert_eq!(current.get("state").and_then(|v| v.as_str()), Some("loading"));

    // Data methods need a workspace before anything else.
    let resp = request(&mut stdin, &mut reader, "3", "students.list", json!({}));
    assert_eq!(error_code(&resp), "no_workspace");
}

#[test]
fn sign_in_rejects_unknown_email_and_wrong_password() {
    let workspace = temp_dir("escuelad-signin-errors");
    let (_child, mut stdin, mut reader) = spawn_daemon();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "auth.signIn",
        json!({ "email": "nadie@instituto.edu", "password": "x" }),
    );
    assert_eq!(error_code(&resp), "not_found");

    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "auth.signIn",
        json!({ "email": "familia@instituto.edu", "password": "incorrecta" }),
    );
    assert_eq!(error_code(&resp), "invalid_credentials");

    // Still anonymous: protected methods stay locked.
    let resp = request(&mut stdin, &mut reader, "4", "students.list", json!({}));
    assert_eq!(error_code(&resp), "not_signed_in");
}

#[test]
fn sign_in_survives_a_daemon_restart() {
    let workspace = temp_dir("escuelad-session-restart");

    {
        let (_child, mut stdin, mut reader) = spawn_daemon();
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            "1",
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
        let result = request_ok(
            &mut stdin,
            &mut reader,
            "2",
            "auth.signIn",
            json!({ "email": "familia@instituto.edu", "password": "familia123" }),
        );
        assert_eq!(
            result
                .get("user")
                .and_then(|u| u.get("role"))
                .and_then(|v| v.as_str()),
            Some("familia")
        );
    }

    // A fresh process hydrates the same user from the durable store without
    // re-prompting credentials.
    let (_child, mut stdin, mut reader) = spawn_daemon();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let current = request_ok(&mut stdin, &mut reader, "2", "auth.current", json!({}));
    assert_eq!(
        current.get("state").and_then(|v| v.as_str()),
        Some("authenticated")
    );
    assert_eq!(
        current
            .get("user")
            .and_then(|u| u.get("id"))
            .and_then(|v| v.as_str()),
        Some("33333333-3333-3333-3333-333333333333")
    );
}

#[test]
fn sign_out_clears_the_session_durably() {
    let workspace = temp_dir("escuelad-session-signout");

    {
        let (_child, mut stdin, mut reader) = spawn_daemon();
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            "1",
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            "2",
            "auth.signIn",
            json!({ "email": "director@instituto.edu", "password": "director123" }),
        );
        let _ = request_ok(&mut stdin, &mut reader, "3", "auth.signOut", json!({}));

        let resp = request(&mut stdin, &mut reader, "4", "students.list", json!({}));
        assert_eq!(error_code(&resp), "not_signed_in");
    }

    let (_child, mut stdin, mut reader) = spawn_daemon();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let current = request_ok(&mut stdin, &mut reader, "2", "auth.current", json!({}));
    assert_eq!(
        current.get("state").and_then(|v| v.as_str()),
        Some("anonymous")
    );
}
