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

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_resultsd");
    let mut child = Command::new(exe)
        .env_remove("RESULTSD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn resultsd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn read_response(reader: &mut BufReader<ChildStdout>) -> serde_json::Value {
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response");
    serde_json::from_str(line.trim()).expect("parse response json")
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

    let value = read_response(reader);
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

fn error_code(v: &serde_json::Value) -> Option<&str> {
    v.get("error")
        .and_then(|e| e.get("code"))
        .and_then(|c| c.as_str())
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("resultsd-router-smoke");
    let bundle_out = workspace.join("smoke-backup.zip");
    let key = json!({ "course": "MCA", "semester": 1, "session": "2025-26" });
    let with_key = |extra: serde_json::Value| {
        let mut p = key.clone();
        if let (Some(dst), Some(src)) = (p.as_object_mut(), extra.as_object()) {
            for (k, v) in src {
                dst.insert(k.clone(), v.clone());
            }
        }
        p
    };

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["ok"], json!(true));
    assert!(health["result"]["workspacePath"].is_null());

    let before = request(&mut stdin, &mut reader, "2", "subjects.list", key.clone());
    assert_eq!(error_code(&before), Some("no_workspace"));

    let selected = request(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(selected["ok"], json!(true));

    let calls: Vec<(&str, serde_json::Value)> = vec![
        (
            "subjects.upsert",
            with_key(json!({ "subject": {
                "name": "Maths", "type": "theory",
                "internalMin": 8, "internalMax": 20, "externalMin": 32, "externalMax": 80
            }})),
        ),
        ("subjects.list", key.clone()),
        (
            "roll.set",
            with_key(json!({ "students": [{ "rollNo": "1", "name": "Asha" }] })),
        ),
        ("roll.list", key.clone()),
        (
            "marks.validate",
            with_key(json!({ "subject": "Maths", "internal": "12", "external": "A" })),
        ),
        (
            "results.upsert",
            with_key(json!({
                "student": { "rollNo": "1", "name": "Asha" },
                "marks": [{ "subject": "Maths", "internal": 12, "external": 50 }]
            })),
        ),
        ("results.get", with_key(json!({ "rollNo": "1" }))),
        ("results.list", key.clone()),
        ("analytics.roster", key.clone()),
        ("analytics.subject", with_key(json!({ "subject": "Maths" }))),
        ("analytics.subjects", key.clone()),
        ("rosters.list", json!({})),
        ("settings.get", json!({})),
        ("settings.update", json!({ "patch": { "topCount": 5 } })),
        (
            "backup.export",
            json!({ "outPath": bundle_out.to_string_lossy() }),
        ),
        ("results.delete", with_key(json!({ "rollNo": "1" }))),
        ("subjects.delete", with_key(json!({ "name": "Maths" }))),
    ];
    for (i, (method, params)) in calls.into_iter().enumerate() {
        let id = format!("c{}", i);
        let resp = request(&mut stdin, &mut reader, &id, method, params);
        assert_eq!(resp["ok"], json!(true), "{} failed: {}", method, resp);
    }

    let unknown = request_unchecked(&mut stdin, &mut reader, "u1", "grades.explode");
    assert_eq!(error_code(&unknown), Some("not_implemented"));

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush garbage");
    let garbage = read_response(&mut reader);
    assert_eq!(garbage["ok"], json!(false));
    assert_eq!(error_code(&garbage), Some("bad_json"));

    // The process keeps serving after a bad line.
    let again = request(&mut stdin, &mut reader, "z", "health", json!({}));
    assert_eq!(again["ok"], json!(true));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

fn request_unchecked(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
) -> serde_json::Value {
    writeln!(stdin, "{}", json!({ "id": id, "method": method })).expect("write request");
    stdin.flush().expect("flush request");
    read_response(reader)
}

#[test]
fn workspace_from_environment_is_opened_at_startup() {
    let workspace = temp_dir("resultsd-env-workspace");
    let exe = env!("CARGO_BIN_EXE_resultsd");
    let mut child = Command::new(exe)
        .env("RESULTSD_WORKSPACE", &workspace)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn resultsd");
    let mut stdin = child.stdin.take().expect("child stdin");
    let mut reader = BufReader::new(child.stdout.take().expect("child stdout"));

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(
        health["result"]["workspacePath"].as_str(),
        Some(workspace.to_string_lossy().as_ref())
    );
    assert!(workspace.join("results.sqlite3").is_file());

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
