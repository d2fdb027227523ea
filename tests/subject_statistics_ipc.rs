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

fn keyed(extra: serde_json::Value) -> serde_json::Value {
    let mut p = json!({ "course": "BCA", "semester": 2, "session": "2025-26" });
    if let (Some(dst), Some(src)) = (p.as_object_mut(), extra.as_object()) {
        for (k, v) in src {
            dst.insert(k.clone(), v.clone());
        }
    }
    p
}

/// Four students with marks and one roll-only student (R5) in roll order.
fn seed_roster(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) {
    request_ok(
        stdin,
        reader,
        "sub-maths",
        "subjects.upsert",
        keyed(json!({ "subject": { "name": "Maths", "type": "theory",
            "internalMin": 8, "internalMax": 20, "externalMin": 32, "externalMax": 80 } })),
    );
    request_ok(
        stdin,
        reader,
        "sub-lab",
        "subjects.upsert",
        keyed(json!({ "subject": { "name": "Lab", "type": "practical",
            "internalMin": 10, "internalMax": 25, "externalMin": 10, "externalMax": 25 } })),
    );
    request_ok(
        stdin,
        reader,
        "roll",
        "roll.set",
        keyed(json!({ "students": [
            { "rollNo": "R1", "name": "Anu" },
            { "rollNo": "R2", "name": "Bala" },
            { "rollNo": "R3", "name": "Chitra" },
            { "rollNo": "R4", "name": "Dev" },
            { "rollNo": "R5", "name": "Esha" }
        ] })),
    );
    let rows = [
        ("R4", "Dev", json!([
            { "subject": "Maths", "internal": "A", "external": 60 },
            { "subject": "Lab", "internal": "A", "external": "A" }
        ])),
        ("R1", "Anu", json!([
            { "subject": "Maths", "internal": 18, "external": 70 },
            { "subject": "Lab", "internal": 22, "external": 23 }
        ])),
        ("R3", "Chitra", json!([
            { "subject": "Maths", "internal": 5, "external": 20 },
            { "subject": "Lab", "internal": 15, "external": 15 }
        ])),
        ("R2", "Bala", json!([
            { "subject": "Maths", "internal": 10, "external": 40 },
            { "subject": "Lab", "internal": 12, "external": 13 }
        ])),
    ];
    for (roll, name, marks) in rows {
        request_ok(
            stdin,
            reader,
            &format!("rec-{}", roll),
            "results.upsert",
            keyed(json!({ "student": { "rollNo": roll, "name": name }, "marks": marks })),
        );
    }
}

fn open_workspace(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &std::path::Path,
) {
    request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
}

fn rolls(list: &serde_json::Value) -> Vec<String> {
    list.as_array()
        .expect("array")
        .iter()
        .map(|r| r["rollNo"].as_str().unwrap_or("").to_string())
        .collect()
}

#[test]
fn single_subject_statistics() {
    let workspace = temp_dir("resultsd-subject-stats");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    open_workspace(&mut stdin, &mut reader, &workspace);
    seed_roster(&mut stdin, &mut reader);

    let s = request_ok(
        &mut stdin,
        &mut reader,
        "m",
        "analytics.subject",
        keyed(json!({ "subject": "Maths" })),
    );
    assert_eq!(s["type"], json!("theory"));
    assert_eq!(s["totalStudents"], json!(4));
    assert_eq!(s["passedStudents"], json!(2));
    assert_eq!(s["failedStudents"], json!(1));
    assert_eq!(s["absentStudents"], json!(1));
    assert_eq!(s["passPercentage"], json!(50));
    assert_eq!(s["classAverage"], json!(54.33));
    assert_eq!(rolls(&s["students"]), vec!["R1", "R2", "R3", "R4"]);
    assert_eq!(s["students"][3]["total"], json!("AB"));
    assert_eq!(s["students"][3]["outcome"], json!("ABSENT"));
    assert_eq!(s["students"][2]["outcome"], json!("FAIL"));

    let missing = request(
        &mut stdin,
        &mut reader,
        "x",
        "analytics.subject",
        keyed(json!({ "subject": "Chemistry" })),
    );
    assert_eq!(missing["error"]["code"], json!("not_found"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn all_subjects_overview() {
    let workspace = temp_dir("resultsd-subject-overview");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    open_workspace(&mut stdin, &mut reader, &workspace);
    seed_roster(&mut stdin, &mut reader);
    request_ok(
        &mut stdin,
        &mut reader,
        "sub-eng",
        "subjects.upsert",
        keyed(json!({ "subject": { "name": "English", "type": "elective",
            "internalMin": 8, "internalMax": 20, "externalMin": 32, "externalMax": 80 } })),
    );

    let o = request_ok(&mut stdin, &mut reader, "all", "analytics.subjects", keyed(json!({})));
    let subjects = o["subjects"].as_array().expect("subjects");
    assert_eq!(subjects.len(), 2);
    assert_eq!(subjects[0]["subject"], json!("Maths"));
    assert_eq!(subjects[1]["subject"], json!("Lab"));
    assert_eq!(subjects[1]["passedStudents"], json!(3));
    assert_eq!(subjects[1]["passPercentage"], json!(75));
    assert_eq!(subjects[1]["classAverage"], json!(33.33));
    assert_eq!(o["subjectsWithoutMarks"], json!(["English"]));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
