use crate::db;
use crate::engine;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{db_conn, get_required, get_required_str, respond, roster_key};
use crate::ipc::types::{AppState, Request};
use crate::model::StudentIdentity;
use crate::store::parse_record_filters;
use crate::validate::{RawMarkEntry, Submission};
use serde_json::json;

fn results_upsert(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let key = roster_key(req)?;
    let student: StudentIdentity = get_required(&req.params, "student")?;
    let marks: Vec<RawMarkEntry> = get_required(&req.params, "marks")?;
    let withheld = match req.params.get("withheld") {
        None | Some(serde_json::Value::Null) => false,
        Some(v) => v
            .as_bool()
            .ok_or_else(|| HandlerErr::bad_params("withheld must be boolean"))?,
    };
    let report = engine::submit_result(
        conn,
        &Submission {
            key,
            student,
            marks,
            withheld,
        },
    )?;
    Ok(json!(report))
}

fn results_get(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let key = roster_key(req)?;
    let roll_no = get_required_str(&req.params, "rollNo")?;
    let view = engine::get_result(conn, &key, roll_no.trim())?;
    Ok(json!(view))
}

fn results_list(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let key = roster_key(req)?;
    let filters = parse_record_filters(req.params.get("filters"))?;
    let rows = engine::list_results(conn, &key, &filters)?;
    Ok(json!({ "rows": rows }))
}

fn results_delete(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let key = roster_key(req)?;
    let roll_no = get_required_str(&req.params, "rollNo")?;
    let deleted = db::delete_record(conn, &key, roll_no.trim())?;
    if deleted {
        tracing::info!(roster = %key, roll_no = %roll_no.trim(), "result record deleted");
    }
    Ok(json!({ "deleted": deleted }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "results.upsert" => Some(respond(req, results_upsert(state, req))),
        "results.get" => Some(respond(req, results_get(state, req))),
        "results.list" => Some(respond(req, results_list(state, req))),
        "results.delete" => Some(respond(req, results_delete(state, req))),
        _ => None,
    }
}
