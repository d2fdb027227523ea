use crate::db;
use crate::engine::normalize_roll_list;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{db_conn, get_required, respond, roster_key};
use crate::ipc::types::{AppState, Request};
use crate::model::StudentIdentity;
use crate::store::RosterStore;
use serde_json::json;

fn roll_list(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let key = roster_key(req)?;
    let students = conn.roll_list(&key)?;
    Ok(json!({ "students": students }))
}

fn roll_set(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let key = roster_key(req)?;
    let students: Vec<StudentIdentity> = get_required(&req.params, "students")?;
    let students = normalize_roll_list(&students)?;
    let count = db::replace_roll_list(conn, &key, &students)?;
    tracing::info!(roster = %key, count, "roll list replaced");
    Ok(json!({ "count": count }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "roll.list" => Some(respond(req, roll_list(state, req))),
        "roll.set" => Some(respond(req, roll_set(state, req))),
        _ => None,
    }
}
