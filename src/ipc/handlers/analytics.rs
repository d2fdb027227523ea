use crate::config::load_analytics_config;
use crate::engine;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{db_conn, get_required_str, respond, roster_key};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn analytics_roster(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let key = roster_key(req)?;
    let config = load_analytics_config(conn)
        .map_err(|e| HandlerErr::new("storage_failed", e.to_string()))?;
    let analytics = engine::roster_analytics(conn, &key, &config)?;
    Ok(json!(analytics))
}

fn analytics_subject(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let key = roster_key(req)?;
    let subject = get_required_str(&req.params, "subject")?;
    let stats = engine::subject_statistics(conn, &key, subject.trim())?;
    Ok(json!(stats))
}

fn analytics_subjects(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let key = roster_key(req)?;
    let overview = engine::all_subject_statistics(conn, &key)?;
    Ok(json!(overview))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "analytics.roster" => Some(respond(req, analytics_roster(state, req))),
        "analytics.subject" => Some(respond(req, analytics_subject(state, req))),
        "analytics.subjects" => Some(respond(req, analytics_subjects(state, req))),
        _ => None,
    }
}
