use crate::db;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{db_conn, get_required_str, respond};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(
        req,
        Ok(json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        })),
    )
}

fn workspace_select(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let path = PathBuf::from(get_required_str(&req.params, "path")?);
    state
        .open_workspace(&path)
        .map_err(|e| HandlerErr::new("db_open_failed", format!("{e:?}")))?;
    Ok(json!({ "workspacePath": path.to_string_lossy() }))
}

fn rosters_list(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let rosters = db::list_rosters(conn)?;
    Ok(json!({ "rosters": rosters }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(respond(req, workspace_select(state, req))),
        "rosters.list" => Some(respond(req, rosters_list(state))),
        _ => None,
    }
}
