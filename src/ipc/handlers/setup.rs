use crate::config::{load_analytics_config, merge_analytics_patch, save_analytics_config};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{db_conn, respond};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn settings_get(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let analytics = load_analytics_config(conn)
        .map_err(|e| HandlerErr::new("storage_failed", e.to_string()))?;
    Ok(json!({ "analytics": analytics }))
}

fn settings_update(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };
    let current = load_analytics_config(conn)
        .map_err(|e| HandlerErr::new("storage_failed", e.to_string()))?;
    let next = merge_analytics_patch(&current, patch).map_err(HandlerErr::bad_params)?;
    save_analytics_config(conn, &next)
        .map_err(|e| HandlerErr::new("storage_failed", e.to_string()))?;
    tracing::info!(
        support_threshold = next.support_threshold,
        top_count = next.top_count,
        "analytics settings updated"
    );
    Ok(json!({ "analytics": next }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "settings.get" => Some(respond(req, settings_get(state))),
        "settings.update" => Some(respond(req, settings_update(state, req))),
        _ => None,
    }
}
