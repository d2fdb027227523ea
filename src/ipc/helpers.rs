use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::RosterKey;
use crate::validate::validate_roster_key;
use rusqlite::Connection;
use serde::de::DeserializeOwned;

pub fn db_conn(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Deserialize `params[key]`, reporting shape problems as `bad_params`.
pub fn get_required<T: DeserializeOwned>(
    params: &serde_json::Value,
    key: &str,
) -> Result<T, HandlerErr> {
    let Some(v) = params.get(key) else {
        return Err(HandlerErr::bad_params(format!("missing {}", key)));
    };
    serde_json::from_value(v.clone())
        .map_err(|e| HandlerErr::bad_params(format!("invalid {}: {}", key, e)))
}

/// The composite roster key carried as `course`, `semester`, `session`.
pub fn roster_key(req: &Request) -> Result<RosterKey, HandlerErr> {
    let course = get_required_str(&req.params, "course")?;
    let session = get_required_str(&req.params, "session")?;
    let Some(semester) = req.params.get("semester").and_then(|v| v.as_i64()) else {
        return Err(HandlerErr::bad_params("missing semester"));
    };
    let key = RosterKey::new(course.trim(), semester, session.trim());
    validate_roster_key(&key)?;
    Ok(key)
}

pub fn respond(req: &Request, result: Result<serde_json::Value, HandlerErr>) -> serde_json::Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}
