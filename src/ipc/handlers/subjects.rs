use crate::db;
use crate::error::ValidationError;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{db_conn, get_required, get_required_str, respond, roster_key};
use crate::ipc::types::{AppState, Request};
use crate::model::SubjectDefinition;
use crate::store::RosterStore;
use crate::validate::{validate_mark_entry, validate_subject_definition};
use serde_json::json;

fn subjects_list(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let key = roster_key(req)?;
    let subjects = conn.subject_definitions(&key)?;
    Ok(json!({ "subjects": subjects }))
}

fn subjects_upsert(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let key = roster_key(req)?;
    let mut def: SubjectDefinition = get_required(&req.params, "subject")?;
    def.name = def.name.trim().to_string();
    validate_subject_definition(&def)?;
    db::upsert_subject(conn, &key, &def)?;
    tracing::info!(roster = %key, subject = %def.name, "subject definition saved");
    Ok(json!({ "subject": def }))
}

fn subjects_delete(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let key = roster_key(req)?;
    let name = get_required_str(&req.params, "name")?;
    let deleted = db::delete_subject(conn, &key, name.trim())?;
    if deleted {
        tracing::info!(roster = %key, subject = %name.trim(), "subject definition deleted");
    }
    Ok(json!({ "deleted": deleted }))
}

/// Check one mark pair without storing anything. The definition is either
/// given inline or looked up by subject name in the roster.
fn marks_validate(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let def: SubjectDefinition = if req.params.get("definition").is_some() {
        let def: SubjectDefinition = get_required(&req.params, "definition")?;
        validate_subject_definition(&def)?;
        def
    } else {
        let conn = db_conn(state)?;
        let key = roster_key(req)?;
        let subject = get_required_str(&req.params, "subject")?;
        let defs = conn.subject_definitions(&key)?;
        let Some(def) = defs.into_iter().find(|d| d.name == subject.trim()) else {
            return Err(ValidationError::UnknownSubject {
                subject: subject.trim().to_string(),
                roster: key.to_string(),
            }
            .into());
        };
        def
    };
    let null = serde_json::Value::Null;
    let internal = req.params.get("internal").unwrap_or(&null);
    let external = req.params.get("external").unwrap_or(&null);
    let entry = validate_mark_entry(&def, internal, external)?;
    Ok(json!({ "entry": entry }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "subjects.list" => Some(respond(req, subjects_list(state, req))),
        "subjects.upsert" => Some(respond(req, subjects_upsert(state, req))),
        "subjects.delete" => Some(respond(req, subjects_delete(state, req))),
        "marks.validate" => Some(respond(req, marks_validate(state, req))),
        _ => None,
    }
}
