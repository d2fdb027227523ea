use crate::backup;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{get_required_str, respond};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn backup_export(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let out_path = get_required_str(&req.params, "outPath")?;
    let out_path = out_path.trim();
    if out_path.is_empty() {
        return Err(HandlerErr::bad_params("missing outPath"));
    }
    let Some(workspace_path) = state.workspace.clone() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };

    if let Some(conn) = state.db.as_ref() {
        let _ = conn.execute_batch("PRAGMA wal_checkpoint(FULL)");
    }

    let export = backup::export_workspace_bundle(&workspace_path, &PathBuf::from(out_path))
        .map_err(|e| HandlerErr {
            code: "backup_failed",
            message: format!("{e:#}"),
            details: Some(json!({ "path": out_path })),
        })?;
    tracing::info!(path = %out_path, sha256 = %export.db_sha256, "workspace bundle exported");
    Ok(json!({
        "ok": true,
        "path": out_path,
        "bundleFormat": export.bundle_format,
        "entryCount": export.entry_count,
        "dbSha256": export.db_sha256,
    }))
}

fn backup_import(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let in_path = get_required_str(&req.params, "inPath")?;
    let in_path = in_path.trim();
    if in_path.is_empty() {
        return Err(HandlerErr::bad_params("missing inPath"));
    }
    let Some(workspace_path) = state.workspace.clone() else {
        return Err(HandlerErr::new("no_workspace", "select a workspace first"));
    };
    let src = PathBuf::from(in_path);
    if !src.is_file() {
        return Err(HandlerErr {
            code: "not_found",
            message: "bundle file not found".to_string(),
            details: Some(json!({ "path": in_path })),
        });
    }

    // Close the live connection before its file is swapped out.
    state.db = None;
    let imported = backup::import_workspace_bundle(&src, &workspace_path);
    let reopened = state.open_workspace(&workspace_path);
    let summary = imported.map_err(|e| HandlerErr {
        code: "backup_failed",
        message: format!("{e:#}"),
        details: Some(json!({ "path": in_path })),
    })?;
    reopened.map_err(|e| HandlerErr::new("db_open_failed", format!("{e:?}")))?;

    tracing::info!(path = %in_path, sha256 = %summary.db_sha256, "workspace bundle imported");
    Ok(json!({
        "ok": true,
        "workspacePath": workspace_path.to_string_lossy(),
        "bundleFormat": summary.bundle_format,
        "exportedAt": summary.exported_at,
        "dbSha256": summary.db_sha256,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.export" => Some(respond(req, backup_export(state, req))),
        "backup.import" => Some(respond(req, backup_import(state, req))),
        _ => None,
    }
}
