mod backup;
mod calc;
mod config;
mod db;
mod engine;
mod error;
mod ipc;
mod logging;
mod model;
mod roster;
mod store;
mod subject_stats;
mod validate;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

fn main() {
    logging::init_tracing();

    let mut state = ipc::AppState::default();
    if let Some(path) = std::env::var_os(config::WORKSPACE_ENV) {
        let path = PathBuf::from(path);
        // Startup continues without a workspace; the client can still select one.
        if let Err(e) = state.open_workspace(&path) {
            tracing::warn!(workspace = %path.display(), "failed to open workspace: {e:#}");
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("malformed request line: {e}");
                // No id to echo back.
                let resp = ipc::err("", "bad_json", e.to_string(), None);
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(stdout, "{}", resp);
        let _ = stdout.flush();
    }
}
