use std::path::{Path, PathBuf};

use rusqlite::Connection;
use serde::Deserialize;

use crate::db;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
}

impl AppState {
    /// Open (creating if needed) the workspace database and make it current.
    pub fn open_workspace(&mut self, path: &Path) -> anyhow::Result<()> {
        // Release the old handle first so a reopen of the same file sees fresh contents.
        self.db = None;
        let conn = db::open_db(path)?;
        self.workspace = Some(path.to_path_buf());
        self.db = Some(conn);
        tracing::info!(workspace = %path.display(), "workspace opened");
        Ok(())
    }
}
