use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::seed;
use crate::store::FeedbackStore;
use serde_json::json;
use std::path::{Path, PathBuf};

/// Opens (or creates) the workspace database and loads its store. On failure
/// the previously selected workspace stays active.
pub fn open_workspace(
    state: &mut AppState,
    path: &Path,
    seed_path: Option<&Path>,
) -> anyhow::Result<()> {
    let conn = db::open_db(path)?;
    let store = FeedbackStore::open(Box::new(conn), || seed::load(seed_path))?;
    log::info!(
        "workspace {} opened: {} pending, {} completed",
        path.to_string_lossy(),
        store.data().pending_forms.len(),
        store.data().completed_forms.len()
    );
    state.workspace = Some(path.to_path_buf());
    state.store = Some(store);
    Ok(())
}

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let path = match required_str(req, "path") {
        Ok(v) => PathBuf::from(v),
        Err(resp) => return resp,
    };
    let seed_path = optional_str(req, "seedPath")
        .map(PathBuf::from)
        .or_else(|| state.config.seed_path.clone());

    match open_workspace(state, &path, seed_path.as_deref()) {
        Ok(()) => ok(&req.id, json!({ "workspacePath": path.to_string_lossy() })),
        Err(e) => {
            log::error!("workspace {} failed to open: {e:#}", path.to_string_lossy());
            err(&req.id, "db_open_failed", format!("{e:#}"), None)
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
