use crate::ipc::error::{err, ok, store_err};
use crate::ipc::helpers::{optional_str, required_form_id, required_typed, store, store_mut};
use crate::ipc::types::{AppState, Request};
use crate::model::FormDefinition;
use serde_json::json;

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let data = store.data();
    match optional_str(req, "status") {
        None => ok(
            &req.id,
            json!({ "pending": data.pending_forms, "completed": data.completed_forms }),
        ),
        Some("pending") => ok(&req.id, json!({ "forms": data.pending_forms })),
        Some("completed") => ok(&req.id, json!({ "forms": data.completed_forms })),
        Some(other) => err(
            &req.id,
            "bad_params",
            format!("unknown status: {}", other),
            None,
        ),
    }
}

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let form_id = match required_form_id(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let store = match store(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let data = store.data();
    if let Some(f) = data.pending_form(form_id) {
        return ok(&req.id, json!({ "form": f, "status": "pending" }));
    }
    if let Some(f) = data.completed_form(form_id) {
        return ok(&req.id, json!({ "form": f, "status": "completed" }));
    }
    err(
        &req.id,
        "not_found",
        "form not found",
        Some(json!({ "formId": form_id })),
    )
}

fn handle_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let form: FormDefinition = match required_typed(req, "form") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let store = match store_mut(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    match store.add_form(form) {
        Ok(form_id) => ok(&req.id, json!({ "formId": form_id })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let form_id = match required_form_id(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let form: FormDefinition = match required_typed(req, "form") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let store = match store_mut(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    match store.update_form(form_id, form) {
        Ok(_) => ok(&req.id, json!({ "formId": form_id })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let form_id = match required_form_id(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let store = match store_mut(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    match store.delete_form(form_id) {
        Ok(_) => ok(&req.id, json!({ "formId": form_id })),
        Err(e) => store_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "forms.list" => Some(handle_list(state, req)),
        "forms.get" => Some(handle_get(state, req)),
        "forms.add" => Some(handle_add(state, req)),
        "forms.update" => Some(handle_update(state, req)),
        "forms.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
