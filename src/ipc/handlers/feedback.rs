use crate::calc;
use crate::ipc::error::{ok, store_err};
use crate::ipc::helpers::{required_form_id, required_typed, store, store_mut};
use crate::ipc::types::{AppState, Request};
use crate::model::{FormResponse, ResponseValue};
use serde_json::json;
use std::collections::BTreeMap;

fn handle_data(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    ok(&req.id, json!(store.data()))
}

fn handle_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let form_id = match required_form_id(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let answers: BTreeMap<i64, ResponseValue> = match required_typed(req, "responses") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let response = FormResponse { form_id, answers };
    let store = match store_mut(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let course = store
        .data()
        .pending_form(form_id)
        .map(|f| calc::course_bucket_name(&f.title).to_string());
    match store.submit(&response) {
        Ok(data) => ok(
            &req.id,
            json!({
                "formId": form_id,
                "course": course,
                "pendingCount": data.pending_forms.len(),
                "completedCount": data.completed_forms.len(),
            }),
        ),
        Err(e) => {
            log::warn!("submit for form {form_id} rejected: {e}");
            store_err(&req.id, &e)
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "feedback.data" => Some(handle_data(state, req)),
        "feedback.submit" => Some(handle_submit(state, req)),
        _ => None,
    }
}
