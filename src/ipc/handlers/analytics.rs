use crate::calc;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{optional_str, required_str, store};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_overview(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match store(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let instructor = optional_str(req, "instructor");
    ok(&req.id, json!(calc::overview(store.data(), instructor)))
}

fn handle_course(state: &mut AppState, req: &Request) -> serde_json::Value {
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let store = match store(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let Some(questions) = store.data().courses.get(name) else {
        return err(
            &req.id,
            "not_found",
            "course not found",
            Some(json!({ "name": name })),
        );
    };

    let rows: Vec<serde_json::Value> = questions
        .iter()
        .map(|q| {
            json!({
                "question": q.question,
                "average": q.average,
                "responseCount": q.responses.len(),
                "responses": q.responses,
                "distribution": calc::rating_distribution(&q.responses),
            })
        })
        .collect();
    ok(
        &req.id,
        json!({
            "name": name,
            "summary": calc::course_summary(name, questions),
            "questions": rows,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "analytics.overview" => Some(handle_overview(state, req)),
        "analytics.course" => Some(handle_course(state, req)),
        _ => None,
    }
}
