use crate::db;
use crate::ipc::helpers::{err, get_required_array, get_required_str, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::reconcile::{PasiRecord, StudentSummaryRecord};
use serde_json::{json, Value};

fn parse_pasi_records(raw: &[Value]) -> Result<Vec<PasiRecord>, HandlerErr> {
    raw.iter()
        .enumerate()
        .map(|(i, v)| {
            serde_json::from_value::<PasiRecord>(v.clone()).map_err(|e| {
                HandlerErr::with_details(
                    "bad_params",
                    format!("records[{}] is not a valid PASI record: {}", i, e),
                    json!({ "index": i }),
                )
            })
        })
        .collect()
}

fn parse_summary_records(raw: &[Value]) -> Result<Vec<StudentSummaryRecord>, HandlerErr> {
    raw.iter()
        .enumerate()
        .map(|(i, v)| {
            serde_json::from_value::<StudentSummaryRecord>(v.clone()).map_err(|e| {
                HandlerErr::with_details(
                    "bad_params",
                    format!("records[{}] is not a valid summary record: {}", i, e),
                    json!({ "index": i }),
                )
            })
        })
        .collect()
}

fn handle_replace_pasi(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let school_year = match get_required_str(&req.params, "schoolYear") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let raw = match get_required_array(&req.params, "records") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let records = match parse_pasi_records(raw) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    match db::replace_pasi_snapshot(conn, &school_year, &records) {
        Ok(stored) => ok(
            &req.id,
            json!({
                "schoolYear": school_year,
                "recordCount": stored.len()
            }),
        ),
        Err(e) => err(&req.id, "db_insert_failed", e.to_string(), None),
    }
}

fn handle_replace_summaries(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let school_year = match get_required_str(&req.params, "schoolYear") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let raw = match get_required_array(&req.params, "records") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let records = match parse_summary_records(raw) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    match db::replace_summary_snapshot(conn, &school_year, &records) {
        Ok(stored) => ok(
            &req.id,
            json!({
                "schoolYear": school_year,
                "recordCount": stored.len()
            }),
        ),
        Err(e) => err(&req.id, "db_insert_failed", e.to_string(), None),
    }
}

fn handle_list_pasi(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let school_year = match get_required_str(&req.params, "schoolYear") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match db::load_pasi_records(conn, &school_year) {
        Ok(Some(records)) => ok(
            &req.id,
            json!({ "schoolYear": school_year, "records": records }),
        ),
        Ok(None) => err(
            &req.id,
            "source_unavailable",
            format!("no PASI snapshot delivered for {}", school_year),
            Some(json!({ "schoolYear": school_year, "source": db::SOURCE_PASI })),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_list_summaries(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let school_year = match get_required_str(&req.params, "schoolYear") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match db::load_student_summaries(conn, &school_year) {
        Ok(Some(records)) => ok(
            &req.id,
            json!({ "schoolYear": school_year, "records": records }),
        ),
        Ok(None) => err(
            &req.id,
            "source_unavailable",
            format!("no summary snapshot delivered for {}", school_year),
            Some(json!({ "schoolYear": school_year, "source": db::SOURCE_SUMMARIES })),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_clear_year(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let school_year = match get_required_str(&req.params, "schoolYear") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match db::clear_year(conn, &school_year) {
        Ok(()) => ok(&req.id, json!({ "schoolYear": school_year })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "records.replacePasi" => Some(handle_replace_pasi(state, req)),
        "records.replaceSummaries" => Some(handle_replace_summaries(state, req)),
        "records.listPasi" => Some(handle_list_pasi(state, req)),
        "records.listSummaries" => Some(handle_list_summaries(state, req)),
        "records.clearYear" => Some(handle_clear_year(state, req)),
        _ => None,
    }
}
