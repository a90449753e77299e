use crate::db;
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{err, get_opt_bool, get_opt_str, get_required_str, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::reconcile::RecordSets;
use crate::schoolyear;
use rusqlite::Connection;
use serde_json::{json, Value};

struct ViewQuery {
    school_year: String,
    include_next: bool,
    include_previous: bool,
}

/// Params win over the stored setup.reconcile defaults.
fn resolve_query(conn: &Connection, params: &Value) -> Result<ViewQuery, HandlerErr> {
    let defaults = setup::load_section(conn)
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;

    let school_year = match get_opt_str(params, "schoolYear") {
        Some(y) => y,
        None => defaults
            .get("defaultSchoolYear")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                HandlerErr::new("bad_params", "missing schoolYear and no default configured")
            })?,
    };
    let include_next = match get_opt_bool(params, "includeNextYear")? {
        Some(b) => b,
        None => defaults
            .get("defaultIncludeNextYear")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
    };
    let include_previous = match get_opt_bool(params, "includePreviousYear")? {
        Some(b) => b,
        None => defaults
            .get("defaultIncludePreviousYear")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
    };

    Ok(ViewQuery {
        school_year,
        include_next,
        include_previous,
    })
}

fn load_year(conn: &Connection, school_year: &str) -> Result<RecordSets, HandlerErr> {
    let map_db = |e: anyhow::Error| HandlerErr::new("db_query_failed", e.to_string());
    let pasi_records = db::load_pasi_records(conn, school_year)
        .map_err(map_db)?
        .ok_or_else(|| {
            HandlerErr::with_details(
                "source_unavailable",
                format!("no PASI snapshot delivered for {}", school_year),
                json!({ "schoolYear": school_year, "source": db::SOURCE_PASI }),
            )
        })?;
    let summaries = db::load_student_summaries(conn, school_year)
        .map_err(map_db)?
        .ok_or_else(|| {
            HandlerErr::with_details(
                "source_unavailable",
                format!("no summary snapshot delivered for {}", school_year),
                json!({ "schoolYear": school_year, "source": db::SOURCE_SUMMARIES }),
            )
        })?;
    Ok(RecordSets {
        pasi_records,
        summaries,
    })
}

/// Concatenate the requested years into one record set. An include toggle
/// whose adjacent label cannot be derived degrades to not-applied (the UI
/// disables the toggle); a derivable year with no delivered snapshot is a
/// hard source_unavailable, never a silent fallback.
fn load_record_sets(
    conn: &Connection,
    query: &ViewQuery,
) -> Result<(RecordSets, Value), HandlerErr> {
    let mut sets = load_year(conn, &query.school_year)?;
    let mut included_years = vec![query.school_year.clone()];

    let previous_label = schoolyear::previous_school_year(&query.school_year);
    let mut applied_previous = false;
    if query.include_previous {
        if let Some(label) = previous_label.as_deref() {
            let mut previous = load_year(conn, label)?;
            // Previous-year records come first so cross-year groups keep
            // chronological input order.
            previous.extend(std::mem::take(&mut sets));
            sets = previous;
            included_years.insert(0, label.to_string());
            applied_previous = true;
        }
    }

    let next_label = schoolyear::next_school_year(&query.school_year);
    let mut applied_next = false;
    if query.include_next {
        if let Some(label) = next_label.as_deref() {
            sets.extend(load_year(conn, label)?);
            included_years.push(label.to_string());
            applied_next = true;
        }
    }

    let meta = json!({
        "schoolYear": query.school_year,
        "includedYears": included_years,
        "includeNextYear": applied_next,
        "includePreviousYear": applied_previous,
        "nextYearAvailable": next_label.is_some(),
        "previousYearAvailable": previous_label.is_some(),
    });
    Ok((sets, meta))
}

fn handle_adjacent(_state: &mut AppState, req: &Request) -> Value {
    // Pure label arithmetic; no workspace required.
    let school_year = match get_required_str(&req.params, "schoolYear") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    ok(
        &req.id,
        json!({
            "schoolYear": school_year,
            "next": schoolyear::next_school_year(&school_year),
            "previous": schoolyear::previous_school_year(&school_year),
        }),
    )
}

fn handle_combined(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let query = match resolve_query(conn, &req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let (sets, meta) = match load_record_sets(conn, &query) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let combined = sets.combined();
    ok(
        &req.id,
        json!({
            "meta": meta,
            "counts": {
                "pasiRecords": sets.pasi_records.len(),
                "summaries": sets.summaries.len(),
                "combined": combined.len(),
            },
            "combined": combined,
        }),
    )
}

fn handle_views(state: &mut AppState, req: &Request) -> Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let query = match resolve_query(conn, &req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let (sets, meta) = match load_record_sets(conn, &query) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let combined = sets.combined();
    let unlinked_pasi = sets.unlinked_pasi();
    let unmatched_summaries = sets.unmatched_summaries();
    let duplicate_asn = sets.duplicate_asn_summaries();
    ok(
        &req.id,
        json!({
            "meta": meta,
            "counts": {
                "pasiRecords": sets.pasi_records.len(),
                "summaries": sets.summaries.len(),
                "combined": combined.len(),
                "unlinkedPasi": unlinked_pasi.len(),
                "unmatchedSummaries": unmatched_summaries.len(),
                "duplicateAsn": duplicate_asn.len(),
            },
            "combined": combined,
            "unlinkedPasi": unlinked_pasi,
            "unmatchedSummaries": unmatched_summaries,
            "duplicateAsn": duplicate_asn,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "schoolYear.adjacent" => Some(handle_adjacent(state, req)),
        "reconcile.combined" => Some(handle_combined(state, req)),
        "reconcile.views" => Some(handle_views(state, req)),
        _ => None,
    }
}
