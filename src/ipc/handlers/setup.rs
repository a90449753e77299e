use crate::db;
use crate::ipc::helpers::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::schoolyear;
use serde_json::{json, Map, Value};

const SECTION_KEY: &str = "setup.reconcile";

fn default_section() -> Value {
    json!({
        "defaultSchoolYear": null,
        "defaultIncludeNextYear": false,
        "defaultIncludePreviousYear": false
    })
}

fn merge_section_patch(current: &mut Value, patch: &Map<String, Value>) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match k.as_str() {
            "defaultSchoolYear" => {
                if v.is_null() {
                    obj.insert(k.clone(), Value::Null);
                    continue;
                }
                let Some(s) = v.as_str() else {
                    return Err("defaultSchoolYear must be string or null".to_string());
                };
                let s = s.trim().to_string();
                // A default the adjacent-year math cannot parse would leave
                // the include toggles permanently unavailable.
                if schoolyear::next_school_year(&s).is_none() {
                    return Err(format!("unrecognized school year label: {}", s));
                }
                obj.insert(k.clone(), Value::String(s));
            }
            "defaultIncludeNextYear" | "defaultIncludePreviousYear" => {
                let Some(b) = v.as_bool() else {
                    return Err(format!("{} must be boolean", k));
                };
                obj.insert(k.clone(), Value::Bool(b));
            }
            _ => return Err(format!("unknown reconcile field: {}", k)),
        }
    }
    Ok(())
}

pub fn load_section(conn: &rusqlite::Connection) -> anyhow::Result<Value> {
    let mut current = default_section();
    if let Some(saved) = db::settings_get_json(conn, SECTION_KEY)? {
        if let Some(saved_obj) = saved.as_object() {
            // Best-effort apply: malformed historical values must not block setup.
            let _ = merge_section_patch(&mut current, saved_obj);
        }
    }
    Ok(current)
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let reconcile = match load_section(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(&req.id, json!({ "reconcile": reconcile }))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    if section != "reconcile" {
        return err(&req.id, "bad_params", "unknown section", None);
    }
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(&mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, SECTION_KEY, &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true, "reconcile": current }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
