
use serde_json::json;
use test_support::{request_err, request_ok, select_workspace, spawn_sidecar, temp_dir};

#[test]
fn snapshots_replace_wholesale_and_list_in_input_order() {
    let workspace = temp_dir("pasid-records-roundtrip");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let replaced = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "records.replacePasi",
        json!({
            "schoolYear": "24/25",
            "records": [
                { "id": "p1", "asn": "111", "courseCode": "MATH30", "status": "Active" },
                { "asn": "222", "courseCode": "SCI20", "exitDate": "2025-01-31" }
            ]
        }),
    );
    assert_eq!(replaced["recordCount"], json!(2));

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "records.listPasi",
        json!({ "schoolYear": "24/25" }),
    );
    let records = listed["records"].as_array().expect("records array");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["id"], json!("p1"));
    assert_eq!(records[0]["schoolYear"], json!("24/25"));
    // Ingest assigns an id when the source omitted one.
    assert!(records[1]["id"].as_str().map(|s| !s.is_empty()).unwrap_or(false));
    assert_eq!(records[1]["exitDate"], json!("2025-01-31"));

    // A second delivery replaces the snapshot, it does not append.
    let replaced = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "records.replacePasi",
        json!({
            "schoolYear": "24/25",
            "records": [
                { "id": "p9", "asn": "999", "courseCode": "ELA10" }
            ]
        }),
    );
    assert_eq!(replaced["recordCount"], json!(1));
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "records.listPasi",
        json!({ "schoolYear": "24/25" }),
    );
    let records = listed["records"].as_array().expect("records array");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["id"], json!("p9"));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn extra_attributes_round_trip_through_the_store() {
    let workspace = temp_dir("pasid-records-extra");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "records.replaceSummaries",
        json!({
            "schoolYear": "2024/2025",
            "records": [
                {
                    "id": "s1",
                    "asn": "111",
                    "courseId": 3003,
                    "email": "a@x.com",
                    "lastActivity": "2025-02-01",
                    "workItems": { "review": true }
                }
            ]
        }),
    );

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "records.listSummaries",
        json!({ "schoolYear": "2024/2025" }),
    );
    let records = listed["records"].as_array().expect("records array");
    assert_eq!(records.len(), 1);
    // Numeric courseIds normalize to strings at the ingest boundary.
    assert_eq!(records[0]["courseId"], json!("3003"));
    assert_eq!(records[0]["lastActivity"], json!("2025-02-01"));
    assert_eq!(records[0]["workItems"], json!({ "review": true }));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn clear_year_removes_snapshots() {
    let workspace = temp_dir("pasid-records-clear");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "records.replacePasi",
        json!({ "schoolYear": "24/25", "records": [] }),
    );
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "records.listPasi",
        json!({ "schoolYear": "24/25" }),
    );
    assert_eq!(listed["records"], json!([]));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "records.clearYear",
        json!({ "schoolYear": "24/25" }),
    );
    let error = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "records.listPasi",
        json!({ "schoolYear": "24/25" }),
    );
    assert_eq!(error["code"], json!("source_unavailable"));

    drop(stdin);
    let _ = child.wait();
}
