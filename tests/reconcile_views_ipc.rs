
use serde_json::json;
use test_support::{request_ok, select_workspace, spawn_sidecar, temp_dir};

fn ingest_fixture(
    stdin: &mut std::process::ChildStdin,
    reader: &mut std::io::BufReader<std::process::ChildStdout>,
) {
    let _ = request_ok(
        stdin,
        reader,
        "ingest-pasi",
        "records.replacePasi",
        json!({
            "schoolYear": "24/25",
            "records": [
                {
                    "id": "p1", "asn": "111", "courseCode": "MATH30",
                    "status": "Completed", "exitDate": "2025-01-15", "value": "72"
                },
                {
                    "id": "p2", "asn": "111", "courseCode": "MATH30",
                    "status": "Active", "exitDate": "2025-06-15", "value": "85"
                },
                { "id": "p3", "asn": "222", "courseCode": "SCI20", "status": "Active" },
                { "id": "p4", "courseCode": "ELA10", "status": "Active" }
            ]
        }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "ingest-summaries",
        "records.replaceSummaries",
        json!({
            "schoolYear": "24/25",
            "records": [
                {
                    "id": "s1", "asn": "111", "courseId": "MATH30",
                    "status": "Archived", "email": "kid@x.com"
                },
                { "id": "s2", "asn": "333", "courseId": "BIO30", "email": "kid@x.com" },
                { "id": "s3", "asn": "333", "courseId": "CHEM30", "email": "other@x.com" }
            ]
        }),
    );
}

#[test]
fn views_partition_and_tag_provenance() {
    let workspace = temp_dir("pasid-views");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);
    ingest_fixture(&mut stdin, &mut reader);

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "views",
        "reconcile.views",
        json!({ "schoolYear": "24/25" }),
    );

    let combined = result["combined"].as_array().expect("combined");
    // 3 summaries + 2 leftover PASI records (p3 unmatched, p4 incomplete key).
    assert_eq!(combined.len(), 5);
    assert_eq!(result["counts"]["combined"], json!(5));

    // s1 links against the latest of the p1/p2 group.
    assert_eq!(combined[0]["recordType"], json!("linked"));
    assert_eq!(combined[0]["matchCount"], json!(2));
    assert_eq!(combined[0]["id"], json!("s1"));
    assert_eq!(combined[0]["pasiRecordId"], json!("p2"));
    // Summary status wins over the PASI status; uncontested PASI fields stay.
    assert_eq!(combined[0]["status"], json!("Archived"));
    assert_eq!(combined[0]["value"], json!("85"));

    assert_eq!(combined[1]["recordType"], json!("summaryOnly"));
    assert_eq!(combined[2]["recordType"], json!("summaryOnly"));
    assert_eq!(combined[3]["recordType"], json!("pasiOnly"));
    assert_eq!(combined[3]["id"], json!("p3"));
    assert_eq!(combined[4]["recordType"], json!("pasiOnly"));
    assert_eq!(combined[4]["id"], json!("p4"));
    assert_eq!(combined[4]["matchCount"], json!(1));

    // p3 has no summary, p4 has no complete key; p1/p2 are linked away.
    let unlinked: Vec<&str> = result["unlinkedPasi"]
        .as_array()
        .expect("unlinkedPasi")
        .iter()
        .map(|r| r["id"].as_str().unwrap())
        .collect();
    assert_eq!(unlinked, vec!["p3", "p4"]);

    let unmatched: Vec<&str> = result["unmatchedSummaries"]
        .as_array()
        .expect("unmatchedSummaries")
        .iter()
        .map(|r| r["id"].as_str().unwrap())
        .collect();
    assert_eq!(unmatched, vec!["s2", "s3"]);

    // s2/s3 share ASN 333 under two distinct emails.
    let dupes: Vec<&str> = result["duplicateAsn"]
        .as_array()
        .expect("duplicateAsn")
        .iter()
        .map(|r| r["id"].as_str().unwrap())
        .collect();
    assert_eq!(dupes, vec!["s2", "s3"]);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn views_recompute_from_fresh_snapshots() {
    let workspace = temp_dir("pasid-views-recompute");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);
    ingest_fixture(&mut stdin, &mut reader);

    let before = request_ok(
        &mut stdin,
        &mut reader,
        "before",
        "reconcile.combined",
        json!({ "schoolYear": "24/25" }),
    );
    assert_eq!(before["counts"]["combined"], json!(5));

    // Replacing the summary snapshot changes the derived views on the next
    // request; nothing is cached.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "replace",
        "records.replaceSummaries",
        json!({
            "schoolYear": "24/25",
            "records": [
                { "id": "s9", "asn": "222", "courseId": "SCI20" }
            ]
        }),
    );
    let after = request_ok(
        &mut stdin,
        &mut reader,
        "after",
        "reconcile.combined",
        json!({ "schoolYear": "24/25" }),
    );
    let combined = after["combined"].as_array().expect("combined");
    // s9 linked to p3; p1, p2, p4 left over.
    assert_eq!(combined.len(), 4);
    assert_eq!(combined[0]["recordType"], json!("linked"));
    assert_eq!(combined[0]["id"], json!("s9"));

    drop(stdin);
    let _ = child.wait();
}
