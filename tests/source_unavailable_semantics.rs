
use serde_json::json;
use test_support::{request_err, request_ok, select_workspace, spawn_sidecar, temp_dir};

#[test]
fn undelivered_source_is_distinct_from_empty_snapshot() {
    let workspace = temp_dir("pasid-unavailable");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    // Nothing delivered yet: a hard error, not "zero unlinked records".
    let error = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "reconcile.views",
        json!({ "schoolYear": "24/25" }),
    );
    assert_eq!(error["code"], json!("source_unavailable"));
    assert_eq!(error["details"]["source"], json!("pasi"));

    // One side delivered is still unavailable, naming the missing side.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "records.replacePasi",
        json!({ "schoolYear": "24/25", "records": [] }),
    );
    let error = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "reconcile.views",
        json!({ "schoolYear": "24/25" }),
    );
    assert_eq!(error["code"], json!("source_unavailable"));
    assert_eq!(error["details"]["source"], json!("summaries"));

    // Both sides delivered empty: success with empty views.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "records.replaceSummaries",
        json!({ "schoolYear": "24/25", "records": [] }),
    );
    let views = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "reconcile.views",
        json!({ "schoolYear": "24/25" }),
    );
    assert_eq!(views["combined"], json!([]));
    assert_eq!(views["unlinkedPasi"], json!([]));
    assert_eq!(views["unmatchedSummaries"], json!([]));
    assert_eq!(views["duplicateAsn"], json!([]));
    assert_eq!(views["counts"]["combined"], json!(0));

    drop(stdin);
    let _ = child.wait();
}
