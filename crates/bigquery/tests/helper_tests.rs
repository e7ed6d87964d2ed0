//! Integration tests for [`BigQueryHelper`] against an in-process fake of
//! the BigQuery REST API.
//!
//! The fake keeps just enough state to exercise job polling, error
//! results, paging and table lifecycle calls.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use offsetting_bigquery::api::{BigQueryApi, BigQueryApiError};
use offsetting_bigquery::auth::StaticToken;
use offsetting_bigquery::job::{QueryOptions, WriteDisposition};
use offsetting_bigquery::poll::{PollConfig, RetryConfig};
use offsetting_bigquery::{BigQueryError, BigQueryHelper, TableSpec, Warehouse};
use offsetting_core::table_ref::TableRef;

// ---------------------------------------------------------------------------
// Fake server
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeState {
    inserted_jobs: Vec<Value>,
    auth_headers: Vec<String>,
    polls: u32,
    /// The job reports DONE on this poll.
    done_after_polls: u32,
    error_result: Option<Value>,
    /// Answer this many polls with a 503 before succeeding.
    failing_polls: u32,
    poll_locations: Vec<Option<String>>,
    cancelled: Vec<String>,
    tables: HashSet<String>,
    created_tables: Vec<Value>,
    descriptions: Vec<(String, String)>,
}

type Shared = Arc<Mutex<FakeState>>;

async fn insert_job(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    let mut st = state.lock().unwrap();
    if let Some(auth) = headers.get("authorization") {
        st.auth_headers.push(auth.to_str().unwrap().to_string());
    }
    st.inserted_jobs.push(body.clone());

    let dry_run = body["configuration"]["dryRun"].as_bool().unwrap_or(false);
    Json(json!({
        "jobReference": {
            "projectId": body["jobReference"]["projectId"],
            "jobId": body["jobReference"]["jobId"],
            "location": "US"
        },
        "status": {"state": if dry_run { "DONE" } else { "RUNNING" }},
        "statistics": {
            "creationTime": "1655493911998",
            "query": {"totalBytesProcessed": "2048"}
        },
        "configuration": body["configuration"]
    }))
}

async fn get_job(
    State(state): State<Shared>,
    Path((project, job_id)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let mut st = state.lock().unwrap();
    st.polls += 1;
    if st.polls <= st.failing_polls {
        return (StatusCode::SERVICE_UNAVAILABLE, "backend error").into_response();
    }
    st.poll_locations.push(query.get("location").cloned());

    let done = st.polls >= st.done_after_polls;
    let mut status = json!({"state": if done { "DONE" } else { "RUNNING" }});
    if done {
        if let Some(err) = &st.error_result {
            status["errorResult"] = err.clone();
        }
    }

    Json(json!({
        "jobReference": {"projectId": project, "jobId": job_id, "location": "US"},
        "status": status,
        "statistics": {
            "creationTime": "1655493911998",
            "startTime": "1655493912000",
            "endTime": "1655493914500",
            "totalSlotMs": "5000",
            "query": {
                "totalBytesProcessed": "4096",
                "totalBytesBilled": "10485760",
                "numDmlAffectedRows": "7",
                "timeline": [{"elapsedMs": "1500", "totalSlotMs": "5000",
                              "pendingUnits": "1", "completedUnits": "2", "activeUnits": "1"}]
            }
        }
    }))
    .into_response()
}

async fn cancel_job(
    State(state): State<Shared>,
    Path((_project, job_id)): Path<(String, String)>,
) -> Json<Value> {
    state.lock().unwrap().cancelled.push(job_id);
    Json(json!({}))
}

async fn query_results(Query(query): Query<HashMap<String, String>>) -> Json<Value> {
    let schema = json!({"fields": [
        {"name": "check_name", "type": "STRING"},
        {"name": "failures", "type": "INTEGER"}
    ]});
    match query.get("pageToken").map(String::as_str) {
        None => Json(json!({
            "jobComplete": true,
            "schema": schema,
            "rows": [{"f": [{"v": "null_ssvid"}, {"v": "0"}]}],
            "totalRows": "2",
            "pageToken": "page-2"
        })),
        Some(_) => Json(json!({
            "jobComplete": true,
            "schema": schema,
            "rows": [{"f": [{"v": "duplicate_ssvid"}, {"v": "3"}]}],
            "totalRows": "2"
        })),
    }
}

async fn get_table(
    State(state): State<Shared>,
    Path((project, dataset, table)): Path<(String, String, String)>,
) -> Response {
    let name = format!("{project}.{dataset}.{table}");
    if state.lock().unwrap().tables.contains(&name) {
        Json(json!({"tableReference": {"projectId": project, "datasetId": dataset, "tableId": table}}))
            .into_response()
    } else {
        (StatusCode::NOT_FOUND, "Not found: Table").into_response()
    }
}

async fn insert_table(
    State(state): State<Shared>,
    Path((_project, _dataset)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    let reference = &body["tableReference"];
    let name = format!(
        "{}.{}.{}",
        reference["projectId"].as_str().unwrap(),
        reference["datasetId"].as_str().unwrap(),
        reference["tableId"].as_str().unwrap()
    );
    let mut st = state.lock().unwrap();
    if !st.tables.insert(name) {
        return (StatusCode::CONFLICT, "Already Exists: Table").into_response();
    }
    st.created_tables.push(body.clone());
    Json(body).into_response()
}

async fn patch_table(
    State(state): State<Shared>,
    Path((project, dataset, table)): Path<(String, String, String)>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let description = body["description"].as_str().unwrap_or_default().to_string();
    state
        .lock()
        .unwrap()
        .descriptions
        .push((format!("{project}.{dataset}.{table}"), description.clone()));
    Json(json!({
        "tableReference": {"projectId": project, "datasetId": dataset, "tableId": table},
        "description": description
    }))
}

async fn spawn_server(state: Shared) -> String {
    let app = Router::new()
        .route("/projects/{project}/jobs", post(insert_job))
        .route("/projects/{project}/jobs/{job_id}", get(get_job))
        .route("/projects/{project}/jobs/{job_id}/cancel", post(cancel_job))
        .route("/projects/{project}/queries/{job_id}", get(query_results))
        .route(
            "/projects/{project}/datasets/{dataset}/tables",
            post(insert_table),
        )
        .route(
            "/projects/{project}/datasets/{dataset}/tables/{table}",
            get(get_table).patch(patch_table),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn fast_poll() -> PollConfig {
    PollConfig {
        poll_interval: Duration::from_millis(5),
        timeout: None,
        retry: RetryConfig {
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            multiplier: 2.0,
            max_attempts: 3,
        },
    }
}

async fn setup(configure: impl FnOnce(&mut FakeState)) -> (BigQueryHelper, Shared) {
    let mut fake = FakeState {
        done_after_polls: 1,
        ..Default::default()
    };
    configure(&mut fake);
    let state = Arc::new(Mutex::new(fake));
    let url = spawn_server(Arc::clone(&state)).await;
    let api = BigQueryApi::new(url, Arc::new(StaticToken::new("test-token")));
    let helper = BigQueryHelper::new(api, "proj").with_poll_config(fast_poll());
    (helper, state)
}

fn table(name: &str) -> TableRef {
    name.parse().unwrap()
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn run_query_polls_until_done() {
    let (helper, state) = setup(|s| s.done_after_polls = 3).await;

    let options = QueryOptions::into_table(table("proj.ds.out"), WriteDisposition::Append)
        .clustered_by(&["ssvid"]);
    let outcome = helper.run_query("SELECT 1", options).await.unwrap();

    assert_eq!(outcome.total_bytes_processed, 4096);
    assert_eq!(outcome.total_bytes_billed, 10_485_760);
    assert_eq!(outcome.location.as_deref(), Some("US"));
    assert!(!outcome.dry_run);

    let st = state.lock().unwrap();
    assert_eq!(st.polls, 3);
    assert_eq!(st.auth_headers, vec!["Bearer test-token"]);
    assert!(st.poll_locations.iter().all(|l| l.as_deref() == Some("US")));

    let query = &st.inserted_jobs[0]["configuration"]["query"];
    assert_eq!(query["priority"], "BATCH");
    assert_eq!(query["writeDisposition"], "WRITE_APPEND");
    assert_eq!(query["useLegacySql"], false);
    assert_eq!(query["destinationTable"]["tableId"], "out");
    assert_eq!(query["clustering"]["fields"][0], "ssvid");
    assert_eq!(outcome.job_id, st.inserted_jobs[0]["jobReference"]["jobId"]);
}

#[tokio::test]
async fn job_error_result_is_raised() {
    let (helper, _state) = setup(|s| {
        s.error_result = Some(json!({"reason": "invalidQuery", "message": "Syntax error at [1:1]"}));
    })
    .await;

    let err = helper
        .run_query("SELEC 1", QueryOptions::default())
        .await
        .unwrap_err();
    assert_matches!(err, BigQueryError::Job { ref reason, .. } if reason == "invalidQuery");
    assert_eq!(err.to_string(), "invalidQuery: Syntax error at [1:1]");
}

#[tokio::test]
async fn transient_poll_failure_is_retried() {
    let (helper, state) = setup(|s| {
        s.failing_polls = 1;
        s.done_after_polls = 2;
    })
    .await;

    helper
        .run_query("SELECT 1", QueryOptions::default())
        .await
        .unwrap();
    assert_eq!(state.lock().unwrap().polls, 2);
}

#[tokio::test]
async fn dry_run_submits_without_polling() {
    let (helper, state) = setup(|_| {}).await;
    let helper = helper.with_dry_run(true);

    let outcome = helper
        .run_query("SELECT 1", QueryOptions::default())
        .await
        .unwrap();
    assert!(outcome.dry_run);
    assert_eq!(outcome.total_bytes_processed, 2048);

    let st = state.lock().unwrap();
    assert_eq!(st.polls, 0);
    assert_eq!(st.inserted_jobs[0]["configuration"]["dryRun"], true);
}

#[tokio::test]
async fn query_rows_follows_page_tokens() {
    let (helper, _state) = setup(|_| {}).await;

    let rows = helper.query_rows("SELECT * FROM checks").await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["check_name"], "null_ssvid");
    assert_eq!(rows[1]["check_name"], "duplicate_ssvid");
    assert_eq!(rows[1]["failures"], "3");
}

#[tokio::test]
async fn timeout_cancels_the_job() {
    let (helper, state) = setup(|s| s.done_after_polls = u32::MAX).await;
    let mut poll = fast_poll();
    poll.timeout = Some(Duration::from_millis(50));
    let helper = helper.with_poll_config(poll);

    let err = helper
        .run_query("SELECT 1", QueryOptions::default())
        .await
        .unwrap_err();
    assert_matches!(err, BigQueryError::Timeout { .. });
    assert_eq!(state.lock().unwrap().cancelled.len(), 1);
}

#[tokio::test]
async fn cancellation_stops_waiting() {
    let cancel = CancellationToken::new();
    let (helper, state) = setup(|s| s.done_after_polls = u32::MAX).await;
    let helper = helper.with_cancellation(cancel.clone());

    let trigger = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
    });

    let err = helper
        .run_query("SELECT 1", QueryOptions::default())
        .await
        .unwrap_err();
    trigger.await.unwrap();
    assert_matches!(err, BigQueryError::Cancelled { .. });
    assert_eq!(state.lock().unwrap().cancelled.len(), 1);
}

#[tokio::test]
async fn cancellation_interrupts_retry_backoff() {
    let cancel = CancellationToken::new();
    let (helper, state) = setup(|s| s.failing_polls = u32::MAX).await;
    let mut poll = fast_poll();
    poll.retry.initial_delay = Duration::from_secs(30);
    poll.retry.max_delay = Duration::from_secs(30);
    let helper = helper.with_poll_config(poll).with_cancellation(cancel.clone());

    let trigger = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        helper.run_query("SELECT 1", QueryOptions::default()),
    )
    .await
    .expect("cancellation did not interrupt the backoff");
    trigger.await.unwrap();

    assert_matches!(result, Err(BigQueryError::Cancelled { .. }));
    let st = state.lock().unwrap();
    assert_eq!(st.polls, 1);
    assert_eq!(st.cancelled.len(), 1);
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

#[tokio::test]
async fn check_create_table_creates_only_when_absent() {
    let (helper, state) = setup(|s| {
        s.tables.insert("proj.ds.existing".to_string());
    })
    .await;

    let mut spec = TableSpec::new(table("proj.ds.fresh"));
    spec.partition_field = Some("date".into());
    spec.description = Some("offsetting".into());
    assert!(helper.check_create_table(&spec).await.unwrap());
    assert!(!helper.check_create_table(&spec).await.unwrap());

    let existing = TableSpec::new(table("proj.ds.existing"));
    assert!(!helper.check_create_table(&existing).await.unwrap());

    let st = state.lock().unwrap();
    assert_eq!(st.created_tables.len(), 1);
    assert_eq!(st.created_tables[0]["timePartitioning"]["field"], "date");
    assert_eq!(st.created_tables[0]["description"], "offsetting");
}

#[tokio::test]
async fn create_existing_table_respects_exists_ok() {
    let (helper, _state) = setup(|s| {
        s.tables.insert("proj.ds.t".to_string());
    })
    .await;

    let mut spec = TableSpec::new(table("proj.ds.t"));
    helper.create_table(&spec).await.unwrap();

    spec.exists_ok = false;
    assert_matches!(
        helper.create_table(&spec).await,
        Err(BigQueryError::Api(BigQueryApiError::AlreadyExists(_)))
    );
}

#[tokio::test]
async fn dry_run_does_not_create_tables() {
    let (helper, state) = setup(|_| {}).await;
    let helper = helper.with_dry_run(true);

    assert!(helper
        .check_create_table(&TableSpec::new(table("proj.ds.t")))
        .await
        .unwrap());
    assert!(state.lock().unwrap().created_tables.is_empty());
}

#[tokio::test]
async fn clear_partition_runs_batch_delete() {
    let (helper, state) = setup(|_| {}).await;

    let date = NaiveDate::from_ymd_opt(2021, 1, 2).unwrap();
    helper
        .clear_table_partition(&table("proj.ds.t"), "date", date)
        .await
        .unwrap();

    let st = state.lock().unwrap();
    let query = &st.inserted_jobs[0]["configuration"]["query"];
    assert_eq!(
        query["query"],
        "DELETE FROM `proj.ds.t` WHERE DATE(date) = '2021-01-02'"
    );
    assert_eq!(query["priority"], "BATCH");
    assert!(query.get("destinationTable").is_none());
}

#[tokio::test]
async fn update_description_patches_table() {
    let (helper, state) = setup(|_| {}).await;

    helper
        .update_table_description(&table("proj.ds.t"), "new description")
        .await
        .unwrap();
    assert_eq!(
        state.lock().unwrap().descriptions,
        vec![("proj.ds.t".to_string(), "new description".to_string())]
    );
}
