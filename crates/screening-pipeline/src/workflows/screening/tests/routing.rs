use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::*;
use crate::workflows::screening::repository::{ExecutionStatus, RunStatus, TriggerType};
use crate::workflows::screening::router::{cron_handler, run_handler};
use crate::workflows::screening::{pipeline_router, PipelineApiState, RunId};

const CRON_SECRET: &str = "nightly-secret";

fn api_state(h: &Harness) -> PipelineApiState {
    PipelineApiState {
        orchestrator: h.orchestrator.clone(),
        cron_secret: Some(CRON_SECRET.to_string()),
    }
}

fn router(h: &Harness) -> Router {
    pipeline_router(api_state(h))
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn trigger_prepares_a_new_run_by_default() {
    let h = harness(vec![candidate("cand-1", "job-1", 100)]);

    let response = router(&h)
        .oneshot(json_request(
            Method::POST,
            "/api/v1/pipeline/trigger",
            json!({ "triggered_by": "recruiter@example.com" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["mode"], json!("prepare"));
    assert_eq!(body["run"]["status"], json!("processing"));
    assert_eq!(body["run"]["stats"]["total_selected"], json!(1));
    assert_eq!(body["run"]["triggered_by"], json!("recruiter@example.com"));
    assert!(h.voice.requests().is_empty());
}

#[tokio::test]
async fn trigger_execute_requires_a_run_id() {
    let h = harness(Vec::new());

    let response = router(&h)
        .oneshot(json_request(
            Method::POST,
            "/api/v1/pipeline/trigger",
            json!({ "mode": "execute" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json_body(response).await;
    assert_eq!(body["error"], json!("run_id required for execute mode"));
}

#[tokio::test]
async fn trigger_execute_calls_a_prepared_run() {
    let h = harness(vec![candidate("cand-1", "job-1", 100)]);
    let run_id = h.orchestrator.create_run(TriggerType::Manual, None).unwrap();
    h.orchestrator.prepare(run_id).await.unwrap();

    let response = router(&h)
        .oneshot(json_request(
            Method::POST,
            "/api/v1/pipeline/trigger",
            json!({ "mode": "execute", "run_id": run_id }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["run"]["status"], json!("completed"));
    assert_eq!(body["run"]["stats"]["total_called"], json!(1));
}

#[tokio::test]
async fn trigger_reports_fetch_failures_as_bad_gateway() {
    let h = harness(Vec::new());
    *h.source.failure.lock().unwrap() = Some("report offline".to_string());

    let response = router(&h)
        .oneshot(json_request(
            Method::POST,
            "/api/v1/pipeline/trigger",
            json!({ "mode": "full" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn cron_rejects_missing_or_wrong_credentials() {
    let h = harness(vec![candidate("cand-1", "job-1", 100)]);

    let response = cron_handler(State(api_state(&h)), HeaderMap::new()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(read_json_body(response).await, json!({ "error": "Unauthorized" }));

    let mut headers = HeaderMap::new();
    headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer wrong"));
    let response = cron_handler(State(api_state(&h)), headers).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let unset = PipelineApiState {
        orchestrator: h.orchestrator.clone(),
        cron_secret: None,
    };
    let mut headers = HeaderMap::new();
    headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
    let response = cron_handler(State(unset), headers).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    assert!(h.orchestrator.list_runs(10).unwrap().is_empty());
}

#[tokio::test]
async fn cron_runs_a_full_scheduled_run() {
    let h = harness(vec![candidate("cand-1", "job-1", 100)]);

    let response = router(&h)
        .oneshot(
            Request::get("/api/cron/daily")
                .header(header::AUTHORIZATION, format!("Bearer {CRON_SECRET}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["status"], json!("completed"));
    assert_eq!(body["stats"]["total_called"], json!(1));

    let runs = h.orchestrator.list_runs(10).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].trigger_type, TriggerType::Scheduled);
    assert_eq!(runs[0].status, RunStatus::Completed);
}

#[tokio::test]
async fn run_lookups_validate_identifiers() {
    let h = harness(Vec::new());

    let response = run_handler(State(api_state(&h)), Path("not-a-uuid".to_string())).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = router(&h)
        .oneshot(get(&format!("/api/v1/pipeline/runs/{}", RunId::new())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn run_candidates_lists_decisions_by_score() {
    let h = harness(vec![
        candidate("low", "job-1", 150),
        candidate("high", "job-2", 20),
    ]);
    let run_id = h.orchestrator.create_run(TriggerType::Manual, None).unwrap();
    h.orchestrator.prepare(run_id).await.unwrap();

    let response = router(&h)
        .oneshot(get(&format!("/api/v1/pipeline/runs/{run_id}/candidates")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    let ids: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["candidate_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["high", "low"]);

    let response = router(&h).oneshot(get("/api/v1/pipeline/runs")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json_body(response).await.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn override_route_applies_and_audits() {
    let h = harness(vec![candidate("cand-1", "job-1", 100)]);
    let run_id = h.orchestrator.create_run(TriggerType::Manual, None).unwrap();
    h.orchestrator.prepare(run_id).await.unwrap();
    let decision = h.runs.decision(run_id, "cand-1");

    let response = router(&h)
        .oneshot(json_request(
            Method::PATCH,
            &format!("/api/v1/pipeline/candidates/{}/override", decision.id),
            json!({ "action": "exclude", "actor": "recruiter", "reason": "asked not to call" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["manually_excluded"], json!(true));
    assert_eq!(body["execution_status"], json!("pending"));

    let response = router(&h).oneshot(get("/api/v1/pipeline/audit")).await.unwrap();
    let audit = read_json_body(response).await;
    assert_eq!(audit[0]["action"], json!("manual_exclude"));
    assert_eq!(audit[0]["actor"], json!("recruiter"));
}

#[tokio::test]
async fn cancel_conflicts_once_a_run_has_finished() {
    let h = harness(vec![candidate("cand-1", "job-1", 100)]);
    let run_id = h.orchestrator.create_run(TriggerType::Manual, None).unwrap();
    h.orchestrator.run_full(run_id).await.unwrap();

    let response = router(&h)
        .oneshot(json_request(
            Method::POST,
            &format!("/api/v1/pipeline/runs/{run_id}/cancel"),
            json!({}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(
        h.runs.decision(run_id, "cand-1").execution_status,
        ExecutionStatus::Completed
    );
}

#[tokio::test]
async fn config_update_is_all_or_nothing() {
    let h = harness(Vec::new());

    let response = router(&h)
        .oneshot(json_request(
            Method::PUT,
            "/api/v1/pipeline/config",
            json!({
                "updated_by": "ops",
                "settings": { "daily_quota": 25, "buffer_hours": "soon" }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(h.orchestrator.current_config().daily_quota, 10_000);

    let response = router(&h)
        .oneshot(json_request(
            Method::PUT,
            "/api/v1/pipeline/config",
            json!({
                "updated_by": "ops",
                "settings": { "daily_quota": 25, "company_limits": { "enabled": true, "max_per_company": 3 } }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["config"]["daily_quota"], json!(25));
    assert_eq!(body["config"]["company_limits"]["max_per_company"], json!(3));
    assert_eq!(body["changes"].as_array().unwrap().len(), 2);

    let response = router(&h).oneshot(get("/api/v1/pipeline/config")).await.unwrap();
    assert_eq!(read_json_body(response).await["daily_quota"], json!(25));
}

#[tokio::test]
async fn config_update_rejects_an_oversized_stage_bonus() {
    let h = harness(Vec::new());

    let response = router(&h)
        .oneshot(json_request(
            Method::PUT,
            "/api/v1/pipeline/config",
            json!({
                "updated_by": "ops",
                "settings": { "screening_stage_bonus": 4_294_967_295u64 }
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json_body(response).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("'screening_stage_bonus' must not exceed 100000"));
    assert_eq!(h.orchestrator.current_config().screening_stage_bonus, 200);
}
