mod support;

use axum::http::{StatusCode, header};
use serde_json::json;
use uuid::Uuid;

use support::{
    Harness, PUBLIC_BASE, RenderBehaviour, ScriptedRenderer, body_bytes, body_json, request, send,
};

#[tokio::test]
async fn detached_submission_is_polled_to_a_downloadable_artifact() {
    let harness = Harness::detached(ScriptedRenderer::new(RenderBehaviour::Pdf));
    let router = harness.router();
    let quote_id = harness.quotes.insert_sample().await;

    let response = send(&router, request("POST", &format!("/quotes/{quote_id}/pdf"), None, None)).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    let job_id: Uuid = body["jobId"].as_str().expect("jobId").parse().expect("uuid");
    assert!(body.get("url").is_none());

    harness.settled(job_id).await;
    let response = send(
        &router,
        request(
            "GET",
            &format!("/quotes/{quote_id}/pdf?jobId={job_id}"),
            None,
            None,
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let key = format!("quotes/{quote_id}.pdf");
    assert_eq!(
        body_json(response).await,
        json!({ "status": "completed", "url": format!("{PUBLIC_BASE}/{key}") })
    );

    let response = send(&router, request("GET", &format!("/artifacts/{key}"), None, None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/pdf"
    );
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
    assert_eq!(&body_bytes(response).await[..], b"%PDF-1");
}

#[tokio::test]
async fn regenerating_a_quote_replaces_its_artifact() {
    let harness = Harness::detached(ScriptedRenderer::new(RenderBehaviour::Pdf));
    let router = harness.router();
    let quote_id = harness.quotes.insert_sample().await;

    for _ in 0..2 {
        let response =
            send(&router, request("POST", &format!("/quotes/{quote_id}/pdf"), None, None)).await;
        let body = body_json(response).await;
        let job_id: Uuid = body["jobId"].as_str().expect("jobId").parse().expect("uuid");
        harness.settled(job_id).await;
    }

    assert_eq!(harness.store.len().await, 1);
    let response = send(
        &router,
        request("GET", &format!("/artifacts/quotes/{quote_id}.pdf"), None, None),
    )
    .await;
    assert_eq!(&body_bytes(response).await[..], b"%PDF-2");
}

#[tokio::test]
async fn status_endpoint_validates_its_inputs() {
    let harness = Harness::detached(ScriptedRenderer::new(RenderBehaviour::Pdf));
    let router = harness.router();
    let quote_id = Uuid::new_v4();

    let missing = send(&router, request("GET", &format!("/quotes/{quote_id}/pdf"), None, None)).await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(missing).await["error"]["code"], "bad_request");

    let invalid = send(
        &router,
        request("GET", &format!("/quotes/{quote_id}/pdf?jobId=nope"), None, None),
    )
    .await;
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

    let bad_quote = send(&router, request("POST", "/quotes/not-a-uuid/pdf", None, None)).await;
    assert_eq!(bad_quote.status(), StatusCode::BAD_REQUEST);
    assert!(harness.jobs.all().await.is_empty());

    let unknown = send(
        &router,
        request(
            "GET",
            &format!("/quotes/{quote_id}/pdf?jobId={}", Uuid::new_v4()),
            None,
            None,
        ),
    )
    .await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(unknown).await, json!({ "status": "not_found" }));
}

#[tokio::test]
async fn missing_artifacts_are_not_found() {
    let harness = Harness::detached(ScriptedRenderer::new(RenderBehaviour::Pdf));
    let router = harness.router();

    let response = send(
        &router,
        request("GET", &format!("/artifacts/quotes/{}.pdf", Uuid::new_v4()), None, None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn job_routes_require_a_session() {
    let harness = Harness::detached(ScriptedRenderer::new(RenderBehaviour::Pdf));
    let router = harness.router();

    let anonymous = send(&router, request("GET", "/pdf-jobs", None, None)).await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(anonymous).await["error"]["code"], "unauthorized");

    let forged = send(
        &router,
        request("GET", "/pdf-jobs", Some("quotepdf_session=sess_forged"), None),
    )
    .await;
    assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn foreign_jobs_are_hidden_from_other_owners() {
    let harness = Harness::detached(ScriptedRenderer::new(RenderBehaviour::Pdf));
    let router = harness.router();
    let alice = harness.cookie_for("alice").await;
    let bob = harness.cookie_for("bob").await;

    let created = send(
        &router,
        request(
            "POST",
            "/pdf-jobs",
            Some(&alice),
            Some(json!({ "quoteId": Uuid::new_v4() })),
        ),
    )
    .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let job = body_json(created).await;
    assert_eq!(job["status"], "pending");
    assert_eq!(job["created_by"], "alice");
    let job_id = job["id"].as_str().expect("id").to_string();

    let patched_by_bob = send(
        &router,
        request(
            "PATCH",
            &format!("/pdf-jobs/{job_id}"),
            Some(&bob),
            Some(json!({ "status": "failed" })),
        ),
    )
    .await;
    assert_eq!(patched_by_bob.status(), StatusCode::NOT_FOUND);

    let read_by_bob = send(&router, request("GET", &format!("/pdf-jobs/{job_id}"), Some(&bob), None)).await;
    assert_eq!(read_by_bob.status(), StatusCode::NOT_FOUND);

    let bob_list = send(&router, request("GET", "/pdf-jobs", Some(&bob), None)).await;
    assert_eq!(body_json(bob_list).await, json!({ "data": [] }));

    let alice_list = send(&router, request("GET", "/pdf-jobs", Some(&alice), None)).await;
    let alice_list = body_json(alice_list).await;
    assert_eq!(alice_list["data"].as_array().expect("data").len(), 1);

    let unchanged = send(&router, request("GET", &format!("/pdf-jobs/{job_id}"), Some(&alice), None)).await;
    assert_eq!(body_json(unchanged).await["status"], "pending");
}

#[tokio::test]
async fn manual_patch_follows_the_state_machine() {
    let harness = Harness::detached(ScriptedRenderer::new(RenderBehaviour::Pdf));
    let router = harness.router();
    let alice = harness.cookie_for("alice").await;

    let created = send(
        &router,
        request(
            "POST",
            "/pdf-jobs",
            Some(&alice),
            Some(json!({ "quoteId": Uuid::new_v4() })),
        ),
    )
    .await;
    let job_id = body_json(created).await["id"]
        .as_str()
        .expect("id")
        .to_string();
    let uri = format!("/pdf-jobs/{job_id}");

    let without_key = send(
        &router,
        request("PATCH", &uri, Some(&alice), Some(json!({ "status": "completed" }))),
    )
    .await;
    assert_eq!(without_key.status(), StatusCode::BAD_REQUEST);

    let completed = send(
        &router,
        request(
            "PATCH",
            &uri,
            Some(&alice),
            Some(json!({ "status": "completed", "s3Key": "quotes/manual.pdf" })),
        ),
    )
    .await;
    assert_eq!(completed.status(), StatusCode::OK);
    let completed = body_json(completed).await;
    assert_eq!(completed["status"], "completed");
    assert_eq!(completed["s3_key"], "quotes/manual.pdf");

    let reopened = send(
        &router,
        request("PATCH", &uri, Some(&alice), Some(json!({ "status": "pending" }))),
    )
    .await;
    assert_eq!(reopened.status(), StatusCode::CONFLICT);

    let bad_id = send(
        &router,
        request("PATCH", "/pdf-jobs/123", Some(&alice), Some(json!({ "status": "failed" }))),
    )
    .await;
    assert_eq!(bad_id.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn creating_a_job_requires_a_quote_id() {
    let harness = Harness::detached(ScriptedRenderer::new(RenderBehaviour::Pdf));
    let router = harness.router();
    let alice = harness.cookie_for("alice").await;

    let response = send(&router, request("POST", "/pdf-jobs", Some(&alice), Some(json!({})))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(harness.jobs.all().await.is_empty());
}

#[tokio::test]
async fn inline_submission_answers_with_the_url() {
    let harness = Harness::inline(ScriptedRenderer::new(RenderBehaviour::Pdf));
    let router = harness.router();
    let quote_id = harness.quotes.insert_sample().await;
    let alice = harness.cookie_for("alice").await;
    let uri = format!("/quotes/{quote_id}/pdf");

    let anonymous = send(&router, request("POST", &uri, None, None)).await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
    assert!(harness.jobs.all().await.is_empty());

    let response = send(&router, request("POST", &uri, Some(&alice), None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(
        body["url"],
        format!("{PUBLIC_BASE}/quotes/{quote_id}.pdf")
    );
    let job_id = body["jobId"].as_str().expect("jobId");

    let status_uri = format!("{uri}?jobId={job_id}");
    let status = send(&router, request("GET", &status_uri, Some(&alice), None)).await;
    assert_eq!(body_json(status).await["status"], "completed");

    let bob = harness.cookie_for("bob").await;
    let foreign = send(&router, request("GET", &status_uri, Some(&bob), None)).await;
    assert_eq!(foreign.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn inline_render_failure_is_a_bad_gateway() {
    let harness = Harness::inline(ScriptedRenderer::new(RenderBehaviour::Status(500)));
    let router = harness.router();
    let quote_id = harness.quotes.insert_sample().await;
    let alice = harness.cookie_for("alice").await;

    let response = send(
        &router,
        request("POST", &format!("/quotes/{quote_id}/pdf"), Some(&alice), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert_eq!(body["status"], "failed");
    assert!(body.get("url").is_none());

    let jobs = harness.jobs.all().await;
    assert_eq!(jobs.len(), 1);
    assert!(jobs[0].artifact_ref.is_none());
}
