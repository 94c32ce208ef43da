mod support;

use std::{sync::Arc, sync::atomic::Ordering, time::Duration};

use httpmock::MockServer;
use quotepdf::application::{
    artifacts::{ArtifactPublisher, ArtifactRefStyle},
    jobs::{JobPatch, JobProcessor, PdfJobError, PdfPipeline, ProcessOutcome, SubmitOutcome},
    payload::PayloadBuilder,
    repos::{NewPdfJob, PdfJobsRepo},
    sessions::Principal,
};
use quotepdf::domain::types::{PdfJobStatus, PdfJobVariant};
use quotepdf::infra::storage::HttpObjectStore;
use quotepdf_api_types::QuotePdfStatus;
use tokio::sync::Semaphore;
use url::Url;
use uuid::Uuid;

use support::{Harness, PUBLIC_BASE, RenderBehaviour, ScriptedRenderer};

fn principal(user: &str) -> Principal {
    Principal {
        session_id: Uuid::new_v4(),
        user: user.to_string(),
    }
}

async fn submit_detached(harness: &Harness, quote_id: Uuid) -> Uuid {
    match harness.service.submit(quote_id, None).await.expect("submit") {
        SubmitOutcome::Accepted { job_id } => job_id,
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn rendered_bytes_are_published_and_reported() {
    let harness = Harness::detached(ScriptedRenderer::new(RenderBehaviour::Pdf));
    let quote_id = harness.quotes.insert_sample().await;

    let job_id = submit_detached(&harness, quote_id).await;
    let job = harness.settled(job_id).await;

    let key = format!("quotes/{quote_id}.pdf");
    assert_eq!(job.status, PdfJobStatus::Completed);
    assert_eq!(job.artifact_ref.as_deref(), Some(key.as_str()));
    assert_eq!(
        harness.store.object(&key).await.as_deref(),
        Some(&b"%PDF-1"[..])
    );

    let status = harness
        .service
        .get_status(quote_id, Some(job_id), None)
        .await
        .expect("status");
    assert_eq!(status.status, QuotePdfStatus::Completed);
    assert_eq!(status.url, Some(format!("{PUBLIC_BASE}/{key}")));

    let payloads = harness.renderer.payloads.lock().await;
    assert_eq!(payloads[0].template, "budget-premium");
    assert_eq!(payloads[0].title, "Orçamento ORC-0042");
}

#[tokio::test]
async fn render_rejection_fails_the_job_without_artifact() {
    let harness = Harness::detached(ScriptedRenderer::new(RenderBehaviour::Status(500)));
    let quote_id = harness.quotes.insert_sample().await;

    let job_id = submit_detached(&harness, quote_id).await;
    let job = harness.settled(job_id).await;

    assert_eq!(job.status, PdfJobStatus::Failed);
    assert!(job.artifact_ref.is_none());
    assert_eq!(harness.store.len().await, 0);

    let status = harness
        .service
        .get_status(quote_id, Some(job_id), None)
        .await
        .expect("status");
    assert_eq!(status.status, QuotePdfStatus::Failed);
    assert!(status.url.is_none());
}

#[tokio::test]
async fn unknown_quote_fails_before_rendering() {
    let harness = Harness::detached(ScriptedRenderer::new(RenderBehaviour::Pdf));

    let job_id = submit_detached(&harness, Uuid::new_v4()).await;
    let job = harness.settled(job_id).await;

    assert_eq!(job.status, PdfJobStatus::Failed);
    assert_eq!(harness.renderer.calls(), 0);
}

#[tokio::test]
async fn unknown_job_reports_not_found() {
    let harness = Harness::detached(ScriptedRenderer::new(RenderBehaviour::Pdf));
    let quote_id = harness.quotes.insert_sample().await;

    let status = harness
        .service
        .get_status(quote_id, Some(Uuid::new_v4()), None)
        .await
        .expect("status");
    assert_eq!(status.status, QuotePdfStatus::NotFound);
    assert!(status.url.is_none());

    let job_id = submit_detached(&harness, quote_id).await;
    harness.settled(job_id).await;
    let other_quote = harness
        .service
        .get_status(Uuid::new_v4(), Some(job_id), None)
        .await
        .expect("status");
    assert_eq!(other_quote.status, QuotePdfStatus::NotFound);
}

#[tokio::test]
async fn every_failing_stage_settles_as_failed() {
    enum Fault {
        MissingQuote,
        Render(RenderBehaviour),
        Publish,
        RecordCompletion,
    }

    let faults = [
        Fault::MissingQuote,
        Fault::Render(RenderBehaviour::Status(503)),
        Fault::Render(RenderBehaviour::Empty),
        Fault::Render(RenderBehaviour::Panic),
        Fault::Publish,
        Fault::RecordCompletion,
    ];

    for fault in faults {
        let behaviour = match &fault {
            Fault::Render(behaviour) => behaviour.clone(),
            _ => RenderBehaviour::Pdf,
        };
        let harness = Harness::detached(ScriptedRenderer::new(behaviour));
        let quote_id = match fault {
            Fault::MissingQuote => Uuid::new_v4(),
            _ => harness.quotes.insert_sample().await,
        };
        match fault {
            Fault::Publish => harness.store.fail_put.store(true, Ordering::SeqCst),
            Fault::RecordCompletion => harness.jobs.fail_completion.store(true, Ordering::SeqCst),
            _ => {}
        }

        let job_id = submit_detached(&harness, quote_id).await;
        let job = harness.settled(job_id).await;
        assert_eq!(job.status, PdfJobStatus::Failed);
        assert!(job.artifact_ref.is_none());
        assert!(job.check_artifact_invariant().is_ok());
    }
}

#[tokio::test]
async fn stalled_object_store_fails_the_job_at_publish() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method("DELETE");
        then.status(404);
    });
    server.mock(|when, then| {
        when.method("PUT");
        then.status(200).delay(Duration::from_secs(10));
    });
    let store = HttpObjectStore::new(
        Url::parse(&server.url("/bucket")).expect("url"),
        None,
        Duration::from_millis(150),
    )
    .expect("store");

    let harness = Harness::detached(ScriptedRenderer::new(RenderBehaviour::Pdf));
    let quote_id = harness.quotes.insert_sample().await;
    let pipeline = Arc::new(PdfPipeline::new(
        PayloadBuilder::new(harness.quotes.clone()),
        harness.renderer.clone(),
        ArtifactPublisher::new(Arc::new(store), PUBLIC_BASE, ArtifactRefStyle::StorageKey),
    ));
    let processor = JobProcessor::new(harness.jobs.clone(), pipeline);
    let job = harness
        .jobs
        .create_job(NewPdfJob::pending(quote_id, None))
        .await
        .expect("create job");

    let outcome = tokio::time::timeout(Duration::from_secs(3), processor.run(job.id, quote_id))
        .await
        .expect("processing finishes despite the stalled upload");
    assert!(matches!(outcome, ProcessOutcome::Failed { stage: "publish" }));

    let job = harness.jobs.get(job.id).await.expect("job");
    assert_eq!(job.status, PdfJobStatus::Failed);
    assert!(job.artifact_ref.is_none());
}

#[tokio::test]
async fn failed_cleanup_still_completes() {
    let harness = Harness::detached(ScriptedRenderer::new(RenderBehaviour::Pdf));
    harness.store.fail_delete.store(true, Ordering::SeqCst);
    let quote_id = harness.quotes.insert_sample().await;

    let job_id = submit_detached(&harness, quote_id).await;
    assert_eq!(harness.settled(job_id).await.status, PdfJobStatus::Completed);
}

#[tokio::test]
async fn hosted_documents_are_referenced_directly() {
    let url = "https://render.test/files/abc.pdf";
    let harness = Harness::detached(ScriptedRenderer::new(RenderBehaviour::Hosted(url.into())));
    let quote_id = harness.quotes.insert_sample().await;

    let job_id = submit_detached(&harness, quote_id).await;
    let job = harness.settled(job_id).await;

    assert_eq!(job.artifact_ref.as_deref(), Some(url));
    assert_eq!(harness.store.len().await, 0);
    let status = harness
        .service
        .get_status(quote_id, Some(job_id), None)
        .await
        .expect("status");
    assert_eq!(status.url.as_deref(), Some(url));
}

#[tokio::test]
async fn status_reads_are_repeatable() {
    let harness = Harness::detached(ScriptedRenderer::new(RenderBehaviour::Pdf));
    let quote_id = harness.quotes.insert_sample().await;
    let job_id = submit_detached(&harness, quote_id).await;
    harness.settled(job_id).await;

    let first = harness
        .service
        .get_status(quote_id, Some(job_id), None)
        .await
        .expect("status");
    let second = harness
        .service
        .get_status(quote_id, Some(job_id), None)
        .await
        .expect("status");
    assert_eq!(first, second);
}

#[tokio::test]
async fn terminal_jobs_do_not_move() {
    let harness = Harness::detached(ScriptedRenderer::new(RenderBehaviour::Pdf));
    let quote_id = harness.quotes.insert_sample().await;
    let job_id = submit_detached(&harness, quote_id).await;
    let completed = harness.settled(job_id).await;

    let outcome = harness.processor.reject(job_id, quote_id, "test").await;
    assert!(matches!(outcome, ProcessOutcome::Superseded));

    let outcome = harness.processor.run(job_id, quote_id).await;
    assert!(matches!(outcome, ProcessOutcome::Superseded));
    assert_eq!(harness.jobs.get(job_id).await, Some(completed));
}

#[tokio::test]
async fn worker_pool_caps_concurrent_renders() {
    let gate = Arc::new(Semaphore::new(0));
    let harness = Harness::build(
        PdfJobVariant::DetachedAnonymous,
        ScriptedRenderer::gated(RenderBehaviour::Pdf, gate.clone()),
        Some((2, 16)),
    );
    let quote_id = harness.quotes.insert_sample().await;

    let mut job_ids = Vec::new();
    for _ in 0..5 {
        job_ids.push(submit_detached(&harness, quote_id).await);
    }
    while harness.renderer.running() < 2 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(harness.renderer.running(), 2);

    gate.add_permits(5);
    for job_id in job_ids {
        assert_eq!(harness.settled(job_id).await.status, PdfJobStatus::Completed);
    }
    assert_eq!(harness.renderer.peak(), 2);
}

#[tokio::test]
async fn saturated_queue_fails_new_jobs_immediately() {
    let gate = Arc::new(Semaphore::new(0));
    let harness = Harness::build(
        PdfJobVariant::DetachedAnonymous,
        ScriptedRenderer::gated(RenderBehaviour::Pdf, gate.clone()),
        Some((1, 1)),
    );
    let quote_id = harness.quotes.insert_sample().await;

    let mut job_ids = vec![submit_detached(&harness, quote_id).await];
    while harness.renderer.running() < 1 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    for _ in 0..5 {
        job_ids.push(submit_detached(&harness, quote_id).await);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let mut rejected = 0;
    for job_id in &job_ids {
        if harness.jobs.get(*job_id).await.expect("job").status == PdfJobStatus::Failed {
            rejected += 1;
        }
    }
    assert!(rejected >= 3, "only {rejected} jobs were rejected");

    gate.add_permits(job_ids.len());
    for job_id in job_ids {
        assert!(harness.settled(job_id).await.status.is_terminal());
    }
}

#[tokio::test]
async fn shutdown_drains_accepted_jobs() {
    let gate = Arc::new(Semaphore::new(0));
    let mut harness = Harness::build(
        PdfJobVariant::DetachedAnonymous,
        ScriptedRenderer::gated(RenderBehaviour::Pdf, gate.clone()),
        Some((2, 8)),
    );
    let quote_id = harness.quotes.insert_sample().await;
    let first = submit_detached(&harness, quote_id).await;
    let second = submit_detached(&harness, quote_id).await;

    let release = {
        let gate = gate.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            gate.add_permits(2);
        })
    };
    let pool = harness.pool.take().expect("pool");
    pool.shutdown(Duration::from_secs(2)).await;
    release.await.expect("release task");

    for job_id in [first, second] {
        let job = harness.jobs.get(job_id).await.expect("job");
        assert_eq!(job.status, PdfJobStatus::Completed);
    }

    let late = submit_detached(&harness, quote_id).await;
    assert_eq!(harness.settled(late).await.status, PdfJobStatus::Failed);
}

#[tokio::test]
async fn shutdown_after_grace_fails_unfinished_jobs() {
    let gate = Arc::new(Semaphore::new(0));
    let mut harness = Harness::build(
        PdfJobVariant::DetachedAnonymous,
        ScriptedRenderer::gated(RenderBehaviour::Pdf, gate.clone()),
        Some((1, 8)),
    );
    let quote_id = harness.quotes.insert_sample().await;
    let mut job_ids = Vec::new();
    for _ in 0..3 {
        job_ids.push(submit_detached(&harness, quote_id).await);
    }

    let started = tokio::time::Instant::now();
    while harness.renderer.running() == 0 {
        assert!(started.elapsed() < Duration::from_secs(2), "no job started");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let pool = harness.pool.take().expect("pool");
    pool.shutdown(Duration::from_millis(50)).await;

    for job_id in &job_ids {
        let job = harness.jobs.get(*job_id).await.expect("job");
        assert_eq!(job.status, PdfJobStatus::Failed, "job {job_id}");
        assert!(job.artifact_ref.is_none());
    }

    // The cancelled render must not publish or complete anything afterwards.
    gate.add_permits(8);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.renderer.calls(), 1);
    assert_eq!(harness.store.len().await, 0);
    for job_id in &job_ids {
        let job = harness.jobs.get(*job_id).await.expect("job");
        assert_eq!(job.status, PdfJobStatus::Failed);
    }
}

#[tokio::test]
async fn startup_sweep_fails_abandoned_pending_jobs() {
    let harness = Harness::detached(ScriptedRenderer::new(RenderBehaviour::Pdf));
    let abandoned = harness
        .jobs
        .create_job(NewPdfJob::pending(Uuid::new_v4(), None))
        .await
        .expect("abandoned job");
    let recent = harness
        .jobs
        .create_job(NewPdfJob::pending(Uuid::new_v4(), None))
        .await
        .expect("recent job");
    harness
        .jobs
        .backdate(abandoned.id, time::Duration::hours(1))
        .await;

    let failed = harness
        .processor
        .fail_stale(Duration::from_secs(15 * 60))
        .await
        .expect("sweep");
    assert_eq!(failed, 1);

    let abandoned = harness.jobs.get(abandoned.id).await.expect("abandoned");
    assert_eq!(abandoned.status, PdfJobStatus::Failed);
    assert!(abandoned.check_artifact_invariant().is_ok());
    let recent = harness.jobs.get(recent.id).await.expect("recent");
    assert_eq!(recent.status, PdfJobStatus::Pending);
}

#[tokio::test]
async fn inline_submission_requires_an_owner() {
    let harness = Harness::inline(ScriptedRenderer::new(RenderBehaviour::Pdf));
    let quote_id = harness.quotes.insert_sample().await;

    let err = harness
        .service
        .submit(quote_id, None)
        .await
        .expect_err("anonymous inline submit");
    assert!(matches!(err, PdfJobError::Unauthorized));
    assert!(harness.jobs.all().await.is_empty());
}

#[tokio::test]
async fn inline_submission_returns_the_artifact_url() {
    let harness = Harness::inline(ScriptedRenderer::new(RenderBehaviour::Pdf));
    let quote_id = harness.quotes.insert_sample().await;
    let alice = principal("alice");

    let outcome = harness
        .service
        .submit(quote_id, Some(&alice))
        .await
        .expect("submit");
    let expected_url = format!("{PUBLIC_BASE}/quotes/{quote_id}.pdf");
    let SubmitOutcome::Completed { job_id, url } = outcome else {
        panic!("unexpected outcome {outcome:?}");
    };
    assert_eq!(url, expected_url);

    let job = harness.jobs.get(job_id).await.expect("job");
    assert_eq!(job.status, PdfJobStatus::Completed);
    assert_eq!(job.artifact_ref.as_deref(), Some(expected_url.as_str()));
    assert_eq!(job.created_by.as_deref(), Some("alice"));

    let foreign = harness
        .service
        .get_status(quote_id, Some(job_id), Some(&principal("bob")))
        .await
        .expect("status");
    assert_eq!(foreign.status, QuotePdfStatus::NotFound);
}

#[tokio::test]
async fn inline_failure_is_reported_and_recorded() {
    let harness = Harness::inline(ScriptedRenderer::new(RenderBehaviour::Panic));
    let quote_id = harness.quotes.insert_sample().await;

    let outcome = harness
        .service
        .submit(quote_id, Some(&principal("alice")))
        .await
        .expect("submit");
    let SubmitOutcome::Failed { job_id } = outcome else {
        panic!("unexpected outcome {outcome:?}");
    };
    assert_eq!(
        harness.jobs.get(job_id).await.expect("job").status,
        PdfJobStatus::Failed
    );
}

#[tokio::test]
async fn manual_updates_respect_the_state_machine() {
    let harness = Harness::inline(ScriptedRenderer::new(RenderBehaviour::Pdf));
    let alice = principal("alice");
    let job = harness
        .service
        .create_job(&alice, Uuid::new_v4(), None)
        .await
        .expect("create");

    let err = harness
        .service
        .update_status(
            job.id,
            &alice,
            JobPatch {
                status: Some(PdfJobStatus::Completed),
                artifact_ref: None,
            },
        )
        .await
        .expect_err("completion without artifact");
    assert!(matches!(err, PdfJobError::Validation(_)));

    let err = harness
        .service
        .update_status(
            job.id,
            &principal("bob"),
            JobPatch {
                status: Some(PdfJobStatus::Failed),
                artifact_ref: None,
            },
        )
        .await
        .expect_err("foreign job");
    assert!(matches!(err, PdfJobError::NotFound));

    let failed = harness
        .service
        .update_status(
            job.id,
            &alice,
            JobPatch {
                status: Some(PdfJobStatus::Failed),
                artifact_ref: None,
            },
        )
        .await
        .expect("fail job");
    assert_eq!(failed.status, PdfJobStatus::Failed);

    let err = harness
        .service
        .update_status(
            job.id,
            &alice,
            JobPatch {
                status: Some(PdfJobStatus::Pending),
                artifact_ref: None,
            },
        )
        .await
        .expect_err("leave terminal state");
    assert!(matches!(err, PdfJobError::Conflict(_)));
}
