//! Scheduler scenario tests: admission, concurrency, cancellation,
//! failure containment, status aggregation, and lifecycle.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::error::{Error, FetchError};
use crate::fetch::MediaInfo;
use crate::types::{DownloadRequest, Event, Status, TaskId, TaskRecord};

use super::test_helpers::{
    FakeFetcher, create_test_downloader, create_test_downloader_with, test_request,
    wait_for_status, wait_until,
};

// ── Admission control ───────────────────────────────────────────────

#[tokio::test]
async fn fifth_request_is_rejected_when_workers_and_queue_are_full() {
    // 2 workers + queue capacity 2: four requests are admitted, the fifth
    // fails fast with QueueFull.
    let (fetcher, release) = FakeFetcher::blocking();
    let (dl, _temp) = create_test_downloader(Arc::new(fetcher)).await;
    dl.start().await.unwrap();

    let first = dl.add_download(test_request("a")).await.unwrap();
    let second = dl.add_download(test_request("b")).await.unwrap();

    // Both workers must be inside the engine before the queue can fill
    wait_for_status(&dl, &first, Status::Downloading).await;
    wait_for_status(&dl, &second, Status::Downloading).await;

    dl.add_download(test_request("c")).await.unwrap();
    dl.add_download(test_request("d")).await.unwrap();

    let err = dl.add_download(test_request("e")).await.unwrap_err();
    assert!(
        matches!(err, Error::QueueFull { capacity: 2 }),
        "expected QueueFull, got {err:?}"
    );

    // The rejected request left no task behind
    let status = dl.queue_status().await;
    assert_eq!(status.tasks.len(), 4);

    release.send(true).unwrap();
    dl.stop().await.unwrap();
}

#[tokio::test]
async fn rejected_request_leaves_no_record() {
    let (dl, _temp) = create_test_downloader(Arc::new(FakeFetcher::instant())).await;
    dl.start().await.unwrap();

    let err = dl
        .add_download(DownloadRequest::new(""))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { .. }), "got {err:?}");
    assert_eq!(dl.queue_status().await.tasks.len(), 0);

    dl.stop().await.unwrap();
}

// ── Concurrency bound ───────────────────────────────────────────────

#[tokio::test]
async fn active_tasks_never_exceed_the_worker_count() {
    let (fetcher, release) = FakeFetcher::blocking();
    let (dl, _temp) = create_test_downloader_with(Arc::new(fetcher), |config| {
        config.scheduler.max_concurrent_downloads = 2;
        config.scheduler.max_queue_size = 10;
    })
    .await;
    dl.start().await.unwrap();

    let mut ids = Vec::new();
    for i in 0..4 {
        ids.push(dl.add_download(test_request(&format!("t{i}"))).await.unwrap());
    }

    // Two tasks should be held by workers, two waiting
    wait_until("two tasks active", || async {
        dl.queue_status().await.active == 2
    })
    .await;
    assert_eq!(dl.queue_status().await.queued, 2);

    release.send(true).unwrap();

    // Sample the store while the backlog drains; the bound must hold at
    // every observation.
    loop {
        let status = dl.queue_status().await;
        assert!(
            status.active <= 2,
            "observed {} active tasks with 2 workers",
            status.active
        );
        if status.completed == 4 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    dl.stop().await.unwrap();
}

// ── Cancellation ────────────────────────────────────────────────────

#[tokio::test]
async fn cancel_mid_download_marks_cancelled_and_cleans_workspace() {
    let (fetcher, release) = FakeFetcher::blocking();
    let (dl, _temp) = create_test_downloader(Arc::new(fetcher)).await;
    dl.start().await.unwrap();

    let id = dl.add_download(test_request("a")).await.unwrap();
    wait_for_status(&dl, &id, Status::Downloading).await;

    let workspace = dl.workspace_dir(&id);
    assert!(workspace.is_dir(), "workspace must exist while downloading");

    assert!(dl.cancel(&id).await.unwrap());
    wait_until("workspace cleanup", || async { !workspace.exists() }).await;
    assert_eq!(dl.get(&id).await.unwrap().status, Status::Cancelled);

    // Even if the engine finishes after the fact, the cancellation sticks
    release.send(true).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        dl.get(&id).await.unwrap().status,
        Status::Cancelled,
        "a cancelled task must never become completed"
    );

    dl.stop().await.unwrap();
}

#[tokio::test]
async fn cancel_of_terminal_task_returns_false() {
    let (dl, _temp) = create_test_downloader(Arc::new(FakeFetcher::instant())).await;
    dl.start().await.unwrap();

    let id = dl.add_download(test_request("a")).await.unwrap();
    wait_for_status(&dl, &id, Status::Completed).await;

    assert!(!dl.cancel(&id).await.unwrap());
    assert_eq!(dl.get(&id).await.unwrap().status, Status::Completed);

    dl.stop().await.unwrap();
}

#[tokio::test]
async fn cancel_unknown_id_is_not_found() {
    let (dl, _temp) = create_test_downloader(Arc::new(FakeFetcher::instant())).await;
    let err = dl.cancel(&TaskId::from("missing")).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "got {err:?}");
}

#[tokio::test]
async fn cancel_while_queued_skips_the_work_entirely() {
    let (fetcher, release) = FakeFetcher::blocking();
    let (dl, _temp) = create_test_downloader_with(Arc::new(fetcher), |config| {
        config.scheduler.max_concurrent_downloads = 1;
    })
    .await;
    dl.start().await.unwrap();

    let running = dl.add_download(test_request("a")).await.unwrap();
    wait_for_status(&dl, &running, Status::Downloading).await;

    let queued = dl.add_download(test_request("b")).await.unwrap();
    assert!(dl.cancel(&queued).await.unwrap());
    assert_eq!(dl.get(&queued).await.unwrap().status, Status::Cancelled);

    // The worker pops the cancelled item and must not start fetching it
    release.send(true).unwrap();
    wait_for_status(&dl, &running, Status::Completed).await;
    assert_eq!(dl.get(&queued).await.unwrap().status, Status::Cancelled);
    assert!(
        !dl.workspace_dir(&queued).exists(),
        "no workspace should be created for a pre-cancelled task"
    );

    dl.stop().await.unwrap();
}

// ── Failure containment ─────────────────────────────────────────────

#[tokio::test]
async fn failed_fetch_records_error_and_frees_the_worker() {
    let fetcher = FakeFetcher::failing_for(
        "private",
        FetchError::Unavailable("private video".to_string()),
    );
    let (dl, _temp) = create_test_downloader_with(Arc::new(fetcher), |config| {
        config.scheduler.max_concurrent_downloads = 1;
    })
    .await;
    dl.start().await.unwrap();

    let failing = dl
        .add_download(DownloadRequest::new("https://example.com/watch?v=private1"))
        .await
        .unwrap();
    wait_for_status(&dl, &failing, Status::Failed).await;

    let record = dl.get(&failing).await.unwrap();
    assert_eq!(
        record.error.as_deref(),
        Some("media unavailable: private video"),
        "the engine error must be surfaced verbatim"
    );
    assert!(record.file_path.is_none());

    // The same worker must pick up and finish the next task
    let ok = dl.add_download(test_request("fine")).await.unwrap();
    wait_for_status(&dl, &ok, Status::Completed).await;

    dl.stop().await.unwrap();
}

#[tokio::test]
async fn probe_failure_fails_the_task_before_downloading() {
    let fetcher = FakeFetcher::failing_probe(FetchError::Unavailable("video unavailable".into()));
    let (dl, _temp) = create_test_downloader(Arc::new(fetcher)).await;
    dl.start().await.unwrap();

    let id = dl.add_download(test_request("a")).await.unwrap();
    wait_for_status(&dl, &id, Status::Failed).await;

    let record = dl.get(&id).await.unwrap();
    assert_eq!(
        record.error.as_deref(),
        Some("media unavailable: video unavailable")
    );
    assert!(record.title.is_none(), "metadata never resolved");

    dl.stop().await.unwrap();
}

#[tokio::test]
async fn oversized_media_is_rejected_after_probe() {
    let fetcher = FakeFetcher::instant().with_info(MediaInfo {
        title: "Big File".into(),
        size_bytes: Some(2_000_000_000),
        duration_secs: Some(60),
    });
    let (dl, _temp) = create_test_downloader_with(Arc::new(fetcher), |config| {
        config.limits.max_file_size_bytes = Some(1_000_000_000);
    })
    .await;
    dl.start().await.unwrap();

    let id = dl.add_download(test_request("big")).await.unwrap();
    wait_for_status(&dl, &id, Status::Failed).await;

    let record = dl.get(&id).await.unwrap();
    assert!(
        record.error.as_deref().unwrap().contains("file too large"),
        "got error {:?}",
        record.error
    );

    dl.stop().await.unwrap();
}

// ── Progress reporting ──────────────────────────────────────────────

#[tokio::test]
async fn progress_events_are_monotonic_despite_regressing_reports() {
    // The engine reports 10, 50, 30, 70 — the 30 must clamp to 50.
    let fetcher = FakeFetcher::with_progress(vec![
        json!({ "percent": 10.0 }),
        json!({ "percent": 50.0, "speed": 1_048_576.0 }),
        json!({ "percent": 30.0 }),
        json!({ "percent": 70.0, "eta": 30 }),
    ]);
    let (dl, _temp) = create_test_downloader(Arc::new(fetcher)).await;
    let mut events = dl.subscribe();
    dl.start().await.unwrap();

    let id = dl.add_download(test_request("a")).await.unwrap();
    wait_for_status(&dl, &id, Status::Completed).await;

    let mut percents = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let Event::Downloading { percent, .. } = event {
            percents.push(percent);
        }
    }

    assert_eq!(percents, vec![10.0, 50.0, 50.0, 70.0]);
    assert!(
        percents.windows(2).all(|w| w[0] <= w[1]),
        "progress must never decrease: {percents:?}"
    );

    // Completion pins progress at 100
    assert_eq!(dl.get(&id).await.unwrap().progress, 100.0);

    dl.stop().await.unwrap();
}

#[tokio::test]
async fn telemetry_fields_land_on_the_record() {
    let fetcher = FakeFetcher::with_progress(vec![json!({
        "percent": 40.0,
        "speed": 2_097_152.0,
        "eta": 95,
        "downloaded_bytes": 400,
        "total_bytes": 1000
    })]);
    let (dl, _temp) = create_test_downloader(Arc::new(fetcher)).await;
    let mut events = dl.subscribe();
    dl.start().await.unwrap();

    let id = dl.add_download(test_request("a")).await.unwrap();
    wait_for_status(&dl, &id, Status::Completed).await;

    // The progress event carried the normalized telemetry
    let mut saw_update = false;
    while let Ok(event) = events.try_recv() {
        if let Event::Downloading {
            percent,
            speed,
            eta,
            ..
        } = event
        {
            saw_update = true;
            assert_eq!(percent, 40.0);
            assert_eq!(speed.as_deref(), Some("2.00 MiB/s"));
            assert_eq!(eta.as_deref(), Some("01:35"));
        }
    }
    assert!(saw_update, "expected at least one Downloading event");

    dl.stop().await.unwrap();
}

// ── Completion and artifacts ────────────────────────────────────────

#[tokio::test]
async fn completed_task_has_artifact_in_download_dir_and_no_workspace() {
    let (dl, _temp) = create_test_downloader(Arc::new(FakeFetcher::instant())).await;
    dl.start().await.unwrap();

    let id = dl.add_download(test_request("a")).await.unwrap();
    wait_for_status(&dl, &id, Status::Completed).await;

    let record = dl.get(&id).await.unwrap();
    let path = record.file_path.expect("completed task must have file_path");
    assert!(path.is_file(), "artifact must exist at {}", path.display());
    assert!(
        path.starts_with(&dl.get_config().download_dir),
        "artifact must live in the download directory"
    );
    assert_eq!(record.title.as_deref(), Some("Test Media"));

    wait_until("workspace removal", || async {
        !dl.workspace_dir(&id).exists()
    })
    .await;

    dl.stop().await.unwrap();
}

#[tokio::test]
async fn remove_cascades_to_artifact_and_workspace() {
    let (dl, _temp) = create_test_downloader(Arc::new(FakeFetcher::instant())).await;
    dl.start().await.unwrap();

    let id = dl.add_download(test_request("a")).await.unwrap();
    wait_for_status(&dl, &id, Status::Completed).await;
    let path = dl.get(&id).await.unwrap().file_path.unwrap();
    assert!(path.is_file());

    dl.remove(&id).await.unwrap();
    assert!(!path.exists(), "remove must delete the artifact");
    assert!(matches!(dl.get(&id).await, Err(Error::NotFound(_))));

    // Removing again is NotFound, not a crash
    assert!(matches!(dl.remove(&id).await, Err(Error::NotFound(_))));

    dl.stop().await.unwrap();
}

// ── Status aggregation ──────────────────────────────────────────────

/// Seed the store directly with one record per status.
async fn seed_statuses(dl: &super::MediaDownloader, statuses: &[Status]) -> Vec<TaskId> {
    let mut ids = Vec::new();
    for status in statuses {
        let mut record = TaskRecord::new(TaskId::generate(), test_request("seed"));
        record.status = *status;
        ids.push(record.id.clone());
        dl.store.insert(record).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    ids
}

#[tokio::test]
async fn queue_status_classifies_one_of_each() {
    let (dl, _temp) = create_test_downloader(Arc::new(FakeFetcher::instant())).await;
    seed_statuses(
        &dl,
        &[
            Status::Completed,
            Status::Failed,
            Status::Queued,
            Status::Downloading,
        ],
    )
    .await;

    let status = dl.queue_status().await;
    assert_eq!(status.active, 1);
    assert_eq!(status.queued, 1);
    assert_eq!(status.completed, 1);
    assert_eq!(status.failed, 1);
    assert_eq!(status.tasks.len(), 4);
}

#[tokio::test]
async fn queue_status_counts_cancelled_as_failed() {
    let (dl, _temp) = create_test_downloader(Arc::new(FakeFetcher::instant())).await;
    seed_statuses(&dl, &[Status::Cancelled, Status::FetchingInfo]).await;

    let status = dl.queue_status().await;
    assert_eq!(status.failed, 1);
    assert_eq!(status.active, 1);
}

#[tokio::test]
async fn queue_status_lists_tasks_oldest_first() {
    let (dl, _temp) = create_test_downloader(Arc::new(FakeFetcher::instant())).await;
    let ids = seed_statuses(&dl, &[Status::Queued, Status::Queued, Status::Queued]).await;

    let listed: Vec<TaskId> = dl
        .queue_status()
        .await
        .tasks
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(listed, ids);
}

#[tokio::test]
async fn clear_completed_removes_exactly_the_terminal_tasks() {
    let (dl, _temp) = create_test_downloader(Arc::new(FakeFetcher::instant())).await;
    let ids = seed_statuses(
        &dl,
        &[
            Status::Completed,
            Status::Failed,
            Status::Queued,
            Status::Downloading,
        ],
    )
    .await;

    assert_eq!(dl.clear_completed().await, 2);

    let status = dl.queue_status().await;
    assert_eq!(status.tasks.len(), 2);
    assert_eq!(status.queued, 1);
    assert_eq!(status.active, 1);

    // The completed and failed records are gone, the live ones remain
    assert!(matches!(dl.get(&ids[0]).await, Err(Error::NotFound(_))));
    assert!(matches!(dl.get(&ids[1]).await, Err(Error::NotFound(_))));
    assert!(dl.get(&ids[2]).await.is_ok());
    assert!(dl.get(&ids[3]).await.is_ok());

    // Nothing terminal left — a second clear is a no-op
    assert_eq!(dl.clear_completed().await, 0);
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn start_twice_without_stop_is_an_error() {
    let (dl, _temp) = create_test_downloader(Arc::new(FakeFetcher::instant())).await;
    dl.start().await.unwrap();
    assert!(matches!(dl.start().await, Err(Error::AlreadyRunning)));
    dl.stop().await.unwrap();
}

#[tokio::test]
async fn stop_without_start_is_an_error() {
    let (dl, _temp) = create_test_downloader(Arc::new(FakeFetcher::instant())).await;
    assert!(matches!(dl.stop().await, Err(Error::NotRunning)));
}

#[tokio::test]
async fn add_download_before_start_is_rejected() {
    let (dl, _temp) = create_test_downloader(Arc::new(FakeFetcher::instant())).await;
    assert!(matches!(
        dl.add_download(test_request("a")).await,
        Err(Error::NotRunning)
    ));
}

#[tokio::test]
async fn add_download_after_stop_is_rejected() {
    let (dl, _temp) = create_test_downloader(Arc::new(FakeFetcher::instant())).await;
    dl.start().await.unwrap();
    dl.stop().await.unwrap();
    assert!(matches!(
        dl.add_download(test_request("a")).await,
        Err(Error::ShuttingDown)
    ));
}

#[tokio::test]
async fn scheduler_can_be_restarted_after_stop() {
    let (dl, _temp) = create_test_downloader(Arc::new(FakeFetcher::instant())).await;
    dl.start().await.unwrap();
    dl.stop().await.unwrap();

    dl.start().await.unwrap();
    let id = dl.add_download(test_request("again")).await.unwrap();
    wait_for_status(&dl, &id, Status::Completed).await;
    dl.stop().await.unwrap();
}

#[tokio::test]
async fn stop_cancels_in_flight_and_drains_queued_tasks() {
    let (fetcher, _release) = FakeFetcher::blocking();
    let (dl, _temp) = create_test_downloader_with(Arc::new(fetcher), |config| {
        config.scheduler.max_concurrent_downloads = 1;
        config.scheduler.max_queue_size = 5;
    })
    .await;
    dl.start().await.unwrap();

    let in_flight = dl.add_download(test_request("a")).await.unwrap();
    wait_for_status(&dl, &in_flight, Status::Downloading).await;
    let queued_1 = dl.add_download(test_request("b")).await.unwrap();
    let queued_2 = dl.add_download(test_request("c")).await.unwrap();

    dl.stop().await.unwrap();

    for id in [&in_flight, &queued_1, &queued_2] {
        assert_eq!(
            dl.get(id).await.unwrap().status,
            Status::Cancelled,
            "task {id} should be cancelled by shutdown"
        );
    }
}

// ── Events ──────────────────────────────────────────────────────────

#[tokio::test]
async fn lifecycle_events_arrive_in_order() {
    let (dl, _temp) = create_test_downloader(Arc::new(FakeFetcher::instant())).await;
    let mut events = dl.subscribe();
    dl.start().await.unwrap();

    let id = dl.add_download(test_request("a")).await.unwrap();
    wait_for_status(&dl, &id, Status::Completed).await;

    // Collect events until Completed arrives (the store flips before the
    // event lands in the channel, so a plain drain could miss it)
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("timed out waiting for Completed event")
            .unwrap();
        let done = matches!(event, Event::Completed { .. });
        seen.push(event);
        if done {
            break;
        }
    }

    assert!(
        matches!(&seen[0], Event::Queued { id: event_id } if *event_id == id),
        "first event should be Queued, got {:?}",
        seen.first()
    );
    assert!(
        seen.iter().any(|e| matches!(
            e,
            Event::MetadataResolved { title, .. } if title == "Test Media"
        )),
        "expected a MetadataResolved event"
    );
    assert!(
        matches!(seen.last(), Some(Event::Completed { .. })),
        "last event should be Completed, got {:?}",
        seen.last()
    );

    dl.stop().await.unwrap();
}
