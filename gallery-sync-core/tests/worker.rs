use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gallery_sync_core::config::MigrationConfig;
use gallery_sync_core::contract::{
    Folder, MockDestinationSite, MockSourceSite, NewSubmission, Rating, Submission,
    SubmissionRef, SubmissionScope,
};
use gallery_sync_core::progress::{MigrationEvent, MigrationState, ProgressReporter};
use gallery_sync_core::tables::ContentType;
use gallery_sync_core::worker::{upload_order, MigrationOutcome, Worker};
use gallery_sync_core::SyncError;
use tokio_util::sync::CancellationToken;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn sub(id: i64, title: &str, kind: &str) -> Submission {
    Submission {
        id,
        title: title.to_string(),
        kind: kind.to_string(),
        rating: Rating::General,
        category: None,
        description: format!("{title} description"),
        tags: vec!["migrated".into()],
        thumbnail_locator: None,
        media_locator: format!("https://static.example/media/{id}.bin?v=1"),
    }
}

/// Source: Art(1) holding 2 and 7, child Sketches(2) holding 5, Writing(3) holding 9.
fn source_folders() -> Vec<Folder> {
    vec![
        Folder::new(1, "Art")
            .with_submissions(vec![2, 7])
            .with_children(vec![Folder::new(2, "Sketches").with_submissions(vec![5])]),
        Folder::new(3, "Writing").with_submissions(vec![9]),
    ]
}

fn gallery() -> Vec<Submission> {
    let mut portrait = sub(2, "Portrait", "image");
    portrait.thumbnail_locator = Some("https://static.example/thumb/2.png".into());
    portrait.rating = Rating::Mature;
    let mut doodle = sub(5, "Doodle", "image");
    doodle.category = Some("Knitting Patterns".into());
    vec![portrait, doodle, sub(7, "Old piece", "image")]
}

fn scraps() -> Vec<Submission> {
    let mut essay = sub(9, "Essay", "text");
    essay.category = Some("Story".into());
    essay.thumbnail_locator = Some("https://static.example/thumb/9.png".into());
    vec![essay]
}

fn source_mock() -> MockSourceSite {
    let mut source = MockSourceSite::new();
    source
        .expect_list_folders()
        .returning(|| Ok(source_folders()));
    source
        .expect_list_submissions()
        .returning(|scope| match scope {
            SubmissionScope::Gallery => Ok(gallery()),
            SubmissionScope::Scraps => Ok(scraps()),
        });
    source
        .expect_fetch_blob()
        .returning(|locator| Ok(locator.as_bytes().to_vec()));
    source
}

#[derive(Default)]
struct DestinationLog {
    folders: Mutex<Vec<Folder>>,
    created: Mutex<Vec<(String, Option<i64>)>>,
    uploads: Mutex<Vec<NewSubmission>>,
}

/// Destination: Art(100) with child Sketches(110); "Old piece" already uploaded.
/// Created folders get ids from 300 up and show up in later listings.
fn destination_mock(fail_upload_of: Option<&'static str>) -> (MockDestinationSite, Arc<DestinationLog>) {
    let log = Arc::new(DestinationLog::default());
    *log.folders.lock().unwrap() =
        vec![Folder::new(100, "Art").with_children(vec![Folder::new(110, "Sketches")])];

    let mut destination = MockDestinationSite::new();
    let l = log.clone();
    destination
        .expect_list_folders()
        .returning(move || Ok(l.folders.lock().unwrap().clone()));
    destination
        .expect_list_submissions()
        .returning(|| Ok(vec![sub(700, "Old piece", "image")]));
    let l = log.clone();
    destination
        .expect_create_folder()
        .returning(move |title, parent| {
            let mut created = l.created.lock().unwrap();
            let folder = Folder::new(300 + created.len() as i64, title);
            created.push((title.to_string(), parent));
            l.folders.lock().unwrap().push(folder.clone());
            Ok(folder)
        });
    let l = log.clone();
    destination
        .expect_create_submission()
        .returning(move |request| {
            if Some(request.title.as_str()) == fail_upload_of {
                return Err(SyncError::Adapter("upload rejected".into()));
            }
            let mut uploads = l.uploads.lock().unwrap();
            let id = 1000 + uploads.len() as i64;
            uploads.push(request);
            Ok(SubmissionRef {
                id: Some(id),
                url: Some(format!("https://dest.example/submission/{id}")),
            })
        });
    (destination, log)
}

/// Keeps every event; optionally cancels the run after the first upload.
#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<MigrationEvent>>,
    cancel_after_upload: Option<CancellationToken>,
}

impl ProgressReporter for Recorder {
    fn report(&self, event: MigrationEvent) {
        if let (MigrationEvent::SubmissionUploaded { .. }, Some(token)) =
            (&event, &self.cancel_after_upload)
        {
            token.cancel();
        }
        self.events.lock().unwrap().push(event);
    }
}

impl Recorder {
    fn states(&self) -> Vec<MigrationState> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                MigrationEvent::StateChanged(s) => Some(*s),
                _ => None,
            })
            .collect()
    }
}

fn config(interval_minutes: u64) -> MigrationConfig {
    MigrationConfig {
        interval_minutes,
        ..MigrationConfig::default()
    }
}

type TestWorker = Worker<MockSourceSite, MockDestinationSite>;

async fn loaded_worker(
    interval_minutes: u64,
    fail_upload_of: Option<&'static str>,
    reporter: Arc<Recorder>,
) -> (TestWorker, Arc<DestinationLog>) {
    init_tracing();
    let (destination, log) = destination_mock(fail_upload_of);
    let worker = Worker::new(
        Arc::new(source_mock()),
        Arc::new(destination),
        config(interval_minutes),
        reporter,
    );
    worker.load().await.expect("load should succeed");
    worker.reconcile().await.expect("reconcile should succeed");
    (worker, log)
}

#[test]
fn test_upload_order_is_ascending_source_id() {
    let submissions = vec![sub(5, "e", "image"), sub(2, "b", "image"), sub(9, "i", "text")];
    assert_eq!(upload_order(&submissions, &HashSet::new()), vec![2, 5, 9]);
    assert_eq!(upload_order(&submissions, &[5].into_iter().collect()), vec![2, 9]);
}

#[tokio::test]
async fn test_reconcile_builds_plan() {
    let (worker, _) = loaded_worker(0, None, Arc::new(Recorder::default())).await;
    let plan = worker.session().plan().await.expect("plan stored in session");

    let folder_pairs: Vec<(i64, i64)> = plan
        .folder_mapping
        .iter()
        .map(|m| (m.source.id, m.destination.id))
        .collect();
    assert_eq!(folder_pairs, vec![(1, 100), (2, 110)]);
    assert_eq!(plan.unmapped_folders.iter().map(|f| f.id).collect::<Vec<_>>(), vec![3]);

    assert_eq!(plan.submission_mapping.len(), 1);
    assert_eq!(plan.submission_mapping[0].source.id, 7);
    assert_eq!(
        plan.unmapped_submissions.iter().map(|s| s.id).collect::<Vec<_>>(),
        vec![2, 5, 9]
    );
    assert_eq!(plan.folder_for(2), 100);
    assert_eq!(plan.folder_for(5), 110);
    assert_eq!(plan.folder_for(9), 0, "Writing has no counterpart yet");
}

#[tokio::test]
async fn test_run_creates_folders_then_uploads_in_order() {
    let recorder = Arc::new(Recorder::default());
    let (worker, log) = loaded_worker(0, None, recorder.clone()).await;

    let report = worker
        .run(CancellationToken::new())
        .await
        .expect("run should succeed");

    assert_eq!(report.outcome, MigrationOutcome::Completed);
    assert_eq!(
        *log.created.lock().unwrap(),
        vec![("Writing".to_string(), None)]
    );
    assert_eq!(report.created_folders.len(), 1);
    assert_eq!(report.created_folders[0].destination.id, 300);

    let placed: Vec<(i64, i64)> = report
        .uploaded
        .iter()
        .map(|u| (u.source_id, u.folder_id))
        .collect();
    assert_eq!(placed, vec![(2, 100), (5, 110), (9, 300)]);
    assert_eq!(report.uploaded[0].reference.id, Some(1000));

    let uploads = log.uploads.lock().unwrap();
    assert_eq!(uploads.len(), 3);

    let portrait = &uploads[0];
    assert_eq!(portrait.file_name, "2.bin");
    assert_eq!(portrait.content_type, ContentType::Visual);
    assert_eq!(portrait.rating, 30);
    assert_eq!(portrait.thumbnail, None, "visual uploads carry no thumbnail");
    assert_eq!(portrait.media, b"https://static.example/media/2.bin?v=1".to_vec());

    let doodle = &uploads[1];
    assert_eq!(doodle.category, None, "unmapped category is dropped, not fatal");

    let essay = &uploads[2];
    assert_eq!(essay.content_type, ContentType::Literary);
    assert_eq!(essay.category, Some(2010));
    assert_eq!(
        essay.thumbnail.as_deref(),
        Some(&b"https://static.example/thumb/9.png"[..])
    );

    assert_eq!(
        recorder.states(),
        vec![
            MigrationState::RunningFolders,
            MigrationState::RunningSubmissions,
            MigrationState::Completed
        ]
    );
    assert_eq!(worker.session().state().await, MigrationState::Completed);
    assert_eq!(worker.session().uploaded().await, vec![2, 5, 9]);
}

#[tokio::test(start_paused = true)]
async fn test_uploads_are_paced_by_interval() {
    let recorder = Arc::new(Recorder::default());
    let (worker, _) = loaded_worker(1, None, recorder.clone()).await;

    let started = tokio::time::Instant::now();
    let report = worker.run(CancellationToken::new()).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(report.uploaded.len(), 3);
    // No wait before the first upload, one minute before each of the others.
    assert!(elapsed >= Duration::from_secs(120), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(180), "elapsed {elapsed:?}");

    let progress: Vec<(usize, u64)> = recorder
        .events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            MigrationEvent::Progress(p) => Some((p.uploaded, p.waited_secs)),
            _ => None,
        })
        .collect();
    // 60 one-second ticks per wait, plus one event after each upload.
    assert_eq!(progress.len(), 2 * 60 + 3);
    let ticks: Vec<u64> = progress.iter().map(|(_, w)| *w).filter(|w| *w > 0).collect();
    assert_eq!(ticks.len(), 2 * 60, "every wait tick reports time already waited");
    assert_eq!(ticks.first(), Some(&1));
    assert_eq!(ticks.iter().max(), Some(&60));
    assert_eq!(progress[60], (1, 60), "a full minute is reported before the second upload");
    assert_eq!(progress.last(), Some(&(3, 0)));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_wait_stops_before_next_upload() {
    let token = CancellationToken::new();
    let recorder = Arc::new(Recorder {
        events: Mutex::default(),
        cancel_after_upload: Some(token.clone()),
    });
    let (worker, log) = loaded_worker(5, None, recorder.clone()).await;

    let report = worker.run(token).await.expect("cancellation is not an error");

    assert_eq!(report.outcome, MigrationOutcome::Cancelled);
    assert_eq!(report.uploaded.len(), 1);
    assert_eq!(log.uploads.lock().unwrap().len(), 1);
    assert_eq!(worker.session().uploaded().await, vec![2]);
    assert_eq!(worker.session().state().await, MigrationState::Cancelled);
    assert_eq!(
        recorder.states(),
        vec![
            MigrationState::RunningFolders,
            MigrationState::RunningSubmissions,
            MigrationState::Cancelling,
            MigrationState::Cancelled
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_resumed_run_uploads_only_what_is_left() {
    let token = CancellationToken::new();
    let recorder = Arc::new(Recorder {
        events: Mutex::default(),
        cancel_after_upload: Some(token.clone()),
    });
    let (worker, log) = loaded_worker(5, None, recorder).await;

    let first = worker.run(token).await.unwrap();
    assert_eq!(first.outcome, MigrationOutcome::Cancelled);
    let plan = worker.session().plan().await.unwrap();
    assert_eq!(
        plan.unmapped_submissions.iter().map(|s| s.id).collect::<Vec<_>>(),
        vec![5, 9]
    );

    let second = worker.run(CancellationToken::new()).await.unwrap();
    assert_eq!(second.outcome, MigrationOutcome::Completed);
    assert!(second.created_folders.is_empty(), "Writing was created by the first run");
    assert_eq!(
        second.uploaded.iter().map(|u| u.source_id).collect::<Vec<_>>(),
        vec![5, 9]
    );
    assert_eq!(second.uploaded[1].folder_id, 300);

    let titles: Vec<String> = log
        .uploads
        .lock()
        .unwrap()
        .iter()
        .map(|u| u.title.clone())
        .collect();
    assert_eq!(titles, vec!["Portrait", "Doodle", "Essay"]);
    assert_eq!(log.created.lock().unwrap().len(), 1);
    assert!(worker
        .session()
        .plan()
        .await
        .unwrap()
        .unmapped_submissions
        .is_empty());
}

#[tokio::test]
async fn test_cancel_before_start_creates_nothing() {
    let (worker, log) = loaded_worker(0, None, Arc::new(Recorder::default())).await;
    let token = CancellationToken::new();
    token.cancel();

    let report = worker.run(token).await.unwrap();
    assert_eq!(report.outcome, MigrationOutcome::Cancelled);
    assert!(log.created.lock().unwrap().is_empty());
    assert!(log.uploads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_excluded_items_are_skipped() {
    let recorder = Arc::new(Recorder::default());
    let (worker, log) = loaded_worker(0, None, recorder.clone()).await;
    let session = worker.session();
    session.exclude_submission(5).await;
    session.exclude_submission(2).await;
    session.include_submission(2).await;
    session.exclude_folder(3).await;
    session.exclude_folder(1).await;
    session.include_folder(1).await;
    assert!(session.is_submission_excluded(5).await);
    assert!(!session.is_submission_excluded(2).await);

    let report = worker.run(CancellationToken::new()).await.unwrap();

    assert!(log.created.lock().unwrap().is_empty(), "Writing was excluded");
    assert_eq!(report.skipped, vec![5]);
    let placed: Vec<(i64, i64)> = report
        .uploaded
        .iter()
        .map(|u| (u.source_id, u.folder_id))
        .collect();
    assert_eq!(placed, vec![(2, 100), (9, 0)]);
    assert!(recorder
        .events
        .lock()
        .unwrap()
        .contains(&MigrationEvent::SubmissionSkipped { id: 5 }));
}

#[tokio::test]
async fn test_upload_failure_marks_run_failed() {
    let recorder = Arc::new(Recorder::default());
    let (worker, log) = loaded_worker(0, Some("Doodle"), recorder.clone()).await;

    let err = worker
        .run(CancellationToken::new())
        .await
        .expect_err("second upload fails");
    assert!(matches!(err, SyncError::Adapter(_)));

    assert_eq!(log.uploads.lock().unwrap().len(), 1);
    assert_eq!(worker.session().uploaded().await, vec![2]);
    assert_eq!(worker.session().state().await, MigrationState::Failed);
    assert_eq!(recorder.states().last(), Some(&MigrationState::Failed));

    // A failed run can be reconciled and started again, without the
    // submission it already uploaded.
    let plan = worker.reconcile().await.unwrap();
    assert_eq!(worker.session().state().await, MigrationState::Idle);
    assert_eq!(
        plan.unmapped_submissions.iter().map(|s| s.id).collect::<Vec<_>>(),
        vec![5, 9]
    );
}

#[tokio::test]
async fn test_override_and_reset() {
    let (worker, _) = loaded_worker(0, None, Arc::new(Recorder::default())).await;

    worker.override_folder(3, 110).await.unwrap();
    let plan = worker.session().plan().await.unwrap();
    assert_eq!(plan.folder_for(9), 110);
    assert!(plan.unmapped_folders.is_empty());

    // Overrides survive a fresh reconciliation.
    let plan = worker.reconcile().await.unwrap();
    assert_eq!(plan.folder_for(9), 110);

    let plan = worker.reset_overrides().await.unwrap();
    assert_eq!(plan.folder_for(9), 0);
    assert_eq!(plan.unmapped_folders.iter().map(|f| f.id).collect::<Vec<_>>(), vec![3]);

    let err = worker.override_folder(3, 999).await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::NotFound { kind: "destination folder", id: 999 }
    ));
    let err = worker.override_folder(42, 110).await.unwrap_err();
    assert!(matches!(err, SyncError::NotFound { kind: "source folder", id: 42 }));
}

#[tokio::test]
async fn test_reconcile_and_run_need_loaded_snapshots() {
    init_tracing();
    let worker: TestWorker = Worker::new(
        Arc::new(MockSourceSite::new()),
        Arc::new(MockDestinationSite::new()),
        MigrationConfig::default(),
        Arc::new(Recorder::default()),
    );

    assert!(matches!(worker.reconcile().await, Err(SyncError::NotLoaded)));
    assert!(matches!(
        worker.run(CancellationToken::new()).await,
        Err(SyncError::NotLoaded)
    ));
    assert_eq!(worker.session().state().await, MigrationState::Idle);
}

#[tokio::test]
async fn test_unknown_type_fails_reconcile() {
    init_tracing();
    let mut source = MockSourceSite::new();
    source.expect_list_folders().returning(|| Ok(vec![]));
    source
        .expect_list_submissions()
        .returning(|_| Ok(vec![sub(1, "Hologram", "hologram")]));
    let mut destination = MockDestinationSite::new();
    destination.expect_list_folders().returning(|| Ok(vec![]));
    destination.expect_list_submissions().returning(|| Ok(vec![]));

    let worker = Worker::new(
        Arc::new(source),
        Arc::new(destination),
        MigrationConfig::default(),
        Arc::new(Recorder::default()),
    );
    worker.load().await.unwrap();
    assert!(matches!(
        worker.reconcile().await,
        Err(SyncError::UnknownContentType(_))
    ));
}
