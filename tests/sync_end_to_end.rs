//! Full runs through `WidgetSync` with a SQLite database and a mock source.

use widgetsync::db::sqlite_url_for;
use widgetsync::prelude::*;
use widgetsync::widgets::WidgetStore;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const LM: &str = "Thu, 15 Oct 2026 12:00:00 GMT";

// HTTP dates contain commas, so compare the raw header value.
fn if_modified_since(expected: &'static str) -> impl Fn(&Request) -> bool + Send + Sync {
    move |req: &Request| req.headers.get("if-modified-since").and_then(|v| v.to_str().ok()) == Some(expected)
}

async fn app(dir: &tempfile::TempDir, server: &MockServer, path: &str) -> WidgetSync {
    let settings = Settings {
        widget_name: "Now Playing".into(),
        source_url: format!("{}{}", server.uri(), path),
        community: "music".into(),
        database_url: Some(sqlite_url_for(&dir.path().join("e2e.db"))),
        media_base_url: "https://media.example".into(),
        ..Settings::default()
    };
    WidgetSync::connect(settings, true).await.unwrap()
}

#[tokio::test]
async fn test_create_then_unchanged() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/np.txt"))
        .and(if_modified_since(LM))
        .respond_with(ResponseTemplate::new(304))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/np.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("Artist - Track", "text/plain")
                .insert_header("Last-Modified", LM),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir, &server, "/np.txt").await;

    assert_eq!(app.sync_once().await.unwrap(), SyncOutcome::Created);
    assert_eq!(app.status().await.unwrap().cache_token.as_deref(), Some(LM));

    let widgets = app.list_widgets().await.unwrap();
    assert_eq!(widgets.len(), 1);
    assert_eq!(widgets[0].name, "Now Playing");
    assert_eq!(widgets[0].body, WidgetBody::Text { text: "Artist - Track".into() });

    assert_eq!(app.sync_once().await.unwrap(), SyncOutcome::Unchanged);
    assert_eq!(app.list_widgets().await.unwrap(), widgets);
}

#[tokio::test]
async fn test_text_widget_replaced_by_image() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cover.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(vec![0xffu8, 0xd8, 0xff, 0xe0], "image/jpeg")
                .insert_header("Last-Modified", LM),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir, &server, "/cover.jpg").await;
    let old = app.database().create("music", &Widget::text("now playing", "stale")).await.unwrap();

    assert_eq!(app.sync_once().await.unwrap(), SyncOutcome::Created);

    let widgets = app.list_widgets().await.unwrap();
    assert_eq!(widgets.len(), 1);
    assert_ne!(widgets[0].id, old.id);
    match &widgets[0].body {
        WidgetBody::Image { images } => {
            assert_eq!(images.len(), 1);
            assert!(images[0].url.starts_with("https://media.example/"));
        }
        other => panic!("expected image widget, got {other:?}"),
    }
}

#[tokio::test]
async fn test_same_kind_updates_existing_widget() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/np.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("fresh", "text/plain"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir, &server, "/np.txt").await;
    let old = app.database().create("music", &Widget::text("NOW PLAYING", "stale")).await.unwrap();

    assert_eq!(app.sync_once().await.unwrap(), SyncOutcome::Updated);

    let widgets = app.list_widgets().await.unwrap();
    assert_eq!(widgets.len(), 1);
    assert_eq!(widgets[0].id, old.id);
    assert_eq!(widgets[0].body, WidgetBody::Text { text: "fresh".into() });
    // no Last-Modified from the source, so no token either
    assert!(app.status().await.unwrap().cache_token.is_none());
}

#[tokio::test]
async fn test_html_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<html></html>", "text/html"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir, &server, "/page").await;

    let outcome = app.sync_once().await.unwrap();
    assert!(matches!(outcome, SyncOutcome::Skipped(SkipReason::InvalidContentType { .. })));
    assert!(app.list_widgets().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_start_stop_resume() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let app = app(&dir, &server, "/np.txt").await;

    assert!(app.on_upgrade().await.unwrap().is_none());

    let id = app.start().await.unwrap();
    let status = app.status().await.unwrap();
    assert_eq!(status.job_id.as_deref(), Some(id.as_str()));
    assert!(status.registered);
    assert!(app.on_upgrade().await.unwrap().is_none());

    assert!(app.stop().await.unwrap());
    assert!(app.status().await.unwrap().job_id.is_none());
    assert!(app.scheduler().list_jobs().is_empty());
}

#[tokio::test]
async fn test_resume_after_restart() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    let first = app(&dir, &server, "/np.txt").await;
    let id = first.start().await.unwrap();
    drop(first);

    let second = app(&dir, &server, "/np.txt").await;
    let rearmed = second.on_upgrade().await.unwrap().expect("job should be re-armed");
    assert_ne!(rearmed, id);
    assert!(second.status().await.unwrap().registered);
}

#[tokio::test]
async fn test_stop_from_second_process_ends_first_job() {
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use widgetsync::commands::{SyncCommands, SyncWork};
    use widgetsync::scheduler::JobScheduler;

    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let first = app(&dir, &server, "/np.txt").await;
    let second = app(&dir, &server, "/np.txt").await;

    let runs = Arc::new(AtomicUsize::new(0));
    let work: SyncWork = {
        let runs = runs.clone();
        Arc::new(move || {
            let runs = runs.clone();
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        })
    };

    let running = Arc::new(JobScheduler::new());
    let here = SyncCommands::new(Arc::new(first.database().clone()), running.clone());
    let id = here.start(Duration::from_millis(50), work).await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(runs.load(Ordering::SeqCst) >= 1);

    assert!(second.stop().await.unwrap());
    assert!(second.status().await.unwrap().job_id.is_none());

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!running.is_registered(&id));
    let settled = runs.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(runs.load(Ordering::SeqCst), settled);
}
