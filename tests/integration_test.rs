//! Integration tests for peekr
//!
//! These tests drive the public engine and command APIs end to end against
//! the scriptable mock shell host.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use peekr::config::{Color, PreviewSettings, WatchdogSettings};
use peekr::host::mock::{MockEvent, MockHandler, MockHost, MockImage, MockSurface, wait_until};
use peekr::host::{AlphaType, HostError, InterfaceKind, Size};
use peekr::preview::{Phase, PreviewEngine, PreviewInfo, PreviewMode};
use tempfile::TempDir;

const TIMEOUT: Duration = Duration::from_secs(5);

/// Helper function to create a test file
fn create_test_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

fn settings() -> PreviewSettings {
    PreviewSettings {
        watchdog: WatchdogSettings {
            sweep_interval_ms: 10,
            unload_timeout_ms: 250,
        },
        ..PreviewSettings::default()
    }
}

fn engine(host: &MockHost) -> (PreviewEngine<MockHost>, Arc<MockSurface>) {
    let surface = Arc::new(MockSurface::new(Size::new(640, 480)));
    let engine = PreviewEngine::new(host.clone(), surface.clone(), settings());
    engine.start().unwrap();
    (engine, surface)
}

#[test]
fn test_browsing_through_files_of_every_kind() {
    let dir = TempDir::new().unwrap();
    let text = create_test_file(&dir, "notes.txt", "hello");
    let video = create_test_file(&dir, "clip.mp4", "video");
    let photo = create_test_file(&dir, "photo.jpg", "jpeg");
    let host = MockHost::new()
        .with_preview_handler(".txt", MockHandler::new("{text}"))
        .with_thumbnail_provider(".mp4", MockHandler::new("{video}"))
        .with_image_factory(".jpg", MockImage::new(800, 600, AlphaType::Rgb));
    let (engine, _surface) = engine(&host);

    let loaded = Arc::new(parking_lot::Mutex::new(Vec::<PreviewInfo>::new()));
    let sink = Arc::clone(&loaded);
    engine.add_listener(move |info: &PreviewInfo| sink.lock().push(info.clone()));

    for (file, mode) in [
        (&text, PreviewMode::Interactive),
        (&video, PreviewMode::Thumbnail),
        (&photo, PreviewMode::Thumbnail),
    ] {
        engine.show_preview(Some(file));
        assert!(wait_until(TIMEOUT, || engine.display().mode == mode));
    }

    assert!(wait_until(TIMEOUT, || loaded.lock().len() == 3));
    let kinds: Vec<_> = loaded.lock().iter().map(|i| i.interface_type).collect();
    assert_eq!(
        kinds,
        vec![
            InterfaceKind::PreviewHandler,
            InterfaceKind::ThumbnailProvider,
            InterfaceKind::ShellItemImageFactory,
        ]
    );

    engine.hide();
    assert_eq!(
        engine.display().message,
        Some(PreviewSettings::default().messages.initial)
    );
    assert!(wait_until(TIMEOUT, || engine.unloading_sessions() == 0));
    assert!(wait_until(TIMEOUT, || host.live_objects() == 0));
}

#[test]
fn test_rapid_switching_only_shows_last_file() {
    let dir = TempDir::new().unwrap();
    let files: Vec<_> = (0..8)
        .map(|i| create_test_file(&dir, &format!("file{i}.txt"), "content"))
        .collect();
    let host = MockHost::new().with_preview_handler(".txt", MockHandler::new("{text}"));
    let (engine, _surface) = engine(&host);
    let infos = engine.subscribe();

    for file in &files {
        engine.show_preview(Some(file));
    }

    let last = files.last().unwrap();
    assert!(wait_until(TIMEOUT, || engine
        .current_session()
        .is_some_and(|s| s.phase() == Phase::InteractiveActive)));
    assert_eq!(&engine.preview_info().unwrap().file, last);

    assert!(wait_until(TIMEOUT, || engine.unloading_sessions() == 0));
    let announced: Vec<_> = infos.try_iter().collect();
    assert!(announced.iter().any(|info| &info.file == last));
    assert!(announced.len() <= files.len());
}

#[test]
fn test_transient_activation_failure_is_retried_once() {
    let dir = TempDir::new().unwrap();
    let file = create_test_file(&dir, "doc.docx", "zip");
    let host = MockHost::new()
        .with_preview_handler(".docx", MockHandler::new("{word}").failing_transiently(1));
    let (engine, _surface) = engine(&host);
    let infos = engine.subscribe();

    engine.show_preview(Some(&file));
    let info = infos.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(info.clsid, "{word}");
    assert_eq!(
        host.count(|e| matches!(e, MockEvent::Activate { .. })),
        2
    );
}

#[test]
fn test_activation_failure_message_names_class_and_code() {
    let dir = TempDir::new().unwrap();
    let file = create_test_file(&dir, "sheet.xlsx", "zip");
    let host = MockHost::new().with_preview_handler(
        ".xlsx",
        MockHandler::new("{excel}").failing_activation(HostError::Call { code: 0x8007_0005 }),
    );
    let (engine, _surface) = engine(&host);

    engine.show_preview(Some(&file));
    assert!(wait_until(TIMEOUT, || engine.display().message.as_deref()
        == Some("Error with CLSID={excel}: 0x80070005")));
    assert!(!host.saw(|e| matches!(e, MockEvent::GetThumbnail(_))));
}

#[test]
fn test_listener_removal_and_theme_reload() {
    let dir = TempDir::new().unwrap();
    let file = create_test_file(&dir, "page.html", "<p>hi</p>");
    let host =
        MockHost::new().with_preview_handler(".html", MockHandler::new("{html}").with_visuals());
    let (engine, _surface) = engine(&host);

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let id = engine.add_listener(move |_: &PreviewInfo| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    engine.show_preview(Some(&file));
    assert!(wait_until(TIMEOUT, || calls.load(Ordering::SeqCst) == 1));

    engine.set_background_color(Some(Color::rgb(0x20, 0x20, 0x20)));
    assert!(wait_until(TIMEOUT, || calls.load(Ordering::SeqCst) == 2));

    assert!(engine.remove_listener(id));
    engine.set_background_color(Some(Color::rgb(0x30, 0x30, 0x30)));
    assert!(wait_until(TIMEOUT, || engine
        .current_session()
        .is_some_and(|s| s.phase() == Phase::InteractiveActive)));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        engine.settings().background_color,
        Some(Color::rgb(0x30, 0x30, 0x30))
    );
}

#[test]
fn test_stop_and_restart_reloads_last_file() {
    let dir = TempDir::new().unwrap();
    let file = create_test_file(&dir, "notes.txt", "hello");
    let host = MockHost::new().with_preview_handler(".txt", MockHandler::new("{text}"));
    let (engine, _surface) = engine(&host);

    engine.show_preview(Some(&file));
    assert!(wait_until(TIMEOUT, || engine.display().mode == PreviewMode::Interactive));

    engine.stop();
    assert!(!engine.is_started());
    assert!(engine.current_session().is_none());
    assert_eq!(engine.display().mode, PreviewMode::None);

    engine.start().unwrap();
    assert!(wait_until(TIMEOUT, || engine.display().mode == PreviewMode::Interactive));
    assert_eq!(
        host.count(|e| matches!(e, MockEvent::Activate { .. })),
        2
    );
}

#[test]
fn test_thumbnail_command_writes_png() {
    let dir = TempDir::new().unwrap();
    let file = create_test_file(&dir, "clip.mp4", "video");
    let png = dir.path().join("clip.png");
    let host = Arc::new(MockHost::new().with_thumbnail_provider(
        ".mp4",
        MockHandler::new("{video}").rendering(MockImage::new(64, 48, AlphaType::Argb)),
    ));

    let size = peekr::commands::thumbnail(&host, &file, &png, 512).unwrap();
    assert_eq!(size, Size::new(64, 48));
    assert!(host.saw(|e| *e == MockEvent::GetThumbnail(512)));
    assert_eq!(image::image_dimensions(&png).unwrap(), (64, 48));
}

#[test]
fn test_info_command_json() {
    let dir = TempDir::new().unwrap();
    let file = create_test_file(&dir, "notes.txt", "hello");
    let host = Arc::new(
        MockHost::new().with_preview_handler(".txt", MockHandler::new("{text}").named("Notes")),
    );

    let mut out = Vec::new();
    peekr::commands::info(&host, &file, true, &mut out).unwrap();
    let info: PreviewInfo = serde_json::from_slice(&out).unwrap();
    assert_eq!(info.handler_name, "Notes");
    assert_eq!(info.interface_type, InterfaceKind::PreviewHandler);
    assert_eq!(host.live_objects(), 0);
}
