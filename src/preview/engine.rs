//! Preview engine
//!
//! [`PreviewEngine`] is the facade a rendering surface drives. It owns the
//! current session, replaces it when another file is requested, forwards
//! window events to the session worker, and publishes a [`DisplaySnapshot`]
//! the surface paints from.
//!
//! # Threading
//!
//! All methods are cheap and non-blocking; native work happens on the
//! session workers. Superseded sessions are canceled synchronously and torn
//! down asynchronously while the next session loads.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, unbounded};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::error::{PreviewError, Result};
use super::listener::{ListenerId, Listeners, PreviewListener};
use super::session::{EngineShared, Session, SessionContext, SessionHandle};
use super::thumbnail;
use super::types::{DisplaySnapshot, PreviewInfo, PreviewMode, PreviewRequest, SessionId, Surface};
use crate::config::{Color, FontSpec, Insets, PreviewMessages, PreviewSettings};
use crate::host::ShellHost;
use crate::worker::{UnloadEntry, UnloadRegistry, Watchdog};

/// How long [`PreviewEngine::stop`] waits for each unloading session
const STOP_WAIT: Duration = Duration::from_secs(2);

type Current<H> = Option<Arc<SessionHandle<H>>>;

/// Preview acquisition and lifecycle engine
pub struct PreviewEngine<H: ShellHost> {
    shared: Arc<EngineShared<H>>,
    current: Mutex<Current<H>>,
    file: Mutex<Option<PathBuf>>,
    watchdog: Mutex<Option<Watchdog>>,
    started: AtomicBool,
    next_id: AtomicU64,
}

impl<H: ShellHost> PreviewEngine<H> {
    /// Create a stopped engine showing the initial message
    #[must_use]
    pub fn new(host: H, surface: Arc<dyn Surface>, settings: PreviewSettings) -> Self {
        let display = DisplaySnapshot::message(settings.messages.initial.clone());
        Self {
            shared: Arc::new(EngineShared {
                host: Arc::new(host),
                surface,
                display: Mutex::new(display),
                settings: RwLock::new(settings),
                listeners: Listeners::default(),
                registry: Arc::new(UnloadRegistry::new()),
            }),
            current: Mutex::new(None),
            file: Mutex::new(None),
            watchdog: Mutex::new(None),
            started: AtomicBool::new(false),
            next_id: AtomicU64::new(0),
        }
    }

    /// Start the watchdog and show the last requested file, if any
    ///
    /// # Errors
    ///
    /// Returns `PreviewError::WorkerSpawn` if the watchdog thread cannot be started.
    pub fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let settings = self.shared.settings.read().watchdog;
        let watchdog = Watchdog::start(Arc::clone(&self.shared.registry), settings)
            .map_err(|e| PreviewError::WorkerSpawn(e.to_string()))?;
        *self.watchdog.lock() = Some(watchdog);
        info!("preview engine started");

        let file = self.file.lock().clone();
        if let Some(file) = file {
            self.show_preview(Some(&file));
        }
        Ok(())
    }

    /// Unload the current session and wait briefly for unloading sessions
    ///
    /// The watchdog keeps running until every unloading session is gone.
    pub fn stop(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        let initial = self.shared.settings.read().messages.initial.clone();
        self.replace_current(DisplaySnapshot::message(initial));

        if let Some(watchdog) = self.watchdog.lock().take() {
            watchdog.stop();
        }
        for entry in self.shared.registry.entries() {
            if !entry.wait_finished(STOP_WAIT) {
                warn!(session = %entry.id(), "session still unloading at stop");
            }
        }
        info!("preview engine stopped");
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Show a preview of `file`, or the initial message for `None`
    ///
    /// Missing and empty files are reported as messages without creating a
    /// session. Before [`PreviewEngine::start`] the file is only remembered.
    pub fn show_preview(&self, file: Option<&Path>) {
        *self.file.lock() = file.map(Path::to_path_buf);
        if !self.is_started() {
            return;
        }

        let messages = self.shared.settings.read().messages.clone();
        let Some(path) = file else {
            self.show_message(messages.initial);
            return;
        };
        let request = match PreviewRequest::validated(path) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "rejected preview request");
                self.show_message(PreviewError::from(e).user_message(&messages));
                return;
            }
        };

        let mut current = self.current.lock();
        self.supersede(&mut current, DisplaySnapshot::message(messages.loading.clone()));

        let id = SessionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        match SessionHandle::start(&self.shared, id, request) {
            Ok(handle) => *current = Some(handle),
            Err(e) => {
                error!(error = %e, "cannot start preview session");
                *self.shared.display.lock() = DisplaySnapshot::message(e.user_message(&messages));
            }
        }
        drop(current);
        self.shared.surface.request_repaint();
    }

    /// Unload the current preview and show the initial message
    pub fn hide(&self) {
        *self.file.lock() = None;
        let initial = self.shared.settings.read().messages.initial.clone();
        self.show_message(initial);
    }

    /// What the surface should paint right now
    #[must_use]
    pub fn display(&self) -> DisplaySnapshot {
        self.shared.display.lock().clone()
    }

    /// Details about the current preview
    #[must_use]
    pub fn preview_info(&self) -> Option<PreviewInfo> {
        self.current_session().and_then(|session| session.info())
    }

    /// The current session, if any
    #[must_use]
    pub fn current_session(&self) -> Option<Arc<Session>> {
        self.current
            .lock()
            .as_ref()
            .map(|handle| Arc::clone(handle.session()))
    }

    /// Number of sessions still being unloaded
    #[must_use]
    pub fn unloading_sessions(&self) -> usize {
        self.shared.registry.len()
    }

    /// The surface was resized or moved
    ///
    /// Interactive handlers follow the window's client area; thumbnails are
    /// re-requested when the area grew past the current bitmap.
    pub fn bounds_changed(&self) {
        let Some(handle) = self.current.lock().clone() else {
            return;
        };
        match handle.session().mode() {
            PreviewMode::Interactive => {
                if self.shared.surface.window().is_some()
                    && handle.session().take_awaiting_window()
                {
                    debug!("surface window appeared, loading preview");
                    handle.submit(SessionContext::load);
                } else {
                    handle.submit(SessionContext::update_rect);
                }
            }
            PreviewMode::Thumbnail => {
                let insets = self.shared.settings.read().thumbnail_insets;
                let bounds = self.shared.surface.bounds();
                let available = insets.inner_width(bounds.width);
                let wanted = thumbnail::thumbnail_size(bounds);
                if handle.session().reserve_upscale(available, wanted) {
                    debug!(available, "requesting bigger thumbnail");
                    handle.submit(SessionContext::upscale);
                }
                self.shared.surface.request_repaint();
            }
            PreviewMode::None => {}
        }
    }

    /// Give keyboard focus to an interactive handler
    ///
    /// Returns `false` when no interactive preview is shown, so the host can
    /// focus its own surface instead.
    pub fn set_focus(&self) -> bool {
        let Some(handle) = self.current.lock().clone() else {
            return false;
        };
        if handle.session().mode() != PreviewMode::Interactive {
            return false;
        }
        handle.submit(SessionContext::focus)
    }

    /// The surface was double clicked
    ///
    /// Opens a thumbnail's file with its default application when enabled.
    /// Returns whether an open was requested.
    pub fn double_clicked(&self) -> bool {
        if !self.shared.settings.read().open_on_double_click {
            return false;
        }
        let Some(handle) = self.current.lock().clone() else {
            return false;
        };
        if handle.session().mode() != PreviewMode::Thumbnail {
            return false;
        }

        let path = handle.session().request().path().to_path_buf();
        match open::that_detached(&path) {
            Ok(()) => info!(file = %path.display(), "opened with default application"),
            Err(e) => warn!(file = %path.display(), error = %e, "cannot open file"),
        }
        true
    }

    /// Copy of the current settings
    #[must_use]
    pub fn settings(&self) -> PreviewSettings {
        self.shared.settings.read().clone()
    }

    pub fn set_background_color(&self, color: Option<Color>) {
        self.shared.settings.write().background_color = color;
        self.visuals_changed();
    }

    pub fn set_text_color(&self, color: Option<Color>) {
        self.shared.settings.write().text_color = color;
        self.visuals_changed();
    }

    pub fn set_font(&self, font: Option<FontSpec>) {
        self.shared.settings.write().font = font;
        self.visuals_changed();
    }

    pub fn set_thumbnail_insets(&self, insets: Insets) {
        self.shared.settings.write().thumbnail_insets = insets;
        self.bounds_changed();
    }

    pub fn set_open_on_double_click(&self, enabled: bool) {
        self.shared.settings.write().open_on_double_click = enabled;
    }

    pub fn set_checkered_background(&self, enabled: bool) {
        self.shared.settings.write().checkered_background = enabled;
        self.shared.surface.request_repaint();
    }

    pub fn set_messages(&self, messages: PreviewMessages) {
        self.shared.settings.write().messages = messages;
    }

    /// Register a listener for loaded previews
    pub fn add_listener(&self, listener: impl PreviewListener + 'static) -> ListenerId {
        self.shared.listeners.add(Arc::new(listener))
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.shared.listeners.remove(id)
    }

    /// Receive every loaded [`PreviewInfo`] on a channel
    #[must_use]
    pub fn subscribe(&self) -> Receiver<PreviewInfo> {
        let (tx, rx) = unbounded();
        self.add_listener(move |info: &PreviewInfo| {
            let _ = tx.send(info.clone());
        });
        rx
    }

    /// Reload the current preview if its handler took the visuals
    fn visuals_changed(&self) {
        let reload = self
            .current_session()
            .is_some_and(|session| session.has_visuals() && !session.is_canceled());
        if reload {
            let file = self.file.lock().clone();
            debug!("visuals changed, reloading preview");
            self.show_preview(file.as_deref());
        } else {
            self.shared.surface.request_repaint();
        }
    }

    fn show_message(&self, message: String) {
        self.replace_current(DisplaySnapshot::message(message));
        self.shared.surface.request_repaint();
    }

    fn replace_current(&self, snapshot: DisplaySnapshot) {
        let mut current = self.current.lock();
        self.supersede(&mut current, snapshot);
    }

    /// Cancel the current session under the display lock and unload it
    fn supersede(&self, current: &mut Current<H>, snapshot: DisplaySnapshot) {
        let old = current.take();
        {
            let mut display = self.shared.display.lock();
            if let Some(old) = &old {
                old.session().cancel();
            }
            *display = snapshot;
        }
        if let Some(old) = old {
            self.unload_async(&old);
        }
    }

    fn unload_async(&self, handle: &Arc<SessionHandle<H>>) {
        debug!(session = %handle.session().id(), "unloading");
        if !handle.worker_finished() {
            let entry: Arc<dyn UnloadEntry> = handle.clone();
            self.shared.registry.insert(entry);
        }
        handle.unload(Instant::now());
    }
}

impl<H: ShellHost> Drop for PreviewEngine<H> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::mock::{
        MockEvent, MockHandler, MockHost, MockImage, MockObject, MockSurface, wait_until,
    };
    use crate::host::{
        AlphaType, ColorRef, HostError, InitializerKind, InterfaceKind, Rect, Size, WindowHandle,
    };
    use crate::preview::Phase;
    use crate::testing::{Fixtures, TIMEOUT, fast_settings, started_engine};
    use crossbeam_channel::bounded;

    fn loaded(engine: &PreviewEngine<MockHost>) -> bool {
        engine
            .current_session()
            .is_some_and(|session| session.phase().is_active())
    }

    #[test]
    fn test_show_before_start_only_remembers_file() {
        let fixtures = Fixtures::new();
        let file = fixtures.file("a.txt", "hello");
        let host = MockHost::new().with_preview_handler(".txt", MockHandler::new("{p}"));
        let surface = Arc::new(MockSurface::new(Size::new(100, 100)));
        let engine = PreviewEngine::new(host.clone(), surface, fast_settings());

        engine.show_preview(Some(&file));
        assert!(engine.current_session().is_none());
        assert!(host.events().is_empty());

        engine.start().unwrap();
        assert!(wait_until(TIMEOUT, || loaded(&engine)));
    }

    #[test]
    fn test_missing_file_shows_message_without_session() {
        let fixtures = Fixtures::new();
        let host = MockHost::new();
        let (engine, _surface) = started_engine(host.clone(), fast_settings());

        engine.show_preview(Some(&fixtures.path().join("nope.txt")));
        let display = engine.display();
        assert_eq!(
            display.message.as_deref(),
            Some(PreviewMessages::default().file_not_found.as_str())
        );
        assert!(engine.current_session().is_none());
        assert!(!host.saw(|e| *e == MockEvent::EnterThread));
    }

    #[test]
    fn test_empty_file_shows_message_without_session() {
        let fixtures = Fixtures::new();
        let file = fixtures.file("empty.txt", "");
        let (engine, _surface) = started_engine(MockHost::new(), fast_settings());

        engine.show_preview(Some(&file));
        assert_eq!(
            engine.display().message,
            Some(PreviewMessages::default().empty_file)
        );
        assert!(engine.current_session().is_none());
    }

    #[test]
    fn test_interactive_load_order_and_info() {
        let fixtures = Fixtures::new();
        let file = fixtures.file("a.txt", "hello");
        let host = MockHost::new()
            .with_preview_handler(".txt", MockHandler::new("{p}").named("Text"))
            .with_client_rect(Rect::from_size(Size::new(400, 300)));
        let (engine, _surface) = started_engine(host.clone(), fast_settings());
        let infos = engine.subscribe();

        engine.show_preview(Some(&file));
        let info = infos.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(info.interface_type, InterfaceKind::PreviewHandler);
        assert_eq!(info.initializer_type, Some(InitializerKind::Stream));
        assert_eq!(info.handler_name, "Text");
        assert_eq!(engine.display().mode, PreviewMode::Interactive);
        assert_eq!(engine.preview_info(), Some(info));

        let events = host.events();
        let position = |wanted: &MockEvent| events.iter().position(|e| e == wanted).unwrap();
        let set_window = position(&MockEvent::SetWindow(Rect::ZERO));
        let do_preview = position(&MockEvent::DoPreview);
        let set_rect = position(&MockEvent::SetRect(Rect::from_size(Size::new(400, 300))));
        assert!(set_window < do_preview && do_preview < set_rect);
    }

    #[test]
    fn test_visuals_are_applied_when_exposed() {
        let fixtures = Fixtures::new();
        let file = fixtures.file("a.txt", "hello");
        let host =
            MockHost::new().with_preview_handler(".txt", MockHandler::new("{p}").with_visuals());
        let mut settings = fast_settings();
        settings.background_color = Some(Color::rgb(0x11, 0x22, 0x33));
        settings.font = Some(FontSpec::new("Consolas", 10));
        let (engine, _surface) = started_engine(host.clone(), settings);

        engine.show_preview(Some(&file));
        assert!(wait_until(TIMEOUT, || loaded(&engine)));
        assert!(host.saw(|e| *e == MockEvent::BackgroundColor(ColorRef(0x0033_2211))));
        assert!(host.saw(|e| matches!(e, MockEvent::Font(font) if font.height == -10)));
        assert!(!host.saw(|e| matches!(e, MockEvent::TextColor(_))));
        assert!(engine.current_session().unwrap().has_visuals());
    }

    #[test]
    fn test_visuals_change_reloads_only_sessions_with_visuals() {
        let fixtures = Fixtures::new();
        let with = fixtures.file("a.txt", "hello");
        let without = fixtures.file("b.md", "hello");
        let host = MockHost::new()
            .with_preview_handler(".txt", MockHandler::new("{v}").with_visuals())
            .with_preview_handler(".md", MockHandler::new("{n}"));
        let (engine, _surface) = started_engine(host.clone(), fast_settings());
        let activations = || host.count(|e| matches!(e, MockEvent::Activate { .. }));

        engine.show_preview(Some(&without));
        assert!(wait_until(TIMEOUT, || loaded(&engine)));
        engine.set_text_color(Some(Color::rgb(1, 2, 3)));
        assert_eq!(activations(), 1);

        engine.show_preview(Some(&with));
        assert!(wait_until(TIMEOUT, || loaded(&engine)));
        let first = engine.current_session().unwrap().id();
        engine.set_text_color(Some(Color::rgb(4, 5, 6)));
        assert!(wait_until(TIMEOUT, || loaded(&engine)));
        assert_ne!(engine.current_session().unwrap().id(), first);
        assert_eq!(activations(), 3);
        assert!(wait_until(TIMEOUT, || host.saw(|e| *e
            == MockEvent::TextColor(ColorRef(0x0006_0504)))));
    }

    #[test]
    fn test_superseded_session_is_canceled_and_never_publishes() {
        let fixtures = Fixtures::new();
        let slow = fixtures.file("slow.txt", "a");
        let fast = fixtures.file("fast.png", "b");
        let (gate_tx, gate_rx) = bounded::<()>(0);
        let host = MockHost::new()
            .with_preview_handler(".txt", MockHandler::new("{slow}").blocking_preview(gate_rx))
            .with_thumbnail_provider(".png", MockHandler::new("{fast}"));
        let (engine, _surface) = started_engine(host.clone(), fast_settings());

        engine.show_preview(Some(&slow));
        assert!(wait_until(TIMEOUT, || host.saw(|e| matches!(
            e,
            MockEvent::SetWindow(_)
        ))));
        let first = engine.current_session().unwrap();

        engine.show_preview(Some(&fast));
        assert!(first.is_canceled());
        drop(gate_tx);

        assert!(wait_until(TIMEOUT, || loaded(&engine)));
        assert_eq!(engine.display().mode, PreviewMode::Thumbnail);
        assert!(wait_until(TIMEOUT, || first.phase() == Phase::Terminal));
        assert_ne!(first.phase(), Phase::InteractiveActive);
        assert_eq!(engine.display().mode, PreviewMode::Thumbnail);
        assert!(host.saw(|e| matches!(
            e,
            MockEvent::Released {
                kind: MockObject::PreviewHandler,
                thread: Some(name),
            } if name == "peekr-session-0"
        )));
    }

    #[test]
    fn test_thumbnail_pixels_are_published() {
        let fixtures = Fixtures::new();
        let file = fixtures.file("a.png", "png");
        let host = MockHost::new().with_thumbnail_provider(
            ".png",
            MockHandler::new("{t}").rendering(MockImage::new(256, 256, AlphaType::Rgb)),
        );
        let (engine, surface) = started_engine(host.clone(), fast_settings());

        engine.show_preview(Some(&file));
        assert!(wait_until(TIMEOUT, || engine.display().pixels.is_some()));
        let display = engine.display();
        assert_eq!(display.mode, PreviewMode::Thumbnail);
        assert_eq!(display.pixels.unwrap().size(), Size::square(256));
        assert!(host.saw(|e| *e == MockEvent::GetThumbnail(400)));
        assert!(surface.repaint_count() > 0);
        assert!(!engine.set_focus());
    }

    #[test]
    fn test_resize_requests_bigger_thumbnail_until_biggest() {
        let fixtures = Fixtures::new();
        let file = fixtures.file("a.png", "png");
        let host = MockHost::new().with_thumbnail_provider(
            ".png",
            MockHandler::new("{t}").rendering(MockImage::new(400, 400, AlphaType::Argb)),
        );
        let (engine, surface) = started_engine(host.clone(), fast_settings());
        engine.show_preview(Some(&file));
        assert!(wait_until(TIMEOUT, || engine.display().pixels.is_some()));
        let first = engine.display().pixels.unwrap();

        surface.resize(Size::new(800, 600));
        engine.bounds_changed();
        assert!(wait_until(TIMEOUT, || engine
            .display()
            .pixels
            .is_some_and(|pixels| !Arc::ptr_eq(&pixels, &first))));
        assert!(host.saw(|e| *e == MockEvent::GetThumbnail(800)));

        // the provider answered 800 with 400 pixels, so it has nothing bigger
        surface.resize(Size::new(1200, 900));
        engine.bounds_changed();
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(host.count(|e| matches!(e, MockEvent::GetThumbnail(_))), 2);
    }

    #[test]
    fn test_resize_does_not_repeat_request_for_portrait_thumbnail() {
        let fixtures = Fixtures::new();
        let file = fixtures.file("a.png", "png");
        let host = MockHost::new().with_thumbnail_provider(
            ".png",
            MockHandler::new("{t}").rendering(MockImage::new(400, 800, AlphaType::Rgb)),
        );
        let (engine, surface) = started_engine(host.clone(), fast_settings());
        surface.resize(Size::new(800, 800));

        engine.show_preview(Some(&file));
        assert!(wait_until(TIMEOUT, || engine.display().pixels.is_some()));
        for _ in 0..5 {
            engine.bounds_changed();
        }
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(host.count(|e| matches!(e, MockEvent::GetThumbnail(_))), 1);
        assert!(host.saw(|e| *e == MockEvent::GetThumbnail(800)));
    }

    #[test]
    fn test_resize_does_not_repeat_capped_factory_request() {
        let fixtures = Fixtures::new();
        let file = fixtures.file("a.heic", "heic");
        let host = MockHost::new()
            .with_image_factory(".heic", MockImage::new(1280, 960, AlphaType::Argb));
        let (engine, surface) = started_engine(host.clone(), fast_settings());
        surface.resize(Size::new(2000, 1500));

        engine.show_preview(Some(&file));
        assert!(wait_until(TIMEOUT, || engine.display().pixels.is_some()));
        for _ in 0..5 {
            engine.bounds_changed();
        }
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(host.count(|e| matches!(e, MockEvent::GetImage(..))), 1);
    }

    #[test]
    fn test_render_failure_fails_session_with_no_preview_message() {
        let fixtures = Fixtures::new();
        let file = fixtures.file("a.mp4", "video");
        let host = MockHost::new().with_thumbnail_provider(
            ".mp4",
            MockHandler::new("{v}").failing_render(HostError::Call { code: 0x8000_4005 }),
        );
        let (engine, _surface) = started_engine(host.clone(), fast_settings());
        let infos = engine.subscribe();

        engine.show_preview(Some(&file));
        let session = engine.current_session().unwrap();
        assert!(wait_until(TIMEOUT, || session.phase() == Phase::Failed));
        assert_eq!(
            session.failure(),
            Some(PreviewError::RenderFailed(HostError::Call { code: 0x8000_4005 }))
        );
        assert_eq!(
            engine.display().message,
            Some(PreviewMessages::default().no_preview_available)
        );
        assert!(engine.display().pixels.is_none());
        assert!(wait_until(TIMEOUT, || host.live_objects() == 0));
        assert!(infos.try_recv().is_err());
    }

    #[test]
    fn test_failed_session_releases_and_stays_current() {
        let fixtures = Fixtures::new();
        let file = fixtures.file("a.txt", "hello");
        let host =
            MockHost::new().with_preview_handler(".txt", MockHandler::new("{p}").accepting(&[]));
        let (engine, _surface) = started_engine(host.clone(), fast_settings());
        let infos = engine.subscribe();

        engine.show_preview(Some(&file));
        let session = engine.current_session().unwrap();
        assert!(wait_until(TIMEOUT, || session.phase() == Phase::Failed));
        assert_eq!(session.failure(), Some(PreviewError::InitializationFailed));
        assert_eq!(
            engine.display().message.as_deref(),
            Some("Error: Failed to initialize preview handler")
        );
        assert!(wait_until(TIMEOUT, || host.live_objects() == 0));
        assert_eq!(engine.current_session().unwrap().id(), session.id());
        assert!(infos.try_recv().is_err());
    }

    #[test]
    fn test_no_handler_shows_no_preview_message() {
        let fixtures = Fixtures::new();
        let file = fixtures.file("a.zzz", "data");
        let (engine, _surface) = started_engine(MockHost::new(), fast_settings());

        engine.show_preview(Some(&file));
        let expected = PreviewMessages::default().no_preview_available;
        assert!(wait_until(TIMEOUT, || engine.display().message.as_deref()
            == Some(expected.as_str())));
    }

    #[test]
    fn test_stuck_unload_is_abandoned_by_watchdog() {
        let fixtures = Fixtures::new();
        let file = fixtures.file("a.txt", "hello");
        let (_gate_tx, gate_rx) = bounded::<()>(0);
        let host = MockHost::new()
            .with_preview_handler(".txt", MockHandler::new("{p}").blocking_unload(gate_rx));
        let (engine, _surface) = started_engine(host.clone(), fast_settings());

        engine.show_preview(Some(&file));
        assert!(wait_until(TIMEOUT, || loaded(&engine)));
        engine.hide();
        assert_eq!(engine.unloading_sessions(), 1);

        assert!(wait_until(TIMEOUT, || engine.unloading_sessions() == 0));
        assert!(!host.saw(|e| *e == MockEvent::Unload));
    }

    #[test]
    fn test_prompt_unload_leaves_registry() {
        let fixtures = Fixtures::new();
        let file = fixtures.file("a.txt", "hello");
        let host = MockHost::new().with_preview_handler(".txt", MockHandler::new("{p}"));
        let mut settings = fast_settings();
        settings.watchdog.unload_timeout_ms = 60_000;
        let (engine, _surface) = started_engine(host.clone(), settings);

        engine.show_preview(Some(&file));
        assert!(wait_until(TIMEOUT, || loaded(&engine)));
        engine.hide();

        assert!(wait_until(TIMEOUT, || engine.unloading_sessions() == 0));
        assert!(host.saw(|e| *e == MockEvent::SetRect(Rect::ZERO)));
        assert!(host.saw(|e| *e == MockEvent::Unload));
        assert!(host.saw(|e| *e == MockEvent::LeaveThread));
        assert_eq!(host.live_objects(), 0);
    }

    #[test]
    fn test_double_click_opens_only_thumbnails_when_enabled() {
        let fixtures = Fixtures::new();
        let file = fixtures.file("a.txt", "hello");
        let host = MockHost::new().with_preview_handler(".txt", MockHandler::new("{p}"));
        let (engine, _surface) = started_engine(host, fast_settings());

        assert!(!engine.double_clicked());
        engine.show_preview(Some(&file));
        assert!(wait_until(TIMEOUT, || loaded(&engine)));
        assert!(!engine.double_clicked());
        assert!(engine.set_focus());

        engine.set_open_on_double_click(false);
        assert!(!engine.double_clicked());
    }

    #[test]
    fn test_headless_surface_skips_interactive_load() {
        let fixtures = Fixtures::new();
        let file = fixtures.file("a.txt", "hello");
        let host = MockHost::new().with_preview_handler(".txt", MockHandler::new("{p}"));
        let surface = Arc::new(MockSurface::headless(Size::new(100, 100)));
        let engine = PreviewEngine::new(host.clone(), surface, fast_settings());
        engine.start().unwrap();

        engine.show_preview(Some(&file));
        let session = engine.current_session().unwrap();
        assert!(wait_until(TIMEOUT, || session.info().is_some()));
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(!host.saw(|e| matches!(e, MockEvent::SetWindow(_))));
        assert_eq!(
            engine.display().message,
            Some(PreviewMessages::default().loading)
        );
    }

    #[test]
    fn test_interactive_load_resumes_once_window_appears() {
        let fixtures = Fixtures::new();
        let file = fixtures.file("a.txt", "hello");
        let host = MockHost::new()
            .with_preview_handler(".txt", MockHandler::new("{p}"))
            .with_client_rect(Rect::from_size(Size::new(100, 100)));
        let surface = Arc::new(MockSurface::headless(Size::new(100, 100)));
        let engine = PreviewEngine::new(host.clone(), surface.clone(), fast_settings());
        engine.start().unwrap();
        let infos = engine.subscribe();

        engine.show_preview(Some(&file));
        let session = engine.current_session().unwrap();
        assert!(wait_until(TIMEOUT, || session.info().is_some()));
        std::thread::sleep(std::time::Duration::from_millis(50));
        engine.bounds_changed();
        assert!(!host.saw(|e| matches!(e, MockEvent::SetWindow(_))));

        surface.attach_window(WindowHandle(0x2000));
        engine.bounds_changed();
        assert!(wait_until(TIMEOUT, || loaded(&engine)));
        assert_eq!(host.count(|e| matches!(e, MockEvent::SetWindow(_))), 1);
        assert_eq!(engine.display().mode, PreviewMode::Interactive);
        assert!(infos.recv_timeout(TIMEOUT).is_ok());

        engine.bounds_changed();
        assert!(wait_until(TIMEOUT, || host
            .count(|e| matches!(e, MockEvent::SetRect(r) if *r != Rect::ZERO))
            >= 2));
        assert_eq!(host.count(|e| matches!(e, MockEvent::SetWindow(_))), 1);
        assert!(infos.try_recv().is_err());
    }
}
