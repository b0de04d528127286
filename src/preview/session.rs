//! Preview sessions
//!
//! A session is the unit of work for one previewed file. Its shared half,
//! [`Session`], is visible to the engine and the watchdog; its worker half,
//! `SessionContext`, lives on the session's [`Worker`] thread and exclusively
//! owns the activated handler and the thread's native scope.
//!
//! # Lifecycle
//!
//! ```text
//! created -> negotiating -> interactive-active | thumbnail-ready -> unloading -> terminal
//!                  \________________________\_______ failed
//! ```
//!
//! # Cancellation
//!
//! The engine sets the cancellation flag while holding the display lock.
//! Workers check the flag after every native call that may block, and once
//! more under the display lock right before publishing, so a canceled session
//! never publishes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, info_span, warn};

use super::error::{PreviewError, Result};
use super::listener::Listeners;
use super::negotiator::{self, Handler, Negotiated};
use super::pixels::PixelBuffer;
use super::thumbnail::{self, RenderedThumbnail, ThumbnailRequest};
use super::types::{
    DisplaySnapshot, Phase, PreviewInfo, PreviewMode, PreviewRequest, SessionId, Surface,
};
use super::visuals;
use crate::config::PreviewSettings;
use crate::host::{InitializerKind, PreviewHandler, Rect, ShellHost, ThreadScope};
use crate::worker::{UnloadEntry, UnloadRegistry, Worker, WorkerState};

/// Engine state shared with every session worker
pub(crate) struct EngineShared<H: ShellHost> {
    pub(crate) host: Arc<H>,
    pub(crate) surface: Arc<dyn Surface>,
    pub(crate) display: Mutex<DisplaySnapshot>,
    pub(crate) settings: RwLock<PreviewSettings>,
    pub(crate) listeners: Listeners,
    pub(crate) registry: Arc<UnloadRegistry>,
}

#[derive(Default)]
struct SessionState {
    phase: Phase,
    mode: PreviewMode,
    info: Option<PreviewInfo>,
    has_visuals: bool,
    pixels: Option<Arc<PixelBuffer>>,
    request: Option<ThumbnailRequest>,
    biggest: bool,
    upscale_pending: bool,
    awaiting_window: bool,
    announced: bool,
    failure: Option<PreviewError>,
    unload_started: Option<Instant>,
}

/// Shared view of a preview session
pub struct Session {
    id: SessionId,
    request: PreviewRequest,
    canceled: AtomicBool,
    state: Mutex<SessionState>,
}

impl Session {
    #[must_use]
    pub fn new(id: SessionId, request: PreviewRequest) -> Self {
        Self {
            id,
            request,
            canceled: AtomicBool::new(false),
            state: Mutex::new(SessionState::default()),
        }
    }

    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub const fn request(&self) -> &PreviewRequest {
        &self.request
    }

    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// Mark the session canceled; never reverts
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    #[must_use]
    pub fn mode(&self) -> PreviewMode {
        self.state.lock().mode
    }

    /// Copy of the negotiated preview details
    #[must_use]
    pub fn info(&self) -> Option<PreviewInfo> {
        self.state.lock().info.clone()
    }

    /// Whether the handler accepted visual customization
    #[must_use]
    pub fn has_visuals(&self) -> bool {
        self.state.lock().has_visuals
    }

    #[must_use]
    pub fn pixels(&self) -> Option<Arc<PixelBuffer>> {
        self.state.lock().pixels.clone()
    }

    #[must_use]
    pub fn failure(&self) -> Option<PreviewError> {
        self.state.lock().failure.clone()
    }

    #[must_use]
    pub fn unload_started(&self) -> Option<Instant> {
        self.state.lock().unload_started
    }

    /// Record the start of unloading
    pub fn mark_unloading(&self, now: Instant) {
        let mut state = self.state.lock();
        state.phase = Phase::Unloading;
        state.unload_started = Some(now);
    }

    /// Reserve an upscale for a display area `available_width` pixels wide
    ///
    /// Returns `true` if the current thumbnail is narrower, the handler may
    /// have a bigger one and `wanted` asks it for more than last time. No
    /// second upscale is reserved until the first ran.
    pub(crate) fn reserve_upscale(&self, available_width: u32, wanted: u32) -> bool {
        let mut state = self.state.lock();
        let narrower = state
            .pixels
            .as_ref()
            .is_some_and(|pixels| pixels.width < available_width);
        let larger = state
            .request
            .is_some_and(|last| last.resized(wanted).size > last.size);
        if narrower && larger && !state.biggest && !state.upscale_pending {
            state.upscale_pending = true;
            return true;
        }
        false
    }

    /// Take the pending load of a session that found no window
    pub(crate) fn take_awaiting_window(&self) -> bool {
        std::mem::take(&mut self.state.lock().awaiting_window)
    }

    fn set_phase(&self, phase: Phase) {
        self.state.lock().phase = phase;
    }

    fn set_negotiated(&self, info: PreviewInfo) {
        let mut state = self.state.lock();
        state.mode = if info.interface_type.is_interactive() {
            PreviewMode::Interactive
        } else {
            PreviewMode::Thumbnail
        };
        state.info = Some(info);
    }

    fn set_initializer(&self, kind: Option<InitializerKind>) {
        if let Some(info) = self.state.lock().info.as_mut() {
            info.initializer_type = kind;
        }
    }

    /// Take the one-time announcement; `None` if already announced
    fn take_announcement(&self) -> Option<PreviewInfo> {
        let mut state = self.state.lock();
        if state.announced {
            return None;
        }
        state.announced = true;
        state.info.clone()
    }
}

/// A running session: shared state plus its worker
pub(crate) struct SessionHandle<H: ShellHost> {
    session: Arc<Session>,
    worker: Worker<SessionContext<H>>,
}

impl<H: ShellHost> SessionHandle<H> {
    /// Spawn the session worker and queue negotiation followed by loading
    ///
    /// # Errors
    ///
    /// Returns `PreviewError::WorkerSpawn` if the worker thread cannot be started.
    pub(crate) fn start(
        shared: &Arc<EngineShared<H>>,
        id: SessionId,
        request: PreviewRequest,
    ) -> Result<Arc<Self>> {
        let span = info_span!("session", id = %id, file = %request.path().display());
        let session = Arc::new(Session::new(id, request));

        let context = {
            let shared = Arc::clone(shared);
            let session = Arc::clone(&session);
            move || SessionContext::new(shared, session)
        };
        let worker = Worker::spawn(format!("peekr-session-{}", id.0), span, context)
            .map_err(|e| PreviewError::WorkerSpawn(e.to_string()))?;

        worker.submit(SessionContext::negotiate);
        worker.submit(SessionContext::load);
        info!(session = %id, "session started");

        Ok(Arc::new(Self { session, worker }))
    }

    pub(crate) const fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub(crate) fn submit(&self, task: impl FnOnce(&mut SessionContext<H>) + Send + 'static) -> bool {
        self.worker.submit(task)
    }

    /// Queue teardown and close the worker
    ///
    /// The caller has already canceled the session.
    pub(crate) fn unload(&self, now: Instant) {
        self.session.mark_unloading(now);
        self.worker.submit(SessionContext::unload);
        self.worker.close();
    }
}

impl<H: ShellHost> UnloadEntry for SessionHandle<H> {
    fn id(&self) -> SessionId {
        self.session.id()
    }

    fn unload_started(&self) -> Option<Instant> {
        self.session.unload_started()
    }

    fn worker_finished(&self) -> bool {
        self.worker.is_finished()
    }

    fn wait_finished(&self, timeout: Duration) -> bool {
        self.worker.wait(timeout)
    }

    fn terminate(&self) {
        self.worker.terminate();
    }
}

/// Worker-side session state
///
/// Field order is release order: the handler goes before the thread scope.
pub(crate) struct SessionContext<H: ShellHost> {
    shared: Arc<EngineShared<H>>,
    session: Arc<Session>,
    handler: Option<Handler<H>>,
    initialized: bool,
    done: bool,
    scope: Option<ThreadScope<H>>,
}

impl<H: ShellHost> SessionContext<H> {
    fn new(shared: Arc<EngineShared<H>>, session: Arc<Session>) -> Self {
        Self {
            shared,
            session,
            handler: None,
            initialized: false,
            done: false,
            scope: None,
        }
    }

    fn canceled(&self) -> bool {
        self.session.is_canceled()
    }

    /// Enter the native scope and find a handler
    fn negotiate(&mut self) {
        self.session.set_phase(Phase::Negotiating);
        match ThreadScope::enter(&self.shared.host) {
            Ok(scope) => self.scope = Some(scope),
            Err(e) => return self.fail(PreviewError::ThreadScope(e)),
        }
        if self.canceled() {
            return;
        }

        match negotiator::negotiate(self.shared.host.as_ref(), self.session.request()) {
            Ok(Negotiated { handler, info }) => {
                debug!(interface = %info.interface_type, clsid = %info.clsid, "negotiated");
                self.initialized = !handler.needs_initialization();
                self.session.set_negotiated(info);
                self.handler = Some(handler);
            }
            Err(e) => self.fail(e),
        }
    }

    /// Render the negotiated handler and announce the session
    pub(crate) fn load(&mut self) {
        if self.done || self.canceled() {
            return;
        }
        let interactive = match &self.handler {
            Some(handler) => handler.kind().is_interactive(),
            None => return,
        };
        let result = if interactive {
            self.load_interactive()
        } else {
            self.load_thumbnail()
        };
        match result {
            Ok(true) => self.announce(),
            Ok(false) => {}
            Err(e) => self.fail(e),
        }
    }

    /// Re-request a bigger thumbnail after the display grew
    pub(crate) fn upscale(&mut self) {
        self.session.state.lock().upscale_pending = false;
        if self.done || self.canceled() {
            return;
        }
        if let Err(e) = self.load_thumbnail() {
            warn!(error = %e, "keeping current thumbnail, upscale failed");
        }
    }

    /// Follow the surface window's client area
    pub(crate) fn update_rect(&mut self) {
        if self.canceled() {
            return;
        }
        let (Some(Handler::Interactive(handler)), Some(window)) =
            (&self.handler, self.shared.surface.window())
        else {
            return;
        };
        if let Err(e) = handler.set_rect(self.shared.host.client_rect(window)) {
            warn!(error = %e, "set_rect failed");
        }
    }

    pub(crate) fn focus(&mut self) {
        if let Some(Handler::Interactive(handler)) = &self.handler {
            if let Err(e) = handler.set_focus() {
                warn!(error = %e, "set_focus failed");
            }
        }
    }

    /// Detach from the window and release the handler
    fn unload(&mut self) {
        if let Some(handler) = self.handler.take() {
            match &handler {
                Handler::Interactive(preview) => {
                    if let Err(e) = preview.set_rect(Rect::ZERO) {
                        warn!(error = %e, "clearing rect failed during unload");
                    }
                    self.shared.surface.request_repaint();
                    if let Err(e) = preview.unload() {
                        warn!(error = %e, "unload failed");
                    }
                }
                Handler::Thumbnail(_) | Handler::ImageFactory(_) => {
                    self.session.state.lock().pixels = None;
                }
            }
            drop(handler);
        }
        self.done = true;
    }

    fn ensure_initialized(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        let Some(handler) = &self.handler else {
            return Ok(());
        };
        let kind = handler.initialize(self.shared.host.as_ref(), self.session.request().path())?;
        self.initialized = true;
        self.session.set_initializer(kind);
        Ok(())
    }

    fn load_interactive(&mut self) -> Result<bool> {
        let Some(window) = self.shared.surface.window() else {
            debug!("surface has no window yet, deferring interactive load");
            self.session.state.lock().awaiting_window = true;
            return Ok(false);
        };

        self.ensure_initialized()?;
        if self.canceled() {
            return Ok(false);
        }

        let Some(Handler::Interactive(handler)) = &self.handler else {
            return Ok(false);
        };
        let settings = self.shared.settings.read().clone();

        handler
            .set_window(window, Rect::ZERO)
            .map_err(PreviewError::RenderFailed)?;
        if let Some(handler_visuals) = handler.visuals() {
            self.session.state.lock().has_visuals = true;
            visuals::apply(&handler_visuals, &settings);
        }
        if self.canceled() {
            return Ok(false);
        }

        handler.do_preview().map_err(PreviewError::RenderFailed)?;
        if self.canceled() {
            return Ok(false);
        }

        handler
            .set_rect(self.shared.host.client_rect(window))
            .map_err(PreviewError::RenderFailed)?;

        Ok(self.publish(|session, display| {
            session.state.lock().phase = Phase::InteractiveActive;
            *display = DisplaySnapshot {
                mode: PreviewMode::Interactive,
                message: None,
                pixels: None,
            };
        }))
    }

    fn load_thumbnail(&mut self) -> Result<bool> {
        self.ensure_initialized()?;
        if self.canceled() {
            return Ok(false);
        }

        let size = thumbnail::thumbnail_size(self.shared.surface.bounds());
        let Some(handler) = &self.handler else {
            return Ok(false);
        };
        let rendered = thumbnail::render(handler, size)?;
        Ok(self.publish_thumbnail(rendered))
    }

    fn publish_thumbnail(&self, rendered: RenderedThumbnail) -> bool {
        let biggest = rendered.is_biggest();
        let request = rendered.request;
        let pixels = Arc::new(rendered.pixels);

        self.publish(|session, display| {
            let mut state = session.state.lock();
            state.phase = Phase::ThumbnailReady;
            state.pixels = Some(Arc::clone(&pixels));
            state.request = Some(request);
            state.biggest = biggest;
            drop(state);

            *display = DisplaySnapshot {
                mode: PreviewMode::Thumbnail,
                message: None,
                pixels: Some(pixels),
            };
        })
    }

    /// Apply `update` under the display lock unless canceled, then repaint
    fn publish(&self, update: impl FnOnce(&Session, &mut DisplaySnapshot)) -> bool {
        let mut display = self.shared.display.lock();
        if self.canceled() {
            debug!("canceled, discarding result");
            return false;
        }
        update(&self.session, &mut display);
        drop(display);

        self.shared.surface.request_repaint();
        true
    }

    fn announce(&self) {
        if self.canceled() {
            return;
        }
        if let Some(info) = self.session.take_announcement() {
            info!(interface = %info.interface_type, "preview loaded");
            self.shared.listeners.emit(&info);
        }
    }

    /// Record the failure, show its message and release the handler
    fn fail(&mut self, error: PreviewError) {
        warn!(error = %error, "preview failed");
        let message = error.user_message(&self.shared.settings.read().messages);

        let published = self.publish(|session, display| {
            *display = DisplaySnapshot::message(message);
            session.state.lock().mode = PreviewMode::None;
        });
        {
            let mut state = self.session.state.lock();
            if !matches!(state.phase, Phase::Unloading) {
                state.phase = Phase::Failed;
            }
            state.failure = Some(error);
        }
        if !published {
            debug!("failure not shown, session was canceled");
        }

        self.handler = None;
        self.done = true;
    }
}

impl<H: ShellHost> WorkerState for SessionContext<H> {
    fn on_panic(&mut self, message: String) {
        self.fail(PreviewError::WorkerPanicked(message));
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn on_exit(&mut self) {
        self.handler = None;
        self.scope = None;
        if self.shared.registry.remove(self.session.id()) || self.session.is_canceled() {
            self.session.set_phase(Phase::Terminal);
        }
        info!(session = %self.session.id(), "session closed");
    }
}
