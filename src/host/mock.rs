//! Scriptable in-process shell host
//!
//! `MockHost` stands in for the operating system's shell: extensions are mapped
//! to scripted handlers, every native call is recorded as a [`MockEvent`], and
//! live handles are counted so callers can verify that everything acquired was
//! released. `MockSurface` is the matching rendering surface.
//!
//! Useful for testing the preview engine without Windows, and for embedders
//! that want to exercise their UI integration on other platforms.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;

use super::{
    AlphaType, ClassId, ColorRef, HostError, HostResult, ImageFactory, ImageFlags, Initialize,
    InitializerKind, InterfaceKind, LogFont, NativeBitmap, PreviewHandler, PreviewVisuals, Rect,
    ShellHost, Size, ThumbnailProvider, WindowHandle,
};
use crate::preview::Surface;

/// `E_FAIL`
const REJECTED_CODE: u32 = 0x8000_4005;

/// A native call observed by the mock host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    EnterThread,
    LeaveThread,
    Activate { class_id: ClassId, kind: InterfaceKind },
    ResolveItem(PathBuf),
    ImageFactoryAcquired,
    StreamOpened,
    Initialized(InitializerKind),
    InitializeRejected(InitializerKind),
    SetWindow(Rect),
    SetRect(Rect),
    DoPreview,
    Unload,
    SetFocus,
    BackgroundColor(ColorRef),
    TextColor(ColorRef),
    Font(LogFont),
    GetThumbnail(u32),
    GetImage(Size, ImageFlags),
    BitmapDeleted,
    /// A handle was released, with the name of the releasing thread
    Released { kind: MockObject, thread: Option<String> },
}

/// Kind of handle the mock hands out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockObject {
    PreviewHandler,
    ThumbnailProvider,
    ImageFactory,
    Visuals,
    Item,
    Stream,
}

/// Bitmap contents a mock handler renders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockImage {
    pub width: u32,
    pub height: u32,
    pub alpha: AlphaType,
    /// Fill color in native BGRA order
    pub bgra: [u8; 4],
}

impl MockImage {
    #[must_use]
    pub const fn new(width: u32, height: u32, alpha: AlphaType) -> Self {
        Self {
            width,
            height,
            alpha,
            bgra: [0x30, 0x60, 0x90, 0x00],
        }
    }

    #[must_use]
    pub const fn with_bgra(mut self, bgra: [u8; 4]) -> Self {
        self.bgra = bgra;
        self
    }

    fn pixels(&self) -> Vec<u8> {
        self.bgra
            .iter()
            .copied()
            .cycle()
            .take(self.width as usize * self.height as usize * 4)
            .collect()
    }
}

/// Scripted behavior of one registered handler
#[derive(Debug, Clone)]
pub struct MockHandler {
    class_id: ClassId,
    name: Option<String>,
    exposes: Vec<InitializerKind>,
    accepts: Vec<InitializerKind>,
    transient_failures: Arc<AtomicUsize>,
    activation_error: Option<HostError>,
    visuals: bool,
    image: MockImage,
    render_error: Option<HostError>,
    preview_gate: Option<Receiver<()>>,
    unload_gate: Option<Receiver<()>>,
}

impl MockHandler {
    /// Handler exposing all three input methods and accepting only streams
    #[must_use]
    pub fn new(class_id: &str) -> Self {
        Self {
            class_id: ClassId::new(class_id),
            name: None,
            exposes: InitializerKind::PRIORITY.to_vec(),
            accepts: vec![InitializerKind::Stream],
            transient_failures: Arc::new(AtomicUsize::new(0)),
            activation_error: None,
            visuals: false,
            image: MockImage::new(256, 256, AlphaType::Argb),
            render_error: None,
            preview_gate: None,
            unload_gate: None,
        }
    }

    #[must_use]
    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Input methods the handler exposes at all
    #[must_use]
    pub fn exposing(mut self, kinds: &[InitializerKind]) -> Self {
        self.exposes = kinds.to_vec();
        self
    }

    /// Input methods whose initialize call succeeds
    #[must_use]
    pub fn accepting(mut self, kinds: &[InitializerKind]) -> Self {
        self.accepts = kinds.to_vec();
        self
    }

    /// Fail the next `times` activations with the transient server failure
    #[must_use]
    pub fn failing_transiently(self, times: usize) -> Self {
        self.transient_failures.store(times, Ordering::SeqCst);
        self
    }

    #[must_use]
    pub fn failing_activation(mut self, error: HostError) -> Self {
        self.activation_error = Some(error);
        self
    }

    #[must_use]
    pub const fn with_visuals(mut self) -> Self {
        self.visuals = true;
        self
    }

    #[must_use]
    pub const fn rendering(mut self, image: MockImage) -> Self {
        self.image = image;
        self
    }

    #[must_use]
    pub fn failing_render(mut self, error: HostError) -> Self {
        self.render_error = Some(error);
        self
    }

    /// Block `do_preview` until the gate receives a value or disconnects
    #[must_use]
    pub fn blocking_preview(mut self, gate: Receiver<()>) -> Self {
        self.preview_gate = Some(gate);
        self
    }

    /// Block `unload` until the gate receives a value or disconnects
    #[must_use]
    pub fn blocking_unload(mut self, gate: Receiver<()>) -> Self {
        self.unload_gate = Some(gate);
        self
    }
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<MockEvent>>,
    live: AtomicUsize,
}

impl Recorder {
    fn record(&self, event: MockEvent) {
        self.events.lock().push(event);
    }

    fn acquire(&self) {
        self.live.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self, kind: MockObject) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        self.record(MockEvent::Released {
            kind,
            thread: thread::current().name().map(str::to_string),
        });
    }
}

/// Scriptable [`ShellHost`]
#[derive(Clone, Default)]
pub struct MockHost {
    previews: Arc<Mutex<HashMap<String, MockHandler>>>,
    thumbnails: Arc<Mutex<HashMap<String, MockHandler>>>,
    factories: Arc<Mutex<HashMap<String, MockImage>>>,
    client: Arc<Mutex<Rect>>,
    recorder: Arc<Recorder>,
}

impl MockHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an interactive preview handler for an extension such as `.txt`
    #[must_use]
    pub fn with_preview_handler(self, extension: &str, handler: MockHandler) -> Self {
        self.previews.lock().insert(extension.to_lowercase(), handler);
        self
    }

    /// Register a thumbnail provider for an extension
    #[must_use]
    pub fn with_thumbnail_provider(self, extension: &str, handler: MockHandler) -> Self {
        self.thumbnails.lock().insert(extension.to_lowercase(), handler);
        self
    }

    /// Give shell items with this extension an image factory
    #[must_use]
    pub fn with_image_factory(self, extension: &str, image: MockImage) -> Self {
        self.factories.lock().insert(extension.to_lowercase(), image);
        self
    }

    /// Client rectangle reported for any window
    #[must_use]
    pub fn with_client_rect(self, rect: Rect) -> Self {
        *self.client.lock() = rect;
        self
    }

    /// All native calls observed so far
    #[must_use]
    pub fn events(&self) -> Vec<MockEvent> {
        self.recorder.events.lock().clone()
    }

    /// Whether any recorded event satisfies `predicate`
    pub fn saw(&self, predicate: impl Fn(&MockEvent) -> bool) -> bool {
        self.recorder.events.lock().iter().any(predicate)
    }

    /// Number of recorded events satisfying `predicate`
    pub fn count(&self, predicate: impl Fn(&MockEvent) -> bool) -> usize {
        self.recorder.events.lock().iter().filter(|e| predicate(e)).count()
    }

    /// Handles acquired and not yet released
    #[must_use]
    pub fn live_objects(&self) -> usize {
        self.recorder.live.load(Ordering::SeqCst)
    }

    fn activate(
        &self,
        registry: &Mutex<HashMap<String, MockHandler>>,
        class_id: &ClassId,
        kind: InterfaceKind,
    ) -> HostResult<MockHandler> {
        self.recorder.record(MockEvent::Activate {
            class_id: class_id.clone(),
            kind,
        });
        let handler = registry
            .lock()
            .values()
            .find(|h| &h.class_id == class_id)
            .cloned()
            .ok_or(HostError::Call { code: 0x8004_0154 })?;

        let pending = handler.transient_failures.load(Ordering::SeqCst);
        if pending > 0 {
            handler.transient_failures.store(pending - 1, Ordering::SeqCst);
            return Err(HostError::ServerExecFailure);
        }
        if let Some(error) = &handler.activation_error {
            return Err(error.clone());
        }
        self.recorder.acquire();
        Ok(handler)
    }
}

fn extension_key(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or_else(|| "*".to_string(), |e| format!(".{}", e.to_lowercase()))
}

impl ShellHost for MockHost {
    type Stream = MockStream;
    type Item = MockItem;
    type Bitmap = MockBitmap;
    type Visuals = MockVisuals;
    type Preview = MockPreviewHandler;
    type Thumbnail = MockThumbnailProvider;
    type Factory = MockImageFactory;

    fn enter_thread(&self) -> HostResult<()> {
        self.recorder.record(MockEvent::EnterThread);
        Ok(())
    }

    fn leave_thread(&self) {
        self.recorder.record(MockEvent::LeaveThread);
    }

    fn query_association(&self, extension: &str, kind: InterfaceKind) -> Option<ClassId> {
        let key = extension.to_lowercase();
        match kind {
            InterfaceKind::PreviewHandler => self.previews.lock().get(&key).map(|h| h.class_id.clone()),
            InterfaceKind::ThumbnailProvider => {
                self.thumbnails.lock().get(&key).map(|h| h.class_id.clone())
            }
            InterfaceKind::ShellItemImageFactory => None,
        }
    }

    fn handler_name(&self, class_id: &ClassId) -> Option<String> {
        let previews = self.previews.lock();
        let thumbnails = self.thumbnails.lock();
        previews
            .values()
            .chain(thumbnails.values())
            .find(|h| &h.class_id == class_id)
            .and_then(|h| h.name.clone())
    }

    fn activate_preview_handler(&self, class_id: &ClassId) -> HostResult<Self::Preview> {
        let script = self.activate(&self.previews, class_id, InterfaceKind::PreviewHandler)?;
        Ok(MockPreviewHandler {
            script,
            recorder: Arc::clone(&self.recorder),
        })
    }

    fn activate_thumbnail_provider(&self, class_id: &ClassId) -> HostResult<Self::Thumbnail> {
        let script = self.activate(&self.thumbnails, class_id, InterfaceKind::ThumbnailProvider)?;
        Ok(MockThumbnailProvider {
            script,
            recorder: Arc::clone(&self.recorder),
        })
    }

    fn resolve_item(&self, path: &Path) -> HostResult<Self::Item> {
        self.recorder.record(MockEvent::ResolveItem(path.to_path_buf()));
        self.recorder.acquire();
        Ok(MockItem {
            path: path.to_path_buf(),
            recorder: Arc::clone(&self.recorder),
        })
    }

    fn image_factory(&self, item: &Self::Item) -> HostResult<Self::Factory> {
        let image = self
            .factories
            .lock()
            .get(&extension_key(&item.path))
            .cloned()
            .ok_or(HostError::NoInterface)?;
        self.recorder.record(MockEvent::ImageFactoryAcquired);
        self.recorder.acquire();
        Ok(MockImageFactory {
            image,
            recorder: Arc::clone(&self.recorder),
        })
    }

    fn open_stream(&self, path: &Path) -> HostResult<Self::Stream> {
        if !path.exists() {
            return Err(HostError::Call { code: 0x8007_0002 });
        }
        self.recorder.record(MockEvent::StreamOpened);
        self.recorder.acquire();
        Ok(MockStream {
            recorder: Arc::clone(&self.recorder),
        })
    }

    fn client_rect(&self, _window: WindowHandle) -> Rect {
        *self.client.lock()
    }
}

pub struct MockStream {
    recorder: Arc<Recorder>,
}

impl Drop for MockStream {
    fn drop(&mut self) {
        self.recorder.release(MockObject::Stream);
    }
}

pub struct MockItem {
    path: PathBuf,
    recorder: Arc<Recorder>,
}

impl Drop for MockItem {
    fn drop(&mut self) {
        self.recorder.release(MockObject::Item);
    }
}

pub struct MockBitmap {
    image: MockImage,
    recorder: Arc<Recorder>,
}

impl NativeBitmap for MockBitmap {
    fn size(&self) -> HostResult<Size> {
        Ok(Size::new(self.image.width, self.image.height))
    }

    fn read_bgra(&self, _size: Size) -> HostResult<Vec<u8>> {
        Ok(self.image.pixels())
    }
}

impl Drop for MockBitmap {
    fn drop(&mut self) {
        self.recorder.record(MockEvent::BitmapDeleted);
    }
}

fn initialize(recorder: &Recorder, script: &MockHandler, kind: InitializerKind) -> HostResult<()> {
    if !script.exposes.contains(&kind) {
        return Err(HostError::NoInterface);
    }
    if script.accepts.contains(&kind) {
        recorder.record(MockEvent::Initialized(kind));
        Ok(())
    } else {
        recorder.record(MockEvent::InitializeRejected(kind));
        Err(HostError::Call {
            code: REJECTED_CODE,
        })
    }
}

macro_rules! mock_initialize {
    ($ty:ty) => {
        impl Initialize<MockHost> for $ty {
            fn supports(&self, kind: InitializerKind) -> bool {
                self.script.exposes.contains(&kind)
            }

            fn initialize_with_stream(&self, _stream: &MockStream) -> HostResult<()> {
                initialize(&self.recorder, &self.script, InitializerKind::Stream)
            }

            fn initialize_with_file(&self, _path: &Path) -> HostResult<()> {
                initialize(&self.recorder, &self.script, InitializerKind::File)
            }

            fn initialize_with_item(&self, _item: &MockItem) -> HostResult<()> {
                initialize(&self.recorder, &self.script, InitializerKind::Item)
            }
        }
    };
}

pub struct MockPreviewHandler {
    script: MockHandler,
    recorder: Arc<Recorder>,
}

mock_initialize!(MockPreviewHandler);

impl PreviewHandler<MockHost> for MockPreviewHandler {
    fn set_window(&self, _window: WindowHandle, rect: Rect) -> HostResult<()> {
        self.recorder.record(MockEvent::SetWindow(rect));
        Ok(())
    }

    fn set_rect(&self, rect: Rect) -> HostResult<()> {
        self.recorder.record(MockEvent::SetRect(rect));
        Ok(())
    }

    fn do_preview(&self) -> HostResult<()> {
        if let Some(gate) = &self.script.preview_gate {
            let _ = gate.recv();
        }
        if let Some(error) = &self.script.render_error {
            return Err(error.clone());
        }
        self.recorder.record(MockEvent::DoPreview);
        Ok(())
    }

    fn unload(&self) -> HostResult<()> {
        if let Some(gate) = &self.script.unload_gate {
            let _ = gate.recv();
        }
        self.recorder.record(MockEvent::Unload);
        Ok(())
    }

    fn set_focus(&self) -> HostResult<()> {
        self.recorder.record(MockEvent::SetFocus);
        Ok(())
    }

    fn visuals(&self) -> Option<MockVisuals> {
        self.script.visuals.then(|| {
            self.recorder.acquire();
            MockVisuals {
                recorder: Arc::clone(&self.recorder),
            }
        })
    }
}

impl Drop for MockPreviewHandler {
    fn drop(&mut self) {
        self.recorder.release(MockObject::PreviewHandler);
    }
}

pub struct MockVisuals {
    recorder: Arc<Recorder>,
}

impl PreviewVisuals for MockVisuals {
    fn set_background_color(&self, color: ColorRef) -> HostResult<()> {
        self.recorder.record(MockEvent::BackgroundColor(color));
        Ok(())
    }

    fn set_text_color(&self, color: ColorRef) -> HostResult<()> {
        self.recorder.record(MockEvent::TextColor(color));
        Ok(())
    }

    fn set_font(&self, font: &LogFont) -> HostResult<()> {
        self.recorder.record(MockEvent::Font(font.clone()));
        Ok(())
    }
}

impl Drop for MockVisuals {
    fn drop(&mut self) {
        self.recorder.release(MockObject::Visuals);
    }
}

pub struct MockThumbnailProvider {
    script: MockHandler,
    recorder: Arc<Recorder>,
}

mock_initialize!(MockThumbnailProvider);

impl ThumbnailProvider<MockHost> for MockThumbnailProvider {
    fn get_thumbnail(&self, size: u32) -> HostResult<(MockBitmap, AlphaType)> {
        self.recorder.record(MockEvent::GetThumbnail(size));
        if let Some(error) = &self.script.render_error {
            return Err(error.clone());
        }
        let image = self.script.image.clone();
        let alpha = image.alpha;
        Ok((
            MockBitmap {
                image,
                recorder: Arc::clone(&self.recorder),
            },
            alpha,
        ))
    }
}

impl Drop for MockThumbnailProvider {
    fn drop(&mut self) {
        self.recorder.release(MockObject::ThumbnailProvider);
    }
}

pub struct MockImageFactory {
    image: MockImage,
    recorder: Arc<Recorder>,
}

impl ImageFactory<MockHost> for MockImageFactory {
    fn get_image(&self, size: Size, flags: ImageFlags) -> HostResult<MockBitmap> {
        self.recorder.record(MockEvent::GetImage(size, flags));
        Ok(MockBitmap {
            image: self.image.clone(),
            recorder: Arc::clone(&self.recorder),
        })
    }
}

impl Drop for MockImageFactory {
    fn drop(&mut self) {
        self.recorder.release(MockObject::ImageFactory);
    }
}

/// Rendering surface that records repaint requests
pub struct MockSurface {
    window: Mutex<Option<WindowHandle>>,
    bounds: Mutex<Size>,
    repaints: AtomicUsize,
    repaint_tx: Sender<()>,
    repaint_rx: Receiver<()>,
}

impl MockSurface {
    /// Surface backed by a (fake) native window
    #[must_use]
    pub fn new(bounds: Size) -> Self {
        Self::build(Some(WindowHandle(0x1000)), bounds)
    }

    /// Surface without a native window, as used by headless callers
    #[must_use]
    pub fn headless(bounds: Size) -> Self {
        Self::build(None, bounds)
    }

    fn build(window: Option<WindowHandle>, bounds: Size) -> Self {
        let (repaint_tx, repaint_rx) = unbounded();
        Self {
            window: Mutex::new(window),
            bounds: Mutex::new(bounds),
            repaints: AtomicUsize::new(0),
            repaint_tx,
            repaint_rx,
        }
    }

    pub fn resize(&self, bounds: Size) {
        *self.bounds.lock() = bounds;
    }

    /// Give a headless surface its native window
    pub fn attach_window(&self, window: WindowHandle) {
        *self.window.lock() = Some(window);
    }

    #[must_use]
    pub fn repaint_count(&self) -> usize {
        self.repaints.load(Ordering::SeqCst)
    }

    /// Wait for the next repaint request
    #[must_use]
    pub fn wait_for_repaint(&self, timeout: Duration) -> bool {
        self.repaint_rx.recv_timeout(timeout).is_ok()
    }
}

impl Surface for MockSurface {
    fn window(&self) -> Option<WindowHandle> {
        *self.window.lock()
    }

    fn bounds(&self) -> Size {
        *self.bounds.lock()
    }

    fn request_repaint(&self) {
        self.repaints.fetch_add(1, Ordering::SeqCst);
        let _ = self.repaint_tx.send(());
    }
}

/// Poll `condition` until it holds or `timeout` elapses
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
}
