//! Shell extension host abstraction
//!
//! The preview core never talks to the operating system directly. Everything it
//! needs from the shell (association lookups, component activation, handler
//! initialization, bitmap retrieval) goes through the [`ShellHost`] trait family
//! defined here.
//!
//! # Implementations
//!
//! - **`windows`**: the real host built on the `windows` crate (Windows only)
//! - **`mock`**: a scriptable in-process host for tests and non-Windows embedders
//!
//! # Ownership
//!
//! Every handle returned by a host is an owned value. Dropping it releases the
//! underlying native object, so scoped ownership gives release on every exit
//! path, including failure and cancellation branches.

pub mod mock;
#[cfg(windows)]
pub mod windows;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// `CO_E_SERVER_EXEC_FAILURE`
pub const SERVER_EXEC_FAILURE_CODE: u32 = 0x8008_0005;

/// `E_NOINTERFACE`
pub const NO_INTERFACE_CODE: u32 = 0x8000_4002;

/// Errors reported by native shell calls
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    /// Out-of-process server failed to start; known to succeed on a second try
    #[error("Server execution failed (0x{code:08x})", code = SERVER_EXEC_FAILURE_CODE)]
    ServerExecFailure,

    /// The component does not expose the requested capability
    #[error("Interface not supported (0x{code:08x})", code = NO_INTERFACE_CODE)]
    NoInterface,

    /// Any other failed native call
    #[error("Native call failed (0x{code:08x})")]
    Call {
        /// Raw failure code
        code: u32,
    },

    /// The host cannot service the request at all
    #[error("Host unavailable: {0}")]
    Unavailable(String),
}

impl HostError {
    /// Raw failure code as reported by the shell
    #[must_use]
    pub const fn code(&self) -> u32 {
        match self {
            Self::ServerExecFailure => SERVER_EXEC_FAILURE_CODE,
            Self::NoInterface => NO_INTERFACE_CODE,
            Self::Call { code } => *code,
            Self::Unavailable(_) => 0x8000_4005,
        }
    }

    /// Build an error from a raw failure code
    #[must_use]
    pub const fn from_code(code: u32) -> Self {
        match code {
            SERVER_EXEC_FAILURE_CODE => Self::ServerExecFailure,
            NO_INTERFACE_CODE => Self::NoInterface,
            code => Self::Call { code },
        }
    }

    /// Whether retrying the same activation may succeed
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::ServerExecFailure)
    }
}

/// Result type for host operations
pub type HostResult<T> = std::result::Result<T, HostError>;

/// Component identifier (a CLSID in registry string form)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassId(String);

impl ClassId {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Capability a file-type handler can be asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterfaceKind {
    /// Live preview painted by the handler into a host window region
    #[serde(rename = "IPreviewHandler")]
    PreviewHandler,
    /// Single rendered bitmap from a registered provider
    #[serde(rename = "IThumbnailProvider")]
    ThumbnailProvider,
    /// Bitmap produced by the shell item itself
    #[serde(rename = "IShellItemImageFactory")]
    ShellItemImageFactory,
}

impl InterfaceKind {
    /// Native interface name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::PreviewHandler => "IPreviewHandler",
            Self::ThumbnailProvider => "IThumbnailProvider",
            Self::ShellItemImageFactory => "IShellItemImageFactory",
        }
    }

    /// Interface identifier in registry string form
    #[must_use]
    pub const fn iid(self) -> &'static str {
        match self {
            Self::PreviewHandler => "{8895b1c6-b41f-4c1c-a562-0d564250836f}",
            Self::ThumbnailProvider => "{e357fccd-a995-4576-b01f-234630154e96}",
            Self::ShellItemImageFactory => "{bcc18b79-ba16-442f-80c4-8a59c30c463b}",
        }
    }

    /// Whether the handler paints directly into the host window
    #[must_use]
    pub const fn is_interactive(self) -> bool {
        matches!(self, Self::PreviewHandler)
    }
}

impl fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Input method a handler accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InitializerKind {
    #[serde(rename = "IInitializeWithStream")]
    Stream,
    #[serde(rename = "IInitializeWithFile")]
    File,
    #[serde(rename = "IInitializeWithItem")]
    Item,
}

impl InitializerKind {
    /// Fixed negotiation order
    pub const PRIORITY: [Self; 3] = [Self::Stream, Self::File, Self::Item];

    /// Native interface name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Stream => "IInitializeWithStream",
            Self::File => "IInitializeWithFile",
            Self::Item => "IInitializeWithItem",
        }
    }
}

impl fmt::Display for InitializerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Alpha format hint returned alongside a thumbnail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlphaType {
    #[default]
    Unknown,
    /// Color data only; the alpha byte is undefined
    Rgb,
    /// Alpha channel is meaningful
    Argb,
}

impl AlphaType {
    /// Map a `WTS_ALPHATYPE` value
    #[must_use]
    pub const fn from_raw(value: i32) -> Self {
        match value {
            1 => Self::Rgb,
            2 => Self::Argb,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub const fn has_alpha(self) -> bool {
        matches!(self, Self::Argb)
    }
}

/// Opaque native window handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub isize);

/// Rectangle in window client coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    /// Empty rectangle used to detach a handler from the window
    pub const ZERO: Self = Self {
        left: 0,
        top: 0,
        right: 0,
        bottom: 0,
    };

    #[must_use]
    pub const fn from_size(size: Size) -> Self {
        Self {
            left: 0,
            top: 0,
            right: size.width as i32,
            bottom: size.height as i32,
        }
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        (self.right - self.left).unsigned_abs()
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        (self.bottom - self.top).unsigned_abs()
    }
}

/// Width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[must_use]
    pub const fn square(side: u32) -> Self {
        Self::new(side, side)
    }

    /// Larger of the two dimensions
    #[must_use]
    pub const fn max_side(&self) -> u32 {
        if self.width > self.height {
            self.width
        } else {
            self.height
        }
    }
}

/// Flags for [`ImageFactory::get_image`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageFlags(u32);

impl ImageFlags {
    /// `SIIGBF_BIGGERSIZEOK`
    pub const BIGGER_SIZE_OK: Self = Self(0x01);
    /// `SIIGBF_THUMBNAILONLY`
    pub const THUMBNAIL_ONLY: Self = Self(0x08);

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for ImageFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// 24-bit native color reference (`0x00BBGGRR`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorRef(pub u32);

/// Native logical font fields handed to preview handlers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFont {
    pub height: i32,
    pub weight: i32,
    pub italic: bool,
    /// Face name, NUL terminated within the fixed native buffer
    pub face_name: [u16; LogFont::FACE_SIZE],
}

impl LogFont {
    /// `LF_FACESIZE`
    pub const FACE_SIZE: usize = 32;

    /// Face name up to the terminator
    #[must_use]
    pub fn face(&self) -> String {
        let end = self
            .face_name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(Self::FACE_SIZE);
        String::from_utf16_lossy(&self.face_name[..end])
    }
}

/// The operating system's shell extension service
///
/// Every method may block and is only ever called from a session's worker
/// thread, after [`ShellHost::enter_thread`] succeeded on that thread.
pub trait ShellHost: Send + Sync + 'static {
    /// Read-only byte stream over a file
    type Stream;
    /// Abstract shell item
    type Item;
    /// Native bitmap; dropping it deletes the bitmap
    type Bitmap: NativeBitmap;
    /// Visual customization capability of an interactive handler
    type Visuals: PreviewVisuals;
    /// Interactive preview handler
    type Preview: PreviewHandler<Self>;
    /// Registered thumbnail provider
    type Thumbnail: ThumbnailProvider<Self>;
    /// Shell item image factory
    type Factory: ImageFactory<Self>;

    /// Initialize the native subsystem for the calling thread
    ///
    /// # Errors
    ///
    /// Returns `HostError` if the thread cannot be initialized.
    fn enter_thread(&self) -> HostResult<()>;

    /// Release the calling thread's native subsystem initialization
    fn leave_thread(&self);

    /// Component registered for `extension` under the capability `kind`
    fn query_association(&self, extension: &str, kind: InterfaceKind) -> Option<ClassId>;

    /// Display name registered for a component
    fn handler_name(&self, _class_id: &ClassId) -> Option<String> {
        None
    }

    /// Activate an interactive preview handler
    ///
    /// # Errors
    ///
    /// Returns `HostError::ServerExecFailure` for the transient activation
    /// failure, any other `HostError` otherwise.
    fn activate_preview_handler(&self, class_id: &ClassId) -> HostResult<Self::Preview>;

    /// Activate a thumbnail provider
    ///
    /// # Errors
    ///
    /// Same contract as [`ShellHost::activate_preview_handler`].
    fn activate_thumbnail_provider(&self, class_id: &ClassId) -> HostResult<Self::Thumbnail>;

    /// Resolve a file system path into a shell item
    ///
    /// # Errors
    ///
    /// Returns `HostError` if the shell cannot parse the path.
    fn resolve_item(&self, path: &Path) -> HostResult<Self::Item>;

    /// Ask a shell item for its image factory
    ///
    /// # Errors
    ///
    /// Returns `HostError::NoInterface` if the item has none.
    fn image_factory(&self, item: &Self::Item) -> HostResult<Self::Factory>;

    /// Open a read-only byte stream over a file
    ///
    /// # Errors
    ///
    /// Returns `HostError` if the file cannot be opened.
    fn open_stream(&self, path: &Path) -> HostResult<Self::Stream>;

    /// Client area of a native window
    fn client_rect(&self, window: WindowHandle) -> Rect;
}

/// Input methods a handler may accept
pub trait Initialize<H: ShellHost + ?Sized> {
    /// Whether the handler exposes the given input method at all
    fn supports(&self, kind: InitializerKind) -> bool;

    /// # Errors
    ///
    /// Returns `HostError` if the handler rejects the stream.
    fn initialize_with_stream(&self, stream: &H::Stream) -> HostResult<()>;

    /// # Errors
    ///
    /// Returns `HostError` if the handler rejects the path.
    fn initialize_with_file(&self, path: &Path) -> HostResult<()>;

    /// # Errors
    ///
    /// Returns `HostError` if the handler rejects the item.
    fn initialize_with_item(&self, item: &H::Item) -> HostResult<()>;
}

/// Handler that paints its own content into a host window
pub trait PreviewHandler<H: ShellHost + ?Sized>: Initialize<H> {
    /// # Errors
    ///
    /// Returns `HostError` if the native call fails.
    fn set_window(&self, window: WindowHandle, rect: Rect) -> HostResult<()>;

    /// # Errors
    ///
    /// Returns `HostError` if the native call fails.
    fn set_rect(&self, rect: Rect) -> HostResult<()>;

    /// # Errors
    ///
    /// Returns `HostError` if the handler cannot render.
    fn do_preview(&self) -> HostResult<()>;

    /// # Errors
    ///
    /// Returns `HostError` if the native call fails.
    fn unload(&self) -> HostResult<()>;

    /// # Errors
    ///
    /// Returns `HostError` if the native call fails.
    fn set_focus(&self) -> HostResult<()>;

    /// Visual customization capability, if the handler exposes one
    fn visuals(&self) -> Option<H::Visuals>;
}

/// Colors and font an interactive handler lets the host choose
pub trait PreviewVisuals {
    /// # Errors
    ///
    /// Returns `HostError` if the native call fails.
    fn set_background_color(&self, color: ColorRef) -> HostResult<()>;

    /// # Errors
    ///
    /// Returns `HostError` if the native call fails.
    fn set_text_color(&self, color: ColorRef) -> HostResult<()>;

    /// # Errors
    ///
    /// Returns `HostError` if the native call fails.
    fn set_font(&self, font: &LogFont) -> HostResult<()>;
}

/// Registered thumbnail provider
pub trait ThumbnailProvider<H: ShellHost + ?Sized>: Initialize<H> {
    /// Render a thumbnail whose larger side is at most `size`
    ///
    /// # Errors
    ///
    /// Returns `HostError` if the provider cannot render.
    fn get_thumbnail(&self, size: u32) -> HostResult<(H::Bitmap, AlphaType)>;
}

/// Image factory of a shell item
pub trait ImageFactory<H: ShellHost + ?Sized> {
    /// # Errors
    ///
    /// Returns `HostError` if no image is available.
    fn get_image(&self, size: Size, flags: ImageFlags) -> HostResult<H::Bitmap>;
}

/// Bitmap returned by a handler
pub trait NativeBitmap {
    /// Declared width and height
    ///
    /// # Errors
    ///
    /// Returns `HostError` if the bitmap cannot be queried.
    fn size(&self) -> HostResult<Size>;

    /// Top-down 32-bit BGRA copy of the pixels
    ///
    /// # Errors
    ///
    /// Returns `HostError` if the pixels cannot be copied.
    fn read_bgra(&self, size: Size) -> HostResult<Vec<u8>>;
}

/// Native subsystem initialization for the current thread
///
/// Acquired once per worker thread before any other host call; dropping the
/// scope leaves the subsystem again. Must be dropped on the thread that
/// created it, after every handle obtained under it.
pub struct ThreadScope<H: ShellHost> {
    host: Arc<H>,
}

impl<H: ShellHost> ThreadScope<H> {
    /// # Errors
    ///
    /// Returns `HostError` if the host refuses to initialize the thread.
    pub fn enter(host: &Arc<H>) -> HostResult<Self> {
        host.enter_thread()?;
        Ok(Self {
            host: Arc::clone(host),
        })
    }
}

impl<H: ShellHost> Drop for ThreadScope<H> {
    fn drop(&mut self) {
        self.host.leave_thread();
    }
}

/// Host for the platform this binary runs on
#[cfg(windows)]
pub type NativeHost = windows::WindowsShellHost;
