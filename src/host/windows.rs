//! Native shell host built on the `windows` crate
//!
//! Components are activated out of process (`CLSCTX_LOCAL_SERVER`) inside a
//! multithreaded apartment entered once per session worker. Every interface
//! pointer is a reference-counted `windows` interface, so dropping a handle
//! releases it; bitmaps are wrapped so dropping them deletes the GDI object.

use std::ffi::c_void;
use std::mem;
use std::path::Path;

use tracing::{debug, warn};
use windows::Win32::Foundation::{COLORREF, ERROR_SUCCESS, FALSE, HWND, RECT, SIZE};
use windows::Win32::Graphics::Gdi::{
    BI_RGB, BITMAP, BITMAPINFO, BITMAPINFOHEADER, DIB_RGB_COLORS, DeleteObject, GetDC, GetDIBits,
    GetObjectW, HBITMAP, HGDIOBJ, LOGFONTW, ReleaseDC,
};
use windows::Win32::System::Com::{
    CLSCTX_LOCAL_SERVER, CLSIDFromString, COINIT_MULTITHREADED, CoCreateInstance, CoInitializeEx,
    CoUninitialize, IStream, STGM_READ,
};
use windows::Win32::System::Registry::{HKEY_CLASSES_ROOT, RRF_RT_REG_SZ, RegGetValueW};
use windows::Win32::UI::Shell::PropertiesSystem::{IInitializeWithFile, IInitializeWithStream};
use windows::Win32::UI::Shell::{
    ASSOCF_INIT_DEFAULTTOSTAR, ASSOCSTR_SHELLEXTENSION, AssocQueryStringW, IInitializeWithItem,
    IPreviewHandler, IPreviewHandlerVisuals, IShellItem, IShellItemImageFactory,
    IThumbnailProvider, SHCreateItemFromParsingName, SHCreateStreamOnFileEx, SIIGBF,
    WTS_ALPHATYPE,
};
use windows::Win32::UI::WindowsAndMessaging::GetClientRect;
use windows::core::{GUID, HSTRING, Interface, PCWSTR, PWSTR};

use super::{
    AlphaType, ClassId, ColorRef, HostError, HostResult, ImageFactory, ImageFlags, Initialize,
    InitializerKind, InterfaceKind, LogFont, NativeBitmap, PreviewHandler, PreviewVisuals, Rect,
    ShellHost, Size, ThumbnailProvider, WindowHandle,
};

/// Longest string read back from the association and registry queries
const MAX_STRING: usize = 260;

fn host_error(error: &windows::core::Error) -> HostError {
    HostError::from_code(error.code().0 as u32)
}

fn wide_path(path: &Path) -> HSTRING {
    HSTRING::from(path.as_os_str())
}

fn from_wide(buffer: &[u16]) -> String {
    let end = buffer.iter().position(|&c| c == 0).unwrap_or(buffer.len());
    String::from_utf16_lossy(&buffer[..end])
}

const fn native_rect(rect: Rect) -> RECT {
    RECT {
        left: rect.left,
        top: rect.top,
        right: rect.right,
        bottom: rect.bottom,
    }
}

const fn hwnd(window: WindowHandle) -> HWND {
    HWND(window.0 as *mut c_void)
}

fn class_guid(class_id: &ClassId) -> HostResult<GUID> {
    unsafe { CLSIDFromString(&HSTRING::from(class_id.as_str())) }.map_err(|e| host_error(&e))
}

fn create<T: Interface>(class_id: &ClassId) -> HostResult<T> {
    let guid = class_guid(class_id)?;
    unsafe { CoCreateInstance(&guid, None, CLSCTX_LOCAL_SERVER) }.map_err(|e| host_error(&e))
}

/// The Windows shell
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsShellHost;

impl WindowsShellHost {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ShellHost for WindowsShellHost {
    type Stream = IStream;
    type Item = IShellItem;
    type Bitmap = WindowsBitmap;
    type Visuals = WindowsVisuals;
    type Preview = WindowsPreviewHandler;
    type Thumbnail = WindowsThumbnailProvider;
    type Factory = WindowsImageFactory;

    fn enter_thread(&self) -> HostResult<()> {
        unsafe { CoInitializeEx(None, COINIT_MULTITHREADED) }
            .ok()
            .map_err(|e| host_error(&e))
    }

    fn leave_thread(&self) {
        unsafe { CoUninitialize() };
    }

    fn query_association(&self, extension: &str, kind: InterfaceKind) -> Option<ClassId> {
        let mut buffer = [0u16; MAX_STRING];
        let mut length = buffer.len() as u32;
        let result = unsafe {
            AssocQueryStringW(
                ASSOCF_INIT_DEFAULTTOSTAR,
                ASSOCSTR_SHELLEXTENSION,
                &HSTRING::from(extension),
                &HSTRING::from(kind.iid()),
                PWSTR(buffer.as_mut_ptr()),
                &mut length,
            )
        };
        if result.is_err() {
            debug!(extension, interface = %kind, "no association");
            return None;
        }
        let class_id = from_wide(&buffer);
        (!class_id.is_empty()).then(|| ClassId::new(class_id))
    }

    fn handler_name(&self, class_id: &ClassId) -> Option<String> {
        let mut buffer = [0u16; MAX_STRING];
        let mut bytes = mem::size_of_val(&buffer) as u32;
        let key = HSTRING::from(format!("CLSID\\{class_id}"));
        let status = unsafe {
            RegGetValueW(
                HKEY_CLASSES_ROOT,
                &key,
                PCWSTR::null(),
                RRF_RT_REG_SZ,
                None,
                Some(buffer.as_mut_ptr().cast()),
                Some(&mut bytes),
            )
        };
        if status != ERROR_SUCCESS {
            return None;
        }
        let name = from_wide(&buffer);
        (!name.is_empty()).then_some(name)
    }

    fn activate_preview_handler(&self, class_id: &ClassId) -> HostResult<Self::Preview> {
        create::<IPreviewHandler>(class_id).map(WindowsPreviewHandler)
    }

    fn activate_thumbnail_provider(&self, class_id: &ClassId) -> HostResult<Self::Thumbnail> {
        create::<IThumbnailProvider>(class_id).map(WindowsThumbnailProvider)
    }

    fn resolve_item(&self, path: &Path) -> HostResult<Self::Item> {
        unsafe { SHCreateItemFromParsingName(&wide_path(path), None) }.map_err(|e| host_error(&e))
    }

    fn image_factory(&self, item: &Self::Item) -> HostResult<Self::Factory> {
        item.cast::<IShellItemImageFactory>()
            .map(WindowsImageFactory)
            .map_err(|e| host_error(&e))
    }

    fn open_stream(&self, path: &Path) -> HostResult<Self::Stream> {
        unsafe { SHCreateStreamOnFileEx(&wide_path(path), STGM_READ.0, 0, FALSE, None) }
            .map_err(|e| host_error(&e))
    }

    fn client_rect(&self, window: WindowHandle) -> Rect {
        let mut rect = RECT::default();
        match unsafe { GetClientRect(hwnd(window), &mut rect) } {
            Ok(()) => Rect {
                left: rect.left,
                top: rect.top,
                right: rect.right,
                bottom: rect.bottom,
            },
            Err(e) => {
                warn!(error = %e, "cannot read client rect");
                Rect::ZERO
            }
        }
    }
}

fn supports(component: &impl Interface, kind: InitializerKind) -> bool {
    match kind {
        InitializerKind::Stream => component.cast::<IInitializeWithStream>().is_ok(),
        InitializerKind::File => component.cast::<IInitializeWithFile>().is_ok(),
        InitializerKind::Item => component.cast::<IInitializeWithItem>().is_ok(),
    }
}

fn initialize_with_stream(component: &impl Interface, stream: &IStream) -> HostResult<()> {
    let initializer = component
        .cast::<IInitializeWithStream>()
        .map_err(|e| host_error(&e))?;
    unsafe { initializer.Initialize(stream, STGM_READ.0) }.map_err(|e| host_error(&e))
}

fn initialize_with_file(component: &impl Interface, path: &Path) -> HostResult<()> {
    let initializer = component
        .cast::<IInitializeWithFile>()
        .map_err(|e| host_error(&e))?;
    unsafe { initializer.Initialize(&wide_path(path), STGM_READ.0) }.map_err(|e| host_error(&e))
}

fn initialize_with_item(component: &impl Interface, item: &IShellItem) -> HostResult<()> {
    let initializer = component
        .cast::<IInitializeWithItem>()
        .map_err(|e| host_error(&e))?;
    unsafe { initializer.Initialize(item, STGM_READ.0) }.map_err(|e| host_error(&e))
}

macro_rules! native_initialize {
    ($handle:ty) => {
        impl Initialize<WindowsShellHost> for $handle {
            fn supports(&self, kind: InitializerKind) -> bool {
                supports(&self.0, kind)
            }

            fn initialize_with_stream(&self, stream: &IStream) -> HostResult<()> {
                initialize_with_stream(&self.0, stream)
            }

            fn initialize_with_file(&self, path: &Path) -> HostResult<()> {
                initialize_with_file(&self.0, path)
            }

            fn initialize_with_item(&self, item: &IShellItem) -> HostResult<()> {
                initialize_with_item(&self.0, item)
            }
        }
    };
}

/// Activated `IPreviewHandler`
pub struct WindowsPreviewHandler(IPreviewHandler);

native_initialize!(WindowsPreviewHandler);

impl PreviewHandler<WindowsShellHost> for WindowsPreviewHandler {
    fn set_window(&self, window: WindowHandle, rect: Rect) -> HostResult<()> {
        let rect = native_rect(rect);
        unsafe { self.0.SetWindow(hwnd(window), &rect) }.map_err(|e| host_error(&e))
    }

    fn set_rect(&self, rect: Rect) -> HostResult<()> {
        let rect = native_rect(rect);
        unsafe { self.0.SetRect(&rect) }.map_err(|e| host_error(&e))
    }

    fn do_preview(&self) -> HostResult<()> {
        unsafe { self.0.DoPreview() }.map_err(|e| host_error(&e))
    }

    fn unload(&self) -> HostResult<()> {
        unsafe { self.0.Unload() }.map_err(|e| host_error(&e))
    }

    fn set_focus(&self) -> HostResult<()> {
        unsafe { self.0.SetFocus() }.map_err(|e| host_error(&e))
    }

    fn visuals(&self) -> Option<WindowsVisuals> {
        self.0.cast::<IPreviewHandlerVisuals>().ok().map(WindowsVisuals)
    }
}

/// `IPreviewHandlerVisuals` of an activated preview handler
pub struct WindowsVisuals(IPreviewHandlerVisuals);

impl PreviewVisuals for WindowsVisuals {
    fn set_background_color(&self, color: ColorRef) -> HostResult<()> {
        unsafe { self.0.SetBackgroundColor(COLORREF(color.0)) }.map_err(|e| host_error(&e))
    }

    fn set_text_color(&self, color: ColorRef) -> HostResult<()> {
        unsafe { self.0.SetTextColor(COLORREF(color.0)) }.map_err(|e| host_error(&e))
    }

    fn set_font(&self, font: &LogFont) -> HostResult<()> {
        let native = LOGFONTW {
            lfHeight: font.height,
            lfWeight: font.weight,
            lfItalic: u8::from(font.italic),
            lfFaceName: font.face_name,
            ..Default::default()
        };
        unsafe { self.0.SetFont(&native) }.map_err(|e| host_error(&e))
    }
}

/// Activated `IThumbnailProvider`
pub struct WindowsThumbnailProvider(IThumbnailProvider);

native_initialize!(WindowsThumbnailProvider);

impl ThumbnailProvider<WindowsShellHost> for WindowsThumbnailProvider {
    fn get_thumbnail(&self, size: u32) -> HostResult<(WindowsBitmap, AlphaType)> {
        let mut bitmap = HBITMAP::default();
        let mut alpha = WTS_ALPHATYPE::default();
        unsafe { self.0.GetThumbnail(size, &mut bitmap, &mut alpha) }
            .map_err(|e| host_error(&e))?;
        Ok((WindowsBitmap(bitmap), AlphaType::from_raw(alpha.0)))
    }
}

/// `IShellItemImageFactory` of a shell item
pub struct WindowsImageFactory(IShellItemImageFactory);

impl ImageFactory<WindowsShellHost> for WindowsImageFactory {
    fn get_image(&self, size: Size, flags: ImageFlags) -> HostResult<WindowsBitmap> {
        let native = SIZE {
            cx: size.width as i32,
            cy: size.height as i32,
        };
        unsafe { self.0.GetImage(native, SIIGBF(flags.bits() as i32)) }
            .map(WindowsBitmap)
            .map_err(|e| host_error(&e))
    }
}

/// Owned GDI bitmap, deleted on drop
pub struct WindowsBitmap(HBITMAP);

impl WindowsBitmap {
    const fn object(&self) -> HGDIOBJ {
        HGDIOBJ(self.0.0)
    }
}

impl NativeBitmap for WindowsBitmap {
    fn size(&self) -> HostResult<Size> {
        let mut bitmap = BITMAP::default();
        let written = unsafe {
            GetObjectW(
                self.object(),
                mem::size_of::<BITMAP>() as i32,
                Some((&raw mut bitmap).cast()),
            )
        };
        if written == 0 {
            return Err(HostError::Unavailable("cannot query bitmap".to_string()));
        }
        Ok(Size::new(
            bitmap.bmWidth.unsigned_abs(),
            bitmap.bmHeight.unsigned_abs(),
        ))
    }

    fn read_bgra(&self, size: Size) -> HostResult<Vec<u8>> {
        let mut info = BITMAPINFO {
            bmiHeader: BITMAPINFOHEADER {
                biSize: mem::size_of::<BITMAPINFOHEADER>() as u32,
                biWidth: size.width as i32,
                // negative height selects top-down rows
                biHeight: -(size.height as i32),
                biPlanes: 1,
                biBitCount: 32,
                biCompression: BI_RGB.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut pixels = vec![0u8; size.width as usize * size.height as usize * 4];

        let lines = unsafe {
            let dc = GetDC(HWND::default());
            let lines = GetDIBits(
                dc,
                self.0,
                0,
                size.height,
                Some(pixels.as_mut_ptr().cast()),
                &mut info,
                DIB_RGB_COLORS,
            );
            let _ = ReleaseDC(HWND::default(), dc);
            lines
        };
        if lines <= 0 {
            return Err(HostError::Unavailable("cannot copy bitmap pixels".to_string()));
        }
        Ok(pixels)
    }
}

impl Drop for WindowsBitmap {
    fn drop(&mut self) {
        if !self.0.is_invalid() {
            let _ = unsafe { DeleteObject(self.object()) };
        }
    }
}
