//! Handler discovery and activation
//!
//! For a file extension the negotiator finds the best available handler in
//! strict priority order:
//!
//! 1. an interactive preview handler registered for the extension
//! 2. a thumbnail provider registered for the extension
//! 3. the image factory of the file's shell item
//!
//! Activation of a registered component is retried exactly once when the
//! shell reports the transient server execution failure. A preview handler
//! that is registered but cannot be activated ends negotiation; a failing
//! thumbnail provider falls through to the image factory.
//!
//! Every function here must run on a thread holding a
//! [`ThreadScope`](crate::host::ThreadScope).

use std::path::Path;

use tracing::{debug, warn};

use super::error::{PreviewError, Result};
use super::initializer;
use super::types::{PreviewInfo, PreviewRequest};
use crate::host::{ClassId, HostResult, InitializerKind, InterfaceKind, ShellHost};

/// Activated component, dispatched by capability
pub enum Handler<H: ShellHost> {
    Interactive(H::Preview),
    Thumbnail(H::Thumbnail),
    ImageFactory(H::Factory),
}

impl<H: ShellHost> Handler<H> {
    #[must_use]
    pub const fn kind(&self) -> InterfaceKind {
        match self {
            Self::Interactive(_) => InterfaceKind::PreviewHandler,
            Self::Thumbnail(_) => InterfaceKind::ThumbnailProvider,
            Self::ImageFactory(_) => InterfaceKind::ShellItemImageFactory,
        }
    }

    /// Whether the component still needs an input method
    #[must_use]
    pub const fn needs_initialization(&self) -> bool {
        !matches!(self, Self::ImageFactory(_))
    }

    /// Run input negotiation for components that take one
    ///
    /// # Errors
    ///
    /// Returns `PreviewError::InitializationFailed` if the component rejects every input method.
    pub fn initialize(&self, host: &H, path: &Path) -> Result<Option<InitializerKind>> {
        match self {
            Self::Interactive(handler) => initializer::initialize(host, handler, path).map(Some),
            Self::Thumbnail(provider) => initializer::initialize(host, provider, path).map(Some),
            Self::ImageFactory(_) => Ok(None),
        }
    }
}

/// Result of a successful negotiation
pub struct Negotiated<H: ShellHost> {
    pub handler: Handler<H>,
    pub info: PreviewInfo,
}

/// Run `activate`, retrying once on the transient server failure
///
/// # Errors
///
/// Returns the error of the last attempt.
pub fn activate_with_retry<T>(
    class_id: &ClassId,
    activate: impl Fn(&ClassId) -> HostResult<T>,
) -> HostResult<T> {
    match activate(class_id) {
        Err(e) if e.is_transient() => {
            debug!(%class_id, "transient activation failure, retrying");
            activate(class_id)
        }
        other => other,
    }
}

/// Step 1: interactive preview handler
///
/// `Ok(None)` when nothing is registered for the extension.
///
/// # Errors
///
/// Returns `PreviewError::ActivationFailed` if a registered handler cannot be activated.
pub fn try_interactive<H: ShellHost>(
    host: &H,
    request: &PreviewRequest,
) -> Result<Option<Negotiated<H>>> {
    let kind = InterfaceKind::PreviewHandler;
    let Some(class_id) = host.query_association(request.extension(), kind) else {
        debug!(extension = request.extension(), "no preview handler registered");
        return Ok(None);
    };

    let handler = activate_with_retry(&class_id, |id| host.activate_preview_handler(id))
        .map_err(|e| PreviewError::ActivationFailed {
            class_id: class_id.clone(),
            code: e.code(),
        })?;

    debug!(%class_id, "activated preview handler");
    let info = PreviewInfo::new(request, kind, Some(&class_id), host.handler_name(&class_id));
    Ok(Some(Negotiated {
        handler: Handler::Interactive(handler),
        info,
    }))
}

/// Step 2: registered thumbnail provider
///
/// Activation failures are logged and yield `None`.
pub fn try_thumbnail_provider<H: ShellHost>(
    host: &H,
    request: &PreviewRequest,
) -> Option<Negotiated<H>> {
    let kind = InterfaceKind::ThumbnailProvider;
    let class_id = host.query_association(request.extension(), kind)?;

    match activate_with_retry(&class_id, |id| host.activate_thumbnail_provider(id)) {
        Ok(provider) => {
            debug!(%class_id, "activated thumbnail provider");
            let info = PreviewInfo::new(request, kind, Some(&class_id), host.handler_name(&class_id));
            Some(Negotiated {
                handler: Handler::Thumbnail(provider),
                info,
            })
        }
        Err(e) => {
            warn!(%class_id, error = %e, "thumbnail provider activation failed");
            None
        }
    }
}

/// Step 3: image factory of the file's shell item
///
/// The shell item is released as soon as the factory is obtained.
pub fn try_image_factory<H: ShellHost>(
    host: &H,
    request: &PreviewRequest,
) -> Option<Negotiated<H>> {
    let factory = {
        let item = host
            .resolve_item(request.path())
            .map_err(|e| debug!(error = %e, "cannot resolve shell item"))
            .ok()?;
        host.image_factory(&item)
            .map_err(|e| debug!(error = %e, "shell item has no image factory"))
            .ok()?
    };

    debug!("using shell item image factory");
    let info = PreviewInfo::new(request, InterfaceKind::ShellItemImageFactory, None, None);
    Some(Negotiated {
        handler: Handler::ImageFactory(factory),
        info,
    })
}

/// Full negotiation: interactive, then thumbnail provider, then image factory
///
/// # Errors
///
/// Returns `PreviewError::ActivationFailed` if a registered preview handler
/// cannot be activated, `PreviewError::NoHandlerFound` if nothing is available.
pub fn negotiate<H: ShellHost>(host: &H, request: &PreviewRequest) -> Result<Negotiated<H>> {
    if let Some(negotiated) = try_interactive(host, request)? {
        return Ok(negotiated);
    }
    negotiate_thumbnail(host, request)
}

/// Bitmap-only negotiation: thumbnail provider, then image factory
///
/// # Errors
///
/// Returns `PreviewError::NoHandlerFound` if neither is available.
pub fn negotiate_thumbnail<H: ShellHost>(
    host: &H,
    request: &PreviewRequest,
) -> Result<Negotiated<H>> {
    try_thumbnail_provider(host, request)
        .or_else(|| try_image_factory(host, request))
        .ok_or(PreviewError::NoHandlerFound)
}
