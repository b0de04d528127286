//! Shell preview acquisition
//!
//! This module turns a file path into something a surface can show:
//! - an interactive preview handler hosted in the surface's window
//! - a thumbnail bitmap from a thumbnail provider
//! - a thumbnail bitmap from the shell item's image factory
//!
//! [`PreviewEngine`] drives sessions on worker threads for a long-lived
//! surface; [`probe_info`] and [`probe_thumbnail`] do the same work once on
//! the calling thread.

mod engine;
mod error;
mod initializer;
mod listener;
pub mod negotiator;
pub mod pixels;
mod probe;
mod session;
pub mod thumbnail;
mod types;
pub mod visuals;

pub use engine::PreviewEngine;
pub use error::{InputError, PreviewError, Result};
pub use initializer::initialize;
pub use listener::{ListenerId, PreviewListener};
pub use negotiator::{Handler, Negotiated};
pub use pixels::PixelBuffer;
pub use probe::{probe_info, probe_thumbnail};
pub use session::Session;
pub use types::{
    DisplaySnapshot, Phase, PreviewInfo, PreviewMode, PreviewRequest, SessionId, Surface,
    WILDCARD_EXTENSION, extension_of,
};
