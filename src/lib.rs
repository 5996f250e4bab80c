//! riter renders small, untrusted "show" programs into 96x38 monochrome animations.
//!
//! A show is written in one of four mini-languages: static glyph text, an imperative draw loop,
//! a GLSL-like fragment expression, or a WebAssembly byte-program. Every backend's output is
//! quantized into the same canonical 456-byte [`Frame`]. The public API is session-oriented:
//!
//! - Describe the show as a [`ShowProgram`] and pick a [`RenderConfig`]
//! - Create a [`RenderSession`] (dispatch, compile, instantiate)
//! - Run it into a [`FrameSink`], or pull frames from a threaded [`FrameStream`]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

pub(crate) mod expression;
pub(crate) mod sketch;

/// Sandbox hosts and the kind dispatcher.
pub mod backend;
/// Delivery sinks and wire formats.
pub mod encode;
/// Canonical frame and encoder.
pub mod frame;
/// Render sessions and streaming.
pub mod session;
/// Show descriptions handed over by the catalog.
pub mod show;

pub use crate::foundation::core::{FRAME_BYTES, FrameIndex, HEIGHT, PIXELS, WIDTH};
pub use crate::foundation::error::{RiterError, RiterResult};

pub use crate::backend::{Backend, FrameContext, FrameStep, Interrupt, create_backend};
pub use crate::encode::lines::{AsciiSink, Base64LineSink};
pub use crate::encode::sink::{ChannelSink, Delivery, FrameSink, InMemorySink, SinkConfig};
pub use crate::encode::sse::{SseDecoder, SseEvent, SseSink};
pub use crate::frame::bitmap::Frame;
pub use crate::frame::encoder::{NativePixels, encode};
pub use crate::session::cancel::CancelToken;
pub use crate::session::config::{RenderConfig, RenderProfile};
pub use crate::session::render_session::{Budget, RenderSession, SessionEnd, SessionReport};
pub use crate::session::stream::FrameStream;
pub use crate::show::{ShowKind, ShowProgram};
