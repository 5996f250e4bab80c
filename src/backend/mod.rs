//! Sandbox hosts, one per [`ShowKind`], and the dispatcher that selects them.
//!
//! A backend is constructed by [`create_backend`], bound to a program with
//! [`Backend::initialize`] and then advanced one frame at a time with
//! [`Backend::produce_frame`]. Backends are single-threaded and are never shared across sessions.

use std::time::Instant;

use crate::foundation::core::FrameIndex;
use crate::foundation::error::{RiterError, RiterResult};
use crate::frame::encoder::NativePixels;
use crate::session::cancel::CancelToken;
use crate::session::config::RenderConfig;
use crate::show::ShowKind;

/// Byte-program (WebAssembly) host.
pub mod byteprog;
/// Static text host.
pub mod glyph;
mod glyph_atlas;
/// Draw-loop interpreter host.
pub mod imperative;
/// Fragment shader host.
pub mod shader;

pub use byteprog::ByteProgramBackend;
pub use glyph::GlyphBackend;
pub use imperative::ImperativeBackend;
pub use shader::ShaderBackend;

/// Why a frame was abandoned before completion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interrupt {
    /// The session's wall-clock budget ran out.
    Deadline,
    /// The consumer cancelled.
    Cancelled,
}

/// Outcome of [`Backend::produce_frame`].
#[derive(Debug)]
pub enum FrameStep {
    /// A complete frame, not yet quantized.
    Frame(NativePixels),
    /// The program has no more frames.
    Finished,
    /// A deadline or cancellation was observed mid-frame; the partial frame is discarded.
    Interrupted(Interrupt),
}

/// Limits a backend polls while producing one frame.
#[derive(Clone, Copy, Debug)]
pub struct FrameContext<'a> {
    /// Wall-clock deadline of the whole session.
    pub deadline: Option<Instant>,
    /// Consumer cancellation.
    pub cancel: &'a CancelToken,
}

impl<'a> FrameContext<'a> {
    /// Context with a deadline.
    pub fn new(deadline: Option<Instant>, cancel: &'a CancelToken) -> Self {
        Self { deadline, cancel }
    }

    /// Context bounded only by cancellation.
    pub fn unbounded(cancel: &'a CancelToken) -> Self {
        Self::new(None, cancel)
    }

    /// Cancellation wins over the deadline when both apply.
    pub fn interrupt(&self) -> Option<Interrupt> {
        if self.cancel.is_cancelled() {
            Some(Interrupt::Cancelled)
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some(Interrupt::Deadline)
        } else {
            None
        }
    }
}

/// A sandboxed execution strategy for one show kind.
pub trait Backend {
    /// The kind this backend runs.
    fn kind(&self) -> ShowKind;

    /// Parse, compile or instantiate `source`. Fails with [`RiterError::Compile`].
    fn initialize(&mut self, source: &str, config: &RenderConfig) -> RiterResult<()>;

    /// Advance the program by one frame.
    ///
    /// Returns [`RiterError::RuntimeFault`] or [`RiterError::Trap`] when the program faults.
    fn produce_frame(
        &mut self,
        index: FrameIndex,
        ctx: &FrameContext<'_>,
    ) -> RiterResult<FrameStep>;

    /// Hard frame ceiling enforced regardless of what the program signals.
    fn frame_ceiling(&self) -> Option<u64> {
        None
    }
}

/// Construct the backend for `kind`. No program is bound yet.
pub fn create_backend(kind: ShowKind) -> RiterResult<Box<dyn Backend>> {
    tracing::debug!(%kind, "creating backend");
    Ok(match kind {
        ShowKind::Glyph => Box::new(GlyphBackend::new()?),
        ShowKind::Imperative => Box::new(ImperativeBackend::new()),
        ShowKind::Shader => Box::new(ShaderBackend::new()),
        ShowKind::ByteProgram => Box::new(ByteProgramBackend::new()),
    })
}

/// Construct a backend from a kind name as stored in the catalog (`text`, `p5`, `wasm`, ...).
pub fn create_backend_named(kind: &str) -> RiterResult<Box<dyn Backend>> {
    create_backend(kind.parse()?)
}

pub(crate) fn not_initialized(kind: ShowKind) -> RiterError {
    RiterError::configuration(format!("{kind} backend used before initialize"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatcher_covers_every_kind() {
        for kind in ShowKind::ALL {
            let b = create_backend(kind).unwrap();
            assert_eq!(b.kind(), kind);
        }
    }

    #[test]
    fn unknown_kind_is_configuration_error() {
        let err = create_backend_named("flash").err().unwrap();
        assert!(matches!(err, RiterError::Configuration(_)));
        assert_eq!(create_backend_named("p5").unwrap().kind(), ShowKind::Imperative);
    }

    #[test]
    fn cancellation_wins_over_deadline() {
        let cancel = CancelToken::new();
        let past = Instant::now();
        let ctx = FrameContext::new(Some(past), &cancel);
        assert_eq!(ctx.interrupt(), Some(Interrupt::Deadline));
        cancel.cancel();
        assert_eq!(ctx.interrupt(), Some(Interrupt::Cancelled));
        assert_eq!(FrameContext::unbounded(&CancelToken::new()).interrupt(), None);
    }
}
