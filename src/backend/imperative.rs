use crate::backend::{Backend, FrameContext, FrameStep, not_initialized};
use crate::foundation::core::FrameIndex;
use crate::foundation::error::{RiterError, RiterResult};
use crate::frame::encoder::NativePixels;
use crate::session::config::RenderConfig;
use crate::show::ShowKind;
use crate::sketch::interp::{Abort, Interpreter};
use crate::sketch::parser::parse_program;

/// Runs a draw-loop sketch: `preload()` and `setup()` once, then `draw()` per frame.
///
/// The canvas persists between frames, so a sketch that never calls `background()` accumulates
/// its strokes. Top-level code and `setup()` run lazily with the first frame, which makes their
/// faults surface through the delivery channel like any other runtime fault.
#[derive(Debug, Default)]
pub struct ImperativeBackend {
    interp: Option<Interpreter>,
    max_steps: u64,
    started: bool,
    finished: bool,
}

impl ImperativeBackend {
    /// Unbound imperative backend.
    pub fn new() -> Self {
        Self::default()
    }

    fn start(&mut self, ctx: &FrameContext<'_>) -> Result<(), Abort> {
        let max_steps = self.max_steps;
        let Some(interp) = self.interp.as_mut() else {
            return Ok(());
        };
        interp.run_top_level(ctx, max_steps)?;
        interp.call_global("preload", ctx, max_steps)?;
        interp.set_frame_count(0);
        interp.call_global("setup", ctx, max_steps)?;
        Ok(())
    }
}

fn settle(abort: Abort, stage: &str) -> RiterResult<FrameStep> {
    match abort {
        Abort::Fault(msg) => {
            tracing::debug!(stage, %msg, "sketch faulted");
            Err(RiterError::runtime(format!("{stage}: {msg}")))
        }
        Abort::Interrupted(why) => Ok(FrameStep::Interrupted(why)),
    }
}

impl Backend for ImperativeBackend {
    fn kind(&self) -> ShowKind {
        ShowKind::Imperative
    }

    #[tracing::instrument(skip_all, fields(len = source.len()))]
    fn initialize(&mut self, source: &str, config: &RenderConfig) -> RiterResult<()> {
        let program = parse_program(source).map_err(|e| RiterError::compile(e.render(source)))?;
        tracing::debug!(statements = program.len(), "sketch parsed");
        self.interp = Some(Interpreter::new(program, config.seed));
        self.max_steps = config.max_steps_per_frame;
        self.started = false;
        self.finished = false;
        Ok(())
    }

    fn produce_frame(
        &mut self,
        index: FrameIndex,
        ctx: &FrameContext<'_>,
    ) -> RiterResult<FrameStep> {
        if self.interp.is_none() {
            return Err(not_initialized(ShowKind::Imperative));
        }
        if self.finished {
            return Ok(FrameStep::Finished);
        }
        if !self.started {
            self.started = true;
            if let Err(abort) = self.start(ctx) {
                return settle(abort, "setup");
            }
        }

        let max_steps = self.max_steps;
        let interp = self
            .interp
            .as_mut()
            .ok_or_else(|| not_initialized(ShowKind::Imperative))?;
        interp.set_frame_count(index.0.saturating_add(1));
        interp.host.canvas.begin_frame();
        if let Err(abort) = interp.call_global("draw", ctx, max_steps) {
            return settle(abort, "draw");
        }
        let pixels = interp.host.canvas.capture();
        if !interp.host.looping {
            // noLoop(): this frame is the last one.
            self.finished = true;
        }
        Ok(FrameStep::Frame(NativePixels::Rgba8Premul(pixels)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encoder::encode;
    use crate::session::cancel::CancelToken;
    use crate::sketch::value::Value;

    fn backend(src: &str) -> ImperativeBackend {
        let mut b = ImperativeBackend::new();
        b.initialize(src, &RenderConfig::batch()).unwrap();
        b
    }

    fn step(b: &mut ImperativeBackend, i: u64) -> RiterResult<FrameStep> {
        let cancel = CancelToken::new();
        b.produce_frame(FrameIndex(i), &FrameContext::unbounded(&cancel))
    }

    #[test]
    fn setup_runs_once_and_draw_every_frame() {
        let mut b = backend(
            "let s = 0; let d = 0;
             function setup() { s++; background(0); }
             function draw() { d++; fill(255); noStroke(); rect(0, 0, d, 38); }",
        );
        for i in 0..3 {
            let FrameStep::Frame(px) = step(&mut b, i).unwrap() else {
                panic!("expected frame");
            };
            let f = encode(&px).unwrap();
            assert_eq!(f.count_on(), (i as u32 + 1) * 38);
        }
        let interp = b.interp.as_ref().unwrap();
        let num = |name: &str| match interp.global(name) {
            Some(Value::Num(n)) => *n,
            other => panic!("{name} = {other:?}"),
        };
        assert_eq!(num("s"), 1.0);
        assert_eq!(num("d"), 3.0);
    }

    #[test]
    fn no_loop_ends_after_current_frame() {
        let mut b = backend("function setup() { noLoop(); } function draw() { background(255); }");
        assert!(matches!(step(&mut b, 0).unwrap(), FrameStep::Frame(_)));
        assert!(matches!(step(&mut b, 1).unwrap(), FrameStep::Finished));
    }

    #[test]
    fn draw_fault_is_runtime_fault() {
        let mut b = backend("function draw() { if (frameCount == 2) { missing(); } }");
        assert!(matches!(step(&mut b, 0).unwrap(), FrameStep::Frame(_)));
        let err = step(&mut b, 1).unwrap_err();
        assert!(matches!(err, RiterError::RuntimeFault(_)));
    }

    #[test]
    fn setup_fault_surfaces_on_first_frame() {
        let mut b = backend("function setup() { undefinedThing(); }");
        assert!(matches!(step(&mut b, 0), Err(RiterError::RuntimeFault(_))));
    }

    #[test]
    fn parse_error_is_compile_error_with_position() {
        let mut b = ImperativeBackend::new();
        let err = b
            .initialize("function draw( {", &RenderConfig::batch())
            .unwrap_err();
        let RiterError::Compile(msg) = err else {
            panic!("expected compile error");
        };
        assert!(msg.starts_with("1:"), "{msg}");
    }

    #[test]
    fn cancelled_frame_is_interrupted() {
        let mut b = backend("function draw() { while (true) {} }");
        let cancel = CancelToken::new();
        cancel.cancel();
        let step = b
            .produce_frame(FrameIndex(0), &FrameContext::unbounded(&cancel))
            .unwrap();
        assert!(matches!(
            step,
            FrameStep::Interrupted(crate::backend::Interrupt::Cancelled)
        ));
    }
}
